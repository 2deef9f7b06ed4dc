use std::fmt;

#[allow(deprecated)]
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::errors::CipherError;
use crate::types::{EncryptedSecret, RevealedSecret};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256 key material supplied once at process start.
#[derive(Clone)]
pub struct CipherKey(Zeroizing<[u8; KEY_LEN]>);

impl CipherKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() != KEY_LEN {
            return Err(CipherError::KeyLength {
                expected: KEY_LEN,
                actual: bytes.len(),
            });
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Decode a standard base64 key, as carried in configuration.
    pub fn from_base64(value: &str) -> Result<Self, CipherError> {
        let raw = Zeroizing::new(
            STANDARD
                .decode(value.trim())
                .map_err(|_| CipherError::KeyEncoding)?,
        );
        Self::from_bytes(&raw)
    }

    /// Fresh random key, mainly for tests and first-time setup.
    pub fn generate() -> Result<Self, CipherError> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng
            .try_fill_bytes(&mut key[..])
            .map_err(|err| CipherError::Entropy(err.to_string()))?;
        Ok(Self(key))
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(self.as_bytes()))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(<redacted>)")
    }
}

/// Authenticated encryption for stored connection strings.
///
/// Blobs are standard base64 of `nonce || ciphertext || tag`. Every call to
/// [`SecretCipher::encrypt`] draws a new nonce from the OS entropy source.
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    #[allow(deprecated)]
    pub fn new(key: &CipherKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { cipher }
    }

    #[allow(deprecated)]
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|err| CipherError::Entropy(err.to_string()))?;

        let sealed = self
            .cipher
            .encrypt(GenericArray::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CipherError::Seal)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(EncryptedSecret::from_stored(STANDARD.encode(blob)))
    }

    #[allow(deprecated)]
    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<RevealedSecret, CipherError> {
        let data = STANDARD
            .decode(secret.as_str())
            .map_err(|_| CipherError::TamperOrCorruption("ciphertext is not valid base64"))?;
        if data.len() < NONCE_LEN {
            return Err(CipherError::TamperOrCorruption("ciphertext too short"));
        }
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::TamperOrCorruption("ciphertext truncated"));
        }

        let (nonce, sealed) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(GenericArray::from_slice(nonce), sealed)
            .map_err(|_| CipherError::TamperOrCorruption("message authentication failed"))?;

        String::from_utf8(plaintext)
            .map(RevealedSecret::new)
            .map_err(|_| CipherError::TamperOrCorruption("plaintext is not utf-8"))
    }
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}
