pub mod cipher;
pub mod mask;

pub use cipher::{CipherKey, SecretCipher};
pub use mask::{MASK_GLYPH, mask};
