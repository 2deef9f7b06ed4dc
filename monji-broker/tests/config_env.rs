use monji_broker::{BrokerConfig, CliOverrides};
use serial_test::serial;

const VARS: &[&str] = &[
    "MONJI_CONFIG",
    "MONJI__BIND_ADDRESS",
    "MONJI_DATABASE_URL",
    "MONJI_ENCRYPTION_KEY",
    "MONJI_JWT_SECRET",
    "MONJI_RESOURCE_TIMEOUT_SECS",
];

fn clear_env() {
    // SAFETY: tests in this file run serially and own the process environment.
    unsafe {
        for var in VARS {
            std::env::remove_var(var);
        }
    }
}

#[test]
#[serial]
fn resolves_from_process_environment() {
    clear_env();
    unsafe {
        std::env::set_var("MONJI_ENCRYPTION_KEY", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
        std::env::set_var("MONJI_JWT_SECRET", "secret");
        std::env::set_var("MONJI__BIND_ADDRESS", "127.0.0.1:9090");
        std::env::set_var("MONJI_DATABASE_URL", "memory");
        std::env::set_var("MONJI_RESOURCE_TIMEOUT_SECS", "30");
    }

    let config = BrokerConfig::resolve(&CliOverrides::default()).expect("config");
    assert_eq!(config.bind_address.port(), 9090);
    assert!(config.uses_memory_store());
    assert_eq!(config.resource_timeout.as_secs(), 30);
    clear_env();
}

#[test]
#[serial]
fn cli_override_wins_over_environment() {
    clear_env();
    unsafe {
        std::env::set_var("MONJI_ENCRYPTION_KEY", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
        std::env::set_var("MONJI_JWT_SECRET", "secret");
        std::env::set_var("MONJI_DATABASE_URL", "sqlite://from-env.db");
    }

    let overrides = CliOverrides {
        database_url: Some("memory".into()),
        ..CliOverrides::default()
    };
    let config = BrokerConfig::resolve(&overrides).expect("config");
    assert_eq!(config.database_url, "memory");
    clear_env();
}

#[test]
#[serial]
fn missing_jwt_secret_is_an_error() {
    clear_env();
    unsafe {
        std::env::set_var("MONJI_ENCRYPTION_KEY", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=");
    }
    let err = BrokerConfig::resolve(&CliOverrides::default()).unwrap_err();
    assert!(err.to_string().contains("MONJI_JWT_SECRET"));
    clear_env();
}

#[tokio::test]
#[serial]
async fn build_state_rejects_short_encryption_key() {
    clear_env();
    unsafe {
        std::env::set_var("MONJI_ENCRYPTION_KEY", "c2hvcnQ=");
        std::env::set_var("MONJI_JWT_SECRET", "secret");
        std::env::set_var("MONJI_DATABASE_URL", "memory");
    }
    let config = BrokerConfig::resolve(&CliOverrides::default()).expect("config");
    assert!(monji_broker::build_state(&config).await.is_err());
    clear_env();
}
