use super::*;
use std::sync::Mutex;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// # Safety
/// Callers hold `ENV_LOCK` so no other test touches these variables.
unsafe fn clear_sockrpc_env() {
    unsafe {
        std::env::remove_var("SOCKRPC_URL");
        std::env::remove_var("SOCKRPC_MAX_RECONNECTS");
        std::env::remove_var("SOCKRPC_RECONNECT_INTERVAL_MS");
        std::env::remove_var("SOCKRPC_CALL_TIMEOUT_MS");
    }
}

#[test]
fn new_uses_documented_defaults() {
    let cfg = ClientConfig::new("ws://localhost:7125/websocket");
    assert_eq!(cfg.url, "ws://localhost:7125/websocket");
    assert_eq!(cfg.max_reconnects, 5);
    assert_eq!(cfg.reconnect_interval, Duration::from_millis(1000));
    assert_eq!(cfg.call_timeout, Duration::from_secs(30));
}

#[test]
fn builder_methods_override_defaults() {
    let cfg = ClientConfig::new("ws://h")
        .with_max_reconnects(2)
        .with_reconnect_interval(Duration::from_millis(100))
        .with_call_timeout(Duration::from_millis(250));
    assert_eq!(cfg.max_reconnects, 2);
    assert_eq!(cfg.reconnect_interval, Duration::from_millis(100));
    assert_eq!(cfg.call_timeout, Duration::from_millis(250));
}

#[test]
fn from_env_requires_url() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe { clear_sockrpc_env() };

    let err = ClientConfig::from_env().expect_err("url should be required");
    assert!(matches!(err, ConfigError::MissingVar("SOCKRPC_URL")));
}

#[test]
fn from_env_reads_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe {
        clear_sockrpc_env();
        std::env::set_var("SOCKRPC_URL", "ws://printer.local/websocket");
        std::env::set_var("SOCKRPC_MAX_RECONNECTS", "2");
        std::env::set_var("SOCKRPC_RECONNECT_INTERVAL_MS", "100");
        std::env::set_var("SOCKRPC_CALL_TIMEOUT_MS", "5000");
    }

    let cfg = ClientConfig::from_env().expect("config");
    assert_eq!(cfg.url, "ws://printer.local/websocket");
    assert_eq!(cfg.max_reconnects, 2);
    assert_eq!(cfg.reconnect_interval, Duration::from_millis(100));
    assert_eq!(cfg.call_timeout, Duration::from_secs(5));

    unsafe { clear_sockrpc_env() };
}

#[test]
fn from_env_falls_back_on_malformed_numbers() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    unsafe {
        clear_sockrpc_env();
        std::env::set_var("SOCKRPC_URL", "ws://h");
        std::env::set_var("SOCKRPC_MAX_RECONNECTS", "lots");
        std::env::set_var("SOCKRPC_RECONNECT_INTERVAL_MS", "-1");
    }

    let cfg = ClientConfig::from_env().expect("config");
    assert_eq!(cfg.max_reconnects, DEFAULT_MAX_RECONNECTS);
    assert_eq!(cfg.reconnect_interval, Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS));

    unsafe { clear_sockrpc_env() };
}
