// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the inbound HTTP listener binds to
    pub listen_addr: SocketAddr,
    /// Peer endpoint, if known before the peer sends `InitializeRequest`
    pub peer_url: Option<String>,
    /// Bound for engine client calls
    pub client_timeout: Duration,
    /// Bound for waits on replies from the peer
    pub operation_timeout: Duration,
    /// Per-send timeout of the outbound gateway
    pub gateway_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All optional (with defaults):
    /// - `WFBRIDGE_LISTEN_ADDR`: inbound listener (default: 127.0.0.1:5000)
    /// - `WFBRIDGE_PEER_URL`: peer endpoint (default: unset)
    /// - `WFBRIDGE_CLIENT_TIMEOUT_MS`: engine call timeout (default: 30000)
    /// - `WFBRIDGE_OPERATION_TIMEOUT_MS`: peer reply timeout (default: 86400000)
    /// - `WFBRIDGE_GATEWAY_TIMEOUT_MS`: outbound send timeout (default: 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr: SocketAddr = std::env::var("WFBRIDGE_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:5000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("WFBRIDGE_LISTEN_ADDR", "must be a socket address")
            })?;

        let peer_url = std::env::var("WFBRIDGE_PEER_URL")
            .ok()
            .filter(|url| !url.is_empty());

        Ok(Self {
            listen_addr,
            peer_url,
            client_timeout: millis_var("WFBRIDGE_CLIENT_TIMEOUT_MS", 30_000)?,
            operation_timeout: millis_var("WFBRIDGE_OPERATION_TIMEOUT_MS", 86_400_000)?,
            gateway_timeout: millis_var("WFBRIDGE_GATEWAY_TIMEOUT_MS", 10_000)?,
        })
    }
}

fn millis_var(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let ms: u64 = match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid(name, "must be a number of milliseconds"))?,
        Err(_) => default,
    };

    if ms == 0 {
        return Err(ConfigError::Invalid(name, "must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: [&str; 5] = [
        "WFBRIDGE_LISTEN_ADDR",
        "WFBRIDGE_PEER_URL",
        "WFBRIDGE_CLIENT_TIMEOUT_MS",
        "WFBRIDGE_OPERATION_TIMEOUT_MS",
        "WFBRIDGE_GATEWAY_TIMEOUT_MS",
    ];

    /// Sets env vars for a test and restores them afterwards
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        /// Guard with every bridge variable removed.
        fn clean() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for var in VARS {
                guard.remove(var);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::clean();

        let config = Config::from_env().unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(config.peer_url, None);
        assert_eq!(config.client_timeout, Duration::from_secs(30));
        assert_eq!(config.operation_timeout, Duration::from_secs(24 * 60 * 60));
        assert_eq!(config.gateway_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_config_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("WFBRIDGE_LISTEN_ADDR", "0.0.0.0:6000");
        guard.set("WFBRIDGE_PEER_URL", "http://127.0.0.1:6001/");
        guard.set("WFBRIDGE_CLIENT_TIMEOUT_MS", "1500");
        guard.set("WFBRIDGE_OPERATION_TIMEOUT_MS", "60000");
        guard.set("WFBRIDGE_GATEWAY_TIMEOUT_MS", "250");

        let config = Config::from_env().unwrap();

        assert_eq!(config.listen_addr.port(), 6000);
        assert_eq!(config.peer_url.as_deref(), Some("http://127.0.0.1:6001/"));
        assert_eq!(config.client_timeout, Duration::from_millis(1500));
        assert_eq!(config.operation_timeout, Duration::from_secs(60));
        assert_eq!(config.gateway_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_config_empty_peer_url_is_unset() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("WFBRIDGE_PEER_URL", "");

        assert_eq!(Config::from_env().unwrap().peer_url, None);
    }

    #[test]
    fn test_config_invalid_listen_addr() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        guard.set("WFBRIDGE_LISTEN_ADDR", "localhost");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("WFBRIDGE_LISTEN_ADDR", _)));
    }

    #[test]
    fn test_config_invalid_timeouts() {
        let _lock = ENV_MUTEX.lock().unwrap();

        let test_cases = vec![
            ("WFBRIDGE_CLIENT_TIMEOUT_MS", "soon"),
            ("WFBRIDGE_OPERATION_TIMEOUT_MS", "-5"),
            ("WFBRIDGE_GATEWAY_TIMEOUT_MS", "0"),
        ];

        for (var, value) in test_cases {
            let mut guard = EnvGuard::clean();
            guard.set(var, value);

            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid(name, _) if name == var),
                "{}={} should be rejected, got {:?}",
                var,
                value,
                err
            );
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
