//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `MARKET_RELAY_FEED_URL` | required |
//! | `MARKET_RELAY_SNAPSHOT_API_URL` | unset (refresh disabled) |
//! | `MARKET_RELAY_API_PORT` | 8080 |
//! | `MARKET_RELAY_HEALTH_PORT` | 8082 |
//! | `MARKET_RELAY_RECONNECT_DELAY_MS` | 3000 |
//! | `MARKET_RELAY_MAX_RECONNECT_ATTEMPTS` | 10 |
//! | `MARKET_RELAY_CONNECT_TIMEOUT_SECS` | 10 |
//! | `MARKET_RELAY_REFRESH_INTERVAL_SECS` | 300 |
//! | `MARKET_RELAY_REFRESH_TIMEOUT_SECS` | 15 |
//! | `MARKET_RELAY_CLIENT_BUFFER` | 1024 |

use std::time::Duration;

/// Upstream feed connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// WebSocket URL of the upstream feed.
    pub url: String,
    /// Fixed wait between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failed attempts before the client stops retrying.
    pub max_reconnect_attempts: u32,
    /// Upper bound on a single connect handshake.
    pub connect_timeout: Duration,
}

impl FeedSettings {
    /// Settings for `url` with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_millis(3_000),
            max_reconnect_attempts: 10,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Bulk snapshot API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotApiSettings {
    /// Base URL; group snapshots live under `{base_url}/groups/{GROUP}/snapshots`.
    pub base_url: String,
    /// Period between scheduled refreshes.
    pub refresh_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl SnapshotApiSettings {
    /// Settings for `base_url` with default timings.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_interval: Duration::from_secs(300),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Client fan-out settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Messages buffered per client before new ones are dropped.
    pub client_buffer: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            client_buffer: 1_024,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Client WebSocket and query API port.
    pub api_port: u16,
    /// Health, status and metrics port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            api_port: 8080,
            health_port: 8082,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Upstream feed settings.
    pub feed: FeedSettings,
    /// Bulk snapshot API, if configured.
    pub snapshot_api: Option<SnapshotApiSettings>,
    /// Server port settings.
    pub server: ServerSettings,
    /// Fan-out settings.
    pub broadcast: BroadcastSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the feed URL is missing, empty or not a
    /// WebSocket URL, or if the snapshot API URL is not an HTTP URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let url = env.required("MARKET_RELAY_FEED_URL")?;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "MARKET_RELAY_FEED_URL".to_string(),
                value: url,
            });
        }

        let feed_defaults = FeedSettings::new("");
        let feed = FeedSettings {
            url,
            reconnect_delay: env.duration_millis(
                "MARKET_RELAY_RECONNECT_DELAY_MS",
                feed_defaults.reconnect_delay,
            ),
            max_reconnect_attempts: env.parse(
                "MARKET_RELAY_MAX_RECONNECT_ATTEMPTS",
                feed_defaults.max_reconnect_attempts,
            ),
            connect_timeout: env.duration_secs(
                "MARKET_RELAY_CONNECT_TIMEOUT_SECS",
                feed_defaults.connect_timeout,
            ),
        };

        let snapshot_api = match env.optional("MARKET_RELAY_SNAPSHOT_API_URL") {
            None => None,
            Some(base) if base.starts_with("http://") || base.starts_with("https://") => {
                let defaults = SnapshotApiSettings::new("");
                Some(SnapshotApiSettings {
                    base_url: base.trim_end_matches('/').to_string(),
                    refresh_interval: env.duration_secs(
                        "MARKET_RELAY_REFRESH_INTERVAL_SECS",
                        defaults.refresh_interval,
                    ),
                    request_timeout: env.duration_secs(
                        "MARKET_RELAY_REFRESH_TIMEOUT_SECS",
                        defaults.request_timeout,
                    ),
                })
            }
            Some(base) => {
                return Err(ConfigError::InvalidValue {
                    key: "MARKET_RELAY_SNAPSHOT_API_URL".to_string(),
                    value: base,
                });
            }
        };

        let server = ServerSettings {
            api_port: env.parse("MARKET_RELAY_API_PORT", ServerSettings::default().api_port),
            health_port: env.parse(
                "MARKET_RELAY_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let broadcast = BroadcastSettings {
            client_buffer: env.parse(
                "MARKET_RELAY_CLIENT_BUFFER",
                BroadcastSettings::default().client_buffer,
            ),
        };

        Ok(Self {
            feed,
            snapshot_api,
            server,
            broadcast,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value of the wrong shape.
    #[error("environment variable {key} has invalid value: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value.to_string())
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RelayConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = load(&[("MARKET_RELAY_FEED_URL", "wss://feed.example/ws")]).unwrap();

        assert_eq!(config.feed.url, "wss://feed.example/ws");
        assert_eq!(config.feed.reconnect_delay, Duration::from_millis(3_000));
        assert_eq!(config.feed.max_reconnect_attempts, 10);
        assert_eq!(config.feed.connect_timeout, Duration::from_secs(10));
        assert!(config.snapshot_api.is_none());
        assert_eq!(config.server, ServerSettings::default());
        assert_eq!(config.broadcast.client_buffer, 1_024);
    }

    #[test]
    fn missing_feed_url_is_an_error() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(k) if k == "MARKET_RELAY_FEED_URL"));
    }

    #[test]
    fn empty_feed_url_is_an_error() {
        let err = load(&[("MARKET_RELAY_FEED_URL", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn non_websocket_feed_url_is_rejected() {
        let err = load(&[("MARKET_RELAY_FEED_URL", "http://feed.example")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("MARKET_RELAY_FEED_URL", "ws://localhost:9000"),
            ("MARKET_RELAY_SNAPSHOT_API_URL", "https://api.example/v1/"),
            ("MARKET_RELAY_RECONNECT_DELAY_MS", "250"),
            ("MARKET_RELAY_MAX_RECONNECT_ATTEMPTS", "3"),
            ("MARKET_RELAY_REFRESH_INTERVAL_SECS", "60"),
            ("MARKET_RELAY_API_PORT", "9000"),
            ("MARKET_RELAY_CLIENT_BUFFER", "16"),
        ])
        .unwrap();

        assert_eq!(config.feed.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.feed.max_reconnect_attempts, 3);
        let api = config.snapshot_api.unwrap();
        assert_eq!(api.base_url, "https://api.example/v1");
        assert_eq!(api.refresh_interval, Duration::from_secs(60));
        assert_eq!(api.request_timeout, Duration::from_secs(15));
        assert_eq!(config.server.api_port, 9000);
        assert_eq!(config.broadcast.client_buffer, 16);
    }

    #[test]
    fn unparsable_numbers_fall_back_to_defaults() {
        let config = load(&[
            ("MARKET_RELAY_FEED_URL", "ws://localhost:9000"),
            ("MARKET_RELAY_HEALTH_PORT", "not-a-port"),
            ("MARKET_RELAY_MAX_RECONNECT_ATTEMPTS", "-1"),
        ])
        .unwrap();
        assert_eq!(config.server.health_port, 8082);
        assert_eq!(config.feed.max_reconnect_attempts, 10);
    }

    #[test]
    fn invalid_snapshot_url_is_rejected() {
        let err = load(&[
            ("MARKET_RELAY_FEED_URL", "ws://localhost:9000"),
            ("MARKET_RELAY_SNAPSHOT_API_URL", "ftp://nope"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "MARKET_RELAY_SNAPSHOT_API_URL"));
    }
}
