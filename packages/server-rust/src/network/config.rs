//! HTTP binding configuration.

use std::time::Duration;

/// Settings for the HTTP transport binding.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Upper bound for one health-check exchange. `/call` is not bounded at
    /// the HTTP level, so a `/wait` may block for as long as the ALO runs.
    pub request_timeout: Duration,
    /// Largest accepted call envelope, in bytes.
    pub max_body_bytes: usize,
    /// How long shutdown waits for in-flight calls.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 4 * 1024 * 1024,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 0);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_body_bytes, 4_194_304);
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
    }
}
