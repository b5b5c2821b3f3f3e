// crates/server/src/config.rs
//! Server configuration from environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use livewatch_stream::session::DEFAULT_PUSH_BUFFER;
use livewatch_stream::SessionConfig;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 47900;

/// Default interval between SSE keep-alive comments.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub keepalive: Duration,
    pub push_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            keepalive: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            push_buffer: DEFAULT_PUSH_BUFFER,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment.
    ///
    /// - `LIVEWATCH_PORT` (falls back to `PORT`)
    /// - `LIVEWATCH_BIND`
    /// - `LIVEWATCH_KEEPALIVE_SECS`
    /// - `LIVEWATCH_PUSH_BUFFER`
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            bind: parse_var(&lookup, "LIVEWATCH_BIND").unwrap_or(defaults.bind),
            port: parse_var(&lookup, "LIVEWATCH_PORT")
                .or_else(|| parse_var(&lookup, "PORT"))
                .unwrap_or(defaults.port),
            keepalive: parse_var::<u64>(&lookup, "LIVEWATCH_KEEPALIVE_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.keepalive),
            push_buffer: parse_var::<usize>(&lookup, "LIVEWATCH_PUSH_BUFFER")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.push_buffer),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            push_buffer: self.push_buffer,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable config value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.addr().to_string(), "127.0.0.1:47900");
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("LIVEWATCH_PORT", "8080"),
            ("LIVEWATCH_BIND", "0.0.0.0"),
            ("LIVEWATCH_KEEPALIVE_SECS", "5"),
            ("LIVEWATCH_PUSH_BUFFER", "8"),
        ]));
        assert_eq!(config.addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.keepalive, Duration::from_secs(5));
        assert_eq!(config.session().push_buffer, 8);
    }

    #[test]
    fn test_port_fallback_and_bad_values() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("LIVEWATCH_KEEPALIVE_SECS", "0"),
            ("LIVEWATCH_PUSH_BUFFER", "lots"),
        ]));
        assert_eq!(config.port, 9000);
        assert_eq!(config.keepalive, Duration::from_secs(DEFAULT_KEEPALIVE_SECS));
        assert_eq!(config.push_buffer, DEFAULT_PUSH_BUFFER);
    }
}
