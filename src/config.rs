use std::{env, net::SocketAddr};

use chrono::Duration;
use thiserror::Error;
use tracing::warn;

const DEFAULT_DATABASE: &str = "WePay";
const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEV_TOKEN_SECRET: &str = "wepay-dev-secret";
const DEFAULT_TOKEN_TTL_HOURS: i64 = 7 * 24;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("WEPAY_BIND is not a socket address: {value}")]
    InvalidBind {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("WEPAY_TOKEN_SECRET must be set (or WEPAY_INSECURE_DEV=1 for a development secret)")]
    MissingTokenSecret,
    #[error("WEPAY_TOKEN_TTL_HOURS must be a positive number of hours: {0}")]
    InvalidTokenTtl(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// When unset the server keeps its ledger in memory.
    pub mongodb_uri: Option<String>,
    pub database: String,
    pub bind: SocketAddr,
    pub token_secret: String,
    pub token_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind = non_empty("WEPAY_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind
            .parse::<SocketAddr>()
            .map_err(|source| ConfigError::InvalidBind { value: bind.clone(), source })?;

        let token_secret = match non_empty("WEPAY_TOKEN_SECRET") {
            Some(secret) => secret,
            None if non_empty("WEPAY_INSECURE_DEV").as_deref() == Some("1") => {
                warn!("WEPAY_TOKEN_SECRET not set; using insecure development secret");
                DEV_TOKEN_SECRET.to_string()
            }
            None => return Err(ConfigError::MissingTokenSecret),
        };

        let token_ttl = match non_empty("WEPAY_TOKEN_TTL_HOURS") {
            Some(hours) => match hours.trim().parse::<i64>() {
                Ok(hours) if (1..=24 * 365 * 10).contains(&hours) => Duration::hours(hours),
                _ => return Err(ConfigError::InvalidTokenTtl(hours)),
            },
            None => Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
        };

        Ok(Self {
            mongodb_uri: non_empty("MONGODB_URI"),
            database: non_empty("WEPAY_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            bind,
            token_secret,
            token_ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("WEPAY_TOKEN_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.mongodb_uri, None);
        assert_eq!(config.database, "WePay");
        assert_eq!(config.bind, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.token_secret, "s3cret");
        assert_eq!(config.token_ttl, Duration::days(7));
    }

    #[test]
    fn token_ttl_is_configurable() {
        let twelve_hours = config(&[("WEPAY_TOKEN_SECRET", "s"), ("WEPAY_TOKEN_TTL_HOURS", "12")]).unwrap();
        assert_eq!(twelve_hours.token_ttl, Duration::hours(12));

        for bad in ["0", "-3", "soon"] {
            let err = config(&[("WEPAY_TOKEN_SECRET", "s"), ("WEPAY_TOKEN_TTL_HOURS", bad)]).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidTokenTtl(ref value) if value == bad));
        }
    }

    #[test]
    fn reads_all_variables() {
        let config = config(&[
            ("MONGODB_URI", "mongodb://localhost:27017"),
            ("WEPAY_DATABASE", "Split"),
            ("WEPAY_BIND", "127.0.0.1:5000"),
            ("WEPAY_TOKEN_SECRET", "s3cret"),
        ])
        .unwrap();
        assert_eq!(config.mongodb_uri.as_deref(), Some("mongodb://localhost:27017"));
        assert_eq!(config.database, "Split");
        assert_eq!(config.bind.port(), 5000);
    }

    #[test]
    fn blank_uri_means_in_memory() {
        let config = config(&[("MONGODB_URI", " "), ("WEPAY_TOKEN_SECRET", "s")]).unwrap();
        assert_eq!(config.mongodb_uri, None);
    }

    #[test]
    fn secret_is_required_outside_dev() {
        assert!(matches!(config(&[]), Err(ConfigError::MissingTokenSecret)));
        let dev = config(&[("WEPAY_INSECURE_DEV", "1")]).unwrap();
        assert_eq!(dev.token_secret, DEV_TOKEN_SECRET);
    }

    #[test]
    fn bad_bind_is_reported() {
        let err = config(&[("WEPAY_BIND", "localhost"), ("WEPAY_TOKEN_SECRET", "s")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBind { ref value, .. } if value == "localhost"));
    }
}
