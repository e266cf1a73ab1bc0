use std::env;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_HTTP_ADDRESS: ([u8; 4], u16) = ([0, 0, 0, 0], 3001);
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;
const DEFAULT_JWT_TTL_SECS: i64 = 86400;
/// Postgres reads a zero lock timeout as "wait forever".
const LOCK_TIMEOUT_MS_RANGE: RangeInclusive<u64> = 1..=300_000;
const JWT_TTL_SECS_RANGE: RangeInclusive<i64> = 60..=31_536_000;
const BCRYPT_COST_RANGE: RangeInclusive<u32> = 4..=31;
const DEFAULT_BCRYPT_COST: u32 = 10;
const DEFAULT_MAX_TICKETS: i32 = 10;
const DEV_JWT_SECRET: &str = "eventbook-development-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_address: SocketAddr,
    pub max_connections: u32,
    pub lock_timeout: Duration,
    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,
    pub bcrypt_cost: u32,
    pub max_tickets_per_booking: i32,
    pub cors_allowed_origins: Option<String>,
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let production = get("RUST_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if production => return Err(ConfigError::Missing("JWT_SECRET")),
            None => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let bcrypt_cost = bounded(&get, "BCRYPT_COST", DEFAULT_BCRYPT_COST, BCRYPT_COST_RANGE)?;
        let lock_timeout_ms = bounded(
            &get,
            "LOCK_TIMEOUT_MS",
            DEFAULT_LOCK_TIMEOUT_MS,
            LOCK_TIMEOUT_MS_RANGE,
        )?;
        let jwt_ttl_secs = bounded(&get, "JWT_TTL_SECS", DEFAULT_JWT_TTL_SECS, JWT_TTL_SECS_RANGE)?;

        let max_tickets_per_booking = parse(&get, "MAX_TICKETS_PER_BOOKING", DEFAULT_MAX_TICKETS)?;
        if max_tickets_per_booking < 1 {
            return Err(ConfigError::Invalid {
                key: "MAX_TICKETS_PER_BOOKING",
                value: max_tickets_per_booking.to_string(),
            });
        }

        Ok(Self {
            database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            http_address: parse(&get, "HTTP_ADDRESS", SocketAddr::from(DEFAULT_HTTP_ADDRESS))?,
            max_connections: parse(&get, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            jwt_secret,
            jwt_ttl_secs,
            bcrypt_cost,
            max_tickets_per_booking,
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS"),
            production,
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn bounded<T, G>(
    get: &G,
    key: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + ToString,
    G: Fn(&str) -> Option<String>,
{
    let value = parse(get, key, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/eventbook")]).unwrap();
        assert_eq!(config.http_address, "0.0.0.0:3001".parse().unwrap());
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.lock_timeout, Duration::from_millis(5000));
        assert_eq!(config.jwt_ttl_secs, 86400);
        assert_eq!(config.bcrypt_cost, 10);
        assert_eq!(config.max_tickets_per_booking, 10);
        assert!(!config.production);
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(config(&[]), Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn production_requires_jwt_secret() {
        let err = config(&[
            ("DATABASE_URL", "postgres://localhost/eventbook"),
            ("RUST_ENV", "production"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn malformed_values_are_reported_with_their_key() {
        let err = config(&[
            ("DATABASE_URL", "postgres://localhost/eventbook"),
            ("LOCK_TIMEOUT_MS", "soon"),
        ])
        .unwrap_err();
        match err {
            ConfigError::Invalid { key, value } => {
                assert_eq!(key, "LOCK_TIMEOUT_MS");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(config(&[
            ("DATABASE_URL", "postgres://localhost/eventbook"),
            ("MAX_TICKETS_PER_BOOKING", "0"),
        ])
        .is_err());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for (key, value) in [
            ("LOCK_TIMEOUT_MS", "0"),
            ("LOCK_TIMEOUT_MS", "86400000"),
            ("JWT_TTL_SECS", "0"),
            ("JWT_TTL_SECS", "-60"),
            ("JWT_TTL_SECS", "9223372036854775807"),
            ("BCRYPT_COST", "3"),
        ] {
            match config(&[("DATABASE_URL", "postgres://localhost/eventbook"), (key, value)]) {
                Err(ConfigError::Invalid { key: reported, .. }) => assert_eq!(reported, key),
                other => panic!("{key}={value} was accepted: {other:?}"),
            }
        }

        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/eventbook"),
            ("LOCK_TIMEOUT_MS", "1"),
            ("JWT_TTL_SECS", "3600"),
        ])
        .unwrap();
        assert_eq!(config.lock_timeout, Duration::from_millis(1));
        assert_eq!(config.jwt_ttl_secs, 3600);
    }
}
