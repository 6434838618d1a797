//! Runtime configuration read from the environment (and `.env` when present).

use thiserror::Error;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_LEDGER_MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Attempts per ledger write before giving up on contention.
    pub ledger_max_retries: u32,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            use_persistent_stores: false,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            ledger_max_retries: DEFAULT_LEDGER_MAX_RETRIES,
        }
    }
}

impl InventoryConfig {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                tracing::warn!(error = %err, "failed to load .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Malformed values fall back to
    /// their defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            use_persistent_stores: parse_or(
                &lookup,
                "USE_PERSISTENT_STORES",
                defaults.use_persistent_stores,
            ),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", defaults.max_connections)
                .max(1),
            ledger_max_retries: parse_or(&lookup, "LEDGER_MAX_RETRIES", defaults.ledger_max_retries)
                .max(1),
        }
    }

    /// Connection string for persistent mode.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = ?default, "invalid value, using default");
            default
        }),
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
    fn defaults_to_in_memory() {
        let config = InventoryConfig::from_lookup(lookup(&[]));
        assert_eq!(config, InventoryConfig::default());
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn reads_persistent_settings() {
        let config = InventoryConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/medstock"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("LEDGER_MAX_RETRIES", "3"),
        ]));
        assert!(config.use_persistent_stores);
        assert_eq!(config.require_database_url(), Ok("postgres://localhost/medstock"));
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.ledger_max_retries, 3);
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = InventoryConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "yes please"),
            ("LEDGER_MAX_RETRIES", "-2"),
            ("DATABASE_MAX_CONNECTIONS", "0"),
        ]));
        assert!(!config.use_persistent_stores);
        assert_eq!(config.ledger_max_retries, DEFAULT_LEDGER_MAX_RETRIES);
        assert_eq!(config.max_connections, 1);
    }
}
