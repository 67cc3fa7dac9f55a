//! Environment-backed runtime configuration for `weft-smoke`.

use std::{
    env,
    error::Error,
    fmt,
    path::PathBuf,
};

const DEFAULT_DATA_DIR_ROOT: &str = "./.weft-smoke-store";
const DEFAULT_HOMESERVER: &str = "https://matrix.example.org";
const DEFAULT_LOAD_LIMIT: u16 = 50;

/// Runtime configuration used by the smoke binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeConfig {
    /// Homeserver base URL.
    pub homeserver: String,
    /// Session user id to resolve credentials for.
    pub user_id: Option<String>,
    /// Optional password seeded into the credential tiers for first login.
    pub password: Option<String>,
    /// Optional room to load once the session is up.
    pub room_id: Option<String>,
    /// SDK store root directory.
    pub data_dir_root: PathBuf,
    /// Serve cached messages before hitting the network.
    pub cache_first: bool,
    /// Message limit for the smoke load.
    pub load_limit: u16,
}

impl SmokeConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let homeserver = optional_trimmed_env("WEFT_HOMESERVER", &mut lookup)
            .unwrap_or_else(|| DEFAULT_HOMESERVER.to_owned());
        let user_id = optional_trimmed_env("WEFT_USER", &mut lookup);
        let password = optional_trimmed_env("WEFT_PASSWORD", &mut lookup);
        let room_id = optional_trimmed_env("WEFT_ROOM", &mut lookup);
        let data_dir_root = optional_trimmed_env("WEFT_DATA_DIR", &mut lookup)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR_ROOT));

        let cache_first = match optional_trimmed_env("WEFT_CACHE_FIRST", &mut lookup) {
            None => true,
            Some(value) => parse_bool("WEFT_CACHE_FIRST", &value)?,
        };

        let load_limit = match optional_trimmed_env("WEFT_LOAD_LIMIT", &mut lookup) {
            None => DEFAULT_LOAD_LIMIT,
            Some(value) => value.parse::<u16>().map_err(|err| ConfigError::InvalidValue {
                key: "WEFT_LOAD_LIMIT",
                value,
                reason: err.to_string(),
            })?,
        };
        if load_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "WEFT_LOAD_LIMIT",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            homeserver,
            user_id,
            password,
            room_id,
            data_dir_root,
            cache_first,
            load_limit,
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_owned(),
            reason: "expected a boolean".to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from_pairs(pairs: &[(&str, &str)]) -> Result<SmokeConfig, ConfigError> {
        let map = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        SmokeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn parses_defaults_without_env() {
        let cfg = config_from_pairs(&[]).expect("config should parse");
        assert_eq!(cfg.homeserver, DEFAULT_HOMESERVER);
        assert_eq!(cfg.user_id, None);
        assert!(cfg.cache_first);
        assert_eq!(cfg.load_limit, DEFAULT_LOAD_LIMIT);
        assert_eq!(cfg.data_dir_root, PathBuf::from(DEFAULT_DATA_DIR_ROOT));
    }

    #[test]
    fn parses_full_configuration() {
        let cfg = config_from_pairs(&[
            ("WEFT_HOMESERVER", "https://matrix.example.org"),
            ("WEFT_USER", "@alice:example.org"),
            ("WEFT_PASSWORD", "secret"),
            ("WEFT_ROOM", "!r1:example.org"),
            ("WEFT_DATA_DIR", "/tmp/weft"),
            ("WEFT_CACHE_FIRST", "false"),
            ("WEFT_LOAD_LIMIT", "25"),
        ])
        .expect("config should parse");

        assert_eq!(cfg.user_id.as_deref(), Some("@alice:example.org"));
        assert_eq!(cfg.room_id.as_deref(), Some("!r1:example.org"));
        assert_eq!(cfg.data_dir_root, PathBuf::from("/tmp/weft"));
        assert!(!cfg.cache_first);
        assert_eq!(cfg.load_limit, 25);
    }

    #[test]
    fn rejects_invalid_numeric_values() {
        let err = config_from_pairs(&[("WEFT_LOAD_LIMIT", "abc")])
            .expect_err("invalid limit should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "WEFT_LOAD_LIMIT",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_load_limit() {
        let err = config_from_pairs(&[("WEFT_LOAD_LIMIT", "0")])
            .expect_err("zero limit should fail");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_malformed_booleans() {
        let err = config_from_pairs(&[("WEFT_CACHE_FIRST", "maybe")])
            .expect_err("bad boolean should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "WEFT_CACHE_FIRST",
                ..
            }
        ));
    }
}
