use std::{path::PathBuf, time::Duration};

use store::StorageConfig;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
const MAX_DEFAULT_HTTP_WORKERS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{key} is required when {reason}")]
    Missing {
        key: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Deployment labels attached to every request span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service: String,
    pub revision: String,
}

impl Default for ServiceIdentity {
    fn default() -> Self {
        Self {
            service: "tally".to_string(),
            revision: "local".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub http_workers: usize,
    pub storage: StorageConfig,
    pub store_timeout: Duration,
    pub log_format: LogFormat,
    pub identity: ServiceIdentity,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServiceConfig::from_env`] with a caller-supplied variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = &lookup;

        let bind_addr = match lookup("TALLY_INGEST_BIND") {
            Some(addr) => addr,
            None => match lookup("PORT") {
                Some(port) => format!("0.0.0.0:{}", parse_value::<u16>("PORT", &port, "a port number")?),
                None => DEFAULT_BIND_ADDR.to_string(),
            },
        };

        let http_workers = parse_env_first::<usize>(lookup, &["TALLY_INGEST_HTTP_WORKERS"], "a positive integer")?
            .map(|workers| positive("TALLY_INGEST_HTTP_WORKERS", workers))
            .transpose()?
            .unwrap_or_else(default_http_workers);

        let storage = match lookup("TALLY_INGEST_STORE").as_deref() {
            None | Some("memory") => StorageConfig::Memory,
            Some("local") => StorageConfig::Local {
                path: lookup("TALLY_INGEST_STORE_PATH")
                    .map(PathBuf::from)
                    .ok_or(ConfigError::Missing {
                        key: "TALLY_INGEST_STORE_PATH",
                        reason: "TALLY_INGEST_STORE=local",
                    })?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "TALLY_INGEST_STORE",
                    value: other.to_string(),
                    expected: "one of memory, local",
                });
            }
        };

        let store_timeout_ms = parse_env_first::<u64>(
            lookup,
            &["TALLY_INGEST_STORE_TIMEOUT_MS"],
            "a positive number of milliseconds",
        )?
        .map(|ms| positive("TALLY_INGEST_STORE_TIMEOUT_MS", ms))
        .transpose()?
        .unwrap_or(DEFAULT_STORE_TIMEOUT_MS);

        let log_format = match lookup("TALLY_LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "TALLY_LOG_FORMAT",
                    value: other.to_string(),
                    expected: "one of text, json",
                });
            }
        };

        let defaults = ServiceIdentity::default();
        let identity = ServiceIdentity {
            service: env_with_fallback(lookup, "K_SERVICE", "TALLY_SERVICE_NAME")
                .unwrap_or(defaults.service),
            revision: env_with_fallback(lookup, "K_REVISION", "TALLY_SERVICE_REVISION")
                .unwrap_or(defaults.revision),
        };

        Ok(Self {
            bind_addr,
            http_workers,
            storage,
            store_timeout: Duration::from_millis(store_timeout_ms),
            log_format,
            identity,
        })
    }
}

pub(crate) fn env_with_fallback(
    lookup: &dyn Fn(&str) -> Option<String>,
    primary: &str,
    fallback: &str,
) -> Option<String> {
    lookup(primary).or_else(|| lookup(fallback))
}

/// First key that is set wins; a set but unparsable value is an error.
pub(crate) fn parse_env_first<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    keys: &[&'static str],
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    for &key in keys {
        if let Some(value) = lookup(key) {
            return parse_value(key, &value, expected).map(Some);
        }
    }
    Ok(None)
}

fn parse_value<T: std::str::FromStr>(
    key: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
        expected,
    })
}

fn positive<T: Default + PartialOrd + ToString>(key: &'static str, value: T) -> Result<T, ConfigError> {
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            expected: "greater than zero",
        })
    }
}

fn default_http_workers() -> usize {
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get())
        .unwrap_or(1)
        .clamp(1, MAX_DEFAULT_HTTP_WORKERS)
}
