use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use prefsync_core::merge::DEFAULT_SEARCH_HISTORY_LIMIT;
use prefsync_core::util::is_http_url;
use prefsync_core::{EmptyValuePolicy, MergeOptions, SyncOptions, WriteMode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub session_ttl: Duration,
    pub search_history_limit: usize,
    pub write_mode: WriteMode,
    pub empty_values: EmptyValuePolicy,
    pub kv_request_timeout: Duration,
    pub kv: Option<KvRuntimeConfig>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct KvRuntimeConfig {
    pub rest_api_url: String,
    pub rest_api_token: String,
}

impl fmt::Debug for KvRuntimeConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("KvRuntimeConfig")
            .field("rest_api_url", &self.rest_api_url)
            .field("rest_api_token", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("session_ttl", &self.session_ttl)
            .field("search_history_limit", &self.search_history_limit)
            .field("write_mode", &self.write_mode)
            .field("empty_values", &self.empty_values)
            .field("kv_request_timeout", &self.kv_request_timeout)
            .field("kv", &self.kv)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "PREFSYNC_API_BIND_ADDR", "127.0.0.1:8080");

        let session_ttl_secs =
            bounded_u64(&lookup, "SYNC_SESSION_TTL_SECS", "900", 60..=86_400)?;

        let search_history_limit = bounded_u64(
            &lookup,
            "SEARCH_HISTORY_LIMIT",
            &DEFAULT_SEARCH_HISTORY_LIMIT.to_string(),
            1..=1_000,
        )?;

        let cas_max_attempts = bounded_u64(&lookup, "SYNC_CAS_MAX_ATTEMPTS", "3", 1..=10)?;
        let write_mode = match value_or_default(&lookup, "SYNC_WRITE_MODE", "overwrite")
            .to_ascii_lowercase()
            .as_str()
        {
            "overwrite" => WriteMode::Overwrite,
            "compare_and_swap" | "cas" => WriteMode::CompareAndSwap {
                max_attempts: u32::try_from(cas_max_attempts).unwrap_or(3),
            },
            _ => {
                return Err(ConfigError::Invalid(
                    "SYNC_WRITE_MODE must be `overwrite` or `compare_and_swap`".to_string(),
                ))
            }
        };

        let empty_values = match value_or_default(&lookup, "SYNC_EMPTY_VALUES", "skip")
            .to_ascii_lowercase()
            .as_str()
        {
            "skip" => EmptyValuePolicy::SkipFalsy,
            "apply" => EmptyValuePolicy::SkipNullOnly,
            _ => {
                return Err(ConfigError::Invalid(
                    "SYNC_EMPTY_VALUES must be `skip` or `apply`".to_string(),
                ))
            }
        };

        let kv_timeout_secs = bounded_u64(&lookup, "KV_REQUEST_TIMEOUT_SECS", "5", 1..=60)?;
        let kv = parse_kv_config(&lookup)?;

        Ok(Self {
            bind_addr,
            session_ttl: Duration::from_secs(session_ttl_secs),
            search_history_limit: usize::try_from(search_history_limit)
                .unwrap_or(DEFAULT_SEARCH_HISTORY_LIMIT),
            write_mode,
            empty_values,
            kv_request_timeout: Duration::from_secs(kv_timeout_secs),
            kv,
        })
    }

    pub const fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            session_ttl: self.session_ttl,
            write_mode: self.write_mode,
            merge: MergeOptions {
                empty_values: self.empty_values,
                search_history_limit: self.search_history_limit,
            },
        }
    }
}

fn parse_kv_config(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<KvRuntimeConfig>, ConfigError> {
    let rest_api_url = optional_trimmed(&lookup, "KV_REST_API_URL");
    let rest_api_token = optional_trimmed(&lookup, "KV_REST_API_TOKEN");
    if rest_api_url.is_none() && rest_api_token.is_none() {
        return Ok(None);
    }

    let rest_api_url = rest_api_url.ok_or(ConfigError::MissingVar("KV_REST_API_URL"))?;
    let rest_api_token = rest_api_token.ok_or(ConfigError::MissingVar("KV_REST_API_TOKEN"))?;
    if !is_http_url(&rest_api_url) {
        return Err(ConfigError::Invalid(
            "KV_REST_API_URL must start with http:// or https://".to_string(),
        ));
    }

    Ok(Some(KvRuntimeConfig {
        rest_api_url: trim_trailing(&rest_api_url).to_string(),
        rest_api_token,
    }))
}

fn bounded_u64(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    range: RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let value = value_or_default(lookup, name, default)
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::Invalid(format!(
                "{name} must be an integer in [{}, {}]",
                range.start(),
                range.end()
            ))
        })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn trim_trailing(value: &str) -> &str {
    value.trim_end_matches('/')
}
