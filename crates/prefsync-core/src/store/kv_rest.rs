//! Session store backed by a Redis-compatible REST API (Upstash / Vercel KV).
//!
//! Commands are sent as a JSON array to the base endpoint with a bearer token
//! and answered with `{ "result": ... }` or `{ "error": "..." }`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use super::{decode, encode, session_key, ttl_secs, SessionStore, StoredSession};
use crate::error::{Error, Result};
use crate::models::SyncSession;
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Atomically replace `KEYS[1]` with `ARGV[2]` (TTL `ARGV[3]`) if it still holds `ARGV[1]`.
const COMPARE_AND_SET_SCRIPT: &str = "\
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
  return 1
end
return 0";

#[derive(Clone)]
pub struct RestKvSessionStore {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl fmt::Debug for RestKvSessionStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RestKvSessionStore")
            .field("endpoint", &self.endpoint)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl RestKvSessionStore {
    /// Build a store client. `timeout` bounds every round-trip to the KV service.
    pub fn new(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = normalize_endpoint(endpoint.into())?;
        let token = normalize_text_option(Some(token.into())).ok_or_else(|| {
            Error::InvalidConfiguration("KV REST token must not be empty".to_string())
        })?;

        Ok(Self {
            endpoint,
            token,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    async fn command(&self, args: Vec<Value>) -> Result<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .json(&args)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_command_response(status, &body)
    }
}

#[async_trait]
impl SessionStore for RestKvSessionStore {
    fn backend(&self) -> &'static str {
        "rest_kv"
    }

    async fn get(&self, sync_token: &str) -> Result<Option<StoredSession>> {
        get_reply(self.command(get_command(sync_token)).await?)
    }

    async fn put(&self, sync_token: &str, session: &SyncSession, ttl: Duration) -> Result<()> {
        let raw = encode(session)?;
        set_reply(self.command(set_command(sync_token, raw, ttl)).await?)
    }

    async fn put_if_unchanged(
        &self,
        sync_token: &str,
        expected_version: &str,
        session: &SyncSession,
        ttl: Duration,
    ) -> Result<bool> {
        let raw = encode(session)?;
        let reply = self
            .command(compare_and_set_command(sync_token, expected_version, raw, ttl))
            .await?;
        compare_and_set_reply(&reply)
    }
}

fn get_reply(result: Value) -> Result<Option<StoredSession>> {
    match result {
        Value::Null => Ok(None),
        Value::String(raw) => decode(raw).map(Some),
        other => Err(Error::Api(format!(
            "unexpected GET result type: {}",
            json_type(&other)
        ))),
    }
}

fn set_reply(result: Value) -> Result<()> {
    match result {
        Value::String(reply) if reply == "OK" => Ok(()),
        other => Err(Error::Api(format!("SET was not acknowledged: {other}"))),
    }
}

fn compare_and_set_reply(result: &Value) -> Result<bool> {
    match result.as_i64() {
        Some(1) => Ok(true),
        Some(0) => Ok(false),
        _ => Err(Error::Api(format!("unexpected EVAL result: {result}"))),
    }
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    result: Value,
    error: Option<String>,
}

fn get_command(sync_token: &str) -> Vec<Value> {
    vec![Value::from("GET"), Value::from(session_key(sync_token))]
}

fn set_command(sync_token: &str, raw: String, ttl: Duration) -> Vec<Value> {
    vec![
        Value::from("SET"),
        Value::from(session_key(sync_token)),
        Value::from(raw),
        Value::from("EX"),
        Value::from(ttl_secs(ttl).to_string()),
    ]
}

fn compare_and_set_command(
    sync_token: &str,
    expected_version: &str,
    raw: String,
    ttl: Duration,
) -> Vec<Value> {
    vec![
        Value::from("EVAL"),
        Value::from(COMPARE_AND_SET_SCRIPT),
        Value::from("1"),
        Value::from(session_key(sync_token)),
        Value::from(expected_version),
        Value::from(raw),
        Value::from(ttl_secs(ttl).to_string()),
    ]
}

fn parse_command_response(status: StatusCode, body: &str) -> Result<Value> {
    let parsed = serde_json::from_str::<CommandResponse>(body);

    if !status.is_success() {
        let message = parsed
            .ok()
            .and_then(|payload| payload.error)
            .unwrap_or_else(|| compact_text(body));
        return Err(Error::Api(if message.is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            format!("{} ({})", message.trim(), status.as_u16())
        }));
    }

    let payload = parsed?;
    if let Some(error) = payload.error {
        return Err(Error::Api(error));
    }
    Ok(payload.result)
}

fn normalize_endpoint(raw: String) -> Result<String> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        Error::InvalidConfiguration("KV REST endpoint must not be empty".to_string())
    })?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidConfiguration(
            "KV REST endpoint must include http:// or https://".to_string(),
        ))
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
