//! Connectionless cache backend speaking the Upstash Redis REST protocol.
//!
//! Every command is one HTTPS POST of a JSON array (`["SET", "k", "v"]`)
//! with a bearer token. Replies are `{"result": ...}` or `{"error": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::backend::{CacheError, CacheStore};

/// Per-command HTTP timeout. Cache calls must stay cheaper than the fetch
/// they short-circuit.
const REQUEST_TIMEOUT_SECS: u64 = 5;

/// Keys per `DEL` command when deleting by pattern.
pub const DELETE_BATCH_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Clone is cheap - reqwest::Client uses Arc internally.
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    url: String,
    token: String,
}

impl RestStore {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn command(&self, args: &[&str]) -> Result<Value, CacheError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(args)
            .send()
            .await?;

        let status = response.status();
        let reply: RestReply = response.json().await?;
        if let Some(error) = reply.error {
            return Err(CacheError::Backend(error));
        }
        if !status.is_success() {
            return Err(CacheError::Backend(format!("HTTP {}", status)));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }

    fn as_count(value: Value) -> Result<usize, CacheError> {
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| CacheError::Protocol(format!("expected integer, got {}", value)))
    }
}

#[async_trait]
impl CacheStore for RestStore {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.command(&["GET", key]).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(CacheError::Protocol(format!("GET returned {}", other))),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let ttl = ttl_secs.max(1).to_string();
        self.command(&["SET", key, value, "EX", &ttl]).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<usize, CacheError> {
        Self::as_count(self.command(&["DEL", key]).await?)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let keys: Vec<String> = match self.command(&["KEYS", pattern]).await? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Value::Null => Vec::new(),
            other => return Err(CacheError::Protocol(format!("KEYS returned {}", other))),
        };

        let mut removed = 0;
        for chunk in keys.chunks(DELETE_BATCH_SIZE) {
            let mut args: Vec<&str> = Vec::with_capacity(chunk.len() + 1);
            args.push("DEL");
            args.extend(chunk.iter().map(String::as_str));
            removed += Self::as_count(self.command(&args).await?)?;
        }

        debug!(pattern, matched = keys.len(), removed, "Deleted keys by pattern");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_shapes() {
        let ok: RestReply = serde_json::from_str(r#"{"result":"OK"}"#).unwrap();
        assert_eq!(ok.result, Some(Value::String("OK".to_string())));
        assert!(ok.error.is_none());

        let miss: RestReply = serde_json::from_str(r#"{"result":null}"#).unwrap();
        assert_eq!(miss.result, None);

        let err: RestReply = serde_json::from_str(r#"{"error":"WRONGPASS"}"#).unwrap();
        assert_eq!(err.error.as_deref(), Some("WRONGPASS"));
    }

    #[test]
    fn test_count_parsing() {
        assert_eq!(RestStore::as_count(Value::from(3)).unwrap(), 3);
        assert!(RestStore::as_count(Value::String("3".into())).is_err());
    }

    #[test]
    fn test_url_trailing_slash_trimmed() {
        let store = RestStore::new("https://cache.example.com/", "t").unwrap();
        assert_eq!(store.url, "https://cache.example.com");
        assert_eq!(store.name(), "rest");
    }
}
