//! Namespaced composite-hash cache for model query replies.
//!
//! The key hashes every semantically relevant input (model, temperature,
//! message, response schema, tool set) and nothing volatile. An optional
//! namespace is folded into the hash *and* prepended as a path segment, so
//! tenants are both hash-isolated and physically separated.

use std::path::PathBuf;

use serde_json::{json, Map, Value};

use crate::config::CacheConfig;
use crate::keys::sha256_hex;
use crate::store::{CacheEntity, FileCache};

const NO_SCHEMA: &str = "no_struct";
const MESSAGE_TAG: &str = "message";

/// Inputs identifying one model query.
#[derive(Debug, Clone, Copy)]
pub struct LlmQueryKey<'a> {
    pub message: &'a str,
    pub model: &'a str,
    pub temperature: f64,
    /// Name of the structured-output schema, if any.
    pub schema: Option<&'a str>,
    /// Names of the tools offered to the model, if any.
    pub tools: Option<&'a [&'a str]>,
    pub namespace: Option<&'a str>,
}

impl<'a> LlmQueryKey<'a> {
    pub fn new(message: &'a str, model: &'a str, temperature: f64) -> Self {
        Self {
            message,
            model,
            temperature,
            schema: None,
            tools: None,
            namespace: None,
        }
    }

    pub fn with_schema(mut self, schema: &'a str) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_tools(mut self, tools: &'a [&'a str]) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_namespace(mut self, namespace: &'a str) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Canonical string that gets hashed.
    ///
    /// `[ns##]model##temperature##message##schema[##tools]`, temperature
    /// rendered with its trailing `.0` (so `1.0`, not `1`), tool names
    /// sorted and comma-joined.
    fn canonical(&self) -> String {
        let schema = self.schema.unwrap_or(NO_SCHEMA);
        let mut key = format!(
            "{model}##{temperature:?}##{message}##{schema}",
            model = self.model,
            temperature = self.temperature,
            message = self.message,
        );
        if let Some(tools) = self.tools {
            let mut names: Vec<&str> = tools.to_vec();
            names.sort_unstable();
            key.push_str("##");
            key.push_str(&names.join(","));
        }
        if let Some(ns) = self.namespace {
            key = format!("{ns}##{key}");
        }
        key
    }
}

/// A cached model reply.
///
/// Replies are either a chat message (content plus provider metadata) or an
/// arbitrary JSON value (structured output). The variant is explicit so a
/// caller can never mistake one shape for the other.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedReply {
    Message {
        content: String,
        metadata: Map<String, Value>,
    },
    Raw(Value),
}

impl CachedReply {
    pub fn message(content: impl Into<String>) -> Self {
        Self::Message {
            content: content.into(),
            metadata: Map::new(),
        }
    }
}

pub struct LlmQueryEntity;

impl CacheEntity for LlmQueryEntity {
    type Value = CachedReply;
    type KeyInput<'a> = LlmQueryKey<'a>;

    const CACHE_TYPE: &'static str = "llm_query";
    const DEFAULT_TTL_DAYS: Option<u32> = None;
    const SHARED_BY_DEFAULT: bool = false;

    fn base_dir(config: &CacheConfig) -> PathBuf {
        config.dataset_dir().join("llm_query_cache")
    }

    fn cache_key(input: LlmQueryKey<'_>) -> String {
        let digest = sha256_hex(&input.canonical());
        match input.namespace {
            Some(ns) => format!("{ns}/{digest}"),
            None => digest,
        }
    }

    fn serialize(value: &CachedReply) -> Option<Value> {
        match value {
            CachedReply::Message { content, metadata } => Some(json!({
                "_type": MESSAGE_TAG,
                "content": content,
                "metadata": metadata,
            })),
            CachedReply::Raw(value) => Some(value.clone()),
        }
    }

    fn deserialize(raw: Value) -> Option<CachedReply> {
        if let Value::Object(ref map) = raw {
            if map.get("_type").and_then(Value::as_str) == Some(MESSAGE_TAG) {
                let content = map.get("content")?.as_str()?.to_owned();
                let metadata = match map.get("metadata") {
                    Some(Value::Object(meta)) => meta.clone(),
                    _ => Map::new(),
                };
                return Some(CachedReply::Message { content, metadata });
            }
        }
        Some(CachedReply::Raw(raw))
    }
}

pub type LlmQueryCache = FileCache<LlmQueryEntity>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::DEFAULT_PROFILE;

    #[test]
    fn namespaced_key_matches_reference_construction() {
        let key = LlmQueryEntity::cache_key(
            LlmQueryKey::new("hello", "gpt-5-mini", 1.0).with_namespace("ns"),
        );
        let expected = format!(
            "ns/{}",
            sha256_hex("ns##gpt-5-mini##1.0##hello##no_struct")
        );
        assert_eq!(key, expected);
    }

    #[test]
    fn temperature_changes_the_key() {
        let hot = LlmQueryEntity::cache_key(
            LlmQueryKey::new("hello", "gpt-5-mini", 1.0).with_namespace("ns"),
        );
        let cold = LlmQueryEntity::cache_key(
            LlmQueryKey::new("hello", "gpt-5-mini", 0.5).with_namespace("ns"),
        );
        assert_ne!(hot, cold);
    }

    #[test]
    fn tool_order_does_not_change_the_key() {
        let ab = LlmQueryEntity::cache_key(
            LlmQueryKey::new("m", "model", 0.0).with_tools(&["alpha", "beta"]),
        );
        let ba = LlmQueryEntity::cache_key(
            LlmQueryKey::new("m", "model", 0.0).with_tools(&["beta", "alpha"]),
        );
        assert_eq!(ab, ba);

        let none = LlmQueryEntity::cache_key(LlmQueryKey::new("m", "model", 0.0));
        assert_ne!(ab, none);
    }

    #[test]
    fn schema_changes_the_key() {
        let plain = LlmQueryEntity::cache_key(LlmQueryKey::new("m", "model", 0.0));
        let structured =
            LlmQueryEntity::cache_key(LlmQueryKey::new("m", "model", 0.0).with_schema("Verdict"));
        assert_ne!(plain, structured);
    }

    #[test]
    fn message_reply_round_trips_into_a_namespace_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            LlmQueryCache::new(Arc::new(CacheConfig::new(DEFAULT_PROFILE, dir.path())));

        let key = LlmQueryKey::new("hello", "gpt-5-mini", 1.0).with_namespace("ns");
        let reply = CachedReply::message("hi there");
        let path = cache.store(&reply, key).unwrap();
        assert!(path
            .to_string_lossy()
            .contains(&format!("llm_query_cache/{DEFAULT_PROFILE}/ns/")));

        assert_eq!(cache.load(key), Some(reply));

        let colder = LlmQueryKey::new("hello", "gpt-5-mini", 0.5).with_namespace("ns");
        assert!(cache.load(colder).is_none());
    }

    #[test]
    fn raw_reply_round_trips_without_tagging() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            LlmQueryCache::new(Arc::new(CacheConfig::new(DEFAULT_PROFILE, dir.path())));

        let key = LlmQueryKey::new("summarize", "gpt-5-mini", 0.0).with_schema("Summary");
        let reply = CachedReply::Raw(json!({"summary": "short", "score": 3}));
        cache.store(&reply, key).unwrap();
        assert_eq!(cache.load(key), Some(reply));
    }
}
