//! Composite-hash cache for remote git-hosting API responses.
//!
//! Keyed by the canonical JSON of `{url, params}`; responses from the same
//! URL and parameters are deterministic, so entries are shared across
//! profiles and never expire by default. A convenience layer wraps each
//! response in a metadata envelope (url, params, fetched-at) on store and
//! unwraps it on load, tolerating entries written without the envelope.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::CacheConfig;
use crate::keys::sha256_hex;
use crate::store::{CacheEntity, FileCache};

/// One remote API request, identified by URL and query parameters.
#[derive(Debug, Clone, Copy)]
pub struct GitApiRequest<'a> {
    pub url: &'a str,
    pub params: Option<&'a Value>,
}

impl<'a> GitApiRequest<'a> {
    pub fn new(url: &'a str) -> Self {
        Self { url, params: None }
    }

    pub fn with_params(url: &'a str, params: &'a Value) -> Self {
        Self {
            url,
            params: Some(params),
        }
    }
}

pub struct GitApiEntity;

impl CacheEntity for GitApiEntity {
    type Value = Value;
    type KeyInput<'a> = GitApiRequest<'a>;

    const CACHE_TYPE: &'static str = "git_api";
    const DEFAULT_TTL_DAYS: Option<u32> = None;

    fn base_dir(config: &CacheConfig) -> PathBuf {
        config.dataset_dir().join("git_api_cache")
    }

    /// Hash of the canonical JSON of `{url, params}`.
    ///
    /// Object keys serialize in sorted order, so logically identical
    /// requests always hash identically.
    fn cache_key(request: GitApiRequest<'_>) -> String {
        let canonical = json!({
            "params": request.params.cloned().unwrap_or_else(|| json!({})),
            "url": request.url.trim(),
        });
        sha256_hex(&canonical.to_string())
    }

    fn serialize(value: &Value) -> Option<Value> {
        Some(value.clone())
    }

    fn deserialize(raw: Value) -> Option<Value> {
        Some(raw)
    }
}

pub type GitApiCache = FileCache<GitApiEntity>;

impl GitApiCache {
    /// Store a response wrapped in its request metadata.
    pub fn store_with_metadata(
        &self,
        response: &Value,
        request: GitApiRequest<'_>,
    ) -> Option<PathBuf> {
        let envelope = json!({
            "url": request.url,
            "params": request.params.cloned().unwrap_or_else(|| json!({})),
            "fetched_at": Utc::now().to_rfc3339(),
            "response": response,
        });
        self.store(&envelope, request)
    }

    /// Load just the response, unwrapping the metadata envelope.
    ///
    /// Entries written before the envelope existed are returned whole.
    pub fn load_response(&self, request: GitApiRequest<'_>) -> Option<Value> {
        self.load_response_within(request, None)
    }

    /// [`load_response`](Self::load_response) with a call-site TTL override.
    pub fn load_response_within(
        &self,
        request: GitApiRequest<'_>,
        max_age_days: Option<u32>,
    ) -> Option<Value> {
        let cached = self.load_with_max_age(request, max_age_days)?;
        match cached {
            Value::Object(mut map) if map.contains_key("response") => map.remove("response"),
            other => {
                warn!(url = request.url, "cached entry has no metadata envelope");
                Some(other)
            }
        }
    }
}
