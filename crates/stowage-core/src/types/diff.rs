//! Diff-analysis caches: enriched per-file changes and out-of-function
//! change summaries. Both are shared across profiles and expire after 21
//! days, since diff enrichment evolves with the analysis pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CacheConfig;
use crate::keys::{sanitize_id, sha256_hex};
use crate::store::{CacheEntity, FileCache};

/// An enriched per-file change, cached by its change id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub change_id: String,
    pub old_path: String,
    pub new_path: String,
    pub patch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

pub struct FileChangeEntity;

impl CacheEntity for FileChangeEntity {
    type Value = FileChange;
    type KeyInput<'a> = &'a str;

    const CACHE_TYPE: &'static str = "file_change";

    fn base_dir(config: &CacheConfig) -> PathBuf {
        config.dataset_dir().join("file_change_cache")
    }

    fn cache_key(change_id: &str) -> String {
        sanitize_id(change_id)
    }

    fn serialize(value: &FileChange) -> Option<Value> {
        serde_json::to_value(value).ok()
    }

    fn deserialize(raw: Value) -> Option<FileChange> {
        serde_json::from_value(raw).ok()
    }
}

pub type FileChangeCache = FileCache<FileChangeEntity>;

/// Inputs identifying one out-of-function change summary.
///
/// The prompt participates through its own hash, so a prompt revision
/// invalidates summaries without blowing up the key length.
#[derive(Debug, Clone, Copy)]
pub struct OutOfFuncKey<'a> {
    pub prompt: &'a str,
    pub old_path: &'a str,
    pub new_path: &'a str,
    pub agent_id: &'a str,
}

/// Summary of a global-scope change (macros, struct declarations, globals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub summary: String,
    #[serde(default)]
    pub security_relevant: bool,
}

pub struct OutOfFuncChangeEntity;

impl CacheEntity for OutOfFuncChangeEntity {
    type Value = ChangeSummary;
    type KeyInput<'a> = OutOfFuncKey<'a>;

    const CACHE_TYPE: &'static str = "out_of_func_change";

    fn base_dir(config: &CacheConfig) -> PathBuf {
        config.dataset_dir().join("out_change_cache")
    }

    fn cache_key(input: OutOfFuncKey<'_>) -> String {
        let prompt_hash = sha256_hex(input.prompt);
        sha256_hex(&format!(
            "{old}##{new}##{prompt_hash}##{agent}",
            old = input.old_path,
            new = input.new_path,
            agent = input.agent_id,
        ))
    }

    fn serialize(value: &ChangeSummary) -> Option<Value> {
        serde_json::to_value(value).ok()
    }

    fn deserialize(raw: Value) -> Option<ChangeSummary> {
        serde_json::from_value(raw).ok()
    }
}

pub type OutOfFuncChangeCache = FileCache<OutOfFuncChangeEntity>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::DEFAULT_PROFILE;

    #[test]
    fn file_change_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            FileChangeCache::new(Arc::new(CacheConfig::new(DEFAULT_PROFILE, dir.path())));

        let change = FileChange {
            change_id: "commit-abc-src-main-c".to_owned(),
            old_path: "src/main.c".to_owned(),
            new_path: "src/main.c".to_owned(),
            patch: "@@ -1 +1 @@\n-old\n+new\n".to_owned(),
            summary: Some("renames a local".to_owned()),
        };
        cache.store(&change, &change.change_id.clone()).unwrap();
        assert_eq!(cache.load("commit-abc-src-main-c"), Some(change));
    }

    #[test]
    fn out_of_func_key_depends_on_every_input() {
        let base = OutOfFuncKey {
            prompt: "summarize this change",
            old_path: "a/defs.h",
            new_path: "b/defs.h",
            agent_id: "agent-1",
        };
        let base_key = OutOfFuncChangeEntity::cache_key(base);

        let other_prompt = OutOfFuncChangeEntity::cache_key(OutOfFuncKey {
            prompt: "summarize this change v2",
            ..base
        });
        let other_agent = OutOfFuncChangeEntity::cache_key(OutOfFuncKey {
            agent_id: "agent-2",
            ..base
        });
        assert_ne!(base_key, other_prompt);
        assert_ne!(base_key, other_agent);
        assert_eq!(base_key, OutOfFuncChangeEntity::cache_key(base));
    }

    #[test]
    fn summary_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache =
            OutOfFuncChangeCache::new(Arc::new(CacheConfig::new(DEFAULT_PROFILE, dir.path())));

        let key = OutOfFuncKey {
            prompt: "summarize",
            old_path: "a/x.h",
            new_path: "b/x.h",
            agent_id: "agent-1",
        };
        let summary = ChangeSummary {
            summary: "adds a bounds check macro".to_owned(),
            security_relevant: true,
        };
        cache.store(&summary, key).unwrap();
        assert_eq!(cache.load(key), Some(summary));
    }
}
