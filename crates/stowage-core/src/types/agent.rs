//! Identity-keyed agent caches: check verdicts and resumable task state.
//!
//! All three types are profile-isolated by default (verdicts and task state
//! depend on the active profile's model choices) and never expire.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::CacheConfig;
use crate::keys::sanitize_id;
use crate::store::{CacheEntity, FileCache};

/// Verdict of a patch-presence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Applied,
    NotApplied,
    Unknown,
}

/// Result of one agent check run, cached by agent id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub reasoning: String,
    pub confidence: f64,
}

pub struct CheckResultEntity;

impl CacheEntity for CheckResultEntity {
    type Value = CheckResult;
    type KeyInput<'a> = &'a str;

    const CACHE_TYPE: &'static str = "check_result";
    const DEFAULT_TTL_DAYS: Option<u32> = None;
    const SHARED_BY_DEFAULT: bool = false;

    fn base_dir(config: &CacheConfig) -> PathBuf {
        config.dataset_dir().join("agent_cache")
    }

    fn cache_key(agent_id: &str) -> String {
        sanitize_id(agent_id)
    }

    fn serialize(value: &CheckResult) -> Option<Value> {
        serde_json::to_value(value).ok()
    }

    fn deserialize(raw: Value) -> Option<CheckResult> {
        serde_json::from_value(raw).ok()
    }
}

pub type CheckResultCache = FileCache<CheckResultEntity>;

/// Task state is an opaque map owned by the agent workflow; the cache only
/// guarantees it round-trips.
type TaskState = Map<String, Value>;

// Strip the prefix before sanitizing: sanitize_id maps `_` to the sentinel,
// so an already-prefixed id would otherwise get prefixed twice.
fn prefixed_key(prefix: &str, agent_id: &str) -> String {
    let bare = agent_id.strip_prefix(prefix).unwrap_or(agent_id);
    format!("{prefix}{id}", id = sanitize_id(bare))
}

/// Resumable task state of the decompile-interactor workflow, `DI_`-keyed.
pub struct DecompileTaskStateEntity;

impl CacheEntity for DecompileTaskStateEntity {
    type Value = TaskState;
    type KeyInput<'a> = &'a str;

    const CACHE_TYPE: &'static str = "di_task_state";
    const DEFAULT_TTL_DAYS: Option<u32> = None;
    const SHARED_BY_DEFAULT: bool = false;

    fn base_dir(config: &CacheConfig) -> PathBuf {
        config.dataset_dir().join("task_state_cache").join("di")
    }

    fn cache_key(agent_id: &str) -> String {
        prefixed_key("DI_", agent_id)
    }

    fn serialize(value: &TaskState) -> Option<Value> {
        Some(Value::Object(value.clone()))
    }

    fn deserialize(raw: Value) -> Option<TaskState> {
        match raw {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

pub type DecompileTaskStateCache = FileCache<DecompileTaskStateEntity>;

/// Resumable task state of the repo-operator workflow, `RO_`-keyed.
pub struct RepoTaskStateEntity;

impl CacheEntity for RepoTaskStateEntity {
    type Value = TaskState;
    type KeyInput<'a> = &'a str;

    const CACHE_TYPE: &'static str = "ro_task_state";
    const DEFAULT_TTL_DAYS: Option<u32> = None;
    const SHARED_BY_DEFAULT: bool = false;

    fn base_dir(config: &CacheConfig) -> PathBuf {
        config.dataset_dir().join("task_state_cache").join("ro")
    }

    fn cache_key(agent_id: &str) -> String {
        prefixed_key("RO_", agent_id)
    }

    fn serialize(value: &TaskState) -> Option<Value> {
        Some(Value::Object(value.clone()))
    }

    fn deserialize(raw: Value) -> Option<TaskState> {
        match raw {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

pub type RepoTaskStateCache = FileCache<RepoTaskStateEntity>;

/// Resumable task state of the final-check workflow, `FPC_`-keyed.
pub struct FinalCheckTaskStateEntity;

impl CacheEntity for FinalCheckTaskStateEntity {
    type Value = TaskState;
    type KeyInput<'a> = &'a str;

    const CACHE_TYPE: &'static str = "fpc_task_state";
    const DEFAULT_TTL_DAYS: Option<u32> = None;
    const SHARED_BY_DEFAULT: bool = false;

    fn base_dir(config: &CacheConfig) -> PathBuf {
        config.dataset_dir().join("task_state_cache").join("fpc")
    }

    fn cache_key(agent_id: &str) -> String {
        prefixed_key("FPC_", agent_id)
    }

    fn serialize(value: &TaskState) -> Option<Value> {
        Some(Value::Object(value.clone()))
    }

    fn deserialize(raw: Value) -> Option<TaskState> {
        match raw {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

pub type FinalCheckTaskStateCache = FileCache<FinalCheckTaskStateEntity>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::DEFAULT_PROFILE;

    fn config_at(dir: &std::path::Path) -> Arc<CacheConfig> {
        Arc::new(CacheConfig::new(DEFAULT_PROFILE, dir))
    }

    #[test]
    fn check_result_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CheckResultCache::new(config_at(dir.path()));

        let result = CheckResult {
            status: CheckStatus::Applied,
            reasoning: "upstream commit present in tree".to_owned(),
            confidence: 0.92,
        };
        cache.store(&result, "CVE-2022-40304-openssl").unwrap();
        assert_eq!(cache.load("CVE-2022-40304-openssl"), Some(result));
    }

    #[test]
    fn check_result_is_profile_isolated_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CheckResultCache::new(config_at(dir.path()));
        let path = cache
            .store(
                &CheckResult {
                    status: CheckStatus::Unknown,
                    reasoning: String::new(),
                    confidence: 0.0,
                },
                "id",
            )
            .unwrap();
        assert!(path
            .parent()
            .unwrap()
            .ends_with(format!("agent_cache/{DEFAULT_PROFILE}")));
    }

    #[test]
    fn task_state_keys_get_prefixed_once() {
        assert_eq!(
            DecompileTaskStateEntity::cache_key("job-7"),
            "DI_job-7"
        );
        assert_eq!(
            DecompileTaskStateEntity::cache_key("DI_job-7"),
            "DI_job-7"
        );
        assert_eq!(RepoTaskStateEntity::cache_key("job-7"), "RO_job-7");
        assert_eq!(FinalCheckTaskStateEntity::cache_key("FPC_job-7"), "FPC_job-7");
    }

    #[test]
    fn prefixed_ids_keep_their_own_entry_through_sanitization() {
        // the prefix underscore must survive; unsafe chars in the rest do not
        assert_eq!(
            DecompileTaskStateEntity::cache_key("DI_job 7"),
            "DI_job#7"
        );
        assert_eq!(
            DecompileTaskStateEntity::cache_key("job 7"),
            "DI_job#7"
        );

        let dir = tempfile::tempdir().unwrap();
        let cache = DecompileTaskStateCache::new(config_at(dir.path()));
        let mut state = Map::new();
        state.insert("step".to_owned(), json!(1));
        cache.store(&state, "job-9").unwrap();
        // callers holding the already-prefixed id reach the same entry
        assert_eq!(cache.load("DI_job-9"), Some(state));
    }

    #[test]
    fn task_state_round_trips_as_map() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RepoTaskStateCache::new(config_at(dir.path()));

        let mut state = Map::new();
        state.insert("step".to_owned(), json!(3));
        state.insert("branch".to_owned(), json!("fix/CVE-2024-1"));
        cache.store(&state, "job-7").unwrap();
        assert_eq!(cache.load("job-7"), Some(state.clone()));

        let fpc = FinalCheckTaskStateCache::new(config_at(dir.path()));
        fpc.store(&state, "job-7").unwrap();
        assert_eq!(fpc.load("job-7"), Some(state));
    }
}
