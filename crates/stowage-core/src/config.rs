//! Per-type cache policy: enable flags, sharing, TTL overrides.
//!
//! A [`CacheConfig`] is built once (directly or through the
//! [`CacheSettings`] adapter) and then bound immutably to every cache
//! instance the registry hands out. Lookups are default-permissive: a cache
//! type nobody configured is enabled and shared.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Profile used when the caller does not name one.
pub const DEFAULT_PROFILE: &str = "default";

/// Normalize a cache type identifier for map lookups.
///
/// Lowercased, hyphens folded to underscores, so `"LLM-Query"` and
/// `"llm_query"` address the same policy entry.
pub fn normalize_type(cache_type: &str) -> String {
    cache_type.to_lowercase().replace('-', "_")
}

/// Map a cache type to its sharing group.
///
/// Several types share one sharing toggle (the two analysis-artifact caches
/// form one group). Unmapped types are their own group.
pub fn share_group(cache_type: &str) -> &str {
    match cache_type {
        "llm_query" => "llm_query_cache",
        "git_api" => "git_api_cache",
        "check_result" => "agent_cache",
        "di_task_state" => "di_agent_cache",
        "ro_task_state" => "ro_agent_cache",
        "fpc_task_state" => "fpc_agent_cache",
        "file_change" => "file_change_cache",
        "out_of_func_change" => "out_change_cache",
        "decompile_result" | "disasm_index" | "disasm_db" => "decompile_output",
        other => other,
    }
}

/// A TTL override: either a day count or an explicit "never expires".
///
/// Serialized as the string `"never"` or a bare day count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlOverride {
    /// Entries never expire, regardless of the type default.
    Never,
    /// Entries expire once strictly older than this many days.
    #[serde(untagged)]
    Days(u32),
}

impl TtlOverride {
    fn as_days(self) -> Option<u32> {
        match self {
            Self::Never => None,
            Self::Days(days) => Some(days),
        }
    }
}

/// Immutable-per-instance cache policy.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    profile: String,
    dataset_dir: PathBuf,
    load_enabled: BTreeMap<String, bool>,
    store_enabled: BTreeMap<String, bool>,
    shared: BTreeMap<String, bool>,
    ttl_overrides: BTreeMap<String, Option<u32>>,
}

impl CacheConfig {
    /// A permissive config: everything enabled, everything shared, type
    /// defaults for TTL.
    pub fn new(profile: impl Into<String>, dataset_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile: profile.into(),
            dataset_dir: dataset_dir.into(),
            load_enabled: BTreeMap::new(),
            store_enabled: BTreeMap::new(),
            shared: BTreeMap::new(),
            ttl_overrides: BTreeMap::new(),
        }
    }

    /// Build a config from an explicit settings shape.
    ///
    /// Field-by-field: only the enumerated fields of [`CacheSettings`] are
    /// consulted, so the consumed configuration surface is auditable.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        let mut config = Self::new(
            settings
                .profile
                .clone()
                .unwrap_or_else(|| DEFAULT_PROFILE.to_owned()),
            settings.dataset_dir.clone().unwrap_or_default(),
        );
        for (cache_type, enabled) in settings.load.entries() {
            if let Some(enabled) = enabled {
                config.set_load_enabled(cache_type, enabled);
            }
        }
        for (cache_type, enabled) in settings.store.entries() {
            if let Some(enabled) = enabled {
                config.set_store_enabled(cache_type, enabled);
            }
        }
        for (group, shared) in settings.shared.entries() {
            if let Some(shared) = shared {
                config.shared.insert(group.to_owned(), shared);
            }
        }
        for (cache_type, ttl) in settings.ttl.entries() {
            if let Some(ttl) = ttl {
                config.set_ttl_override(cache_type, ttl.as_days());
            }
        }
        config
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn dataset_dir(&self) -> &Path {
        &self.dataset_dir
    }

    /// Whether `load` is enabled for a cache type. Defaults to `true`.
    pub fn is_cache_load_enabled(&self, cache_type: &str) -> bool {
        self.load_enabled
            .get(&normalize_type(cache_type))
            .copied()
            .unwrap_or(true)
    }

    /// Whether `store` is enabled for a cache type. Defaults to `true`.
    pub fn is_cache_store_enabled(&self, cache_type: &str) -> bool {
        self.store_enabled
            .get(&normalize_type(cache_type))
            .copied()
            .unwrap_or(true)
    }

    /// Whether a cache type's entries are shared across profiles.
    ///
    /// The type's sharing group is consulted; `default` (normally the
    /// type's own declared default) applies when the group is unconfigured.
    pub fn is_cache_shared(&self, cache_type: &str, default: bool) -> bool {
        let group = share_group(&normalize_type(cache_type)).to_owned();
        self.shared.get(&group).copied().unwrap_or(default)
    }

    /// Effective TTL for a cache type: configured override, else `default`.
    ///
    /// An override of `None` means "never expires" and beats a numeric
    /// default.
    pub fn get_ttl(&self, cache_type: &str, default: Option<u32>) -> Option<u32> {
        match self.ttl_overrides.get(&normalize_type(cache_type)) {
            Some(&ttl) => ttl,
            None => default,
        }
    }

    pub fn set_load_enabled(&mut self, cache_type: &str, enabled: bool) {
        self.load_enabled.insert(normalize_type(cache_type), enabled);
    }

    pub fn set_store_enabled(&mut self, cache_type: &str, enabled: bool) {
        self.store_enabled
            .insert(normalize_type(cache_type), enabled);
    }

    /// Configure sharing for a whole group (see [`share_group`]).
    pub fn set_shared(&mut self, group: &str, shared: bool) {
        self.shared.insert(normalize_type(group), shared);
    }

    pub fn set_ttl_override(&mut self, cache_type: &str, ttl_days: Option<u32>) {
        self.ttl_overrides
            .insert(normalize_type(cache_type), ttl_days);
    }
}

/// Per-type on/off toggles, one named field per recognized cache type.
///
/// `None` means "not configured" and leaves the default in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheToggles {
    pub llm_query: Option<bool>,
    pub git_api: Option<bool>,
    pub check_result: Option<bool>,
    pub di_task_state: Option<bool>,
    pub ro_task_state: Option<bool>,
    pub fpc_task_state: Option<bool>,
    pub file_change: Option<bool>,
    pub out_of_func_change: Option<bool>,
    pub decompile_result: Option<bool>,
    pub disasm_index: Option<bool>,
    pub disasm_db: Option<bool>,
}

impl CacheToggles {
    fn entries(&self) -> [(&'static str, Option<bool>); 11] {
        [
            ("llm_query", self.llm_query),
            ("git_api", self.git_api),
            ("check_result", self.check_result),
            ("di_task_state", self.di_task_state),
            ("ro_task_state", self.ro_task_state),
            ("fpc_task_state", self.fpc_task_state),
            ("file_change", self.file_change),
            ("out_of_func_change", self.out_of_func_change),
            ("decompile_result", self.decompile_result),
            ("disasm_index", self.disasm_index),
            ("disasm_db", self.disasm_db),
        ]
    }
}

/// Per-group sharing toggles, one named field per sharing group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareToggles {
    pub llm_query_cache: Option<bool>,
    pub git_api_cache: Option<bool>,
    pub agent_cache: Option<bool>,
    pub di_agent_cache: Option<bool>,
    pub ro_agent_cache: Option<bool>,
    pub fpc_agent_cache: Option<bool>,
    pub file_change_cache: Option<bool>,
    pub out_change_cache: Option<bool>,
    pub decompile_output: Option<bool>,
}

impl ShareToggles {
    fn entries(&self) -> [(&'static str, Option<bool>); 9] {
        [
            ("llm_query_cache", self.llm_query_cache),
            ("git_api_cache", self.git_api_cache),
            ("agent_cache", self.agent_cache),
            ("di_agent_cache", self.di_agent_cache),
            ("ro_agent_cache", self.ro_agent_cache),
            ("fpc_agent_cache", self.fpc_agent_cache),
            ("file_change_cache", self.file_change_cache),
            ("out_change_cache", self.out_change_cache),
            ("decompile_output", self.decompile_output),
        ]
    }
}

/// Per-type TTL overrides. A field set to `null` in the source document
/// deserializes as [`TtlOverride::Never`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlOverrides {
    pub llm_query: Option<TtlOverride>,
    pub git_api: Option<TtlOverride>,
    pub check_result: Option<TtlOverride>,
    pub di_task_state: Option<TtlOverride>,
    pub ro_task_state: Option<TtlOverride>,
    pub fpc_task_state: Option<TtlOverride>,
    pub file_change: Option<TtlOverride>,
    pub out_of_func_change: Option<TtlOverride>,
    pub decompile_result: Option<TtlOverride>,
    pub disasm_index: Option<TtlOverride>,
    pub disasm_db: Option<TtlOverride>,
}

impl TtlOverrides {
    fn entries(&self) -> [(&'static str, Option<TtlOverride>); 11] {
        [
            ("llm_query", self.llm_query),
            ("git_api", self.git_api),
            ("check_result", self.check_result),
            ("di_task_state", self.di_task_state),
            ("ro_task_state", self.ro_task_state),
            ("fpc_task_state", self.fpc_task_state),
            ("file_change", self.file_change),
            ("out_of_func_change", self.out_of_func_change),
            ("decompile_result", self.decompile_result),
            ("disasm_index", self.disasm_index),
            ("disasm_db", self.disasm_db),
        ]
    }
}

/// External settings shape consumed by [`CacheConfig::from_settings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub profile: Option<String>,
    pub dataset_dir: Option<PathBuf>,
    pub load: CacheToggles,
    pub store: CacheToggles,
    pub shared: ShareToggles,
    pub ttl: TtlOverrides,
}
