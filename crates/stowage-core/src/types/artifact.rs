//! Binary-analysis artifact caches.
//!
//! [`DecompiledCodeCache`] stores decompilation results as JSON, grouped
//! per analysis run through a hashed subdirectory. [`DisasmDbCache`] steps
//! outside the JSON contract entirely: it manages foreign disassembler
//! database files, preserving the source's bitness extension and probing a
//! fixed ordered list of format/compression permutations.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::CacheConfig;
use crate::fsio::{is_file_valid, safe_remove, zip_file};
use crate::keys::{sanitize_id, sha256_hex};
use crate::registry::RegistryEntry;
use crate::store::{CacheEntity, FileCache};

/// Inputs identifying one decompilation result.
#[derive(Debug, Clone, Copy)]
pub struct DecompileKey<'a> {
    pub agent_id: &'a str,
    pub project_id: &'a str,
    pub binary_name: &'a str,
}

/// Decompiled pseudocode for one binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompiledCode {
    pub binary: String,
    pub pseudocode: String,
    #[serde(default)]
    pub functions: Vec<String>,
}

pub struct DecompiledCodeEntity;

impl CacheEntity for DecompiledCodeEntity {
    type Value = DecompiledCode;
    type KeyInput<'a> = DecompileKey<'a>;

    const CACHE_TYPE: &'static str = "decompile_result";
    const DEFAULT_TTL_DAYS: Option<u32> = None;

    fn base_dir(config: &CacheConfig) -> PathBuf {
        config.dataset_dir().join("decompile_output")
    }

    /// `hash(agent_id + project_id)/<binary>_result` — one subdirectory per
    /// analysis run, so related decompilations sit together.
    fn cache_key(input: DecompileKey<'_>) -> String {
        let run = sha256_hex(&format!("{}{}", input.agent_id, input.project_id));
        format!("{run}/{binary}_result", binary = sanitize_id(input.binary_name))
    }

    fn serialize(value: &DecompiledCode) -> Option<Value> {
        serde_json::to_value(value).ok()
    }

    fn deserialize(raw: Value) -> Option<DecompiledCode> {
        serde_json::from_value(raw).ok()
    }
}

pub type DecompiledCodeCache = FileCache<DecompiledCodeEntity>;

impl DecompiledCodeCache {
    /// Directory holding all results of one agent/project run, created on
    /// demand.
    pub fn output_dir(&self, agent_id: &str, project_id: &str) -> PathBuf {
        let run = sha256_hex(&format!("{agent_id}{project_id}"));
        let dir = self.cache_dir().join(run);
        if let Err(err) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), %err, "cannot create decompile output dir");
        }
        dir
    }
}

/// One function recovered from a pre-indexed binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFunction {
    pub name: String,
    pub address: u64,
    #[serde(default)]
    pub callees: Vec<String>,
}

/// Pre-indexed metadata for one binary: functions, call edges, strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisasmIndex {
    pub functions: Vec<IndexedFunction>,
    #[serde(default)]
    pub strings: Vec<String>,
}

/// Cache for pre-indexing results, keyed by the binary's content hash.
///
/// Indexing is deterministic for the same binary, so entries are shared
/// and never expire. Shares the `decompile_output` policy group with the
/// other analysis-artifact caches.
pub struct DisasmIndexEntity;

impl CacheEntity for DisasmIndexEntity {
    type Value = DisasmIndex;
    type KeyInput<'a> = &'a str;

    const CACHE_TYPE: &'static str = "disasm_index";
    const DEFAULT_TTL_DAYS: Option<u32> = None;

    fn base_dir(config: &CacheConfig) -> PathBuf {
        config.dataset_dir().join("disasm_index_cache")
    }

    fn cache_key(binary_hash: &str) -> String {
        sanitize_id(binary_hash)
    }

    fn serialize(value: &DisasmIndex) -> Option<Value> {
        serde_json::to_value(value).ok()
    }

    fn deserialize(raw: Value) -> Option<DisasmIndex> {
        serde_json::from_value(raw).ok()
    }
}

pub type DisasmIndexCache = FileCache<DisasmIndexEntity>;

/// Extension/compression permutations a database entry may exist under,
/// probed in order: compressed 64-bit, plain 64-bit, compressed 32-bit,
/// plain 32-bit.
const DB_EXTENSIONS: [&str; 4] = [".i64.zip", ".i64", ".idb.zip", ".idb"];

/// Extensions accepted from a source file; anything else falls back to the
/// canonical one.
const SOURCE_EXTENSIONS: [&str; 2] = [".i64", ".idb"];

const CANONICAL_EXTENSION: &str = ".i64";

/// Cache for disassembler database files.
///
/// Bypasses the JSON contract: `store` copies or moves a database file
/// produced by the disassembler into the cache, `load` hands back the
/// cached path. The on-disk extension comes from the *source* file, since
/// `.i64` vs `.idb` encodes the binary's bitness and must survive caching.
pub struct DisasmDbCache {
    config: Arc<CacheConfig>,
}

impl RegistryEntry for DisasmDbCache {
    const CACHE_TYPE: &'static str = "disasm_db";

    fn from_config(config: Arc<CacheConfig>) -> Self {
        Self { config }
    }
}

impl DisasmDbCache {
    const DEFAULT_TTL_DAYS: Option<u32> = None;
    const SHARED_BY_DEFAULT: bool = true;
    const USE_COMPRESSION: bool = true;

    pub fn new(config: Arc<CacheConfig>) -> Self {
        Self { config }
    }

    fn cache_dir(&self) -> PathBuf {
        let base = self.config.dataset_dir().join("disasm_db_cache");
        if self
            .config
            .is_cache_shared(Self::CACHE_TYPE, Self::SHARED_BY_DEFAULT)
        {
            base
        } else {
            base.join(self.config.profile())
        }
    }

    /// Stem (no extension) all variants of a binary hash share.
    fn stem_path(&self, binary_hash: &str) -> PathBuf {
        self.cache_dir().join(sanitize_id(binary_hash))
    }

    fn variant(stem: &Path, ext: &str) -> PathBuf {
        let mut os = stem.as_os_str().to_owned();
        os.push(ext);
        PathBuf::from(os)
    }

    /// First existing variant, in the fixed probe order.
    fn resolve(&self, binary_hash: &str) -> Option<PathBuf> {
        let stem = self.stem_path(binary_hash);
        DB_EXTENSIONS
            .iter()
            .map(|ext| Self::variant(&stem, ext))
            .find(|candidate| candidate.is_file())
    }

    fn effective_ttl(&self, max_age_days: Option<u32>) -> Option<u32> {
        match max_age_days {
            Some(days) => Some(days),
            None => self
                .config
                .get_ttl(Self::CACHE_TYPE, Self::DEFAULT_TTL_DAYS),
        }
    }

    /// Path to the cached database, if present and within TTL.
    ///
    /// The caller decompresses `.zip` variants itself.
    pub fn load(&self, binary_hash: &str) -> Option<PathBuf> {
        self.load_with_max_age(binary_hash, None)
    }

    pub fn load_with_max_age(
        &self,
        binary_hash: &str,
        max_age_days: Option<u32>,
    ) -> Option<PathBuf> {
        if !self.config.is_cache_load_enabled(Self::CACHE_TYPE) {
            debug!(cache_type = Self::CACHE_TYPE, "cache loading disabled");
            return None;
        }
        let path = self.resolve(binary_hash)?;
        if !is_file_valid(&path, self.effective_ttl(max_age_days)) {
            return None;
        }
        Some(path)
    }

    /// Copy a database file into the cache, overwriting existing variants.
    pub fn store(&self, source: &Path, binary_hash: &str) -> Option<PathBuf> {
        self.store_with(source, binary_hash, true, false)
    }

    /// Full-control store: `overwrite=false` keeps an existing entry,
    /// `move_source=true` removes the source after caching.
    pub fn store_with(
        &self,
        source: &Path,
        binary_hash: &str,
        overwrite: bool,
        move_source: bool,
    ) -> Option<PathBuf> {
        if !self.config.is_cache_store_enabled(Self::CACHE_TYPE) {
            debug!(cache_type = Self::CACHE_TYPE, "cache storing disabled");
            return None;
        }
        if !overwrite {
            if let Some(existing) = self.resolve(binary_hash) {
                return Some(existing);
            }
        }
        if !source.is_file() {
            error!(source = %source.display(), "source database not found");
            return None;
        }

        // .i64 for 64-bit binaries, .idb for 32-bit; preserve whichever the
        // disassembler produced
        let src_ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .filter(|ext| SOURCE_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or_else(|| CANONICAL_EXTENSION.to_owned());

        let stem = self.stem_path(binary_hash);
        let dest = if Self::USE_COMPRESSION {
            let dest = Self::variant(&stem, &format!("{src_ext}.zip"));
            if let Err(err) = zip_file(source, &dest) {
                error!(
                    source = %source.display(),
                    dest = %dest.display(),
                    %err,
                    "failed to compress database into cache"
                );
                return None;
            }
            dest
        } else {
            let dest = Self::variant(&stem, &src_ext);
            if let Err(err) = self.copy_into_cache(source, &dest) {
                error!(
                    source = %source.display(),
                    dest = %dest.display(),
                    %err,
                    "failed to copy database into cache"
                );
                return None;
            }
            dest
        };

        self.remove_stale_variants(&stem, &dest);
        if move_source {
            if let Err(err) = fs::remove_file(source) {
                warn!(source = %source.display(), %err, "cached but could not remove source");
            }
        }
        Some(dest)
    }

    fn copy_into_cache(&self, source: &Path, dest: &Path) -> std::io::Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, dest).map(|_| ())
    }

    fn remove_stale_variants(&self, stem: &Path, keep: &Path) {
        for ext in DB_EXTENSIONS {
            let candidate = Self::variant(stem, ext);
            if candidate != keep
                && candidate.is_file()
                && !safe_remove(&candidate, self.config.dataset_dir())
            {
                warn!(path = %candidate.display(), "stale database variant not removed");
            }
        }
    }

    /// Remove every variant of a binary hash.
    pub fn invalidate(&self, binary_hash: &str) -> bool {
        let stem = self.stem_path(binary_hash);
        let root = self.config.dataset_dir();
        DB_EXTENSIONS
            .iter()
            .map(|ext| Self::variant(&stem, ext))
            .filter(|candidate| candidate.is_file())
            .all(|candidate| safe_remove(&candidate, root))
    }

    pub fn exists(&self, binary_hash: &str) -> bool {
        self.resolve(binary_hash).is_some()
    }

    pub fn is_valid(&self, binary_hash: &str, max_age_days: Option<u32>) -> bool {
        match self.resolve(binary_hash) {
            Some(path) => is_file_valid(&path, self.effective_ttl(max_age_days)),
            None => false,
        }
    }

    /// Remove cached databases, shallowly; `None` removes all, `Some(days)`
    /// only those older. Returns the number of files removed.
    pub fn clear(&self, max_age_days: Option<u32>) -> usize {
        let dir = self.cache_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        let root = self.config.dataset_dir();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if !DB_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
                continue;
            }
            let expired = match max_age_days {
                None => true,
                Some(days) => !is_file_valid(&path, Some(days)),
            };
            if expired && safe_remove(&path, root) {
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PROFILE;
    use crate::fsio::unzip_file;

    fn config_at(dir: &Path) -> Arc<CacheConfig> {
        Arc::new(CacheConfig::new(DEFAULT_PROFILE, dir))
    }

    #[test]
    fn decompile_key_groups_by_run_hash() {
        let key = DecompiledCodeEntity::cache_key(DecompileKey {
            agent_id: "agent-1",
            project_id: "proj-9",
            binary_name: "libxml2.so",
        });
        let run = sha256_hex("agent-1proj-9");
        assert_eq!(key, format!("{run}/libxml2#so_result"));
    }

    #[test]
    fn decompiled_code_round_trips_in_a_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DecompiledCodeCache::new(config_at(dir.path()));
        let key = DecompileKey {
            agent_id: "agent-1",
            project_id: "proj-9",
            binary_name: "server",
        };
        let code = DecompiledCode {
            binary: "server".to_owned(),
            pseudocode: "int main(void) { return 0; }".to_owned(),
            functions: vec!["main".to_owned()],
        };

        let path = cache.store(&code, key).unwrap();
        assert!(path.parent().unwrap().ends_with(sha256_hex("agent-1proj-9")));
        assert_eq!(cache.load(key), Some(code));
    }

    #[test]
    fn output_dir_matches_stored_entry_location() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DecompiledCodeCache::new(config_at(dir.path()));
        let key = DecompileKey {
            agent_id: "a",
            project_id: "p",
            binary_name: "bin",
        };
        let code = DecompiledCode {
            binary: "bin".to_owned(),
            pseudocode: String::new(),
            functions: Vec::new(),
        };

        let stored = cache.store(&code, key).unwrap();
        let out = cache.output_dir("a", "p");
        assert_eq!(stored.parent().unwrap(), out);
        assert!(out.is_dir());
    }

    #[test]
    fn index_round_trips_and_shares_the_artifact_policy_group() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CacheConfig::new(DEFAULT_PROFILE, dir.path());
        config.set_shared("decompile_output", false);
        let cache = DisasmIndexCache::new(Arc::new(config));

        let index = DisasmIndex {
            functions: vec![IndexedFunction {
                name: "main".to_owned(),
                address: 0x4010_f0,
                callees: vec!["parse_args".to_owned()],
            }],
            strings: vec!["usage: server [port]".to_owned()],
        };
        let path = cache.store(&index, "deadbeef").unwrap();
        // the group toggle reaches this type, so the profile dir appears
        assert!(path
            .parent()
            .unwrap()
            .ends_with(format!("disasm_index_cache/{DEFAULT_PROFILE}")));
        assert_eq!(cache.load("deadbeef"), Some(index));
    }

    fn write_db(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let payload: Vec<u8> = (0..u8::MAX).cycle().take(4096).collect();
        fs::write(&path, payload).unwrap();
        path
    }

    #[test]
    fn store_compresses_and_preserves_bitness_extension() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DisasmDbCache::new(config_at(dir.path()));
        let source = write_db(dir.path(), "scratch.idb");

        let cached = cache.store(&source, "deadbeef").unwrap();
        assert!(cached.to_string_lossy().ends_with("deadbeef.idb.zip"));
        assert!(source.is_file());
        assert_eq!(cache.load("deadbeef"), Some(cached.clone()));

        // the archive member restores the original database bytes
        let restored = dir.path().join("restored.idb");
        unzip_file(&cached, &restored).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), fs::read(&source).unwrap());
    }

    #[test]
    fn store_with_move_removes_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DisasmDbCache::new(config_at(dir.path()));
        let source = write_db(dir.path(), "scratch.i64");

        cache.store_with(&source, "cafe", true, true).unwrap();
        assert!(!source.exists());
        assert!(cache.exists("cafe"));
    }

    #[test]
    fn resolution_prefers_compressed_primary_format() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DisasmDbCache::new(config_at(dir.path()));
        let stem = cache.stem_path("hash");
        fs::create_dir_all(stem.parent().unwrap()).unwrap();
        fs::write(DisasmDbCache::variant(&stem, ".idb"), b"plain-32").unwrap();
        fs::write(DisasmDbCache::variant(&stem, ".i64.zip"), b"zip-64").unwrap();

        let resolved = cache.load("hash").unwrap();
        assert!(resolved.to_string_lossy().ends_with("hash.i64.zip"));
    }

    #[test]
    fn restoring_removes_stale_variants() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DisasmDbCache::new(config_at(dir.path()));

        let db32 = write_db(dir.path(), "a.idb");
        cache.store(&db32, "hash").unwrap();
        let db64 = write_db(dir.path(), "a.i64");
        let kept = cache.store(&db64, "hash").unwrap();

        assert!(kept.to_string_lossy().ends_with("hash.i64.zip"));
        let stem = cache.stem_path("hash");
        assert!(!DisasmDbCache::variant(&stem, ".idb.zip").exists());
    }

    #[test]
    fn invalidate_removes_every_variant() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DisasmDbCache::new(config_at(dir.path()));
        let stem = cache.stem_path("hash");
        fs::create_dir_all(stem.parent().unwrap()).unwrap();
        fs::write(DisasmDbCache::variant(&stem, ".idb"), b"x").unwrap();
        fs::write(DisasmDbCache::variant(&stem, ".i64"), b"y").unwrap();

        assert!(cache.invalidate("hash"));
        assert!(!cache.exists("hash"));
        // nothing left: still a success
        assert!(cache.invalidate("hash"));
    }

    #[test]
    fn clear_removes_only_database_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DisasmDbCache::new(config_at(dir.path()));
        let source = write_db(dir.path(), "s.i64");
        cache.store(&source, "one").unwrap();
        cache.store(&source, "two").unwrap();
        fs::write(cache.cache_dir().join("notes.txt"), b"keep me").unwrap();

        assert_eq!(cache.clear(None), 2);
        assert!(cache.cache_dir().join("notes.txt").is_file());
    }

    #[test]
    fn missing_source_is_a_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DisasmDbCache::new(config_at(dir.path()));
        assert!(cache
            .store(&dir.path().join("never-was.i64"), "hash")
            .is_none());
    }
}
