//! The generic cache contract: one trait of hooks, one reusable store.
//!
//! A concrete cache type implements [`CacheEntity`] (descriptor constants
//! plus four hooks) and gets the whole storage algorithm from
//! [`FileCache`]: path resolution, dual-variant probing, TTL checks, locked
//! atomic writes, guarded deletion. Steady-state failures never escape as
//! errors; a broken or cold cache degrades to a miss.

use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::CacheConfig;
use crate::fsio::{
    is_file_valid, read_json_locked, read_json_zip_locked, safe_remove, write_json_locked,
    write_json_zip_locked,
};

/// Descriptor and hooks for one cached entity family.
///
/// The four hook functions are the only per-type logic; everything else is
/// provided by [`FileCache`].
pub trait CacheEntity {
    /// The in-memory value this cache stores.
    type Value;
    /// Domain arguments from which the cache key is derived.
    type KeyInput<'a>;

    /// Unique cache type identifier, used for registry lookup and policy.
    const CACHE_TYPE: &'static str;
    /// Default TTL in days; `None` never expires.
    const DEFAULT_TTL_DAYS: Option<u32> = Some(21);
    /// Whether entries are shared across profiles unless configured otherwise.
    const SHARED_BY_DEFAULT: bool = true;
    /// Canonical file extension, without the dot.
    const FILE_EXTENSION: &'static str = "json";
    /// Whether new entries are written as compressed companions.
    const USE_COMPRESSION: bool = false;

    /// Directory for this type's entries, relative roots resolved against
    /// the dataset dir. No profile component; [`FileCache`] appends that.
    fn base_dir(config: &CacheConfig) -> PathBuf;

    /// Derive the filesystem-safe key. May embed one `/` namespace segment.
    fn cache_key(input: Self::KeyInput<'_>) -> String;

    /// Convert a value to its JSON payload. `None` signals failure and
    /// aborts the store.
    fn serialize(value: &Self::Value) -> Option<Value>;

    /// Reconstruct a value from its JSON payload. `None` is a miss.
    fn deserialize(raw: Value) -> Option<Self::Value>;
}

/// The stored variant a key resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub path: PathBuf,
    pub compressed: bool,
}

/// Generic file-backed cache for one [`CacheEntity`].
///
/// Stateless beyond its bound config: no in-memory entry cache, so any
/// number of processes can operate on the same tree.
pub struct FileCache<E: CacheEntity> {
    config: Arc<CacheConfig>,
    _entity: PhantomData<fn() -> E>,
}

// manual impl: a derive would demand E: Debug, which entity markers never need
impl<E: CacheEntity> fmt::Debug for FileCache<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCache")
            .field("cache_type", &E::CACHE_TYPE)
            .field("profile", &self.config.profile())
            .field("dataset_dir", &self.config.dataset_dir())
            .finish()
    }
}

impl<E: CacheEntity> FileCache<E> {
    pub fn new(config: Arc<CacheConfig>) -> Self {
        Self {
            config,
            _entity: PhantomData,
        }
    }

    pub fn config(&self) -> &Arc<CacheConfig> {
        &self.config
    }

    /// Directory holding this type's entries, with the profile suffix iff
    /// the type is not shared under the current config.
    pub fn cache_dir(&self) -> PathBuf {
        let base = E::base_dir(&self.config);
        if self
            .config
            .is_cache_shared(E::CACHE_TYPE, E::SHARED_BY_DEFAULT)
        {
            base
        } else {
            base.join(self.config.profile())
        }
    }

    /// Canonical (uncompressed) path for a key. Compression is a storage
    /// detail resolved at read/write time, not part of the logical path.
    ///
    /// Pure path arithmetic: parent directories are created by the write
    /// path, so read-side operations leave the filesystem untouched.
    pub fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir()
            .join(format!("{key}.{ext}", ext = E::FILE_EXTENSION))
    }

    fn compressed_companion(canonical: &Path) -> PathBuf {
        let mut os = canonical.as_os_str().to_owned();
        os.push(".zip");
        PathBuf::from(os)
    }

    /// Probe the compressed companion first, then the canonical file.
    ///
    /// Unconditional (not gated by `USE_COMPRESSION`) so toggling
    /// compression stays backward compatible with existing entries.
    fn resolve_variant(&self, canonical: &Path) -> Option<ResolvedEntry> {
        let zipped = Self::compressed_companion(canonical);
        if zipped.is_file() {
            return Some(ResolvedEntry {
                path: zipped,
                compressed: true,
            });
        }
        if canonical.is_file() {
            return Some(ResolvedEntry {
                path: canonical.to_path_buf(),
                compressed: false,
            });
        }
        None
    }

    /// TTL in effect: call-site override, else config override, else the
    /// type default.
    fn effective_ttl(&self, max_age_days: Option<u32>) -> Option<u32> {
        match max_age_days {
            Some(days) => Some(days),
            None => self.config.get_ttl(E::CACHE_TYPE, E::DEFAULT_TTL_DAYS),
        }
    }

    /// Load a cached value, honoring the type's effective TTL.
    pub fn load(&self, input: E::KeyInput<'_>) -> Option<E::Value> {
        self.load_with_max_age(input, None)
    }

    /// [`load`](Self::load) with a call-site TTL override in days.
    pub fn load_with_max_age(
        &self,
        input: E::KeyInput<'_>,
        max_age_days: Option<u32>,
    ) -> Option<E::Value> {
        if !self.config.is_cache_load_enabled(E::CACHE_TYPE) {
            debug!(cache_type = E::CACHE_TYPE, "cache loading disabled");
            return None;
        }
        let key = E::cache_key(input);
        let canonical = self.cache_path(&key);
        let entry = self.resolve_variant(&canonical)?;
        if !is_file_valid(&entry.path, self.effective_ttl(max_age_days)) {
            debug!(cache_type = E::CACHE_TYPE, key, "cache entry expired");
            return None;
        }
        let raw = if entry.compressed {
            read_json_zip_locked(&entry.path)
        } else {
            read_json_locked(&entry.path)
        };
        match raw {
            Ok(Some(value)) => E::deserialize(value),
            Ok(None) => None,
            Err(err) => {
                warn!(
                    cache_type = E::CACHE_TYPE,
                    path = %entry.path.display(),
                    %err,
                    "failed to read cache entry; treating as miss"
                );
                None
            }
        }
    }

    /// Store a value, overwriting any existing entry.
    ///
    /// Returns the written path, or `None` when storing is disabled,
    /// serialization fails, or I/O fails.
    pub fn store(&self, value: &E::Value, input: E::KeyInput<'_>) -> Option<PathBuf> {
        self.store_with_override(value, input, true)
    }

    /// Store only if no variant exists yet; an existing entry's path is
    /// returned untouched.
    pub fn store_if_absent(&self, value: &E::Value, input: E::KeyInput<'_>) -> Option<PathBuf> {
        self.store_with_override(value, input, false)
    }

    fn store_with_override(
        &self,
        value: &E::Value,
        input: E::KeyInput<'_>,
        overwrite: bool,
    ) -> Option<PathBuf> {
        if !self.config.is_cache_store_enabled(E::CACHE_TYPE) {
            debug!(cache_type = E::CACHE_TYPE, "cache storing disabled");
            return None;
        }
        let key = E::cache_key(input);
        let canonical = self.cache_path(&key);
        if !overwrite {
            if let Some(existing) = self.resolve_variant(&canonical) {
                debug!(
                    cache_type = E::CACHE_TYPE,
                    key, "entry already cached; keeping existing"
                );
                return Some(existing.path);
            }
        }
        let Some(payload) = E::serialize(value) else {
            error!(cache_type = E::CACHE_TYPE, key, "serialization failed; nothing stored");
            return None;
        };

        let zipped = Self::compressed_companion(&canonical);
        let (target, stale) = if E::USE_COMPRESSION {
            (zipped.clone(), canonical.clone())
        } else {
            (canonical.clone(), zipped.clone())
        };
        let written = if E::USE_COMPRESSION {
            write_json_zip_locked(&target, &payload)
        } else {
            write_json_locked(&target, &payload)
        };
        if let Err(err) = written {
            error!(
                cache_type = E::CACHE_TYPE,
                path = %target.display(),
                %err,
                "failed to write cache entry"
            );
            return None;
        }
        if stale.is_file() && !safe_remove(&stale, self.config.dataset_dir()) {
            warn!(
                cache_type = E::CACHE_TYPE,
                path = %stale.display(),
                "stale sibling variant not removed"
            );
        }
        Some(target)
    }

    /// Remove both variants of an entry.
    ///
    /// Returns `true` when nothing is left on disk afterward.
    pub fn invalidate(&self, input: E::KeyInput<'_>) -> bool {
        let key = E::cache_key(input);
        let canonical = self.cache_path(&key);
        let zipped = Self::compressed_companion(&canonical);
        let root = self.config.dataset_dir();
        let mut ok = true;
        for variant in [canonical, zipped] {
            if variant.is_file() {
                ok &= safe_remove(&variant, root);
            }
        }
        ok
    }

    /// Whether any variant exists, regardless of age.
    pub fn exists(&self, input: E::KeyInput<'_>) -> bool {
        let key = E::cache_key(input);
        self.resolve_variant(&self.cache_path(&key)).is_some()
    }

    /// Whether an entry exists and is within its effective TTL.
    pub fn is_valid(&self, input: E::KeyInput<'_>) -> bool {
        self.is_valid_within(input, None)
    }

    /// [`is_valid`](Self::is_valid) with a call-site TTL override.
    pub fn is_valid_within(&self, input: E::KeyInput<'_>, max_age_days: Option<u32>) -> bool {
        let key = E::cache_key(input);
        match self.resolve_variant(&self.cache_path(&key)) {
            Some(entry) => is_file_valid(&entry.path, self.effective_ttl(max_age_days)),
            None => false,
        }
    }

    /// Remove entries from the cache directory, shallowly.
    ///
    /// `None` clears every entry of either variant; `Some(days)` clears
    /// only entries older than the given age. Returns the number of files
    /// removed.
    pub fn clear(&self, max_age_days: Option<u32>) -> usize {
        let dir = self.cache_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };
        let plain_suffix = format!(".{}", E::FILE_EXTENSION);
        let zip_suffix = format!(".{}.zip", E::FILE_EXTENSION);
        let root = self.config.dataset_dir();
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if !name.ends_with(&plain_suffix) && !name.ends_with(&zip_suffix) {
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
