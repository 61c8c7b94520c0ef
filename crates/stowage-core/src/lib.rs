//! Cross-process persistent file cache layer.
//!
//! Memoizes expensive or external operations (model queries, remote API
//! calls, binary-analysis artifacts) to disk, safely shared by any number
//! of cooperating processes on the same filesystem tree:
//!
//! - Advisory shared/exclusive locking plus atomic temp-file-then-rename
//!   writes, so readers never see partial content
//! - TTL invalidation with an inclusive boundary (`None` never expires)
//! - Dual plain/compressed storage, backward compatible across toggles
//! - Per-type enable, sharing, and TTL policy through [`CacheConfig`]
//! - A type-safe [`CacheRegistry`] memoizing one instance per cache type
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use stowage_core::{CacheConfig, CacheRegistry};
//! use stowage_core::types::{self, CachedReply, LlmQueryCache, LlmQueryKey};
//!
//! let registry = CacheRegistry::new();
//! types::register_builtins(&registry);
//! registry.initialize(Arc::new(CacheConfig::new("default", "/data/dataset")));
//!
//! let cache = registry.get::<LlmQueryCache>()?;
//! let key = LlmQueryKey::new("hello", "gpt-5-mini", 1.0).with_namespace("ns");
//! cache.store(&CachedReply::message("hi there"), key);
//! let reply = cache.load(key);
//! # Ok::<(), stowage_core::RegistryError>(())
//! ```
//!
//! # Failure policy
//!
//! Only registry mis-wiring ([`RegistryError`]) is fail-fast. Every
//! steady-state cache operation fails soft: a disabled, cold, expired, or
//! broken cache surfaces as `None`/`false` and the caller recomputes.

pub mod config;
pub mod error;
pub mod fsio;
pub mod keys;
pub mod registry;
pub mod store;
pub mod types;

pub use config::{CacheConfig, CacheSettings, TtlOverride};
pub use error::{CacheIoError, RegistryError};
pub use registry::{CacheRegistry, RegistryEntry};
pub use store::{CacheEntity, FileCache};
