//! Concrete cache types.
//!
//! Each submodule covers one entity family: identity-keyed agent state,
//! composite-hashed model queries and remote API responses, diff-analysis
//! summaries, and binary analysis artifacts.

pub mod agent;
pub mod artifact;
pub mod diff;
pub mod llm;
pub mod remote;

pub use agent::{
    CheckResult, CheckResultCache, CheckStatus, DecompileTaskStateCache,
    FinalCheckTaskStateCache, RepoTaskStateCache,
};
pub use artifact::{
    DecompileKey, DecompiledCode, DecompiledCodeCache, DisasmDbCache, DisasmIndex,
    DisasmIndexCache, IndexedFunction,
};
pub use diff::{ChangeSummary, FileChange, FileChangeCache, OutOfFuncChangeCache, OutOfFuncKey};
pub use llm::{CachedReply, LlmQueryCache, LlmQueryKey};
pub use remote::{GitApiCache, GitApiRequest};

use crate::registry::CacheRegistry;

/// Bind every built-in cache type on a registry.
pub fn register_builtins(registry: &CacheRegistry) {
    registry.register::<CheckResultCache>();
    registry.register::<DecompileTaskStateCache>();
    registry.register::<RepoTaskStateCache>();
    registry.register::<FinalCheckTaskStateCache>();
    registry.register::<LlmQueryCache>();
    registry.register::<GitApiCache>();
    registry.register::<FileChangeCache>();
    registry.register::<OutOfFuncChangeCache>();
    registry.register::<DecompiledCodeCache>();
    registry.register::<DisasmIndexCache>();
    registry.register::<DisasmDbCache>();
}
