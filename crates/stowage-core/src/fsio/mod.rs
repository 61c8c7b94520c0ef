//! Locked file I/O: the only code in the crate that touches the disk.
//!
//! Split by concern: [`lock`] for advisory-locked reads and atomic writes,
//! [`zip`] for single-member compressed entries, [`guard`] for deletion
//! containment and TTL checks.

pub mod guard;
pub mod lock;
pub mod zip;

pub use guard::{file_age_days, is_age_valid, is_file_valid, safe_remove};
pub use lock::{
    read_json_locked, read_jsonl_locked, read_locked, write_json_locked, write_json_locked_merge,
    write_jsonl_locked, write_jsonl_locked_merge, write_locked,
};
pub use zip::{read_json_zip_locked, unzip_file, write_json_zip_locked, zip_file};
