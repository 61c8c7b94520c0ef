//! Advisory-locked reads and atomic locked writes.
//!
//! Reads take a shared lock for the duration of one read; writes build the
//! new content in a temp file in the destination directory under an
//! exclusive lock, fsync it, and atomically rename it over the destination.
//! A reader therefore never observes a partially written file, and a crash
//! mid-write leaves the previous content (or nothing) intact.
//!
//! The optional merge closure on the write helpers is the only sanctioned
//! read-modify-write pattern: the existing content is read, merged, and
//! replaced inside a single exclusive-lock window.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use fs2::FileExt;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::CacheIoError;

/// Default indentation for JSON payloads.
pub const DEFAULT_JSON_INDENT: usize = 4;

/// Read a file's bytes under a shared lock.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn read_locked(path: &Path) -> Result<Option<Vec<u8>>, CacheIoError> {
    if !path.is_file() {
        return Ok(None);
    }
    let file = File::open(path)?;
    file.lock_shared()?;
    let mut buf = Vec::new();
    let result = (&file).read_to_end(&mut buf);
    let _ = file.unlock();
    result?;
    Ok(Some(buf))
}

/// Read and parse a JSON file under a shared lock.
pub fn read_json_locked(path: &Path) -> Result<Option<Value>, CacheIoError> {
    match read_locked(path)? {
        None => Ok(None),
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
    }
}

/// Write raw bytes atomically under an exclusive lock.
///
/// Parent directories are created as needed. The temp file lives in the
/// destination directory so the final rename stays on one filesystem.
pub fn write_locked(path: &Path, bytes: &[u8]) -> Result<(), CacheIoError> {
    write_locked_with(path, |_| Ok(bytes.to_vec()), false)
}

/// Core atomic write: lock a temp file, optionally hand the existing
/// destination bytes to `render`, write its output, fsync, rename.
pub(crate) fn write_locked_with(
    path: &Path,
    render: impl FnOnce(Option<Vec<u8>>) -> Result<Vec<u8>, CacheIoError>,
    read_existing: bool,
) -> Result<(), CacheIoError> {
    let parent = path.parent().ok_or_else(|| CacheIoError::NoParent {
        path: path.to_path_buf(),
    })?;
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.as_file().lock_exclusive()?;

    let existing = if read_existing && path.is_file() {
        match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(path = %path.display(), %err, "cannot read existing file for merge; writing fresh");
                None
            }
        }
    } else {
        None
    };

    let written = render(existing).and_then(|bytes| {
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        Ok(())
    });
    let _ = tmp.as_file().unlock();
    written?;

    tmp.persist(path).map_err(|e| CacheIoError::Io(e.error))?;
    Ok(())
}

/// Render a value as indented JSON bytes.
///
/// Indent zero produces compact output.
pub fn to_json_indented<T: Serialize>(value: &T, indent: usize) -> Result<Vec<u8>, CacheIoError> {
    if indent == 0 {
        return Ok(serde_json::to_vec(value)?);
    }
    let pad = " ".repeat(indent);
    let mut out = Vec::with_capacity(256);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut ser)?;
    Ok(out)
}

/// Write a JSON value atomically under an exclusive lock.
pub fn write_json_locked(path: &Path, value: &Value) -> Result<(), CacheIoError> {
    write_json_locked_indent(path, value, DEFAULT_JSON_INDENT)
}

/// [`write_json_locked`] with explicit indentation.
pub fn write_json_locked_indent(
    path: &Path,
    value: &Value,
    indent: usize,
) -> Result<(), CacheIoError> {
    let bytes = to_json_indented(value, indent)?;
    write_locked_with(path, |_| Ok(bytes), false)
}

/// Merge-on-write for JSON files.
///
/// If the destination already holds parseable JSON, `merge(new, existing)`
/// decides the content to write; otherwise the new value is written as-is.
/// The read, merge, and write all happen inside one exclusive-lock window.
pub fn write_json_locked_merge(
    path: &Path,
    value: &Value,
    merge: impl FnOnce(Value, Value) -> Value,
) -> Result<(), CacheIoError> {
    write_locked_with(
        path,
        |existing| {
            let merged = match existing.and_then(|bytes| parse_existing_json(path, &bytes)) {
                Some(old) => merge(value.clone(), old),
                None => value.clone(),
            };
            to_json_indented(&merged, DEFAULT_JSON_INDENT)
        },
        true,
    )
}

fn parse_existing_json(path: &Path, bytes: &[u8]) -> Option<Value> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(path = %path.display(), %err, "existing file is not valid json; skipping merge");
            None
        }
    }
}

/// Read a JSONL file (one JSON object per line) under a shared lock.
pub fn read_jsonl_locked(path: &Path) -> Result<Option<Vec<Value>>, CacheIoError> {
    let Some(bytes) = read_locked(path)? else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(&bytes);
    let mut items = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        items.push(serde_json::from_str(line)?);
    }
    Ok(Some(items))
}

fn render_jsonl(items: &[Value]) -> Result<Vec<u8>, CacheIoError> {
    let mut out = Vec::with_capacity(items.len() * 64);
    for item in items {
        serde_json::to_writer(&mut out, item)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Write a JSONL file atomically under an exclusive lock.
pub fn write_jsonl_locked(path: &Path, items: &[Value]) -> Result<(), CacheIoError> {
    write_locked_with(path, |_| render_jsonl(items), false)
}

/// Merge-on-write for JSONL files, e.g. `|new, old| { old.extend(new); old }`
/// turned around: the closure receives `(new, existing)` and returns the
/// lines to write.
pub fn write_jsonl_locked_merge(
    path: &Path,
    items: &[Value],
    merge: impl FnOnce(Vec<Value>, Vec<Value>) -> Vec<Value>,
) -> Result<(), CacheIoError> {
    write_locked_with(
        path,
        |existing| {
            let old = existing
                .map(|bytes| {
                    let text = String::from_utf8_lossy(&bytes);
                    text.lines()
                        .filter(|l| !l.trim().is_empty())
                        .filter_map(|l| serde_json::from_str(l.trim()).ok())
                        .collect::<Vec<Value>>()
                })
                .unwrap_or_default();
            let merged = merge(items.to_vec(), old);
            render_jsonl(&merged)
        },
        true,
    )
}
