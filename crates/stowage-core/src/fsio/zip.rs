//! Compressed cache entries: single-member ZIP archives.
//!
//! A compressed entry is a `.zip` file holding exactly one member. The
//! archive is assembled in memory and written through the locked atomic
//! write path, so compressed and plain entries share the same crash and
//! concurrency guarantees.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::CacheIoError;
use crate::fsio::lock::{read_locked, to_json_indented, write_locked, DEFAULT_JSON_INDENT};

/// Member name used when writing JSON into an archive at `path`.
///
/// The archive's own file name with the trailing `.zip` stripped, coerced to
/// a `.json` suffix: `entry.json.zip` -> `entry.json`, `entry.zip` ->
/// `entry.json`.
fn default_member_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "entry.json.zip".to_owned());
    let stem = name.strip_suffix(".zip").unwrap_or(&name);
    if stem.ends_with(".json") {
        stem.to_owned()
    } else {
        format!("{stem}.json")
    }
}

fn build_archive(member_name: &str, bytes: &[u8]) -> Result<Vec<u8>, CacheIoError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(member_name, options)?;
    writer.write_all(bytes)?;
    Ok(writer.finish()?.into_inner())
}

/// Decompress the first (and only) member of an archive's bytes.
fn extract_first_member(path: &Path, bytes: Vec<u8>) -> Result<Vec<u8>, CacheIoError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    if archive.is_empty() {
        return Err(CacheIoError::EmptyArchive {
            path: path.to_path_buf(),
        });
    }
    let mut member = archive.by_index(0)?;
    let mut out = Vec::with_capacity(member.size() as usize);
    member.read_to_end(&mut out)?;
    Ok(out)
}

/// Read and parse a JSON value from a single-member ZIP archive.
///
/// The archive bytes are read under a shared lock; decompression and
/// parsing happen after the lock is released. Returns `Ok(None)` if the
/// archive does not exist.
pub fn read_json_zip_locked(path: &Path) -> Result<Option<Value>, CacheIoError> {
    let Some(bytes) = read_locked(path)? else {
        return Ok(None);
    };
    let inner = extract_first_member(path, bytes)?;
    Ok(Some(serde_json::from_slice(&inner)?))
}

/// Write a JSON value as a single-member ZIP archive, atomically.
pub fn write_json_zip_locked(path: &Path, value: &Value) -> Result<(), CacheIoError> {
    let json = to_json_indented(value, DEFAULT_JSON_INDENT)?;
    let archive = build_archive(&default_member_name(path), &json)?;
    write_locked(path, &archive)
}

/// Compress an existing file on disk into a single-member ZIP archive.
///
/// The member keeps the source's file name, so the original can be
/// reconstructed from the archive alone. Used for binary artifacts that are
/// produced outside the cache layer and then stored.
pub fn zip_file(source: &Path, dest: &Path) -> Result<(), CacheIoError> {
    if !source.is_file() {
        return Err(CacheIoError::MissingSource {
            path: source.to_path_buf(),
        });
    }
    let bytes = std::fs::read(source)?;
    let member = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CacheIoError::MissingSource {
            path: source.to_path_buf(),
        })?;
    let archive = build_archive(&member, &bytes)?;
    write_locked(dest, &archive)
}

/// Extract the single member of an archive to a file on disk.
pub fn unzip_file(archive_path: &Path, dest: &Path) -> Result<(), CacheIoError> {
    let Some(bytes) = read_locked(archive_path)? else {
        return Err(CacheIoError::MissingSource {
            path: archive_path.to_path_buf(),
        });
    };
    let inner = extract_first_member(archive_path, bytes)?;
    write_locked(dest, &inner)
}
