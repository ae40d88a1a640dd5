//! Private Files Vault - Filesystem Operations
//!
//! Path plumbing shared by the codec, the item model and the workflows:
//! idempotent deletes, tail truncation, collision-free naming and
//! scratch-file cleanup.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{VaultError, VaultResult};

/// File or directory exists
pub fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Delete a file or a whole directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path) -> VaultResult<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Best-effort delete for cleanup paths
pub fn remove_quietly(path: &Path) {
    if let Err(e) = remove_path(path) {
        log::warn!("Cleanup failed for {}: {}", path.display(), e);
    }
}

/// Cut `count` bytes off the end of a file (never below zero length)
pub fn truncate_tail(path: &Path, count: u64) -> VaultResult<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    file.set_len(len.saturating_sub(count))?;
    file.sync_all()?;
    Ok(())
}

/// Fresh unique path inside `dir` (nothing is created)
pub fn scratch_path(dir: &Path) -> PathBuf {
    dir.join(Uuid::new_v4().to_string())
}

/// Write through a temporary sibling and rename into place
pub fn write_atomic(path: &Path, data: &[u8]) -> VaultResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;

    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Total size of a file, or of every file below a directory
pub fn total_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

// ═══════════════════════════════════════════════════════════════════════════
// COLLISION-FREE NAMES
// ═══════════════════════════════════════════════════════════════════════════

/// `report.pdf` → `report (n).pdf`, probing files and directories alike.
/// Returns `path` unchanged when it is free.
pub fn next_available_file_name(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(OsString::from).unwrap_or_default();
    let ext = path.extension().map(OsString::from);

    next_available(path, |n| {
        let mut name = stem.clone();
        name.push(format!(" ({})", n));
        if let Some(ext) = &ext {
            name.push(".");
            name.push(ext);
        }
        path.with_file_name(name)
    })
}

/// `Photos` → `Photos (n)`. Extensions are not treated specially.
pub fn next_available_folder_name(path: &Path) -> PathBuf {
    let name = path.file_name().map(OsString::from).unwrap_or_default();

    next_available(path, |n| {
        let mut candidate = name.clone();
        candidate.push(format!(" ({})", n));
        path.with_file_name(candidate)
    })
}

/// Exponential probe for a free index, then binary search for the first
/// free one after the taken run. Gaps below the run are not reused.
fn next_available(path: &Path, candidate: impl Fn(u64) -> PathBuf) -> PathBuf {
    if !exists(path) {
        return path.to_path_buf();
    }

    let first = candidate(1);
    if !exists(&first) {
        return first;
    }

    // min is taken, max is untested
    let (mut min, mut max) = (1u64, 2u64);
    while exists(&candidate(max)) {
        min = max;
        max *= 2;
    }

    while max != min + 1 {
        let pivot = (min + max) / 2;
        if exists(&candidate(pivot)) {
            min = pivot;
        } else {
            max = pivot;
        }
    }

    candidate(max)
}

// ═══════════════════════════════════════════════════════════════════════════
// MOVE / COPY
// ═══════════════════════════════════════════════════════════════════════════

/// Move a file or directory. Falls back to copy + delete across devices.
pub fn move_path(from: &Path, to: &Path, overwrite: bool) -> VaultResult<()> {
    prepare_destination(from, to, overwrite)?;

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::debug!("rename {} failed ({}), copying", from.display(), e);
            copy_any(from, to)?;
            remove_path(from)
        }
    }
}

/// Copy a file or directory
pub fn copy_path(from: &Path, to: &Path, overwrite: bool) -> VaultResult<()> {
    prepare_destination(from, to, overwrite)?;
    copy_any(from, to)
}

/// Recursive directory copy; existing files in `to` are replaced
pub fn copy_dir_all(from: &Path, to: &Path) -> VaultResult<()> {
    fs::create_dir_all(to)?;

    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| VaultError::Io(e.into()))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|_| VaultError::NotFound(entry.path().display().to_string()))?;
        let target = to.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

fn prepare_destination(from: &Path, to: &Path, overwrite: bool) -> VaultResult<()> {
    if !exists(from) {
        return Err(VaultError::NotFound(from.display().to_string()));
    }

    if exists(to) {
        if !overwrite {
            return Err(VaultError::AlreadyExists(to.display().to_string()));
        }
        remove_path(to)?;
    }

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn copy_any(from: &Path, to: &Path) -> VaultResult<()> {
    if from.is_dir() {
        copy_dir_all(from, to)
    } else {
        fs::copy(from, to)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SCRATCH GUARD
// ═══════════════════════════════════════════════════════════════════════════

/// Deletes every tracked path when dropped, on success and failure alike.
#[derive(Debug, Default)]
pub struct ScratchFiles {
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a path and hand it back
    pub fn track(&mut self, path: PathBuf) -> PathBuf {
        self.paths.push(path.clone());
        path
    }

    /// Stop tracking a path that has been handed over to its owner
    pub fn release(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            remove_quietly(path);
        }
    }
}
