//! Private Files Vault - Directory Bundles
//!
//! A folder is packed into one uncompressed (stored) ZIP archive before
//! encryption and extracted again after decryption. Archives written by
//! other installations use the same layout, so their folder containers
//! decode here unchanged.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{VaultError, VaultResult};
use crate::secure_fs;

/// Pack the contents of `dir` into a new archive at `out`. Returns entry count.
pub fn pack(dir: &Path, out: &Path) -> VaultResult<u32> {
    if !dir.is_dir() {
        return Err(VaultError::NotFound(dir.display().to_string()));
    }

    let file = OpenOptions::new().write(true).create_new(true).open(out)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);

    let result = (move || -> VaultResult<u32> {
        let mut count = 0u32;

        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| VaultError::Io(e.into()))?;
            let file_type = entry.file_type();

            if file_type.is_symlink() {
                log::warn!("Skipping symlink in bundle: {}", entry.path().display());
                continue;
            }

            let name = relative_name(dir, entry.path())?;
            if file_type.is_dir() {
                zip.add_directory(name, options)?;
            } else {
                zip.start_file(name, options)?;
                let mut src = File::open(entry.path())?;
                io::copy(&mut src, &mut zip)?;
            }

            count = count
                .checked_add(1)
                .ok_or_else(|| VaultError::SerializationError("too many bundle entries".into()))?;
        }

        let mut writer = zip.finish()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(count)
    })();

    if result.is_err() {
        secure_fs::remove_quietly(out);
    }
    result
}

/// Extract `bundle` into the directory `dest` (created if missing).
/// Existing files under `dest` are overwritten. Returns entry count.
pub fn unpack(bundle: &Path, dest: &Path) -> VaultResult<u32> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(bundle)?))?;
    let count = u32::try_from(archive.len())
        .map_err(|_| VaultError::MalformedContainer("too many bundle entries".into()))?;

    fs::create_dir_all(dest)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().replace('\\', "/");
        let is_dir = name.ends_with('/');
        let target = dest.join(safe_relative(name.trim_end_matches('/'))?);

        if is_dir {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(count)
}

fn relative_name(root: &Path, path: &Path) -> VaultResult<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| VaultError::SerializationError(format!("{} escapes bundle root", path.display())))?;

    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn safe_relative(name: &str) -> VaultResult<PathBuf> {
    let mut out = PathBuf::new();

    for part in name.split('/') {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(c)), None) => out.push(c),
            (Some(Component::CurDir), None) => {}
            _ => {
                return Err(VaultError::MalformedContainer(format!(
                    "unsafe bundle path: {}",
                    name
                )))
            }
        }
    }

    if out.as_os_str().is_empty() {
        return Err(VaultError::MalformedContainer("empty bundle path".into()));
    }
    Ok(out)
}
