//! Private Files Vault - Password Rotation & Storage Relocation
//!
//! Both walk the catalog one entry at a time. A failing entry is logged and
//! skipped; nothing is rolled back, so a partial rotation leaves the skipped
//! containers sealed under the old password.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::config::StoragePaths;
use crate::error::{VaultError, VaultResult};
use crate::secure_fs::{self, ScratchFiles};
use crate::vault::{reseal, Vault};

/// An entry a rotation or relocation could not handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub error: String,
}

/// Password rotation summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationReport {
    pub rotated: usize,
    pub skipped: Vec<SkippedEntry>,
    pub finished_at: DateTime<Utc>,
}

impl RotationReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Storage relocation summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelocationReport {
    pub new_root: PathBuf,
    pub moved: usize,
    pub skipped: Vec<SkippedEntry>,
    pub finished_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════
// PASSWORD ROTATION
// ═══════════════════════════════════════════════════════════════════════════

/// Re-seal every catalogued container from `old` to `new`, in place.
///
/// The vault switches to `new` before the first container is touched.
/// Footer metadata and thumbnails are carried over unchanged.
pub fn rotate_password(vault: &Vault, old: &str, new: &str) -> VaultResult<RotationReport> {
    let entries = vault.catalog().list_all()?;
    vault.set_password(SecretString::new(new.to_string()));

    log::info!("Rotating password for {} containers", entries.len());

    let temp = vault.paths().temp();
    let mut rotated = 0;
    let mut skipped = Vec::new();

    for entry in entries {
        let path = PathBuf::from(&entry.path);
        match rotate_one(&path, old, new, &temp) {
            Ok(()) => rotated += 1,
            Err(e) => {
                log::warn!("Skipping rotation of {}: {}", path.display(), e);
                skipped.push(SkippedEntry {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }

    log::info!("Rotation done: {} rotated, {} skipped", rotated, skipped.len());
    Ok(RotationReport {
        rotated,
        skipped,
        finished_at: Utc::now(),
    })
}

fn rotate_one(container: &Path, old: &str, new: &str, temp: &Path) -> VaultResult<()> {
    let mut scratch = ScratchFiles::new();
    let resealed = scratch.track(secure_fs::scratch_path(temp));

    reseal(container, &resealed, old, new, temp)?;
    secure_fs::move_path(&resealed, container, true)?;
    scratch.release(&resealed);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// STORAGE RELOCATION
// ═══════════════════════════════════════════════════════════════════════════

/// Move every catalogued container under `new_root` and switch the vault
/// to it. The catalog follows each container as it moves.
pub fn relocate_storage(vault: &Vault, new_root: impl Into<PathBuf>) -> VaultResult<RelocationReport> {
    let new_root = new_root.into();
    let target = StoragePaths::new(&new_root);
    target.ensure_dirs()?;

    let entries = vault.catalog().list_all()?;
    log::info!(
        "Relocating {} containers to {}",
        entries.len(),
        new_root.display()
    );

    let mut moved = 0;
    let mut skipped = Vec::new();

    for entry in entries {
        let path = PathBuf::from(&entry.path);
        match relocate_one(vault, &path, &target) {
            Ok(()) => moved += 1,
            Err(e) => {
                log::warn!("Skipping relocation of {}: {}", path.display(), e);
                skipped.push(SkippedEntry {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }

    vault.set_storage_root(&new_root)?;

    Ok(RelocationReport {
        new_root,
        moved,
        skipped,
        finished_at: Utc::now(),
    })
}

fn relocate_one(vault: &Vault, old: &Path, target: &StoragePaths) -> VaultResult<()> {
    let name = old
        .file_name()
        .ok_or_else(|| VaultError::NotFound(old.display().to_string()))?;
    let new = target.encrypted().join(name);
    if new == old {
        return Ok(());
    }

    secure_fs::copy_path(old, &new, true)?;
    vault.catalog().update_path(old, &new)?;

    if let Err(e) = secure_fs::remove_path(old) {
        log::warn!("Relocated {} but could not delete it: {}", old.display(), e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::config::VaultConfig;
    use crate::item::{Privacy, VaultItem};
    use crate::kind::FileKind;
    use crate::probe::ImageProbe;
    use std::fs;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn vault_in(dir: &TempDir, password: &str) -> Vault {
        let vault = Vault::new(
            StoragePaths::new(dir.path().join("Storage")),
            Arc::new(SqliteCatalog::open_in_memory().unwrap()),
            Arc::new(ImageProbe),
            VaultConfig::default(),
        )
        .unwrap();
        vault.set_password(SecretString::new(password.into()));
        vault
    }

    fn encode(vault: &Vault, path: &Path, data: &[u8]) -> VaultItem {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
        let mut item = VaultItem::from_input(path);
        vault.encode_one(&mut item).unwrap();
        item
    }

    #[test]
    fn test_rotate_password() {
        let dir = tempdir().unwrap();
        let vault = vault_in(&dir, "old-pw");

        let text = encode(&vault, &dir.path().join("in/a.txt"), b"first file");
        let pic_path = dir.path().join("in/pic.png");
        image::RgbImage::new(40, 20).save(&pic_path).unwrap();
        let mut pic = VaultItem::from_input(&pic_path);
        vault.encode_one(&mut pic).unwrap();
        let thumb = pic.thumbnail().unwrap().to_vec();

        // registered but gone from disk
        let ghost = vault.paths().encrypted().join("ghost");
        vault.catalog().add(&ghost, FileKind::Document, Privacy::None).unwrap();

        let report = rotate_password(&vault, "old-pw", "new-pw").unwrap();
        assert_eq!(report.rotated, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, ghost);
        assert!(!report.is_complete());

        let mut text = VaultItem::from_entry(
            &vault.catalog().find_by_path(text.at_rest().path().unwrap()).unwrap().unwrap(),
        );
        let recovered = vault.decode_one(&mut text).unwrap();
        assert_eq!(fs::read(recovered).unwrap(), b"first file");
        assert_eq!(text.display_name(), "a.txt");

        let mut pic = VaultItem::from_entry(
            &vault.catalog().find_by_path(pic.at_rest().path().unwrap()).unwrap().unwrap(),
        );
        let pic_at_rest = pic.at_rest().path().unwrap().to_path_buf();
        assert!(pic.try_load_footer(&pic_at_rest));
        assert_eq!(pic.thumbnail().unwrap(), &thumb[..]);
        assert_eq!((pic.extras().width, pic.extras().height), (40, 20));

        vault.set_password(SecretString::new("old-pw".into()));
        assert!(vault.decode_one(&mut text).unwrap_err().needs_password_retry());
    }

    #[test]
    fn test_relocate_storage() {
        let dir = tempdir().unwrap();
        let vault = vault_in(&dir, "pw");
        let a = encode(&vault, &dir.path().join("in/a.txt"), b"aaa");
        let b = encode(&vault, &dir.path().join("in/b.txt"), b"bbb");
        let old_a = a.at_rest().path().unwrap().to_path_buf();

        let new_root = dir.path().join("Moved");
        let report = relocate_storage(&vault, &new_root).unwrap();
        assert_eq!(report.moved, 2);
        assert!(report.skipped.is_empty());
        assert_eq!(vault.paths().root(), new_root.as_path());

        assert!(!old_a.exists());
        let new_a = new_root.join("Encrypted").join(a.id());
        assert!(new_a.exists());
        assert!(vault.catalog().find_by_path(&old_a).unwrap().is_none());

        let mut moved_b = VaultItem::from_entry(
            &vault
                .catalog()
                .find_by_path(&new_root.join("Encrypted").join(b.id()))
                .unwrap()
                .unwrap(),
        );
        let recovered = vault.decode_one(&mut moved_b).unwrap();
        assert!(recovered.starts_with(new_root.join("Recovery")));
        assert_eq!(fs::read(recovered).unwrap(), b"bbb");
    }
}
