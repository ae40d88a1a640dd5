//! Private Files Vault - Vault Items
//!
//! One user file or folder across its three locations: the plaintext input,
//! the at-rest container and the ephemeral recovered copy. Each location is
//! a lazily loaded projection that is refreshed on its own.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{Catalog, CatalogEntry};
use crate::error::VaultResult;
use crate::footer::{Extras, Footer};
use crate::kind::FileKind;
use crate::secure_fs;
use crate::thumbs::ThumbnailEngine;

// ═══════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════

/// Thumbnail display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Privacy {
    #[default]
    None,
    Blurred,
}

impl Privacy {
    /// Catalog code
    pub fn code(self) -> i64 {
        match self {
            Privacy::None => 0,
            Privacy::Blurred => 1,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Privacy::Blurred,
            _ => Privacy::None,
        }
    }
}

/// Processing status. Only the batch pipeline moves items between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ItemStatus {
    #[default]
    Ready,
    Queued,
    Processing,
    Processed,
    Failed,
    /// Label only; in-flight work is not interrupted
    Paused,
    /// Label only; in-flight work is not interrupted
    Stopped,
}

impl ItemStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, ItemStatus::Processed | ItemStatus::Failed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOCATION SLOTS
// ═══════════════════════════════════════════════════════════════════════════

/// Filesystem facts about one location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub exists: bool,
    pub is_dir: bool,
    /// File length, or total file bytes below a directory
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl SlotInfo {
    fn load(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(meta) => Self {
                exists: true,
                is_dir: meta.is_dir(),
                size: if meta.is_dir() {
                    secure_fs::total_size(path)
                } else {
                    meta.len()
                },
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
            },
            Err(_) => Self {
                exists: false,
                is_dir: false,
                size: 0,
                modified: None,
            },
        }
    }
}

/// A path plus its cached [`SlotInfo`]
#[derive(Debug, Clone, Default)]
pub struct LocationSlot {
    path: Option<PathBuf>,
    info: Option<SlotInfo>,
}

impl LocationSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            info: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Point at a new path; drops the cached info
    pub fn set(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
        self.info = None;
    }

    pub fn clear(&mut self) {
        self.path = None;
        self.info = None;
    }

    /// Cached info, loaded on first use
    pub fn info(&mut self) -> Option<&SlotInfo> {
        let path = self.path.as_deref()?;
        if self.info.is_none() {
            self.info = Some(SlotInfo::load(path));
        }
        self.info.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.info = None;
    }

    pub fn reload(&mut self) -> Option<&SlotInfo> {
        self.invalidate();
        self.info()
    }

    /// Fresh existence check, bypassing the cache
    pub fn exists_now(&self) -> bool {
        self.path.as_deref().map(secure_fs::exists).unwrap_or(false)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// VAULT ITEM
// ═══════════════════════════════════════════════════════════════════════════

/// A file or folder known to the vault
#[derive(Debug, Clone)]
pub struct VaultItem {
    id: String,
    kind: FileKind,
    privacy: Privacy,
    status: ItemStatus,
    is_corrupted: bool,
    /// Container that did not open with the vault password
    needs_password: bool,
    error_text: Option<String>,
    /// Original full path, as recorded in the footer
    original_name: Option<String>,
    thumbnail: Option<Vec<u8>>,
    extras: Extras,
    input: LocationSlot,
    at_rest: LocationSlot,
    recovered: LocationSlot,
}

impl VaultItem {
    fn blank(id: String, kind: FileKind) -> Self {
        Self {
            id,
            kind,
            privacy: Privacy::None,
            status: ItemStatus::Ready,
            is_corrupted: false,
            needs_password: false,
            error_text: None,
            original_name: None,
            thumbnail: None,
            extras: Extras::default(),
            input: LocationSlot::default(),
            at_rest: LocationSlot::default(),
            recovered: LocationSlot::default(),
        }
    }

    /// New item for a user-supplied path, with a fresh opaque id
    pub fn from_input(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut item = Self::blank(Uuid::new_v4().to_string(), FileKind::from_path(&path));
        item.original_name = Some(path.display().to_string());
        item.input = LocationSlot::new(path);
        item
    }

    /// Item for a catalog entry; the id is the at-rest file name
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        let path = PathBuf::from(&entry.path);
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut item = Self::blank(id, entry.kind);
        item.privacy = entry.privacy;
        item.at_rest = LocationSlot::new(path);
        item
    }

    /// Populate kind, name, thumbnail and extras from a container footer.
    /// Returns `false` when `path` is not a readable container.
    pub fn try_load_footer(&mut self, path: &Path) -> bool {
        match Footer::read(path) {
            Some(footer) => {
                self.apply_footer(&footer);
                true
            }
            None => false,
        }
    }

    pub(crate) fn apply_footer(&mut self, footer: &Footer) {
        self.kind = footer.kind();
        self.original_name = Some(footer.original_name().to_string());
        self.thumbnail = footer.thumbnail().map(|t| t.to_vec());
        self.extras = footer.extras().clone();
    }

    /// Remove the catalog entry and every location on disk.
    /// Safe to call repeatedly.
    pub fn destroy(&mut self, catalog: &dyn Catalog) -> VaultResult<()> {
        if let Some(path) = self.at_rest.path() {
            catalog.remove(path)?;
        }

        for slot in [&mut self.input, &mut self.at_rest] {
            if let Some(path) = slot.path() {
                secure_fs::remove_path(path)?;
            }
            slot.invalidate();
        }
        self.clear_recovered();

        log::debug!("Destroyed item {}", self.id);
        Ok(())
    }

    /// Delete the recovered working copy, if any
    pub fn clear_recovered(&mut self) {
        if let Some(path) = self.recovered.path() {
            secure_fs::remove_quietly(path);
            // per-item folder under Recovery
            if let Some(parent) = path.parent() {
                if parent.file_name().map(|n| n == self.id.as_str()).unwrap_or(false) {
                    secure_fs::remove_quietly(parent);
                }
            }
        }
        self.recovered.clear();
    }

    /// Flip privacy, or force it with `Some(blurred)`. Returns the new mode.
    pub fn toggle_privacy(&mut self, blurred: Option<bool>) -> Privacy {
        let blurred = blurred.unwrap_or(self.privacy == Privacy::None);
        self.privacy = if blurred { Privacy::Blurred } else { Privacy::None };
        self.privacy
    }

    /// Display thumbnail honoring privacy; the stored thumbnail is untouched
    pub fn render_thumbnail(&self, engine: &ThumbnailEngine) -> Option<Vec<u8>> {
        let thumb = self.thumbnail.as_deref()?;
        match engine.render(thumb, self.privacy) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("Could not render thumbnail for {}: {}", self.id, e);
                None
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: FileKind) {
        self.kind = kind;
    }

    pub fn privacy(&self) -> Privacy {
        self.privacy
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ItemStatus) {
        self.status = status;
    }

    pub fn is_corrupted(&self) -> bool {
        self.is_corrupted
    }

    pub fn set_corrupted(&mut self, corrupted: bool) {
        self.is_corrupted = corrupted;
    }

    pub fn needs_password(&self) -> bool {
        self.needs_password
    }

    pub fn set_needs_password(&mut self, needs_password: bool) {
        self.needs_password = needs_password;
    }

    pub fn error_text(&self) -> Option<&str> {
        self.error_text.as_deref()
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.error_text = error;
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    pub fn set_original_name(&mut self, name: impl Into<String>) {
        self.original_name = Some(name.into());
    }

    /// Last component of the original name, whichever separator it used
    pub fn display_name(&self) -> String {
        self.original_name
            .as_deref()
            .map(file_name_of)
            .filter(|n| !matches!(*n, "" | "." | ".."))
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone())
    }

    /// Folder the item originally lived in
    pub fn original_folder(&self) -> Option<PathBuf> {
        let name = self.original_name.as_deref()?;
        let cut = name.rfind(['/', '\\'])?;
        Some(PathBuf::from(&name[..cut.max(1)]))
    }

    pub fn thumbnail(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }

    pub fn set_thumbnail(&mut self, thumbnail: Option<Vec<u8>>) {
        self.thumbnail = thumbnail;
    }

    pub fn extras(&self) -> &Extras {
        &self.extras
    }

    pub fn set_extras(&mut self, extras: Extras) {
        self.extras = extras;
    }

    pub fn input(&self) -> &LocationSlot {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut LocationSlot {
        &mut self.input
    }

    pub fn at_rest(&self) -> &LocationSlot {
        &self.at_rest
    }

    pub fn at_rest_mut(&mut self) -> &mut LocationSlot {
        &mut self.at_rest
    }

    pub fn recovered(&self) -> &LocationSlot {
        &self.recovered
    }

    pub fn recovered_mut(&mut self) -> &mut LocationSlot {
        &mut self.recovered
    }
}

/// File name of a path string, accepting both separators
pub(crate) fn file_name_of(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::footer::FooterMetadata;
    use tempfile::tempdir;

    #[test]
    fn test_from_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("beach.jpg");
        fs::write(&path, b"jpeg").unwrap();

        let mut item = VaultItem::from_input(&path);
        assert_eq!(item.kind(), FileKind::Image);
        assert_eq!(item.status(), ItemStatus::Ready);
        assert_eq!(item.display_name(), "beach.jpg");
        assert_eq!(item.original_folder().unwrap(), dir.path());
        assert!(Uuid::parse_str(item.id()).is_ok());

        let info = item.input_mut().info().unwrap();
        assert!(info.exists);
        assert_eq!(info.size, 4);
        assert!(item.at_rest_mut().info().is_none());
    }

    #[test]
    fn test_slots_reload_independently() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let mut slot = LocationSlot::new(&path);

        assert!(!slot.info().unwrap().exists);
        fs::write(&path, b"12345").unwrap();

        // cached until invalidated
        assert!(!slot.info().unwrap().exists);
        assert!(slot.exists_now());

        let info = slot.reload().unwrap();
        assert!(info.exists);
        assert_eq!(info.size, 5);
    }

    #[test]
    fn test_try_load_footer() {
        let dir = tempdir().unwrap();
        let container = dir.path().join("c");
        fs::write(&container, vec![0u8; 32]).unwrap();
        let metadata = FooterMetadata::new(FileKind::Audio, "C:\\Music\\song.mp3", None);
        Footer::append(&container, metadata, Some(&[5u8; 10])).unwrap();

        let mut item = VaultItem::from_input(dir.path().join("ignored.txt"));
        assert!(item.try_load_footer(&container));
        assert_eq!(item.kind(), FileKind::Audio);
        assert_eq!(item.display_name(), "song.mp3");
        assert_eq!(item.original_folder().unwrap(), PathBuf::from("C:\\Music"));
        assert_eq!(item.thumbnail(), Some(&[5u8; 10][..]));

        item.set_original_name("C:\\Music\\..");
        assert_eq!(item.display_name(), item.id());

        let plain = dir.path().join("plain");
        fs::write(&plain, b"hello").unwrap();
        assert!(!item.try_load_footer(&plain));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let dir = tempdir().unwrap();
        let catalog = SqliteCatalog::open_in_memory().unwrap();

        let at_rest = dir.path().join("Encrypted").join("abc");
        fs::create_dir_all(at_rest.parent().unwrap()).unwrap();
        fs::write(&at_rest, b"sealed").unwrap();
        let entry = catalog.add(&at_rest, FileKind::Document, Privacy::None).unwrap();

        let mut item = VaultItem::from_entry(&entry);
        assert_eq!(item.id(), "abc");

        let recovered = dir.path().join("Recovery").join("abc").join("doc.txt");
        fs::create_dir_all(recovered.parent().unwrap()).unwrap();
        fs::write(&recovered, b"plain").unwrap();
        item.recovered_mut().set(&recovered);

        item.destroy(&catalog).unwrap();
        assert!(!at_rest.exists());
        assert!(!recovered.parent().unwrap().exists());
        assert!(catalog.find_by_path(&at_rest).unwrap().is_none());

        item.destroy(&catalog).unwrap();
    }

    #[test]
    fn test_toggle_privacy() {
        let mut item = VaultItem::from_input("/nowhere/x.png");
        assert_eq!(item.toggle_privacy(None), Privacy::Blurred);
        assert_eq!(item.toggle_privacy(None), Privacy::None);
        assert_eq!(item.toggle_privacy(Some(true)), Privacy::Blurred);
        assert_eq!(item.toggle_privacy(Some(true)), Privacy::Blurred);
        assert_eq!(item.toggle_privacy(Some(false)), Privacy::None);
    }

    #[test]
    fn test_privacy_codes() {
        assert_eq!(Privacy::from_code(Privacy::Blurred.code()), Privacy::Blurred);
        assert_eq!(Privacy::from_code(7), Privacy::None);
    }
}
