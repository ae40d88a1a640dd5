//! Private Files Vault - Vault Context
//!
//! The explicitly constructed context every workflow runs against: storage
//! layout, vault password, catalog, media probe and thumbnail engine. The
//! single-item operations (encode, decode, export, ingest, unlock) live here;
//! `workflows` fans them out through the batch pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use secrecy::{ExposeSecret, SecretString};

use crate::bundle;
use crate::catalog::{Catalog, SqliteCatalog};
use crate::config::{Profile, StoragePaths, VaultConfig};
use crate::crypto::{decrypt_file, encrypt_file};
use crate::error::{VaultError, VaultResult};
use crate::footer::{Footer, FooterMetadata};
use crate::item::{Privacy, VaultItem};
use crate::kind::FileKind;
use crate::probe::{self, ImageProbe, MediaProbe};
use crate::secure_fs::{self, ScratchFiles};
use crate::thumbs::ThumbnailEngine;

// ═══════════════════════════════════════════════════════════════════════════
// CONTAINERS
// ═══════════════════════════════════════════════════════════════════════════

/// Encrypt `payload` into a new container at `out` and append its footer.
/// `out` must not exist; it is removed again if the footer cannot be written.
pub fn seal(
    payload: &Path,
    out: &Path,
    password: &str,
    metadata: FooterMetadata,
    thumbnail: Option<&[u8]>,
) -> VaultResult<Footer> {
    encrypt_file(payload, out, password)?;

    match Footer::append(out, metadata, thumbnail) {
        Ok(footer) => Ok(footer),
        Err(e) => {
            secure_fs::remove_quietly(out);
            Err(e)
        }
    }
}

/// Decrypt the payload of `container` into the new file `out`.
///
/// The container is copied to `scratch_dir`, its footer cut off, and the
/// remaining ciphertext decrypted. The container itself is never modified.
pub fn unseal(container: &Path, out: &Path, password: &str, scratch_dir: &Path) -> VaultResult<Footer> {
    if !secure_fs::exists(container) {
        return Err(VaultError::NotFound(container.display().to_string()));
    }

    let footer = Footer::read(container).ok_or_else(|| {
        VaultError::MalformedContainer(format!("no footer in {}", container.display()))
    })?;

    fs::create_dir_all(scratch_dir)?;
    let mut scratch = ScratchFiles::new();
    let raw = scratch.track(secure_fs::scratch_path(scratch_dir));

    fs::copy(container, &raw)?;
    secure_fs::truncate_tail(&raw, footer.size_on_disk())?;
    decrypt_file(&raw, out, password)?;

    Ok(footer)
}

/// Re-encrypt `container` under a new password into `out`, keeping the
/// footer metadata and thumbnail.
pub fn reseal(
    container: &Path,
    out: &Path,
    old_password: &str,
    new_password: &str,
    scratch_dir: &Path,
) -> VaultResult<Footer> {
    let mut scratch = ScratchFiles::new();
    let plain = scratch.track(secure_fs::scratch_path(scratch_dir));

    let footer = unseal(container, &plain, old_password, scratch_dir)?;
    seal(
        &plain,
        out,
        new_password,
        footer.metadata().clone(),
        footer.thumbnail(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// EXPORT OPTIONS
// ═══════════════════════════════════════════════════════════════════════════

/// What an export leaves behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Decrypted copy out, vault original destroyed
    Export,
    /// Decrypted copy out, vault original kept
    UnlockedCopy,
    /// Raw container copied out
    LockedCopy,
}

/// Where exported items land
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    Folder(PathBuf),
    /// The folder recorded in each item's original name
    OriginalFolder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub mode: ExportMode,
    pub target: ExportTarget,
    /// Replace existing destinations instead of picking a free name
    pub overwrite: bool,
}

impl ExportOptions {
    pub fn to_folder(mode: ExportMode, folder: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            target: ExportTarget::Folder(folder.into()),
            overwrite: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// VAULT
// ═══════════════════════════════════════════════════════════════════════════

/// Vault context
pub struct Vault {
    paths: RwLock<StoragePaths>,
    password: RwLock<Option<SecretString>>,
    catalog: Arc<dyn Catalog>,
    probe: Arc<dyn MediaProbe>,
    thumbs: ThumbnailEngine,
    config: VaultConfig,
    /// Serializes export name resolution and placement
    placement: Mutex<()>,
}

impl Vault {
    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Build a vault over `paths`, creating its working folders
    pub fn new(
        paths: StoragePaths,
        catalog: Arc<dyn Catalog>,
        probe: Arc<dyn MediaProbe>,
        config: VaultConfig,
    ) -> VaultResult<Self> {
        paths.ensure_dirs()?;

        log::info!("Vault storage at {}", paths.root().display());

        Ok(Self {
            thumbs: ThumbnailEngine::new(config.thumbnail_size, Arc::clone(&probe)),
            paths: RwLock::new(paths),
            password: RwLock::new(None),
            catalog,
            probe,
            config,
            placement: Mutex::new(()),
        })
    }

    /// Open the vault described by a user profile: SQLite catalog next to
    /// the profile, image probe, profile password.
    pub fn open(profile: &Profile, config: VaultConfig) -> VaultResult<Self> {
        let catalog = SqliteCatalog::open(&profile.catalog_path())?;
        let vault = Self::new(profile.paths(), Arc::new(catalog), Arc::new(ImageProbe), config)?;

        if let Some(password) = profile.password() {
            vault.set_password(copy_secret(password));
        }
        Ok(vault)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PASSWORD & LAYOUT
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set_password(&self, password: SecretString) {
        *self.password.write() = Some(password);
    }

    pub fn has_password(&self) -> bool {
        self.password.read().is_some()
    }

    /// Current vault password
    pub fn password(&self) -> VaultResult<SecretString> {
        self.password
            .read()
            .as_ref()
            .map(copy_secret)
            .ok_or(VaultError::PasswordNotSet)
    }

    pub fn paths(&self) -> StoragePaths {
        self.paths.read().clone()
    }

    /// Switch to another storage root. Existing containers are not moved;
    /// see `rotation::relocate_storage`.
    pub fn set_storage_root(&self, root: impl Into<PathBuf>) -> VaultResult<()> {
        let paths = StoragePaths::new(root);
        paths.ensure_dirs()?;
        *self.paths.write() = paths;
        Ok(())
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    pub fn thumbs(&self) -> &ThumbnailEngine {
        &self.thumbs
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ENCODE / DECODE
    // ═══════════════════════════════════════════════════════════════════════

    /// Encrypt the item's input into a new at-rest container and register it.
    /// The plaintext input is deleted once the container is in place.
    pub fn encode_one(&self, item: &mut VaultItem) -> VaultResult<()> {
        let password = self.password()?;
        self.encode_with(item, password.expose_secret())
    }

    fn encode_with(&self, item: &mut VaultItem, password: &str) -> VaultResult<()> {
        let input = input_path(item)?;
        let paths = self.paths();
        let kind = FileKind::from_path(&input);
        item.set_kind(kind);

        let mut scratch = ScratchFiles::new();
        let payload = if kind.is_directory() {
            let packed = scratch.track(secure_fs::scratch_path(&paths.temp()));
            bundle::pack(&input, &packed)?;
            packed
        } else {
            input.clone()
        };

        let thumbnail = self.thumbs.generate(&input, kind);
        let extras = probe::extras_for(self.probe.as_ref(), &input, kind);
        let original_name = input.display().to_string();
        let metadata = FooterMetadata::new(kind, original_name.as_str(), Some(&extras));

        let sealed = scratch.track(secure_fs::scratch_path(&paths.temp()));
        let footer = seal(&payload, &sealed, password, metadata, thumbnail.as_deref())?;

        let at_rest = paths.encrypted().join(item.id());
        secure_fs::move_path(&sealed, &at_rest, false)?;
        scratch.release(&sealed);

        if let Err(e) = self.catalog.add(&at_rest, kind, item.privacy()) {
            secure_fs::remove_quietly(&at_rest);
            return Err(e);
        }

        if let Err(e) = secure_fs::remove_path(&input) {
            log::warn!("Encoded {} but could not delete the input: {}", input.display(), e);
        }

        item.apply_footer(&footer);
        item.set_corrupted(false);
        item.input_mut().clear();
        item.at_rest_mut().set(&at_rest);

        log::debug!("Encoded {} as {}", original_name, item.id());
        Ok(())
    }

    /// Decrypt the item's container into `Recovery/<id>/<original name>`.
    /// A container without a readable footer flags the item as corrupted.
    pub fn decode_one(&self, item: &mut VaultItem) -> VaultResult<PathBuf> {
        let password = self.password()?;
        self.decode_with(item, password.expose_secret())
    }

    fn decode_with(&self, item: &mut VaultItem, password: &str) -> VaultResult<PathBuf> {
        let at_rest = at_rest_path(item)?;
        let paths = self.paths();
        item.clear_recovered();

        let mut scratch = ScratchFiles::new();
        let plain = scratch.track(secure_fs::scratch_path(&paths.temp()));

        let footer = match unseal(&at_rest, &plain, password, &paths.temp()) {
            Ok(footer) => footer,
            Err(e) => {
                if e.is_corruption() {
                    item.set_corrupted(true);
                }
                return Err(e);
            }
        };
        item.apply_footer(&footer);

        let folder = paths.recovered().join(item.id());
        let dest = folder.join(item.display_name());
        fs::create_dir_all(&folder)?;

        let placed = if footer.kind().is_directory() {
            bundle::unpack(&plain, &dest).map(|_| ())
        } else {
            secure_fs::move_path(&plain, &dest, true).map(|()| scratch.release(&plain))
        };
        if let Err(e) = placed {
            secure_fs::remove_quietly(&folder);
            return Err(e);
        }

        item.recovered_mut().set(&dest);
        log::debug!("Decoded {} to {}", item.id(), dest.display());
        Ok(dest)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // EXPORT
    // ═══════════════════════════════════════════════════════════════════════

    /// Export one item. Returns where it landed.
    pub fn export_one(&self, item: &mut VaultItem, options: &ExportOptions) -> VaultResult<PathBuf> {
        let at_rest = at_rest_path(item)?;
        if item.original_name().is_none() && !item.try_load_footer(&at_rest) {
            item.set_corrupted(true);
            return Err(VaultError::MalformedContainer(format!(
                "no footer in {}",
                at_rest.display()
            )));
        }

        let folder = match &options.target {
            ExportTarget::Folder(folder) => folder.clone(),
            ExportTarget::OriginalFolder => item.original_folder().ok_or_else(|| {
                VaultError::NotFound(format!("original folder of {}", item.id()))
            })?,
        };
        fs::create_dir_all(&folder)?;

        let source = match options.mode {
            ExportMode::LockedCopy => at_rest.clone(),
            ExportMode::Export | ExportMode::UnlockedCopy => self.decode_one(item)?,
        };

        let placed = {
            let _guard = self.placement.lock();
            let dest = self.export_destination(item, &folder, options.overwrite);
            let result = match options.mode {
                ExportMode::LockedCopy => secure_fs::copy_path(&source, &dest, options.overwrite),
                _ => secure_fs::move_path(&source, &dest, options.overwrite),
            };
            result.map(|()| dest)
        };

        if options.mode != ExportMode::LockedCopy {
            item.clear_recovered();
        }
        let dest = placed?;

        if options.mode == ExportMode::Export {
            item.destroy(self.catalog.as_ref())?;
        }

        log::debug!("Exported {} to {}", item.id(), dest.display());
        Ok(dest)
    }

    fn export_destination(&self, item: &VaultItem, folder: &Path, overwrite: bool) -> PathBuf {
        let dest = folder.join(item.display_name());
        if overwrite {
            dest
        } else if item.kind().is_directory() {
            secure_fs::next_available_folder_name(&dest)
        } else {
            secure_fs::next_available_file_name(&dest)
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INGEST / UNLOCK
    // ═══════════════════════════════════════════════════════════════════════

    /// Bring a user-supplied path into the vault. Plaintext is encoded;
    /// an existing container must open with the vault password and is
    /// copied in under the item's id. A container that does not open fails
    /// with [`VaultError::IncorrectPassword`].
    pub fn ingest_one(&self, item: &mut VaultItem) -> VaultResult<()> {
        let input = input_path(item)?;

        if input.is_file() && Footer::is_container(&input) {
            self.adopt_container(item, &input)
        } else {
            self.encode_one(item)
        }
    }

    fn adopt_container(&self, item: &mut VaultItem, input: &Path) -> VaultResult<()> {
        let password = self.password()?;
        let paths = self.paths();

        {
            let mut scratch = ScratchFiles::new();
            let check = scratch.track(secure_fs::scratch_path(&paths.temp()));
            unseal(input, &check, password.expose_secret(), &paths.temp())?;
        }

        let at_rest = paths.encrypted().join(item.id());
        secure_fs::copy_path(input, &at_rest, false)?;
        item.try_load_footer(&at_rest);

        if let Err(e) = self.catalog.add(&at_rest, item.kind(), item.privacy()) {
            secure_fs::remove_quietly(&at_rest);
            return Err(e);
        }

        item.at_rest_mut().set(&at_rest);
        item.input_mut().clear();
        log::debug!("Adopted container {} as {}", input.display(), item.id());
        Ok(())
    }

    /// Take in a container sealed under `password`: re-seal it under the
    /// vault password, register it and delete the supplied file.
    pub fn unlock_one(&self, item: &mut VaultItem, password: &str) -> VaultResult<()> {
        let input = input_path(item)?;
        let vault_password = self.password()?;
        let paths = self.paths();

        let mut scratch = ScratchFiles::new();
        let sealed = scratch.track(secure_fs::scratch_path(&paths.temp()));
        let footer = reseal(
            &input,
            &sealed,
            password,
            vault_password.expose_secret(),
            &paths.temp(),
        )?;

        let at_rest = paths.encrypted().join(item.id());
        secure_fs::move_path(&sealed, &at_rest, false)?;
        scratch.release(&sealed);

        if let Err(e) = self.catalog.add(&at_rest, footer.kind(), item.privacy()) {
            secure_fs::remove_quietly(&at_rest);
            return Err(e);
        }

        if let Err(e) = secure_fs::remove_path(&input) {
            log::warn!("Unlocked {} but could not delete it: {}", input.display(), e);
        }

        item.apply_footer(&footer);
        item.input_mut().clear();
        item.at_rest_mut().set(&at_rest);

        log::debug!("Unlocked {} as {}", input.display(), item.id());
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PRIVACY
    // ═══════════════════════════════════════════════════════════════════════

    /// Flip (or force) an item's privacy and persist it in the catalog
    pub fn set_privacy(&self, item: &mut VaultItem, blurred: Option<bool>) -> VaultResult<Privacy> {
        let privacy = item.toggle_privacy(blurred);
        if let Some(path) = item.at_rest().path() {
            self.catalog.set_privacy(path, privacy)?;
        }
        Ok(privacy)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CLEANUP
    // ═══════════════════════════════════════════════════════════════════════

    /// Remove every recovered and temporary working copy
    pub fn shutdown_cleanup(&self) -> VaultResult<()> {
        let paths = self.paths();
        for dir in [paths.recovered(), paths.temp()] {
            secure_fs::remove_path(&dir)?;
            fs::create_dir_all(&dir)?;
        }

        log::info!("Cleared working copies under {}", paths.root().display());
        Ok(())
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::new(secret.expose_secret().clone())
}

fn input_path(item: &VaultItem) -> VaultResult<PathBuf> {
    match item.input().path() {
        Some(path) if secure_fs::exists(path) => Ok(path.to_path_buf()),
        Some(path) => Err(VaultError::NotFound(path.display().to_string())),
        None => Err(VaultError::NotFound(format!("input of {}", item.id()))),
    }
}

fn at_rest_path(item: &VaultItem) -> VaultResult<PathBuf> {
    match item.at_rest().path() {
        Some(path) if secure_fs::exists(path) => Ok(path.to_path_buf()),
        Some(path) => Err(VaultError::NotFound(path.display().to_string())),
        None => Err(VaultError::NotFound(format!("container of {}", item.id()))),
    }
}
