//! Private Files Vault - Configuration
//!
//! Tunables, storage layout and the encrypted user profile.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::crypto::{decrypt_string, encrypt_string};
use crate::error::VaultResult;
use crate::secure_fs;

/// Fixed key the profile file is encrypted with
const PROFILE_KEY: &str = "275010a649c4d5690f10dc49b9418456";

/// Application folder under the platform data directory
const APP_DIR: &str = "PrivateFiles";

// ═══════════════════════════════════════════════════════════════════════════
// VAULT CONFIG
// ═══════════════════════════════════════════════════════════════════════════

/// Vault tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Max thumbnail edge
    pub thumbnail_size: u32,
    /// Items per package; progress is reported per package
    pub package_size: usize,
    /// Items in flight per chunk. `None` = logical processor count
    pub parallelism: Option<usize>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: 256,
            package_size: 64,
            parallelism: None,
        }
    }
}

impl VaultConfig {
    /// Package size, at least one
    pub fn package_size(&self) -> usize {
        self.package_size.max(1)
    }

    /// Chunk width, at least one
    pub fn parallelism(&self) -> usize {
        match self.parallelism {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STORAGE LAYOUT
// ═══════════════════════════════════════════════════════════════════════════

/// Resolves the working folders under a storage root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// At-rest containers
    pub fn encrypted(&self) -> PathBuf {
        self.root.join("Encrypted")
    }

    /// Decrypted working copies
    pub fn recovered(&self) -> PathBuf {
        self.root.join("Recovery")
    }

    /// Scratch space for in-flight operations
    pub fn temp(&self) -> PathBuf {
        self.root.join("Temp")
    }

    pub fn ensure_dirs(&self) -> VaultResult<()> {
        fs::create_dir_all(self.encrypted())?;
        fs::create_dir_all(self.recovered())?;
        fs::create_dir_all(self.temp())?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROFILE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StoredProfile {
    storage_location: PathBuf,
    #[serde(default)]
    password: Option<SecretString>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StoredProfileRef<'a> {
    storage_location: &'a Path,
    password: Option<&'a str>,
}

/// User profile: storage root and vault password
pub struct Profile {
    file: PathBuf,
    storage_root: PathBuf,
    password: Option<SecretString>,
}

impl Profile {
    /// Platform default folder holding the profile and catalog
    pub fn default_location() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR)
    }

    /// Profile with defaults, stored at `file`
    pub fn new(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let storage_root = file
            .parent()
            .map(|p| p.join("Storage"))
            .unwrap_or_else(|| Self::default_location().join("Storage"));

        Self {
            file,
            storage_root,
            password: None,
        }
    }

    /// Load from `file`. A missing or unreadable profile yields defaults;
    /// an unreadable file is deleted.
    pub fn load(file: impl Into<PathBuf>) -> Self {
        let mut profile = Self::new(file);

        if !profile.file.exists() {
            return profile;
        }

        match profile.read_stored() {
            Ok(stored) => {
                profile.storage_root = stored.storage_location;
                profile.password = stored.password;
            }
            Err(e) => {
                log::warn!("Discarding unreadable profile {}: {}", profile.file.display(), e);
                secure_fs::remove_quietly(&profile.file);
            }
        }

        profile
    }

    fn read_stored(&self) -> VaultResult<StoredProfile> {
        let encoded = fs::read_to_string(&self.file)?;
        let json = decrypt_string(&encoded, PROFILE_KEY)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Persist the profile encrypted under the application key
    pub fn save(&self) -> VaultResult<()> {
        let json = serde_json::to_string(&StoredProfileRef {
            storage_location: &self.storage_root,
            password: self.password.as_ref().map(|p| p.expose_secret().as_str()),
        })?;
        let encoded = encrypt_string(&json, PROFILE_KEY)?;
        secure_fs::write_atomic(&self.file, encoded.as_bytes())
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Catalog database lives next to the profile
    pub fn catalog_path(&self) -> PathBuf {
        self.file.with_file_name("catalog.db")
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn paths(&self) -> StoragePaths {
        StoragePaths::new(&self.storage_root)
    }

    pub fn set_storage_root(&mut self, root: impl Into<PathBuf>) -> VaultResult<()> {
        self.storage_root = root.into();
        self.save()
    }

    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn set_password(&mut self, password: SecretString) -> VaultResult<()> {
        self.password = Some(password);
        self.save()
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new(Self::default_location().join("profile"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.thumbnail_size, 256);
        assert_eq!(config.package_size(), 64);
        assert!(config.parallelism() >= 1);

        let config = VaultConfig {
            package_size: 0,
            parallelism: Some(0),
            ..Default::default()
        };
        assert_eq!(config.package_size(), 1);
        assert_eq!(config.parallelism(), 1);

        let partial: VaultConfig = serde_json::from_str(r#"{"package_size": 8}"#).unwrap();
        assert_eq!(partial.package_size, 8);
        assert_eq!(partial.thumbnail_size, 256);
    }

    #[test]
    fn test_storage_paths() {
        let paths = StoragePaths::new("/data/Storage");
        assert_eq!(paths.encrypted(), PathBuf::from("/data/Storage/Encrypted"));
        assert_eq!(paths.recovered(), PathBuf::from("/data/Storage/Recovery"));
        assert_eq!(paths.temp(), PathBuf::from("/data/Storage/Temp"));
    }

    #[test]
    fn test_profile_roundtrip() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("profile");

        let mut profile = Profile::load(&file);
        assert!(!profile.has_password());
        assert_eq!(profile.storage_root(), dir.path().join("Storage"));

        profile.set_storage_root(dir.path().join("Elsewhere")).unwrap();
        profile.set_password(SecretString::new("abc123".into())).unwrap();

        let raw = fs::read_to_string(&file).unwrap();
        assert!(!raw.contains("abc123"));

        let loaded = Profile::load(&file);
        assert_eq!(loaded.storage_root(), dir.path().join("Elsewhere"));
        assert_eq!(loaded.password().unwrap().expose_secret(), "abc123");
        assert_eq!(loaded.catalog_path(), dir.path().join("catalog.db"));
    }

    #[test]
    fn test_unreadable_profile_is_discarded() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("profile");
        fs::write(&file, "definitely not a profile").unwrap();

        let profile = Profile::load(&file);
        assert!(!profile.has_password());
        assert!(!file.exists());
    }
}
