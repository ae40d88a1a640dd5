//! # Private Files Vault
//!
//! Password-encrypted vault for personal files and folders.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  PRIVATE FILES VAULT                     │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  WORKFLOWS  │  │  ROTATION   │  │  PROFILE/CONFIG │  │
//! │  │  ingest/    │  │  password + │  │  storage root,  │  │
//! │  │  unlock/    │  │  relocation │  │  vault password │  │
//! │  │  export     │  │             │  │                 │  │
//! │  └──────┬──────┘  └──────┬──────┘  └────────┬────────┘  │
//! │         │                │                   │           │
//! │  ┌──────┴────────────────┴───────────────────┴────────┐ │
//! │  │   BATCH PIPELINE (packages → chunks → workers)      │ │
//! │  │   VAULT CONTEXT  (encode / decode per item)         │ │
//! │  └─────────────────────────────────────────────────────┘ │
//! │                                                          │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  CIPHER     │  │  FOOTER     │  │  CATALOG        │  │
//! │  │  AES-256-CBC│  │  CODEC      │  │  (SQLite)       │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Container Layout
//!
//! ```text
//! [ciphertext][thumbnail?][metadata JSON][u32 LE metadata length][signature]
//! ```
//!
//! - Key and IV derived with PBKDF2-HMAC-SHA1 from the vault password
//! - Payload encrypted with AES-256-CBC, PKCS7 padding
//! - Footer is plaintext and carries no checksum
//! - Folders are bundled into one payload before encryption

pub mod bundle;
pub mod catalog;
pub mod config;
pub mod crypto;
pub mod error;
pub mod footer;
pub mod item;
pub mod kind;
pub mod pipeline;
pub mod probe;
pub mod rotation;
pub mod secure_fs;
pub mod thumbs;
pub mod timespan;
pub mod vault;
pub mod workflows;

pub use catalog::{Catalog, CatalogEntry, SqliteCatalog};
pub use config::{Profile, StoragePaths, VaultConfig};
pub use error::{VaultError, VaultResult};
pub use footer::{Extras, Footer, FooterMetadata, SIGNATURE};
pub use item::{ItemStatus, Privacy, VaultItem};
pub use kind::FileKind;
pub use pipeline::{run_batch, BatchEvent, BatchHandle, BatchOutcome, BatchStatus, PipelineItem};
pub use probe::{ImageProbe, MediaInfo, MediaProbe};
pub use rotation::{relocate_storage, rotate_password, RelocationReport, RotationReport};
pub use thumbs::ThumbnailEngine;
pub use vault::{ExportMode, ExportOptions, ExportTarget, Vault};
pub use workflows::IngestReport;

/// Private Files Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
