//! Private Files Vault - Container Footer
//!
//! Every container ends with a trailing footer:
//!
//! ```text
//! [ciphertext][thumbnail?][metadata JSON][u32 LE metadata length][signature]
//! ```
//!
//! The footer is appended once after the ciphertext is written and read back
//! by seeking from the end of the file. Declared lengths are trusted as-is:
//! there is no checksum over them.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::kind::FileKind;

/// Fixed trailing signature of every container
pub const SIGNATURE: &[u8; 24] = b"SE400ProjectCryptography";

/// Width of the metadata length field
const LEN_FIELD: u64 = 4;

/// Current metadata format version
pub const FORMAT_VERSION: i32 = 1;

// ═══════════════════════════════════════════════════════════════════════════
// EXTRAS
// ═══════════════════════════════════════════════════════════════════════════

/// Media and image details captured at encode time.
/// Zero-valued for kinds that are not probed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Extras {
    #[serde(with = "crate::timespan")]
    pub duration: Duration,
    #[serde(with = "crate::timespan")]
    pub start_time: Duration,
    pub format_name: Option<String>,
    pub format_long_name: Option<String>,
    pub stream_count: u32,
    pub probe_score: f64,
    pub bit_rate: f64,
    pub tags: Option<BTreeMap<String, String>>,
    pub width: u32,
    pub height: u32,
}

// ═══════════════════════════════════════════════════════════════════════════
// METADATA
// ═══════════════════════════════════════════════════════════════════════════

/// JSON metadata blob stored in the footer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FooterMetadata {
    pub version: i32,
    pub platform: String,
    pub is_file: bool,
    #[serde(rename = "FileType")]
    pub kind: FileKind,
    /// Full original path, restored on decode
    pub original_name: String,
    pub thumbnail_size: u32,
    /// [`Extras`] serialized as its own JSON string
    pub extras: String,
}

impl FooterMetadata {
    pub fn new(kind: FileKind, original_name: impl Into<String>, extras: Option<&Extras>) -> Self {
        let default_extras = Extras::default();
        let extras = extras.unwrap_or(&default_extras);

        Self {
            version: FORMAT_VERSION,
            platform: platform_tag().to_string(),
            is_file: !kind.is_directory(),
            kind,
            original_name: original_name.into(),
            thumbnail_size: 0,
            extras: serde_json::to_string(extras).unwrap_or_default(),
        }
    }

    /// Parse the embedded extras. Unreadable extras degrade to zero values.
    pub fn parse_extras(&self) -> Extras {
        match serde_json::from_str(&self.extras) {
            Ok(extras) => extras,
            Err(e) => {
                log::warn!("Unreadable footer extras for {}: {}", self.original_name, e);
                Extras::default()
            }
        }
    }
}

fn platform_tag() -> &'static str {
    match std::env::consts::OS {
        "windows" => "Windows",
        "macos" => "macOS",
        "linux" => "Linux",
        "android" => "Android",
        "ios" => "iOS",
        other => other,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FOOTER
// ═══════════════════════════════════════════════════════════════════════════

/// A footer as found at the tail of a container
#[derive(Debug, Clone)]
pub struct Footer {
    metadata: FooterMetadata,
    extras: Extras,
    metadata_len: u64,
    thumbnail: Option<Vec<u8>>,
}

impl Footer {
    /// Append a footer to `path`. Existing bytes are never touched.
    ///
    /// `metadata.thumbnail_size` is set from `thumbnail`.
    pub fn append(
        path: &Path,
        mut metadata: FooterMetadata,
        thumbnail: Option<&[u8]>,
    ) -> VaultResult<Footer> {
        let thumbnail = thumbnail.filter(|t| !t.is_empty());
        metadata.thumbnail_size = match thumbnail {
            Some(t) => u32::try_from(t.len())
                .map_err(|_| VaultError::SerializationError("thumbnail too large".into()))?,
            None => 0,
        };

        let blob = serde_json::to_vec(&metadata)?;
        let blob_len = u32::try_from(blob.len())
            .map_err(|_| VaultError::SerializationError("footer metadata too large".into()))?;

        let mut file = OpenOptions::new().append(true).open(path)?;
        if let Some(t) = thumbnail {
            file.write_all(t)?;
        }
        file.write_all(&blob)?;
        file.write_all(&blob_len.to_le_bytes())?;
        file.write_all(SIGNATURE)?;
        file.sync_all()?;

        Ok(Footer {
            extras: metadata.parse_extras(),
            metadata,
            metadata_len: blob.len() as u64,
            thumbnail: thumbnail.map(|t| t.to_vec()),
        })
    }

    /// Read the footer of `path`.
    ///
    /// Returns `None` when the file is missing, is not a container, or its
    /// footer is malformed. Never fails.
    pub fn read(path: &Path) -> Option<Footer> {
        let mut file = File::open(path).ok()?;
        let len = file.metadata().ok()?.len();
        Self::read_from(&mut file, len)
    }

    fn read_from<R: Read + Seek>(reader: &mut R, len: u64) -> Option<Footer> {
        let sig_len = SIGNATURE.len() as u64;

        // 1. signature
        if len < sig_len {
            return None;
        }
        let mut sig = [0u8; 24];
        reader.seek(SeekFrom::Start(len - sig_len)).ok()?;
        reader.read_exact(&mut sig).ok()?;
        if &sig != SIGNATURE {
            return None;
        }

        // 2. metadata length
        if len < sig_len + LEN_FIELD {
            return None;
        }
        let mut len_buf = [0u8; 4];
        reader.seek(SeekFrom::Start(len - sig_len - LEN_FIELD)).ok()?;
        reader.read_exact(&mut len_buf).ok()?;
        let declared = i32::from_le_bytes(len_buf);
        if declared <= 0 {
            return None;
        }
        let metadata_len = declared as u64;
        let before_len_field = len - sig_len - LEN_FIELD;
        if metadata_len > before_len_field {
            return None;
        }

        // 3. metadata blob
        let mut blob = vec![0u8; metadata_len as usize];
        reader.seek(SeekFrom::Start(before_len_field - metadata_len)).ok()?;
        reader.read_exact(&mut blob).ok()?;
        let metadata: FooterMetadata = serde_json::from_slice(&blob).ok()?;

        // 4. thumbnail
        let before_blob = before_len_field - metadata_len;
        let thumbnail = match metadata.thumbnail_size as u64 {
            0 => None,
            n if n > before_blob => return None,
            n => {
                let mut thumb = vec![0u8; n as usize];
                reader.seek(SeekFrom::Start(before_blob - n)).ok()?;
                reader.read_exact(&mut thumb).ok()?;
                Some(thumb)
            }
        };

        Some(Footer {
            extras: metadata.parse_extras(),
            metadata,
            metadata_len,
            thumbnail,
        })
    }

    /// Cheap "is this a vault container" probe
    pub fn is_container(path: &Path) -> bool {
        Self::read(path).is_some()
    }

    /// Bytes occupied by the footer at the tail of the container
    pub fn size_on_disk(&self) -> u64 {
        SIGNATURE.len() as u64 + LEN_FIELD + self.metadata_len + self.thumbnail_len()
    }

    pub fn metadata(&self) -> &FooterMetadata {
        &self.metadata
    }

    pub fn extras(&self) -> &Extras {
        &self.extras
    }

    pub fn thumbnail(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }

    pub fn kind(&self) -> FileKind {
        self.metadata.kind
    }

    pub fn original_name(&self) -> &str {
        &self.metadata.original_name
    }

    fn thumbnail_len(&self) -> u64 {
        self.thumbnail.as_ref().map(|t| t.len() as u64).unwrap_or(0)
    }
}
