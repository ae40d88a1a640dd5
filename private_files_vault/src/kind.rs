//! Private Files Vault - File Kinds
//!
//! Classification of vault payloads. The numeric codes are part of the
//! container footer and must not change.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Payload kind stored in every footer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum FileKind {
    #[default]
    Unknown,
    Image,
    Video,
    Audio,
    Document,
    Directory,
}

// ═══════════════════════════════════════════════════════════════════════════
// EXTENSION TABLES
// ═══════════════════════════════════════════════════════════════════════════

const IMAGE_EXTENSIONS: &[&str] = &[
    "avif", "eps", "heic", "heif", "mpo", "psb", "psd", "qoi", "pwp", "sfw", "svg", "svgz",
    "icb", "tga", "vda", "vst", "tif", "tiff", "webp", "xbm", "xpm", "bmp", "rle", "dib",
    "gif", "ico", "jpg", "jpeg", "jpe", "png", "pbm", "pgm", "ppm", "pnm", "pfm", "pam", "pcx",
    "wbm", "wbmp", "arw", "srf", "sr2", "cr2", "cr3", "crw", "dcr", "kdc", "k25", "dng", "erf",
    "mef", "nef", "nrw", "orf", "pef", "raf", "raw", "rw2",
];

// Checked before audio, so shared container extensions (ogg, m4a, ...) land here
const VIDEO_EXTENSIONS: &[&str] = &[
    "3gp", "3g2", "3gpp", "3gp2", "3gpp2", "asf", "avi", "dat", "f4v", "flv", "hevc", "m2ts",
    "mts", "m4v", "mkv", "mov", "qt", "mp4", "m4a", "m4p", "m4b", "m4r", "mpeg", "mpg", "mxf",
    "ogg", "ogv", "oga", "ogx", "ogm", "spx", "opus", "rm", "swf", "ts", "tsv", "tsa", "m2t",
    "vob", "webm", "wmv", "wm",
];

const AUDIO_EXTENSIONS: &[&str] = &[
    "aac", "ac3", "aiff", "aifc", "aif", "amr", "au", "caf", "dff", "dsf", "dts", "flac",
    "mlp", "mp2", "mp3", "tta", "voc", "wav", "weba", "wma", "wv",
];

const DOCUMENT_EXTENSIONS: &[&str] = &[
    "doc", "docx", "docm", "pdf", "txt", "text", "tex", "rtf", "odt", "pages", "ppt", "pptx",
    "pptm", "key", "odp", "xls", "xlsx", "xlsm", "ods", "epub", "mobi", "azw", "azw3", "fb2",
];

impl FileKind {
    /// Every kind, in footer code order
    pub const ALL: [FileKind; 6] = [
        FileKind::Unknown,
        FileKind::Image,
        FileKind::Video,
        FileKind::Audio,
        FileKind::Document,
        FileKind::Directory,
    ];

    /// Footer code
    pub fn code(self) -> u8 {
        match self {
            FileKind::Unknown => 0,
            FileKind::Image => 1,
            FileKind::Video => 2,
            FileKind::Audio => 3,
            FileKind::Document => 4,
            FileKind::Directory => 5,
        }
    }

    /// Classify by extension (with or without the leading dot, any case)
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();

        for (kind, table) in [
            (FileKind::Image, IMAGE_EXTENSIONS),
            (FileKind::Video, VIDEO_EXTENSIONS),
            (FileKind::Audio, AUDIO_EXTENSIONS),
            (FileKind::Document, DOCUMENT_EXTENSIONS),
        ] {
            if table.contains(&ext.as_str()) {
                return kind;
            }
        }

        FileKind::Unknown
    }

    /// Classify an existing path. Directories win over extensions.
    pub fn from_path(path: &Path) -> Self {
        if path.is_dir() {
            return FileKind::Directory;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(FileKind::Unknown)
    }

    pub fn is_directory(self) -> bool {
        self == FileKind::Directory
    }

    /// Name used in the catalog
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Unknown => "unknown",
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Document => "document",
            FileKind::Directory => "directory",
        }
    }

    /// Inverse of [`FileKind::as_str`]; anything unrecognised is `Unknown`
    pub fn parse(s: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .unwrap_or(FileKind::Unknown)
    }
}

impl From<FileKind> for u8 {
    fn from(kind: FileKind) -> u8 {
        kind.code()
    }
}

impl TryFrom<u8> for FileKind {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        FileKind::ALL
            .into_iter()
            .find(|k| k.code() == code)
            .ok_or_else(|| format!("unknown file kind code {}", code))
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
