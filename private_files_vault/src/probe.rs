//! Private Files Vault - Media Analysis
//!
//! The vault only needs a few facts about a payload (dimensions, duration,
//! container format) to fill footer extras. Anything heavier is plugged in
//! through [`MediaProbe`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::footer::Extras;
use crate::kind::FileKind;

/// Result of analysing a payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration: Duration,
    pub start_time: Duration,
    pub format_name: Option<String>,
    pub format_long_name: Option<String>,
    pub stream_count: u32,
    pub probe_score: f64,
    pub bit_rate: f64,
    pub tags: BTreeMap<String, String>,
}

impl From<MediaInfo> for Extras {
    fn from(info: MediaInfo) -> Self {
        Extras {
            duration: info.duration,
            start_time: info.start_time,
            format_name: info.format_name,
            format_long_name: info.format_long_name,
            stream_count: info.stream_count,
            probe_score: info.probe_score,
            bit_rate: info.bit_rate,
            tags: if info.tags.is_empty() {
                None
            } else {
                Some(info.tags)
            },
            width: info.width,
            height: info.height,
        }
    }
}

/// Analyse file → dimensions/duration/format
pub trait MediaProbe: Send + Sync {
    /// `None` when the payload cannot be analysed
    fn analyze(&self, path: &Path, kind: FileKind) -> Option<MediaInfo>;

    /// Encoded still frame no larger than `width` x `height`
    fn snapshot(&self, _path: &Path, _width: u32, _height: u32) -> Option<Vec<u8>> {
        None
    }
}

/// Probe for still images backed by the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageProbe;

impl MediaProbe for ImageProbe {
    fn analyze(&self, path: &Path, kind: FileKind) -> Option<MediaInfo> {
        if kind != FileKind::Image {
            return None;
        }

        let (width, height) = match image::image_dimensions(path) {
            Ok(dims) => dims,
            Err(e) => {
                log::debug!("Image probe failed for {}: {}", path.display(), e);
                return None;
            }
        };

        let format = image::ImageFormat::from_path(path).ok();
        Some(MediaInfo {
            width,
            height,
            format_name: format.map(|f| format!("{:?}", f).to_lowercase()),
            format_long_name: format.and_then(|f| f.extensions_str().first().map(|e| e.to_uppercase())),
            stream_count: 1,
            ..Default::default()
        })
    }
}

/// Analyse and convert to footer extras. Failures become zero-valued extras.
pub fn extras_for(probe: &dyn MediaProbe, path: &Path, kind: FileKind) -> Extras {
    match kind {
        FileKind::Image | FileKind::Video | FileKind::Audio => {
            probe.analyze(path, kind).map(Extras::from).unwrap_or_default()
        }
        FileKind::Document | FileKind::Directory | FileKind::Unknown => Extras::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_image_probe() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pic.png");
        image::RgbImage::new(120, 80).save(&path).unwrap();

        let info = ImageProbe.analyze(&path, FileKind::Image).unwrap();
        assert_eq!((info.width, info.height), (120, 80));
        assert_eq!(info.format_name.as_deref(), Some("png"));

        let extras = extras_for(&ImageProbe, &path, FileKind::Image);
        assert_eq!((extras.width, extras.height), (120, 80));
        assert!(extras.tags.is_none());
    }

    #[test]
    fn test_probe_failures_are_zero_extras() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"garbage").unwrap();

        assert!(ImageProbe.analyze(&path, FileKind::Image).is_none());
        assert_eq!(extras_for(&ImageProbe, &path, FileKind::Image), Extras::default());
        assert_eq!(extras_for(&ImageProbe, &path, FileKind::Video), Extras::default());
        assert_eq!(extras_for(&ImageProbe, &path, FileKind::Document), Extras::default());
    }
}
