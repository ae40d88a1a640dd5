//! Private Files Vault - Thumbnail Engine
//!
//! Generates the thumbnail stored in a container footer and renders it for
//! display. Privacy blur is applied at render time only.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};

use crate::error::{VaultError, VaultResult};
use crate::item::Privacy;
use crate::kind::FileKind;
use crate::probe::MediaProbe;

/// Gaussian sigma used for blurred rendering
pub const PRIVACY_BLUR_SIGMA: f32 = 24.0;

/// Thumbnail Engine
pub struct ThumbnailEngine {
    /// Bounding box edge
    size: u32,
    /// Frame grabber for video/audio
    probe: Arc<dyn MediaProbe>,
}

impl ThumbnailEngine {
    pub fn new(size: u32, probe: Arc<dyn MediaProbe>) -> Self {
        Self {
            size: size.max(1),
            probe,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Thumbnail bytes for a payload, or `None` when the kind has no picture
    /// or generation fails. Failures are logged, never returned.
    pub fn generate(&self, path: &Path, kind: FileKind) -> Option<Vec<u8>> {
        let result = match kind {
            FileKind::Image => self.from_image_file(path).map(Some),
            FileKind::Video | FileKind::Audio => self
                .probe
                .snapshot(path, self.size, self.size)
                .map(|frame| self.from_image_bytes(&frame))
                .transpose(),
            FileKind::Document | FileKind::Directory | FileKind::Unknown => Ok(None),
        };

        match result {
            Ok(thumb) => thumb,
            Err(e) => {
                log::warn!("No thumbnail for {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Generate thumbnail from encoded image data
    pub fn from_image_bytes(&self, image_data: &[u8]) -> VaultResult<Vec<u8>> {
        let img = image::load_from_memory(image_data)
            .map_err(|e| VaultError::ThumbnailFailed(e.to_string()))?;
        encode_png(&self.fit(&img))
    }

    fn from_image_file(&self, path: &Path) -> VaultResult<Vec<u8>> {
        let img = image::open(path).map_err(|e| VaultError::ThumbnailFailed(e.to_string()))?;
        encode_png(&self.fit(&img))
    }

    /// Scale to fit the bounding box, keeping aspect ratio. Never upscales.
    fn fit(&self, img: &DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        if width <= self.size && height <= self.size {
            return img.clone();
        }
        img.resize(self.size, self.size, FilterType::Lanczos3)
    }

    /// Display bytes for a stored thumbnail
    pub fn render(&self, thumbnail: &[u8], privacy: Privacy) -> VaultResult<Vec<u8>> {
        match privacy {
            Privacy::None => Ok(thumbnail.to_vec()),
            Privacy::Blurred => {
                let img = image::load_from_memory(thumbnail)
                    .map_err(|e| VaultError::ThumbnailFailed(e.to_string()))?;
                encode_png(&img.blur(PRIVACY_BLUR_SIGMA))
            }
        }
    }
}

fn encode_png(img: &DynamicImage) -> VaultResult<Vec<u8>> {
    let mut output = Vec::new();
    img.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
        .map_err(|e| VaultError::ThumbnailFailed(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ImageProbe;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn engine(size: u32) -> ThumbnailEngine {
        ThumbnailEngine::new(size, Arc::new(ImageProbe))
    }

    fn checkerboard(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }

    #[test]
    fn test_thumbnail_fits_box() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wide.png");
        checkerboard(800, 600).save(&path).unwrap();

        let thumb = engine(256).generate(&path, FileKind::Image).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!(decoded.dimensions(), (256, 192));
    }

    #[test]
    fn test_small_images_not_upscaled() {
        let mut buffer = Vec::new();
        checkerboard(40, 30)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();

        let thumb = engine(256).from_image_bytes(&buffer).unwrap();
        assert_eq!(image::load_from_memory(&thumb).unwrap().dimensions(), (40, 30));
    }

    #[test]
    fn test_non_images_have_no_thumbnail() {
        let dir = tempdir().unwrap();
        let doc = dir.path().join("notes.txt");
        std::fs::write(&doc, b"text").unwrap();
        let fake = dir.path().join("broken.jpg");
        std::fs::write(&fake, b"not a jpeg").unwrap();

        let engine = engine(64);
        assert!(engine.generate(&doc, FileKind::Document).is_none());
        assert!(engine.generate(dir.path(), FileKind::Directory).is_none());
        assert!(engine.generate(&fake, FileKind::Image).is_none());
        assert!(engine.generate(&doc, FileKind::Video).is_none());
    }

    #[test]
    fn test_blur_is_render_only() {
        let mut stored = Vec::new();
        checkerboard(64, 64)
            .write_to(&mut Cursor::new(&mut stored), ImageFormat::Png)
            .unwrap();

        let engine = engine(64);
        assert_eq!(engine.render(&stored, Privacy::None).unwrap(), stored);

        let blurred = engine.render(&stored, Privacy::Blurred).unwrap();
        assert_ne!(blurred, stored);
        let img = image::load_from_memory(&blurred).unwrap();
        assert_eq!(img.dimensions(), (64, 64));
    }
}
