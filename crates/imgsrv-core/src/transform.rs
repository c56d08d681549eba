//! Pixel transforms behind the `ImageProcessor` seam.
//!
//! Sessions only see `ImageProcessor`: a stored input path goes in, the path
//! of the processed PNG comes out. `RasterProcessor` is the production
//! implementation built on the `image` crate.
//!
//! Implementations perform blocking file I/O and CPU work and should be
//! called via `spawn_blocking`.

use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use thiserror::Error;
use tracing::debug;

use crate::command::TransformKind;
use crate::naming::processed_path;

/// Errors produced by a transform.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Failed to read image {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Failed to write image {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("Invalid threshold {threshold} (expected 0..=255)")]
    InvalidThreshold { threshold: i32 },

    #[error("Binary transform requires a threshold")]
    MissingThreshold,

    #[error("Transform task failed: {0}")]
    Task(String),
}

/// Performs the pixel transform for a stored upload.
pub trait ImageProcessor: Send + Sync + 'static {
    /// Converts `input` to grayscale, returning the processed file path.
    fn grayscale(&self, input: &Path) -> Result<PathBuf, TransformError>;

    /// Thresholds `input` to black and white, returning the processed file path.
    fn binary(&self, input: &Path, threshold: i32) -> Result<PathBuf, TransformError>;

    /// Dispatches to the transform a command selected.
    fn apply(
        &self,
        transform: TransformKind,
        input: &Path,
        threshold: Option<i32>,
    ) -> Result<PathBuf, TransformError> {
        match transform {
            TransformKind::Grayscale => self.grayscale(input),
            TransformKind::Binary => {
                let threshold = threshold.ok_or(TransformError::MissingThreshold)?;
                self.binary(input, threshold)
            }
        }
    }
}

/// `ImageProcessor` backed by the `image` crate. Output is always PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterProcessor;

impl RasterProcessor {
    /// Creates a new processor.
    pub fn new() -> Self {
        Self
    }

    fn load(input: &Path) -> Result<DynamicImage, TransformError> {
        // Decode by content: uploads are stored with a fixed extension whatever
        // their real format.
        let bytes = fs::read(input).map_err(|e| TransformError::Read {
            path: input.to_path_buf(),
            reason: e.to_string(),
        })?;

        image::load_from_memory(&bytes).map_err(|e| TransformError::Decode {
            path: input.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn save(image: &DynamicImage, output: &Path) -> Result<(), TransformError> {
        image
            .save_with_format(output, ImageFormat::Png)
            .map_err(|e| {
                let _ = fs::remove_file(output);
                TransformError::Encode {
                    path: output.to_path_buf(),
                    reason: e.to_string(),
                }
            })
    }
}

impl ImageProcessor for RasterProcessor {
    fn grayscale(&self, input: &Path) -> Result<PathBuf, TransformError> {
        let image = Self::load(input)?;
        let output = processed_path(input, TransformKind::Grayscale);

        Self::save(&image.grayscale(), &output)?;

        debug!(input = %input.display(), output = %output.display(), "Grayscale written");
        Ok(output)
    }

    fn binary(&self, input: &Path, threshold: i32) -> Result<PathBuf, TransformError> {
        let level = u8::try_from(threshold)
            .map_err(|_| TransformError::InvalidThreshold { threshold })?;

        let mut luma = Self::load(input)?.to_luma8();
        for pixel in luma.pixels_mut() {
            pixel.0 = [if pixel.0[0] >= level { u8::MAX } else { 0 }];
        }

        let output = processed_path(input, TransformKind::Binary);
        Self::save(&DynamicImage::ImageLuma8(luma), &output)?;

        debug!(
            input = %input.display(),
            output = %output.display(),
            threshold,
            "Binary image written"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_gradient(dir: &TempDir, name: &str, format: ImageFormat) -> PathBuf {
        let img = RgbImage::from_fn(16, 8, |x, y| Rgb([(x * 16) as u8, (y * 32) as u8, 200]));
        let path = dir.path().join(name);
        DynamicImage::ImageRgb8(img)
            .save_with_format(&path, format)
            .unwrap();
        path
    }

    #[test]
    fn test_grayscale_produces_luma_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gradient(&dir, "abc_upload.png", ImageFormat::Png);

        let output = RasterProcessor::new().grayscale(&input).unwrap();

        assert_eq!(output, dir.path().join("abc_upload-gs.png"));
        let result = image::open(&output).unwrap();
        assert_eq!(result.dimensions(), (16, 8));
        assert_eq!(result.color(), image::ColorType::L8);
    }

    #[test]
    fn test_grayscale_decodes_by_content() {
        let dir = tempfile::tempdir().unwrap();
        // JPEG bytes behind a .png name, as uploads are stored.
        let input = write_gradient(&dir, "jpeg_upload.png", ImageFormat::Jpeg);

        let output = RasterProcessor::new().grayscale(&input).unwrap();
        assert!(output.exists());
    }

    #[test]
    fn test_binary_is_black_and_white() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gradient(&dir, "bin_upload.png", ImageFormat::Png);

        let output = RasterProcessor::new().binary(&input, 100).unwrap();

        assert_eq!(output, dir.path().join("bin_upload-bin.png"));
        let luma = image::open(&output).unwrap().to_luma8();
        assert!(luma.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert!(luma.pixels().any(|p| p.0[0] == 0));
        assert!(luma.pixels().any(|p| p.0[0] == 255));
    }

    #[test]
    fn test_binary_rejects_out_of_range_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gradient(&dir, "bad.png", ImageFormat::Png);

        for threshold in [-1, 256, i32::MAX] {
            let err = RasterProcessor::new().binary(&input, threshold).unwrap_err();
            assert!(matches!(err, TransformError::InvalidThreshold { .. }));
        }
        assert!(!dir.path().join("bad-bin.png").exists());
    }

    #[test]
    fn test_undecodable_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("junk.png");
        fs::write(&input, b"definitely not an image").unwrap();

        let err = RasterProcessor::new().grayscale(&input).unwrap_err();
        assert!(matches!(err, TransformError::Decode { .. }));
        assert!(!dir.path().join("junk-gs.png").exists());
    }

    #[test]
    fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = RasterProcessor::new()
            .grayscale(&dir.path().join("missing.png"))
            .unwrap_err();
        assert!(matches!(err, TransformError::Read { .. }));
    }

    #[test]
    fn test_apply_requires_threshold_for_binary() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_gradient(&dir, "apply.png", ImageFormat::Png);

        let err = RasterProcessor::new()
            .apply(TransformKind::Binary, &input, None)
            .unwrap_err();
        assert!(matches!(err, TransformError::MissingThreshold));

        let output = RasterProcessor::new()
            .apply(TransformKind::Binary, &input, Some(128))
            .unwrap();
        assert!(output.exists());
    }
}
