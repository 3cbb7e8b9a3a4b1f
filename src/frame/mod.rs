//! Frame - one sensor capture cycle: grayscale image, pyramid, camera.
//!
//! A frame owns its image pyramid (level 0 is the input, each further
//! level half-sampled) and a handle to the camera it was captured with.
//! The frame id is minted by whichever component owns the processing
//! cycle and passed in; frames hold no global state.
//!
//! A malformed image is a construction failure for the cycle, not a
//! silent default: the caller skips the cycle on error.

use std::sync::Arc;

use image::GrayImage;
use nalgebra::Vector2;
use thiserror::Error;

use crate::camera::CameraModel;
use crate::map::types::FrameId;

/// Frame construction failures (the only fatal surface in the subsystem).
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("provided image is empty")]
    EmptyImage,

    #[error("pyramid of {levels} levels is too deep for a {width}x{height} image")]
    PyramidTooDeep {
        levels: usize,
        width: u32,
        height: u32,
    },
}

/// One camera capture with its image pyramid.
pub struct Frame {
    pub id: FrameId,
    pub camera: Arc<dyn CameraModel>,

    /// Image pyramid; `pyramid[0]` is the (possibly downsampled) input,
    /// each further level half the previous one.
    pub pyramid: Vec<GrayImage>,
}

impl Frame {
    /// Build a frame from a grayscale image.
    ///
    /// `downsample` halves the input that many powers of two before the
    /// pyramid is built (1 = full resolution). A resolution mismatch
    /// against the camera model is tolerated with a warning, matching the
    /// behavior of scaled inputs; an empty image or a pyramid that would
    /// halve to zero pixels is an error.
    pub fn new(
        id: FrameId,
        camera: Arc<dyn CameraModel>,
        image: GrayImage,
        levels: usize,
        downsample: u32,
    ) -> Result<Self, FrameError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::EmptyImage);
        }

        if image.width() != camera.width() || image.height() != camera.height() {
            tracing::warn!(
                frame = %id,
                image_width = image.width(),
                image_height = image.height(),
                camera_width = camera.width(),
                camera_height = camera.height(),
                "image size differs from camera model, continuing with scaled input"
            );
        }

        let mut base = image;
        let mut factor = downsample.max(1);
        while factor > 1 {
            if base.width() < 2 || base.height() < 2 {
                return Err(FrameError::EmptyImage);
            }
            base = half_sample(&base);
            factor /= 2;
        }

        let levels = levels.max(1);
        if base.width() >> (levels - 1) == 0 || base.height() >> (levels - 1) == 0 {
            return Err(FrameError::PyramidTooDeep {
                levels,
                width: base.width(),
                height: base.height(),
            });
        }

        let mut pyramid = Vec::with_capacity(levels);
        pyramid.push(base);
        for level in 1..levels {
            let next = half_sample(&pyramid[level - 1]);
            pyramid.push(next);
        }

        Ok(Self {
            id,
            camera,
            pyramid,
        })
    }

    /// Extract a square patch of `patch_size * patch_size` intensities
    /// centered on `px` (level-0 pixel coordinates) at the given pyramid
    /// level, bilinearly interpolated.
    ///
    /// Returns `None` when the patch footprint leaves the image.
    pub fn extract_patch(
        &self,
        px: &Vector2<f64>,
        level: usize,
        patch_size: usize,
    ) -> Option<Vec<f32>> {
        let img = self.pyramid.get(level)?;
        let scale = 1.0 / (1 << level) as f64;
        let cx = px.x * scale;
        let cy = px.y * scale;
        let half = patch_size as f64 / 2.0;

        // Bilinear sampling reads the pixel to the right/below.
        if cx - half < 0.0
            || cy - half < 0.0
            || cx + half + 1.0 >= img.width() as f64
            || cy + half + 1.0 >= img.height() as f64
        {
            return None;
        }

        let mut patch = Vec::with_capacity(patch_size * patch_size);
        for dy in 0..patch_size {
            for dx in 0..patch_size {
                let x = cx - half + dx as f64;
                let y = cy - half + dy as f64;
                patch.push(bilinear(img, x, y));
            }
        }
        Some(patch)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("levels", &self.pyramid.len())
            .field("width", &self.pyramid[0].width())
            .field("height", &self.pyramid[0].height())
            .finish()
    }
}

/// Half-sample an image by averaging 2x2 blocks.
pub fn half_sample(img: &GrayImage) -> GrayImage {
    let w = img.width() / 2;
    let h = img.height() / 2;
    GrayImage::from_fn(w, h, |x, y| {
        let sum = img.get_pixel(2 * x, 2 * y).0[0] as u16
            + img.get_pixel(2 * x + 1, 2 * y).0[0] as u16
            + img.get_pixel(2 * x, 2 * y + 1).0[0] as u16
            + img.get_pixel(2 * x + 1, 2 * y + 1).0[0] as u16;
        image::Luma([(sum / 4) as u8])
    })
}

/// Bilinear intensity at fractional coordinates.
fn bilinear(img: &GrayImage, x: f64, y: f64) -> f32 {
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let p00 = img.get_pixel(x0, y0).0[0] as f32;
    let p10 = img.get_pixel(x0 + 1, y0).0[0] as f32;
    let p01 = img.get_pixel(x0, y0 + 1).0[0] as f32;
    let p11 = img.get_pixel(x0 + 1, y0 + 1).0[0] as f32;

    (1.0 - fx) * (1.0 - fy) * p00 + fx * (1.0 - fy) * p10 + (1.0 - fx) * fy * p01 + fx * fy * p11
}
