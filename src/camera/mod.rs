//! Camera capability interface.
//!
//! The map subsystem only ever needs four things from a camera: its
//! resolution and the project/unproject pair. Concrete sensor types
//! implement [`CameraModel`]; nothing downstream depends on a concrete
//! camera. Images are assumed rectified upstream, so the pinhole
//! implementation applies no distortion.

use nalgebra::{Vector2, Vector3};

/// Minimal camera capability used by the map subsystem.
pub trait CameraModel: Send + Sync {
    /// Declared image width in pixels.
    fn width(&self) -> u32;

    /// Declared image height in pixels.
    fn height(&self) -> u32;

    /// Project a camera-frame point to a pixel. `None` when the point is
    /// behind the camera or lands outside the image.
    fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>>;

    /// Unit bearing in the camera frame through a pixel.
    fn unproject(&self, px: &Vector2<f64>) -> Vector3<f64>;
}

/// Pinhole camera (fx, fy, cx, cy), rectified input.
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    width: u32,
    height: u32,
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
}

impl PinholeCamera {
    pub fn new(width: u32, height: u32, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
        }
    }

    /// The same camera at half resolution, matching one pyramid halving
    /// or an input downsample step.
    pub fn half_resolution(&self) -> Self {
        Self {
            width: self.width / 2,
            height: self.height / 2,
            fx: self.fx / 2.0,
            fy: self.fy / 2.0,
            cx: self.cx / 2.0,
            cy: self.cy / 2.0,
        }
    }
}

impl CameraModel for PinholeCamera {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p_cam.z <= 0.0 {
            return None;
        }
        let u = self.fx * p_cam.x / p_cam.z + self.cx;
        let v = self.fy * p_cam.y / p_cam.z + self.cy;
        if u < 0.0 || v < 0.0 || u >= self.width as f64 || v >= self.height as f64 {
            return None;
        }
        Some(Vector2::new(u, v))
    }

    fn unproject(&self, px: &Vector2<f64>) -> Vector3<f64> {
        Vector3::new(
            (px.x - self.cx) / self.fx,
            (px.y - self.cy) / self.fy,
            1.0,
        )
        .normalize()
    }
}
