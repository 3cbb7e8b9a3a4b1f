//! Configuration for the visual-landmark map subsystem.
//!
//! All tunables live here with fixed defaults; nothing is re-configured
//! mid-run. The structs are serde-deserializable so a host application can
//! load them from whatever config format it already uses.

use serde::{Deserialize, Serialize};

/// Configuration for the active (short-term) landmark map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Voxel cell edge length in meters.
    pub voxel_size: f64,

    /// Maximum landmarks registered in one voxel cell.
    pub max_points_per_voxel: usize,

    /// Maximum age (in frames) since a landmark was last observed
    /// before it is evicted.
    pub point_max_age: u64,

    /// Half-size of the active map region around the platform, in meters.
    /// Landmarks beyond this radius are transferred to the long-term tier.
    pub local_half_size: f64,

    /// Platform displacement (meters) since the last slide that triggers
    /// the next sliding pass.
    pub sliding_threshold: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            voxel_size: 0.5,
            max_points_per_voxel: 30,
            point_max_age: 20,
            local_half_size: 100.0,
            sliding_threshold: 8.0,
        }
    }
}

/// Configuration for the coarser long-term landmark map.
///
/// The long-term tier is the terminal one: landmarks sliding out of it
/// are discarded, not transferred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongTermConfig {
    /// Voxel cell edge length in meters (coarser than the active map).
    pub voxel_size: f64,

    /// Maximum landmarks registered in one voxel cell (smaller than the
    /// active map: the long-term tier keeps a sparse summary).
    pub max_points_per_voxel: usize,

    /// Half-size of the long-term region, in meters.
    pub half_size: f64,

    /// Platform displacement (meters) that triggers long-term sliding.
    /// Larger than the active threshold: this tier slides rarely.
    pub sliding_threshold: f64,
}

impl Default for LongTermConfig {
    fn default() -> Self {
        Self {
            voxel_size: 2.0,
            max_points_per_voxel: 10,
            half_size: 500.0,
            sliding_threshold: 50.0,
        }
    }
}

/// Configuration for the visual-update scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Run the visual update every Nth image under normal conditions.
    pub stride_normal: u64,

    /// Stride while the LiDAR is degenerate (1 = every image).
    pub stride_degenerate: u64,

    /// Keyframe translation threshold in meters, before degeneracy scaling.
    pub base_trans_threshold: f64,

    /// Keyframe rotation threshold in radians, before degeneracy scaling.
    pub base_rot_threshold: f64,

    /// Lower clamp for the degeneracy-driven threshold scale.
    pub keyframe_scale_min: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stride_normal: 3,
            stride_degenerate: 1,
            base_trans_threshold: 0.5,
            base_rot_threshold: 0.26,
            keyframe_scale_min: 0.2,
        }
    }
}

/// Configuration for frame construction and patch extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Number of pyramid levels, level 0 included.
    pub pyramid_levels: usize,

    /// Patch edge length in pixels (patches are square).
    pub patch_size: usize,

    /// Integer downsample factor applied to the input image before the
    /// pyramid is built (1 = full resolution; must be a power of two).
    pub image_downsample: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            pyramid_levels: 4,
            patch_size: 8,
            image_downsample: 1,
        }
    }
}

/// Thresholds for the LiDAR degeneracy estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegeneracyConfig {
    /// A normal-covariance eigenvalue ratio below this marks the cycle
    /// degenerate.
    pub sigma_min_threshold: f64,

    /// A matched-plane ratio below this marks the cycle degenerate.
    pub min_plane_ratio: f64,

    /// A mean residual above this marks the cycle degenerate.
    pub max_avg_residual: f64,

    /// Consecutive cycles required before the flag flips, in both
    /// directions.
    pub hysteresis: u32,
}

impl Default for DegeneracyConfig {
    fn default() -> Self {
        Self {
            sigma_min_threshold: 0.07,
            min_plane_ratio: 0.15,
            max_avg_residual: 0.12,
            hysteresis: 3,
        }
    }
}

/// Aggregate configuration for the whole subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LivMapConfig {
    pub map: MapConfig,
    pub long_term: LongTermConfig,
    pub scheduler: SchedulerConfig,
    pub frame: FrameConfig,
    pub degeneracy: DegeneracyConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let cfg = LivMapConfig::default();
        assert!(cfg.long_term.voxel_size > cfg.map.voxel_size);
        assert!(cfg.long_term.max_points_per_voxel < cfg.map.max_points_per_voxel);
        assert!(cfg.long_term.half_size > cfg.map.local_half_size);
        assert!(cfg.scheduler.stride_degenerate <= cfg.scheduler.stride_normal);
        assert!(cfg.scheduler.keyframe_scale_min > 0.0);
        assert!(cfg.scheduler.keyframe_scale_min <= 1.0);
    }
}
