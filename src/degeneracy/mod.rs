//! LiDAR degeneracy estimation from per-cycle plane-fit statistics.
//!
//! The state estimator hands over, once per LiDAR update cycle, how many
//! down-sampled features found a plane match, the summed residual
//! magnitudes, and the matched plane normals. From those this module
//! derives a conditioning measure of the normal covariance and a
//! hysteresis-debounced degeneracy flag that the scheduler uses to raise
//! the visual update rate when LiDAR geometry alone cannot constrain the
//! motion (long corridors, open fields, tunnel walls).

use nalgebra::{Matrix3, Vector3};

use crate::config::DegeneracyConfig;

/// Plane-fit statistics for one LiDAR update cycle.
#[derive(Debug, Clone, Default)]
pub struct PlaneFitStats {
    /// Features with a successful planar match.
    pub effective_count: usize,

    /// Total down-sampled features this cycle.
    pub total_count: usize,

    /// Sum of per-feature residual magnitudes.
    pub residual_sum: f64,

    /// Matched plane unit normals.
    pub normals: Vec<Vector3<f64>>,
}

/// Per-cycle degeneracy measurements and the derived flag.
#[derive(Debug, Clone, Default)]
pub struct DegeneracyState {
    /// Smallest-to-largest eigenvalue ratio of the accumulated
    /// normal-covariance matrix; 0 when no usable normals arrived.
    pub sigma_min: f64,

    /// Matched planar features over total down-sampled features.
    pub valid_plane_ratio: f64,

    /// Mean residual magnitude over matched features.
    pub avg_residual: f64,

    /// Consecutive degenerate cycles, floored at 0.
    pub counter: u32,

    /// Debounced degeneracy flag.
    pub degenerate: bool,
}

/// Smoothed, debounced LiDAR degeneracy estimator.
#[derive(Debug)]
pub struct DegeneracyEstimator {
    cfg: DegeneracyConfig,
    state: DegeneracyState,
}

impl DegeneracyEstimator {
    pub fn new(cfg: DegeneracyConfig) -> Self {
        Self {
            cfg,
            state: DegeneracyState::default(),
        }
    }

    /// Ingest one cycle of plane-fit statistics. Called exactly once per
    /// LiDAR update.
    pub fn update(&mut self, stats: &PlaneFitStats) {
        let state = &mut self.state;
        state.valid_plane_ratio =
            stats.effective_count as f64 / stats.total_count.max(1) as f64;
        state.avg_residual = stats.residual_sum / stats.effective_count.max(1) as f64;
        state.sigma_min = normal_covariance_ratio(&stats.normals);

        let degenerate_now = state.sigma_min < self.cfg.sigma_min_threshold
            || state.valid_plane_ratio < self.cfg.min_plane_ratio
            || state.avg_residual > self.cfg.max_avg_residual;

        if degenerate_now {
            state.counter = state.counter.saturating_add(1);
        } else {
            state.counter = state.counter.saturating_sub(1);
        }

        let was = state.degenerate;
        state.degenerate = state.counter >= self.cfg.hysteresis;
        if state.degenerate != was {
            tracing::info!(
                degenerate = state.degenerate,
                sigma_min = state.sigma_min,
                plane_ratio = state.valid_plane_ratio,
                avg_residual = state.avg_residual,
                "LiDAR degeneracy flag changed"
            );
        }
    }

    /// Debounced degeneracy flag.
    pub fn is_degenerate(&self) -> bool {
        self.state.degenerate
    }

    /// Conditioning of this cycle's normal covariance, in [0, 1].
    /// Doubles as the confidence scalar for keyframe-threshold scaling.
    pub fn sigma_min(&self) -> f64 {
        self.state.sigma_min
    }

    pub fn state(&self) -> &DegeneracyState {
        &self.state
    }
}

/// Smallest-to-largest eigenvalue ratio of `N = Σ nᵢ nᵢᵀ`.
///
/// Returns 0 when the largest eigenvalue is numerically zero (no usable
/// normals this cycle); never divides by zero.
fn normal_covariance_ratio(normals: &[Vector3<f64>]) -> f64 {
    let mut n = Matrix3::zeros();
    for normal in normals {
        n += normal * normal.transpose();
    }

    let eigenvalues = n.symmetric_eigen().eigenvalues;
    let max = eigenvalues.max();
    if max <= 1e-12 {
        return 0.0;
    }
    // N is positive semi-definite; clamp tiny negative eigenvalues from
    // floating-point noise.
    let min = eigenvalues.min().max(0.0);
    min / max
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stats built to hit an exact sigma_min with healthy ratios.
    fn stats_with_normals(normals: Vec<Vector3<f64>>) -> PlaneFitStats {
        let count = normals.len().max(1);
        PlaneFitStats {
            effective_count: count,
            total_count: count,
            residual_sum: 0.01 * count as f64,
            normals,
        }
    }

    /// Normals spanning all axes, scaled so min/max eigenvalue == ratio.
    fn anisotropic_normals(ratio: f64) -> Vec<Vector3<f64>> {
        // With axis-aligned normals, N is diagonal with entries equal to
        // the squared counts per axis; use weighted repeats instead:
        // one x normal, one y normal, and sqrt(ratio)-scaled z normal
        // gives eigenvalues {1, 1, ratio}.
        vec![
            Vector3::x(),
            Vector3::y(),
            Vector3::z() * ratio.sqrt(),
        ]
    }

    #[test]
    fn test_sigma_min_zero_without_normals() {
        assert_eq!(normal_covariance_ratio(&[]), 0.0);
        assert_eq!(normal_covariance_ratio(&[Vector3::zeros()]), 0.0);
    }

    #[test]
    fn test_sigma_min_isotropic_is_one() {
        let ratio =
            normal_covariance_ratio(&[Vector3::x(), Vector3::y(), Vector3::z()]);
        assert!((ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sigma_min_anisotropic() {
        let ratio = normal_covariance_ratio(&anisotropic_normals(0.25));
        assert!((ratio - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_flag_hysteresis_both_directions() {
        let mut est = DegeneracyEstimator::new(DegeneracyConfig::default());

        // sigma_min = 0.05 < 0.07: degenerate cycles.
        let bad = stats_with_normals(anisotropic_normals(0.05));
        // sigma_min = 0.5: healthy cycles.
        let good = stats_with_normals(anisotropic_normals(0.5));

        est.update(&bad);
        assert!(!est.is_degenerate()); // counter 1
        est.update(&bad);
        assert!(!est.is_degenerate()); // counter 2
        est.update(&bad);
        assert!(est.is_degenerate()); // counter 3: flag turns on 3rd cycle

        est.update(&good);
        assert!(!est.is_degenerate()); // counter 2
        est.update(&good);
        assert!(!est.is_degenerate()); // counter 1
        est.update(&good);
        assert!(!est.is_degenerate()); // counter 0
        assert_eq!(est.state().counter, 0);

        // Counter floors at zero, never negative.
        est.update(&good);
        assert_eq!(est.state().counter, 0);
    }

    #[test]
    fn test_flag_stays_on_past_threshold() {
        let mut est = DegeneracyEstimator::new(DegeneracyConfig::default());
        let bad = stats_with_normals(anisotropic_normals(0.05));
        let good = stats_with_normals(anisotropic_normals(0.5));

        for _ in 0..5 {
            est.update(&bad); // counter 5
        }
        assert!(est.is_degenerate());
        est.update(&good); // counter 4
        assert!(est.is_degenerate());
        est.update(&good); // counter 3
        assert!(est.is_degenerate());
        est.update(&good); // counter 2
        assert!(!est.is_degenerate());
    }

    #[test]
    fn test_low_plane_ratio_is_degenerate() {
        let mut est = DegeneracyEstimator::new(DegeneracyConfig::default());
        let stats = PlaneFitStats {
            effective_count: 10,
            total_count: 100, // ratio 0.1 < 0.15
            residual_sum: 0.1,
            normals: vec![Vector3::x(), Vector3::y(), Vector3::z()],
        };
        for _ in 0..3 {
            est.update(&stats);
        }
        assert!(est.is_degenerate());
    }

    #[test]
    fn test_high_residual_is_degenerate() {
        let mut est = DegeneracyEstimator::new(DegeneracyConfig::default());
        let stats = PlaneFitStats {
            effective_count: 10,
            total_count: 10,
            residual_sum: 2.0, // avg 0.2 > 0.12
            normals: vec![Vector3::x(), Vector3::y(), Vector3::z()],
        };
        for _ in 0..3 {
            est.update(&stats);
        }
        assert!(est.is_degenerate());
    }

    #[test]
    fn test_empty_cycle_never_divides_by_zero() {
        let mut est = DegeneracyEstimator::new(DegeneracyConfig::default());
        est.update(&PlaneFitStats::default());
        assert_eq!(est.sigma_min(), 0.0);
        assert_eq!(est.state().valid_plane_ratio, 0.0);
        assert_eq!(est.state().avg_residual, 0.0);
    }
}
