//! VisualMapSystem - top-level facade over the map subsystem.
//!
//! Owns the degeneracy estimator, the update scheduler, and the two map
//! tiers, and runs the fixed per-cycle order:
//!
//! 1. [`lidar_update`](VisualMapSystem::lidar_update) - degeneracy update,
//!    then map maintenance (age eviction, sliding once the platform has
//!    moved past the trigger displacement).
//! 2. [`should_use_image`](VisualMapSystem::should_use_image) - gates
//!    whether this cycle's image proceeds to the visual front end.
//! 3. The visual front end (if gated through) queries candidates, selects
//!    reference observations, and inserts landmarks/observations back.
//!
//! The facade also owns the frame-id counter: ids are minted in
//! [`begin_frame`](VisualMapSystem::begin_frame) and passed by value, so
//! no component reads global state.

use std::sync::Arc;

use image::GrayImage;
use nalgebra::Vector3;

use crate::camera::CameraModel;
use crate::config::LivMapConfig;
use crate::degeneracy::{DegeneracyEstimator, PlaneFitStats};
use crate::frame::{Frame, FrameError};
use crate::geometry::SE3;
use crate::map::landmark::Observation;
use crate::map::types::{FrameId, LandmarkId, ObservationId};
use crate::map::MapMaintainer;
use crate::scheduler::UpdateScheduler;

/// The adaptive visual-landmark map subsystem.
pub struct VisualMapSystem {
    config: LivMapConfig,
    estimator: DegeneracyEstimator,
    scheduler: UpdateScheduler,
    maintainer: MapMaintainer,

    /// Next frame id to mint.
    next_frame_id: u64,

    /// Most recently minted frame id; the age reference for eviction.
    current_frame: FrameId,

    /// Platform position at the last active-tier slide.
    last_local_slide: Option<Vector3<f64>>,

    /// Platform position at the last long-term slide.
    last_long_term_slide: Option<Vector3<f64>>,
}

impl VisualMapSystem {
    pub fn new(config: LivMapConfig) -> Self {
        Self {
            estimator: DegeneracyEstimator::new(config.degeneracy.clone()),
            scheduler: UpdateScheduler::new(config.scheduler.clone()),
            maintainer: MapMaintainer::new(config.map.clone(), config.long_term.clone()),
            config,
            next_frame_id: 0,
            current_frame: FrameId(0),
            last_local_slide: None,
            last_long_term_slide: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // LiDAR update cycle
    // ─────────────────────────────────────────────────────────────────────

    /// Ingest one LiDAR update cycle: plane-fit statistics plus the
    /// current pose estimate (world-from-body). Updates the degeneracy
    /// state, then runs map maintenance.
    pub fn lidar_update(&mut self, stats: &PlaneFitStats, pose: &SE3) {
        self.estimator.update(stats);

        self.maintainer.evict_aged(self.current_frame);

        let position = pose.translation;
        if moved_past(&self.last_local_slide, &position, self.config.map.sliding_threshold) {
            self.maintainer.slide_local(&position);
            self.last_local_slide = Some(position);
        }
        if moved_past(
            &self.last_long_term_slide,
            &position,
            self.config.long_term.sliding_threshold,
        ) {
            self.maintainer.slide_long_term(&position);
            self.last_long_term_slide = Some(position);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scheduler surface
    // ─────────────────────────────────────────────────────────────────────

    /// Decide whether this cycle's image runs the visual update. A false
    /// return means the image is dropped, not buffered.
    pub fn should_use_image(&mut self, pose: &SE3) -> bool {
        self.scheduler
            .should_use_image(pose, self.estimator.sigma_min(), self.estimator.is_degenerate())
    }

    /// Debounced LiDAR degeneracy flag (read-only telemetry).
    pub fn is_lidar_degenerate(&self) -> bool {
        self.estimator.is_degenerate()
    }

    /// Normal-covariance conditioning scalar (read-only telemetry).
    pub fn sigma_min(&self) -> f64 {
        self.estimator.sigma_min()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Visual front-end surface
    // ─────────────────────────────────────────────────────────────────────

    /// Mint the next frame id and build the frame for an accepted image.
    ///
    /// Fails for a malformed image, in which case the caller skips the
    /// cycle; the id is consumed either way so frame ids stay strictly
    /// increasing per capture attempt.
    pub fn begin_frame(
        &mut self,
        camera: Arc<dyn CameraModel>,
        image: GrayImage,
    ) -> Result<Frame, FrameError> {
        let id = FrameId(self.next_frame_id);
        self.next_frame_id += 1;
        self.current_frame = id;
        Frame::new(
            id,
            camera,
            image,
            self.config.frame.pyramid_levels,
            self.config.frame.image_downsample,
        )
    }

    /// Landmarks registered in cells within `radius` of `center`.
    pub fn query_candidates(&self, center: &Vector3<f64>, radius: f64) -> Vec<LandmarkId> {
        self.maintainer.active().query_candidates(center, radius)
    }

    /// Best prior observation of a landmark for a query viewpoint, or
    /// `None` for an unknown landmark, an empty history, or a viewing
    /// angle beyond the useful range.
    pub fn select_closest_view(
        &self,
        id: LandmarkId,
        viewpoint: &Vector3<f64>,
    ) -> Option<&Observation> {
        match self.maintainer.active().get(id) {
            Some(landmark) => landmark.closest_view(viewpoint),
            None => {
                tracing::warn!(landmark = %id, "select_closest_view: unknown landmark");
                None
            }
        }
    }

    /// Weakest observation of a landmark by quality score.
    pub fn select_min_score(&self, id: LandmarkId) -> Option<&Observation> {
        match self.maintainer.active().get(id) {
            Some(landmark) => landmark.min_score(),
            None => {
                tracing::warn!(landmark = %id, "select_min_score: unknown landmark");
                None
            }
        }
    }

    /// Insert a new landmark, evicting for per-voxel capacity first.
    pub fn add_landmark(&mut self, position: Vector3<f64>) -> LandmarkId {
        self.maintainer.add_landmark(position, self.current_frame)
    }

    /// Record a new observation of a landmark. Unknown ids are non-fatal
    /// no-ops. A converged landmark keeps only its reference observation,
    /// so the new observation is recorded and the rest pruned.
    pub fn add_observation(&mut self, id: LandmarkId, obs: Observation) -> Option<ObservationId> {
        let obs_id = self.maintainer.active_mut().add_observation(id, obs)?;
        let converged = self
            .maintainer
            .active()
            .get(id)
            .map(|lm| lm.converged)
            .unwrap_or(false);
        if converged {
            self.maintainer.active_mut().prune_non_reference(id);
        }
        Some(obs_id)
    }

    /// Designate an observation as the landmark's reference patch.
    pub fn set_reference(&mut self, id: LandmarkId, obs_id: ObservationId) -> bool {
        match self.maintainer.active_mut().get_mut(id) {
            Some(landmark) => landmark.set_reference(obs_id),
            None => {
                tracing::warn!(landmark = %id, "set_reference: unknown landmark");
                false
            }
        }
    }

    /// Mark a landmark's position estimate as converged and cap its
    /// memory to the reference observation.
    pub fn mark_converged(&mut self, id: LandmarkId) {
        match self.maintainer.active_mut().get_mut(id) {
            Some(landmark) => {
                landmark.converged = true;
            }
            None => {
                tracing::warn!(landmark = %id, "mark_converged: unknown landmark");
                return;
            }
        }
        self.maintainer.active_mut().prune_non_reference(id);
    }

    pub fn maintainer(&self) -> &MapMaintainer {
        &self.maintainer
    }

    pub fn maintainer_mut(&mut self) -> &mut MapMaintainer {
        &mut self.maintainer
    }

    pub fn config(&self) -> &LivMapConfig {
        &self.config
    }
}

fn moved_past(last: &Option<Vector3<f64>>, position: &Vector3<f64>, threshold: f64) -> bool {
    match last {
        Some(last) => (position - last).norm() > threshold,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeCamera;
    use crate::config::MapConfig;
    use nalgebra::{UnitQuaternion, Vector2};

    fn test_camera() -> Arc<dyn CameraModel> {
        Arc::new(PinholeCamera::new(64, 48, 40.0, 40.0, 32.0, 24.0))
    }

    fn test_system() -> VisualMapSystem {
        VisualMapSystem::new(LivMapConfig::default())
    }

    fn obs_from(cam_pos: Vector3<f64>, frame: u64) -> Observation {
        let pose_wc = SE3::from_rt(UnitQuaternion::identity(), cam_pos);
        Observation {
            id: ObservationId(0),
            pose_cw: pose_wc.inverse(),
            px: Vector2::new(10.0, 10.0),
            level: 0,
            patch: vec![0.0; 64],
            score: 1.0,
            frame_id: FrameId(frame),
        }
    }

    fn healthy_stats() -> PlaneFitStats {
        PlaneFitStats {
            effective_count: 100,
            total_count: 120,
            residual_sum: 2.0,
            normals: vec![Vector3::x(), Vector3::y(), Vector3::z()],
        }
    }

    fn degenerate_stats() -> PlaneFitStats {
        PlaneFitStats {
            effective_count: 100,
            total_count: 120,
            residual_sum: 2.0,
            // All normals parallel: sigma_min 0.
            normals: vec![Vector3::z(), Vector3::z(), Vector3::z()],
        }
    }

    #[test]
    fn test_frame_ids_strictly_increase() {
        let mut sys = test_system();
        let cam = test_camera();
        let img = || GrayImage::from_fn(64, 48, |x, _| image::Luma([(x as u8) * 2]));
        let a = sys.begin_frame(cam.clone(), img()).unwrap();
        let b = sys.begin_frame(cam.clone(), img()).unwrap();
        assert!(a.id < b.id);

        // A failed construction still consumes the id.
        assert!(sys.begin_frame(cam.clone(), GrayImage::new(0, 0)).is_err());
        let c = sys.begin_frame(cam, img()).unwrap();
        assert_eq!(c.id, FrameId(3));
    }

    #[test]
    fn test_degeneracy_drives_scheduler() {
        let mut sys = test_system();
        let pose = SE3::identity();

        // Healthy cycles: stride gating applies after the first keyframe.
        for _ in 0..4 {
            sys.lidar_update(&healthy_stats(), &pose);
        }
        assert!(!sys.is_lidar_degenerate());
        assert!(sys.should_use_image(&pose)); // counter 0: stride hit
        assert!(!sys.should_use_image(&pose)); // counter 1: dropped

        // Three degenerate cycles flip the flag; every image is used.
        for _ in 0..3 {
            sys.lidar_update(&degenerate_stats(), &pose);
        }
        assert!(sys.is_lidar_degenerate());
        assert_eq!(sys.sigma_min(), 0.0);
        for _ in 0..5 {
            assert!(sys.should_use_image(&pose));
        }
    }

    #[test]
    fn test_front_end_round_trip() {
        let mut sys = test_system();
        let pos = Vector3::new(1.0, 2.0, 3.0);
        let id = sys.add_landmark(pos);

        let obs_id = sys
            .add_observation(id, obs_from(Vector3::new(1.0, 2.0, 8.0), 1))
            .unwrap();
        assert!(sys.set_reference(id, obs_id));

        let candidates = sys.query_candidates(&pos, 2.0);
        assert!(candidates.contains(&id));

        let found = sys
            .select_closest_view(id, &Vector3::new(1.2, 2.0, 8.0))
            .unwrap();
        assert_eq!(found.id, obs_id);
        assert_eq!(sys.select_min_score(id).unwrap().id, obs_id);
    }

    #[test]
    fn test_unknown_landmark_selects_are_none() {
        let sys = test_system();
        assert!(sys
            .select_closest_view(LandmarkId(99), &Vector3::zeros())
            .is_none());
        assert!(sys.select_min_score(LandmarkId(99)).is_none());
    }

    #[test]
    fn test_converged_landmark_keeps_only_reference() {
        let mut sys = test_system();
        let id = sys.add_landmark(Vector3::zeros());
        let keep = sys
            .add_observation(id, obs_from(Vector3::new(0.0, 0.0, 5.0), 1))
            .unwrap();
        let _ = sys.add_observation(id, obs_from(Vector3::new(1.0, 0.0, 5.0), 2));
        sys.set_reference(id, keep);
        sys.mark_converged(id);

        let lm = sys.maintainer().active().get(id).unwrap();
        assert_eq!(lm.num_observations(), 1);

        // Later observations are recorded, then pruned back down.
        let _ = sys.add_observation(id, obs_from(Vector3::new(0.0, 1.0, 5.0), 3));
        let lm = sys.maintainer().active().get(id).unwrap();
        assert_eq!(lm.num_observations(), 1);
        assert_eq!(lm.reference().unwrap().id, keep);
        assert_eq!(lm.last_seen_frame, FrameId(3));
    }

    #[test]
    fn test_sliding_triggers_on_displacement() {
        let mut sys = VisualMapSystem::new(LivMapConfig {
            map: MapConfig {
                local_half_size: 10.0,
                sliding_threshold: 5.0,
                ..MapConfig::default()
            },
            ..LivMapConfig::default()
        });

        // First update establishes the slide origin.
        sys.lidar_update(&healthy_stats(), &SE3::identity());

        let far_landmark = sys.add_landmark(Vector3::new(30.0, 0.0, 0.0));

        // 2 m of motion: below the 5 m trigger, no slide yet.
        let small_move = SE3::from_rt(UnitQuaternion::identity(), Vector3::new(2.0, 0.0, 0.0));
        sys.lidar_update(&healthy_stats(), &small_move);
        assert!(sys.maintainer().active().contains(far_landmark));

        // 7 m of motion: slide runs, the landmark 23 m out is transferred.
        let big_move = SE3::from_rt(UnitQuaternion::identity(), Vector3::new(7.0, 0.0, 0.0));
        sys.lidar_update(&healthy_stats(), &big_move);
        assert!(!sys.maintainer().active().contains(far_landmark));
        assert!(sys.maintainer().long_term().contains(far_landmark));
    }

    #[test]
    fn test_age_eviction_runs_each_lidar_cycle() {
        let mut sys = test_system();
        let cam = test_camera();
        let img = || GrayImage::from_fn(64, 48, |_, _| image::Luma([128u8]));

        let id = sys.add_landmark(Vector3::new(1.0, 0.0, 0.0));
        let _ = sys.add_observation(id, obs_from(Vector3::new(1.0, 0.0, 5.0), 0));

        // Advance the frame counter past the age limit without re-observing.
        for _ in 0..=sys.config().map.point_max_age {
            sys.begin_frame(cam.clone(), img()).unwrap();
        }
        sys.lidar_update(&healthy_stats(), &SE3::identity());
        assert!(sys.maintainer().active().contains(id)); // age == limit

        sys.begin_frame(cam, img()).unwrap();
        sys.lidar_update(&healthy_stats(), &SE3::identity());
        assert!(!sys.maintainer().active().contains(id)); // age > limit
    }
}
