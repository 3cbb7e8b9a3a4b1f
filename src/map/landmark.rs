//! Landmark and Observation records.
//!
//! A Landmark is a persistent 3D point in the world frame; each
//! Observation records one sighting of it: the observing frame's pose,
//! the pixel it appeared at, an image patch for photometric tracking,
//! and a quality score. Observations are owned exclusively by their
//! landmark and are released together with it.

use std::collections::VecDeque;

use nalgebra::{Vector2, Vector3};

use crate::geometry::SE3;

use super::types::{FrameId, LandmarkId, ObservationId};

/// Observations with a viewing-angle difference above 60 degrees from the
/// query direction are considered useless for patch alignment.
const MIN_VIEW_COS: f64 = 0.5;

/// One recorded sighting of a landmark.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Identifier within the owning landmark.
    pub id: ObservationId,

    /// Camera-from-world pose of the observing frame at capture time.
    pub pose_cw: SE3,

    /// Pixel location at pyramid level 0.
    pub px: Vector2<f64>,

    /// Pyramid level the patch was extracted at.
    pub level: usize,

    /// Square grayscale patch (`patch_size * patch_size` intensities).
    pub patch: Vec<f32>,

    /// Quality score (lower is weaker; e.g. a Shi-Tomasi response).
    pub score: f32,

    /// Frame this observation was captured in.
    pub frame_id: FrameId,
}

impl Observation {
    /// Camera position in the world frame.
    pub fn camera_position(&self) -> Vector3<f64> {
        self.pose_cw.inverse().translation
    }
}

/// A persistent 3D landmark with its observation history.
#[derive(Debug)]
pub struct Landmark {
    pub id: LandmarkId,

    /// Position in the world frame.
    pub position: Vector3<f64>,

    /// Estimated surface normal (world frame); meaningful only once
    /// `normal_initialized` is set.
    pub normal: Vector3<f64>,

    /// Normal estimate from the previous refinement, kept for smoothing.
    pub previous_normal: Vector3<f64>,

    /// Whether `normal` has ever been estimated.
    pub normal_initialized: bool,

    /// Whether the position estimate has converged; converged landmarks
    /// may have their non-reference observations pruned.
    pub converged: bool,

    /// Observation history, most recent first.
    observations: VecDeque<Observation>,

    /// Designated reference observation, if any. Always a member of
    /// `observations`; cleared when that member is removed.
    ref_obs: Option<ObservationId>,

    /// Frame the landmark was created in.
    pub created_frame: FrameId,

    /// Frame the landmark was last observed in.
    pub last_seen_frame: FrameId,

    /// Next per-landmark observation id.
    next_obs_id: u64,
}

impl Landmark {
    pub fn new(id: LandmarkId, position: Vector3<f64>, created_frame: FrameId) -> Self {
        Self {
            id,
            position,
            normal: Vector3::zeros(),
            previous_normal: Vector3::zeros(),
            normal_initialized: false,
            converged: false,
            observations: VecDeque::new(),
            ref_obs: None,
            created_frame,
            last_seen_frame: created_frame,
            next_obs_id: 0,
        }
    }

    /// Record a new observation (most recent first) and return its id.
    ///
    /// The `id` field of `obs` is overwritten with the next per-landmark id.
    pub fn add_observation(&mut self, mut obs: Observation) -> ObservationId {
        let id = ObservationId(self.next_obs_id);
        self.next_obs_id += 1;
        obs.id = id;
        if obs.frame_id > self.last_seen_frame {
            self.last_seen_frame = obs.frame_id;
        }
        self.observations.push_front(obs);
        id
    }

    /// Remove a specific observation. Clears the reference designation if
    /// it pointed at the removed observation. Returns true if it existed.
    pub fn remove_observation(&mut self, obs_id: ObservationId) -> bool {
        let Some(pos) = self.observations.iter().position(|o| o.id == obs_id) else {
            return false;
        };
        let _ = self.observations.remove(pos);
        if self.ref_obs == Some(obs_id) {
            self.ref_obs = None;
        }
        true
    }

    /// Drop every observation except the designated reference.
    ///
    /// Applied after convergence to cap per-landmark memory. A landmark
    /// without a reference keeps nothing.
    pub fn prune_non_reference(&mut self) {
        let keep = self.ref_obs;
        self.observations.retain(|o| Some(o.id) == keep);
    }

    /// Designate an existing observation as the reference. Returns false
    /// (and leaves the designation unchanged) if the id is not a member.
    pub fn set_reference(&mut self, obs_id: ObservationId) -> bool {
        if self.observations.iter().any(|o| o.id == obs_id) {
            self.ref_obs = Some(obs_id);
            true
        } else {
            false
        }
    }

    pub fn reference(&self) -> Option<&Observation> {
        let id = self.ref_obs?;
        self.observations.iter().find(|o| o.id == id)
    }

    pub fn has_reference(&self) -> bool {
        self.ref_obs.is_some()
    }

    /// Observations, most recent first.
    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    /// Pick the prior observation whose viewing direction is closest to
    /// the direction from this landmark to `viewpoint`.
    ///
    /// Returns `None` when there are no observations or when even the best
    /// one differs by more than 60 degrees. Ties go to the first match in
    /// iteration order (most recent first).
    pub fn closest_view(&self, viewpoint: &Vector3<f64>) -> Option<&Observation> {
        if self.observations.is_empty() {
            return None;
        }

        let query_dir = (viewpoint - self.position).normalize();
        let mut best: Option<&Observation> = None;
        let mut best_cos = 0.0;
        for obs in &self.observations {
            let dir = (obs.camera_position() - self.position).normalize();
            let cos_angle = query_dir.dot(&dir);
            if cos_angle > best_cos {
                best_cos = cos_angle;
                best = Some(obs);
            }
        }

        if best_cos < MIN_VIEW_COS {
            return None;
        }
        best
    }

    /// Pick the observation with the lowest quality score (the weakest
    /// one, e.g. as an eviction candidate). Ties go to the first match in
    /// iteration order.
    pub fn min_score(&self) -> Option<&Observation> {
        let mut best: Option<&Observation> = None;
        let mut min_score = f32::MAX;
        for obs in &self.observations {
            if obs.score < min_score {
                min_score = obs.score;
                best = Some(obs);
            }
        }
        best
    }
}
