//! MapMaintainer - eviction and sliding policies over the two map tiers.
//!
//! Keeps the landmark map bounded: per-voxel capacity eviction on every
//! insertion, per-landmark age eviction once per map-update cycle, and
//! radius-based sliding that transfers distant landmarks from the active
//! tier into the coarser long-term tier. The long-term tier is terminal:
//! its own sliding pass discards.
//!
//! All eviction loops are two-phase (collect ids, then remove) so no pass
//! ever mutates a collection it is iterating.

use nalgebra::Vector3;

use crate::config::{LongTermConfig, MapConfig};

use super::store::LandmarkStore;
use super::types::{FrameId, LandmarkId, VoxelKey};

/// Owns the active and long-term landmark stores and applies the
/// bounding policies.
#[derive(Debug)]
pub struct MapMaintainer {
    active: LandmarkStore,
    long_term: LandmarkStore,
    map_cfg: MapConfig,
    long_cfg: LongTermConfig,
}

impl MapMaintainer {
    pub fn new(map_cfg: MapConfig, long_cfg: LongTermConfig) -> Self {
        Self {
            active: LandmarkStore::new(map_cfg.voxel_size, map_cfg.max_points_per_voxel),
            long_term: LandmarkStore::new(long_cfg.voxel_size, long_cfg.max_points_per_voxel),
            map_cfg,
            long_cfg,
        }
    }

    pub fn active(&self) -> &LandmarkStore {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut LandmarkStore {
        &mut self.active
    }

    pub fn long_term(&self) -> &LandmarkStore {
        &self.long_term
    }

    /// Create a landmark in the active tier, evicting for capacity first
    /// so the per-cell bound is never observable as exceeded.
    pub fn add_landmark(&mut self, position: Vector3<f64>, created_frame: FrameId) -> LandmarkId {
        let key = self.active.key_for(&position);
        Self::evict_for_capacity(&mut self.active, key);
        self.active.add_landmark(position, created_frame)
    }

    /// If `key` is at capacity, remove the landmark with the minimum
    /// observation count in that cell (insertion order breaks ties).
    fn evict_for_capacity(store: &mut LandmarkStore, key: VoxelKey) {
        if store.cell_len(key) < store.max_points_per_voxel() {
            return;
        }

        let mut weakest: Option<(LandmarkId, usize)> = None;
        for &id in store.landmarks_in(key) {
            let Some(landmark) = store.get(id) else {
                continue;
            };
            let count = landmark.num_observations();
            match weakest {
                Some((_, best)) if count >= best => {}
                _ => weakest = Some((id, count)),
            }
        }

        if let Some((id, count)) = weakest {
            tracing::debug!(landmark = %id, observations = count, "capacity eviction");
            store.remove_landmark(id);
        }
    }

    /// Remove every active landmark not observed within `point_max_age`
    /// frames of `current_frame`.
    pub fn evict_aged(&mut self, current_frame: FrameId) {
        let max_age = self.map_cfg.point_max_age;
        let stale: Vec<LandmarkId> = self
            .active
            .ids()
            .filter(|&id| {
                self.active
                    .get(id)
                    .map(|lm| current_frame.0.saturating_sub(lm.last_seen_frame.0) > max_age)
                    .unwrap_or(false)
            })
            .collect();

        if !stale.is_empty() {
            tracing::debug!(count = stale.len(), "age eviction");
        }
        for id in stale {
            self.active.remove_landmark(id);
        }
    }

    /// Transfer active landmarks beyond the local half-size of `center`
    /// into the long-term tier, preserving id and observation history.
    /// The transfer re-keys at the long-term cell size and is subject to
    /// that tier's per-cell capacity.
    pub fn slide_local(&mut self, center: &Vector3<f64>) {
        let outgoing = self
            .active
            .ids_beyond(center, self.map_cfg.local_half_size);
        if !outgoing.is_empty() {
            tracing::debug!(count = outgoing.len(), "sliding to long-term tier");
        }
        for id in outgoing {
            let Some(landmark) = self.active.remove_landmark(id) else {
                continue;
            };
            let key = self.long_term.key_for(&landmark.position);
            Self::evict_for_capacity(&mut self.long_term, key);
            self.long_term.insert_existing(landmark);
        }
    }

    /// Discard long-term landmarks beyond the long-term half-size of
    /// `center`. This tier is terminal, so nothing is transferred.
    pub fn slide_long_term(&mut self, center: &Vector3<f64>) {
        let outgoing = self.long_term.ids_beyond(center, self.long_cfg.half_size);
        if !outgoing.is_empty() {
            tracing::debug!(count = outgoing.len(), "long-term sliding discard");
        }
        for id in outgoing {
            self.long_term.remove_landmark(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;
    use crate::map::landmark::Observation;
    use crate::map::types::ObservationId;
    use nalgebra::{UnitQuaternion, Vector2};

    fn test_obs(frame: u64) -> Observation {
        let pose_wc = SE3::from_rt(UnitQuaternion::identity(), Vector3::new(0.0, 0.0, 5.0));
        Observation {
            id: ObservationId(0),
            pose_cw: pose_wc.inverse(),
            px: Vector2::new(5.0, 5.0),
            level: 0,
            patch: vec![0.0; 64],
            score: 1.0,
            frame_id: FrameId(frame),
        }
    }

    fn small_map_cfg() -> MapConfig {
        MapConfig {
            voxel_size: 1.0,
            max_points_per_voxel: 30,
            point_max_age: 20,
            local_half_size: 10.0,
            sliding_threshold: 1.0,
        }
    }

    fn small_long_cfg() -> LongTermConfig {
        LongTermConfig {
            voxel_size: 4.0,
            max_points_per_voxel: 10,
            half_size: 40.0,
            sliding_threshold: 5.0,
        }
    }

    #[test]
    fn test_capacity_eviction_removes_weakest() {
        let mut maintainer = MapMaintainer::new(small_map_cfg(), small_long_cfg());

        // 31 landmarks in the same cell with observation counts 1..=31 in
        // insertion order.
        let mut ids = Vec::new();
        for i in 0..31u64 {
            let pos = Vector3::new(0.1 + (i as f64) * 0.01, 0.5, 0.5);
            let id = maintainer.add_landmark(pos, FrameId(0));
            for _ in 0..=i {
                let _ = maintainer.active_mut().add_observation(id, test_obs(1));
            }
            ids.push(id);
        }

        let key = maintainer.active().key_for(&Vector3::new(0.5, 0.5, 0.5));
        assert_eq!(maintainer.active().cell_len(key), 30);

        // Exactly the single-observation landmark is gone.
        assert!(!maintainer.active().contains(ids[0]));
        let mut counts: Vec<usize> = maintainer
            .active()
            .landmarks_in(key)
            .iter()
            .map(|&id| maintainer.active().get(id).unwrap().num_observations())
            .collect();
        counts.sort_unstable();
        assert_eq!(counts, (2..=31).collect::<Vec<usize>>());
    }

    #[test]
    fn test_cell_never_exceeds_capacity() {
        let mut maintainer = MapMaintainer::new(small_map_cfg(), small_long_cfg());
        let key = maintainer.active().key_for(&Vector3::new(0.5, 0.5, 0.5));
        for i in 0..100u64 {
            maintainer.add_landmark(Vector3::new(0.2 + (i as f64) * 1e-3, 0.5, 0.5), FrameId(0));
            assert!(maintainer.active().cell_len(key) <= 30);
        }
    }

    #[test]
    fn test_age_eviction() {
        let mut maintainer = MapMaintainer::new(small_map_cfg(), small_long_cfg());
        let fresh = maintainer.add_landmark(Vector3::new(0.5, 0.5, 0.5), FrameId(0));
        let stale = maintainer.add_landmark(Vector3::new(2.5, 0.5, 0.5), FrameId(0));
        let _ = maintainer.active_mut().add_observation(fresh, test_obs(95));
        let _ = maintainer.active_mut().add_observation(stale, test_obs(70));

        maintainer.evict_aged(FrameId(100));
        assert!(maintainer.active().contains(fresh)); // age 5 <= 20
        assert!(!maintainer.active().contains(stale)); // age 30 > 20

        // The property holds for everything that survived.
        for id in maintainer.active().ids().collect::<Vec<_>>() {
            let lm = maintainer.active().get(id).unwrap();
            assert!(100 - lm.last_seen_frame.0 <= 20);
        }
    }

    #[test]
    fn test_never_observed_landmarks_age_from_creation() {
        let mut maintainer = MapMaintainer::new(small_map_cfg(), small_long_cfg());
        let id = maintainer.add_landmark(Vector3::new(0.5, 0.5, 0.5), FrameId(10));
        maintainer.evict_aged(FrameId(25));
        assert!(maintainer.active().contains(id));
        maintainer.evict_aged(FrameId(31));
        assert!(!maintainer.active().contains(id));
    }

    #[test]
    fn test_slide_local_transfers_history() {
        let mut maintainer = MapMaintainer::new(small_map_cfg(), small_long_cfg());
        let near = maintainer.add_landmark(Vector3::new(0.5, 0.5, 0.5), FrameId(3));
        let far = maintainer.add_landmark(Vector3::new(25.0, 0.5, 0.5), FrameId(4));
        let _ = maintainer.active_mut().add_observation(far, test_obs(5));
        let _ = maintainer.active_mut().add_observation(far, test_obs(6));

        maintainer.slide_local(&Vector3::new(0.0, 0.0, 0.0));

        assert!(maintainer.active().contains(near));
        assert!(!maintainer.active().contains(far));

        // Transfer, not copy: same id, same history, same creation frame.
        let moved = maintainer.long_term().get(far).unwrap();
        assert_eq!(moved.id, far);
        assert_eq!(moved.created_frame, FrameId(4));
        assert_eq!(moved.num_observations(), 2);
    }

    #[test]
    fn test_slide_long_term_discards() {
        let mut maintainer = MapMaintainer::new(small_map_cfg(), small_long_cfg());
        let far = maintainer.add_landmark(Vector3::new(25.0, 0.5, 0.5), FrameId(0));
        maintainer.slide_local(&Vector3::zeros());
        assert!(maintainer.long_term().contains(far));

        // Now move far away: beyond the 40 m long-term half-size.
        maintainer.slide_long_term(&Vector3::new(100.0, 0.0, 0.0));
        assert!(!maintainer.long_term().contains(far));
        assert!(maintainer.long_term().is_empty());
    }
}
