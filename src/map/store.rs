//! LandmarkStore - arena of landmarks plus their voxel registration.
//!
//! The store owns every landmark record (and hence every observation) in
//! one map tier. Spatial queries go through the embedded [`VoxelIndex`];
//! the index holds only ids, so removing a landmark here structurally
//! releases its observations with no dangling references anywhere.
//!
//! Operations referencing an unknown landmark id are non-fatal no-ops:
//! they indicate a stale id upstream (e.g. a candidate evicted earlier in
//! the same cycle), which is logged and otherwise ignored.

use std::collections::HashMap;

use nalgebra::Vector3;

use super::landmark::{Landmark, Observation};
use super::types::{FrameId, LandmarkId, ObservationId, VoxelKey};
use super::voxel_index::VoxelIndex;

/// One tier of the landmark map (active or long-term).
#[derive(Debug)]
pub struct LandmarkStore {
    landmarks: HashMap<LandmarkId, Landmark>,
    index: VoxelIndex,

    /// Cell each landmark was registered in. A landmark's position may be
    /// refined after insertion, so deregistration must use the cell it
    /// was actually filed under, not the cell its current position maps
    /// to. A landmark is in exactly one cell at a time; crossing a cell
    /// boundary is an explicit remove + reinsert, never implicit.
    registered: HashMap<LandmarkId, VoxelKey>,

    /// Per-cell capacity; enforced by the maintainer, recorded here so a
    /// transfer target knows its own bound.
    max_points_per_voxel: usize,

    /// Next id to mint. Zero in the long-term tier, which only receives
    /// transferred landmarks.
    next_id: u64,
}

impl LandmarkStore {
    pub fn new(voxel_size: f64, max_points_per_voxel: usize) -> Self {
        Self {
            landmarks: HashMap::new(),
            index: VoxelIndex::new(voxel_size),
            registered: HashMap::new(),
            max_points_per_voxel,
            next_id: 0,
        }
    }

    pub fn max_points_per_voxel(&self) -> usize {
        self.max_points_per_voxel
    }

    /// Create a landmark at `position`: zero normal, unconverged, no
    /// observations, registered in the cell for `position`.
    pub fn add_landmark(&mut self, position: Vector3<f64>, created_frame: FrameId) -> LandmarkId {
        let id = LandmarkId(self.next_id);
        self.next_id += 1;
        let landmark = Landmark::new(id, position, created_frame);
        let key = self.index.key_for(&position);
        self.index.insert(key, id);
        self.registered.insert(id, key);
        self.landmarks.insert(id, landmark);
        id
    }

    /// Insert an already-built landmark, keeping its id and history.
    ///
    /// Used by sliding transfers between tiers; the cell is re-derived at
    /// this store's cell size. Bumps the id counter past the incoming id
    /// so a store that both mints and receives can never collide.
    pub fn insert_existing(&mut self, landmark: Landmark) {
        let id = landmark.id;
        self.next_id = self.next_id.max(id.0 + 1);
        let key = self.index.key_for(&landmark.position);
        self.index.insert(key, id);
        self.registered.insert(id, key);
        self.landmarks.insert(id, landmark);
    }

    /// Append an observation (most recent first) to a landmark.
    pub fn add_observation(&mut self, id: LandmarkId, obs: Observation) -> Option<ObservationId> {
        match self.landmarks.get_mut(&id) {
            Some(landmark) => Some(landmark.add_observation(obs)),
            None => {
                tracing::warn!(landmark = %id, "add_observation: unknown landmark");
                None
            }
        }
    }

    /// Remove a specific observation from a landmark. Clears the reference
    /// designation if it pointed at the removed observation.
    pub fn remove_observation(&mut self, id: LandmarkId, obs_id: ObservationId) {
        match self.landmarks.get_mut(&id) {
            Some(landmark) => {
                landmark.remove_observation(obs_id);
            }
            None => tracing::warn!(landmark = %id, "remove_observation: unknown landmark"),
        }
    }

    /// Remove a landmark: deregister its voxel cell and drop the record
    /// together with all its observations. Returns the record so a caller
    /// performing a transfer can keep it.
    pub fn remove_landmark(&mut self, id: LandmarkId) -> Option<Landmark> {
        let landmark = self.landmarks.remove(&id)?;
        if let Some(key) = self.registered.remove(&id) {
            self.index.remove(key, id);
        }
        Some(landmark)
    }

    /// Drop every observation of a landmark except its reference.
    pub fn prune_non_reference(&mut self, id: LandmarkId) {
        match self.landmarks.get_mut(&id) {
            Some(landmark) => landmark.prune_non_reference(),
            None => tracing::warn!(landmark = %id, "prune_non_reference: unknown landmark"),
        }
    }

    pub fn get(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(&id)
    }

    pub fn get_mut(&mut self, id: LandmarkId) -> Option<&mut Landmark> {
        self.landmarks.get_mut(&id)
    }

    pub fn contains(&self, id: LandmarkId) -> bool {
        self.landmarks.contains_key(&id)
    }

    /// Ids of all landmarks registered in cells whose center lies within
    /// `radius` of `center`.
    pub fn query_candidates(&self, center: &Vector3<f64>, radius: f64) -> Vec<LandmarkId> {
        let mut out = Vec::new();
        for key in self.index.cells_within(center, radius) {
            out.extend_from_slice(self.index.landmarks_in(key));
        }
        out
    }

    /// Ids of all landmarks registered in cells whose center lies beyond
    /// `radius` of `center`, for the sliding passes.
    pub fn ids_beyond(&self, center: &Vector3<f64>, radius: f64) -> Vec<LandmarkId> {
        let mut out = Vec::new();
        for key in self.index.cells_beyond(center, radius) {
            out.extend_from_slice(self.index.landmarks_in(key));
        }
        out
    }

    /// Cell key for a position, at this store's cell size.
    pub fn key_for(&self, position: &Vector3<f64>) -> VoxelKey {
        self.index.key_for(position)
    }

    /// Number of landmarks registered in a cell.
    pub fn cell_len(&self, key: VoxelKey) -> usize {
        self.index.cell_len(key)
    }

    /// Landmark ids in a cell, in insertion order.
    pub fn landmarks_in(&self, key: VoxelKey) -> &[LandmarkId] {
        self.index.landmarks_in(key)
    }

    pub fn ids(&self) -> impl Iterator<Item = LandmarkId> + '_ {
        self.landmarks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}
