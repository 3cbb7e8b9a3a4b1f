//! Spatial hash from voxel cells to the landmarks registered in them.
//!
//! The index is purely in-memory and holds no landmark data itself, only
//! ids. A landmark is registered in exactly one cell at a time: the cell
//! derived from its position when it was last inserted. Moving a landmark
//! across a cell boundary is an explicit remove + reinsert at the call
//! site, never something the index does implicitly.

use std::collections::HashMap;

use nalgebra::Vector3;

use super::types::{LandmarkId, VoxelKey};

/// Voxel-cell index over landmark ids.
#[derive(Debug)]
pub struct VoxelIndex {
    /// Cell edge length in meters.
    cell_size: f64,

    /// Per-cell landmark ids, kept in insertion order so that eviction
    /// tie-breaks are deterministic.
    cells: HashMap<VoxelKey, Vec<LandmarkId>>,
}

impl VoxelIndex {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
        }
    }

    /// Cell key for a world position.
    pub fn key_for(&self, position: &Vector3<f64>) -> VoxelKey {
        VoxelKey([
            (position.x / self.cell_size).floor() as i32,
            (position.y / self.cell_size).floor() as i32,
            (position.z / self.cell_size).floor() as i32,
        ])
    }

    /// World-frame center of a cell.
    pub fn cell_center(&self, key: VoxelKey) -> Vector3<f64> {
        Vector3::new(
            (key.0[0] as f64 + 0.5) * self.cell_size,
            (key.0[1] as f64 + 0.5) * self.cell_size,
            (key.0[2] as f64 + 0.5) * self.cell_size,
        )
    }

    /// Register a landmark in a cell.
    pub fn insert(&mut self, key: VoxelKey, id: LandmarkId) {
        self.cells.entry(key).or_default().push(id);
    }

    /// Deregister a landmark from a cell. Preserves the insertion order of
    /// the remaining ids; removing from an unknown cell is a no-op.
    pub fn remove(&mut self, key: VoxelKey, id: LandmarkId) {
        if let Some(ids) = self.cells.get_mut(&key) {
            if let Some(pos) = ids.iter().position(|&x| x == id) {
                ids.remove(pos);
            }
            if ids.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    /// Landmark ids registered in a cell, in insertion order.
    pub fn landmarks_in(&self, key: VoxelKey) -> &[LandmarkId] {
        self.cells.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of landmarks registered in a cell.
    pub fn cell_len(&self, key: VoxelKey) -> usize {
        self.cells.get(&key).map(Vec::len).unwrap_or(0)
    }

    /// Keys of all occupied cells whose center lies within `radius` of
    /// `center`.
    pub fn cells_within(&self, center: &Vector3<f64>, radius: f64) -> Vec<VoxelKey> {
        self.cells
            .keys()
            .copied()
            .filter(|&key| (self.cell_center(key) - center).norm() <= radius)
            .collect()
    }

    /// Keys of all occupied cells whose center lies beyond `radius` of
    /// `center`. Used by the sliding passes.
    pub fn cells_beyond(&self, center: &Vector3<f64>, radius: f64) -> Vec<VoxelKey> {
        self.cells
            .keys()
            .copied()
            .filter(|&key| (self.cell_center(key) - center).norm() > radius)
            .collect()
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
