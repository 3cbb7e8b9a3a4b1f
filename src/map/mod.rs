//! The visual-landmark map: voxel-indexed landmark arena, observation
//! records, and the eviction/sliding policies that keep it bounded.

pub mod landmark;
pub mod maintainer;
pub mod store;
pub mod types;
pub mod voxel_index;

pub use landmark::{Landmark, Observation};
pub use maintainer::MapMaintainer;
pub use store::LandmarkStore;
pub use types::{FrameId, LandmarkId, ObservationId, VoxelKey};
pub use voxel_index::VoxelIndex;
