//! Core ID types for the landmark map.
//!
//! Landmarks, observations, and frames cross-reference each other through
//! these lightweight handles rather than shared pointers, which keeps
//! ownership acyclic: destroying a frame never has to chase references
//! held by landmarks, and vice versa.

/// Unique identifier for a Landmark.
///
/// Assigned sequentially by the active [`LandmarkStore`](super::LandmarkStore);
/// the long-term tier receives transferred landmarks and never mints its own,
/// so an id stays valid across a sliding transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LandmarkId(pub u64);

impl std::fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Identifier for an observation within its owning landmark.
///
/// Assigned sequentially per landmark; used to designate the reference
/// observation and to remove a specific observation without holding a
/// borrow into the observation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObservationId(pub u64);

/// Unique identifier for a sensor frame (one capture cycle).
///
/// Minted by the component that owns the processing cycle and passed down
/// by value; there is no process-wide counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Key of a voxel cell: the integer cell coordinates of a world position
/// divided by the cell size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoxelKey(pub [i32; 3]);
