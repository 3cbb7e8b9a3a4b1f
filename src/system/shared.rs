//! Shared wrapper for hosts that run LiDAR and visual updates on
//! separate threads.
//!
//! The subsystem itself is single-threaded: the per-cycle order in
//! [`VisualMapSystem`](super::VisualMapSystem) assumes each cycle runs to
//! completion before the next begins. A host that instead drives the
//! LiDAR and visual pipelines from different threads must serialize all
//! map access behind one lock per cycle; the specific hazard is a
//! capacity eviction releasing a landmark's observations while a
//! selection query on another thread still reads them. There is no
//! finer-grained contract to exploit, so one `RwLock` around the whole
//! system is the entire story.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::LivMapConfig;

use super::VisualMapSystem;

/// `VisualMapSystem` behind a single coarse lock.
pub struct SharedVisualMap {
    /// The map subsystem. Writers: the LiDAR cycle and the visual front
    /// end (whole-cycle critical sections). Readers: telemetry.
    pub map: RwLock<VisualMapSystem>,
}

impl SharedVisualMap {
    pub fn new(config: LivMapConfig) -> Arc<Self> {
        Arc::new(Self {
            map: RwLock::new(VisualMapSystem::new(config)),
        })
    }

    /// Read-only telemetry without holding the write lock.
    pub fn is_lidar_degenerate(&self) -> bool {
        self.map.read().is_lidar_degenerate()
    }

    /// Read-only telemetry without holding the write lock.
    pub fn sigma_min(&self) -> f64 {
        self.map.read().sigma_min()
    }
}
