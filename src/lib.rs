//! Adaptive visual-landmark map for LiDAR-inertial-visual odometry.
//!
//! This crate sits between a LiDAR-inertial state estimator (which
//! provides per-cycle poses and plane-fit residual statistics) and a
//! visual front end (which provides image patches). It maintains a
//! voxel-indexed store of 3D landmarks with multi-frame observation
//! histories, estimates when the LiDAR geometry degenerates, and
//! schedules visual updates adaptively while keeping the map bounded in
//! memory through capacity, age, and sliding-window eviction.

pub mod camera;
pub mod config;
pub mod degeneracy;
pub mod frame;
pub mod geometry;
pub mod map;
pub mod scheduler;
pub mod system;
