//! System facade: per-cycle orchestration and the shared-access wrapper.

pub mod map_system;
pub mod shared;

pub use map_system::VisualMapSystem;
pub use shared::SharedVisualMap;
