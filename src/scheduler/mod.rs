//! UpdateScheduler - decides per image whether the visual update runs.
//!
//! Visual updates are expensive, so under healthy LiDAR they run on a
//! fixed stride plus whenever the platform has moved far enough from the
//! last keyframe. When the LiDAR degenerates the keyframe thresholds
//! tighten (scaled by the conditioning scalar) and every image is used.
//!
//! A rejected image is dropped: it never reaches the visual front end and
//! is not buffered or retried.

use crate::config::SchedulerConfig;
use crate::geometry::SE3;

/// Pose and counter value at the last declared keyframe.
#[derive(Debug, Clone)]
struct KeyframeState {
    pose: SE3,
    counter: u64,
}

/// Stride/keyframe/degeneracy gate for visual updates.
#[derive(Debug)]
pub struct UpdateScheduler {
    cfg: SchedulerConfig,

    /// Incoming image counter; every image consumes one tick, selected
    /// or not.
    counter: u64,

    /// Last declared keyframe, replaced wholesale on each new one.
    keyframe: Option<KeyframeState>,
}

impl UpdateScheduler {
    pub fn new(cfg: SchedulerConfig) -> Self {
        Self {
            cfg,
            counter: 0,
            keyframe: None,
        }
    }

    /// Decide whether this image's visual update runs.
    ///
    /// `pose` is the candidate pose for the incoming image, `sigma_min`
    /// and `degenerate` come from the degeneracy estimator. Increments
    /// the image counter unconditionally and replaces the stored keyframe
    /// pose when the displacement thresholds trip.
    pub fn should_use_image(&mut self, pose: &SE3, sigma_min: f64, degenerate: bool) -> bool {
        // Lower sigma_min (more degenerate LiDAR) tightens the keyframe
        // thresholds, so keyframes trigger more easily.
        let scale = (3.0 * sigma_min).clamp(self.cfg.keyframe_scale_min, 1.0);
        let trans_threshold = scale * self.cfg.base_trans_threshold;
        let rot_threshold = scale * self.cfg.base_rot_threshold;

        let is_keyframe = match &self.keyframe {
            Some(kf) => {
                kf.pose.translation_delta(pose) > trans_threshold
                    || kf.pose.rotation_delta(pose) > rot_threshold
            }
            // The first image always establishes a keyframe.
            None => true,
        };

        let stride = if degenerate {
            self.cfg.stride_degenerate
        } else {
            self.cfg.stride_normal
        };
        let stride_hit = self.counter % stride.max(1) == 0;

        let use_image = degenerate || stride_hit || is_keyframe;

        if is_keyframe {
            self.keyframe = Some(KeyframeState {
                pose: pose.clone(),
                counter: self.counter,
            });
            tracing::debug!(counter = self.counter, "keyframe declared");
        }
        self.counter += 1;

        use_image
    }

    /// Images seen so far.
    pub fn images_seen(&self) -> u64 {
        self.counter
    }

    /// Counter value at the last declared keyframe, if any.
    pub fn last_keyframe_counter(&self) -> Option<u64> {
        self.keyframe.as_ref().map(|kf| kf.counter)
    }
}
