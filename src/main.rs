//! Demo: drive the map subsystem through a synthetic corridor run.
//!
//! Simulates a platform moving along +x past a field of wall points. The
//! middle third of the run is a featureless corridor (all plane normals
//! parallel), which trips the degeneracy estimator and raises the visual
//! update rate; the log shows the flag flipping and the map tiers
//! breathing as landmarks age out and slide.

use std::sync::Arc;

use anyhow::Result;
use image::GrayImage;
use nalgebra::{UnitQuaternion, Vector2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use liv_map::camera::{CameraModel, PinholeCamera};
use liv_map::config::LivMapConfig;
use liv_map::degeneracy::PlaneFitStats;
use liv_map::geometry::SE3;
use liv_map::map::landmark::Observation;
use liv_map::map::types::ObservationId;
use liv_map::system::VisualMapSystem;

const CYCLES: usize = 300;
const STEP: f64 = 0.2; // meters per cycle along +x

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut rng = StdRng::seed_from_u64(7);
    let camera: Arc<dyn CameraModel> =
        Arc::new(PinholeCamera::new(640, 480, 400.0, 400.0, 320.0, 240.0));
    let mut system = VisualMapSystem::new(LivMapConfig::default());

    let mut images_used = 0usize;
    for cycle in 0..CYCLES {
        let pose = SE3::from_rt(
            UnitQuaternion::identity(),
            Vector3::new(cycle as f64 * STEP, 0.0, 0.0),
        );

        // Featureless corridor in the middle third: every matched plane
        // is a side wall, so the normals stop spanning 3D.
        let corridor = (CYCLES / 3..2 * CYCLES / 3).contains(&cycle);
        let stats = synth_stats(&mut rng, corridor);
        system.lidar_update(&stats, &pose);

        if !system.should_use_image(&pose) {
            continue;
        }
        images_used += 1;

        let image = synth_image(&mut rng);
        let frame = system.begin_frame(camera.clone(), image)?;

        // A handful of new wall points ahead of the platform, each with
        // one observation from the current viewpoint.
        for _ in 0..5 {
            let point = pose.translation
                + Vector3::new(
                    rng.gen_range(2.0..12.0),
                    rng.gen_range(-4.0..4.0),
                    rng.gen_range(-1.0..2.0),
                );
            let id = system.add_landmark(point);
            let px = Vector2::new(rng.gen_range(20.0..620.0), rng.gen_range(20.0..460.0));
            let patch = frame
                .extract_patch(&px, 0, system.config().frame.patch_size)
                .unwrap_or_default();
            let obs_id = system.add_observation(
                id,
                Observation {
                    id: ObservationId(0),
                    pose_cw: pose.inverse(),
                    px,
                    level: 0,
                    patch,
                    score: rng.gen_range(0.1..1.0),
                    frame_id: frame.id,
                },
            );
            if let Some(obs_id) = obs_id {
                system.set_reference(id, obs_id);
            }
        }

        // Re-observe nearby candidates to keep them fresh.
        let center = pose.translation + Vector3::new(5.0, 0.0, 0.0);
        for id in system.query_candidates(&center, 6.0) {
            if system.select_closest_view(id, &pose.translation).is_some() {
                let _ = system.add_observation(
                    id,
                    Observation {
                        id: ObservationId(0),
                        pose_cw: pose.inverse(),
                        px: Vector2::new(320.0, 240.0),
                        level: 0,
                        patch: Vec::new(),
                        score: rng.gen_range(0.1..1.0),
                        frame_id: frame.id,
                    },
                );
            }
        }

        if cycle % 30 == 0 {
            tracing::info!(
                cycle,
                degenerate = system.is_lidar_degenerate(),
                sigma_min = system.sigma_min(),
                active = system.maintainer().active().len(),
                long_term = system.maintainer().long_term().len(),
                "map status"
            );
        }
    }

    tracing::info!(
        cycles = CYCLES,
        images_used,
        active = system.maintainer().active().len(),
        long_term = system.maintainer().long_term().len(),
        "run complete"
    );
    Ok(())
}

/// Plane-fit statistics for one cycle. In the corridor every normal is
/// the same wall normal; otherwise normals span all directions.
fn synth_stats(rng: &mut StdRng, corridor: bool) -> PlaneFitStats {
    let count = 120;
    let normals = (0..count)
        .map(|_| {
            if corridor {
                Vector3::y()
            } else {
                Vector3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                )
                .normalize()
            }
        })
        .collect();
    PlaneFitStats {
        effective_count: if corridor { 40 } else { 110 },
        total_count: count,
        residual_sum: if corridor { 6.0 } else { 3.0 },
        normals,
    }
}

/// Noisy gradient image.
fn synth_image(rng: &mut StdRng) -> GrayImage {
    let noise: u8 = rng.gen_range(0..32);
    GrayImage::from_fn(640, 480, move |x, y| {
        image::Luma([((x / 4 + y / 4) as u8).wrapping_add(noise)])
    })
}
