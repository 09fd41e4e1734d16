// Example runner for the `focal_grid` library: two simulated cameras watch one
// person walking slowly across the floor.
//
// Usage: focal_grid [heatmap.png]

use anyhow::Context;
use focal_grid::{MotionEvent, Pose, Scene, SnapshotBus, TrackingConfig, TrackingLoop};
use log::info;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CAMERA_WEST: &str = "camera-west";
const CAMERA_SOUTH: &str = "camera-south";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let heatmap_path = env::args().nth(1);

    let scene = Scene::new()
        .with_camera(CAMERA_WEST, Pose::new(-6.0, 0.0, 0.0), Pose::default())
        .with_camera(CAMERA_SOUTH, Pose::new(0.0, -6.0, 90.0), Pose::default());
    let scene = Arc::new(scene);

    let bus = SnapshotBus::new(16);
    let tracking = Arc::new(TrackingLoop::new(
        TrackingConfig::default(),
        scene.clone(),
        Arc::new(bus.clone()),
    )?);

    let cancel = CancellationToken::new();
    let scheduler = tokio::spawn(tracking.clone().run(cancel.clone()));

    let mut snapshots = bus.subscribe();
    let printer = tokio::spawn(async move {
        let mut last_len = 0;
        while let Ok(snapshot) = snapshots.recv().await {
            if snapshot.len() != last_len {
                info!("now tracking {} focal point(s)", snapshot.len());
                last_len = snapshot.len();
            }
        }
    });

    // The person walks from (0, 0) towards (2, 1) over three seconds.
    let feeders: Vec<_> = [CAMERA_WEST, CAMERA_SOUTH]
        .into_iter()
        .map(|camera| {
            let tracking = tracking.clone();
            let scene = scene.clone();
            tokio::spawn(async move {
                for step in 0..60 {
                    let t = step as f64 / 60.0;
                    let (x, y) = (2.0 * t, t);
                    let local = scene
                        .camera(camera)
                        .map(|c| c.world.inverse_transform_point(&nalgebra::Point2::new(x, y)))
                        .context("camera missing from scene")?;
                    let angle = local.y.atan2(local.x).to_degrees();
                    if let Err(err) = tracking.process_motion(&MotionEvent::new(camera, angle)) {
                        log::warn!("dropping event from {camera}: {err}");
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                anyhow::Ok(())
            })
        })
        .collect();

    for result in futures::future::join_all(feeders).await {
        result.context("feeder task panicked")??;
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();
    scheduler.await.context("scheduler task panicked")?;
    printer.abort();

    let snapshot = tracking.focal_points();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    println!("{}", serde_json::to_string_pretty(&tracking.stats())?);

    if let Some(path) = heatmap_path {
        tracking
            .heatmap_image()
            .save(&path)
            .with_context(|| format!("writing heatmap to {path}"))?;
        info!("heatmap written to {path}");
    }

    Ok(())
}
