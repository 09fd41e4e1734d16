// THEORY:
// The `tracking_loop` module is the top-level API of the engine. It ties the
// evidence layer (`GridAccumulator`) and the target layer (`FocalPointTracker`)
// together and runs the clock that drives them.
//
// Two paths run concurrently for the lifetime of the process:
// 1.  **Event path**: every inbound motion ray goes through `trace`, from any
//     number of callers at once. A ray is first offered to the live focal points;
//     if one claims it, that is the end of it. Only a ray that no point claims is
//     rasterized into the grid. A ray never does both.
// 2.  **Scheduled path**: `run` ticks at a fixed period after a warm-up. Each
//     tick spawns at the saliency peak if it is strong enough, merges one
//     overlapping pair, decays the rasters and expires stale points.
//
// The grid and the focal points are guarded by separate locks that are never
// nested, and neither is held while a snapshot is published.

use crate::core_modules::broker::SnapshotSink;
use crate::core_modules::clock::{Clock, SystemClock};
use crate::core_modules::coordinate_mapper::GridBounds;
use crate::core_modules::focal_point::{FocalPointView, FocalPointsSnapshot};
use crate::core_modules::focal_point_tracker::{FocalPointTracker, Merge};
use crate::core_modules::grid_accumulator::{Focus, GridAccumulator};
use crate::core_modules::scene::{MotionEvent, Scene};
use crate::core_modules::stats::{StatsSnapshot, TrackingStats};
use crate::core_modules::{Vec2, ensure_finite};
use crate::error::{Result, TrackingError};
use image::GrayImage;
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Configuration for the tracking engine. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub bounds: GridBounds,
    /// Raster columns (along world x).
    pub grid_width: usize,
    /// Raster rows (along world y).
    pub grid_height: usize,
    pub spawn_period_ms: u64,
    pub warmup_ms: u64,
    pub focal_point_radius: f64,
    pub focal_point_ttl_ms: u64,
    /// Fraction of the way a hit point moves towards the crossing midpoint.
    /// A non-zero scene-level sensitivity takes precedence.
    pub camera_sensitivity: f64,
    pub trace_increment: f64,
    /// Multiplier applied to every raster cell on each tick.
    pub decay_retention: f64,
    /// A cell counts as evidence from a camera above this value.
    pub mask_threshold: f64,
    /// Minimum saliency peak that may spawn a focal point.
    pub spawn_threshold: f64,
    pub merge_slack: f64,
    pub spawn_slack: f64,
    /// Nominal length of the ray built from a motion event.
    pub ray_length: f64,
    pub unknown_camera_log_interval_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            bounds: GridBounds::default(),
            grid_width: 400,
            grid_height: 400,
            spawn_period_ms: 250,
            warmup_ms: 1000,
            focal_point_radius: 0.6,
            focal_point_ttl_ms: 5000,
            camera_sensitivity: 0.2,
            trace_increment: 0.025,
            decay_retention: 0.75,
            mask_threshold: 0.01,
            spawn_threshold: 0.10,
            merge_slack: 0.5,
            spawn_slack: 1.0,
            ray_length: 10.0,
            unknown_camera_log_interval_ms: 60_000,
        }
    }
}

impl TrackingConfig {
    /// Parses a (possibly partial) JSON document over the defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TrackingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TrackingError::InvalidConfig(msg));

        let b = &self.bounds;
        if !(b.max_x > b.min_x && b.max_y > b.min_y) {
            return invalid(format!("bounds must be a non-empty rectangle, got {b:?}"));
        }
        if self.grid_width == 0 || self.grid_height == 0 {
            return invalid("grid resolution must be non-zero".to_string());
        }
        if !(self.decay_retention > 0.0 && self.decay_retention <= 1.0) {
            return invalid(format!(
                "decay_retention must be in (0, 1], got {}",
                self.decay_retention
            ));
        }
        for (name, value) in [
            ("focal_point_radius", self.focal_point_radius),
            ("trace_increment", self.trace_increment),
            ("ray_length", self.ray_length),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }
        if self.spawn_period_ms == 0 {
            return invalid("spawn_period_ms must be non-zero".to_string());
        }
        Ok(())
    }

    pub fn spawn_period(&self) -> Duration {
        Duration::from_millis(self.spawn_period_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn focal_point_ttl(&self) -> Duration {
        Duration::from_millis(self.focal_point_ttl_ms)
    }
}

/// Which branch a traced ray took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOutcome {
    /// An existing focal point claimed the ray and was nudged.
    HitFocalPoint,
    /// No point claimed it; it was rasterized into the camera's layer.
    Accumulated,
}

/// What a single scheduler tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub focus: Focus,
    pub spawned: Option<String>,
    pub merged: Option<Merge>,
    pub expired: Vec<String>,
}

pub struct TrackingLoop {
    config: TrackingConfig,
    scene: Arc<Scene>,
    grid: Mutex<GridAccumulator>,
    focal_points: FocalPointTracker,
    sink: Arc<dyn SnapshotSink>,
    stats: Arc<TrackingStats>,
    clock: Arc<dyn Clock>,
    unknown_camera_log: Mutex<HashMap<String, Instant>>,
}

impl TrackingLoop {
    pub fn new(
        config: TrackingConfig,
        scene: Arc<Scene>,
        sink: Arc<dyn SnapshotSink>,
    ) -> Result<Self> {
        Self::with_clock(config, scene, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: TrackingConfig,
        scene: Arc<Scene>,
        sink: Arc<dyn SnapshotSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let stats = Arc::new(TrackingStats::default());
        let grid = GridAccumulator::new(&config, stats.clone())?;
        let focal_points = FocalPointTracker::new(&config, &scene, clock.clone(), stats.clone());

        Ok(Self {
            config,
            scene,
            grid: Mutex::new(grid),
            focal_points,
            sink,
            stats,
            clock,
            unknown_camera_log: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Routes one ray from `camera`: to the nearest focal point it crosses, or else into the grid.
    pub fn trace(&self, camera: &str, p0: Vec2, p1: Vec2) -> Result<TraceOutcome> {
        if let Err(err) =
            ensure_finite(&p0, "trace start").and_then(|_| ensure_finite(&p1, "trace end"))
        {
            self.stats.rejected_input.inc();
            warn!("rejected trace from {camera}: {err}");
            return Err(err);
        }

        let outcome = if self.focal_points.trace_against_focal_points(&p0, &p1)? {
            self.stats.trace_hit_focal_point.inc();
            TraceOutcome::HitFocalPoint
        } else {
            self.stats.trace_grid.inc();
            self.grid.lock().trace(camera, p0, p1)?;
            TraceOutcome::Accumulated
        };

        self.publish();
        Ok(outcome)
    }

    /// Converts a motion event into a ray using the scene geometry, then traces it.
    pub fn process_motion(&self, event: &MotionEvent) -> Result<TraceOutcome> {
        let (p0, p1) = match self.scene.segment_for(event, self.config.ray_length) {
            Ok(segment) => segment,
            Err(TrackingError::UnknownCamera(name)) => {
                self.note_unknown_camera(&name);
                return Err(TrackingError::UnknownCamera(name));
            }
            Err(err) => {
                self.stats.rejected_input.inc();
                return Err(err);
            }
        };
        self.trace(&event.camera_name, p0, p1)
    }

    /// Warns about `name` at most once per interval. Returns whether it logged.
    fn note_unknown_camera(&self, name: &str) -> bool {
        let interval = Duration::from_millis(self.config.unknown_camera_log_interval_ms);
        let now = self.clock.now();
        let mut seen = self.unknown_camera_log.lock();
        let due = seen
            .get(name)
            .is_none_or(|last| now.duration_since(*last) >= interval);
        if !due {
            return false;
        }
        // names that went quiet for a whole interval would log again anyway
        seen.retain(|_, last| now.duration_since(*last) < interval);
        seen.insert(name.to_string(), now);
        drop(seen);
        warn!("detected motion from unknown camera: {name}");
        true
    }

    /// One scheduler cycle: spawn, merge, decay, expire, then publish.
    pub fn tick(&self) -> TickReport {
        self.stats.ticks.inc();

        let focus = self.grid.lock().focus();
        let spawned = if focus.value >= self.config.spawn_threshold {
            match self.focal_points.maybe_spawn(focus.position) {
                Ok(id) => id,
                Err(err) => {
                    warn!("not spawning at saliency peak: {err}");
                    None
                }
            }
        } else {
            None
        };

        let merged = self.focal_points.merge_overlapping();
        self.grid.lock().decay();
        let expired = self.focal_points.cleanup_stale();

        self.publish();
        TickReport {
            focus,
            spawned,
            merged,
            expired,
        }
    }

    /// Runs the scheduler until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.spawn_period();
        info!(
            "tracking loop starting (period {:?}, warm-up {:?})",
            period,
            self.config.warmup()
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("tracking loop cancelled during warm-up");
                return;
            }
            _ = tokio::time::sleep(self.config.warmup()) => {}
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
            if cancel.is_cancelled() {
                break;
            }
            self.tick();
        }

        info!("tracking loop stopped");
    }

    pub fn focal_points(&self) -> FocalPointsSnapshot {
        self.focal_points.snapshot()
    }

    pub fn closest_focal_point_to(&self, p: &Vec2) -> Option<(FocalPointView, f64)> {
        self.focal_points.closest_to(p)
    }

    /// The current saliency peak, without spawning.
    pub fn focus(&self) -> Focus {
        self.grid.lock().focus()
    }

    pub fn heatmap_image(&self) -> GrayImage {
        self.grid.lock().heatmap_image()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn publish(&self) {
        let snapshot = self.focal_points.snapshot();
        self.sink.publish(snapshot);
    }
}
