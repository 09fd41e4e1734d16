// THEORY:
// The `FocalPointTracker` owns the live set of focal points and every policy that
// changes it. It is the only component with its own lock: all mutations happen
// under one exclusive `Mutex`, held only for a scan plus a single mutation and
// never across calls or while publishing.
//
// Lifecycle of a point:
// - **Spawn**: the scheduler proposes a candidate at the current saliency peak.
//   It is accepted only if it would not overlap an existing point or any camera's
//   mounting position (the area right under a camera is a recurring false
//   positive).
// - **Refresh**: a traced ray that crosses a point is claimed by it. Only the
//   point whose entry crossing is nearest to the ray's origin claims the ray. It
//   is nudged a fraction of the way towards the midpoint of the crossing, and its
//   TTL clock restarts.
// - **Merge**: overlapping points are combined, one pair per call. The overlap
//   count strictly decreases with every merge, so repeated calls converge while
//   each call stays cheap.
// - **Expire**: points not refreshed within their TTL are dropped.

use crate::core_modules::clock::Clock;
use crate::core_modules::focal_point::{FocalPoint, FocalPointView, FocalPointsSnapshot};
use crate::core_modules::scene::Scene;
use crate::core_modules::stats::TrackingStats;
use crate::core_modules::{Vec2, ensure_finite};
use crate::error::Result;
use crate::tracking_loop::TrackingConfig;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Squared distance below which a query point is taken to be a tracked point itself.
const COINCIDENT_DIST_SQ: f64 = 1e-5;

/// Hands out focal-point ids (`g1`, `g2`, ...), never reusing one.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn next_id(&self) -> String {
        let n = self.last.fetch_add(1, Ordering::Relaxed) + 1;
        format!("g{n}")
    }
}

/// The outcome of a successful `merge_overlapping`.
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub survivor: String,
    pub removed: String,
    pub position: Vec2,
}

pub struct FocalPointTracker {
    points: Mutex<Vec<FocalPoint>>,
    ids: IdGenerator,
    camera_positions: Vec<Vec2>,
    radius: f64,
    ttl: Duration,
    sensitivity: f64,
    merge_slack: f64,
    spawn_slack: f64,
    clock: Arc<dyn Clock>,
    stats: Arc<TrackingStats>,
}

impl FocalPointTracker {
    pub fn new(
        config: &TrackingConfig,
        scene: &Scene,
        clock: Arc<dyn Clock>,
        stats: Arc<TrackingStats>,
    ) -> Self {
        Self {
            points: Mutex::new(Vec::new()),
            ids: IdGenerator::default(),
            camera_positions: scene.camera_positions(),
            radius: config.focal_point_radius,
            ttl: config.focal_point_ttl(),
            sensitivity: scene
                .camera_sensitivity()
                .unwrap_or(config.camera_sensitivity),
            merge_slack: config.merge_slack,
            spawn_slack: config.spawn_slack,
            clock,
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.points.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.lock().is_empty()
    }

    /// Offers the segment `p0 -> p1` to the live points.
    ///
    /// Returns true if a point claimed it; in that case the caller must not
    /// also accumulate it into the raster.
    pub fn trace_against_focal_points(&self, p0: &Vec2, p1: &Vec2) -> Result<bool> {
        ensure_finite(p0, "focal point trace start")?;
        ensure_finite(p1, "focal point trace end")?;

        let now = self.clock.now();
        let mut points = self.points.lock();

        let mut best: Option<(usize, f64, Vec2)> = None;
        for (idx, fp) in points.iter().enumerate() {
            if let Some(hit) = fp.line_intersection(p0, p1) {
                let d = (hit.entry - p0).norm_squared();
                if best.is_none_or(|(_, min, _)| d < min) {
                    best = Some((idx, d, hit.midpoint()));
                }
            }
        }

        // only the closest point interacts with the ray
        let Some((idx, _, midpoint)) = best else {
            return Ok(false);
        };
        let fp = &mut points[idx];
        let nudged = fp.position() + (midpoint - fp.position()) * self.sensitivity;
        fp.set_position(nudged);
        fp.refresh(now);
        Ok(true)
    }

    /// Merges at most one overlapping pair: the first point moves to the
    /// midpoint and the second is removed.
    pub fn merge_overlapping(&self) -> Option<Merge> {
        let mut points = self.points.lock();

        let mut pair = None;
        'scan: for (i, a) in points.iter().enumerate() {
            for (j, b) in points.iter().enumerate() {
                if i != j && a.overlaps(b, self.merge_slack) {
                    pair = Some((i, j));
                    break 'scan;
                }
            }
        }

        let (i, j) = pair?;
        let midpoint = (points[i].position() + points[j].position()) * 0.5;
        points[i].set_position(midpoint);
        let removed = points.remove(j);
        // `remove` may have shifted the survivor down by one
        let survivor_idx = if j < i { i - 1 } else { i };
        let survivor = points[survivor_idx].id().to_string();
        self.stats.active_focal_points.set(points.len() as f64);
        drop(points);

        self.stats.merged.inc();
        debug!(
            "focal point merged: {} into {} at ({:.3}, {:.3})",
            removed.id(),
            survivor,
            midpoint.x,
            midpoint.y
        );
        Some(Merge {
            survivor,
            removed: removed.id().to_string(),
            position: midpoint,
        })
    }

    /// Drops every point whose TTL has run out; returns their ids.
    pub fn cleanup_stale(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        {
            let mut points = self.points.lock();
            points.retain(|fp| {
                if fp.is_expired(now) {
                    expired.push(fp.id().to_string());
                    false
                } else {
                    true
                }
            });
            self.stats.active_focal_points.set(points.len() as f64);
        }

        for id in &expired {
            self.stats.expired.inc();
            debug!("focal point expired: {id}");
        }
        expired
    }

    /// Spawns a point at `candidate` unless it would overlap a camera or an
    /// existing point. Returns the new id on success.
    pub fn maybe_spawn(&self, candidate: Vec2) -> Result<Option<String>> {
        ensure_finite(&candidate, "spawn candidate")?;
        self.stats.maybe_spawn.inc();

        let now = self.clock.now();
        let probe = FocalPoint::new("", candidate, self.radius, self.ttl, now);

        if self
            .camera_positions
            .iter()
            .any(|cam| probe.overlaps_circle(cam, self.radius, self.spawn_slack))
        {
            self.stats.spawn_overlaps_camera.inc();
            return Ok(None);
        }

        let id = {
            let mut points = self.points.lock();
            if points
                .iter()
                .any(|fp| probe.overlaps(fp, self.spawn_slack))
            {
                self.stats.spawn_overlaps_existing.inc();
                return Ok(None);
            }

            let id = self.ids.next_id();
            points.push(FocalPoint::new(id.clone(), candidate, self.radius, self.ttl, now));
            self.stats.active_focal_points.set(points.len() as f64);
            id
        };

        self.stats.spawned.inc();
        debug!(
            "spawning new focal point {id} at ({:.3}, {:.3})",
            candidate.x, candidate.y
        );
        Ok(Some(id))
    }

    /// The nearest point to `p` and its distance, skipping a point at `p` itself.
    pub fn closest_to(&self, p: &Vec2) -> Option<(FocalPointView, f64)> {
        let points = self.points.lock();
        points
            .iter()
            .map(|fp| (fp, (fp.position() - p).norm_squared()))
            .filter(|(_, d2)| *d2 >= COINCIDENT_DIST_SQ)
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(fp, d2)| (fp.to_view(), d2.sqrt()))
    }

    pub fn snapshot(&self) -> FocalPointsSnapshot {
        let points = self.points.lock();
        FocalPointsSnapshot {
            focal_points: points.iter().map(FocalPoint::to_view).collect(),
        }
    }
}
