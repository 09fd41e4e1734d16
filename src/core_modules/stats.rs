// Counters and gauges for the tracking engine.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// An `f64` gauge stored as raw bits.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
pub struct TrackingStats {
    pub trace_hit_focal_point: Counter,
    pub trace_grid: Counter,
    pub rejected_input: Counter,
    pub maybe_spawn: Counter,
    pub spawn_overlaps_camera: Counter,
    pub spawn_overlaps_existing: Counter,
    pub spawned: Counter,
    pub merged: Counter,
    pub expired: Counter,
    pub ticks: Counter,
    pub active_focal_points: Gauge,
    pub last_focus_value: Gauge,
    pub last_sum_total: Gauge,
    pub last_sum_max: Gauge,
}

/// A point-in-time copy of `TrackingStats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub trace_hit_focal_point: u64,
    pub trace_grid: u64,
    pub rejected_input: u64,
    pub maybe_spawn: u64,
    pub spawn_overlaps_camera: u64,
    pub spawn_overlaps_existing: u64,
    pub spawned: u64,
    pub merged: u64,
    pub expired: u64,
    pub ticks: u64,
    pub active_focal_points: f64,
    pub last_focus_value: f64,
    pub last_sum_total: f64,
    pub last_sum_max: f64,
}

impl TrackingStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            trace_hit_focal_point: self.trace_hit_focal_point.get(),
            trace_grid: self.trace_grid.get(),
            rejected_input: self.rejected_input.get(),
            maybe_spawn: self.maybe_spawn.get(),
            spawn_overlaps_camera: self.spawn_overlaps_camera.get(),
            spawn_overlaps_existing: self.spawn_overlaps_existing.get(),
            spawned: self.spawned.get(),
            merged: self.merged.get(),
            expired: self.expired.get(),
            ticks: self.ticks.get(),
            active_focal_points: self.active_focal_points.get(),
            last_focus_value: self.last_focus_value.get(),
            last_sum_total: self.last_sum_total.get(),
            last_sum_max: self.last_sum_max.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters_and_gauges() {
        let stats = TrackingStats::default();
        stats.spawned.inc();
        stats.spawned.inc();
        stats.last_focus_value.set(0.125);

        let snap = stats.snapshot();
        assert_eq!(snap.spawned, 2);
        assert_eq!(snap.merged, 0);
        assert_eq!(snap.last_focus_value, 0.125);
    }
}
