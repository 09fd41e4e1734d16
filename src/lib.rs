// THEORY:
// This file is the main entry point for the `focal_grid` library crate.
// It exposes the `TrackingLoop` and its configuration as the high-level
// interface of the tracking engine. Motion events from fixed cameras go in;
// a small set of corroborated, decaying, expiring "focal points" comes out,
// published as snapshots and queryable in-process.
//
// The building blocks live in `core_modules`:
// - `coordinate_mapper` maps the world rectangle onto a discrete raster.
// - `grid_accumulator` keeps one decaying heat raster per camera and derives a
//   saliency surface that only survives where several cameras agree.
// - `focal_point` / `focal_point_tracker` own the live set of targets and
//   implement spawn, nudge, merge and expiry.
// - `scene`, `broker`, `clock` and `stats` are the narrow seams to the rest of
//   the installation.

pub mod core_modules;
pub mod error;
pub mod tracking_loop;

pub use crate::core_modules::Vec2;
pub use crate::core_modules::broker::{SnapshotBus, SnapshotSink};
pub use crate::core_modules::clock::{Clock, ManualClock, SystemClock};
pub use crate::core_modules::focal_point::{FocalPointView, FocalPointsSnapshot};
pub use crate::core_modules::grid_accumulator::Focus;
pub use crate::core_modules::scene::{MotionEvent, Pose, Scene};
pub use crate::core_modules::stats::StatsSnapshot;
pub use crate::error::{Result, TrackingError};
pub use crate::tracking_loop::{TickReport, TraceOutcome, TrackingConfig, TrackingLoop};
