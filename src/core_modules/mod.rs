pub mod broker;
pub mod clock;
pub mod coordinate_mapper;
pub mod focal_point;
pub mod focal_point_tracker;
pub mod grid_accumulator;
pub mod scene;
pub mod stats;

use crate::error::{Result, TrackingError};

/// A point or direction on the 2D ground plane, in meters.
pub type Vec2 = nalgebra::Vector2<f64>;

/// Rejects NaN/Inf coordinates before they can reach any shared state.
pub(crate) fn ensure_finite(p: &Vec2, context: &'static str) -> Result<()> {
    if p.x.is_finite() && p.y.is_finite() {
        Ok(())
    } else {
        Err(TrackingError::NonFiniteInput { context })
    }
}
