// THEORY:
// The `CoordinateMapper` is the bridge between the continuous ground plane and
// the discrete rasters of the `GridAccumulator`. A fixed world rectangle is cut
// into `width x height` cells.
//
// Indexing is axis-swapped with respect to the world: the raster *row* comes
// from the world y-axis and the raster *column* from the world x-axis. Every
// write (tracing) and every read (argmax) goes through this one mapper, so the
// two always agree.
//
// The mapper does no clamping. Callers clamp world points into range first.

use crate::core_modules::Vec2;
use crate::error::{Result, TrackingError};
use serde::{Deserialize, Serialize};

/// The addressable world rectangle, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for GridBounds {
    fn default() -> Self {
        Self {
            min_x: -10.0,
            min_y: -10.0,
            max_x: 10.0,
            max_y: 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    bounds: GridBounds,
    /// Number of columns (cells along world x).
    width: usize,
    /// Number of rows (cells along world y).
    height: usize,
    /// Cells per meter along x.
    scale_x: f64,
    /// Cells per meter along y.
    scale_y: f64,
}

impl CoordinateMapper {
    pub fn new(bounds: GridBounds, width: usize, height: usize) -> Result<Self> {
        let finite = [bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite || bounds.max_x <= bounds.min_x || bounds.max_y <= bounds.min_y {
            return Err(TrackingError::InvalidConfig(format!(
                "grid bounds must be a non-empty finite rectangle, got {bounds:?}"
            )));
        }
        if width == 0 || height == 0 {
            return Err(TrackingError::InvalidConfig(format!(
                "grid resolution must be non-zero, got {width}x{height}"
            )));
        }

        Ok(Self {
            bounds,
            width,
            height,
            scale_x: width as f64 / (bounds.max_x - bounds.min_x),
            scale_y: height as f64 / (bounds.max_y - bounds.min_y),
        })
    }

    pub fn bounds(&self) -> GridBounds {
        self.bounds
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Size of one cell in meters, as `(dx, dy)`.
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            (self.bounds.max_x - self.bounds.min_x) / self.width as f64,
            (self.bounds.max_y - self.bounds.min_y) / self.height as f64,
        )
    }

    /// Maps a world point to `(row, col)`. Notice the swap: row from y, col from x.
    pub fn world_to_cell(&self, p: &Vec2) -> (usize, usize) {
        let col = ((p.x - self.bounds.min_x) * self.scale_x).floor() as usize;
        let row = ((p.y - self.bounds.min_y) * self.scale_y).floor() as usize;
        (row, col)
    }

    /// The world-space center of cell `(row, col)`.
    pub fn cell_to_world(&self, row: usize, col: usize) -> Vec2 {
        let (dx, dy) = self.pixel_size();
        Vec2::new(
            self.bounds.min_x + dx * (col as f64 + 0.5),
            self.bounds.min_y + dy * (row as f64 + 0.5),
        )
    }

    /// Clamps `p` into `[min, max - epsilon]` on both axes.
    pub fn clamp(&self, p: &Vec2, epsilon: f64) -> Vec2 {
        Vec2::new(
            p.x.clamp(self.bounds.min_x, self.bounds.max_x - epsilon),
            p.y.clamp(self.bounds.min_y, self.bounds.max_y - epsilon),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> CoordinateMapper {
        // 8 columns over 4m of x, 4 rows over 2m of y: 0.5m square cells.
        let bounds = GridBounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 4.0,
            max_y: 2.0,
        };
        CoordinateMapper::new(bounds, 8, 4).unwrap()
    }

    #[test]
    fn rows_follow_y_and_columns_follow_x() {
        let m = mapper();
        assert_eq!(m.world_to_cell(&Vec2::new(3.9, 0.1)), (0, 7));
        assert_eq!(m.world_to_cell(&Vec2::new(0.1, 1.9)), (3, 0));
    }

    #[test]
    fn cell_to_world_returns_cell_center() {
        let m = mapper();
        let center = m.cell_to_world(3, 7);
        assert!((center.x - 3.75).abs() < 1e-12);
        assert!((center.y - 1.75).abs() < 1e-12);
        assert_eq!(m.world_to_cell(&center), (3, 7));
    }

    #[test]
    fn pixel_size_is_per_axis() {
        let bounds = GridBounds {
            min_x: -10.0,
            min_y: -5.0,
            max_x: 10.0,
            max_y: 5.0,
        };
        let m = CoordinateMapper::new(bounds, 400, 100).unwrap();
        let (dx, dy) = m.pixel_size();
        assert!((dx - 0.05).abs() < 1e-12);
        assert!((dy - 0.1).abs() < 1e-12);
    }

    #[test]
    fn clamp_keeps_points_addressable() {
        let m = mapper();
        let p = m.clamp(&Vec2::new(100.0, -100.0), 0.01);
        assert!((p - Vec2::new(3.99, 0.0)).norm() < 1e-12);
        assert_eq!(m.world_to_cell(&p), (0, 7));
    }

    #[test]
    fn rejects_degenerate_geometry() {
        let inverted = GridBounds {
            min_x: 1.0,
            min_y: 0.0,
            max_x: 0.0,
            max_y: 1.0,
        };
        assert!(CoordinateMapper::new(inverted, 4, 4).is_err());
        assert!(CoordinateMapper::new(GridBounds::default(), 0, 4).is_err());
    }
}
