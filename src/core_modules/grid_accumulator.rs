// THEORY:
// The `GridAccumulator` is the evidence layer of the tracking engine. Every
// camera gets its own dense heat raster over the world rectangle. When a motion
// ray misses all known focal points, it is rasterized into its camera's layer,
// leaving a faint line of evidence along the camera's line of sight.
//
// Key architectural principles:
// 1.  **Per-camera layers**: a single camera can only tell us a direction, never
//     a distance, so each camera's evidence is kept apart. Layers are created
//     lazily on the first trace and live for the rest of the process; they are
//     only ever decayed, never dropped.
// 2.  **Corroboration**: the saliency surface (`combined`) keeps a cell only when
//     more than one camera has evidence there. Where two lines of sight cross is
//     where somebody is standing; a single camera's line on its own is noise.
// 3.  **Forgetting**: `decay` attenuates every layer once per scheduler tick, so
//     old evidence fades and cells never go negative.
// 4.  **Shared scratch**: the masking buffers used by `combined` are owned here
//     and reused, which is why all of this sits behind one lock in the loop.

use crate::core_modules::coordinate_mapper::CoordinateMapper;
use crate::core_modules::stats::TrackingStats;
use crate::core_modules::{Vec2, ensure_finite};
use crate::error::Result;
use crate::tracking_loop::TrackingConfig;
use image::{GrayImage, Luma};
use nalgebra::DMatrix;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The current saliency peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Focus {
    pub position: Vec2,
    pub value: f64,
}

pub struct GridAccumulator {
    mapper: CoordinateMapper,
    /// One `height x width` raster per camera.
    layers: BTreeMap<String, DMatrix<f64>>,
    // scratch buffers for `combined`
    masking: DMatrix<f64>,
    mask: DMatrix<f64>,
    sum: DMatrix<f64>,
    increment: f64,
    retention: f64,
    mask_threshold: f64,
    stats: Arc<TrackingStats>,
}

impl GridAccumulator {
    pub fn new(config: &TrackingConfig, stats: Arc<TrackingStats>) -> Result<Self> {
        let mapper = CoordinateMapper::new(config.bounds, config.grid_width, config.grid_height)?;
        let (h, w) = (mapper.height(), mapper.width());
        Ok(Self {
            mapper,
            layers: BTreeMap::new(),
            masking: DMatrix::zeros(h, w),
            mask: DMatrix::zeros(h, w),
            sum: DMatrix::zeros(h, w),
            increment: config.trace_increment,
            retention: config.decay_retention,
            mask_threshold: config.mask_threshold,
            stats,
        })
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn camera_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, camera: &str) -> Option<&DMatrix<f64>> {
        self.layers.get(camera)
    }

    /// Rasterizes the directed segment `p0 -> p1` into `camera`'s layer.
    ///
    /// Segments shorter than one sampling step are ignored.
    pub fn trace(&mut self, camera: &str, p0: Vec2, p1: Vec2) -> Result<()> {
        ensure_finite(&p0, "grid trace start")?;
        ensure_finite(&p1, "grid trace end")?;

        let (sz_x, sz_y) = self.mapper.pixel_size();
        let step = sz_x.min(sz_y) / 4.0;
        // keeps the last cell index in range
        let epsilon = step / 2.0;

        let p0 = self.mapper.clamp(&p0, epsilon);
        let p1 = self.mapper.clamp(&p1, epsilon);

        let to = p1 - p0;
        let length = to.norm();
        if length < step {
            return Ok(());
        }

        let delta = to * (step / length);
        let steps = (length / step) as usize;

        let (h, w) = (self.mapper.height(), self.mapper.width());
        let layer = self
            .layers
            .entry(camera.to_string())
            .or_insert_with(|| DMatrix::zeros(h, w));

        let mut pos = p0;
        for _ in 0..steps {
            let cell = self.mapper.world_to_cell(&pos);
            if let Some(value) = layer.get_mut(cell) {
                *value += self.increment;
            }
            pos += delta;
        }

        Ok(())
    }

    /// Attenuates every camera layer by the retention factor.
    pub fn decay(&mut self) {
        for layer in self.layers.values_mut() {
            *layer *= self.retention;
        }
    }

    /// The saliency surface: summed evidence, kept only where more than one camera agrees.
    pub fn combined(&mut self) -> DMatrix<f64> {
        let (h, w) = (self.mapper.height(), self.mapper.width());
        if self.layers.is_empty() {
            return DMatrix::zeros(h, w);
        }

        self.mask.fill(0.0);
        self.sum.fill(0.0);

        for layer in self.layers.values() {
            for (m, v) in self.masking.iter_mut().zip(layer.iter()) {
                *m = if *v > self.mask_threshold { 1.0 } else { 0.0 };
            }
            self.mask += &self.masking;
            self.sum += layer;
        }

        self.stats.last_sum_total.set(self.sum.sum());
        self.stats
            .last_sum_max
            .set(self.sum.iter().copied().fold(0.0, f64::max));

        for m in self.mask.iter_mut() {
            *m = if *m > 1.0 { 1.0 } else { 0.0 };
        }

        self.sum.component_mul(&self.mask)
    }

    /// Argmax of `combined`, returned as the world-space center of the winning cell.
    ///
    /// Ties go to the first maximum in row-major order.
    pub fn focus(&mut self) -> Focus {
        let surface = self.combined();

        let (mut best_row, mut best_col) = (0, 0);
        let mut best = f64::NEG_INFINITY;
        for row in 0..surface.nrows() {
            for col in 0..surface.ncols() {
                let v = surface[(row, col)];
                if v > best {
                    best = v;
                    best_row = row;
                    best_col = col;
                }
            }
        }

        self.stats.last_focus_value.set(best);
        Focus {
            position: self.mapper.cell_to_world(best_row, best_col),
            value: best,
        }
    }

    /// Renders `combined` as a grayscale image, normalized so the peak is white.
    pub fn heatmap_image(&mut self) -> GrayImage {
        let surface = self.combined();
        let peak = surface.iter().copied().fold(0.0, f64::max);

        GrayImage::from_fn(surface.ncols() as u32, surface.nrows() as u32, |x, y| {
            let v = surface[(y as usize, x as usize)];
            let level = if peak > 0.0 {
                (v / peak * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            };
            Luma([level])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::coordinate_mapper::GridBounds;

    /// A 4x4 grid of 1m cells over [0,4]x[0,4]; sampling step is 0.25m.
    fn small_grid() -> GridAccumulator {
        let config = TrackingConfig {
            bounds: GridBounds {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 4.0,
                max_y: 4.0,
            },
            grid_width: 4,
            grid_height: 4,
            ..TrackingConfig::default()
        };
        GridAccumulator::new(&config, Arc::new(TrackingStats::default())).unwrap()
    }

    /// Marks the single cell containing `(x, y)` with a short horizontal segment.
    fn mark_cell(grid: &mut GridAccumulator, camera: &str, x: f64, y: f64) {
        let (p0, p1) = (Vec2::new(x, y), Vec2::new(x + 0.5, y));
        grid.trace(camera, p0, p1).unwrap();
    }

    #[test]
    fn decay_keeps_zero_rasters_at_zero() {
        let mut grid = small_grid();
        for camera in ["camera-1", "camera-2"] {
            grid.layers.insert(camera.to_string(), DMatrix::zeros(4, 4));
        }
        for _ in 0..50 {
            grid.decay();
        }
        assert_eq!(grid.camera_count(), 2);
        for camera in ["camera-1", "camera-2"] {
            assert!(grid.layer(camera).unwrap().iter().all(|v| *v == 0.0));
        }
        assert!(grid.combined().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn decayed_evidence_never_goes_negative() {
        let mut grid = small_grid();
        mark_cell(&mut grid, "camera-1", 0.1, 0.1);
        for _ in 0..200 {
            grid.decay();
        }
        assert!(grid.layer("camera-1").unwrap().iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn decay_scales_by_retention() {
        let mut grid = small_grid();
        mark_cell(&mut grid, "camera-1", 0.1, 0.1);
        let before = grid.layer("camera-1").unwrap()[(0, 0)];
        grid.decay();
        let after = grid.layer("camera-1").unwrap()[(0, 0)];
        assert!((after - before * 0.75).abs() < 1e-12);
    }

    #[test]
    fn short_segment_is_ignored() {
        let mut grid = small_grid();
        let (p0, p1) = (Vec2::new(1.0, 1.0), Vec2::new(1.1, 1.0));
        grid.trace("camera-1", p0, p1).unwrap();
        assert!(grid.layer("camera-1").is_none());
    }

    #[test]
    fn trace_marks_cells_along_the_row_of_its_y() {
        let mut grid = small_grid();
        let (p0, p1) = (Vec2::new(0.0, 2.5), Vec2::new(4.0, 2.5));
        grid.trace("camera-1", p0, p1).unwrap();
        let layer = grid.layer("camera-1").unwrap();

        for col in 0..4 {
            assert!(layer[(2, col)] > 0.0, "cell (2, {col}) should be marked");
        }
        for row in [0, 1, 3] {
            for col in 0..4 {
                assert_eq!(layer[(row, col)], 0.0);
            }
        }
        // four samples per cell at 0.025 each
        assert!((layer[(2, 1)] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_endpoints_are_clamped() {
        let mut grid = small_grid();
        let (p0, p1) = (Vec2::new(-50.0, 1.5), Vec2::new(50.0, 1.5));
        grid.trace("camera-1", p0, p1).unwrap();
        let layer = grid.layer("camera-1").unwrap();
        assert!(layer[(1, 0)] > 0.0);
        assert!(layer[(1, 3)] > 0.0);
    }

    #[test]
    fn non_finite_input_leaves_rasters_untouched() {
        let mut grid = small_grid();
        let nan = Vec2::new(f64::NAN, 0.0);
        let inf = Vec2::new(f64::INFINITY, 1.0);
        assert!(grid.trace("camera-1", nan, Vec2::new(1.0, 1.0)).is_err());
        assert!(grid.trace("camera-1", Vec2::zeros(), inf).is_err());
        assert_eq!(grid.camera_count(), 0);
    }

    #[test]
    fn combined_without_cameras_is_all_zero() {
        let mut grid = small_grid();
        let surface = grid.combined();
        assert_eq!((surface.nrows(), surface.ncols()), (4, 4));
        assert!(surface.iter().all(|v| *v == 0.0));
        assert_eq!(grid.focus().value, 0.0);
    }

    #[test]
    fn single_camera_evidence_is_not_salient() {
        let mut grid = small_grid();
        mark_cell(&mut grid, "camera-1", 0.1, 0.1);
        mark_cell(&mut grid, "camera-2", 2.1, 3.1);
        assert!(grid.combined().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn corroborated_cell_survives_alone() {
        let mut grid = small_grid();
        mark_cell(&mut grid, "camera-1", 1.1, 2.1);
        mark_cell(&mut grid, "camera-2", 1.2, 2.2);

        let surface = grid.combined();
        for row in 0..4 {
            for col in 0..4 {
                if (row, col) == (2, 1) {
                    assert!((surface[(row, col)] - 0.1).abs() < 1e-9);
                } else {
                    assert_eq!(surface[(row, col)], 0.0);
                }
            }
        }

        let focus = grid.focus();
        assert_eq!(focus.position, Vec2::new(1.5, 2.5));
        assert!((focus.value - 0.1).abs() < 1e-9);
    }

    #[test]
    fn combined_is_stable_across_calls() {
        let mut grid = small_grid();
        mark_cell(&mut grid, "camera-1", 1.1, 2.1);
        mark_cell(&mut grid, "camera-2", 1.2, 2.2);
        let first = grid.combined();
        let second = grid.combined();
        assert_eq!(first, second);
    }

    #[test]
    fn focus_ties_go_to_first_cell_in_row_major_order() {
        let mut grid = small_grid();
        for (x, y) in [(3.1, 0.1), (0.1, 1.1)] {
            mark_cell(&mut grid, "camera-1", x, y);
            mark_cell(&mut grid, "camera-2", x, y);
        }
        let focus = grid.focus();
        // (row 0, col 3) is scanned before (row 1, col 0)
        assert_eq!(focus.position, Vec2::new(3.5, 0.5));
    }

    #[test]
    fn heatmap_peak_is_white() {
        let mut grid = small_grid();
        mark_cell(&mut grid, "camera-1", 1.1, 2.1);
        mark_cell(&mut grid, "camera-2", 1.2, 2.2);

        let img = grid.heatmap_image();
        assert_eq!(img.dimensions(), (4, 4));
        assert_eq!(img.get_pixel(1, 2)[0], 255);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
    }
}
