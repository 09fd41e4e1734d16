// THEORY:
// A `FocalPoint` is a tracked, short-lived location on the ground plane where
// the system believes a person currently is. It has a capture radius (shared by
// every point) and a time-to-live that is reset every time a traced ray passes
// through it. It carries no identity beyond its id; once it expires or is merged
// away, it is gone for good.

use crate::core_modules::Vec2;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Where a segment crosses a focal point's circle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Parameter along the segment of the entry point, `t0 <= t1`.
    pub t0: f64,
    pub t1: f64,
    pub entry: Vec2,
    pub exit: Vec2,
}

impl Intersection {
    pub fn midpoint(&self) -> Vec2 {
        self.entry + (self.exit - self.entry) * 0.5
    }
}

#[derive(Debug, Clone)]
pub struct FocalPoint {
    id: String,
    position: Vec2,
    radius: f64,
    last_refresh: Instant,
    ttl: Duration,
}

impl FocalPoint {
    pub fn new(
        id: impl Into<String>,
        position: Vec2,
        radius: f64,
        ttl: Duration,
        now: Instant,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            radius,
            last_refresh: now,
            ttl,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn last_refresh(&self) -> Instant {
        self.last_refresh
    }

    pub(crate) fn set_position(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn expiry(&self) -> Instant {
        self.last_refresh + self.ttl
    }

    /// Expired only once `now` is strictly past the expiry instant.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expiry()
    }

    pub fn refresh(&mut self, now: Instant) {
        self.last_refresh = now;
    }

    /// True when a circle at `center` with `radius` overlaps this point by more than `slack`.
    pub fn overlaps_circle(&self, center: &Vec2, radius: f64, slack: f64) -> bool {
        (center - self.position).norm() < self.radius + radius - slack
    }

    pub fn overlaps(&self, other: &FocalPoint, slack: f64) -> bool {
        self.overlaps_circle(&other.position, other.radius, slack)
    }

    /// Intersects the segment `p0 -> p1` with this point's circle.
    ///
    /// A hit requires both crossings to lie on the segment (`0 <= t0 <= t1 <= 1`),
    /// so a segment that starts or ends inside the circle does not count.
    pub fn line_intersection(&self, p0: &Vec2, p1: &Vec2) -> Option<Intersection> {
        // transform to the circle's reference frame
        let l0 = p0 - self.position;
        let l1 = p1 - self.position;
        let d = l1 - l0;

        let a = d.norm_squared();
        if a <= f64::EPSILON {
            return None;
        }
        let b = 2.0 * d.dot(&l0);
        let c = l0.norm_squared() - self.radius * self.radius;

        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return None;
        }

        let rt = disc.sqrt();
        let r0 = (-b - rt) / (2.0 * a);
        let r1 = (-b + rt) / (2.0 * a);
        let (t0, t1) = (r0.min(r1), r0.max(r1));

        let on_segment = |t: f64| (0.0..=1.0).contains(&t);
        if !on_segment(t0) || !on_segment(t1) {
            return None;
        }

        let along = p1 - p0;
        Some(Intersection {
            t0,
            t1,
            entry: p0 + along * t0,
            exit: p0 + along * t1,
        })
    }

    pub fn to_view(&self) -> FocalPointView {
        FocalPointView {
            id: self.id.clone(),
            x: self.position.x,
            y: self.position.y,
            ttl_seconds: self.ttl.as_secs_f64(),
        }
    }
}

/// The published form of a single focal point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocalPointView {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub ttl_seconds: f64,
}

/// All live focal points, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FocalPointsSnapshot {
    pub focal_points: Vec<FocalPointView>,
}

impl FocalPointsSnapshot {
    pub fn len(&self) -> usize {
        self.focal_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.focal_points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_at(x: f64, y: f64) -> FocalPoint {
        FocalPoint::new("g1", Vec2::new(x, y), 0.6, Duration::from_secs(5), Instant::now())
    }

    #[test]
    fn symmetric_segment_through_center_hits_with_roots_on_segment() {
        let fp = point_at(1.0, 1.0);
        let hit = fp
            .line_intersection(&Vec2::new(0.0, 1.0), &Vec2::new(2.0, 1.0))
            .expect("segment through the center must hit");

        assert!((0.0..=1.0).contains(&hit.t0));
        assert!((0.0..=1.0).contains(&hit.t1));
        assert!((hit.t0 - 0.2).abs() < 1e-9);
        assert!((hit.t1 - 0.8).abs() < 1e-9);
        assert!((hit.entry - Vec2::new(0.4, 1.0)).norm() < 1e-9);
        assert!((hit.midpoint() - Vec2::new(1.0, 1.0)).norm() < 1e-9);
    }

    #[test]
    fn segment_outside_circle_misses() {
        let fp = point_at(1.0, 1.0);
        assert!(
            fp.line_intersection(&Vec2::new(0.0, 3.0), &Vec2::new(2.0, 3.0))
                .is_none()
        );
    }

    #[test]
    fn segment_that_stops_short_of_the_circle_misses() {
        let fp = point_at(5.0, 0.0);
        // The infinite line crosses the circle, but both roots are beyond t = 1.
        assert!(
            fp.line_intersection(&Vec2::new(0.0, 0.0), &Vec2::new(2.0, 0.0))
                .is_none()
        );
    }

    #[test]
    fn segment_starting_inside_circle_misses() {
        let fp = point_at(0.0, 0.0);
        assert!(
            fp.line_intersection(&Vec2::new(0.1, 0.0), &Vec2::new(3.0, 0.0))
                .is_none()
        );
    }

    #[test]
    fn zero_length_segment_misses() {
        let fp = point_at(0.0, 0.0);
        let p = Vec2::new(0.1, 0.1);
        assert!(fp.line_intersection(&p, &p).is_none());
    }

    #[test]
    fn overlap_respects_slack() {
        let a = point_at(0.0, 0.0);
        let b = point_at(0.8, 0.0);
        // radii sum to 1.2
        assert!(a.overlaps(&b, 0.0));
        assert!(!a.overlaps(&b, 0.5));
        assert!(a.overlaps_circle(&Vec2::new(0.1, 0.0), 0.6, 1.0));
    }

    #[test]
    fn expiry_is_strict() {
        let now = Instant::now();
        let fp = FocalPoint::new("g1", Vec2::zeros(), 0.6, Duration::from_secs(5), now);
        assert!(!fp.is_expired(now + Duration::from_secs(5)));
        assert!(fp.is_expired(now + Duration::from_millis(5001)));
    }

    #[test]
    fn view_reports_ttl_in_seconds() {
        let view = point_at(1.5, -2.0).to_view();
        assert_eq!(view.id, "g1");
        assert_eq!((view.x, view.y), (1.5, -2.0));
        assert_eq!(view.ttl_seconds, 5.0);
    }
}
