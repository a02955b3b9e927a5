//! Geometric filter window
//!
//! Cheap distance/azimuth/elevation-angle pruning applied before any LOS
//! test. The viewshed sweep uses it to skip cells outright; the
//! inverse-visibility accumulator additionally re-applies it per candidate
//! observer to tally the geometry-only "possible observer" population.
//!
//! ## Azimuth convention
//! Azimuth 0 = grid east (+column axis), increasing clockwise on screen
//! (rows grow downward), normalized to [0, 2π). A window with `end < start`
//! wraps across the 2π discontinuity.

use aethergis_core::{Error, Result};
use std::f64::consts::{FRAC_PI_2, PI};

const TWO_PI: f64 = 2.0 * PI;

/// Optional geometric constraints on which cells are considered at all.
///
/// All fields default to `None`, meaning unconstrained.
#[derive(Debug, Clone, Default)]
pub struct SightWindow {
    /// Planar distance range [min, max] in map units, inclusive
    pub distance: Option<(f64, f64)>,
    /// Azimuth range [start, end] in radians; wraps across 2π when end < start
    pub azimuth: Option<(f64, f64)>,
    /// Elevation-angle range [min, max] in radians from the horizontal
    /// (positive = looking up), inclusive
    pub elevation: Option<(f64, f64)>,
}

impl SightWindow {
    /// Validate the window and fold it, together with an optional maximum
    /// distance (negative or `None` = unlimited), into a concrete predicate.
    pub fn resolve(&self, max_distance: Option<f64>) -> Result<ResolvedWindow> {
        let mut min_dist = 0.0;
        let mut max_dist = f64::INFINITY;

        if let Some(d) = max_distance {
            if d >= 0.0 {
                max_dist = d;
            }
        }

        if let Some((min, max)) = self.distance {
            if min < 0.0 || min > max || !min.is_finite() {
                return Err(Error::InvalidParameter {
                    name: "distance",
                    value: format!("({min}, {max})"),
                    reason: "distance window requires 0 <= min <= max".into(),
                });
            }
            min_dist = min;
            max_dist = max_dist.min(max);
        }

        let (mut az_start, mut az_end) = (0.0, TWO_PI);
        if let Some((start, end)) = self.azimuth {
            if !start.is_finite() || !end.is_finite() {
                return Err(Error::InvalidParameter {
                    name: "azimuth",
                    value: format!("({start}, {end})"),
                    reason: "azimuth window must be finite".into(),
                });
            }
            // a span of a full turn or more is no constraint at all
            if (end - start).abs() < TWO_PI {
                az_start = start.rem_euclid(TWO_PI);
                az_end = end.rem_euclid(TWO_PI);
            }
        }

        let (mut elev_min, mut elev_max) = (-FRAC_PI_2, FRAC_PI_2);
        if let Some((min, max)) = self.elevation {
            if min > max || !min.is_finite() || !max.is_finite() {
                return Err(Error::InvalidParameter {
                    name: "elevation",
                    value: format!("({min}, {max})"),
                    reason: "elevation window requires min <= max".into(),
                });
            }
            elev_min = min;
            elev_max = max;
        }

        Ok(ResolvedWindow {
            min_dist2: min_dist * min_dist,
            max_dist2: max_dist * max_dist,
            az_start,
            az_end,
            elev_min,
            elev_max,
        })
    }
}

/// A [`SightWindow`] resolved to concrete bounds, ready for per-cell tests.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedWindow {
    min_dist2: f64,
    max_dist2: f64,
    az_start: f64,
    az_end: f64,
    elev_min: f64,
    elev_max: f64,
}

impl ResolvedWindow {
    /// Test a candidate cell at planar offset (dy, dx) from the eye and
    /// vertical offset dz = terrain elevation minus eye elevation.
    ///
    /// The eye's own cell has `atan2(dz, 0) = ±π/2` as its elevation angle,
    /// so the coincident case never divides by zero.
    pub fn passes(&self, dy: f64, dx: f64, dz: f64) -> bool {
        let dist2 = dy * dy + dx * dx;
        if dist2 < self.min_dist2 || dist2 > self.max_dist2 {
            return false;
        }

        let mut az = dy.atan2(dx);
        if az < 0.0 {
            az += TWO_PI;
        }
        let in_azimuth = if self.az_end >= self.az_start {
            az >= self.az_start && az <= self.az_end
        } else {
            az >= self.az_start || az <= self.az_end
        };
        if !in_azimuth {
            return false;
        }

        let elev = dz.atan2(dist2.sqrt());
        elev >= self.elev_min && elev <= self.elev_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconstrained() -> ResolvedWindow {
        SightWindow::default().resolve(None).unwrap()
    }

    #[test]
    fn test_default_passes_everything() {
        let w = unconstrained();
        assert!(w.passes(0.0, 0.0, -1.7)); // eye's own cell
        assert!(w.passes(-3.0, 4.0, 100.0));
        assert!(w.passes(1e6, -1e6, -1e6));
    }

    #[test]
    fn test_max_distance() {
        let w = SightWindow::default().resolve(Some(5.0)).unwrap();
        assert!(w.passes(3.0, 4.0, 0.0));
        assert!(!w.passes(3.0, 4.1, 0.0));
        // negative means unlimited
        let w = SightWindow::default().resolve(Some(-1.0)).unwrap();
        assert!(w.passes(1e9, 0.0, 0.0));
    }

    #[test]
    fn test_distance_window() {
        let w = SightWindow {
            distance: Some((2.0, 10.0)),
            ..Default::default()
        }
        .resolve(None)
        .unwrap();
        assert!(!w.passes(0.0, 0.0, 0.0));
        assert!(!w.passes(0.0, 1.9, 0.0));
        assert!(w.passes(0.0, 2.0, 0.0));
        assert!(w.passes(6.0, 8.0, 0.0));
        assert!(!w.passes(6.0, 8.1, 0.0));
    }

    #[test]
    fn test_distance_window_tightens_max_distance() {
        let w = SightWindow {
            distance: Some((0.0, 100.0)),
            ..Default::default()
        }
        .resolve(Some(5.0))
        .unwrap();
        assert!(!w.passes(0.0, 6.0, 0.0));
    }

    #[test]
    fn test_invalid_distance_window() {
        for bad in [(5.0, 2.0), (-1.0, 2.0)] {
            let err = SightWindow {
                distance: Some(bad),
                ..Default::default()
            }
            .resolve(None);
            assert!(err.is_err(), "window {bad:?} should be rejected");
        }
    }

    #[test]
    fn test_azimuth_window() {
        // first quadrant: east through south (clockwise, rows grow downward)
        let w = SightWindow {
            azimuth: Some((0.0, FRAC_PI_2)),
            ..Default::default()
        }
        .resolve(None)
        .unwrap();
        assert!(w.passes(0.0, 1.0, 0.0)); // due east, az = 0
        assert!(w.passes(1.0, 1.0, 0.0)); // az = π/4
        assert!(w.passes(1.0, 0.0, 0.0)); // az = π/2
        assert!(!w.passes(-1.0, 1.0, 0.0)); // az = 7π/4
        assert!(!w.passes(0.0, -1.0, 0.0)); // az = π
    }

    #[test]
    fn test_azimuth_wraparound() {
        // window spanning the 2π discontinuity
        let w = SightWindow {
            azimuth: Some((7.0 * PI / 4.0, PI / 4.0)),
            ..Default::default()
        }
        .resolve(None)
        .unwrap();
        assert!(w.passes(0.0, 1.0, 0.0)); // az = 0
        assert!(w.passes(-1.0, 1.0, 0.0)); // az = 7π/4
        assert!(w.passes(1.0, 1.0, 0.0)); // az = π/4
        assert!(!w.passes(0.0, -1.0, 0.0)); // az = π
    }

    #[test]
    fn test_full_turn_azimuth_unconstrained() {
        let w = SightWindow {
            azimuth: Some((0.0, TWO_PI)),
            ..Default::default()
        }
        .resolve(None)
        .unwrap();
        for (dy, dx) in [(0.0, 1.0), (1.0, 0.0), (0.0, -1.0), (-1.0, 0.0)] {
            assert!(w.passes(dy, dx, 0.0));
        }
    }

    #[test]
    fn test_elevation_window() {
        let w = SightWindow {
            elevation: Some((0.0, FRAC_PI_2)),
            ..Default::default()
        }
        .resolve(None)
        .unwrap();
        assert!(w.passes(0.0, 10.0, 5.0)); // looking up
        assert!(w.passes(0.0, 10.0, 0.0)); // horizontal
        assert!(!w.passes(0.0, 10.0, -5.0)); // looking down
    }

    #[test]
    fn test_invalid_elevation_window() {
        let err = SightWindow {
            elevation: Some((0.5, -0.5)),
            ..Default::default()
        }
        .resolve(None);
        assert!(err.is_err());
    }
}
