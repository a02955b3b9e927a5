//! Viewshed sweep
//!
//! Applies the LOS kernel from one fixed observer to every cell of the
//! grid, with optional distance/azimuth/elevation-angle pruning, producing
//! a binary visibility raster.

use crate::los::{is_visible, Interpolation};
use crate::window::SightWindow;
use aethergis_core::raster::Raster;
use aethergis_core::{Error, Result};
use std::time::Instant;
use tracing::debug;

/// Parameters for a viewshed sweep
#[derive(Debug, Clone)]
pub struct ViewshedParams {
    /// Observer row position
    pub observer_row: usize,
    /// Observer column position
    pub observer_col: usize,
    /// Observer height above ground (map units, default 1.7)
    pub observer_height: f64,
    /// Target height above ground (map units, default 0.0)
    pub target_height: f64,
    /// Terrain sampling mode along sight lines
    pub interpolation: Interpolation,
    /// Maximum planar distance in map units (None or negative = unlimited)
    pub max_distance: Option<f64>,
    /// Optional geometric filter window
    pub window: SightWindow,
}

impl Default for ViewshedParams {
    fn default() -> Self {
        Self {
            observer_row: 0,
            observer_col: 0,
            observer_height: 1.7,
            target_height: 0.0,
            interpolation: Interpolation::default(),
            max_distance: None,
            window: SightWindow::default(),
        }
    }
}

impl ViewshedParams {
    /// Observer at (row, col), everything else defaulted
    pub fn at(observer_row: usize, observer_col: usize) -> Self {
        Self {
            observer_row,
            observer_col,
            ..Default::default()
        }
    }
}

/// Compute the viewshed of a single observer.
///
/// For every cell the geometric window is applied first; surviving cells
/// are tested with the LOS kernel. The observer's own cell is always
/// marked visible.
///
/// Runs on a single thread: the inverse-visibility accumulator is the
/// intended concurrency boundary, and it calls this sweep from many
/// workers at once.
///
/// # Arguments
/// * `dem` - Input DEM
/// * `params` - Observer position, heights and filters
///
/// # Returns
/// Raster<u8> where 1 = visible, 0 = not visible
pub fn viewshed(dem: &Raster<f64>, params: &ViewshedParams) -> Result<Raster<u8>> {
    let (rows, cols) = dem.shape();

    if params.observer_row >= rows || params.observer_col >= cols {
        return Err(Error::IndexOutOfBounds {
            row: params.observer_row,
            col: params.observer_col,
            rows,
            cols,
        });
    }

    let z_obs = unsafe { dem.get_unchecked(params.observer_row, params.observer_col) };
    if z_obs.is_nan() {
        return Err(Error::Algorithm("Observer is on NaN cell".into()));
    }

    let window = params.window.resolve(params.max_distance)?;
    let started = Instant::now();

    let res_y = dem.res_y();
    let res_x = dem.res_x();
    let eye = z_obs + params.observer_height;
    let observer = (params.observer_row, params.observer_col);

    let mut output = dem.with_same_meta::<u8>(rows, cols);
    output.set_nodata(Some(0));
    unsafe { output.set_unchecked(params.observer_row, params.observer_col, 1) };

    for i in 0..rows {
        let dy = (i as f64 - params.observer_row as f64) * res_y;
        for j in 0..cols {
            let dx = (j as f64 - params.observer_col as f64) * res_x;
            let dz = unsafe { dem.get_unchecked(i, j) } - eye;

            if !window.passes(dy, dx, dz) {
                continue;
            }
            if is_visible(
                dem,
                observer,
                params.observer_height,
                (i, j),
                params.target_height,
                params.interpolation,
            ) {
                unsafe { output.set_unchecked(i, j, 1) };
            }
        }
    }

    debug!(
        rows,
        cols,
        observer_row = params.observer_row,
        observer_col = params.observer_col,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "viewshed sweep complete"
    );

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aethergis_core::GeoTransform;
    use std::f64::consts::PI;

    fn flat_dem(rows: usize, cols: usize, z: f64) -> Raster<f64> {
        let mut dem = Raster::filled(rows, cols, z);
        dem.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        dem
    }

    #[test]
    fn test_flat_all_visible() {
        // 5x5 flat grid, observer at (2,2), eye height 1.0: everything visible
        let dem = flat_dem(5, 5, 0.0);
        let vs = viewshed(
            &dem,
            &ViewshedParams {
                observer_row: 2,
                observer_col: 2,
                observer_height: 1.0,
                ..Default::default()
            },
        )
        .unwrap();

        for r in 0..5 {
            for c in 0..5 {
                assert_eq!(vs.get(r, c).unwrap(), 1, "cell ({r},{c}) should be visible");
            }
        }
    }

    #[test]
    fn test_spike_shadows_cells_behind() {
        // 100-unit spike directly east of a ground-level observer
        let mut dem = flat_dem(5, 5, 0.0);
        dem.set(2, 3, 100.0).unwrap();

        let vs = viewshed(
            &dem,
            &ViewshedParams {
                observer_row: 2,
                observer_col: 0,
                observer_height: 0.0,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(vs.get(2, 3).unwrap(), 1, "the spike itself is visible");
        assert_eq!(vs.get(2, 4).unwrap(), 0, "cell beyond the spike is shadowed");
        // cells off that azimuth stay visible
        assert_eq!(vs.get(0, 4).unwrap(), 1);
        assert_eq!(vs.get(4, 4).unwrap(), 1);
        assert_eq!(vs.get(2, 2).unwrap(), 1);
    }

    #[test]
    fn test_observer_cell_always_visible() {
        let mut dem = flat_dem(5, 5, 0.0);
        // bury the observer in a pit, behind every filter
        dem.set(2, 2, -100.0).unwrap();
        let vs = viewshed(
            &dem,
            &ViewshedParams {
                observer_row: 2,
                observer_col: 2,
                observer_height: 0.0,
                window: SightWindow {
                    distance: Some((1.0, 2.0)),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(vs.get(2, 2).unwrap(), 1);
    }

    #[test]
    fn test_max_distance_prunes() {
        let dem = flat_dem(9, 9, 0.0);
        let vs = viewshed(
            &dem,
            &ViewshedParams {
                observer_row: 4,
                observer_col: 4,
                observer_height: 1.0,
                max_distance: Some(2.0),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(vs.get(4, 6).unwrap(), 1, "at the limit");
        assert_eq!(vs.get(4, 7).unwrap(), 0, "beyond the limit");
        assert_eq!(vs.get(6, 6).unwrap(), 0, "diagonal beyond the limit");
    }

    #[test]
    fn test_shrinking_distance_is_subset() {
        let mut dem = flat_dem(11, 11, 0.0);
        dem.set(5, 7, 30.0).unwrap();
        dem.set(3, 3, 12.0).unwrap();

        let base = ViewshedParams {
            observer_row: 5,
            observer_col: 5,
            observer_height: 1.5,
            ..Default::default()
        };
        let full = viewshed(&dem, &base).unwrap();
        let near = viewshed(
            &dem,
            &ViewshedParams {
                max_distance: Some(3.0),
                ..base
            },
        )
        .unwrap();

        for r in 0..11 {
            for c in 0..11 {
                if near.get(r, c).unwrap() == 1 {
                    assert_eq!(full.get(r, c).unwrap(), 1, "({r},{c}) broke the subset property");
                }
            }
        }
    }

    #[test]
    fn test_azimuth_halves_partition() {
        let mut dem = flat_dem(9, 9, 0.0);
        dem.set(2, 6, 8.0).unwrap();

        let base = ViewshedParams {
            observer_row: 4,
            observer_col: 4,
            observer_height: 1.7,
            ..Default::default()
        };
        let all = viewshed(&dem, &base).unwrap();
        let first = viewshed(
            &dem,
            &ViewshedParams {
                window: SightWindow {
                    azimuth: Some((0.0, PI)),
                    ..Default::default()
                },
                ..base.clone()
            },
        )
        .unwrap();
        let second = viewshed(
            &dem,
            &ViewshedParams {
                window: SightWindow {
                    azimuth: Some((PI, 2.0 * PI)),
                    ..Default::default()
                },
                ..base
            },
        )
        .unwrap();

        // union reconstructs the unconstrained viewshed (boundary ties may
        // fall in both halves, never in neither)
        for r in 0..9 {
            for c in 0..9 {
                let union = first.get(r, c).unwrap().max(second.get(r, c).unwrap());
                assert_eq!(union, all.get(r, c).unwrap(), "mismatch at ({r},{c})");
            }
        }
    }

    #[test]
    fn test_elevation_window_prunes_level_cells() {
        let mut dem = flat_dem(9, 9, 0.0);
        dem.set(0, 0, 50.0).unwrap();

        let vs = viewshed(
            &dem,
            &ViewshedParams {
                observer_row: 4,
                observer_col: 4,
                observer_height: 1.0,
                window: SightWindow {
                    elevation: Some((0.3, PI / 2.0)),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(vs.get(0, 0).unwrap(), 1, "the high peak is in the window");
        assert_eq!(vs.get(4, 8).unwrap(), 0, "level terrain is below the window");
    }

    #[test]
    fn test_idempotent() {
        let mut dem = flat_dem(8, 8, 0.0);
        dem.set(3, 4, 9.0).unwrap();
        dem.set(6, 1, 4.0).unwrap();

        let params = ViewshedParams::at(2, 2);
        let a = viewshed(&dem, &params).unwrap();
        let b = viewshed(&dem, &params).unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_invalid_observer() {
        let dem = flat_dem(5, 5, 0.0);
        assert!(viewshed(&dem, &ViewshedParams::at(5, 0)).is_err());
        assert!(viewshed(&dem, &ViewshedParams::at(0, 9)).is_err());
    }

    #[test]
    fn test_observer_on_nan_rejected() {
        let mut dem = flat_dem(5, 5, 0.0);
        dem.set(2, 2, f64::NAN).unwrap();
        assert!(viewshed(&dem, &ViewshedParams::at(2, 2)).is_err());
    }

    #[test]
    fn test_malformed_window_rejected() {
        let dem = flat_dem(5, 5, 0.0);
        let params = ViewshedParams {
            window: SightWindow {
                distance: Some((4.0, 1.0)),
                ..Default::default()
            },
            ..ViewshedParams::at(2, 2)
        };
        assert!(viewshed(&dem, &params).is_err());
    }
}
