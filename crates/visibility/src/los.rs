//! Line-of-sight kernel
//!
//! Tests whether a single target cell is visible from a single observer
//! cell, given the terrain between them. This is the only module that reads
//! the raw elevation array directly; the viewshed sweep and the
//! inverse-visibility accumulator are built on top of it.
//!
//! The test is the classic angle-envelope terrain LOS check: walk the
//! straight line between the two cells, one sample per unit of the dominant
//! grid axis, and track the maximum vertical viewing angle demanded by the
//! intermediate terrain. The target is visible iff its own viewing angle
//! meets or exceeds that envelope.
//!
//! Reference:
//! Franklin, W.R. & Ray, C. (1994). Higher isn't necessarily better:
//! visibility algorithms and experiments. GIS/LIS.

use aethergis_core::raster::Raster;

/// How intermediate terrain heights are sampled along the sight line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Sample the nearest cell to each point on the line
    #[default]
    Nearest,
    /// Blend the four cells surrounding each point on the line
    Bilinear,
}

/// Test whether `target` is visible from `observer`.
///
/// `observer_height` and `target_height` are vertical offsets added to the
/// terrain elevation at the respective cells. Planar distances honour the
/// DEM's per-axis resolutions, so anisotropic cells are handled correctly.
///
/// Total over any two in-grid cells: coincident cells are trivially
/// visible, and no allocation or mutation takes place. Out-of-grid cells
/// and NaN terrain (either endpoint or any intermediate sample) report
/// "not visible".
pub fn is_visible(
    dem: &Raster<f64>,
    observer: (usize, usize),
    observer_height: f64,
    target: (usize, usize),
    target_height: f64,
    interpolation: Interpolation,
) -> bool {
    let (rows, cols) = dem.shape();
    let (obs_r, obs_c) = observer;
    let (tgt_r, tgt_c) = target;

    if obs_r >= rows || obs_c >= cols || tgt_r >= rows || tgt_c >= cols {
        return false;
    }
    if observer == target {
        return true;
    }

    let res_y = dem.res_y();
    let res_x = dem.res_x();

    let z_obs = unsafe { dem.get_unchecked(obs_r, obs_c) };
    let z_tgt = unsafe { dem.get_unchecked(tgt_r, tgt_c) };
    if z_obs.is_nan() || z_tgt.is_nan() {
        return false;
    }
    let eye = z_obs + observer_height;

    let dr = tgt_r as isize - obs_r as isize;
    let dc = tgt_c as isize - obs_c as isize;

    let dy = dr as f64 * res_y;
    let dx = dc as f64 * res_x;
    let target_dist = (dy * dy + dx * dx).sqrt();
    let target_angle = (z_tgt + target_height - eye).atan2(target_dist);

    // One sample per unit of the dominant axis, intermediate points only
    let steps = dr.unsigned_abs().max(dc.unsigned_abs());
    let step_r = dr as f64 / steps as f64;
    let step_c = dc as f64 / steps as f64;

    let mut envelope = f64::NEG_INFINITY;

    for s in 1..steps {
        let fr = obs_r as f64 + step_r * s as f64;
        let fc = obs_c as f64 + step_c * s as f64;

        let z = match interpolation {
            Interpolation::Nearest => sample_nearest(dem, fr, fc),
            Interpolation::Bilinear => sample_bilinear(dem, fr, fc, rows, cols),
        };
        if z.is_nan() {
            return false;
        }

        let sy = (fr - obs_r as f64) * res_y;
        let sx = (fc - obs_c as f64) * res_x;
        let dist = (sy * sy + sx * sx).sqrt();

        let angle = (z - eye).atan2(dist);
        if angle > envelope {
            envelope = angle;
        }
    }

    target_angle >= envelope
}

/// Nearest-cell sample at a fractional grid position.
///
/// Positions on the sight line are convex combinations of two in-grid
/// cells, so the rounded indices are always in grid.
#[inline]
fn sample_nearest(dem: &Raster<f64>, fr: f64, fc: f64) -> f64 {
    unsafe { dem.get_unchecked(fr.round() as usize, fc.round() as usize) }
}

/// Bilinear sample at a fractional grid position, edge-clamped.
#[inline]
fn sample_bilinear(dem: &Raster<f64>, fr: f64, fc: f64, rows: usize, cols: usize) -> f64 {
    let r0f = fr.floor();
    let c0f = fc.floor();
    let wr = fr - r0f;
    let wc = fc - c0f;

    let r0 = r0f as usize;
    let c0 = c0f as usize;
    let r1 = (r0 + 1).min(rows - 1);
    let c1 = (c0 + 1).min(cols - 1);

    let z00 = unsafe { dem.get_unchecked(r0, c0) };
    let z01 = unsafe { dem.get_unchecked(r0, c1) };
    let z10 = unsafe { dem.get_unchecked(r1, c0) };
    let z11 = unsafe { dem.get_unchecked(r1, c1) };

    z00 * (1.0 - wr) * (1.0 - wc)
        + z01 * (1.0 - wr) * wc
        + z10 * wr * (1.0 - wc)
        + z11 * wr * wc
}
