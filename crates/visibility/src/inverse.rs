//! Inverse visibility
//!
//! Given a set of target cells, determines which candidate observer cells
//! can see them, and accumulates per-observer and per-target statistics
//! over the whole grid.
//!
//! Built strictly on reciprocal viewshed sweeps: under the angle-envelope
//! LOS model, "A sees B" is symmetric once the height offsets swap roles,
//! so each target is treated as a temporary observer (at the candidate
//! observers' eye height) and swept outward. Every cell its sweep marks
//! visible is a true observer of that target. The per-target sweeps are
//! independent and run in a rayon data-parallel loop; partial results are
//! collected in target order and merged on one thread, so the output is
//! byte-identical for any worker count.

use crate::los::Interpolation;
use crate::sweep::{viewshed, ViewshedParams};
use crate::window::SightWindow;
use aethergis_core::raster::Raster;
use aethergis_core::{Error, Result};
use ndarray::Array2;
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

/// The cells whose visibility is being assessed.
#[derive(Debug, Clone)]
pub enum TargetSet {
    /// Boolean membership mask, same shape as the DEM
    Mask(Array2<bool>),
    /// Explicit list of (row, col) cells
    Cells(Vec<(usize, usize)>),
    /// Per-cell importance weights, same shape as the DEM. Cells with a
    /// nonzero weight are targets; their weight scales the contribution to
    /// the observer tally. Negative weights are rejected.
    Weighted(Array2<f64>),
}

/// Parameters for inverse visibility
#[derive(Debug, Clone)]
pub struct InverseParams {
    /// Eye height of candidate observers above ground (map units)
    pub observer_height: f64,
    /// Terrain sampling mode along sight lines
    pub interpolation: Interpolation,
    /// Maximum planar distance in map units (None or negative = unlimited)
    pub max_distance: Option<f64>,
    /// Optional geometric filter window
    pub window: SightWindow,
    /// Which cells may act as observers; None = all cells eligible
    pub observer_mask: Option<Array2<bool>>,
}

impl Default for InverseParams {
    fn default() -> Self {
        Self {
            observer_height: 1.7,
            interpolation: Interpolation::default(),
            max_distance: None,
            window: SightWindow::default(),
            observer_mask: None,
        }
    }
}

/// Grid-wide visibility statistics, all grids DEM-shaped.
///
/// Plain data: ranking and selection live in [`crate::rank`].
#[derive(Debug, Clone)]
pub struct VisibilityResult {
    /// (Weighted) number of targets seen from each cell used as an observer
    pub observer_hits: Raster<f64>,
    /// `observer_hits / total_targets`
    pub observer_ratio: Raster<f64>,
    /// Number of eligible observers that see each target cell
    pub target_hits: Raster<u32>,
    /// `target_hits / total_eligible_observers`
    pub target_ratio: Raster<f64>,
    /// Number of cells satisfying the geometric window for each target,
    /// occlusion ignored (the theoretical observer population)
    pub target_possible: Raster<u32>,
    /// `target_hits / target_possible` (0 where possible is 0)
    pub target_possible_ratio: Raster<f64>,
    /// `target_hits / count of cells with observer_hits > 0` (0 if none)
    pub target_active_ratio: Raster<f64>,
}

/// Per-target partial result produced by one parallel worker.
struct TargetSweep {
    row: usize,
    col: usize,
    weight: f64,
    /// Eligible observer cells the reciprocal sweep marked visible
    seen_by: Vec<(usize, usize)>,
    /// Eligible cells passing the geometric window, occlusion ignored
    possible: u32,
}

/// Compute inverse visibility for a set of target cells.
///
/// For each target a reciprocal viewshed sweep is run with the target as a
/// temporary observer at `observer_height` (target offset 0). The
/// geometric window is then re-applied per candidate cell: cells passing
/// it count toward the target's *possible* tally regardless of occlusion,
/// and those the sweep marked visible count as actual observers. The
/// re-application is deliberate — the possible tally is geometry-only and
/// must not depend on terrain occlusion.
///
/// Degenerate-but-valid inputs (a fully ineligible observer mask, a target
/// no cell can theoretically observe) produce zero ratios, never an error.
pub fn inverse_visibility(
    dem: &Raster<f64>,
    targets: &TargetSet,
    params: &InverseParams,
) -> Result<VisibilityResult> {
    let (rows, cols) = dem.shape();

    let window = params.window.resolve(params.max_distance)?;
    let target_cells = collect_targets(targets, rows, cols)?;
    let total_targets = target_cells.len();

    if let Some(mask) = &params.observer_mask {
        if mask.dim() != (rows, cols) {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: mask.nrows(),
                ac: mask.ncols(),
            });
        }
    }
    let total_eligible = match &params.observer_mask {
        Some(mask) => mask.iter().filter(|&&m| m).count(),
        None => rows * cols,
    };

    let started = Instant::now();
    debug!(rows, cols, total_targets, total_eligible, "inverse visibility start");

    let res_y = dem.res_y();
    let res_x = dem.res_x();

    // Each target's reciprocal sweep is independent of every other's; this
    // loop is the system's only concurrency boundary.
    let sweeps: Vec<TargetSweep> = target_cells
        .par_iter()
        .map(|&(tgt_r, tgt_c, weight)| {
            let vs = viewshed(
                dem,
                &ViewshedParams {
                    observer_row: tgt_r,
                    observer_col: tgt_c,
                    observer_height: params.observer_height,
                    target_height: 0.0,
                    interpolation: params.interpolation,
                    max_distance: params.max_distance,
                    window: params.window.clone(),
                },
            )?;

            let eye = unsafe { dem.get_unchecked(tgt_r, tgt_c) } + params.observer_height;
            let mut seen_by = Vec::new();
            let mut possible = 0_u32;

            for i in 0..rows {
                let dy = (i as f64 - tgt_r as f64) * res_y;
                for j in 0..cols {
                    let eligible = params
                        .observer_mask
                        .as_ref()
                        .map_or(true, |m| m[(i, j)]);
                    if !eligible {
                        continue;
                    }

                    let dx = (j as f64 - tgt_c as f64) * res_x;
                    let dz = unsafe { dem.get_unchecked(i, j) } - eye;
                    if !window.passes(dy, dx, dz) {
                        continue;
                    }

                    possible += 1;
                    if unsafe { vs.get_unchecked(i, j) } == 1 {
                        seen_by.push((i, j));
                    }
                }
            }

            Ok(TargetSweep {
                row: tgt_r,
                col: tgt_c,
                weight,
                seen_by,
                possible,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // Single-threaded merge in target order: concurrent workers never touch
    // the shared accumulation grids, so no increments can be lost and the
    // result does not depend on scheduling.
    let mut observer_hits = dem.with_same_meta::<f64>(rows, cols);
    let mut target_hits = dem.with_same_meta::<u32>(rows, cols);
    let mut target_possible = dem.with_same_meta::<u32>(rows, cols);

    for sweep in &sweeps {
        for &(r, c) in &sweep.seen_by {
            let hits = unsafe { observer_hits.get_unchecked(r, c) };
            unsafe { observer_hits.set_unchecked(r, c, hits + sweep.weight) };
        }
        unsafe {
            target_hits.set_unchecked(sweep.row, sweep.col, sweep.seen_by.len() as u32);
            target_possible.set_unchecked(sweep.row, sweep.col, sweep.possible);
        }
    }

    // Derived ratios; every division is guarded, a zero denominator
    // defines the ratio as zero.
    let active_observers = observer_hits.data().iter().filter(|&&h| h > 0.0).count();

    let mut observer_ratio = dem.with_same_meta::<f64>(rows, cols);
    let mut target_ratio = dem.with_same_meta::<f64>(rows, cols);
    let mut target_possible_ratio = dem.with_same_meta::<f64>(rows, cols);
    let mut target_active_ratio = dem.with_same_meta::<f64>(rows, cols);

    for r in 0..rows {
        for c in 0..cols {
            let hits = unsafe { observer_hits.get_unchecked(r, c) };
            unsafe {
                observer_ratio.set_unchecked(r, c, hits / total_targets as f64);
            }

            let tgt = unsafe { target_hits.get_unchecked(r, c) } as f64;
            let possible = unsafe { target_possible.get_unchecked(r, c) } as f64;
            unsafe {
                target_ratio.set_unchecked(
                    r,
                    c,
                    if total_eligible > 0 { tgt / total_eligible as f64 } else { 0.0 },
                );
                target_possible_ratio.set_unchecked(
                    r,
                    c,
                    if possible > 0.0 { tgt / possible } else { 0.0 },
                );
                target_active_ratio.set_unchecked(
                    r,
                    c,
                    if active_observers > 0 { tgt / active_observers as f64 } else { 0.0 },
                );
            }
        }
    }

    debug!(
        total_targets,
        active_observers,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "inverse visibility complete"
    );

    Ok(VisibilityResult {
        observer_hits,
        observer_ratio,
        target_hits,
        target_ratio,
        target_possible,
        target_possible_ratio,
        target_active_ratio,
    })
}

/// Flatten a target set into (row, col, weight) triples, validating
/// membership, shape and weight sign. Rejects the empty set.
fn collect_targets(
    targets: &TargetSet,
    rows: usize,
    cols: usize,
) -> Result<Vec<(usize, usize, f64)>> {
    let cells = match targets {
        TargetSet::Mask(mask) => {
            if mask.dim() != (rows, cols) {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: mask.nrows(),
                    ac: mask.ncols(),
                });
            }
            mask.indexed_iter()
                .filter(|&(_, &m)| m)
                .map(|((r, c), _)| (r, c, 1.0))
                .collect()
        }
        TargetSet::Cells(cells) => {
            let mut out = Vec::with_capacity(cells.len());
            for &(r, c) in cells {
                if r >= rows || c >= cols {
                    return Err(Error::IndexOutOfBounds { row: r, col: c, rows, cols });
                }
                out.push((r, c, 1.0));
            }
            out
        }
        TargetSet::Weighted(weights) => {
            if weights.dim() != (rows, cols) {
                return Err(Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: weights.nrows(),
                    ac: weights.ncols(),
                });
            }
            let mut out = Vec::new();
            for ((r, c), &w) in weights.indexed_iter() {
                if w < 0.0 || w.is_nan() {
                    return Err(Error::InvalidParameter {
                        name: "weights",
                        value: format!("{w} at ({r}, {c})"),
                        reason: "per-cell weights must be non-negative".into(),
                    });
                }
                if w > 0.0 {
                    out.push((r, c, w));
                }
            }
            out
        }
    };

    if cells.is_empty() {
        return Err(Error::EmptyTargetSet);
    }
    Ok(cells)
}
