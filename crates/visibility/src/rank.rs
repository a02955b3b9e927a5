//! Observer ranking
//!
//! Selects the best-ranked observer cells from an accumulated
//! [`VisibilityResult`](crate::inverse::VisibilityResult).

use crate::inverse::VisibilityResult;

/// Return up to `k` observer cells with the largest `observer_hits`,
/// best first. Ties break by row-major scan order.
///
/// Uses a partial selection over flat indices (O(n) average) followed by a
/// sort of the k-element head; the full grid is never sorted.
pub fn best_observers(result: &VisibilityResult, k: usize) -> Vec<(usize, usize)> {
    let counts = result.observer_hits.data();
    let n = counts.len();
    if k == 0 || n == 0 {
        return Vec::new();
    }
    let cols = result.observer_hits.cols();

    let mut ranked: Vec<(usize, f64)> = counts.iter().copied().enumerate().collect();
    let k = k.min(n);

    let by_hits_then_scan =
        |a: &(usize, f64), b: &(usize, f64)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));

    if k < n {
        ranked.select_nth_unstable_by(k - 1, by_hits_then_scan);
        ranked.truncate(k);
    }
    ranked.sort_unstable_by(by_hits_then_scan);

    ranked
        .into_iter()
        .take(k)
        .map(|(idx, _)| (idx / cols, idx % cols))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inverse::{inverse_visibility, InverseParams, TargetSet};
    use aethergis_core::{GeoTransform, Raster};

    fn result_on(dem: &Raster<f64>, targets: Vec<(usize, usize)>) -> VisibilityResult {
        inverse_visibility(dem, &TargetSet::Cells(targets), &InverseParams::default()).unwrap()
    }

    fn pit_dem() -> Raster<f64> {
        // a deep pit: cells inside see little, the rim sees everything
        let mut dem = Raster::filled(7, 7, 0.0_f64);
        dem.set_transform(GeoTransform::new(0.0, 7.0, 1.0, -1.0));
        for r in 2..5 {
            for c in 2..5 {
                dem.set(r, c, -50.0).unwrap();
            }
        }
        dem
    }

    #[test]
    fn test_top_k_count_and_order() {
        let dem = pit_dem();
        let result = result_on(&dem, vec![(0, 0), (6, 6), (3, 3)]);

        let top = best_observers(&result, 4);
        assert_eq!(top.len(), 4);

        // best-first: hit counts never increase along the ranking
        let hits =
            |&(r, c): &(usize, usize)| result.observer_hits.get(r, c).unwrap();
        for pair in top.windows(2) {
            assert!(hits(&pair[0]) >= hits(&pair[1]));
        }
    }

    #[test]
    fn test_ties_break_row_major() {
        // flat terrain: every cell sees every target, all counts equal
        let mut dem = Raster::filled(3, 4, 0.0_f64);
        dem.set_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));
        let result = result_on(&dem, vec![(1, 1)]);

        let top = best_observers(&result, 5);
        assert_eq!(top, vec![(0, 0), (0, 1), (0, 2), (0, 3), (1, 0)]);
    }

    #[test]
    fn test_k_zero_and_k_oversized() {
        let mut dem = Raster::filled(3, 3, 0.0_f64);
        dem.set_transform(GeoTransform::new(0.0, 3.0, 1.0, -1.0));
        let result = result_on(&dem, vec![(1, 1)]);

        assert!(best_observers(&result, 0).is_empty());
        assert_eq!(best_observers(&result, 100).len(), 9);
    }

    #[test]
    fn test_best_cell_wins() {
        let dem = pit_dem();
        // targets inside the pit: rim cells see them, far corners may not
        let result = result_on(&dem, vec![(3, 3), (3, 2), (2, 3)]);

        let top = best_observers(&result, 1);
        let best = result.observer_hits.get(top[0].0, top[0].1).unwrap();
        for &v in result.observer_hits.data().iter() {
            assert!(best >= v);
        }
    }
}
