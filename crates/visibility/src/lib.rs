//! # AetherGIS Visibility
//!
//! Terrain line-of-sight and viewshed analysis over elevation grids.
//!
//! Given an observer location and height, determine which cells of a DEM
//! are visible; given a set of target cells, determine which candidate
//! observer cells can see them (inverse visibility) and how often.
//!
//! Layered leaf-first:
//! - **los**: single-ray angle-envelope occlusion test (nearest and
//!   bilinear terrain sampling)
//! - **window**: distance/azimuth/elevation-angle pruning
//! - **sweep**: one observer against the whole grid
//! - **inverse**: many targets swept reciprocally in parallel, reduced
//!   into grid-wide observer/target statistics
//! - **rank**: best-observer selection from an accumulated result

pub mod inverse;
pub mod los;
pub mod rank;
pub mod sweep;
pub mod window;

pub use inverse::{inverse_visibility, InverseParams, TargetSet, VisibilityResult};
pub use los::{is_visible, Interpolation};
pub use rank::best_observers;
pub use sweep::{viewshed, ViewshedParams};
pub use window::{ResolvedWindow, SightWindow};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::inverse::{inverse_visibility, InverseParams, TargetSet, VisibilityResult};
    pub use crate::los::{is_visible, Interpolation};
    pub use crate::rank::best_observers;
    pub use crate::sweep::{viewshed, ViewshedParams};
    pub use crate::window::SightWindow;
    pub use aethergis_core::prelude::*;
}
