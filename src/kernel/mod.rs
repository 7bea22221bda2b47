//! Correlation kernel implementations.

use crate::ImageView;

/// Best placement found by a scan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// X coordinate (column) of the template's top-left corner.
    pub x: usize,
    /// Y coordinate (row) of the template's top-left corner.
    pub y: usize,
    /// Score at this placement.
    pub score: f32,
}

/// Kernel trait for scoring and scan operations.
pub trait Kernel {
    type Plan;

    /// Computes the score at a single placement (top-left coordinates).
    ///
    /// Returns `f32::NEG_INFINITY` when the placement is invalid or the image
    /// window variance is at or below `min_var_i`.
    fn score_at(
        image: ImageView<'_, u8>,
        plan: &Self::Plan,
        x: usize,
        y: usize,
        min_var_i: f32,
    ) -> f32;

    /// Scans every valid placement and returns the highest finite score.
    ///
    /// Ties keep the first placement in row-major order. `None` when the
    /// template does not fit or every window was rejected.
    fn scan_best(image: ImageView<'_, u8>, plan: &Self::Plan, min_var_i: f32)
        -> Option<Placement>;
}

pub mod scalar;

pub use scalar::ZnccScalar;
