//! Assembly of the LOR operator.
//!
//! The element kernels in [`stencil_2d`] and [`stencil_3d`] turn the metric terms of one
//! high-order element into `(row, column, value)` contributions, which are fed into a
//! [`ContributionSink`]. The sink is either the global [`LorMatrixBuilder`](global::LorMatrixBuilder)
//! itself or a per-element triplet buffer when elements are processed in parallel.
use crate::Real;
use numeric_literals::replace_float_literals;

pub mod dispatch;
pub mod global;
pub mod stencil_2d;
pub mod stencil_3d;

/// Receives scalar contributions keyed by global row and column indices.
///
/// Contributions to the same entry must be summed.
pub trait ContributionSink<T> {
    fn add(&mut self, row: usize, col: usize, value: T);
}

impl<T> ContributionSink<T> for Vec<(usize, usize, T)> {
    #[inline(always)]
    fn add(&mut self, row: usize, col: usize, value: T) {
        self.push((row, col, value));
    }
}

/// Value and derivative of the 1D piecewise linear hat function of a node, evaluated at the
/// vertices of the two cells adjacent to the node.
///
/// Along one axis, the four candidate evaluation points around node `i` are
///
/// ```text
/// 0-----1 i 2-----3
/// ```
///
/// where points 0 and 1 are the vertices of the cell to the left of the node, and 2 and 3 the
/// vertices of the cell to the right. Entry `(k + 1 - i) * 2 + q` corresponds to 1D quadrature
/// point `q` of cell `k`. The derivative is taken with respect to the cell's own reference
/// coordinate in `[0, 1]`.
#[derive(Debug, Copy, Clone)]
pub struct HatTable<T> {
    values: [T; 4],
    derivatives: [T; 4],
}

impl<T: Real> HatTable<T> {
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn new() -> Self {
        Self {
            values: [0.0, 1.0, 1.0, 0.0],
            derivatives: [1.0, 1.0, -1.0, -1.0],
        }
    }

    /// Value and derivative of the hat function of node `node` at 1D quadrature point `q` of the
    /// adjacent cell `cell`.
    #[inline(always)]
    pub fn evaluate(&self, node: usize, cell: usize, q: usize) -> (T, T) {
        debug_assert!(cell + 1 >= node && cell <= node, "Cell {} is not adjacent to node {}", cell, node);
        let offset = (cell + 1 - node) * 2 + q;
        (self.values[offset], self.derivatives[offset])
    }
}

impl<T: Real> Default for HatTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The range of cells adjacent to both of the 1D nodes `i` and `j`, among `order` cells.
///
/// Empty if the nodes are more than one cell apart.
#[inline(always)]
pub fn shared_cells(i: usize, j: usize, order: usize) -> std::ops::Range<usize> {
    let begin = i.saturating_sub(1).max(j.saturating_sub(1));
    let end = i.min(order - 1).min(j) + 1;
    begin..end.max(begin)
}
