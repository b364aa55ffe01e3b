//! The 2D element kernel.
//!
//! Contributions are computed pair by pair: for every local degree of freedom and every neighbour
//! within one index step along each axis, the bilinear form is summed over the sub-cells and
//! quadrature points shared by the two hat functions and added as a single scalar.
use crate::assembly::{shared_cells, ContributionSink, HatTable};
use crate::quadrature::POINTS_PER_AXIS;
use crate::view::Layout;
use crate::Real;

/// Number of metric components per quadrature point in 2D.
const NUM_COMPONENTS: usize = 3;
/// Number of vertex quadrature points of a quadrilateral.
const NUM_POINTS: usize = 4;

/// The neighbours `i - 1, i, i + 1` of the 1D node `i` that exist among `num_nodes` nodes.
#[inline(always)]
pub(crate) fn neighbours(i: usize, num_nodes: usize) -> std::ops::RangeInclusive<usize> {
    i.saturating_sub(1)..=(i + 1).min(num_nodes - 1)
}

/// Computes all contributions of a single element of order `ORDER`.
///
/// `element_metric` holds the metric terms of the element's `ORDER^2` sub-cells as
/// `[component, quadrature point, offset]`, `element_dofs` the global degrees of freedom in native
/// local order and `lexicographic` the map from lexicographic to native local indices.
pub fn assemble_element_2d<T, S, const ORDER: usize>(
    element_metric: &[T],
    element_dofs: &[usize],
    lexicographic: &[usize],
    sink: &mut S,
) where
    T: Real,
    S: ContributionSink<T>,
{
    let nd1d = ORDER + 1;
    let layout = Layout::first_index_fastest([NUM_COMPONENTS, NUM_POINTS, ORDER * ORDER]);
    debug_assert_eq!(element_metric.len(), layout.len());
    debug_assert_eq!(lexicographic.len(), nd1d * nd1d);
    let metric = |c: usize, q: usize, k: usize| element_metric[layout.offset([c, q, k])];
    let global_dof = |x: usize, y: usize| element_dofs[lexicographic[x + y * nd1d]];
    let hat = HatTable::<T>::new();

    for iy in 0..nd1d {
        for ix in 0..nd1d {
            let ii = global_dof(ix, iy);
            for jx in neighbours(ix, nd1d) {
                let kx_range = shared_cells(ix, jx, ORDER);
                for jy in neighbours(iy, nd1d) {
                    let ky_range = shared_cells(iy, jy, ORDER);
                    let jj = global_dof(jx, jy);

                    let mut val = T::zero();
                    for ky in ky_range.clone() {
                        for kx in kx_range.clone() {
                            let k = kx + ky * ORDER;
                            for iqy in 0..POINTS_PER_AXIS {
                                for iqx in 0..POINTS_PER_AXIS {
                                    let iq = iqx + iqy * POINTS_PER_AXIS;
                                    let (vx_i, dx_i) = hat.evaluate(ix, kx, iqx);
                                    let (vy_i, dy_i) = hat.evaluate(iy, ky, iqy);
                                    let (vx_j, dx_j) = hat.evaluate(jx, kx, iqx);
                                    let (vy_j, dy_j) = hat.evaluate(jy, ky, iqy);

                                    let (gx_i, gy_i) = (dx_i * vy_i, vx_i * dy_i);
                                    let (gx_j, gy_j) = (dx_j * vy_j, vx_j * dy_j);

                                    val += gx_i * gx_j * metric(0, iq, k);
                                    val += (gy_i * gx_j + gx_i * gy_j) * metric(1, iq, k);
                                    val += gy_i * gy_j * metric(2, iq, k);
                                }
                            }
                        }
                    }
                    sink.add(ii, jj, val);
                }
            }
        }
    }
}
