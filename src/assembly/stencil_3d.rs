//! The 3D element kernel.
//!
//! Unlike the 2D kernel, contributions are computed sub-cell by sub-cell: each trilinear sub-cell
//! produces an 8x8 local matrix over its corner degrees of freedom, which is then scattered into
//! the sink. This avoids recomputing the overlap of the much larger 27-point stencil for every
//! pair of degrees of freedom.
use crate::assembly::ContributionSink;
use crate::view::Layout;
use crate::Real;
use nalgebra::{Matrix3, SMatrix, Vector3};
use numeric_literals::replace_float_literals;

/// Number of metric components per quadrature point in 3D.
const NUM_COMPONENTS: usize = 6;
/// Number of vertex quadrature points of a hexahedron, equal to its number of corners.
const NUM_POINTS: usize = 8;

/// Local matrix of a trilinear sub-cell, indexed by corners `ix + 2 iy + 4 iz`.
pub type SubcellMatrix<T> = SMatrix<T, NUM_POINTS, NUM_POINTS>;

/// Reference gradients of the eight trilinear corner functions at the eight vertex quadrature
/// points, indexed by `[quadrature point][corner]`.
///
/// The gradient of corner `(ix, iy, iz)` at quadrature point `(iqx, iqy, iqz)` is
/// `(g(ix) b(iy, iqy) b(iz, iqz), b(ix, iqx) g(iy) b(iz, iqz), b(ix, iqx) b(iy, iqy) g(iz))` where
/// `g(0) = -1, g(1) = 1` and `b(i, q)` is one if `i == q` and zero otherwise.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn corner_gradients<T: Real>() -> [[Vector3<T>; NUM_POINTS]; NUM_POINTS] {
    let g = |i: usize| if i == 0 { -1.0 } else { 1.0 };
    let b = |i: usize, q: usize| if i == q { 1.0 } else { 0.0 };
    let split = |n: usize| (n % 2, (n / 2) % 2, n / 4);

    let mut gradients = [[Vector3::zeros(); NUM_POINTS]; NUM_POINTS];
    for (iq, point_gradients) in gradients.iter_mut().enumerate() {
        let (iqx, iqy, iqz) = split(iq);
        for (corner, gradient) in point_gradients.iter_mut().enumerate() {
            let (ix, iy, iz) = split(corner);
            *gradient = Vector3::new(
                g(ix) * b(iy, iqy) * b(iz, iqz),
                b(ix, iqx) * g(iy) * b(iz, iqz),
                b(ix, iqx) * b(iy, iqy) * g(iz),
            );
        }
    }
    gradients
}

/// Builds the local matrix of a single sub-cell from its metric terms, stored as
/// `[component, quadrature point]`.
pub fn assemble_subcell_matrix<T: Real>(
    subcell_metric: &[T],
    gradients: &[[Vector3<T>; NUM_POINTS]; NUM_POINTS],
    local_matrix: &mut SubcellMatrix<T>,
) {
    debug_assert_eq!(subcell_metric.len(), NUM_COMPONENTS * NUM_POINTS);
    local_matrix.fill(T::zero());
    for (m, point_gradients) in subcell_metric.chunks_exact(NUM_COMPONENTS).zip(gradients) {
        #[rustfmt::skip]
        let metric = Matrix3::new(
            m[0], m[1], m[2],
            m[1], m[3], m[4],
            m[2], m[4], m[5],
        );
        for (jj_loc, g_j) in point_gradients.iter().enumerate() {
            let metric_g_j = metric * g_j;
            for (ii_loc, g_i) in point_gradients.iter().enumerate() {
                local_matrix[(ii_loc, jj_loc)] += g_i.dot(&metric_g_j);
            }
        }
    }
}

/// Computes all contributions of a single element of order `ORDER`.
///
/// `element_metric` holds the metric terms of the element's `ORDER^3` sub-cells as
/// `[component, quadrature point, offset]`, `element_dofs` the global degrees of freedom in native
/// local order and `lexicographic` the map from lexicographic to native local indices.
pub fn assemble_element_3d<T, S, const ORDER: usize>(
    element_metric: &[T],
    element_dofs: &[usize],
    lexicographic: &[usize],
    sink: &mut S,
) where
    T: Real,
    S: ContributionSink<T>,
{
    let nd1d = ORDER + 1;
    let layout = Layout::first_index_fastest([NUM_COMPONENTS * NUM_POINTS, ORDER, ORDER, ORDER]);
    debug_assert_eq!(element_metric.len(), layout.len());
    debug_assert_eq!(lexicographic.len(), nd1d * nd1d * nd1d);

    let gradients = corner_gradients::<T>();
    let mut local_matrix = SubcellMatrix::zeros();
    let mut corner_dofs = [0; NUM_POINTS];

    for kz in 0..ORDER {
        for ky in 0..ORDER {
            for kx in 0..ORDER {
                let begin = layout.offset([0, kx, ky, kz]);
                let subcell_metric = &element_metric[begin..begin + NUM_COMPONENTS * NUM_POINTS];
                assemble_subcell_matrix(subcell_metric, &gradients, &mut local_matrix);

                for (corner, dof) in corner_dofs.iter_mut().enumerate() {
                    let (ix, iy, iz) = (corner % 2, (corner / 2) % 2, corner / 4);
                    let lex = (ix + kx) + (iy + ky) * nd1d + (iz + kz) * nd1d * nd1d;
                    *dof = element_dofs[lexicographic[lex]];
                }

                for (jj_loc, &jj) in corner_dofs.iter().enumerate() {
                    for (ii_loc, &ii) in corner_dofs.iter().enumerate() {
                        sink.add(ii, jj, local_matrix[(ii_loc, jj_loc)]);
                    }
                }
            }
        }
    }
}
