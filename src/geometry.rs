//! Jacobians of the refined sub-cells and their reduction to metric terms.
//!
//! For the bilinear form $\int_K \nabla \phi_i \cdot \nabla \phi_j \, dx$ on a sub-cell with
//! reference map Jacobian $J$, the contribution of a quadrature point with weight $w$ and reference
//! gradients $g_i, g_j$ is
//!
//! $$ w \, g_i^T \frac{\mathrm{adj}(J)\, \mathrm{adj}(J)^T}{\det J} g_j, $$
//!
//! since $J^{-1} = \mathrm{adj}(J) / \det J$. The symmetric tensor in the middle is what we call
//! the *metric*, and only its $d (d + 1) / 2$ independent entries are stored.
use crate::assembly::dispatch::{LorAssemblyOptions, PlanarJacobianSource};
use crate::error::{GeometryError, LorError, Result};
use crate::quadrature::{vertex_rule_2d, vertex_rule_3d};
use crate::space::LorRefinement;
use crate::view::{Layout, MetricArray};
use crate::{Dimension, Real};
use itertools::izip;
use log::{debug, warn};
use nalgebra::{convert, Matrix2, Matrix2x4, Matrix3, OMatrix, Point2, Point3, U3, U8};
use numeric_literals::replace_float_literals;
use rayon::prelude::*;

/// Reference coordinates of the vertices of the unit square, counter-clockwise.
const QUAD_VERTICES: [[usize; 2]; 4] = [[0, 0], [1, 0], [1, 1], [0, 1]];

/// Reference coordinates of the vertices of the unit cube, bottom face then top face. The first
/// four entries restricted to two coordinates are the vertices of the unit square.
pub(crate) const HEX_VERTICES: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// The linear 1D shape function which is one at `node` (0 or 1) and zero at the other node.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn phi_linear_1d<T: Real>(node: usize, x: T) -> T {
    if node == 0 {
        1.0 - x
    } else {
        x
    }
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn phi_linear_1d_grad<T: Real>(node: usize) -> T {
    if node == 0 {
        -1.0
    } else {
        1.0
    }
}

/// Reference gradients of the bilinear basis on `[0, 1]^2`, one column per vertex.
pub fn quad4_reference_gradients<T: Real>(xi: &Point2<T>) -> Matrix2x4<T> {
    Matrix2x4::from_fn(|i, v| {
        let [a, b] = QUAD_VERTICES[v];
        match i {
            0 => phi_linear_1d_grad::<T>(a) * phi_linear_1d(b, xi.y),
            _ => phi_linear_1d(a, xi.x) * phi_linear_1d_grad::<T>(b),
        }
    })
}

/// Reference gradients of the trilinear basis on `[0, 1]^3`, one column per vertex.
pub fn hex8_reference_gradients<T: Real>(xi: &Point3<T>) -> OMatrix<T, U3, U8> {
    OMatrix::<T, U3, U8>::from_fn(|i, v| {
        let [a, b, c] = HEX_VERTICES[v];
        let (gx, gy, gz) = (
            phi_linear_1d_grad::<T>(a),
            phi_linear_1d_grad::<T>(b),
            phi_linear_1d_grad::<T>(c),
        );
        let (px, py, pz) = (
            phi_linear_1d(a, xi.x),
            phi_linear_1d(b, xi.y),
            phi_linear_1d(c, xi.z),
        );
        match i {
            0 => gx * py * pz,
            1 => px * gy * pz,
            _ => px * py * gz,
        }
    })
}

/// Closed-form Jacobian of the bilinear map of a quadrilateral with the given vertices
/// (`[x0, y0, x1, y1, ...]`, counter-clockwise) at the reference point `xi`.
#[allow(non_snake_case)]
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn quad_jacobian_from_vertices<T: Real>(vertices: &[T], xi: &Point2<T>) -> Matrix2<T> {
    assert_eq!(vertices.len(), 8, "Quadrilateral must have four 2D vertices");
    let (x, y) = (xi.x, xi.y);
    let v = |i: usize, c: usize| vertices[2 * i + c];

    let J = |c| {
        let d_dx = -(1.0 - y) * v(0, c) + (1.0 - y) * v(1, c) + y * v(2, c) - y * v(3, c);
        let d_dy = -(1.0 - x) * v(0, c) - x * v(1, c) + x * v(2, c) + (1.0 - x) * v(3, c);
        (d_dx, d_dy)
    };
    let (J11, J12) = J(0);
    let (J21, J22) = J(1);
    Matrix2::new(J11, J12, J21, J22)
}

/// Closed-form Jacobian of the trilinear map of a (possibly non-affine) hexahedron with the given
/// vertices (`[x0, y0, z0, x1, ...]`) at the reference point `xi`.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn hex_jacobian_from_vertices<T: Real>(vertices: &[T], xi: &Point3<T>) -> Matrix3<T> {
    assert_eq!(vertices.len(), 24, "Hexahedron must have eight 3D vertices");
    let (x, y, z) = (xi.x, xi.y, xi.z);
    let (xm, ym, zm) = (1.0 - x, 1.0 - y, 1.0 - z);

    // Derivatives of the trilinear shape functions with respect to each reference coordinate
    let d_dx = [-ym * zm, ym * zm, y * zm, -y * zm, -ym * z, ym * z, y * z, -y * z];
    let d_dy = [-xm * zm, -x * zm, x * zm, xm * zm, -xm * z, -x * z, x * z, xm * z];
    let d_dz = [-xm * ym, -x * ym, -x * y, -xm * y, xm * ym, x * ym, x * y, xm * y];

    Matrix3::from_fn(|c, d| {
        let weights = match d {
            0 => &d_dx,
            1 => &d_dy,
            _ => &d_dz,
        };
        weights
            .iter()
            .enumerate()
            .fold(0.0, |acc, (i, &w)| acc + w * vertices[3 * i + c])
    })
}

/// Reduces a 2x2 Jacobian to the metric entries `[xx, xy, yy]`.
///
/// Returns the determinant as error if it is not positive.
#[allow(non_snake_case)]
pub fn planar_metric<T: Real>(j: &Matrix2<T>, weight: T) -> std::result::Result<[T; 3], T> {
    let (J11, J12, J21, J22) = (j[(0, 0)], j[(0, 1)], j[(1, 0)], j[(1, 1)]);
    let det = J11 * J22 - J21 * J12;
    if !(det > T::zero()) {
        return Err(det);
    }
    let w_det = weight / det;
    Ok([
        w_det * (J12 * J12 + J22 * J22),
        -w_det * (J12 * J11 + J22 * J21),
        w_det * (J11 * J11 + J21 * J21),
    ])
}

/// Reduces a 3x3 Jacobian to the metric entries `[xx, xy, xz, yy, yz, zz]`.
///
/// Returns the determinant as error if it is not positive.
#[allow(non_snake_case)]
pub fn hexahedral_metric<T: Real>(j: &Matrix3<T>, weight: T) -> std::result::Result<[T; 6], T> {
    let J = |r: usize, c: usize| j[(r - 1, c - 1)];
    let det = J(1, 1) * (J(2, 2) * J(3, 3) - J(3, 2) * J(2, 3)) - J(2, 1) * (J(1, 2) * J(3, 3) - J(3, 2) * J(1, 3))
        + J(3, 1) * (J(1, 2) * J(2, 3) - J(2, 2) * J(1, 3));
    if !(det > T::zero()) {
        return Err(det);
    }

    let adj = Matrix3::new(
        J(2, 2) * J(3, 3) - J(2, 3) * J(3, 2),
        J(3, 2) * J(1, 3) - J(1, 2) * J(3, 3),
        J(1, 2) * J(2, 3) - J(2, 2) * J(1, 3),
        J(3, 1) * J(2, 3) - J(2, 1) * J(3, 3),
        J(1, 1) * J(3, 3) - J(1, 3) * J(3, 1),
        J(2, 1) * J(1, 3) - J(1, 1) * J(2, 3),
        J(2, 1) * J(3, 2) - J(3, 1) * J(2, 2),
        J(3, 1) * J(1, 2) - J(1, 1) * J(3, 2),
        J(1, 1) * J(2, 2) - J(1, 2) * J(2, 1),
    );
    let m = (adj * adj.transpose()) * (weight / det);
    Ok([m[(0, 0)], m[(0, 1)], m[(0, 2)], m[(1, 1)], m[(1, 2)], m[(2, 2)]])
}

/// Sub-cell Jacobians at the vertex quadrature points, addressed by
/// `[quadrature point, row, column, sub-cell]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometricFactors<T> {
    layout: Layout<4>,
    jacobians: Vec<T>,
}

impl<T: Real> GeometricFactors<T> {
    /// Computes the Jacobians of every sub-cell of the refinement as `X G^T`, where `X` holds the
    /// vertex coordinates and `G` the reference gradients of the bilinear/trilinear basis.
    #[allow(non_snake_case)]
    pub fn from_vertices(refinement: &(impl LorRefinement<T> + ?Sized)) -> Result<Self> {
        let dim = LorError::check_dimension(refinement.dim())?;
        let d = dim.value();
        let num_subcells = refinement.num_subcells();
        let nq = dim.num_cell_vertices();
        let layout = Layout::first_index_fastest([nq, d, d, num_subcells]);
        let mut jacobians = vec![T::zero(); layout.len()];
        let mut vertices = vec![T::zero(); d * nq];

        for s in 0..num_subcells {
            if !refinement.subcell_geometry(s).matches(dim) {
                return Err(LorError::UnsupportedGeometry { subcell: s });
            }
            refinement.populate_subcell_vertices(s, &mut vertices);
            match dim {
                Dimension::Two => {
                    let X = Matrix2x4::from_fn(|i, v| vertices[2 * v + i]);
                    for (q, xi) in vertex_rule_2d::<T>().1.iter().enumerate() {
                        let J = X * quad4_reference_gradients(xi).transpose();
                        for (r, c) in itertools::iproduct!(0..2, 0..2) {
                            jacobians[layout.offset([q, r, c, s])] = J[(r, c)];
                        }
                    }
                }
                Dimension::Three => {
                    let X = OMatrix::<T, U3, U8>::from_fn(|i, v| vertices[3 * v + i]);
                    for (q, xi) in vertex_rule_3d::<T>().1.iter().enumerate() {
                        let J = X * hex8_reference_gradients(xi).transpose();
                        for (r, c) in itertools::iproduct!(0..3, 0..3) {
                            jacobians[layout.offset([q, r, c, s])] = J[(r, c)];
                        }
                    }
                }
            }
        }

        Ok(Self { layout, jacobians })
    }

    /// Constructs geometric factors from Jacobians laid out as `[quadrature point, row, column, sub-cell]`.
    pub fn from_jacobians(dim: usize, num_subcells: usize, jacobians: Vec<T>) -> Result<Self> {
        let dim = LorError::check_dimension(dim)?;
        let d = dim.value();
        let layout = Layout::first_index_fastest([dim.num_cell_vertices(), d, d, num_subcells]);
        LorError::check_size("number of Jacobian entries", layout.len(), jacobians.len())?;
        Ok(Self { layout, jacobians })
    }

    pub fn num_subcells(&self) -> usize {
        self.layout.shape()[3]
    }

    pub fn dim(&self) -> usize {
        self.layout.shape()[1]
    }

    pub fn num_quadrature_points(&self) -> usize {
        self.layout.shape()[0]
    }

    pub fn jacobian_2d(&self, subcell: usize, quadrature_point: usize) -> Matrix2<T> {
        debug_assert_eq!(self.dim(), 2);
        Matrix2::from_fn(|r, c| self.jacobians[self.layout.offset([quadrature_point, r, c, subcell])])
    }

    pub fn jacobian_3d(&self, subcell: usize, quadrature_point: usize) -> Matrix3<T> {
        debug_assert_eq!(self.dim(), 3);
        Matrix3::from_fn(|r, c| self.jacobians[self.layout.offset([quadrature_point, r, c, subcell])])
    }
}

/// For every `(parent, offset)` slot, the index of the sub-cell embedded there.
///
/// Fails unless the embeddings describe exactly one sub-cell per slot.
pub fn invert_embeddings<T: Real>(
    refinement: &(impl LorRefinement<T> + ?Sized),
    dim: Dimension,
    order: usize,
    num_elements: usize,
) -> Result<Vec<usize>> {
    let subcells_per_element = dim.num_subcells(order);
    LorError::check_size(
        "number of sub-cells",
        num_elements * subcells_per_element,
        refinement.num_subcells(),
    )?;

    let mut slot_to_subcell = vec![usize::MAX; num_elements * subcells_per_element];
    for s in 0..refinement.num_subcells() {
        if !refinement.subcell_geometry(s).matches(dim) {
            return Err(LorError::UnsupportedGeometry { subcell: s });
        }
        let embedding = refinement.subcell_embedding(s);
        if embedding.parent >= num_elements {
            return Err(LorError::InvalidEmbedding {
                subcell: s,
                reason: "parent element index out of bounds",
            });
        }
        if embedding.offset >= subcells_per_element {
            return Err(LorError::InvalidEmbedding {
                subcell: s,
                reason: "sub-cell offset out of bounds",
            });
        }
        let slot = &mut slot_to_subcell[embedding.offset + subcells_per_element * embedding.parent];
        if *slot != usize::MAX {
            return Err(LorError::InvalidEmbedding {
                subcell: s,
                reason: "another sub-cell occupies the same offset",
            });
        }
        *slot = s;
    }

    // The counts match and there are no duplicates, so every slot must be occupied
    debug_assert!(slot_to_subcell.iter().all(|&s| s != usize::MAX));
    Ok(slot_to_subcell)
}

fn non_positive_determinant<T: Real>(
    parent: usize,
    subcell: usize,
    quadrature_point: usize,
    determinant: T,
) -> LorError {
    LorError::Geometry(GeometryError::NonPositiveDeterminant {
        parent,
        subcell,
        quadrature_point,
        determinant: determinant.to_subset().unwrap_or(f64::NAN),
    })
}

fn check_jacobians_agree<T: Real>(
    canonical: &Matrix2<T>,
    other: &Matrix2<T>,
    tolerance: f64,
    subcell: usize,
    quadrature_point: usize,
) -> Result<()> {
    let tol: T = convert(tolerance);
    if (canonical - other).norm() <= tol * canonical.norm() {
        Ok(())
    } else {
        Err(LorError::JacobianMismatch {
            subcell,
            quadrature_point,
        })
    }
}

/// Evaluates the metric terms of every sub-cell at every vertex quadrature point.
///
/// Sub-cells are visited through the embeddings, and the result is addressed by
/// `[component, quadrature point, offset, parent]`. Any non-positive Jacobian determinant aborts
/// the evaluation.
pub fn evaluate_metric<T, R>(
    refinement: &R,
    order: usize,
    num_elements: usize,
    options: &LorAssemblyOptions,
) -> Result<MetricArray<T>>
where
    T: Real,
    R: LorRefinement<T> + Sync + ?Sized,
{
    let dim = LorError::check_dimension(refinement.dim())?;
    let slot_to_subcell = invert_embeddings(refinement, dim, order, num_elements)?;
    let subcells_per_element = dim.num_subcells(order);
    let nq = dim.num_cell_vertices();
    let ncomp = dim.num_metric_components();

    // Only planar meshes read precomputed Jacobians; hexahedra may be non-affine
    let computed_factors;
    let planar_factors = match (dim, options.planar_jacobians) {
        (Dimension::Two, PlanarJacobianSource::GeometricFactors) => match refinement.geometric_factors() {
            Some(factors) => {
                LorError::check_size("geometric factor dimension", 2, factors.dim())?;
                LorError::check_size("geometric factor sub-cells", refinement.num_subcells(), factors.num_subcells())?;
                Some(factors)
            }
            None => {
                computed_factors = GeometricFactors::from_vertices(refinement)?;
                Some(&computed_factors)
            }
        },
        _ => None,
    };
    if options.verify_planar_jacobians.is_some() && planar_factors.is_none() {
        warn!(
            "Jacobian verification has no effect for {} meshes with Jacobians taken from the vertices",
            dim
        );
    }

    debug!(
        "Evaluating {} LOR metric terms for {} sub-cells ({} elements of order {})",
        dim,
        refinement.num_subcells(),
        num_elements,
        order
    );

    let mut metric = MetricArray::zeros(ncomp, nq, subcells_per_element, num_elements);
    let stride = metric.subcell_stride();

    let evaluate_subcell = |slot: usize, chunk: &mut [T]| -> Result<()> {
        let s = slot_to_subcell[slot];
        let parent = slot / subcells_per_element;
        let mut vertices = [T::zero(); 24];
        let vertices = &mut vertices[..dim.value() * nq];
        refinement.populate_subcell_vertices(s, vertices);

        match dim {
            Dimension::Two => {
                let (weights, points) = vertex_rule_2d::<T>();
                for (q, (w, xi), entries) in izip!(0.., weights.iter().zip(&points), chunk.chunks_exact_mut(ncomp)) {
                    let j = match planar_factors {
                        Some(factors) => {
                            let j = factors.jacobian_2d(s, q);
                            if let Some(tolerance) = options.verify_planar_jacobians {
                                let from_vertices = quad_jacobian_from_vertices(vertices, xi);
                                check_jacobians_agree(&j, &from_vertices, tolerance, s, q)?;
                            }
                            j
                        }
                        None => quad_jacobian_from_vertices(vertices, xi),
                    };
                    let m = planar_metric(&j, *w).map_err(|det| non_positive_determinant(parent, s, q, det))?;
                    entries.copy_from_slice(&m);
                }
            }
            Dimension::Three => {
                let (weights, points) = vertex_rule_3d::<T>();
                for (q, (w, xi), entries) in izip!(0.., weights.iter().zip(&points), chunk.chunks_exact_mut(ncomp)) {
                    let j = hex_jacobian_from_vertices(vertices, xi);
                    let m = hexahedral_metric(&j, *w).map_err(|det| non_positive_determinant(parent, s, q, det))?;
                    entries.copy_from_slice(&m);
                }
            }
        }
        Ok(())
    };

    let chunks = metric.as_mut_slice();
    if options.parallel {
        // Report the first failing slot, as in serial evaluation
        let first_failure = chunks
            .par_chunks_mut(stride)
            .enumerate()
            .with_min_len(64)
            .filter_map(|(slot, chunk)| evaluate_subcell(slot, chunk).err().map(|err| (slot, err)))
            .min_by_key(|(slot, _)| *slot);
        if let Some((_, err)) = first_failure {
            return Err(err);
        }
    } else {
        chunks
            .chunks_mut(stride)
            .enumerate()
            .try_for_each(|(slot, chunk)| evaluate_subcell(slot, chunk))?;
    }

    Ok(metric)
}
