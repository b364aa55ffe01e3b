//! Test helpers shared by the integration tests and benchmarks.
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeSet;

/// Vertices of the reference cell `[0, 1]^d`, counter-clockwise in 2D, bottom face then top face
/// in 3D.
fn reference_vertices(dim: usize) -> Vec<DVector<f64>> {
    let square = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
    match dim {
        2 => square.iter().map(|v| DVector::from_row_slice(v)).collect(),
        3 => [0.0, 1.0]
            .iter()
            .flat_map(|&z| square.iter().map(move |v| DVector::from_row_slice(&[v[0], v[1], z])))
            .collect(),
        _ => panic!("Unsupported dimension {}", dim),
    }
}

/// Gradient of the multilinear basis function that is one at `vertex` and zero at the other
/// reference vertices.
fn multilinear_gradient(vertex: &DVector<f64>, xi: &DVector<f64>) -> DVector<f64> {
    let dim = xi.len();
    let phi_1d = |v: f64, x: f64| if v == 0.0 { 1.0 - x } else { x };
    let dphi_1d = |v: f64| if v == 0.0 { -1.0 } else { 1.0 };
    DVector::from_fn(dim, |d, _| {
        (0..dim)
            .map(|a| if a == d { dphi_1d(vertex[a]) } else { phi_1d(vertex[a], xi[a]) })
            .product()
    })
}

/// Stiffness matrix of a single bilinear/trilinear cell integrated with the vertex quadrature
/// rule, computed from the explicit inverse of the Jacobian.
///
/// `vertices` holds the cell vertices as `[x0, y0, (z0,) x1, ...]` in reference vertex order.
pub fn reference_cell_stiffness(dim: usize, vertices: &[f64]) -> DMatrix<f64> {
    let reference = reference_vertices(dim);
    let n = reference.len();
    assert_eq!(vertices.len(), dim * n);
    let weight = 1.0 / n as f64;
    let x = DMatrix::from_column_slice(dim, n, vertices);

    let mut stiffness = DMatrix::zeros(n, n);
    // The quadrature points are the reference vertices themselves
    for xi in &reference {
        let g = DMatrix::from_fn(dim, n, |d, v| multilinear_gradient(&reference[v], xi)[d]);
        let j = &x * g.transpose();
        let det = j.determinant();
        let j_inv = j.try_inverse().expect("Reference cells must be non-degenerate");
        let physical_gradients = j_inv.transpose() * &g;
        stiffness += physical_gradients.transpose() * physical_gradients * (weight * det);
    }
    stiffness
}

/// Dense stiffness matrix of a collection of cells, given by their vertex coordinates and the
/// global indices of their vertices.
pub fn dense_reference_stiffness<I>(dim: usize, num_dofs: usize, cells: I) -> DMatrix<f64>
where
    I: IntoIterator<Item = (Vec<f64>, Vec<usize>)>,
{
    let mut matrix = DMatrix::zeros(num_dofs, num_dofs);
    for (vertices, indices) in cells {
        let local = reference_cell_stiffness(dim, &vertices);
        for (i_local, &i) in indices.iter().enumerate() {
            for (j_local, &j) in indices.iter().enumerate() {
                matrix[(i, j)] += local[(i_local, j_local)];
            }
        }
    }
    matrix
}

/// The `(row, column)` pairs of all stored entries.
pub fn sparsity_pattern<T>(matrix: &CsrMatrix<T>) -> BTreeSet<(usize, usize)> {
    matrix
        .triplet_iter()
        .map(|(i, j, _)| (i, j))
        .collect()
}

pub fn max_abs_row_sum(matrix: &CsrMatrix<f64>) -> f64 {
    matrix
        .row_iter()
        .map(|row| row.values().iter().sum::<f64>().abs())
        .fold(0.0, f64::max)
}

/// Largest absolute difference between `A` and `A^T` over all stored entries.
pub fn max_asymmetry(matrix: &CsrMatrix<f64>) -> f64 {
    matrix
        .triplet_iter()
        .map(|(i, j, &v)| {
            let transposed = matrix
                .get_entry(j, i)
                .map(|entry| entry.into_value())
                .unwrap_or(0.0);
            (v - transposed).abs()
        })
        .fold(0.0, f64::max)
}

/// Asserts that the matrices have the same pattern and bitwise identical values.
pub fn assert_csr_bit_identical(a: &CsrMatrix<f64>, b: &CsrMatrix<f64>) {
    assert_eq!(a.nrows(), b.nrows());
    assert_eq!(a.ncols(), b.ncols());
    assert_eq!(a.row_offsets(), b.row_offsets());
    assert_eq!(a.col_indices(), b.col_indices());
    let bits = |m: &CsrMatrix<f64>| m.values().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(a), bits(b));
}
