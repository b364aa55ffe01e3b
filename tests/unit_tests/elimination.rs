use fenris_lor::assembly::global::{eliminate_rows_and_columns_csr, LorMatrixBuilder};
use fenris_lor::procedural::{LorHexMesh, LorQuadMesh};
use fenris_lor::{assemble_lor, LorAssemblyOptions};
use nalgebra::{DMatrix, Vector2};
use nalgebra_sparse::CsrMatrix;
use util::{assert_csr_bit_identical, sparsity_pattern};

fn check_elimination(original: &CsrMatrix<f64>, eliminated: &CsrMatrix<f64>, essential: &[usize]) {
    assert_eq!(sparsity_pattern(original), sparsity_pattern(eliminated));
    for ((i, j, &before), (_, _, &after)) in original.triplet_iter().zip(eliminated.triplet_iter()) {
        let touched = essential.contains(&i) || essential.contains(&j);
        if i == j || !touched {
            assert_eq!(after, before, "entry ({}, {}) must be preserved", i, j);
        } else {
            assert_eq!(after, 0.0, "entry ({}, {}) must be zeroed", i, j);
        }
    }
}

#[test]
fn boundary_elimination_keeps_diagonal_and_interior_block() {
    let mut mesh = LorQuadMesh::<f64>::unit_elements([2, 2], 2).unwrap();
    mesh.perturb_vertex(mesh.node_index([2, 2]), &Vector2::new(0.1, -0.1));
    let essential = mesh.boundary_dofs();
    let options = LorAssemblyOptions::default();

    let original = assemble_lor(&mesh, &mesh, &[], &options).unwrap();
    let eliminated = assemble_lor(&mesh, &mesh, &essential, &options).unwrap();
    check_elimination(&original, &eliminated, &essential);
}

#[test]
fn elimination_is_idempotent() {
    let mesh = LorHexMesh::<f64>::unit_elements([2, 1, 1], 2).unwrap();
    let essential = mesh.boundary_dofs();
    let once = assemble_lor(&mesh, &mesh, &essential, &LorAssemblyOptions::default()).unwrap();
    let mut twice = once.clone();
    eliminate_rows_and_columns_csr(&mut twice, &essential);
    assert_csr_bit_identical(&once, &twice);
}

#[test]
fn out_of_range_essential_dofs_are_ignored() {
    let mut builder = LorMatrixBuilder::new(3, 3);
    let local = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
    builder.add_local_matrix(&[0, 1], &local);
    builder.add_local_matrix(&[1, 2], &local);
    let original = builder.clone().finalize(&[]);
    let eliminated = builder.finalize(&[2, 7]);
    check_elimination(&original, &eliminated, &[2]);

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 3, &[
         1.0, -1.0, 0.0,
        -1.0,  2.0, 0.0,
         0.0,  0.0, 1.0,
    ]);
    assert_eq!(DMatrix::from(&eliminated), expected);
}

#[test]
fn elimination_handles_nonsymmetric_patterns() {
    // Only (0, 1) is stored, not (1, 0)
    let mut builder = LorMatrixBuilder::new(2, 2);
    builder.add(0, 0, 2.0);
    builder.add(0, 1, -1.0);
    builder.add(1, 1, 3.0);
    let eliminated = builder.finalize(&[1]);
    assert_eq!(eliminated.get_entry(0, 1).unwrap().into_value(), 0.0);
    assert_eq!(eliminated.get_entry(1, 1).unwrap().into_value(), 3.0);
    assert_eq!(eliminated.get_entry(0, 0).unwrap().into_value(), 2.0);
}
