use crate::assemble_dense;
use fenris_lor::geometry::GeometricFactors;
use fenris_lor::procedural::{LorHexMesh, LorQuadMesh};
use fenris_lor::space::{BasisFamily, Embedding, HighOrderSpace, LorRefinement, SubcellGeometry};
use fenris_lor::{assemble_lor, GeometryError, LorAssemblyOptions, LorError, PlanarJacobianSource};
use matrixcompare::assert_matrix_eq;
use nalgebra::{Matrix2, Vector2, Vector3};
use util::assert_csr_bit_identical;

/// Delegates to a structured mesh, but reports its own dimension, degree-of-freedom count and
/// sub-cell geometry.
struct Overridden<'a> {
    mesh: &'a LorQuadMesh<f64>,
    dim: usize,
    num_dofs: usize,
    geometry: SubcellGeometry,
}

impl<'a> Overridden<'a> {
    fn new(mesh: &'a LorQuadMesh<f64>) -> Self {
        Self {
            mesh,
            dim: 2,
            num_dofs: mesh.num_dofs(),
            geometry: SubcellGeometry::Quadrilateral,
        }
    }
}

impl<'a> LorRefinement<f64> for Overridden<'a> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn num_subcells(&self) -> usize {
        self.mesh.num_subcells()
    }

    fn subcell_geometry(&self, _subcell_index: usize) -> SubcellGeometry {
        self.geometry
    }

    fn subcell_embedding(&self, subcell_index: usize) -> Embedding {
        self.mesh.subcell_embedding(subcell_index)
    }

    fn populate_subcell_vertices(&self, subcell_index: usize, output: &mut [f64]) {
        self.mesh.populate_subcell_vertices(subcell_index, output)
    }
}

impl<'a> HighOrderSpace for Overridden<'a> {
    fn dim(&self) -> usize {
        self.dim
    }

    fn num_elements(&self) -> usize {
        self.mesh.num_elements()
    }

    fn basis_family(&self) -> BasisFamily {
        self.mesh.basis_family()
    }

    fn max_order(&self) -> usize {
        self.mesh.max_order()
    }

    fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    fn element_dof_count(&self, element_index: usize) -> usize {
        self.mesh.element_dof_count(element_index)
    }

    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        self.mesh.populate_element_dofs(output, element_index)
    }

    fn lexicographic_ordering(&self) -> &[usize] {
        self.mesh.lexicographic_ordering()
    }
}

fn serial() -> LorAssemblyOptions {
    LorAssemblyOptions::default().with_parallel(false)
}

#[test]
fn serial_and_parallel_assembly_are_bit_identical() {
    let mut quad = LorQuadMesh::<f64>::unit_elements([5, 4], 3).unwrap();
    quad.perturb_vertex(quad.node_index([4, 4]), &Vector2::new(0.05, 0.03));
    let essential = quad.boundary_dofs();
    let in_parallel = assemble_lor(&quad, &quad, &essential, &LorAssemblyOptions::default()).unwrap();
    let in_serial = assemble_lor(&quad, &quad, &essential, &serial()).unwrap();
    assert_csr_bit_identical(&in_parallel, &in_serial);

    let mut hex = LorHexMesh::<f64>::unit_elements([3, 2, 2], 2).unwrap();
    hex.perturb_vertex(hex.node_index([3, 2, 1]), &Vector3::new(-0.04, 0.02, 0.06));
    let in_parallel = assemble_lor(&hex, &hex, &[], &LorAssemblyOptions::default()).unwrap();
    let in_serial = assemble_lor(&hex, &hex, &[], &serial()).unwrap();
    assert_csr_bit_identical(&in_parallel, &in_serial);
}

#[test]
fn inverted_hexahedron_is_rejected() {
    let mut mesh = LorHexMesh::<f64>::unit_elements([1, 1, 1], 1).unwrap();
    // Pull the far corner through the opposite corner
    mesh.perturb_vertex(mesh.node_index([1, 1, 1]), &Vector3::new(-2.0, -2.0, -2.0));
    for options in [serial(), LorAssemblyOptions::default()] {
        let err = assemble_lor(&mesh, &mesh, &[], &options).unwrap_err();
        match err {
            LorError::Geometry(GeometryError::NonPositiveDeterminant {
                parent,
                subcell,
                determinant,
                ..
            }) => {
                assert_eq!(parent, 0);
                assert_eq!(subcell, 0);
                assert!(determinant <= 0.0);
            }
            other => panic!("Unexpected error: {}", other),
        }
    }
}

#[test]
fn inverted_quadrilateral_is_rejected() {
    let mut mesh = LorQuadMesh::<f64>::unit_elements([2, 1], 2).unwrap();
    mesh.perturb_vertex(mesh.node_index([3, 1]), &Vector2::new(-1.0, -1.0));
    let err = assemble_lor(&mesh, &mesh, &[], &serial()).unwrap_err();
    assert!(matches!(
        err,
        LorError::Geometry(GeometryError::NonPositiveDeterminant { parent: 1, .. })
    ));
}

#[test]
fn first_inverted_subcell_is_reported_in_serial_and_parallel() {
    let mut mesh = LorQuadMesh::<f64>::unit_elements([8, 8], 2).unwrap();
    // Each displacement pulls a node past the lower left corner of the sub-cell below and left of it
    mesh.perturb_vertex(mesh.node_index([3, 3]), &Vector2::new(-1.5, -1.5));
    mesh.perturb_vertex(mesh.node_index([13, 14]), &Vector2::new(-1.5, -1.5));
    let expected = assemble_lor(&mesh, &mesh, &[], &serial()).unwrap_err();
    assert!(matches!(
        expected,
        LorError::Geometry(GeometryError::NonPositiveDeterminant { .. })
    ));
    for _ in 0..8 {
        let err = assemble_lor(&mesh, &mesh, &[], &LorAssemblyOptions::default()).unwrap_err();
        assert_eq!(err, expected);
    }
}

#[test]
fn unsupported_orders_are_rejected() {
    let mesh = LorQuadMesh::<f64>::unit_elements([1, 1], 17).unwrap();
    let err = assemble_lor(&mesh, &mesh, &[], &serial()).unwrap_err();
    assert_eq!(err, LorError::UnsupportedOrder(17));
}

#[test]
fn non_nodal_bases_are_rejected() {
    let mesh = LorQuadMesh::<f64>::unit_elements([1, 1], 2)
        .unwrap()
        .with_basis_family(BasisFamily::Other);
    let err = assemble_lor(&mesh, &mesh, &[], &serial()).unwrap_err();
    assert_eq!(err, LorError::UnsupportedBasis);
}

#[test]
fn unsupported_dimension_is_rejected() {
    let mesh = LorQuadMesh::<f64>::unit_elements([1, 1], 2).unwrap();
    let space = Overridden { dim: 1, ..Overridden::new(&mesh) };
    let err = assemble_lor(&mesh, &space, &[], &serial()).unwrap_err();
    assert_eq!(err, LorError::UnsupportedDimension(1));
}

#[test]
fn refinement_and_space_dimensions_must_agree() {
    let quad = LorQuadMesh::<f64>::unit_elements([1, 1], 1).unwrap();
    let hex = LorHexMesh::<f64>::unit_elements([1, 1, 1], 1).unwrap();
    let err = assemble_lor(&quad, &hex, &[], &serial()).unwrap_err();
    assert!(matches!(
        err,
        LorError::DimensionMismatch {
            expected: 3,
            actual: 2,
            ..
        }
    ));
}

#[test]
fn simplex_subcells_are_rejected() {
    let mesh = LorQuadMesh::<f64>::unit_elements([1, 1], 2).unwrap();
    let refinement = Overridden {
        geometry: SubcellGeometry::Other,
        ..Overridden::new(&mesh)
    };
    let err = assemble_lor(&refinement, &mesh, &[], &serial()).unwrap_err();
    assert_eq!(err, LorError::UnsupportedGeometry { subcell: 0 });
}

#[test]
fn refinement_must_cover_every_element() {
    let coarse = LorQuadMesh::<f64>::unit_elements([1, 1], 2).unwrap();
    let fine = LorQuadMesh::<f64>::unit_elements([2, 1], 2).unwrap();
    let err = assemble_lor(&coarse, &fine, &[], &serial()).unwrap_err();
    assert!(matches!(err, LorError::DimensionMismatch { expected: 8, actual: 4, .. }));
}

#[test]
fn out_of_bounds_dofs_are_rejected() {
    let mesh = LorQuadMesh::<f64>::unit_elements([2, 1], 1).unwrap();
    let space = Overridden {
        num_dofs: 4,
        ..Overridden::new(&mesh)
    };
    // Serial assembly stops at the first element, which touches nodes 0, 1, 3 and 4
    let err = assemble_lor(&mesh, &space, &[], &serial()).unwrap_err();
    assert_eq!(
        err,
        LorError::DofOutOfBounds {
            element: 0,
            dof: 4,
            num_dofs: 4
        }
    );
    let err = assemble_lor(&mesh, &space, &[], &LorAssemblyOptions::default()).unwrap_err();
    assert!(matches!(err, LorError::DofOutOfBounds { num_dofs: 4, .. }));
}

#[test]
fn empty_space_gives_empty_matrix() {
    let mesh = LorQuadMesh::<f64>::unit_elements([0, 3], 2).unwrap();
    let csr = assemble_lor(&mesh, &mesh, &[], &LorAssemblyOptions::default()).unwrap();
    assert_eq!(csr.nnz(), 0);
}

#[test]
fn planar_jacobian_sources_agree_on_consistent_meshes() {
    let mut mesh = LorQuadMesh::<f64>::unit_elements([2, 2], 3).unwrap();
    mesh.perturb_vertex(mesh.node_index([3, 3]), &Vector2::new(0.1, 0.05));
    let from_vertices = assemble_dense(
        &mesh,
        &LorAssemblyOptions::default().with_planar_jacobians(PlanarJacobianSource::Vertices),
    );
    let computed = assemble_dense(&mesh, &LorAssemblyOptions::default());
    assert_matrix_eq!(computed, from_vertices, comp = abs, tol = 1e-13);

    let mesh = mesh.with_computed_geometric_factors().unwrap();
    let verified = assemble_dense(
        &mesh,
        &LorAssemblyOptions::default().with_verify_planar_jacobians(Some(1e-12)),
    );
    assert_matrix_eq!(verified, from_vertices, comp = abs, tol = 1e-13);
}

#[test]
fn stale_geometric_factors_are_detected_by_verification() {
    let reference = LorQuadMesh::<f64>::unit_elements([2, 1], 2).unwrap();
    let mut mesh = reference.clone().with_computed_geometric_factors().unwrap();
    mesh.perturb_vertex(mesh.node_index([2, 1]), &Vector2::new(0.2, 0.0));

    // Without verification the precomputed Jacobians are used as they are
    let stale = assemble_dense(&mesh, &serial());
    assert_eq!(stale, assemble_dense(&reference, &serial()));

    let err = assemble_lor(&mesh, &mesh, &[], &serial().with_verify_planar_jacobians(Some(1e-10))).unwrap_err();
    assert!(matches!(err, LorError::JacobianMismatch { .. }));
}

#[test]
fn geometric_factors_must_cover_all_subcells() {
    let mut mesh = LorQuadMesh::<f64>::unit_elements([1, 1], 2).unwrap();
    let other = LorQuadMesh::<f64>::unit_elements([1, 1], 1).unwrap();
    mesh.set_geometric_factors(Some(GeometricFactors::from_vertices(&other).unwrap()));
    let err = assemble_lor(&mesh, &mesh, &[], &serial()).unwrap_err();
    assert!(matches!(err, LorError::DimensionMismatch { expected: 4, actual: 1, .. }));
}

#[test]
fn jacobian_verification_is_relative_for_small_subcells() {
    let map = Matrix2::<f64>::identity() * 0.01;
    let mut mesh = LorQuadMesh::new([1, 1], 2, &map, &Vector2::zeros())
        .unwrap()
        .with_computed_geometric_factors()
        .unwrap();
    // A fifth of the sub-cell size
    mesh.perturb_vertex(mesh.node_index([2, 1]), &Vector2::new(0.001, 0.0));
    let err = assemble_lor(&mesh, &mesh, &[], &serial().with_verify_planar_jacobians(Some(1e-2))).unwrap_err();
    assert!(matches!(err, LorError::JacobianMismatch { .. }));
}

#[test]
fn jacobians_from_vertices_ignore_stale_geometric_factors() {
    let mut mesh = LorQuadMesh::<f64>::unit_elements([2, 1], 2)
        .unwrap()
        .with_computed_geometric_factors()
        .unwrap();
    mesh.perturb_vertex(mesh.node_index([2, 1]), &Vector2::new(0.2, 0.0));
    let from_vertices = serial().with_planar_jacobians(PlanarJacobianSource::Vertices);
    let verified = assemble_dense(&mesh, &from_vertices.clone().with_verify_planar_jacobians(Some(1e-10)));
    assert_eq!(verified, assemble_dense(&mesh, &from_vertices));
}
