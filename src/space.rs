//! Interfaces to the mesh, refinement and finite element space collaborators.
//!
//! LOR assembly never owns a mesh. It reads the refined (low-order) mesh together with its
//! refinement embeddings through [`LorRefinement`], and the high-order degrees of freedom through
//! [`HighOrderSpace`].
use crate::geometry::GeometricFactors;
use crate::{Dimension, Real};
use serde::{Deserialize, Serialize};

/// Geometry type of a refined sub-cell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubcellGeometry {
    Quadrilateral,
    Hexahedron,
    /// Any geometry LOR assembly cannot handle, such as simplices.
    Other,
}

impl SubcellGeometry {
    pub fn matches(&self, dim: Dimension) -> bool {
        matches!(
            (self, dim),
            (Self::Quadrilateral, Dimension::Two) | (Self::Hexahedron, Dimension::Three)
        )
    }
}

/// Basis family of a high-order space.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasisFamily {
    /// A nodal tensor-product basis with a lexicographic ordering of its nodes.
    NodalTensor,
    /// Non-nodal or non-tensor-product bases.
    Other,
}

/// Position of a sub-cell inside its parent high-order element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Embedding {
    /// Index of the parent high-order element.
    pub parent: usize,
    /// Flattened offset `kx + ky * p + kz * p^2` of the sub-cell in the parent's `p^d` grid.
    pub offset: usize,
}

impl Embedding {
    pub fn new(parent: usize, offset: usize) -> Self {
        Self { parent, offset }
    }

    /// The embedding of the sub-cell at tensor offset `coords` in an element of order `order`.
    pub fn from_offset_coords(parent: usize, order: usize, coords: &[usize]) -> Self {
        let offset = coords
            .iter()
            .rev()
            .fold(0, |acc, &k| acc * order + k);
        Self { parent, offset }
    }

    /// Recovers the tensor offset `(kx, ky, kz)`. Unused trailing entries are zero.
    pub fn offset_coords(&self, order: usize, dim: Dimension) -> [usize; 3] {
        debug_assert!(order > 0, "Polynomial order must be at least 1");
        let mut coords = [0; 3];
        let mut remainder = self.offset;
        for k in coords.iter_mut().take(dim.value()) {
            *k = remainder % order;
            remainder /= order;
        }
        coords
    }
}

/// A refined mesh whose cells are the bilinear/trilinear sub-cells of a high-order mesh.
pub trait LorRefinement<T: Real> {
    fn dim(&self) -> usize;

    fn num_subcells(&self) -> usize;

    fn subcell_geometry(&self, subcell_index: usize) -> SubcellGeometry;

    fn subcell_embedding(&self, subcell_index: usize) -> Embedding;

    /// Writes the vertex coordinates of the sub-cell, vertex by vertex.
    ///
    /// The output holds `dim * 2^dim` entries. Vertices are ordered counter-clockwise
    /// (`(0,0), (1,0), (1,1), (0,1)`) in 2D, and as the bottom face followed by the top face,
    /// each counter-clockwise, in 3D.
    fn populate_subcell_vertices(&self, subcell_index: usize, output: &mut [T]);

    /// Jacobians of all sub-cells at the vertex quadrature points, if the mesh provides them.
    fn geometric_factors(&self) -> Option<&GeometricFactors<T>> {
        None
    }
}

/// A high-order finite element space on the coarse mesh.
pub trait HighOrderSpace {
    fn dim(&self) -> usize;

    fn num_elements(&self) -> usize;

    fn basis_family(&self) -> BasisFamily;

    /// The (maximum) polynomial order of the elements.
    fn max_order(&self) -> usize;

    /// Total number of global degrees of freedom.
    fn num_dofs(&self) -> usize;

    fn element_dof_count(&self, element_index: usize) -> usize;

    /// Writes the global degrees of freedom of the element in the element's native local order.
    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize);

    /// Maps the lexicographic local index `ix + iy (p + 1) (+ iz (p + 1)^2)` to the native local
    /// index used by [`populate_element_dofs`](Self::populate_element_dofs).
    fn lexicographic_ordering(&self) -> &[usize];
}
