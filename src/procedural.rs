//! Structured high-order meshes together with their low-order refinement.
//!
//! [`LorBoxMesh`] describes a box of `n_1 x ... x n_d` tensor-product elements of order `p`. Every
//! element is subdivided into `p^d` sub-cells, and the global degrees of freedom are the nodes of
//! the `(n_1 p + 1) x ... x (n_d p + 1)` lattice, shared between neighbouring elements. The box is
//! placed in physical space through an affine map, and individual lattice nodes can be moved
//! afterwards to obtain non-affine or inverted sub-cells.
//!
//! Sub-cells are numbered along the fine lattice of cells rather than element by element, and
//! every element numbers its degrees of freedom with vertices first, then edges (and faces), then
//! interior nodes. Consumers therefore have to go through the embeddings and the lexicographic
//! ordering to find the tensor-product structure.
use crate::geometry::{GeometricFactors, HEX_VERTICES};
use crate::space::{BasisFamily, Embedding, HighOrderSpace, LorRefinement, SubcellGeometry};
use crate::Real;
use eyre::eyre;
use nalgebra::{convert, SMatrix, SVector};

pub type LorQuadMesh<T> = LorBoxMesh<T, 2>;
pub type LorHexMesh<T> = LorBoxMesh<T, 3>;

#[derive(Debug, Clone)]
pub struct LorBoxMesh<T: Real, const D: usize> {
    elements: [usize; D],
    order: usize,
    /// Positions of the lattice nodes, x fastest.
    nodes: Vec<SVector<T, D>>,
    /// Lexicographic local index of every native local index.
    native_to_lexicographic: Vec<usize>,
    /// Native local index of every lexicographic local index.
    lexicographic: Vec<usize>,
    basis_family: BasisFamily,
    geometric_factors: Option<GeometricFactors<T>>,
}

fn flatten<const D: usize>(index: &[usize; D], shape: &[usize; D]) -> usize {
    index
        .iter()
        .zip(shape)
        .rev()
        .fold(0, |acc, (&i, &n)| acc * n + i)
}

fn unflatten<const D: usize>(mut flat: usize, shape: &[usize; D]) -> [usize; D] {
    let mut index = [0; D];
    for (i, &n) in index.iter_mut().zip(shape) {
        *i = flat % n;
        flat /= n;
    }
    index
}

/// Native ordering of the nodes of a tensor-product element: the vertices in the same order as the
/// sub-cell vertices, followed by edge, face and interior nodes grouped by entity.
///
/// Returns the lexicographic index of every native local index.
fn native_node_ordering<const D: usize>(order: usize) -> Vec<usize> {
    let shape = [order + 1; D];
    let mut ordering: Vec<usize> = (0..shape.iter().product()).collect();
    ordering.sort_by_key(|&lex| {
        let coords = unflatten(lex, &shape);
        let num_interior_coords = coords.iter().filter(|&&c| c != 0 && c != order).count();
        let vertex_rank = HEX_VERTICES[..1 << D]
            .iter()
            .position(|v| coords.iter().zip(v).all(|(&c, &v)| c == v * order));
        // Lower boundary, interior or upper boundary along every axis identifies the entity
        let entity = coords.iter().rev().fold(0, |acc, &c| {
            let location = match c {
                0 => 0,
                c if c == order => 2,
                _ => 1,
            };
            3 * acc + location
        });
        (num_interior_coords, vertex_rank.unwrap_or(0), entity, lex)
    });
    ordering
}

impl<T: Real, const D: usize> LorBoxMesh<T, D> {
    /// Creates a box of `elements[0] x ... ` elements of order `order`.
    ///
    /// Element `(e_1, ..., e_d)` covers the reference box `[e_1, e_1 + 1] x ...`, which is
    /// mapped to physical space by `x = map * x_ref + translation`.
    pub fn new(
        elements: [usize; D],
        order: usize,
        map: &SMatrix<T, D, D>,
        translation: &SVector<T, D>,
    ) -> eyre::Result<Self> {
        if D != 2 && D != 3 {
            return Err(eyre!("Structured LOR meshes must be 2D or 3D, got dimension {}", D));
        }
        if order == 0 {
            return Err(eyre!("Polynomial order must be at least 1"));
        }

        let lattice_shape = elements.map(|n| n * order + 1);
        let num_nodes: usize = lattice_shape.iter().product();
        let inv_order: T = convert(1.0 / order as f64);
        let nodes = (0..num_nodes)
            .map(|node| {
                let coords = unflatten(node, &lattice_shape);
                let x_ref = SVector::<T, D>::from_fn(|a, _| convert::<f64, T>(coords[a] as f64) * inv_order);
                map * x_ref + translation
            })
            .collect();

        let native_to_lexicographic = native_node_ordering::<D>(order);
        let mut lexicographic = vec![0; native_to_lexicographic.len()];
        for (native, &lex) in native_to_lexicographic.iter().enumerate() {
            lexicographic[lex] = native;
        }

        Ok(Self {
            elements,
            order,
            nodes,
            native_to_lexicographic,
            lexicographic,
            basis_family: BasisFamily::NodalTensor,
            geometric_factors: None,
        })
    }

    /// An axis-aligned box of unit-sized elements with its lower corner at the origin.
    pub fn unit_elements(elements: [usize; D], order: usize) -> eyre::Result<Self> {
        Self::new(elements, order, &SMatrix::identity(), &SVector::zeros())
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn elements(&self) -> &[usize; D] {
        &self.elements
    }

    fn lattice_shape(&self) -> [usize; D] {
        self.elements.map(|n| n * self.order + 1)
    }

    fn fine_cell_shape(&self) -> [usize; D] {
        self.elements.map(|n| n * self.order)
    }

    /// Index of the lattice node with the given integer coordinates, which is also its global
    /// degree of freedom.
    pub fn node_index(&self, coords: [usize; D]) -> usize {
        flatten(&coords, &self.lattice_shape())
    }

    pub fn node_position(&self, node: usize) -> &SVector<T, D> {
        &self.nodes[node]
    }

    /// Moves a lattice node by the given displacement.
    ///
    /// Geometric factors stored with [`set_geometric_factors`](Self::set_geometric_factors) are
    /// not updated.
    pub fn perturb_vertex(&mut self, node: usize, displacement: &SVector<T, D>) {
        self.nodes[node] += displacement;
    }

    /// The lattice nodes at the vertices of a sub-cell, in the vertex order of
    /// [`LorRefinement::populate_subcell_vertices`].
    pub fn subcell_nodes(&self, subcell_index: usize) -> Vec<usize> {
        let cell = unflatten(subcell_index, &self.fine_cell_shape());
        HEX_VERTICES[..1 << D]
            .iter()
            .map(|reference| {
                let mut coords = cell;
                for (c, r) in coords.iter_mut().zip(reference) {
                    *c += r;
                }
                self.node_index(coords)
            })
            .collect()
    }

    /// All degrees of freedom on the boundary of the box.
    pub fn boundary_dofs(&self) -> Vec<usize> {
        let shape = self.lattice_shape();
        (0..self.nodes.len())
            .filter(|&node| {
                let coords = unflatten(node, &shape);
                coords
                    .iter()
                    .zip(&shape)
                    .any(|(&c, &n)| c == 0 || c + 1 == n)
            })
            .collect()
    }

    pub fn set_geometric_factors(&mut self, factors: Option<GeometricFactors<T>>) {
        self.geometric_factors = factors;
    }

    /// Computes the geometric factors from the current node positions and stores them.
    pub fn with_computed_geometric_factors(mut self) -> eyre::Result<Self> {
        let factors = GeometricFactors::from_vertices(&self)?;
        self.geometric_factors = Some(factors);
        Ok(self)
    }

    /// Overrides the reported basis family.
    pub fn with_basis_family(self, basis_family: BasisFamily) -> Self {
        Self { basis_family, ..self }
    }
}

impl<T: Real, const D: usize> LorRefinement<T> for LorBoxMesh<T, D> {
    fn dim(&self) -> usize {
        D
    }

    fn num_subcells(&self) -> usize {
        self.fine_cell_shape().iter().product()
    }

    fn subcell_geometry(&self, _subcell_index: usize) -> SubcellGeometry {
        match D {
            2 => SubcellGeometry::Quadrilateral,
            3 => SubcellGeometry::Hexahedron,
            _ => SubcellGeometry::Other,
        }
    }

    fn subcell_embedding(&self, subcell_index: usize) -> Embedding {
        let cell = unflatten(subcell_index, &self.fine_cell_shape());
        let parent = flatten(&cell.map(|c| c / self.order), &self.elements);
        Embedding::from_offset_coords(parent, self.order, &cell.map(|c| c % self.order))
    }

    fn populate_subcell_vertices(&self, subcell_index: usize, output: &mut [T]) {
        assert_eq!(output.len(), D << D, "Output must hold all sub-cell vertices");
        for (vertex, node) in self.subcell_nodes(subcell_index).into_iter().enumerate() {
            output[D * vertex..D * (vertex + 1)].copy_from_slice(self.nodes[node].as_slice());
        }
    }

    fn geometric_factors(&self) -> Option<&GeometricFactors<T>> {
        self.geometric_factors.as_ref()
    }
}

impl<T: Real, const D: usize> HighOrderSpace for LorBoxMesh<T, D> {
    fn dim(&self) -> usize {
        D
    }

    fn num_elements(&self) -> usize {
        self.elements.iter().product()
    }

    fn basis_family(&self) -> BasisFamily {
        self.basis_family
    }

    fn max_order(&self) -> usize {
        self.order
    }

    fn num_dofs(&self) -> usize {
        self.nodes.len()
    }

    fn element_dof_count(&self, _element_index: usize) -> usize {
        self.native_to_lexicographic.len()
    }

    fn populate_element_dofs(&self, output: &mut [usize], element_index: usize) {
        assert_eq!(output.len(), self.native_to_lexicographic.len());
        let element = unflatten(element_index, &self.elements);
        let local_shape = [self.order + 1; D];
        for (dof, &lex) in output.iter_mut().zip(&self.native_to_lexicographic) {
            let mut coords = unflatten(lex, &local_shape);
            for (c, e) in coords.iter_mut().zip(&element) {
                *c += e * self.order;
            }
            *dof = self.node_index(coords);
        }
    }

    fn lexicographic_ordering(&self) -> &[usize] {
        &self.lexicographic
    }
}
