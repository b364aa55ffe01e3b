//! Selection of the order-specialized element kernel and the top-level assembly driver.
use crate::assembly::global::LorMatrixBuilder;
use crate::assembly::stencil_2d::assemble_element_2d;
use crate::assembly::stencil_3d::assemble_element_3d;
use crate::assembly::ContributionSink;
use crate::error::{LorError, Result};
use crate::geometry::evaluate_metric;
use crate::space::{BasisFamily, HighOrderSpace, LorRefinement};
use crate::{Dimension, Real, MAX_SUPPORTED_ORDER};
use log::{debug, info};
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use thread_local::ThreadLocal;

/// Where the Jacobians of planar sub-cells are taken from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlanarJacobianSource {
    /// Use the geometric factors of the refined mesh, computing them from the vertices if the mesh
    /// does not provide them.
    #[default]
    GeometricFactors,
    /// Use the closed-form bilinear Jacobian of the sub-cell vertices.
    Vertices,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LorAssemblyOptions {
    /// Process sub-cells and elements on the rayon thread pool.
    ///
    /// The assembled matrix is identical to the one obtained in serial.
    pub parallel: bool,
    pub planar_jacobians: PlanarJacobianSource,
    /// If set, planar Jacobians taken from geometric factors are compared against the Jacobians
    /// computed from the vertices, with the given relative tolerance. Has no effect when the
    /// Jacobians are taken from the vertices, including all 3D meshes.
    pub verify_planar_jacobians: Option<f64>,
}

impl Default for LorAssemblyOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            planar_jacobians: PlanarJacobianSource::default(),
            verify_planar_jacobians: None,
        }
    }
}

impl LorAssemblyOptions {
    pub fn with_parallel(self, parallel: bool) -> Self {
        Self { parallel, ..self }
    }

    pub fn with_planar_jacobians(self, planar_jacobians: PlanarJacobianSource) -> Self {
        Self {
            planar_jacobians,
            ..self
        }
    }

    pub fn with_verify_planar_jacobians(self, tolerance: Option<f64>) -> Self {
        Self {
            verify_planar_jacobians: tolerance,
            ..self
        }
    }
}

/// An element kernel, taking the element's metric terms, its global degrees of freedom in native
/// local order, the lexicographic ordering and the sink receiving the contributions.
pub type ElementKernel<T, S> = fn(&[T], &[usize], &[usize], &mut S);

macro_rules! kernel_table {
    ($kernel:ident, $t:ty, $s:ty; $($order:literal),+) => {
        [$($kernel::<$t, $s, $order> as ElementKernel<$t, $s>),+]
    };
}

/// Returns the kernel specialized for the given dimension and order.
pub fn select_kernel<T, S>(dim: Dimension, order: usize) -> Result<ElementKernel<T, S>>
where
    T: Real,
    S: ContributionSink<T>,
{
    if order == 0 || order > MAX_SUPPORTED_ORDER {
        return Err(LorError::UnsupportedOrder(order));
    }
    let table: [ElementKernel<T, S>; MAX_SUPPORTED_ORDER] = match dim {
        Dimension::Two => {
            kernel_table!(assemble_element_2d, T, S; 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16)
        }
        Dimension::Three => {
            kernel_table!(assemble_element_3d, T, S; 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16)
        }
    };
    Ok(table[order - 1])
}

/// Number of elements whose contributions are buffered at once in parallel mode.
const ELEMENT_BATCH_SIZE: usize = 1024;

/// Upper bound on the number of contributions of a single element.
fn contributions_per_element(dim: Dimension, order: usize) -> usize {
    match dim {
        // Every node couples to at most 3 x 3 neighbours
        Dimension::Two => dim.num_element_dofs(order) * 9,
        // Every sub-cell contributes a full 8 x 8 local matrix
        Dimension::Three => dim.num_subcells(order) * 64,
    }
}

fn gather_element_dofs<Space>(space: &Space, element: usize, expected: usize, dofs: &mut Vec<usize>) -> Result<()>
where
    Space: HighOrderSpace + ?Sized,
{
    LorError::check_size("element degree-of-freedom count", expected, space.element_dof_count(element))?;
    dofs.resize(expected, 0);
    space.populate_element_dofs(dofs, element);
    let num_dofs = space.num_dofs();
    match dofs.iter().find(|&&dof| dof >= num_dofs) {
        Some(&dof) => Err(LorError::DofOutOfBounds { element, dof, num_dofs }),
        None => Ok(()),
    }
}

fn check_lexicographic_ordering(lexicographic: &[usize], num_element_dofs: usize) -> Result<()> {
    LorError::check_size("lexicographic ordering length", num_element_dofs, lexicographic.len())?;
    let mut seen = vec![false; num_element_dofs];
    for (lexicographic_index, &local) in lexicographic.iter().enumerate() {
        match seen.get_mut(local) {
            Some(seen) if !*seen => *seen = true,
            _ => return Err(LorError::InvalidLexicographicOrdering { lexicographic_index }),
        }
    }
    Ok(())
}

/// Assembles the LOR stiffness matrix of the high-order space.
///
/// The rows and columns of the essential degrees of freedom are eliminated from the returned
/// matrix, keeping their diagonal entries. Configuration errors are reported before any metric
/// terms are computed, except for out-of-bounds degrees of freedom, which are detected while
/// visiting the elements.
pub fn assemble_lor<T, R, Space>(
    refinement: &R,
    space: &Space,
    essential_dofs: &[usize],
    options: &LorAssemblyOptions,
) -> Result<CsrMatrix<T>>
where
    T: Real,
    R: LorRefinement<T> + Sync + ?Sized,
    Space: HighOrderSpace + Sync + ?Sized,
{
    if space.basis_family() != BasisFamily::NodalTensor {
        return Err(LorError::UnsupportedBasis);
    }
    let dim = LorError::check_dimension(space.dim())?;
    LorError::check_size("refinement dimension", dim.value(), refinement.dim())?;
    let order = space.max_order();
    let serial_kernel = select_kernel::<T, LorMatrixBuilder<T>>(dim, order)?;
    let buffered_kernel = select_kernel::<T, Vec<(usize, usize, T)>>(dim, order)?;

    let num_element_dofs = dim.num_element_dofs(order);
    let lexicographic = space.lexicographic_ordering();
    check_lexicographic_ordering(lexicographic, num_element_dofs)?;

    let num_elements = space.num_elements();
    let metric = evaluate_metric(refinement, order, num_elements, options)?;

    info!(
        "Assembling {} LOR matrix of order {} for {} elements and {} degrees of freedom",
        dim,
        order,
        num_elements,
        space.num_dofs()
    );

    let mut builder = LorMatrixBuilder::new(space.num_dofs(), space.num_dofs());
    if options.parallel {
        let workspace: ThreadLocal<RefCell<Vec<usize>>> = ThreadLocal::new();
        let capacity = contributions_per_element(dim, order);
        for batch_begin in (0..num_elements).step_by(ELEMENT_BATCH_SIZE) {
            let batch_end = (batch_begin + ELEMENT_BATCH_SIZE).min(num_elements);
            let batch = (batch_begin..batch_end)
                .into_par_iter()
                .map(|element| {
                    let mut dofs = workspace.get_or_default().borrow_mut();
                    gather_element_dofs(space, element, num_element_dofs, &mut dofs)?;
                    let mut triplets = Vec::with_capacity(capacity);
                    buffered_kernel(metric.element(element), &dofs, lexicographic, &mut triplets);
                    Ok(triplets)
                })
                .collect::<Result<Vec<_>>>()?;
            // Pushing in element order makes the result independent of scheduling
            for triplets in batch {
                builder.add_triplets(triplets);
            }
        }
    } else {
        let mut dofs = Vec::new();
        for element in 0..num_elements {
            gather_element_dofs(space, element, num_element_dofs, &mut dofs)?;
            serial_kernel(metric.element(element), &dofs, lexicographic, &mut builder);
        }
    }

    debug!("Pushed {} contributions", builder.nnz_pushed());
    Ok(builder.finalize(essential_dofs))
}
