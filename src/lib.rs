//! Batched assembly of high-order finite element operators through a low-order refinement (LOR).
//!
//! A high-order tensor-product element of order $p$ is subdivided into a regular grid of $p^d$
//! bilinear (2D) or trilinear (3D) sub-cells. The Laplace-type bilinear form of every pair of
//! high-order degrees of freedom is then computed from the low-order sub-cells that support both
//! of them, using the vertex (order-1 Gauss–Lobatto) quadrature rule on every sub-cell.
//!
//! The pipeline consists of
//!
//! 1. [`geometry::evaluate_metric`], which reduces sub-cell Jacobians to a compact symmetric
//!    metric tensor per quadrature point,
//! 2. the order-specialized stencil assemblers in [`assembly`], selected by
//!    [`assembly::dispatch::assemble_lor`],
//! 3. [`assembly::global::LorMatrixBuilder`], which accumulates the contributions, eliminates
//!    essential degrees of freedom and finalizes the CSR matrix.
//!
//! The mesh, the refinement and the high-order space are external collaborators described by the
//! traits in [`space`]. Structured implementations are available in [`procedural`].
use nalgebra::RealField;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

pub mod assembly;
pub mod error;
pub mod geometry;
pub mod procedural;
pub mod quadrature;
pub mod space;
pub mod view;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use assembly::dispatch::{assemble_lor, LorAssemblyOptions, PlanarJacobianSource};
pub use error::{GeometryError, LorError};

/// The scalar type used throughout the crate.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// The highest polynomial order for which a specialized assembler is available.
pub const MAX_SUPPORTED_ORDER: usize = 16;

/// Spatial dimension of a LOR discretization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Two,
    Three,
}

impl Dimension {
    pub fn try_from_usize(dim: usize) -> Option<Self> {
        match dim {
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }

    pub fn value(&self) -> usize {
        match self {
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Number of independent entries of a symmetric `dim x dim` tensor.
    pub fn num_metric_components(&self) -> usize {
        let d = self.value();
        d * (d + 1) / 2
    }

    /// Number of vertices of a bilinear/trilinear sub-cell, which equals the number of quadrature
    /// points of the vertex rule.
    pub fn num_cell_vertices(&self) -> usize {
        1 << self.value()
    }

    /// Number of sub-cells, $p^d$, in a high-order element of the given order.
    pub fn num_subcells(&self, order: usize) -> usize {
        order.pow(self.value() as u32)
    }

    /// Number of nodal degrees of freedom, $(p+1)^d$, of a tensor-product element.
    pub fn num_element_dofs(&self, order: usize) -> usize {
        (order + 1).pow(self.value() as u32)
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}D", self.value())
    }
}
