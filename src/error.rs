//! Error types for LOR assembly.
//!
//! Failures are either configuration errors, detected before any numerical work starts, or
//! geometric errors detected while evaluating the metric terms. Neither is recoverable: the
//! enclosing assembly call is aborted and no partial matrix is returned.
use crate::Dimension;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

pub type Result<T> = std::result::Result<T, LorError>;

/// A sub-cell whose Jacobian is not orientation preserving at some quadrature point.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    NonPositiveDeterminant {
        /// Index of the parent high-order element.
        parent: usize,
        /// Index of the sub-cell in the refined mesh.
        subcell: usize,
        quadrature_point: usize,
        determinant: f64,
    },
}

impl Display for GeometryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveDeterminant {
                parent,
                subcell,
                quadrature_point,
                determinant,
            } => write!(
                f,
                "Non-positive Jacobian determinant {:e} in sub-cell {} (parent element {}) \
                 at quadrature point {}",
                determinant, subcell, parent, quadrature_point
            ),
        }
    }
}

impl Error for GeometryError {}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum LorError {
    /// The high-order space does not use a nodal tensor-product basis.
    UnsupportedBasis,
    /// No specialized assembler exists for the requested order.
    UnsupportedOrder(usize),
    /// Only 2D and 3D discretizations are supported.
    UnsupportedDimension(usize),
    /// A sub-cell is not a quadrilateral (2D) or hexahedron (3D).
    UnsupportedGeometry { subcell: usize },
    /// The refinement embeddings do not describe a complete `p^d` subdivision of every element.
    InvalidEmbedding { subcell: usize, reason: &'static str },
    /// Two collaborators disagree on a size.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    Geometry(GeometryError),
    /// Validation of the planar Jacobians against the vertex-based Jacobians failed.
    JacobianMismatch { subcell: usize, quadrature_point: usize },
    /// An element references a global degree of freedom outside of the space.
    DofOutOfBounds { element: usize, dof: usize, num_dofs: usize },
    /// The lexicographic ordering of the space is not a permutation of the local indices.
    InvalidLexicographicOrdering { lexicographic_index: usize },
}

impl Display for LorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedBasis => {
                write!(f, "LOR assembly requires a nodal tensor-product (lexicographic) basis")
            }
            Self::UnsupportedOrder(order) => write!(
                f,
                "Unsupported polynomial order {} (supported orders are 1 to {})",
                order,
                crate::MAX_SUPPORTED_ORDER
            ),
            Self::UnsupportedDimension(dim) => {
                write!(f, "Unsupported spatial dimension {} (must be 2 or 3)", dim)
            }
            Self::UnsupportedGeometry { subcell } => write!(
                f,
                "Sub-cell {} is not a quadrilateral or hexahedron matching the mesh dimension",
                subcell
            ),
            Self::InvalidEmbedding { subcell, reason } => {
                write!(f, "Invalid refinement embedding for sub-cell {}: {}", subcell, reason)
            }
            Self::DimensionMismatch {
                what,
                expected,
                actual,
            } => write!(f, "Mismatched {}: expected {}, got {}", what, expected, actual),
            Self::Geometry(err) => write!(f, "Geometry error: {}", err),
            Self::JacobianMismatch {
                subcell,
                quadrature_point,
            } => write!(
                f,
                "Precomputed Jacobian of sub-cell {} at quadrature point {} does not match \
                 the Jacobian computed from its vertices",
                subcell, quadrature_point
            ),
            Self::DofOutOfBounds { element, dof, num_dofs } => write!(
                f,
                "Element {} references degree of freedom {} but the space only has {}",
                element, dof, num_dofs
            ),
            Self::InvalidLexicographicOrdering { lexicographic_index } => write!(
                f,
                "Lexicographic ordering is not a permutation: entry {} is out of bounds or repeated",
                lexicographic_index
            ),
        }
    }
}

impl Error for LorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Geometry(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GeometryError> for LorError {
    fn from(err: GeometryError) -> Self {
        Self::Geometry(err)
    }
}

impl LorError {
    pub(crate) fn check_dimension(dim: usize) -> Result<Dimension> {
        Dimension::try_from_usize(dim).ok_or(Self::UnsupportedDimension(dim))
    }

    pub(crate) fn check_size(what: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch {
                what,
                expected,
                actual,
            })
        }
    }
}
