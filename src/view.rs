//! Strided multi-dimensional views over flat storage.
//!
//! Arrays in this crate are stored flat with the first index varying fastest (column-major in
//! the sense of `nalgebra`). A [`Layout`] maps a multi-index to the flat offset; indexing is
//! bounds-checked in debug builds only.
use crate::Real;
use std::ops::{Index, IndexMut};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Layout<const N: usize> {
    shape: [usize; N],
    strides: [usize; N],
}

impl<const N: usize> Layout<N> {
    /// A dense layout in which the first index is contiguous.
    pub fn first_index_fastest(shape: [usize; N]) -> Self {
        let mut strides = [0; N];
        let mut stride = 1;
        for (s, &extent) in strides.iter_mut().zip(&shape) {
            *s = stride;
            stride *= extent;
        }
        Self { shape, strides }
    }

    pub fn shape(&self) -> &[usize; N] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize; N] {
        &self.strides
    }

    /// Total number of addressable entries.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn offset(&self, index: [usize; N]) -> usize {
        debug_assert!(
            index.iter().zip(&self.shape).all(|(i, n)| i < n),
            "Multi-index {:?} out of bounds for shape {:?}",
            index,
            self.shape
        );
        index
            .iter()
            .zip(&self.strides)
            .map(|(i, s)| i * s)
            .sum()
    }
}

/// Metric terms of all sub-cells, addressed by `[component, quadrature point, sub-cell offset, parent]`.
///
/// The components of each symmetric tensor are stored in the order `xx, xy, yy` in 2D and
/// `xx, xy, xz, yy, yz, zz` in 3D. All components of a single `(offset, parent)` pair are
/// contiguous, so the array can be split into disjoint per-sub-cell chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricArray<T> {
    layout: Layout<4>,
    data: Vec<T>,
}

impl<T: Real> MetricArray<T> {
    pub fn zeros(
        num_components: usize,
        num_quadrature_points: usize,
        num_subcells_per_element: usize,
        num_elements: usize,
    ) -> Self {
        let layout = Layout::first_index_fastest([
            num_components,
            num_quadrature_points,
            num_subcells_per_element,
            num_elements,
        ]);
        Self {
            data: vec![T::zero(); layout.len()],
            layout,
        }
    }
}

impl<T> MetricArray<T> {
    pub fn layout(&self) -> &Layout<4> {
        &self.layout
    }

    pub fn num_components(&self) -> usize {
        self.layout.shape()[0]
    }

    pub fn num_quadrature_points(&self) -> usize {
        self.layout.shape()[1]
    }

    pub fn num_subcells_per_element(&self) -> usize {
        self.layout.shape()[2]
    }

    pub fn num_elements(&self) -> usize {
        self.layout.shape()[3]
    }

    /// Number of entries belonging to a single sub-cell.
    pub fn subcell_stride(&self) -> usize {
        self.layout.strides()[2]
    }

    /// All metric components of all quadrature points of the given sub-cell.
    pub fn subcell(&self, parent: usize, offset: usize) -> &[T] {
        let begin = self.layout.offset([0, 0, offset, parent]);
        &self.data[begin..begin + self.subcell_stride()]
    }

    /// The metric terms of a single high-order element.
    pub fn element(&self, parent: usize) -> &[T] {
        let stride = self.layout.strides()[3];
        &self.data[parent * stride..(parent + 1) * stride]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable per-sub-cell chunks, ordered by `offset + num_subcells_per_element * parent`.
    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Index<[usize; 4]> for MetricArray<T> {
    type Output = T;

    fn index(&self, index: [usize; 4]) -> &T {
        &self.data[self.layout.offset(index)]
    }
}

impl<T> IndexMut<[usize; 4]> for MetricArray<T> {
    fn index_mut(&mut self, index: [usize; 4]) -> &mut T {
        let offset = self.layout.offset(index);
        &mut self.data[offset]
    }
}
