//! Vertex quadrature rules for bilinear and trilinear sub-cells.
//!
//! LOR assembly integrates on every sub-cell with the tensor-product two-point Gauss–Lobatto rule,
//! whose points are exactly the vertices of the reference cell `[0, 1]^d`. Points are ordered with
//! the x-coordinate varying fastest, i.e. point `iq = iqx + 2 * iqy (+ 4 * iqz)` sits at
//! `(iqx, iqy, iqz)`. Note that this is *not* the counter-clockwise vertex order of the cells.
use crate::Real;
use nalgebra::{OPoint, Point1, Point2, Point3, U1, U2, U3};
use numeric_literals::replace_float_literals;

pub type QuadraturePair<T, D> = (Vec<T>, Vec<OPoint<T, D>>);
pub type QuadraturePair1d<T> = QuadraturePair<T, U1>;
pub type QuadraturePair2d<T> = QuadraturePair<T, U2>;
pub type QuadraturePair3d<T> = QuadraturePair<T, U3>;

/// Number of quadrature points per axis of the vertex rule.
pub const POINTS_PER_AXIS: usize = 2;

/// The two-point Gauss–Lobatto rule on `[0, 1]` (the trapezoidal rule).
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn gauss_lobatto_1d<T: Real>() -> QuadraturePair1d<T> {
    (vec![0.5, 0.5], vec![Point1::new(0.0), Point1::new(1.0)])
}

/// The vertex rule on the reference square `[0, 1]^2`.
pub fn vertex_rule_2d<T: Real>() -> QuadraturePair2d<T> {
    let (w1d, p1d) = gauss_lobatto_1d::<T>();
    let mut weights = Vec::with_capacity(4);
    let mut points = Vec::with_capacity(4);
    for (wy, py) in w1d.iter().zip(&p1d) {
        for (wx, px) in w1d.iter().zip(&p1d) {
            weights.push(*wx * *wy);
            points.push(Point2::new(px.x, py.x));
        }
    }
    (weights, points)
}

/// The vertex rule on the reference cube `[0, 1]^3`.
pub fn vertex_rule_3d<T: Real>() -> QuadraturePair3d<T> {
    let (w1d, p1d) = gauss_lobatto_1d::<T>();
    let mut weights = Vec::with_capacity(8);
    let mut points = Vec::with_capacity(8);
    for (wz, pz) in w1d.iter().zip(&p1d) {
        for (wy, py) in w1d.iter().zip(&p1d) {
            for (wx, px) in w1d.iter().zip(&p1d) {
                weights.push(*wx * *wy * *wz);
                points.push(Point3::new(px.x, py.x, pz.x));
            }
        }
    }
    (weights, points)
}
