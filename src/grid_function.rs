//! Maps defined on a grid, used as geometry descriptions.
//!
//! A grid function `F: R^D -> R^S` is evaluated at the quadrature points of grid elements,
//! which are points of the parametric domain spanned by the grid knots.
use crate::grid::Grid;
use crate::{Error, Real};
use nalgebra::{Point, SMatrix, SVector};
use std::fmt::Debug;

mod element;
mod handler;

pub use element::*;
pub use handler::*;

/// A map from the parametric domain of a grid into `R^S`.
pub trait GridFunction<T: Real, const D: usize, const S: usize>: Debug {
    fn grid(&self) -> &Grid<T, D>;

    /// Evaluates the map at each point.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `values` and `points` have different lengths.
    fn evaluate_0(&self, points: &[Point<T, D>], values: &mut [SVector<T, S>]);

    /// Evaluates the Jacobian `dF_s / dx_d` at each point.
    fn evaluate_1(&self, points: &[Point<T, D>], jacobians: &mut [SMatrix<T, S, D>]);

    /// Evaluates the Hessian of each component at each point.
    fn evaluate_2(&self, points: &[Point<T, D>], hessians: &mut [[SMatrix<T, D, D>; S]]);
}

/// The identity map of the parametric domain.
#[derive(Debug, Clone)]
pub struct IdentityGridFunction<'a, T, const D: usize> {
    grid: &'a Grid<T, D>,
}

impl<'a, T: Real, const D: usize> IdentityGridFunction<'a, T, D> {
    pub fn new(grid: &'a Grid<T, D>) -> Self {
        Self { grid }
    }
}

impl<'a, T: Real, const D: usize> GridFunction<T, D, D> for IdentityGridFunction<'a, T, D> {
    fn grid(&self) -> &Grid<T, D> {
        self.grid
    }

    fn evaluate_0(&self, points: &[Point<T, D>], values: &mut [SVector<T, D>]) {
        assert_eq!(points.len(), values.len());
        for (value, point) in values.iter_mut().zip(points) {
            *value = point.coords;
        }
    }

    fn evaluate_1(&self, points: &[Point<T, D>], jacobians: &mut [SMatrix<T, D, D>]) {
        assert_eq!(points.len(), jacobians.len());
        jacobians.fill(SMatrix::identity());
    }

    fn evaluate_2(&self, points: &[Point<T, D>], hessians: &mut [[SMatrix<T, D, D>; D]]) {
        assert_eq!(points.len(), hessians.len());
        hessians.fill([SMatrix::zeros(); D]);
    }
}

/// The affine map `x -> A x + b`.
#[derive(Debug, Clone)]
pub struct LinearGridFunction<'a, T, const D: usize, const S: usize> {
    grid: &'a Grid<T, D>,
    a: SMatrix<T, S, D>,
    b: SVector<T, S>,
}

impl<'a, T: Real, const D: usize, const S: usize> LinearGridFunction<'a, T, D, S> {
    /// Creates the map. Fails if `S < D`, since the map could not be an immersion.
    pub fn new(grid: &'a Grid<T, D>, a: SMatrix<T, S, D>, b: SVector<T, S>) -> eyre::Result<Self> {
        if S < D {
            return Err(Error::DimensionMismatch {
                what: "linear grid function range",
                expected: D,
                actual: S,
            }
            .into());
        }
        Ok(Self { grid, a, b })
    }

    pub fn matrix(&self) -> &SMatrix<T, S, D> {
        &self.a
    }

    pub fn translation(&self) -> &SVector<T, S> {
        &self.b
    }
}

impl<'a, T: Real, const D: usize, const S: usize> GridFunction<T, D, S> for LinearGridFunction<'a, T, D, S> {
    fn grid(&self) -> &Grid<T, D> {
        self.grid
    }

    fn evaluate_0(&self, points: &[Point<T, D>], values: &mut [SVector<T, S>]) {
        assert_eq!(points.len(), values.len());
        for (value, point) in values.iter_mut().zip(points) {
            *value = self.a * point.coords + self.b;
        }
    }

    fn evaluate_1(&self, points: &[Point<T, D>], jacobians: &mut [SMatrix<T, S, D>]) {
        assert_eq!(points.len(), jacobians.len());
        jacobians.fill(self.a);
    }

    fn evaluate_2(&self, points: &[Point<T, D>], hessians: &mut [[SMatrix<T, D, D>; S]]) {
        assert_eq!(points.len(), hessians.len());
        hessians.fill([SMatrix::zeros(); S]);
    }
}

/// Polar coordinates `(r, theta) -> (r cos(theta), r sin(theta))`.
///
/// The grid spans the parametric rectangle in `(r, theta)`; a grid on `[r0, r1] x [0, pi / 2]`
/// maps to a quarter annulus.
#[derive(Debug, Clone)]
pub struct PolarGridFunction<'a, T> {
    grid: &'a Grid<T, 2>,
}

impl<'a, T: Real> PolarGridFunction<'a, T> {
    pub fn new(grid: &'a Grid<T, 2>) -> Self {
        Self { grid }
    }
}

impl<'a, T: Real> GridFunction<T, 2, 2> for PolarGridFunction<'a, T> {
    fn grid(&self) -> &Grid<T, 2> {
        self.grid
    }

    fn evaluate_0(&self, points: &[Point<T, 2>], values: &mut [SVector<T, 2>]) {
        assert_eq!(points.len(), values.len());
        for (value, point) in values.iter_mut().zip(points) {
            let (r, theta) = (point[0], point[1]);
            *value = SVector::<T, 2>::new(r * theta.cos(), r * theta.sin());
        }
    }

    fn evaluate_1(&self, points: &[Point<T, 2>], jacobians: &mut [SMatrix<T, 2, 2>]) {
        assert_eq!(points.len(), jacobians.len());
        for (jacobian, point) in jacobians.iter_mut().zip(points) {
            let (r, theta) = (point[0], point[1]);
            let (sin, cos) = theta.sin_cos();
            *jacobian = SMatrix::<T, 2, 2>::new(cos, -r * sin, sin, r * cos);
        }
    }

    fn evaluate_2(&self, points: &[Point<T, 2>], hessians: &mut [[SMatrix<T, 2, 2>; 2]]) {
        assert_eq!(points.len(), hessians.len());
        for (hessian, point) in hessians.iter_mut().zip(points) {
            let (r, theta) = (point[0], point[1]);
            let (sin, cos) = theta.sin_cos();
            let zero = T::zero();
            *hessian = [
                SMatrix::<T, 2, 2>::new(zero, -sin, -sin, -r * cos),
                SMatrix::<T, 2, 2>::new(zero, cos, cos, -r * sin),
            ];
        }
    }
}
