//! Tensor-product quadrature rules on the reference hypercube `[0, 1]^d`.
use crate::topology::SubElementTopology;
use crate::{Error, Real};
use itertools::Itertools;
use nalgebra::{convert, Point};
use num::Zero;
use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, Mul};

/// A quadrature rule on `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadratureRule1d<T> {
    points: Vec<T>,
    weights: Vec<T>,
}

impl<T: Real> QuadratureRule1d<T> {
    pub fn new(points: Vec<T>, weights: Vec<T>) -> eyre::Result<Self> {
        if points.len() != weights.len() {
            return Err(Error::DimensionMismatch {
                what: "quadrature weights",
                expected: points.len(),
                actual: weights.len(),
            }
            .into());
        }
        Ok(Self { points, weights })
    }

    /// The Gauss–Legendre rule with `num_points` points, mapped to `[0, 1]`, with points in
    /// increasing order.
    ///
    /// # Panics
    ///
    /// Panics if zero points are requested.
    pub fn gauss(num_points: usize) -> Self {
        let (weights, points) = fenris_quadrature::univariate::gauss(num_points);
        // x -> (x + 1) / 2 on [-1, 1] halves the weights
        let (points, weights) = points
            .into_iter()
            .zip(weights)
            .map(|([x], w)| (0.5 * (x + 1.0), 0.5 * w))
            .sorted_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(x, w)| (convert::<f64, T>(x), convert::<f64, T>(w)))
            .unzip();
        Self { points, weights }
    }

    /// The rule consisting of the single point `x` with unit weight.
    pub fn single_point(x: T) -> Self {
        Self {
            points: vec![x],
            weights: vec![T::one()],
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[T] {
        &self.points
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }
}

/// A quadrature rule on `[0, 1]^d` given as the product of one rule per direction.
///
/// Points are numbered with the first direction varying fastest. A rule of dimension zero has a
/// single point with unit weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorProductQuadrature<T> {
    rules: Vec<QuadratureRule1d<T>>,
}

impl<T: Real> TensorProductQuadrature<T> {
    pub fn from_rules(rules: Vec<QuadratureRule1d<T>>) -> Self {
        Self { rules }
    }

    /// Gauss rule with `num_points` points in each of `dim` directions.
    pub fn gauss(dim: usize, num_points: usize) -> Self {
        Self::gauss_with_points(&vec![num_points; dim])
    }

    /// Gauss rule with the given number of points per direction.
    pub fn gauss_with_points(num_points: &[usize]) -> Self {
        Self {
            rules: num_points
                .iter()
                .map(|&n| QuadratureRule1d::gauss(n))
                .collect(),
        }
    }

    pub fn dim(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[QuadratureRule1d<T>] {
        &self.rules
    }

    pub fn rule(&self, direction: usize) -> &QuadratureRule1d<T> {
        &self.rules[direction]
    }

    pub fn num_points_per_direction(&self) -> Vec<usize> {
        self.rules.iter().map(QuadratureRule1d::len).collect()
    }

    pub fn num_points(&self) -> usize {
        self.rules.iter().map(QuadratureRule1d::len).product()
    }

    /// Per-direction indices of the `i`-th point.
    fn point_indices(&self, i: usize) -> Vec<usize> {
        let n = self.num_points();
        assert!(i < n, "quadrature point {} is out of range: valid range is [0, {})", i, n);
        let mut remainder = i;
        self.rules
            .iter()
            .map(|rule| {
                let index = remainder % rule.len();
                remainder /= rule.len();
                index
            })
            .collect()
    }

    /// The `i`-th point.
    ///
    /// # Panics
    ///
    /// Panics if `D` differs from the dimension of the rule or if `i` is out of range.
    pub fn point<const D: usize>(&self, i: usize) -> Point<T, D> {
        assert_eq!(
            D,
            self.dim(),
            "requested {}-dimensional point from a {}-dimensional quadrature",
            D,
            self.dim()
        );
        let indices = self.point_indices(i);
        Point::from(std::array::from_fn(|d| self.rules[d].points[indices[d]]))
    }

    pub fn points<const D: usize>(&self) -> Vec<Point<T, D>> {
        (0..self.num_points()).map(|i| self.point(i)).collect()
    }

    pub fn weight(&self, i: usize) -> T {
        let indices = self.point_indices(i);
        self.rules
            .iter()
            .zip(indices)
            .fold(T::one(), |w, (rule, index)| w * rule.weights[index])
    }

    pub fn weights(&self) -> Vec<T> {
        (0..self.num_points()).map(|i| self.weight(i)).collect()
    }

    /// Approximates the integral over `[0, 1]^D` of the given function.
    pub fn integrate<const D: usize, U, F>(&self, f: F) -> U
    where
        F: Fn(&Point<T, D>) -> U,
        U: Zero + Mul<T, Output = U> + AddAssign<U>,
    {
        let mut integral = U::zero();
        for i in 0..self.num_points() {
            integral += f(&self.point(i)) * self.weight(i);
        }
        integral
    }

    /// Embeds this `k`-dimensional rule into the `D`-dimensional unit element on the given
    /// sub-element.
    ///
    /// Active directions receive the rules of this quadrature in order; each constant direction
    /// receives the single point 0 or 1 with unit weight.
    pub fn extend_to_sub_element<const D: usize>(
        &self,
        sub_element: &SubElementTopology<D>,
    ) -> eyre::Result<TensorProductQuadrature<T>> {
        if self.dim() != sub_element.dim() {
            return Err(Error::DimensionMismatch {
                what: "sub-element quadrature",
                expected: sub_element.dim(),
                actual: self.dim(),
            }
            .into());
        }
        let mut rules = vec![QuadratureRule1d::single_point(T::zero()); D];
        for (rule, &direction) in self.rules.iter().zip(sub_element.active_directions()) {
            rules[direction] = rule.clone();
        }
        for (&direction, &value) in sub_element
            .constant_directions()
            .iter()
            .zip(sub_element.constant_values())
        {
            let x = if value == 0 { T::zero() } else { T::one() };
            rules[direction] = QuadratureRule1d::single_point(x);
        }
        Ok(TensorProductQuadrature { rules })
    }
}
