//! Univariate B-spline evaluation and the global cache of one-dimensional tables.
use crate::basis::SplineSpace;
use crate::grid::SubElementQuadratures;
use crate::topology::n_sub_elements;
use crate::Real;
use log::debug;
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

/// Derivatives of the `p + 1` B-splines that do not vanish on the knot span `span` at `x`.
///
/// Row `r` of the result holds the `r`-th derivatives, column `i` the function with global
/// index `span - p + i`. Derivatives of order larger than `p` are zero.
///
/// This is algorithm A2.3 of Piegl and Tiller, *The NURBS Book*.
pub fn evaluate_univariate<T: Real>(knots: &[T], degree: usize, span: usize, x: T, max_order: usize) -> DMatrix<T> {
    let p = degree;
    assert!(
        span >= p && span + p < knots.len(),
        "knot span {} is out of range for degree {} and {} knots",
        span,
        p,
        knots.len()
    );
    let mut ders = DMatrix::zeros(max_order + 1, p + 1);

    let mut ndu = DMatrix::<T>::zeros(p + 1, p + 1);
    let mut left = vec![T::zero(); p + 1];
    let mut right = vec![T::zero(); p + 1];
    ndu[(0, 0)] = T::one();
    for j in 1..=p {
        left[j] = x - knots[span + 1 - j];
        right[j] = knots[span + j] - x;
        let mut saved = T::zero();
        for r in 0..j {
            ndu[(j, r)] = right[r + 1] + left[j - r];
            let temp = ndu[(r, j - 1)] / ndu[(j, r)];
            ndu[(r, j)] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        ndu[(j, j)] = saved;
    }
    for j in 0..=p {
        ders[(0, j)] = ndu[(j, p)];
    }

    let n = max_order.min(p);
    let mut a = DMatrix::<T>::zeros(2, p + 1);
    for r in 0..=p {
        let (mut s1, mut s2) = (0, 1);
        a[(0, 0)] = T::one();
        for k in 1..=n {
            let mut d = T::zero();
            let rk = r as isize - k as isize;
            let pk = p - k;
            if rk >= 0 {
                let rk = rk as usize;
                a[(s2, 0)] = a[(s1, 0)] / ndu[(pk + 1, rk)];
                d = a[(s2, 0)] * ndu[(rk, pk)];
            }
            let j1 = if rk >= -1 { 1 } else { (-rk) as usize };
            let j2 = if r as isize - 1 <= pk as isize { k - 1 } else { p - r };
            for j in j1..=j2 {
                let row = (rk + j as isize) as usize;
                a[(s2, j)] = (a[(s1, j)] - a[(s1, j - 1)]) / ndu[(pk + 1, row)];
                d += a[(s2, j)] * ndu[(row, pk)];
            }
            if r <= pk {
                a[(s2, k)] = -a[(s1, k - 1)] / ndu[(pk + 1, r)];
                d += a[(s2, k)] * ndu[(r, pk)];
            }
            ders[(k, r)] = d;
            std::mem::swap(&mut s1, &mut s2);
        }
    }

    let mut factor = T::one();
    for k in 1..=n {
        factor *= nalgebra::convert::<f64, T>((p + 1 - k) as f64);
        for j in 0..=p {
            ders[(k, j)] *= factor;
        }
    }
    ders
}

/// Derivatives of the B-splines that do not vanish on `interval` of direction `direction`, at
/// points given in the reference interval `[0, 1]`.
///
/// Entry `r` of the result is a `(p + 1) x n_points` matrix of `r`-th derivatives with respect
/// to the parametric coordinate.
pub fn evaluate_at_points<T: Real, const D: usize>(
    space: &SplineSpace<'_, T, D>,
    direction: usize,
    interval: usize,
    reference_points: &[T],
    max_order: usize,
) -> Vec<DMatrix<T>> {
    let degree = space.degree()[direction];
    let knots = space.knots(direction);
    let grid = space.grid();
    let start = grid.knots(direction)[interval];
    let length = grid.interval_length(direction, interval);
    let span = interval + degree;

    let mut tables = vec![DMatrix::zeros(degree + 1, reference_points.len()); max_order + 1];
    for (q, &xi) in reference_points.iter().enumerate() {
        let derivatives = evaluate_univariate(knots, degree, span, start + length * xi, max_order);
        for (order, table) in tables.iter_mut().enumerate() {
            table.set_column(q, &derivatives.row(order).transpose());
        }
    }
    tables
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct UnivariateKey {
    sub_element: usize,
    direction: usize,
    interval: usize,
}

/// One-dimensional B-spline tables for every sub-element, direction and interval touched by a
/// selection of elements, for the quadrature of one sub-element dimension.
#[derive(Debug, Clone, Default)]
pub struct UnivariateCache<T> {
    max_order: usize,
    tables: FxHashMap<UnivariateKey, Vec<DMatrix<T>>>,
}

impl<T: Real> UnivariateCache<T> {
    pub(crate) fn build<const D: usize>(
        space: &SplineSpace<'_, T, D>,
        quadratures: &SubElementQuadratures<T, D>,
        elements: &BTreeSet<usize>,
        max_order: usize,
    ) -> Self {
        let grid = space.grid();
        let mut intervals = vec![BTreeSet::new(); D];
        for &flat in elements {
            let tensor = grid.flat_to_tensor(flat);
            for d in 0..D {
                intervals[d].insert(tensor[d]);
            }
        }

        let k = quadratures.quadrature().dim();
        let mut tables = FxHashMap::default();
        for sub_element in 0..n_sub_elements(D, k) {
            let quadrature = quadratures.extended(sub_element);
            for (direction, direction_intervals) in intervals.iter().enumerate() {
                let points = quadrature.rule(direction).points();
                for &interval in direction_intervals {
                    let key = UnivariateKey {
                        sub_element,
                        direction,
                        interval,
                    };
                    tables.insert(key, evaluate_at_points(space, direction, interval, points, max_order));
                }
            }
        }
        debug!(
            "Built {} univariate B-spline tables up to derivative order {} for dimension {}",
            tables.len(),
            max_order,
            k
        );
        Self { max_order, tables }
    }

    pub fn max_order(&self) -> usize {
        self.max_order
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables of sub-element `sub_element` in the given direction and interval, one matrix per
    /// derivative order.
    pub fn tables(&self, sub_element: usize, direction: usize, interval: usize) -> Option<&[DMatrix<T>]> {
        self.tables
            .get(&UnivariateKey {
                sub_element,
                direction,
                interval,
            })
            .map(Vec::as_slice)
    }
}
