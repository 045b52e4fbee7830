//! Representation of coarse splines in the space of a refined grid.
//!
//! A space built by [`SplineSpace::refine_to`] contains the coarse space, so every coarse
//! B-spline is a combination of fine B-splines. In each direction the coefficients of these
//! combinations form a refinement matrix `R` with `N_i = sum_j R[(j, i)] N'_j`. The matrix is
//! computed by collocating both spaces at the Greville abscissae of the fine space.
use crate::basis::{evaluate_univariate, EndBehaviour, SplineSpace};
use crate::topology::TensorIndexer;
use crate::{Error, Real};
use eyre::eyre;
use log::debug;
use nalgebra::DMatrix;

/// Direction-wise indices and values of the functions that do not vanish at `x`.
fn univariate_values<T: Real, const D: usize>(
    space: &SplineSpace<'_, T, D>,
    direction: usize,
    x: T,
) -> Vec<(usize, T)> {
    let degree = space.degree()[direction];
    let breaks = space.grid().knots(direction);
    let n_intervals = breaks.len() - 1;
    let interval = breaks[1..n_intervals].partition_point(|t| *t <= x);
    let n_basis = space.dof_distribution().num_basis_per_direction()[direction];
    let values = evaluate_univariate(space.knots(direction), degree, interval + degree, x, 0);
    (0..=degree)
        .map(|l| ((interval + l) % n_basis, values[(0, l)]))
        .collect()
}

/// Greville abscissae of the functions of one direction, wrapped into the parametric interval
/// in periodic directions.
fn collocation_points<T: Real, const D: usize>(space: &SplineSpace<'_, T, D>, direction: usize) -> Vec<T> {
    let degree = space.degree()[direction];
    let knots = space.knots(direction);
    let breaks = space.grid().knots(direction);
    let (first, last) = (breaks[0], breaks[breaks.len() - 1]);
    let n_basis = space.dof_distribution().num_basis_per_direction()[direction];
    let p = T::from_usize(degree).expect("literal must fit in T");
    (0..n_basis)
        .map(|i| {
            let x = knots[i + 1..=i + degree]
                .iter()
                .fold(T::zero(), |sum, &t| sum + t)
                / p;
            match space.end_behaviour()[direction] {
                EndBehaviour::Periodic if x < first => x + (last - first),
                _ => x,
            }
        })
        .collect()
}

fn check_compatible<T: Real, const D: usize>(
    coarse: &SplineSpace<'_, T, D>,
    fine: &SplineSpace<'_, T, D>,
) -> eyre::Result<()> {
    if coarse.degree() != fine.degree() || coarse.end_behaviour() != fine.end_behaviour() {
        return Err(Error::UnsupportedCombination {
            layer: "basis",
            reason: "refinement keeps the degree and end behaviour of the space".to_string(),
        }
        .into());
    }
    Ok(())
}

/// The refinement matrix of one direction, with one row per fine and one column per coarse
/// function.
///
/// `fine` must be a refinement of `coarse` as built by [`SplineSpace::refine_to`].
pub fn refinement_matrix<T: Real, const D: usize>(
    coarse: &SplineSpace<'_, T, D>,
    fine: &SplineSpace<'_, T, D>,
    direction: usize,
) -> eyre::Result<DMatrix<T>> {
    check_compatible(coarse, fine)?;
    let n_fine = fine.dof_distribution().num_basis_per_direction()[direction];
    let n_coarse = coarse.dof_distribution().num_basis_per_direction()[direction];
    let mut fine_values = DMatrix::zeros(n_fine, n_fine);
    let mut coarse_values = DMatrix::zeros(n_fine, n_coarse);
    for (row, x) in collocation_points(fine, direction).into_iter().enumerate() {
        for (i, value) in univariate_values(fine, direction, x) {
            fine_values[(row, i)] += value;
        }
        for (i, value) in univariate_values(coarse, direction, x) {
            coarse_values[(row, i)] += value;
        }
    }
    fine_values
        .lu()
        .solve(&coarse_values)
        .ok_or_else(|| eyre!("Internal error: collocation matrix in direction {direction} is singular"))
}

/// Coefficients in `fine` of the spline with the given coefficients in `coarse`.
///
/// Coefficients are indexed by global index minus the dof offset, as NURBS weights are.
pub fn refine_coefficients<T: Real, const D: usize>(
    coarse: &SplineSpace<'_, T, D>,
    fine: &SplineSpace<'_, T, D>,
    coefficients: &[T],
) -> eyre::Result<Vec<T>> {
    if coefficients.len() != coarse.num_dofs() {
        return Err(Error::DimensionMismatch {
            what: "spline coefficients",
            expected: coarse.num_dofs(),
            actual: coefficients.len(),
        }
        .into());
    }
    let matrices = (0..D)
        .map(|d| refinement_matrix(coarse, fine, d))
        .collect::<eyre::Result<Vec<_>>>()?;

    // Apply the matrices one direction at a time
    let mut values = coefficients.to_vec();
    let mut extents = *coarse.dof_distribution().num_basis_per_direction();
    for (d, matrix) in matrices.iter().enumerate() {
        let source = TensorIndexer::new(extents);
        extents[d] = matrix.nrows();
        let target = TensorIndexer::new(extents);
        values = target
            .iter()
            .map(|tensor| {
                let mut index = tensor;
                (0..matrix.ncols()).fold(T::zero(), |sum, i| {
                    index[d] = i;
                    sum + matrix[(tensor[d], i)] * values[source.to_flat(&index)]
                })
            })
            .collect();
    }
    debug!(
        "Refined {} coefficients into {} coefficients",
        coefficients.len(),
        values.len()
    );
    Ok(values)
}
