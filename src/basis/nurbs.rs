use crate::basis::{refine_coefficients, SplineSpace};
use crate::cache::ValueTable;
use crate::grid::Grid;
use crate::{Error, Real};
use nalgebra::{SMatrix, SVector};

/// Rational splines: B-splines of a spline space weighted by one positive weight per global
/// function and normalized by their weighted sum.
#[derive(Debug, Clone)]
pub struct Nurbs<'a, T, const D: usize> {
    space: SplineSpace<'a, T, D>,
    weights: Vec<T>,
}

impl<'a, T: Real, const D: usize> Nurbs<'a, T, D> {
    /// Returns [`Error::InvalidWeights`] unless there is one positive, finite weight per global
    /// function of the space.
    pub fn new(space: SplineSpace<'a, T, D>, weights: Vec<T>) -> eyre::Result<Self> {
        if weights.len() != space.num_dofs() {
            return Err(Error::InvalidWeights(format!(
                "expected {} weights, got {}",
                space.num_dofs(),
                weights.len()
            ))
            .into());
        }
        if let Some(index) = weights
            .iter()
            .position(|w| !w.is_finite() || *w <= T::zero())
        {
            return Err(Error::InvalidWeights(format!("weight {} is not positive", index)).into());
        }
        Ok(Self { space, weights })
    }

    /// NURBS with all weights equal to one, which coincide with the B-splines of the space.
    pub fn with_unit_weights(space: SplineSpace<'a, T, D>) -> Self {
        let weights = vec![T::one(); space.num_dofs()];
        Self { space, weights }
    }

    pub fn space(&self) -> &SplineSpace<'a, T, D> {
        &self.space
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    /// Weights of the functions that do not vanish on element `flat`, in local order.
    pub fn local_weights(&self, flat: usize) -> Vec<T> {
        let offset = self.space.dof_distribution().offset();
        self.space
            .local_to_global(flat)
            .into_iter()
            .map(|global| self.weights[global - offset])
            .collect()
    }

    /// The NURBS on a refinement of the grid, with the weights of the refined space chosen so
    /// that the weight function `W` is unchanged.
    pub fn refine_to<'b>(&self, fine: &'b Grid<T, D>) -> eyre::Result<Nurbs<'b, T, D>> {
        let space = self.space.refine_to(fine)?;
        let weights = refine_coefficients(&self.space, &space, &self.weights)?;
        Nurbs::new(space, weights)
    }
}

/// Turns B-spline tables of one element into NURBS tables, in place.
///
/// With `W = sum_i w_i N_i` the rational functions are `R_i = w_i N_i / W`. Gradients and
/// Hessians follow from the quotient rule. Hessians can only be converted together with
/// gradients.
pub(crate) fn rationalize<T: Real, const D: usize>(
    local_weights: &[T],
    values: &mut ValueTable<T>,
    mut gradients: Option<&mut ValueTable<SVector<T, D>>>,
    mut hessians: Option<&mut ValueTable<SMatrix<T, D, D>>>,
) {
    assert_eq!(local_weights.len(), values.num_functions());
    assert!(
        hessians.is_none() || gradients.is_some(),
        "Internal error: NURBS Hessians need B-spline gradients"
    );
    let n_functions = values.num_functions();

    for q in 0..values.num_points() {
        let weighted_sum = (0..n_functions).fold(T::zero(), |sum, i| sum + local_weights[i] * *values.get(i, q));
        let rational: Vec<T> = (0..n_functions)
            .map(|i| local_weights[i] * *values.get(i, q) / weighted_sum)
            .collect();

        if let Some(gradients) = gradients.as_deref_mut() {
            let weighted_gradient = (0..n_functions).fold(SVector::<T, D>::zeros(), |sum, i| {
                sum + gradients.get(i, q) * local_weights[i]
            });
            let rational_gradients: Vec<SVector<T, D>> = (0..n_functions)
                .map(|i| (gradients.get(i, q) * local_weights[i] - weighted_gradient * rational[i]) / weighted_sum)
                .collect();

            if let Some(hessians) = hessians.as_deref_mut() {
                let weighted_hessian = (0..n_functions).fold(SMatrix::<T, D, D>::zeros(), |sum, i| {
                    sum + hessians.get(i, q) * local_weights[i]
                });
                for i in 0..n_functions {
                    let dr = &rational_gradients[i];
                    let h = hessians.get(i, q) * local_weights[i]
                        - dr * weighted_gradient.transpose()
                        - weighted_gradient * dr.transpose()
                        - weighted_hessian * rational[i];
                    *hessians.get_mut(i, q) = h / weighted_sum;
                }
            }
            for (i, gradient) in rational_gradients.into_iter().enumerate() {
                *gradients.get_mut(i, q) = gradient;
            }
        }
        for (i, value) in rational.into_iter().enumerate() {
            *values.get_mut(i, q) = value;
        }
    }
}
