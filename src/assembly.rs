//! Element-local matrices and vectors and their accumulation into global storage.
//!
//! Local contributions are computed from filled basis tables on the element itself (sub-element
//! dimension `D`, index 0) and scattered into a [`CooMatrix`] or [`DVector`] through the
//! element's local-to-global indices. Conversion to a compressed format is up to the consumer.
use crate::basis::{Basis, BasisElement, BasisHandler};
use crate::flags::basis_element;
use crate::function::Function;
use crate::quadrature::TensorProductQuadrature;
use crate::Real;
use itertools::izip;
use log::debug;
use nalgebra::{DMatrix, DVector, Point};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::collections::BTreeSet;

/// `K_ab = sum_q grad phi_a . grad phi_b w_q`
///
/// # Panics
///
/// Panics if gradients or weighted measures of the element have not been filled.
pub fn local_stiffness<T: Real, const D: usize, const S: usize>(element: &BasisElement<'_, T, D, S>) -> DMatrix<T> {
    let gradients = element.gradients(D, 0);
    let w_measures = element.w_measures(D, 0);
    let n = element.num_basis();
    DMatrix::from_fn(n, n, |a, b| {
        izip!(gradients.function_values(a), gradients.function_values(b), &w_measures)
            .fold(T::zero(), |sum, (grad_a, grad_b, &w)| sum + grad_a.dot(grad_b) * w)
    })
}

/// `M_ab = sum_q phi_a phi_b w_q`
///
/// # Panics
///
/// Panics if values or weighted measures of the element have not been filled.
pub fn local_mass<T: Real, const D: usize, const S: usize>(element: &BasisElement<'_, T, D, S>) -> DMatrix<T> {
    let values = element.values(D, 0);
    let w_measures = element.w_measures(D, 0);
    let n = element.num_basis();
    DMatrix::from_fn(n, n, |a, b| {
        izip!(values.function_values(a), values.function_values(b), &w_measures)
            .fold(T::zero(), |sum, (&phi_a, &phi_b, &w)| sum + phi_a * phi_b * w)
    })
}

/// `f_a = sum_q phi_a f(x_q) w_q`
///
/// # Panics
///
/// Panics if values, points or weighted measures of the element have not been filled.
pub fn local_load<T: Real, const D: usize, const S: usize>(
    element: &BasisElement<'_, T, D, S>,
    source: &dyn Function<T, S>,
) -> DVector<T> {
    let points: Vec<Point<T, S>> = element.points(D, 0);
    let mut source_values = vec![T::zero(); points.len()];
    source.evaluate_value(&points, &mut source_values);
    let values = element.values(D, 0);
    let w_measures = element.w_measures(D, 0);
    DVector::from_fn(element.num_basis(), |a, _| {
        izip!(values.function_values(a), &source_values, &w_measures)
            .fold(T::zero(), |sum, (&phi, &f, &w)| sum + phi * f * w)
    })
}

/// Adds a local matrix to a global matrix in coordinate format.
pub fn scatter_local_matrix<T: Real>(global: &mut CooMatrix<T>, dofs: &[usize], local: &DMatrix<T>) {
    assert_eq!(local.nrows(), dofs.len(), "local matrix rows must match the number of dofs");
    assert_eq!(local.ncols(), dofs.len(), "local matrix columns must match the number of dofs");
    for (a, &row) in dofs.iter().enumerate() {
        for (b, &col) in dofs.iter().enumerate() {
            global.push(row, col, local[(a, b)]);
        }
    }
}

pub fn scatter_local_vector<T: Real>(global: &mut DVector<T>, dofs: &[usize], local: &DVector<T>) {
    assert_eq!(local.len(), dofs.len(), "local vector length must match the number of dofs");
    for (a, &row) in dofs.iter().enumerate() {
        global[row] += local[a];
    }
}

/// Runs `visit` on every active element of the basis, after filling the quantities in `flags`
/// on the element itself.
pub fn for_each_element<'a, T, const D: usize, const S: usize>(
    basis: &'a Basis<'a, T, D, S>,
    flags: basis_element::Flags,
    quadrature: &TensorProductQuadrature<T>,
    mut visit: impl FnMut(&BasisElement<'a, T, D, S>) -> eyre::Result<()>,
) -> eyre::Result<()>
where
    T: Real,
{
    let mut handler = BasisHandler::new(basis);
    handler.reset(flags, quadrature)?;
    let mut element = basis.begin();
    let end = basis.end();
    let mut visited = 0;
    while element != end {
        handler.init_cache(&mut element, D)?;
        handler.fill_cache(&mut element, D, 0)?;
        visit(&element)?;
        visited += 1;
        element.advance();
    }
    debug!("Visited {} elements with {:?}", visited, flags);
    Ok(())
}

/// Offset of the global indices, which must be removed to index global storage.
fn dof_offset<T: Real, const D: usize, const S: usize>(basis: &Basis<'_, T, D, S>) -> usize {
    basis.space().dof_distribution().offset()
}

fn storage_indices(dofs: Vec<usize>, offset: usize) -> Vec<usize> {
    dofs.into_iter().map(|dof| dof - offset).collect()
}

/// The global stiffness matrix of the Laplace operator.
pub fn assemble_stiffness<'a, T: Real, const D: usize, const S: usize>(
    basis: &'a Basis<'a, T, D, S>,
    quadrature: &TensorProductQuadrature<T>,
) -> eyre::Result<CooMatrix<T>> {
    let n = basis.num_dofs();
    let offset = dof_offset(basis);
    let mut matrix = CooMatrix::new(n, n);
    let flags = basis_element::Flags::GRADIENT | basis_element::Flags::W_MEASURE;
    for_each_element(basis, flags, quadrature, |element| {
        let dofs = storage_indices(element.local_to_global(), offset);
        scatter_local_matrix(&mut matrix, &dofs, &local_stiffness(element));
        Ok(())
    })?;
    Ok(matrix)
}

/// The global mass matrix.
pub fn assemble_mass<'a, T: Real, const D: usize, const S: usize>(
    basis: &'a Basis<'a, T, D, S>,
    quadrature: &TensorProductQuadrature<T>,
) -> eyre::Result<CooMatrix<T>> {
    let n = basis.num_dofs();
    let offset = dof_offset(basis);
    let mut matrix = CooMatrix::new(n, n);
    let flags = basis_element::Flags::VALUE | basis_element::Flags::W_MEASURE;
    for_each_element(basis, flags, quadrature, |element| {
        let dofs = storage_indices(element.local_to_global(), offset);
        scatter_local_matrix(&mut matrix, &dofs, &local_mass(element));
        Ok(())
    })?;
    Ok(matrix)
}

/// The global load vector of a source term.
pub fn assemble_load<'a, T: Real, const D: usize, const S: usize>(
    basis: &'a Basis<'a, T, D, S>,
    source: &dyn Function<T, S>,
    quadrature: &TensorProductQuadrature<T>,
) -> eyre::Result<DVector<T>> {
    let offset = dof_offset(basis);
    let mut rhs = DVector::zeros(basis.num_dofs());
    let flags = basis_element::Flags::VALUE | basis_element::Flags::POINT | basis_element::Flags::W_MEASURE;
    for_each_element(basis, flags, quadrature, |element| {
        let dofs = storage_indices(element.local_to_global(), offset);
        scatter_local_vector(&mut rhs, &dofs, &local_load(element, source));
        Ok(())
    })?;
    Ok(rhs)
}

/// Imposes homogeneous Dirichlet conditions on the given rows and columns of a symmetric matrix.
///
/// Rows and columns of constrained dofs are zeroed, and their diagonal entries are set to the
/// first non-zero diagonal entry of the matrix so that the scaling of the system is kept.
pub fn apply_homogeneous_dirichlet_bc_csr<T: Real>(matrix: &mut CsrMatrix<T>, dofs: &BTreeSet<usize>) {
    let scale = matrix
        .triplet_iter()
        .find(|&(i, j, v)| i == j && *v != T::zero())
        .map(|(_, _, v)| v.abs())
        .unwrap_or_else(T::one);

    // For a symmetric matrix, a non-zero (r, c) in a constrained row r means (c, r) must be
    // zeroed as well, so only those rows need a second visit.
    let mut rows_to_visit = BTreeSet::new();
    for &row_index in dofs {
        let mut row = matrix.row_mut(row_index);
        let (cols, values) = row.cols_and_values_mut();
        for (&col_index, value) in cols.iter().zip(values) {
            if col_index == row_index {
                *value = scale;
            } else {
                *value = T::zero();
                rows_to_visit.insert(col_index);
            }
        }
    }

    for row_index in rows_to_visit.difference(dofs) {
        let mut row = matrix.row_mut(*row_index);
        let (cols, values) = row.cols_and_values_mut();
        for (col_index, value) in cols.iter().zip(values) {
            if dofs.contains(col_index) {
                *value = T::zero();
            }
        }
    }
}

pub fn apply_homogeneous_dirichlet_bc_rhs<T: Real>(rhs: &mut DVector<T>, dofs: &BTreeSet<usize>) {
    for &dof in dofs {
        rhs[dof] = T::zero();
    }
}
