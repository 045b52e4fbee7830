use crate::domain::{BoundaryNormals, Domain, DomainElement, ExtNormals, InvHessians, InvJacobians, Measures};
use crate::flags::{domain_element, ActivationTables};
use crate::grid::{ElementAccessor, ElementSelection};
use crate::grid_function::GridFunctionHandler;
use crate::quadrature::TensorProductQuadrature;
use crate::topology::SubElementTopology;
use crate::{Error, Real};
use log::{debug, trace};
use nalgebra::{DMatrix, SMatrix, SVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DomainSetup {
    requested: domain_element::Flags,
    flags: domain_element::CacheFlags,
    lower: domain_element::LowerFlags,
}

/// Computes geometric quantities of a domain on grid elements.
#[derive(Debug)]
pub struct DomainHandler<'a, T: Real, const D: usize, const S: usize> {
    domain: Domain<'a, T, D, S>,
    grid_function_handler: GridFunctionHandler<'a, T, D, S>,
    topologies: Vec<Option<DomainSetup>>,
}

impl<'a, T: Real, const D: usize, const S: usize> DomainHandler<'a, T, D, S> {
    pub fn new(domain: Domain<'a, T, D, S>) -> Self {
        Self::with_tables(domain, ActivationTables::standard())
    }

    pub fn with_tables(domain: Domain<'a, T, D, S>, tables: &'a ActivationTables) -> Self {
        Self {
            domain,
            grid_function_handler: GridFunctionHandler::with_tables(domain.grid_function(), tables),
            topologies: vec![None; D + 1],
        }
    }

    pub fn domain(&self) -> &Domain<'a, T, D, S> {
        &self.domain
    }

    pub fn grid_function_handler(&self) -> &GridFunctionHandler<'a, T, D, S> {
        &self.grid_function_handler
    }

    pub fn reset(&mut self, flags: domain_element::Flags, quadrature: &TensorProductQuadrature<T>) -> eyre::Result<()> {
        self.reset_elements(flags, quadrature, ElementSelection::Active)
    }

    pub fn reset_one_element(
        &mut self,
        flags: domain_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        element: usize,
    ) -> eyre::Result<()> {
        self.reset_selected_elements(flags, quadrature, [element])
    }

    pub fn reset_selected_elements(
        &mut self,
        flags: domain_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        elements: impl IntoIterator<Item = usize>,
    ) -> eyre::Result<()> {
        self.reset_elements(flags, quadrature, ElementSelection::from_elements(elements))
    }

    pub(crate) fn reset_elements(
        &mut self,
        flags: domain_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        selection: ElementSelection,
    ) -> eyre::Result<()> {
        let k = quadrature.dim();
        if k > D {
            return Err(Error::SubElementDimensionOutOfRange { k, dim: D }.into());
        }
        if S < D {
            return Err(Error::DimensionMismatch {
                what: "domain space dimension",
                expected: D,
                actual: S,
            }
            .into());
        }
        let setup = match self.topologies[k] {
            Some(setup) if setup.requested == flags => {
                trace!("Domain handler: dimension {} unchanged", k);
                setup
            }
            _ => {
                let activation = self.grid_function_handler.grid_handler().tables().domain.activate(flags)?;
                validate_combination::<D, S>(flags, k)?;
                let setup = DomainSetup {
                    requested: flags,
                    flags: activation.cache,
                    lower: activation.lower,
                };
                self.topologies[k] = Some(setup);
                debug!(
                    "Domain handler reset for dimension {}: {:?}, grid function {:?}, grid {:?}",
                    k, setup.flags, setup.lower.grid_function, setup.lower.grid
                );
                setup
            }
        };
        self.grid_function_handler
            .reset_with_grid_flags(setup.lower.grid_function, setup.lower.grid, quadrature, selection)
    }

    pub fn flags(&self, k: usize) -> Option<domain_element::CacheFlags> {
        self.topologies.get(k)?.map(|setup| setup.flags)
    }

    pub fn init_cache(&self, element: &mut DomainElement<'_, T, D, S>, k: usize) -> eyre::Result<()> {
        self.grid_function_handler
            .init_cache(element.grid_function_element_mut(), k)?;
        let flags = self.flags(k).unwrap_or(domain_element::CacheFlags::NONE);
        let n_points = self
            .grid_function_handler
            .grid_handler()
            .quadratures(k)?
            .num_points();
        element.cache().borrow_mut().init(k, flags, n_points, 1);
        Ok(())
    }

    /// Computes the requested domain quantities on sub-element `j` of dimension `k`.
    ///
    /// Returns [`Error::SingularJacobian`] if an inverse Jacobian is requested at a point where
    /// the Jacobian does not have full rank.
    ///
    /// # Panics
    ///
    /// Panics if the element is not selected or its cache has not been initialized for `k`.
    pub fn fill_cache(&self, element: &mut DomainElement<'_, T, D, S>, k: usize, j: usize) -> eyre::Result<()> {
        self.grid_function_handler
            .fill_cache(element.grid_function_element_mut(), k, j)?;
        let flags = self.flags(k).unwrap_or(domain_element::CacheFlags::NONE);
        if flags.is_empty() {
            return Ok(());
        }
        use domain_element::CacheFlags;
        let flat = element.flat_index();
        let sub_element = self
            .grid_function_handler
            .grid_handler()
            .quadratures(k)?
            .sub_element(j)
            .clone();
        let jacobians = element.jacobians(k, j);
        let mut cache = element.cache().borrow_mut();

        if flags.contains(CacheFlags::MEASURE) {
            cache.fill::<Measures, _>(k, j, |measures| {
                measures.assign(|_, q| sub_element_measure(&jacobians[q], &sub_element))
            });
        }

        if flags.contains(CacheFlags::INV_JACOBIAN) {
            let inverses = jacobians
                .iter()
                .map(|jacobian| left_inverse(jacobian).ok_or(Error::SingularJacobian { element: flat }))
                .collect::<Result<Vec<_>, _>>()?;
            cache.fill::<InvJacobians, _>(k, j, |table| table.function_values_mut(0).copy_from_slice(&inverses));
        }

        if flags.contains(CacheFlags::INV_HESSIAN) {
            let hessians = element.hessians(k, j);
            let inv_hessians: Vec<_> = {
                let inv_jacobians = cache.get::<InvJacobians>(k, j).function_values(0);
                inv_jacobians
                    .iter()
                    .zip(hessians.iter())
                    .map(|(inv_jacobian, hessian)| inverse_map_hessians(inv_jacobian, hessian))
                    .collect()
            };
            cache.fill::<InvHessians, _>(k, j, |table| table.function_values_mut(0).copy_from_slice(&inv_hessians));
        }

        if flags.contains(CacheFlags::EXT_NORMAL) {
            cache.fill::<ExtNormals, _>(k, j, |normals| normals.assign(|_, q| exterior_normal(&jacobians[q])));
        }

        if flags.contains(CacheFlags::BOUNDARY_NORMAL) {
            let reference_normal: SVector<T, D> = sub_element
                .reference_normal()
                .expect("Internal error: boundary normals are only configured on faces");
            let normals: Vec<SVector<T, S>> = cache
                .get::<InvJacobians>(k, j)
                .function_values(0)
                .iter()
                .map(|inv_jacobian| (inv_jacobian.transpose() * reference_normal).normalize())
                .collect();
            cache.fill::<BoundaryNormals, _>(k, j, |table| table.function_values_mut(0).copy_from_slice(&normals));
        }
        Ok(())
    }
}

/// Rejects requests that cannot be satisfied for the given dimensions.
fn validate_combination<const D: usize, const S: usize>(flags: domain_element::Flags, k: usize) -> Result<(), Error> {
    use domain_element::Flags;
    if flags.contains(Flags::EXT_NORMAL) && S != D + 1 {
        return Err(Error::UnsupportedCombination {
            layer: "domain",
            reason: format!(
                "exterior normals require a codimension-one domain, got dimension {} in space {}",
                D, S
            ),
        });
    }
    if flags.contains(Flags::BOUNDARY_NORMAL) && (S != D || k + 1 != D) {
        return Err(Error::UnsupportedCombination {
            layer: "domain",
            reason: format!(
                "boundary normals require faces (dimension {}) of a codimension-zero domain, \
                 got dimension {} in space {}",
                D.saturating_sub(1),
                k,
                S
            ),
        });
    }
    Ok(())
}

/// Measure of the Jacobian restricted to the active directions of a sub-element:
/// `sqrt(det(J_a^T J_a))`.
pub(crate) fn sub_element_measure<T: Real, const D: usize, const S: usize>(
    jacobian: &SMatrix<T, S, D>,
    sub_element: &SubElementTopology<D>,
) -> T {
    let active = sub_element.active_directions();
    if active.is_empty() {
        return T::one();
    }
    let restricted = DMatrix::from_fn(S, active.len(), |r, c| jacobian[(r, active[c])]);
    let gram = restricted.transpose() * &restricted;
    gram.determinant().abs().sqrt()
}

/// The left inverse `(J^T J)^{-1} J^T`, which is the inverse for square Jacobians.
pub(crate) fn left_inverse<T: Real, const D: usize, const S: usize>(
    jacobian: &SMatrix<T, S, D>,
) -> Option<SMatrix<T, D, S>> {
    let j = DMatrix::from_fn(S, D, |r, c| jacobian[(r, c)]);
    let gram_inverse = (j.transpose() * &j).try_inverse()?;
    let inverse = gram_inverse * j.transpose();
    if inverse.iter().any(|x| !x.is_finite()) {
        return None;
    }
    Some(SMatrix::from_fn(|r, c| inverse[(r, c)]))
}

/// Hessians of the components of the inverse map:
/// `H^-1_c = -sum_s Jinv[c, s] Jinv^T H_s Jinv`.
pub(crate) fn inverse_map_hessians<T: Real, const D: usize, const S: usize>(
    inv_jacobian: &SMatrix<T, D, S>,
    hessians: &[SMatrix<T, D, D>; S],
) -> [SMatrix<T, S, S>; D] {
    let pulled_back: [SMatrix<T, S, S>; S] =
        std::array::from_fn(|s| inv_jacobian.transpose() * hessians[s] * inv_jacobian);
    std::array::from_fn(|c| {
        let mut result = SMatrix::<T, S, S>::zeros();
        for s in 0..S {
            result -= pulled_back[s] * inv_jacobian[(c, s)];
        }
        result
    })
}

/// Unit normal of a codimension-one map, built from the signed maximal minors of the Jacobian.
pub(crate) fn exterior_normal<T: Real, const D: usize, const S: usize>(jacobian: &SMatrix<T, S, D>) -> SVector<T, S> {
    let normal = SVector::<T, S>::from_fn(|i, _| {
        let minor = DMatrix::from_fn(D, D, |r, c| {
            let row = if r < i { r } else { r + 1 };
            jacobian[(row, c)]
        });
        let sign = if i % 2 == 0 { T::one() } else { -T::one() };
        sign * minor.determinant()
    });
    normal.normalize()
}
