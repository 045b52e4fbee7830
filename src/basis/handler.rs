use crate::basis::nurbs::rationalize;
use crate::basis::{
    Basis, BasisElement, BasisGradients, BasisHessians, BasisRefGradients, BasisRefHessians, BasisValues, Nurbs,
    ReferenceBasis, SplineSpace, TensorProductEvaluator, UnivariateCache,
};
use crate::cache::ValueTable;
use crate::domain::DomainHandler;
use crate::flags::{basis_element, domain_element, ActivationTables};
use crate::grid::{ElementAccessor, ElementSelection, SubElementQuadratures};
use crate::quadrature::TensorProductQuadrature;
use crate::{Error, Real};
use log::{debug, trace};
use nalgebra::{SMatrix, SVector};
use std::collections::BTreeSet;

/// Basis quantities on the parametric element.
#[derive(Debug, Clone)]
pub struct ReferenceValues<T, const D: usize> {
    pub values: ValueTable<T>,
    pub gradients: Option<ValueTable<SVector<T, D>>>,
    pub hessians: Option<ValueTable<SMatrix<T, D, D>>>,
}

/// Evaluation of a reference basis on the sub-elements of grid elements.
pub(crate) trait ReferenceEvaluator<T: Real, const D: usize> {
    /// Prepares the global tables of dimension `k` for the given elements, with derivatives up
    /// to `max_order`.
    fn reset(&mut self, quadratures: &SubElementQuadratures<T, D>, elements: &BTreeSet<usize>, max_order: usize);

    /// Evaluates values and the derivatives prepared at reset on sub-element `j` of dimension
    /// `k` of element `flat`.
    fn evaluate(&self, flat: usize, k: usize, j: usize) -> ReferenceValues<T, D>;
}

/// Tensor-product B-spline evaluation from global univariate tables.
#[derive(Debug)]
pub struct BSplineElementHandler<'a, T: Real, const D: usize> {
    space: &'a SplineSpace<'a, T, D>,
    univariate: Vec<Option<UnivariateCache<T>>>,
}

impl<'a, T: Real, const D: usize> BSplineElementHandler<'a, T, D> {
    pub fn new(space: &'a SplineSpace<'a, T, D>) -> Self {
        Self {
            space,
            univariate: vec![None; D + 1],
        }
    }

    pub fn univariate_cache(&self, k: usize) -> Option<&UnivariateCache<T>> {
        self.univariate.get(k)?.as_ref()
    }
}

impl<'a, T: Real, const D: usize> ReferenceEvaluator<T, D> for BSplineElementHandler<'a, T, D> {
    fn reset(&mut self, quadratures: &SubElementQuadratures<T, D>, elements: &BTreeSet<usize>, max_order: usize) {
        let k = quadratures.quadrature().dim();
        self.univariate[k] = Some(UnivariateCache::build(self.space, quadratures, elements, max_order));
    }

    fn evaluate(&self, flat: usize, k: usize, j: usize) -> ReferenceValues<T, D> {
        let cache = self.univariate[k]
            .as_ref()
            .expect("Internal error: univariate tables are built at reset");
        let element = self.space.grid().flat_to_tensor(flat);
        let tables = std::array::from_fn(|d| {
            cache
                .tables(j, d, element[d])
                .expect("Internal error: univariate tables exist for every selected element")
        });
        let evaluator = TensorProductEvaluator::new(tables);
        let max_order = cache.max_order();
        ReferenceValues {
            values: evaluator.values(),
            gradients: (max_order >= 1).then(|| evaluator.gradients()),
            hessians: (max_order >= 2).then(|| evaluator.hessians()),
        }
    }
}

/// NURBS evaluation: B-spline evaluation followed by the rational correction.
#[derive(Debug)]
pub struct NurbsElementHandler<'a, T: Real, const D: usize> {
    nurbs: &'a Nurbs<'a, T, D>,
    bspline: BSplineElementHandler<'a, T, D>,
}

impl<'a, T: Real, const D: usize> NurbsElementHandler<'a, T, D> {
    pub fn new(nurbs: &'a Nurbs<'a, T, D>) -> Self {
        Self {
            nurbs,
            bspline: BSplineElementHandler::new(nurbs.space()),
        }
    }
}

impl<'a, T: Real, const D: usize> ReferenceEvaluator<T, D> for NurbsElementHandler<'a, T, D> {
    fn reset(&mut self, quadratures: &SubElementQuadratures<T, D>, elements: &BTreeSet<usize>, max_order: usize) {
        self.bspline.reset(quadratures, elements, max_order);
    }

    fn evaluate(&self, flat: usize, k: usize, j: usize) -> ReferenceValues<T, D> {
        let mut reference = self.bspline.evaluate(flat, k, j);
        rationalize(
            &self.nurbs.local_weights(flat),
            &mut reference.values,
            reference.gradients.as_mut(),
            reference.hessians.as_mut(),
        );
        reference
    }
}

/// The evaluation strategy of a basis handler, chosen once from the kind of reference basis.
#[derive(Debug)]
pub enum ReferenceElementHandler<'a, T: Real, const D: usize> {
    BSpline(BSplineElementHandler<'a, T, D>),
    Nurbs(NurbsElementHandler<'a, T, D>),
}

impl<'a, T: Real, const D: usize> ReferenceElementHandler<'a, T, D> {
    pub fn create(reference: &'a ReferenceBasis<'a, T, D>) -> Self {
        match reference {
            ReferenceBasis::BSpline(space) => Self::BSpline(BSplineElementHandler::new(space)),
            ReferenceBasis::Nurbs(nurbs) => Self::Nurbs(NurbsElementHandler::new(nurbs)),
        }
    }
}

impl<'a, T: Real, const D: usize> ReferenceEvaluator<T, D> for ReferenceElementHandler<'a, T, D> {
    fn reset(&mut self, quadratures: &SubElementQuadratures<T, D>, elements: &BTreeSet<usize>, max_order: usize) {
        match self {
            Self::BSpline(handler) => handler.reset(quadratures, elements, max_order),
            Self::Nurbs(handler) => handler.reset(quadratures, elements, max_order),
        }
    }

    fn evaluate(&self, flat: usize, k: usize, j: usize) -> ReferenceValues<T, D> {
        match self {
            Self::BSpline(handler) => handler.evaluate(flat, k, j),
            Self::Nurbs(handler) => handler.evaluate(flat, k, j),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BasisSetup {
    requested: basis_element::Flags,
    flags: basis_element::CacheFlags,
    lower: domain_element::Flags,
}

impl BasisSetup {
    /// Highest reference derivative the cache flags need, if any reference quantity is needed.
    fn max_order(&self) -> Option<usize> {
        use basis_element::CacheFlags;
        if self.flags.contains(CacheFlags::REF_HESSIAN) {
            Some(2)
        } else if self.flags.contains(CacheFlags::REF_GRADIENT) {
            Some(1)
        } else if self.flags.contains(CacheFlags::VALUE) {
            Some(0)
        } else {
            None
        }
    }
}

/// Computes basis quantities on the elements of a basis.
///
/// Gradients and Hessians are pushed forward from the parametric element to the domain:
/// `grad = J^-T grad_ref` and `H = J^-T H_ref J^-1 + sum_c grad_ref[c] H^-1_c`, where `H^-1_c`
/// is the Hessian of the `c`-th component of the inverse map.
#[derive(Debug)]
pub struct BasisHandler<'a, T: Real, const D: usize, const S: usize> {
    basis: &'a Basis<'a, T, D, S>,
    domain_handler: DomainHandler<'a, T, D, S>,
    reference: ReferenceElementHandler<'a, T, D>,
    topologies: Vec<Option<BasisSetup>>,
}

impl<'a, T: Real, const D: usize, const S: usize> BasisHandler<'a, T, D, S> {
    pub fn new(basis: &'a Basis<'a, T, D, S>) -> Self {
        Self::with_tables(basis, ActivationTables::standard())
    }

    pub fn with_tables(basis: &'a Basis<'a, T, D, S>, tables: &'a ActivationTables) -> Self {
        Self {
            basis,
            domain_handler: DomainHandler::with_tables(*basis.domain(), tables),
            reference: ReferenceElementHandler::create(basis.reference()),
            topologies: vec![None; D + 1],
        }
    }

    pub fn basis(&self) -> &'a Basis<'a, T, D, S> {
        self.basis
    }

    pub fn domain_handler(&self) -> &DomainHandler<'a, T, D, S> {
        &self.domain_handler
    }

    pub fn reference_handler(&self) -> &ReferenceElementHandler<'a, T, D> {
        &self.reference
    }

    pub fn reset(&mut self, flags: basis_element::Flags, quadrature: &TensorProductQuadrature<T>) -> eyre::Result<()> {
        self.reset_elements(flags, quadrature, ElementSelection::Active)
    }

    pub fn reset_one_element(
        &mut self,
        flags: basis_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        element: usize,
    ) -> eyre::Result<()> {
        self.reset_selected_elements(flags, quadrature, [element])
    }

    pub fn reset_selected_elements(
        &mut self,
        flags: basis_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        elements: impl IntoIterator<Item = usize>,
    ) -> eyre::Result<()> {
        self.reset_elements(flags, quadrature, ElementSelection::from_elements(elements))
    }

    fn reset_elements(
        &mut self,
        flags: basis_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        selection: ElementSelection,
    ) -> eyre::Result<()> {
        let k = quadrature.dim();
        if k > D {
            return Err(Error::SubElementDimensionOutOfRange { k, dim: D }.into());
        }
        let setup = match self.topologies[k] {
            Some(setup) if setup.requested == flags => {
                trace!("Basis handler: dimension {} unchanged", k);
                setup
            }
            _ => {
                let activation = self.grid_tables().basis.activate(flags)?;
                BasisSetup {
                    requested: flags,
                    flags: activation.cache,
                    lower: activation.lower,
                }
            }
        };
        self.domain_handler
            .reset_elements(setup.lower, quadrature, selection)?;
        if self.topologies[k] != Some(setup) {
            self.topologies[k] = Some(setup);
            debug!(
                "Basis handler reset for dimension {}: {:?}, domain {:?}",
                k, setup.flags, setup.lower
            );
        }

        if let Some(max_order) = setup.max_order() {
            let grid_handler = self.domain_handler.grid_function_handler().grid_handler();
            self.reference
                .reset(grid_handler.quadratures(k)?, grid_handler.selected_elements(k), max_order);
        }
        Ok(())
    }

    fn grid_tables(&self) -> &'a ActivationTables {
        self.domain_handler
            .grid_function_handler()
            .grid_handler()
            .tables()
    }

    pub fn flags(&self, k: usize) -> Option<basis_element::CacheFlags> {
        self.topologies.get(k)?.map(|setup| setup.flags)
    }

    pub fn init_cache(&self, element: &mut BasisElement<'_, T, D, S>, k: usize) -> eyre::Result<()> {
        self.domain_handler
            .init_cache(element.domain_element_mut(), k)?;
        let flags = self.flags(k).unwrap_or(basis_element::CacheFlags::NONE);
        let n_points = self
            .domain_handler
            .grid_function_handler()
            .grid_handler()
            .quadratures(k)?
            .num_points();
        let n_functions = element.num_basis();
        element
            .cache()
            .borrow_mut()
            .init(k, flags, n_points, n_functions);
        Ok(())
    }

    /// Computes the requested basis quantities on sub-element `j` of dimension `k`.
    ///
    /// # Panics
    ///
    /// Panics if the element is not selected or its cache has not been initialized for `k`.
    pub fn fill_cache(&self, element: &mut BasisElement<'_, T, D, S>, k: usize, j: usize) -> eyre::Result<()> {
        self.domain_handler
            .fill_cache(element.domain_element_mut(), k, j)?;
        let setup = match self.topologies.get(k).copied().flatten() {
            Some(setup) => setup,
            None => return Ok(()),
        };
        if setup.max_order().is_none() {
            return Ok(());
        }

        use basis_element::CacheFlags;
        let flags = setup.flags;
        let reference = self.reference.evaluate(element.flat_index(), k, j);
        let mut cache = element.cache().borrow_mut();

        if flags.contains(CacheFlags::VALUE) {
            cache.fill::<BasisValues, _>(k, j, |table| *table = reference.values.clone());
        }
        if let Some(ref_gradients) = &reference.gradients {
            cache.fill::<BasisRefGradients, _>(k, j, |table| *table = ref_gradients.clone());
        }
        if let Some(ref_hessians) = &reference.hessians {
            cache.fill::<BasisRefHessians, _>(k, j, |table| *table = ref_hessians.clone());
        }

        if flags.contains(CacheFlags::GRADIENT) {
            let ref_gradients = reference
                .gradients
                .as_ref()
                .expect("Internal error: gradients require reference gradients");
            let inv_jacobians = element.domain_element().inv_jacobians(k, j);
            cache.fill::<BasisGradients, _>(k, j, |table| {
                table.assign(|f, q| push_forward_gradient(&inv_jacobians[q], ref_gradients.get(f, q)))
            });
        }
        if flags.contains(CacheFlags::HESSIAN) {
            let (ref_gradients, ref_hessians) = reference
                .gradients
                .as_ref()
                .zip(reference.hessians.as_ref())
                .expect("Internal error: Hessians require reference gradients and Hessians");
            let inv_jacobians = element.domain_element().inv_jacobians(k, j);
            let inv_hessians = element.domain_element().inv_hessians(k, j);
            cache.fill::<BasisHessians, _>(k, j, |table| {
                table.assign(|f, q| {
                    push_forward_hessian(
                        &inv_jacobians[q],
                        &inv_hessians[q],
                        ref_gradients.get(f, q),
                        ref_hessians.get(f, q),
                    )
                })
            });
        }
        Ok(())
    }
}

pub(crate) fn push_forward_gradient<T: Real, const D: usize, const S: usize>(
    inv_jacobian: &SMatrix<T, D, S>,
    ref_gradient: &SVector<T, D>,
) -> SVector<T, S> {
    inv_jacobian.transpose() * ref_gradient
}

pub(crate) fn push_forward_hessian<T: Real, const D: usize, const S: usize>(
    inv_jacobian: &SMatrix<T, D, S>,
    inv_hessian: &[SMatrix<T, S, S>; D],
    ref_gradient: &SVector<T, D>,
    ref_hessian: &SMatrix<T, D, D>,
) -> SMatrix<T, S, S> {
    let mut hessian = inv_jacobian.transpose() * ref_hessian * inv_jacobian;
    for c in 0..D {
        hessian += inv_hessian[c] * ref_gradient[c];
    }
    hessian
}
