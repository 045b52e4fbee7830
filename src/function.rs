//! Scalar functions defined on the physical points of a domain.
use crate::cache::{cached_quantity, copy_shared, CacheStorage, CopyPolicy, ElementCache, SharedCache, ValueTable};
use crate::domain::{Domain, DomainElement, DomainHandler};
use crate::flags::{domain_element, function_element, ActivationTables};
use crate::grid::{delegate_element_accessor, ElementIterator, ElementSelection};
use crate::quadrature::TensorProductQuadrature;
use crate::{Error, Real};
use log::{debug, trace};
use nalgebra::{Point, SMatrix, SVector};
use std::cell::Ref;
use std::fmt::Debug;

/// A scalar function `f: R^S -> R`.
pub trait Function<T: Real, const S: usize>: Debug {
    fn evaluate_value(&self, points: &[Point<T, S>], values: &mut [T]);

    fn evaluate_gradient(&self, points: &[Point<T, S>], gradients: &mut [SVector<T, S>]);

    fn evaluate_hessian(&self, points: &[Point<T, S>], hessians: &mut [SMatrix<T, S, S>]);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantFunction<T> {
    value: T,
}

impl<T: Real> ConstantFunction<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Real, const S: usize> Function<T, S> for ConstantFunction<T> {
    fn evaluate_value(&self, points: &[Point<T, S>], values: &mut [T]) {
        assert_eq!(points.len(), values.len());
        values.fill(self.value);
    }

    fn evaluate_gradient(&self, points: &[Point<T, S>], gradients: &mut [SVector<T, S>]) {
        assert_eq!(points.len(), gradients.len());
        gradients.fill(SVector::zeros());
    }

    fn evaluate_hessian(&self, points: &[Point<T, S>], hessians: &mut [SMatrix<T, S, S>]) {
        assert_eq!(points.len(), hessians.len());
        hessians.fill(SMatrix::zeros());
    }
}

/// The affine function `x -> a . x + b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFunction<T, const S: usize> {
    a: SVector<T, S>,
    b: T,
}

impl<T: Real, const S: usize> LinearFunction<T, S> {
    pub fn new(a: SVector<T, S>, b: T) -> Self {
        Self { a, b }
    }
}

impl<T: Real, const S: usize> Function<T, S> for LinearFunction<T, S> {
    fn evaluate_value(&self, points: &[Point<T, S>], values: &mut [T]) {
        assert_eq!(points.len(), values.len());
        for (value, point) in values.iter_mut().zip(points) {
            *value = self.a.dot(&point.coords) + self.b;
        }
    }

    fn evaluate_gradient(&self, points: &[Point<T, S>], gradients: &mut [SVector<T, S>]) {
        assert_eq!(points.len(), gradients.len());
        gradients.fill(self.a);
    }

    fn evaluate_hessian(&self, points: &[Point<T, S>], hessians: &mut [SMatrix<T, S, S>]) {
        assert_eq!(points.len(), hessians.len());
        hessians.fill(SMatrix::zeros());
    }
}

/// Function quantities of one sub-element.
#[derive(Debug, Clone)]
pub struct FunctionCache<T: Real, const S: usize> {
    values: Option<ValueTable<T>>,
    gradients: Option<ValueTable<SVector<T, S>>>,
    hessians: Option<ValueTable<SMatrix<T, S, S>>>,
}

impl<T: Real, const S: usize> CacheStorage for FunctionCache<T, S> {
    type Flags = function_element::CacheFlags;

    fn allocate(flags: Self::Flags, n_points: usize, _n_functions: usize) -> Self {
        use function_element::Flags;
        Self {
            values: flags
                .contains(Flags::VALUE)
                .then(|| ValueTable::from_element(1, n_points, T::zero())),
            gradients: flags
                .contains(Flags::GRADIENT)
                .then(|| ValueTable::from_element(1, n_points, SVector::zeros())),
            hessians: flags
                .contains(Flags::D2)
                .then(|| ValueTable::from_element(1, n_points, SMatrix::zeros())),
        }
    }
}

cached_quantity! {
    FunctionValues [T: Real, const S: usize]: FunctionCache<T, S>, function_element::Flags::VALUE, values => T
}

cached_quantity! {
    FunctionGradients [T: Real, const S: usize]:
        FunctionCache<T, S>, function_element::Flags::GRADIENT, gradients => SVector<T, S>
}

cached_quantity! {
    FunctionHessians [T: Real, const S: usize]:
        FunctionCache<T, S>, function_element::Flags::D2, hessians => SMatrix<T, S, S>
}

/// Accessor to a function on the elements of a domain.
#[derive(Debug)]
pub struct FunctionElement<'a, T: Real, const D: usize, const S: usize> {
    domain_element: DomainElement<'a, T, D, S>,
    function: &'a dyn Function<T, S>,
    cache: SharedCache<FunctionCache<T, S>>,
}

pub type FunctionElementIterator<'a, T, const D: usize, const S: usize> =
    ElementIterator<FunctionElement<'a, T, D, S>>;

delegate_element_accessor!(
    FunctionElement<'a, T, D, S>,
    domain_element,
    ['a, T: Real, const D: usize, const S: usize]
);

impl<'a, T: Real, const D: usize, const S: usize> FunctionElement<'a, T, D, S> {
    fn from_domain_element(domain_element: DomainElement<'a, T, D, S>, function: &'a dyn Function<T, S>) -> Self {
        Self {
            domain_element,
            function,
            cache: ElementCache::new_shared(D),
        }
    }

    /// Iterator at the first active element of the domain.
    pub fn begin(
        domain: &Domain<'a, T, D, S>,
        function: &'a dyn Function<T, S>,
    ) -> FunctionElementIterator<'a, T, D, S> {
        ElementIterator::new(Self::from_domain_element(
            domain.begin().into_accessor(),
            function,
        ))
    }

    pub fn end(domain: &Domain<'a, T, D, S>, function: &'a dyn Function<T, S>) -> FunctionElementIterator<'a, T, D, S> {
        ElementIterator::new(Self::from_domain_element(domain.end().into_accessor(), function))
    }

    pub fn copy(&self, policy: CopyPolicy) -> Self {
        Self {
            domain_element: self.domain_element.copy(policy),
            function: self.function,
            cache: copy_shared(&self.cache, policy),
        }
    }

    pub fn domain_element(&self) -> &DomainElement<'a, T, D, S> {
        &self.domain_element
    }

    pub fn domain_element_mut(&mut self) -> &mut DomainElement<'a, T, D, S> {
        &mut self.domain_element
    }

    pub fn cache(&self) -> &SharedCache<FunctionCache<T, S>> {
        &self.cache
    }

    pub fn values(&self, k: usize, j: usize) -> Ref<'_, [T]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<FunctionValues>(k, j).function_values(0)
        })
    }

    pub fn gradients(&self, k: usize, j: usize) -> Ref<'_, [SVector<T, S>]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<FunctionGradients>(k, j).function_values(0)
        })
    }

    pub fn hessians(&self, k: usize, j: usize) -> Ref<'_, [SMatrix<T, S, S>]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<FunctionHessians>(k, j).function_values(0)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FunctionSetup {
    requested: function_element::Flags,
    flags: function_element::CacheFlags,
    lower: domain_element::Flags,
}

/// Evaluates a function at the physical quadrature points of a domain.
#[derive(Debug)]
pub struct FunctionHandler<'a, T: Real, const D: usize, const S: usize> {
    function: &'a dyn Function<T, S>,
    domain_handler: DomainHandler<'a, T, D, S>,
    topologies: Vec<Option<FunctionSetup>>,
}

impl<'a, T: Real, const D: usize, const S: usize> FunctionHandler<'a, T, D, S> {
    pub fn new(domain: Domain<'a, T, D, S>, function: &'a dyn Function<T, S>) -> Self {
        Self::with_tables(domain, function, ActivationTables::standard())
    }

    pub fn with_tables(
        domain: Domain<'a, T, D, S>,
        function: &'a dyn Function<T, S>,
        tables: &'a ActivationTables,
    ) -> Self {
        Self {
            function,
            domain_handler: DomainHandler::with_tables(domain, tables),
            topologies: vec![None; D + 1],
        }
    }

    pub fn domain_handler(&self) -> &DomainHandler<'a, T, D, S> {
        &self.domain_handler
    }

    pub fn reset(
        &mut self,
        flags: function_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
    ) -> eyre::Result<()> {
        self.reset_elements(flags, quadrature, ElementSelection::Active)
    }

    pub fn reset_one_element(
        &mut self,
        flags: function_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        element: usize,
    ) -> eyre::Result<()> {
        self.reset_selected_elements(flags, quadrature, [element])
    }

    pub fn reset_selected_elements(
        &mut self,
        flags: function_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        elements: impl IntoIterator<Item = usize>,
    ) -> eyre::Result<()> {
        self.reset_elements(flags, quadrature, ElementSelection::from_elements(elements))
    }

    fn reset_elements(
        &mut self,
        flags: function_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        selection: ElementSelection,
    ) -> eyre::Result<()> {
        let k = quadrature.dim();
        if k > D {
            return Err(Error::SubElementDimensionOutOfRange { k, dim: D }.into());
        }
        let setup = match self.topologies[k] {
            Some(setup) if setup.requested == flags => {
                trace!("Function handler: dimension {} unchanged", k);
                setup
            }
            _ => {
                let tables = self
                    .domain_handler
                    .grid_function_handler()
                    .grid_handler()
                    .tables();
                let activation = tables.function.activate(flags)?;
                let setup = FunctionSetup {
                    requested: flags,
                    flags: activation.cache,
                    lower: activation.lower,
                };
                self.topologies[k] = Some(setup);
                debug!(
                    "Function handler reset for dimension {}: {:?}, domain {:?}",
                    k, setup.flags, setup.lower
                );
                setup
            }
        };
        self.domain_handler
            .reset_elements(setup.lower, quadrature, selection)
    }

    pub fn flags(&self, k: usize) -> Option<function_element::CacheFlags> {
        self.topologies.get(k)?.map(|setup| setup.flags)
    }

    pub fn init_cache(&self, element: &mut FunctionElement<'_, T, D, S>, k: usize) -> eyre::Result<()> {
        self.domain_handler
            .init_cache(element.domain_element_mut(), k)?;
        let flags = self.flags(k).unwrap_or(function_element::Flags::NONE);
        let n_points = self
            .domain_handler
            .grid_function_handler()
            .grid_handler()
            .quadratures(k)?
            .num_points();
        element.cache().borrow_mut().init(k, flags, n_points, 1);
        Ok(())
    }

    pub fn fill_cache(&self, element: &mut FunctionElement<'_, T, D, S>, k: usize, j: usize) -> eyre::Result<()> {
        self.domain_handler
            .fill_cache(element.domain_element_mut(), k, j)?;
        let flags = self.flags(k).unwrap_or(function_element::Flags::NONE);
        if flags.is_empty() {
            return Ok(());
        }
        let points = element.domain_element().physical_points(k, j);
        let mut cache = element.cache().borrow_mut();
        use function_element::Flags;
        if flags.contains(Flags::VALUE) {
            cache.fill::<FunctionValues, _>(k, j, |values| {
                self.function
                    .evaluate_value(&points, values.function_values_mut(0))
            });
        }
        if flags.contains(Flags::GRADIENT) {
            cache.fill::<FunctionGradients, _>(k, j, |gradients| {
                self.function
                    .evaluate_gradient(&points, gradients.function_values_mut(0))
            });
        }
        if flags.contains(Flags::D2) {
            cache.fill::<FunctionHessians, _>(k, j, |hessians| {
                self.function
                    .evaluate_hessian(&points, hessians.function_values_mut(0))
            });
        }
        Ok(())
    }
}
