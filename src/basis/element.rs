use crate::basis::Basis;
use crate::cache::{cached_quantity, copy_shared, CacheStorage, CopyPolicy, ElementCache, SharedCache, ValueTable};
use crate::domain::DomainElement;
use crate::flags::basis_element;
use crate::grid::{delegate_element_accessor, ElementAccessor, ElementIterator};
use crate::Real;
use nalgebra::{Point, SMatrix, SVector};
use std::cell::Ref;
use std::rc::Rc;

/// Basis quantities of one sub-element, for every function that does not vanish on the element.
#[derive(Debug, Clone)]
pub struct BasisCache<T: Real, const D: usize, const S: usize> {
    values: Option<ValueTable<T>>,
    gradients: Option<ValueTable<SVector<T, S>>>,
    hessians: Option<ValueTable<SMatrix<T, S, S>>>,
    ref_gradients: Option<ValueTable<SVector<T, D>>>,
    ref_hessians: Option<ValueTable<SMatrix<T, D, D>>>,
}

impl<T: Real, const D: usize, const S: usize> CacheStorage for BasisCache<T, D, S> {
    type Flags = basis_element::CacheFlags;

    fn allocate(flags: Self::Flags, n_points: usize, n_functions: usize) -> Self {
        use basis_element::CacheFlags;
        Self {
            values: flags
                .contains(CacheFlags::VALUE)
                .then(|| ValueTable::from_element(n_functions, n_points, T::zero())),
            gradients: flags
                .contains(CacheFlags::GRADIENT)
                .then(|| ValueTable::from_element(n_functions, n_points, SVector::zeros())),
            hessians: flags
                .contains(CacheFlags::HESSIAN)
                .then(|| ValueTable::from_element(n_functions, n_points, SMatrix::zeros())),
            ref_gradients: flags
                .contains(CacheFlags::REF_GRADIENT)
                .then(|| ValueTable::from_element(n_functions, n_points, SVector::zeros())),
            ref_hessians: flags
                .contains(CacheFlags::REF_HESSIAN)
                .then(|| ValueTable::from_element(n_functions, n_points, SMatrix::zeros())),
        }
    }
}

cached_quantity! {
    BasisValues [T: Real, const D: usize, const S: usize]:
        BasisCache<T, D, S>, basis_element::CacheFlags::VALUE, values => T
}

cached_quantity! {
    /// Gradients with respect to the physical coordinates.
    BasisGradients [T: Real, const D: usize, const S: usize]:
        BasisCache<T, D, S>, basis_element::CacheFlags::GRADIENT, gradients => SVector<T, S>
}

cached_quantity! {
    BasisHessians [T: Real, const D: usize, const S: usize]:
        BasisCache<T, D, S>, basis_element::CacheFlags::HESSIAN, hessians => SMatrix<T, S, S>
}

cached_quantity! {
    /// Gradients with respect to the parametric coordinates.
    BasisRefGradients [T: Real, const D: usize, const S: usize]:
        BasisCache<T, D, S>, basis_element::CacheFlags::REF_GRADIENT, ref_gradients => SVector<T, D>
}

cached_quantity! {
    BasisRefHessians [T: Real, const D: usize, const S: usize]:
        BasisCache<T, D, S>, basis_element::CacheFlags::REF_HESSIAN, ref_hessians => SMatrix<T, D, D>
}

/// Accessor to the basis functions on one element.
///
/// Tables are indexed by (local function, point); local functions follow the order of
/// [`local_to_global`](Self::local_to_global).
#[derive(Debug)]
pub struct BasisElement<'a, T: Real, const D: usize, const S: usize> {
    basis: &'a Basis<'a, T, D, S>,
    domain_element: DomainElement<'a, T, D, S>,
    cache: SharedCache<BasisCache<T, D, S>>,
}

pub type BasisElementIterator<'a, T, const D: usize, const S: usize> = ElementIterator<BasisElement<'a, T, D, S>>;

delegate_element_accessor!(
    BasisElement<'a, T, D, S>,
    domain_element,
    ['a, T: Real, const D: usize, const S: usize]
);

impl<'a, T: Real, const D: usize, const S: usize> BasisElement<'a, T, D, S> {
    pub fn new(basis: &'a Basis<'a, T, D, S>, flat_index: usize, property: &str) -> Self {
        let domain_element = DomainElement::new(*basis.domain(), flat_index, property);
        Self::from_domain_element(basis, domain_element)
    }

    pub(crate) fn from_domain_element(
        basis: &'a Basis<'a, T, D, S>,
        domain_element: DomainElement<'a, T, D, S>,
    ) -> Self {
        Self {
            basis,
            domain_element,
            cache: ElementCache::new_shared(D),
        }
    }

    pub fn copy(&self, policy: CopyPolicy) -> Self {
        Self {
            basis: self.basis,
            domain_element: self.domain_element.copy(policy),
            cache: copy_shared(&self.cache, policy),
        }
    }

    pub fn basis(&self) -> &'a Basis<'a, T, D, S> {
        self.basis
    }

    pub fn domain_element(&self) -> &DomainElement<'a, T, D, S> {
        &self.domain_element
    }

    pub fn domain_element_mut(&mut self) -> &mut DomainElement<'a, T, D, S> {
        &mut self.domain_element
    }

    pub fn cache(&self) -> &SharedCache<BasisCache<T, D, S>> {
        &self.cache
    }

    pub fn shares_cache_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cache, &other.cache) && self.domain_element.shares_cache_with(&other.domain_element)
    }

    /// Number of functions that do not vanish on the element.
    pub fn num_basis(&self) -> usize {
        self.basis.reference().num_element_basis()
    }

    /// Global indices of the functions that do not vanish on the element.
    pub fn local_to_global(&self) -> Vec<usize> {
        self.basis.reference().local_to_global(self.flat_index())
    }

    pub fn points(&self, k: usize, j: usize) -> Vec<Point<T, S>> {
        self.domain_element.physical_points(k, j)
    }

    pub fn w_measures(&self, k: usize, j: usize) -> Vec<T> {
        self.domain_element.w_measures(k, j)
    }

    pub fn values(&self, k: usize, j: usize) -> Ref<'_, ValueTable<T>> {
        Ref::map(self.cache.borrow(), |cache| cache.get::<BasisValues>(k, j))
    }

    pub fn gradients(&self, k: usize, j: usize) -> Ref<'_, ValueTable<SVector<T, S>>> {
        Ref::map(self.cache.borrow(), |cache| cache.get::<BasisGradients>(k, j))
    }

    pub fn hessians(&self, k: usize, j: usize) -> Ref<'_, ValueTable<SMatrix<T, S, S>>> {
        Ref::map(self.cache.borrow(), |cache| cache.get::<BasisHessians>(k, j))
    }

    pub fn ref_gradients(&self, k: usize, j: usize) -> Ref<'_, ValueTable<SVector<T, D>>> {
        Ref::map(self.cache.borrow(), |cache| cache.get::<BasisRefGradients>(k, j))
    }

    pub fn ref_hessians(&self, k: usize, j: usize) -> Ref<'_, ValueTable<SMatrix<T, D, D>>> {
        Ref::map(self.cache.borrow(), |cache| cache.get::<BasisRefHessians>(k, j))
    }
}
