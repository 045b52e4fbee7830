use crate::cache::{cached_quantity, copy_shared, CacheStorage, CopyPolicy, ElementCache, SharedCache, ValueTable};
use crate::domain::Domain;
use crate::flags::domain_element;
use crate::grid::{delegate_element_accessor, ElementIterator, GridElement};
use crate::grid_function::GridFunctionElement;
use crate::Real;
use nalgebra::{Point, SMatrix, SVector};
use std::cell::Ref;
use std::rc::Rc;

/// Domain quantities of one sub-element.
#[derive(Debug, Clone)]
pub struct DomainCache<T: Real, const D: usize, const S: usize> {
    measures: Option<ValueTable<T>>,
    inv_jacobians: Option<ValueTable<SMatrix<T, D, S>>>,
    inv_hessians: Option<ValueTable<[SMatrix<T, S, S>; D]>>,
    ext_normals: Option<ValueTable<SVector<T, S>>>,
    boundary_normals: Option<ValueTable<SVector<T, S>>>,
}

impl<T: Real, const D: usize, const S: usize> CacheStorage for DomainCache<T, D, S> {
    type Flags = domain_element::CacheFlags;

    fn allocate(flags: Self::Flags, n_points: usize, _n_functions: usize) -> Self {
        use domain_element::CacheFlags;
        Self {
            measures: flags
                .contains(CacheFlags::MEASURE)
                .then(|| ValueTable::from_element(1, n_points, T::zero())),
            inv_jacobians: flags
                .contains(CacheFlags::INV_JACOBIAN)
                .then(|| ValueTable::from_element(1, n_points, SMatrix::zeros())),
            inv_hessians: flags
                .contains(CacheFlags::INV_HESSIAN)
                .then(|| ValueTable::from_element(1, n_points, [SMatrix::zeros(); D])),
            ext_normals: flags
                .contains(CacheFlags::EXT_NORMAL)
                .then(|| ValueTable::from_element(1, n_points, SVector::zeros())),
            boundary_normals: flags
                .contains(CacheFlags::BOUNDARY_NORMAL)
                .then(|| ValueTable::from_element(1, n_points, SVector::zeros())),
        }
    }
}

cached_quantity! {
    /// Measure of the restriction of the geometry map to the sub-element.
    Measures [T: Real, const D: usize, const S: usize]:
        DomainCache<T, D, S>, domain_element::CacheFlags::MEASURE, measures => T
}

cached_quantity! {
    /// Left inverse of the Jacobian.
    InvJacobians [T: Real, const D: usize, const S: usize]:
        DomainCache<T, D, S>, domain_element::CacheFlags::INV_JACOBIAN, inv_jacobians => SMatrix<T, D, S>
}

cached_quantity! {
    /// Hessians of the components of the inverse map.
    InvHessians [T: Real, const D: usize, const S: usize]:
        DomainCache<T, D, S>, domain_element::CacheFlags::INV_HESSIAN, inv_hessians => [SMatrix<T, S, S>; D]
}

cached_quantity! {
    /// Unit normals of a codimension-one domain.
    ExtNormals [T: Real, const D: usize, const S: usize]:
        DomainCache<T, D, S>, domain_element::CacheFlags::EXT_NORMAL, ext_normals => SVector<T, S>
}

cached_quantity! {
    /// Outward unit normals on a face of the element.
    BoundaryNormals [T: Real, const D: usize, const S: usize]:
        DomainCache<T, D, S>, domain_element::CacheFlags::BOUNDARY_NORMAL, boundary_normals => SVector<T, S>
}

/// Accessor to a domain on the elements of its grid.
#[derive(Debug)]
pub struct DomainElement<'a, T: Real, const D: usize, const S: usize> {
    domain: Domain<'a, T, D, S>,
    grid_function_element: GridFunctionElement<'a, T, D, S>,
    cache: SharedCache<DomainCache<T, D, S>>,
}

pub type DomainElementIterator<'a, T, const D: usize, const S: usize> = ElementIterator<DomainElement<'a, T, D, S>>;

delegate_element_accessor!(
    DomainElement<'a, T, D, S>,
    grid_function_element,
    ['a, T: Real, const D: usize, const S: usize]
);

impl<'a, T: Real, const D: usize, const S: usize> DomainElement<'a, T, D, S> {
    pub fn new(domain: Domain<'a, T, D, S>, flat_index: usize, property: &str) -> Self {
        let grid_function_element = GridFunctionElement::new(domain.grid_function(), flat_index, property);
        Self::from_grid_function_element(domain, grid_function_element)
    }

    pub(crate) fn from_grid_function_element(
        domain: Domain<'a, T, D, S>,
        grid_function_element: GridFunctionElement<'a, T, D, S>,
    ) -> Self {
        Self {
            domain,
            grid_function_element,
            cache: ElementCache::new_shared(D),
        }
    }

    pub fn copy(&self, policy: CopyPolicy) -> Self {
        Self {
            domain: self.domain,
            grid_function_element: self.grid_function_element.copy(policy),
            cache: copy_shared(&self.cache, policy),
        }
    }

    pub fn domain(&self) -> &Domain<'a, T, D, S> {
        &self.domain
    }

    pub fn grid_function_element(&self) -> &GridFunctionElement<'a, T, D, S> {
        &self.grid_function_element
    }

    pub fn grid_function_element_mut(&mut self) -> &mut GridFunctionElement<'a, T, D, S> {
        &mut self.grid_function_element
    }

    pub fn grid_element(&self) -> &GridElement<'a, T, D> {
        self.grid_function_element.grid_element()
    }

    pub fn cache(&self) -> &SharedCache<DomainCache<T, D, S>> {
        &self.cache
    }

    pub fn shares_cache_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cache, &other.cache)
            && self
                .grid_function_element
                .shares_cache_with(&other.grid_function_element)
    }

    /// Physical points.
    pub fn points(&self, k: usize, j: usize) -> Ref<'_, [SVector<T, S>]> {
        self.grid_function_element.values(k, j)
    }

    /// Physical points as [`Point`]s.
    pub fn physical_points(&self, k: usize, j: usize) -> Vec<Point<T, S>> {
        self.points(k, j).iter().map(|x| Point::from(*x)).collect()
    }

    pub fn jacobians(&self, k: usize, j: usize) -> Ref<'_, [SMatrix<T, S, D>]> {
        self.grid_function_element.jacobians(k, j)
    }

    pub fn hessians(&self, k: usize, j: usize) -> Ref<'_, [[SMatrix<T, D, D>; S]]> {
        self.grid_function_element.hessians(k, j)
    }

    pub fn measures(&self, k: usize, j: usize) -> Ref<'_, [T]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<Measures>(k, j).function_values(0)
        })
    }

    /// Measures multiplied by the quadrature weights: the integration weights on the domain.
    pub fn w_measures(&self, k: usize, j: usize) -> Vec<T> {
        let measures = self.measures(k, j);
        let weights = self.grid_element().weights(k, j);
        measures
            .iter()
            .zip(weights.iter())
            .map(|(&m, &w)| m * w)
            .collect()
    }

    pub fn inv_jacobians(&self, k: usize, j: usize) -> Ref<'_, [SMatrix<T, D, S>]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<InvJacobians>(k, j).function_values(0)
        })
    }

    pub fn inv_hessians(&self, k: usize, j: usize) -> Ref<'_, [[SMatrix<T, S, S>; D]]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<InvHessians>(k, j).function_values(0)
        })
    }

    pub fn ext_normals(&self, k: usize, j: usize) -> Ref<'_, [SVector<T, S>]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<ExtNormals>(k, j).function_values(0)
        })
    }

    pub fn boundary_normals(&self, k: usize, j: usize) -> Ref<'_, [SVector<T, S>]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<BoundaryNormals>(k, j).function_values(0)
        })
    }
}
