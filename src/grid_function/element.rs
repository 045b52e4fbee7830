use crate::cache::{cached_quantity, copy_shared, CacheStorage, CopyPolicy, ElementCache, SharedCache, ValueTable};
use crate::flags::grid_function_element;
use crate::grid::{delegate_element_accessor, ElementIterator, GridElement, ACTIVE, PAST_THE_END};
use crate::grid_function::GridFunction;
use crate::Real;
use nalgebra::{Point, SMatrix, SVector};
use std::cell::Ref;
use std::rc::Rc;

/// Grid function quantities of one sub-element.
#[derive(Debug, Clone)]
pub struct GridFunctionCache<T: Real, const D: usize, const S: usize> {
    values: Option<ValueTable<SVector<T, S>>>,
    jacobians: Option<ValueTable<SMatrix<T, S, D>>>,
    hessians: Option<ValueTable<[SMatrix<T, D, D>; S]>>,
}

impl<T: Real, const D: usize, const S: usize> CacheStorage for GridFunctionCache<T, D, S> {
    type Flags = grid_function_element::CacheFlags;

    fn allocate(flags: Self::Flags, n_points: usize, _n_functions: usize) -> Self {
        use grid_function_element::Flags;
        Self {
            values: flags
                .contains(Flags::D0)
                .then(|| ValueTable::from_element(1, n_points, SVector::zeros())),
            jacobians: flags
                .contains(Flags::D1)
                .then(|| ValueTable::from_element(1, n_points, SMatrix::zeros())),
            hessians: flags
                .contains(Flags::D2)
                .then(|| ValueTable::from_element(1, n_points, [SMatrix::zeros(); S])),
        }
    }
}

cached_quantity! {
    /// Values of the grid function.
    GridFunctionValues [T: Real, const D: usize, const S: usize]:
        GridFunctionCache<T, D, S>, grid_function_element::Flags::D0, values => SVector<T, S>
}

cached_quantity! {
    /// First derivatives of the grid function.
    GridFunctionJacobians [T: Real, const D: usize, const S: usize]:
        GridFunctionCache<T, D, S>, grid_function_element::Flags::D1, jacobians => SMatrix<T, S, D>
}

cached_quantity! {
    /// Second derivatives of each component of the grid function.
    GridFunctionHessians [T: Real, const D: usize, const S: usize]:
        GridFunctionCache<T, D, S>, grid_function_element::Flags::D2, hessians => [SMatrix<T, D, D>; S]
}

/// Accessor to a grid function on the elements of its grid.
#[derive(Debug)]
pub struct GridFunctionElement<'a, T: Real, const D: usize, const S: usize> {
    grid_element: GridElement<'a, T, D>,
    function: &'a dyn GridFunction<T, D, S>,
    cache: SharedCache<GridFunctionCache<T, D, S>>,
}

pub type GridFunctionElementIterator<'a, T, const D: usize, const S: usize> =
    ElementIterator<GridFunctionElement<'a, T, D, S>>;

delegate_element_accessor!(
    GridFunctionElement<'a, T, D, S>,
    grid_element,
    ['a, T: Real, const D: usize, const S: usize]
);

impl<'a, T: Real, const D: usize, const S: usize> GridFunctionElement<'a, T, D, S> {
    pub fn new(function: &'a dyn GridFunction<T, D, S>, flat_index: usize, property: &str) -> Self {
        Self {
            grid_element: GridElement::new(function.grid(), flat_index, property),
            function,
            cache: ElementCache::new_shared(D),
        }
    }

    /// Iterator at the first active element of the function's grid.
    pub fn begin(function: &'a dyn GridFunction<T, D, S>) -> GridFunctionElementIterator<'a, T, D, S> {
        let grid_iterator = function.grid().begin();
        Self::from_grid_element(function, grid_iterator.into_accessor())
    }

    /// The past-the-end iterator.
    pub fn end(function: &'a dyn GridFunction<T, D, S>) -> GridFunctionElementIterator<'a, T, D, S> {
        ElementIterator::new(Self::new(function, PAST_THE_END, ACTIVE))
    }

    fn from_grid_element(
        function: &'a dyn GridFunction<T, D, S>,
        grid_element: GridElement<'a, T, D>,
    ) -> GridFunctionElementIterator<'a, T, D, S> {
        ElementIterator::new(Self {
            grid_element,
            function,
            cache: ElementCache::new_shared(D),
        })
    }

    /// Copies the accessor, including the accessors of the layers below.
    pub fn copy(&self, policy: CopyPolicy) -> Self {
        Self {
            grid_element: self.grid_element.copy(policy),
            function: self.function,
            cache: copy_shared(&self.cache, policy),
        }
    }

    pub fn function(&self) -> &'a dyn GridFunction<T, D, S> {
        self.function
    }

    pub fn grid_element(&self) -> &GridElement<'a, T, D> {
        &self.grid_element
    }

    pub fn grid_element_mut(&mut self) -> &mut GridElement<'a, T, D> {
        &mut self.grid_element
    }

    pub fn cache(&self) -> &SharedCache<GridFunctionCache<T, D, S>> {
        &self.cache
    }

    pub fn shares_cache_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cache, &other.cache) && self.grid_element.shares_cache_with(&other.grid_element)
    }

    /// Parametric quadrature points, from the grid cache.
    pub fn parametric_points(&self, k: usize, j: usize) -> Ref<'_, [Point<T, D>]> {
        self.grid_element.points(k, j)
    }

    pub fn values(&self, k: usize, j: usize) -> Ref<'_, [SVector<T, S>]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<GridFunctionValues>(k, j).function_values(0)
        })
    }

    pub fn jacobians(&self, k: usize, j: usize) -> Ref<'_, [SMatrix<T, S, D>]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<GridFunctionJacobians>(k, j).function_values(0)
        })
    }

    pub fn hessians(&self, k: usize, j: usize) -> Ref<'_, [[SMatrix<T, D, D>; S]]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<GridFunctionHessians>(k, j).function_values(0)
        })
    }
}
