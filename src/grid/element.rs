use crate::cache::{cached_quantity, copy_shared, CacheStorage, CopyPolicy, ElementCache, SharedCache, ValueTable};
use crate::flags::grid_element;
use crate::grid::{ElementAccessor, ElementIterator, Grid, ACTIVE, PAST_THE_END};
use crate::topology::TensorIndex;
use crate::Real;
use nalgebra::{Point, SVector};
use std::cell::Ref;
use std::rc::Rc;

/// Grid quantities of one sub-element.
#[derive(Debug, Clone)]
pub struct GridCache<T: Real, const D: usize> {
    points: Option<ValueTable<Point<T, D>>>,
    weights: Option<ValueTable<T>>,
}

impl<T: Real, const D: usize> CacheStorage for GridCache<T, D> {
    type Flags = grid_element::CacheFlags;

    fn allocate(flags: Self::Flags, n_points: usize, _n_functions: usize) -> Self {
        Self {
            points: flags
                .contains(grid_element::Flags::POINT)
                .then(|| ValueTable::from_element(1, n_points, Point::origin())),
            weights: flags
                .contains(grid_element::Flags::WEIGHT)
                .then(|| ValueTable::from_element(1, n_points, T::zero())),
        }
    }
}

cached_quantity! {
    /// Quadrature points mapped to the element.
    QuadPoints [T: Real, const D: usize]: GridCache<T, D>, grid_element::Flags::POINT, points => Point<T, D>
}

cached_quantity! {
    /// Quadrature weights scaled by the sub-element measure.
    QuadWeights [T: Real, const D: usize]: GridCache<T, D>, grid_element::Flags::WEIGHT, weights => T
}

/// Accessor to the elements of a [`Grid`].
///
/// The accessor visits the elements carrying its property in increasing flat index order.
#[derive(Debug)]
pub struct GridElement<'a, T: Real, const D: usize> {
    grid: &'a Grid<T, D>,
    flat_index: usize,
    property: String,
    cache: SharedCache<GridCache<T, D>>,
}

pub type GridElementIterator<'a, T, const D: usize> = ElementIterator<GridElement<'a, T, D>>;

impl<T: Real, const D: usize> Grid<T, D> {
    /// Iterator at the first active element.
    pub fn begin(&self) -> GridElementIterator<'_, T, D> {
        ElementIterator::new(GridElement::first_with_property(self, ACTIVE))
    }

    /// Iterator at the first element carrying the given property.
    pub fn begin_with_property(&self, property: &str) -> eyre::Result<GridElementIterator<'_, T, D>> {
        self.elements_with_property(property)?;
        Ok(ElementIterator::new(GridElement::first_with_property(self, property)))
    }

    /// The past-the-end iterator.
    pub fn end(&self) -> GridElementIterator<'_, T, D> {
        self.end_with_property(ACTIVE)
    }

    pub fn end_with_property(&self, property: &str) -> GridElementIterator<'_, T, D> {
        ElementIterator::new(GridElement::new(self, PAST_THE_END, property))
    }
}

impl<'a, T: Real, const D: usize> GridElement<'a, T, D> {
    /// An accessor at the given flat index, which may be [`PAST_THE_END`].
    ///
    /// # Panics
    ///
    /// Panics if the index is neither past the end nor an element carrying the property.
    pub fn new(grid: &'a Grid<T, D>, flat_index: usize, property: &str) -> Self {
        let element = Self {
            grid,
            flat_index,
            property: property.to_string(),
            cache: ElementCache::new_shared(D),
        };
        if flat_index != PAST_THE_END {
            element.assert_valid_target(flat_index);
        }
        element
    }

    /// An accessor at the given tensor index.
    pub fn from_tensor_index(grid: &'a Grid<T, D>, tensor: &TensorIndex<D>, property: &str) -> Self {
        Self::new(grid, grid.tensor_to_flat(tensor), property)
    }

    fn first_with_property(grid: &'a Grid<T, D>, property: &str) -> Self {
        let first = grid
            .next_element_with_property(property, None)
            .unwrap_or(PAST_THE_END);
        Self::new(grid, first, property)
    }

    fn assert_valid_target(&self, flat: usize) {
        let num_elements = self.grid.num_elements();
        assert!(
            flat < num_elements,
            "element {} is out of range: valid range is [0, {})",
            flat,
            num_elements
        );
        assert!(
            self.grid.element_has_property(flat, &self.property),
            "element {} does not have the property \"{}\"",
            flat,
            self.property
        );
    }

    /// Copies the accessor; the cache is duplicated or shared according to `policy`.
    pub fn copy(&self, policy: CopyPolicy) -> Self {
        Self {
            grid: self.grid,
            flat_index: self.flat_index,
            property: self.property.clone(),
            cache: copy_shared(&self.cache, policy),
        }
    }

    pub fn grid(&self) -> &'a Grid<T, D> {
        self.grid
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    /// # Panics
    ///
    /// Panics if the accessor is past the end.
    pub fn tensor_index(&self) -> TensorIndex<D> {
        assert!(self.flat_index != PAST_THE_END, "a past-the-end element has no tensor index");
        self.grid.flat_to_tensor(self.flat_index)
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.flat_index != PAST_THE_END && self.grid.element_has_property(self.flat_index, property)
    }

    pub fn bounds(&self) -> (SVector<T, D>, SVector<T, D>) {
        self.grid.element_bounds(self.flat_index)
    }

    pub fn lengths(&self) -> SVector<T, D> {
        self.grid.element_lengths(self.flat_index)
    }

    /// Moves to the element with the given tensor index.
    pub fn move_to_tensor(&mut self, tensor: &TensorIndex<D>) {
        let flat = self.grid.tensor_to_flat(tensor);
        self.move_to(flat);
    }

    pub fn cache(&self) -> &SharedCache<GridCache<T, D>> {
        &self.cache
    }

    /// Whether both accessors use the same cache storage, as after a shallow copy.
    pub fn shares_cache_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cache, &other.cache)
    }

    /// Quadrature points of sub-element `j` of dimension `k`.
    ///
    /// # Panics
    ///
    /// Panics if the points have not been filled.
    pub fn points(&self, k: usize, j: usize) -> Ref<'_, [Point<T, D>]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<QuadPoints>(k, j).function_values(0)
        })
    }

    /// Scaled quadrature weights of sub-element `j` of dimension `k`.
    ///
    /// # Panics
    ///
    /// Panics if the weights have not been filled.
    pub fn weights(&self, k: usize, j: usize) -> Ref<'_, [T]> {
        Ref::map(self.cache.borrow(), |cache| {
            cache.get::<QuadWeights>(k, j).function_values(0)
        })
    }
}

impl<'a, T: Real, const D: usize> ElementAccessor for GridElement<'a, T, D> {
    type Offset = [isize; D];

    fn flat_index(&self) -> usize {
        self.flat_index
    }

    fn advance(&mut self) {
        if self.flat_index == PAST_THE_END {
            return;
        }
        self.flat_index = self
            .grid
            .next_element_with_property(&self.property, Some(self.flat_index))
            .unwrap_or(PAST_THE_END);
        self.cache.borrow_mut().clear_filled();
    }

    fn move_to(&mut self, flat: usize) {
        if flat != PAST_THE_END {
            self.assert_valid_target(flat);
        }
        self.flat_index = flat;
        self.cache.borrow_mut().clear_filled();
    }

    fn jump(&mut self, offset: &[isize; D]) -> bool {
        if self.flat_index == PAST_THE_END {
            return false;
        }
        let target = self
            .grid
            .indexer()
            .offset(&self.tensor_index(), offset)
            .map(|tensor| self.grid.tensor_to_flat(&tensor))
            .filter(|&flat| self.grid.element_has_property(flat, &self.property));
        match target {
            Some(flat) => {
                self.flat_index = flat;
                self.cache.borrow_mut().clear_filled();
                true
            }
            None => false,
        }
    }

    fn same_container(&self, other: &Self) -> bool {
        std::ptr::eq(self.grid, other.grid)
    }
}
