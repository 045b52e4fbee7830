//! Structured tensor-product grids.
use crate::topology::{SubElementTopology, TensorIndex, TensorIndexer, TensorSize, UnitElement};
use crate::{Error, Real};
use itertools::Itertools;
use log::debug;
use nalgebra::{convert, SVector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

mod element;
mod handler;
mod iterator;

pub use element::*;
pub use handler::*;
pub use iterator::*;

pub(crate) use handler::{ElementSelection, SubElementQuadratures};
pub(crate) use iterator::delegate_element_accessor;

/// Name of the property carried by every element of a newly created grid.
pub const ACTIVE: &str = "active";

/// The Cartesian product of `D` one-dimensional knot partitions.
///
/// Elements are the products of knot intervals, numbered with the first direction varying
/// fastest. Elements can be tagged with named properties; every element initially carries the
/// [`ACTIVE`] property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid<T, const D: usize> {
    knots: Vec<Vec<T>>,
    properties: BTreeMap<String, BTreeSet<usize>>,
}

impl<T: Real, const D: usize> Grid<T, D> {
    /// Creates a grid from the knots in each direction.
    ///
    /// Knots must be strictly increasing and there must be at least two in each direction.
    pub fn new(knots: [Vec<T>; D]) -> eyre::Result<Self> {
        for (direction, direction_knots) in knots.iter().enumerate() {
            if direction_knots.len() < 2 {
                return Err(Error::InvalidKnots {
                    direction,
                    reason: "at least two knots are required",
                }
                .into());
            }
            if !direction_knots.iter().tuple_windows().all(|(a, b)| a < b) {
                return Err(Error::InvalidKnots {
                    direction,
                    reason: "knots must be strictly increasing",
                }
                .into());
            }
        }
        Ok(Self::from_valid_knots(knots.into_iter().collect()))
    }

    fn from_valid_knots(knots: Vec<Vec<T>>) -> Self {
        let num_elements = knots.iter().map(|k| k.len() - 1).product();
        let mut properties = BTreeMap::new();
        properties.insert(ACTIVE.to_string(), (0..num_elements).collect());
        Self { knots, properties }
    }

    /// A uniform grid on `[0, 1]^D` with `num_knots` knots in every direction.
    pub fn uniform(num_knots: usize) -> Self {
        Self::uniform_with_knots([num_knots; D])
    }

    /// A uniform grid on `[0, 1]^D` with the given number of knots per direction.
    ///
    /// # Panics
    ///
    /// Panics if fewer than two knots are requested in some direction.
    pub fn uniform_with_knots(num_knots: [usize; D]) -> Self {
        let knots = num_knots
            .iter()
            .map(|&n| {
                assert!(n >= 2, "a grid needs at least two knots per direction, got {}", n);
                let n_intervals: T = convert((n - 1) as f64);
                (0..n).map(|i| convert::<f64, T>(i as f64) / n_intervals).collect()
            })
            .collect();
        Self::from_valid_knots(knots)
    }

    pub fn dim(&self) -> usize {
        D
    }

    pub fn knots(&self, direction: usize) -> &[T] {
        &self.knots[direction]
    }

    pub fn num_intervals(&self) -> TensorSize<D> {
        std::array::from_fn(|d| self.knots[d].len() - 1)
    }

    pub fn num_elements(&self) -> usize {
        self.indexer().len()
    }

    pub fn indexer(&self) -> TensorIndexer<D> {
        TensorIndexer::new(self.num_intervals())
    }

    pub fn tensor_to_flat(&self, tensor: &TensorIndex<D>) -> usize {
        self.indexer().to_flat(tensor)
    }

    pub fn flat_to_tensor(&self, flat: usize) -> TensorIndex<D> {
        self.indexer().to_tensor(flat)
    }

    pub fn interval_length(&self, direction: usize, interval: usize) -> T {
        let knots = &self.knots[direction];
        knots[interval + 1] - knots[interval]
    }

    /// Lower and upper corners of an element.
    pub fn element_bounds(&self, flat: usize) -> (SVector<T, D>, SVector<T, D>) {
        let tensor = self.flat_to_tensor(flat);
        let lower = SVector::from_fn(|d, _| self.knots[d][tensor[d]]);
        let upper = SVector::from_fn(|d, _| self.knots[d][tensor[d] + 1]);
        (lower, upper)
    }

    /// Edge lengths of an element.
    pub fn element_lengths(&self, flat: usize) -> SVector<T, D> {
        let (lower, upper) = self.element_bounds(flat);
        upper - lower
    }

    /// The `k`-dimensional measure of a sub-element of an element.
    pub fn element_measure(&self, flat: usize, sub_element: &SubElementTopology<D>) -> T {
        let lengths = self.element_lengths(flat);
        sub_element
            .active_directions()
            .iter()
            .fold(T::one(), |measure, &d| measure * lengths[d])
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Adds a property that no element carries yet. Existing properties are left unchanged.
    pub fn add_property(&mut self, name: &str) {
        self.properties.entry(name.to_string()).or_default();
    }

    /// Sets or clears a property on the given elements.
    pub fn set_property(
        &mut self,
        name: &str,
        elements: impl IntoIterator<Item = usize>,
        status: bool,
    ) -> eyre::Result<()> {
        let num_elements = self.num_elements();
        let set = self
            .properties
            .get_mut(name)
            .ok_or_else(|| Error::UnknownProperty(name.to_string()))?;
        for index in elements {
            if index >= num_elements {
                return Err(Error::ElementOutOfRange { index, num_elements }.into());
            }
            if status {
                set.insert(index);
            } else {
                set.remove(&index);
            }
        }
        Ok(())
    }

    /// Whether an element carries a property. Unknown properties are carried by no element.
    pub fn element_has_property(&self, flat: usize, name: &str) -> bool {
        self.properties
            .get(name)
            .map(|set| set.contains(&flat))
            .unwrap_or(false)
    }

    pub fn elements_with_property(&self, name: &str) -> eyre::Result<&BTreeSet<usize>> {
        Ok(self
            .properties
            .get(name)
            .ok_or_else(|| Error::UnknownProperty(name.to_string()))?)
    }

    /// The first element after `flat` (exclusive) carrying the property.
    pub(crate) fn next_element_with_property(&self, name: &str, after: Option<usize>) -> Option<usize> {
        let set = self.properties.get(name)?;
        match after {
            Some(flat) => set.range(flat + 1..).next().copied(),
            None => set.iter().next().copied(),
        }
    }

    /// Subdivides every interval of direction `d` into `subdivisions[d]` equal parts.
    ///
    /// Children of an element inherit all properties of the element.
    ///
    /// # Panics
    ///
    /// Panics if any subdivision count is zero.
    pub fn refine(&mut self, subdivisions: [usize; D]) {
        assert!(
            subdivisions.iter().all(|&s| s > 0),
            "subdivision counts must be positive, got {:?}",
            subdivisions
        );
        let old_indexer = self.indexer();
        let knots = self
            .knots
            .iter()
            .zip(subdivisions)
            .map(|(knots, s)| {
                let s_t: T = convert(s as f64);
                let mut refined = Vec::with_capacity((knots.len() - 1) * s + 1);
                for (&a, &b) in knots.iter().tuple_windows() {
                    for i in 0..s {
                        refined.push(a + (b - a) * convert::<f64, T>(i as f64) / s_t);
                    }
                }
                refined.push(*knots.last().expect("Internal error: every direction has at least two knots"));
                refined
            })
            .collect();
        self.knots = knots;
        let new_indexer = self.indexer();
        let children = TensorIndexer::new(subdivisions);

        for set in self.properties.values_mut() {
            let refined_set = set
                .iter()
                .flat_map(|&parent| {
                    let parent_tensor = old_indexer.to_tensor(parent);
                    children.iter().map(move |child| {
                        let tensor: TensorIndex<D> =
                            std::array::from_fn(|d| parent_tensor[d] * subdivisions[d] + child[d]);
                        new_indexer.to_flat(&tensor)
                    })
                })
                .collect();
            *set = refined_set;
        }
        debug!(
            "Refined grid by {:?}: {} -> {} elements",
            subdivisions,
            old_indexer.len(),
            new_indexer.len()
        );
    }

    /// Builds the `K`-dimensional grid of sub-element `j` of the unit element.
    ///
    /// Also returns the map from the flat index of each sub-grid element to the flat index of the
    /// element of this grid whose sub-element it is.
    pub fn sub_grid<const K: usize>(&self, j: usize) -> eyre::Result<(Grid<T, K>, BTreeMap<usize, usize>)> {
        if K > D {
            return Err(Error::SubElementDimensionOutOfRange { k: K, dim: D }.into());
        }
        let sub_element = UnitElement::<D>::sub_element(K, j);
        let knots: Vec<Vec<T>> = sub_element
            .active_directions()
            .iter()
            .map(|&d| self.knots[d].clone())
            .collect();
        let sub_grid = Grid::<T, K>::from_valid_knots(knots);

        let num_intervals = self.num_intervals();
        let mut parent_tensor = [0; D];
        for (&d, &value) in sub_element
            .constant_directions()
            .iter()
            .zip(sub_element.constant_values())
        {
            parent_tensor[d] = if value == 0 { 0 } else { num_intervals[d] - 1 };
        }
        let element_map = sub_grid
            .indexer()
            .iter()
            .enumerate()
            .map(|(sub_flat, sub_tensor)| {
                for (i, &d) in sub_element.active_directions().iter().enumerate() {
                    parent_tensor[d] = sub_tensor[i];
                }
                (sub_flat, self.tensor_to_flat(&parent_tensor))
            })
            .collect();
        Ok((sub_grid, element_map))
    }
}
