//! Physical domains described by a grid function.
//!
//! A [`Domain`] adds geometric quantities to a grid function `F: R^D -> R^S`: measures, inverse
//! Jacobians and Hessians of the inverse map, exterior normals of codimension-one domains and
//! outward normals on the faces of elements.
use crate::grid::{ElementIterator, Grid};
use crate::grid_function::{GridFunction, GridFunctionElement};
use crate::Real;

mod element;
mod handler;

pub use element::*;
pub use handler::*;

/// A domain given by a grid function.
#[derive(Debug, Clone, Copy)]
pub struct Domain<'a, T: Real, const D: usize, const S: usize> {
    function: &'a dyn GridFunction<T, D, S>,
}

impl<'a, T: Real, const D: usize, const S: usize> Domain<'a, T, D, S> {
    pub fn new(function: &'a dyn GridFunction<T, D, S>) -> Self {
        Self { function }
    }

    pub fn grid_function(&self) -> &'a dyn GridFunction<T, D, S> {
        self.function
    }

    pub fn grid(&self) -> &'a Grid<T, D> {
        self.function.grid()
    }

    /// Iterator at the first active element.
    pub fn begin(&self) -> DomainElementIterator<'a, T, D, S> {
        let gf_element = GridFunctionElement::begin(self.function).into_accessor();
        ElementIterator::new(DomainElement::from_grid_function_element(*self, gf_element))
    }

    /// The past-the-end iterator.
    pub fn end(&self) -> DomainElementIterator<'a, T, D, S> {
        let gf_element = GridFunctionElement::end(self.function).into_accessor();
        ElementIterator::new(DomainElement::from_grid_function_element(*self, gf_element))
    }
}
