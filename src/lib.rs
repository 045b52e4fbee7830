//! Isogeometric analysis on structured tensor-product grids.
//!
//! Quantities are evaluated element by element through a layered set of caches: a request for
//! basis quantities is resolved into the quantities needed from the domain, the grid function
//! and the grid, each of which keeps its own per-element cache. See [`flags`] for the
//! activation tables that drive this resolution.
use nalgebra::RealField;

pub mod assembly;
pub mod basis;
pub mod cache;
pub mod domain;
pub mod error;
pub mod flags;
pub mod function;
pub mod grid;
pub mod grid_function;
pub mod quadrature;
pub mod topology;

#[cfg(feature = "proptest")]
pub mod proptest;

pub use error::Error;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// Scalar type used throughout the library.
///
/// Used as a trait alias for the bounds frequently needed by generic routines.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
