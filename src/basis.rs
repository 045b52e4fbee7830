//! Spline bases on a domain.
//!
//! A [`Basis`] combines a [`ReferenceBasis`], B-splines or NURBS on the parametric grid, with
//! the [`Domain`] they are pushed forward to. Evaluation goes through [`BasisHandler`], which
//! resolves basis flags into domain flags and keeps the global one-dimensional B-spline tables
//! shared by all elements.
use crate::domain::Domain;
use crate::grid::{ElementIterator, Grid};
use crate::{Error, Real};

mod bspline;
mod element;
mod handler;
mod nurbs;
mod refinement;
mod space;
mod tensor_product;
mod tools;

pub use bspline::*;
pub use element::*;
pub use handler::*;
pub use nurbs::*;
pub use refinement::*;
pub use space::*;
pub use tensor_product::*;
pub use tools::*;

/// The basis on the parametric grid.
#[derive(Debug, Clone)]
pub enum ReferenceBasis<'a, T, const D: usize> {
    BSpline(SplineSpace<'a, T, D>),
    Nurbs(Nurbs<'a, T, D>),
}

impl<'a, T: Real, const D: usize> ReferenceBasis<'a, T, D> {
    pub fn space(&self) -> &SplineSpace<'a, T, D> {
        match self {
            Self::BSpline(space) => space,
            Self::Nurbs(nurbs) => nurbs.space(),
        }
    }

    pub fn grid(&self) -> &'a Grid<T, D> {
        self.space().grid()
    }

    pub fn is_rational(&self) -> bool {
        matches!(self, Self::Nurbs(_))
    }

    pub fn num_element_basis(&self) -> usize {
        self.space().num_element_basis()
    }

    pub fn local_to_global(&self, flat: usize) -> Vec<usize> {
        self.space().local_to_global(flat)
    }

    /// The same basis on a refinement of its grid. NURBS weights are refined so that the weight
    /// function is unchanged.
    pub fn refine_to<'b>(&self, fine: &'b Grid<T, D>) -> eyre::Result<ReferenceBasis<'b, T, D>> {
        Ok(match self {
            Self::BSpline(space) => ReferenceBasis::BSpline(space.refine_to(fine)?),
            Self::Nurbs(nurbs) => ReferenceBasis::Nurbs(nurbs.refine_to(fine)?),
        })
    }
}

/// A scalar basis on a domain.
#[derive(Debug, Clone)]
pub struct Basis<'a, T: Real, const D: usize, const S: usize> {
    reference: ReferenceBasis<'a, T, D>,
    domain: Domain<'a, T, D, S>,
}

impl<'a, T: Real, const D: usize, const S: usize> Basis<'a, T, D, S> {
    /// Returns [`Error::GridMismatch`] unless the reference basis and the domain are defined on
    /// the same grid.
    pub fn new(reference: ReferenceBasis<'a, T, D>, domain: Domain<'a, T, D, S>) -> eyre::Result<Self> {
        if !std::ptr::eq(reference.grid(), domain.grid()) {
            return Err(Error::GridMismatch.into());
        }
        Ok(Self { reference, domain })
    }

    pub fn reference(&self) -> &ReferenceBasis<'a, T, D> {
        &self.reference
    }

    pub fn domain(&self) -> &Domain<'a, T, D, S> {
        &self.domain
    }

    pub fn space(&self) -> &SplineSpace<'a, T, D> {
        self.reference.space()
    }

    pub fn num_dofs(&self) -> usize {
        self.space().num_dofs()
    }

    /// Iterator at the first active element.
    pub fn begin(&'a self) -> BasisElementIterator<'a, T, D, S> {
        ElementIterator::new(BasisElement::from_domain_element(self, self.domain.begin().into_accessor()))
    }

    pub fn end(&'a self) -> BasisElementIterator<'a, T, D, S> {
        ElementIterator::new(BasisElement::from_domain_element(self, self.domain.end().into_accessor()))
    }
}
