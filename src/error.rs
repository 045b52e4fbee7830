//! Configuration errors reported to callers.
//!
//! Errors in this module describe invalid *configurations*: unsupported flags, mismatched
//! dimensions, invalid knots and so on. They are detected eagerly when a handler is reset or a
//! container is built. Sequencing errors (reading a cache entry that was never filled, filling
//! before initializing) and range errors are programming errors and panic instead.
use std::fmt;
use std::fmt::{Display, Formatter};

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The request contains flag bits that the layer's activation table does not know about.
    UnsupportedFlags { layer: &'static str, bits: u32 },
    /// A quantity was requested that the layer cannot provide for the given configuration.
    UnsupportedCombination { layer: &'static str, reason: String },
    /// Two dimensions that must agree do not.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A sub-element dimension larger than the element dimension.
    SubElementDimensionOutOfRange { k: usize, dim: usize },
    /// A topology was used before any quadrature was associated with it.
    TopologyNotConfigured { k: usize },
    /// An element selection without any elements.
    EmptyElementSelection,
    /// An element index which is not part of the grid.
    ElementOutOfRange { index: usize, num_elements: usize },
    /// An element property name which the grid does not know about.
    UnknownProperty(String),
    /// Knots in one direction are not usable.
    InvalidKnots { direction: usize, reason: &'static str },
    /// A spline degree that the space cannot be built with.
    InvalidDegree { direction: usize, degree: usize },
    /// A periodic direction with fewer intervals than the degree requires.
    TooFewIntervals {
        direction: usize,
        degree: usize,
        num_intervals: usize,
    },
    /// A grid whose knots do not contain the knots of the grid a space was built on.
    NotNested { direction: usize },
    /// NURBS weights are not usable.
    InvalidWeights(String),
    /// Two collaborators that must share a grid do not.
    GridMismatch,
    /// The Jacobian of the geometry map is singular at an evaluation point.
    SingularJacobian { element: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFlags { layer, bits } => {
                write!(f, "unsupported flag bits {bits:#b} requested from the {layer} layer")
            }
            Self::UnsupportedCombination { layer, reason } => {
                write!(f, "unsupported request for the {layer} layer: {reason}")
            }
            Self::DimensionMismatch { what, expected, actual } => {
                write!(f, "dimension mismatch for {what}: expected {expected}, got {actual}")
            }
            Self::SubElementDimensionOutOfRange { k, dim } => {
                write!(
                    f,
                    "sub-element dimension {k} is out of range for dimension {dim}: valid range is [0, {dim}]"
                )
            }
            Self::TopologyNotConfigured { k } => {
                write!(f, "no quadrature has been set for sub-elements of dimension {k}")
            }
            Self::EmptyElementSelection => write!(f, "the element selection is empty"),
            Self::ElementOutOfRange { index, num_elements } => {
                write!(f, "element {index} is out of range: valid range is [0, {num_elements})")
            }
            Self::UnknownProperty(name) => write!(f, "unknown element property \"{name}\""),
            Self::InvalidKnots { direction, reason } => {
                write!(f, "invalid knots in direction {direction}: {reason}")
            }
            Self::InvalidDegree { direction, degree } => {
                write!(
                    f,
                    "invalid degree {degree} in direction {direction}: continuous spline spaces need degree >= 1"
                )
            }
            Self::TooFewIntervals { direction, degree, num_intervals } => write!(
                f,
                "periodic direction {direction} has {num_intervals} intervals, degree {degree} needs more than {degree}"
            ),
            Self::NotNested { direction } => {
                write!(f, "the knots in direction {direction} are not contained in the refined grid")
            }
            Self::InvalidWeights(reason) => write!(f, "invalid NURBS weights: {reason}"),
            Self::GridMismatch => write!(f, "the collaborators are not defined on the same grid"),
            Self::SingularJacobian { element } => {
                write!(f, "singular element Jacobian encountered on element {element}")
            }
        }
    }
}

impl std::error::Error for Error {}
