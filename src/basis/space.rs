use crate::grid::Grid;
use crate::topology::{TensorIndex, TensorIndexer, TensorSize};
use crate::{Error, Real};
use log::debug;
use serde::{Deserialize, Serialize};

/// Behaviour of the basis at the two ends of one parametric direction.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndBehaviour {
    /// Open knot vector: the end knots are repeated `p + 1` times and the functions interpolate
    /// at the ends.
    #[default]
    Interpolatory,
    /// The knots are continued periodically and the last `p` functions are identified with the
    /// first `p`, so the space is `C^{p-1}` across the two ends.
    Periodic,
}

/// Distribution of global basis indices over a tensor-product spline space.
///
/// Global functions are numbered by the flat index of their tensor index, first direction
/// fastest, plus a constant offset. On element `e` with tensor index `(e_0, ..., e_{D-1})` the
/// non-vanishing functions are those with tensor indices in `e_d ..= e_d + p_d`, taken modulo
/// the number of functions in periodic directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofDistribution<const D: usize> {
    degree: [usize; D],
    end_behaviour: [EndBehaviour; D],
    functions: TensorIndexer<D>,
    offset: usize,
}

impl<const D: usize> DofDistribution<D> {
    pub fn new(num_intervals: TensorSize<D>, degree: [usize; D]) -> Self {
        Self::with_end_behaviour(num_intervals, degree, [EndBehaviour::Interpolatory; D])
    }

    /// A periodic direction has as many functions as intervals, an interpolatory one `p` more.
    pub fn with_end_behaviour(
        num_intervals: TensorSize<D>,
        degree: [usize; D],
        end_behaviour: [EndBehaviour; D],
    ) -> Self {
        let num_basis: TensorSize<D> = std::array::from_fn(|d| match end_behaviour[d] {
            EndBehaviour::Interpolatory => num_intervals[d] + degree[d],
            EndBehaviour::Periodic => num_intervals[d],
        });
        Self {
            degree,
            end_behaviour,
            functions: TensorIndexer::new(num_basis),
            offset: 0,
        }
    }

    pub fn end_behaviour(&self) -> &[EndBehaviour; D] {
        &self.end_behaviour
    }

    pub fn degree(&self) -> &[usize; D] {
        &self.degree
    }

    /// Number of global functions in each direction.
    pub fn num_basis_per_direction(&self) -> &TensorSize<D> {
        self.functions.extents()
    }

    pub fn num_dofs(&self) -> usize {
        self.functions.len()
    }

    /// Number of functions that do not vanish on an element.
    pub fn num_element_basis(&self) -> usize {
        self.degree.iter().map(|p| p + 1).product()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Shifts every global index by `offset`.
    pub fn add_dofs_offset(&mut self, offset: usize) {
        self.offset += offset;
    }

    /// Tensor index of the global function `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a global index of this distribution.
    pub fn basis_flat_to_tensor(&self, index: usize) -> TensorIndex<D> {
        assert!(
            index >= self.offset && index - self.offset < self.num_dofs(),
            "global basis index {} is out of range: valid range is [{}, {})",
            index,
            self.offset,
            self.offset + self.num_dofs()
        );
        self.functions.to_tensor(index - self.offset)
    }

    pub fn basis_tensor_to_flat(&self, tensor: &TensorIndex<D>) -> usize {
        self.functions.to_flat(tensor) + self.offset
    }

    /// Global indices of the functions that do not vanish on the element with the given tensor
    /// index, in local order (first direction fastest).
    pub fn local_to_global(&self, element: &TensorIndex<D>) -> Vec<usize> {
        let n_basis = self.num_basis_per_direction();
        let local = TensorIndexer::<D>::new(std::array::from_fn(|d| self.degree[d] + 1));
        local
            .iter()
            .map(|l| {
                let global: TensorIndex<D> = std::array::from_fn(|d| match self.end_behaviour[d] {
                    EndBehaviour::Interpolatory => element[d] + l[d],
                    EndBehaviour::Periodic => (element[d] + l[d]) % n_basis[d],
                });
                self.basis_tensor_to_flat(&global)
            })
            .collect()
    }
}

/// A scalar spline space of maximum regularity on a grid.
///
/// In an interpolatory direction the space uses the open knot vector obtained by repeating the
/// first and last grid knots `p + 1` times, so the functions interpolate at the ends of the
/// parametric domain. In a periodic direction the grid knots are extended by `p` knots on each
/// side, continuing the interval lengths across the ends.
#[derive(Debug, Clone)]
pub struct SplineSpace<'a, T, const D: usize> {
    grid: &'a Grid<T, D>,
    knots: Vec<Vec<T>>,
    dofs: DofDistribution<D>,
}

impl<'a, T: Real, const D: usize> SplineSpace<'a, T, D> {
    /// Builds the space with the given degree per direction, interpolatory in every direction.
    ///
    /// Returns [`Error::InvalidDegree`] if some degree is zero.
    pub fn new(grid: &'a Grid<T, D>, degree: [usize; D]) -> eyre::Result<Self> {
        Self::with_end_behaviour(grid, degree, [EndBehaviour::Interpolatory; D])
    }

    /// Returns [`Error::InvalidDegree`] if some degree is zero and [`Error::TooFewIntervals`] if a
    /// periodic direction has no more intervals than its degree.
    pub fn with_end_behaviour(
        grid: &'a Grid<T, D>,
        degree: [usize; D],
        end_behaviour: [EndBehaviour; D],
    ) -> eyre::Result<Self> {
        if let Some(direction) = degree.iter().position(|&p| p == 0) {
            return Err(Error::InvalidDegree { direction, degree: 0 }.into());
        }
        let num_intervals = grid.num_intervals();
        for direction in 0..D {
            if end_behaviour[direction] == EndBehaviour::Periodic && num_intervals[direction] <= degree[direction] {
                return Err(Error::TooFewIntervals {
                    direction,
                    degree: degree[direction],
                    num_intervals: num_intervals[direction],
                }
                .into());
            }
        }
        let knots = (0..D)
            .map(|d| match end_behaviour[d] {
                EndBehaviour::Interpolatory => open_knot_vector(grid.knots(d), degree[d]),
                EndBehaviour::Periodic => periodic_knot_vector(grid.knots(d), degree[d]),
            })
            .collect();
        let dofs = DofDistribution::with_end_behaviour(num_intervals, degree, end_behaviour);
        debug!(
            "Spline space of degree {:?} ({:?}) with {} functions on a grid with {} elements",
            degree,
            end_behaviour,
            dofs.num_dofs(),
            grid.num_elements()
        );
        Ok(Self { grid, knots, dofs })
    }

    pub fn with_uniform_degree(grid: &'a Grid<T, D>, degree: usize) -> eyre::Result<Self> {
        Self::new(grid, [degree; D])
    }

    pub fn grid(&self) -> &'a Grid<T, D> {
        self.grid
    }

    pub fn degree(&self) -> &[usize; D] {
        self.dofs.degree()
    }

    pub fn end_behaviour(&self) -> &[EndBehaviour; D] {
        self.dofs.end_behaviour()
    }

    /// The extended knot vector in the given direction.
    pub fn knots(&self, direction: usize) -> &[T] {
        &self.knots[direction]
    }

    pub fn dof_distribution(&self) -> &DofDistribution<D> {
        &self.dofs
    }

    pub fn dof_distribution_mut(&mut self) -> &mut DofDistribution<D> {
        &mut self.dofs
    }

    pub fn num_dofs(&self) -> usize {
        self.dofs.num_dofs()
    }

    pub fn num_element_basis(&self) -> usize {
        self.dofs.num_element_basis()
    }

    /// Global indices of the functions that do not vanish on element `flat`.
    pub fn local_to_global(&self, flat: usize) -> Vec<usize> {
        self.dofs.local_to_global(&self.grid.flat_to_tensor(flat))
    }

    /// The space with the same degree and end behaviour on a refinement of its grid.
    ///
    /// Every knot of the current grid must also be a knot of `fine`, otherwise
    /// [`Error::NotNested`] is returned. The dof offset is kept.
    pub fn refine_to<'b>(&self, fine: &'b Grid<T, D>) -> eyre::Result<SplineSpace<'b, T, D>> {
        for direction in 0..D {
            let fine_knots = fine.knots(direction);
            let (first, last) = (fine_knots[0], fine_knots[fine_knots.len() - 1]);
            let coarse_knots = self.grid.knots(direction);
            let same_ends = coarse_knots[0] == first && coarse_knots[coarse_knots.len() - 1] == last;
            if !same_ends || !coarse_knots.iter().all(|x| fine_knots.contains(x)) {
                return Err(Error::NotNested { direction }.into());
            }
        }
        let mut refined = SplineSpace::with_end_behaviour(fine, *self.degree(), *self.end_behaviour())?;
        refined.dofs.add_dofs_offset(self.dofs.offset());
        Ok(refined)
    }
}

fn open_knot_vector<T: Real>(breaks: &[T], degree: usize) -> Vec<T> {
    let (first, last) = (breaks[0], breaks[breaks.len() - 1]);
    let mut knots = Vec::with_capacity(breaks.len() + 2 * degree);
    knots.extend(std::iter::repeat(first).take(degree));
    knots.extend_from_slice(breaks);
    knots.extend(std::iter::repeat(last).take(degree));
    knots
}

fn periodic_knot_vector<T: Real>(breaks: &[T], degree: usize) -> Vec<T> {
    let n = breaks.len() - 1;
    let (first, last) = (breaks[0], breaks[n]);
    let mut knots = Vec::with_capacity(breaks.len() + 2 * degree);
    knots.extend((1..=degree).rev().map(|i| first - (last - breaks[n - i])));
    knots.extend_from_slice(breaks);
    knots.extend((1..=degree).map(|i| last + (breaks[i] - first)));
    knots
}
