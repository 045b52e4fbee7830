//! Strategies for property-based testing.
use crate::grid::Grid;
use crate::topology::{TensorIndex, TensorSize};
use ::proptest::collection::vec;
use ::proptest::prelude::*;

/// Extents with between 1 and `max_extent` entries in each direction.
pub fn tensor_size<const D: usize>(max_extent: usize) -> impl Strategy<Value = TensorSize<D>> {
    vec(1..=max_extent, D).prop_map(|extents| {
        let mut size = [0; D];
        size.copy_from_slice(&extents);
        size
    })
}

/// Extents together with a valid tensor index for them.
pub fn tensor_size_and_index<const D: usize>(
    max_extent: usize,
) -> impl Strategy<Value = (TensorSize<D>, TensorIndex<D>)> {
    tensor_size::<D>(max_extent).prop_flat_map(|size| {
        let index = size
            .iter()
            .map(|&extent| 0..extent)
            .collect::<Vec<_>>()
            .prop_map(|components| {
                let mut index = [0; D];
                index.copy_from_slice(&components);
                index
            });
        (Just(size), index)
    })
}

/// A grid on `[0, 1]^D` with strictly increasing, non-uniform knots and at most
/// `max_intervals` intervals per direction.
pub fn grid<const D: usize>(max_intervals: usize) -> impl Strategy<Value = Grid<f64, D>> {
    let direction = vec(0.1..1.0f64, 1..=max_intervals).prop_map(|lengths| {
        let total: f64 = lengths.iter().sum();
        let mut knots = Vec::with_capacity(lengths.len() + 1);
        knots.push(0.0);
        let mut position = 0.0;
        for length in &lengths[..lengths.len() - 1] {
            position += length / total;
            knots.push(position);
        }
        knots.push(1.0);
        knots
    });
    vec(direction, D).prop_map(|knots| {
        let knots: [Vec<f64>; D] = knots
            .try_into()
            .expect("Internal error: strategy produces one knot vector per direction");
        Grid::new(knots).expect("Internal error: strategy produces strictly increasing knots")
    })
}
