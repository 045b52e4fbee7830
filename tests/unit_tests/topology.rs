use igatools::proptest::{tensor_size, tensor_size_and_index};
use igatools::topology::{flat_size, flat_to_tensor, n_sub_elements, tensor_to_flat, TensorIndexer, UnitElement};
use nalgebra::Vector2;
use paste::paste;
use proptest::prelude::*;
use util::assert_panics;

#[test]
fn first_direction_varies_fastest() {
    let extents = [3, 2];
    assert_eq!(tensor_to_flat(&[0, 0], &extents), 0);
    assert_eq!(tensor_to_flat(&[1, 0], &extents), 1);
    assert_eq!(tensor_to_flat(&[2, 0], &extents), 2);
    assert_eq!(tensor_to_flat(&[0, 1], &extents), 3);
    assert_eq!(tensor_to_flat(&[2, 1], &extents), 5);
    assert_eq!(flat_to_tensor(4, &extents), [1, 1]);

    let indexer = TensorIndexer::new([2, 2, 2]);
    let all: Vec<_> = indexer.iter().collect();
    assert_eq!(all.len(), 8);
    assert_eq!(all[0], [0, 0, 0]);
    assert_eq!(all[1], [1, 0, 0]);
    assert_eq!(all[2], [0, 1, 0]);
    assert_eq!(all[4], [0, 0, 1]);
}

#[test]
fn out_of_range_indices_panic() {
    assert_panics!(tensor_to_flat(&[3, 0], &[3, 2]));
    assert_panics!(tensor_to_flat(&[0, 2], &[3, 2]));
    assert_panics!(flat_to_tensor(6, &[3, 2]));
    assert_panics!(UnitElement::<2>::sub_element(1, 4));
    assert_panics!(UnitElement::<2>::sub_element(3, 0));
}

#[test]
fn offset_stays_in_range() {
    let indexer = TensorIndexer::new([3, 2]);
    assert_eq!(indexer.offset(&[1, 0], &[1, 1]), Some([2, 1]));
    assert_eq!(indexer.offset(&[0, 0], &[-1, 0]), None);
    assert_eq!(indexer.offset(&[2, 1], &[1, 0]), None);
    assert!(indexer.contains(&[2, 1]));
    assert!(!indexer.contains(&[3, 1]));
}

#[test]
fn unit_element_counts() {
    assert_eq!(UnitElement::<1>::n_faces(), 2);
    assert_eq!(UnitElement::<2>::n_faces(), 4);
    assert_eq!(UnitElement::<3>::n_faces(), 6);
    assert_eq!(UnitElement::<3>::n_vertices(), 8);
    assert_eq!(n_sub_elements(3, 1), 12);
    assert_eq!(n_sub_elements(3, 2), 6);
    assert_eq!(n_sub_elements(3, 3), 1);
    assert_eq!(n_sub_elements(2, 0), 4);
    assert_eq!(UnitElement::<3>::sub_elements(1).len(), 12);
}

#[test]
fn faces_are_ordered_by_direction_then_value() {
    for (j, face) in UnitElement::<3>::sub_elements(2).enumerate() {
        assert_eq!(face.index(), j);
        assert_eq!(face.constant_directions(), &[j / 2]);
        assert_eq!(face.constant_values(), &[j % 2]);
        assert_eq!(face.active_directions().len(), 2);
    }
    let face = UnitElement::<2>::sub_element(1, 2);
    assert_eq!(face.active_directions(), &[0]);
    assert_eq!(face.reference_normal::<f64>(), Some(Vector2::new(0.0, -1.0)));
    assert_eq!(
        UnitElement::<2>::sub_element(1, 1).reference_normal::<f64>(),
        Some(Vector2::new(1.0, 0.0))
    );
    assert_eq!(UnitElement::<2>::element().reference_normal::<f64>(), None);
}

#[test]
fn vertices_are_numbered_like_flat_indices() {
    for (j, vertex) in UnitElement::<2>::sub_elements(0).enumerate() {
        assert_eq!(vertex.constant_directions(), &[0, 1]);
        let tensor = flat_to_tensor(j, &[2, 2]);
        assert_eq!(vertex.constant_values(), &tensor[..]);
    }
}

#[test]
fn sub_element_enumeration_restarts_when_cloned() {
    let mut edges = UnitElement::<3>::sub_elements(1);
    edges.next();
    let restart = UnitElement::<3>::sub_elements(1);
    assert_eq!(restart.clone().count(), 12);
    assert_eq!(edges.count(), 11);
    assert!(UnitElement::<3>::element().is_element());
}

macro_rules! bijection_tests {
    ($($dim:literal),*) => {
        paste! {
            proptest! {
                $(
                    #[test]
                    fn [<tensor_flat_round_trip_ $dim d>]((size, index) in tensor_size_and_index::<$dim>(6)) {
                        let flat = tensor_to_flat(&index, &size);
                        prop_assert!(flat < flat_size(&size));
                        prop_assert_eq!(flat_to_tensor(flat, &size), index);
                    }

                    #[test]
                    fn [<indexer_enumerates_flat_order_ $dim d>](size in tensor_size::<$dim>(5)) {
                        let indexer = TensorIndexer::new(size);
                        prop_assert_eq!(indexer.iter().count(), indexer.len());
                        for (flat, tensor) in indexer.iter().enumerate() {
                            prop_assert_eq!(indexer.to_flat(&tensor), flat);
                        }
                    }
                )*
            }
        }
    };
}

bijection_tests!(1, 2, 3);
