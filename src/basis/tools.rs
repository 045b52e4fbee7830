use crate::basis::{EndBehaviour, SplineSpace};
use crate::topology::{TensorIndexer, UnitElement};
use crate::Real;
use std::collections::BTreeSet;

/// Global indices of the functions that do not vanish on the given faces of the parametric
/// domain.
///
/// Faces are numbered like the faces of [`UnitElement`]: `x_0 = 0, x_0 = 1, x_1 = 0, ...`. With
/// open knot vectors these are the functions whose tensor index is first or last in the face's
/// normal direction. Faces normal to a periodic direction are not part of the boundary and
/// contribute nothing.
///
/// # Panics
///
/// Panics if a face index is out of range.
pub fn boundary_dofs<T: Real, const D: usize>(
    space: &SplineSpace<'_, T, D>,
    faces: &BTreeSet<usize>,
) -> BTreeSet<usize> {
    let dofs = space.dof_distribution();
    let n_basis = *dofs.num_basis_per_direction();
    let mut boundary = BTreeSet::new();
    for &face in faces {
        let sub_element = UnitElement::<D>::sub_element(D - 1, face);
        let direction = sub_element.constant_directions()[0];
        if space.end_behaviour()[direction] == EndBehaviour::Periodic {
            continue;
        }
        let index = if sub_element.constant_values()[0] == 0 {
            0
        } else {
            n_basis[direction] - 1
        };
        let mut extents = n_basis;
        extents[direction] = 1;
        for mut tensor in TensorIndexer::new(extents).iter() {
            tensor[direction] = index;
            boundary.insert(dofs.basis_tensor_to_flat(&tensor));
        }
    }
    boundary
}
