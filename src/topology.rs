//! Tensor-product index arithmetic and the topology of the reference hypercube.
//!
//! All flattening in the library follows one convention: the *first* direction varies fastest.
//! Grid elements, global basis function indices, element-local basis function indices and
//! quadrature points are all numbered this way.
use crate::Real;
use nalgebra::SVector;
use std::iter::FusedIterator;

/// A `D`-tuple of non-negative indices.
pub type TensorIndex<const D: usize> = [usize; D];

/// The number of entries in each of the `D` directions of a tensor-product structure.
pub type TensorSize<const D: usize> = [usize; D];

/// Total number of entries in a tensor-product structure with the given extents.
pub fn flat_size<const D: usize>(extents: &TensorSize<D>) -> usize {
    extents.iter().product()
}

/// Flattens a tensor index.
///
/// # Panics
///
/// Panics if any entry of `tensor` is not smaller than the corresponding extent.
pub fn tensor_to_flat<const D: usize>(tensor: &TensorIndex<D>, extents: &TensorSize<D>) -> usize {
    let mut flat = 0;
    let mut weight = 1;
    for d in 0..D {
        assert!(
            tensor[d] < extents[d],
            "tensor index {:?} is out of range in direction {}: valid range is [0, {})",
            tensor,
            d,
            extents[d]
        );
        flat += tensor[d] * weight;
        weight *= extents[d];
    }
    flat
}

/// Inverse of [`tensor_to_flat`].
///
/// # Panics
///
/// Panics if `flat` is not smaller than the product of the extents.
pub fn flat_to_tensor<const D: usize>(flat: usize, extents: &TensorSize<D>) -> TensorIndex<D> {
    let size = flat_size(extents);
    assert!(
        flat < size,
        "flat index {} is out of range for extents {:?}: valid range is [0, {})",
        flat,
        extents,
        size
    );
    let mut remainder = flat;
    let mut tensor = [0; D];
    for d in 0..D {
        tensor[d] = remainder % extents[d];
        remainder /= extents[d];
    }
    tensor
}

/// Conversions between flat and tensor indices for a fixed tensor-product structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorIndexer<const D: usize> {
    extents: TensorSize<D>,
}

impl<const D: usize> TensorIndexer<D> {
    pub fn new(extents: TensorSize<D>) -> Self {
        Self { extents }
    }

    pub fn extents(&self) -> &TensorSize<D> {
        &self.extents
    }

    pub fn len(&self) -> usize {
        flat_size(&self.extents)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_flat(&self, tensor: &TensorIndex<D>) -> usize {
        tensor_to_flat(tensor, &self.extents)
    }

    pub fn to_tensor(&self, flat: usize) -> TensorIndex<D> {
        flat_to_tensor(flat, &self.extents)
    }

    /// Whether the tensor index lies inside the structure.
    pub fn contains(&self, tensor: &TensorIndex<D>) -> bool {
        tensor.iter().zip(&self.extents).all(|(t, n)| t < n)
    }

    /// Displaces a tensor index, returning `None` if the result leaves the structure.
    pub fn offset(&self, tensor: &TensorIndex<D>, delta: &[isize; D]) -> Option<TensorIndex<D>> {
        let mut result = [0; D];
        for d in 0..D {
            let displaced = isize::try_from(tensor[d]).ok()?.checked_add(delta[d])?;
            let displaced = usize::try_from(displaced).ok()?;
            if displaced >= self.extents[d] {
                return None;
            }
            result[d] = displaced;
        }
        Some(result)
    }

    /// All tensor indices, in flat order.
    pub fn iter(&self) -> impl Iterator<Item = TensorIndex<D>> + Clone {
        let indexer = *self;
        (0..self.len()).map(move |flat| indexer.to_tensor(flat))
    }
}

/// Binomial coefficient.
pub fn n_choose_k(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
}

/// Number of `k`-dimensional sub-elements of the `dim`-dimensional unit hypercube.
///
/// # Panics
///
/// Panics if `k > dim`.
pub fn n_sub_elements(dim: usize, k: usize) -> usize {
    assert!(
        k <= dim,
        "sub-element dimension {} is out of range: valid range is [0, {}]",
        k,
        dim
    );
    n_choose_k(dim, k) << (dim - k)
}

/// All `r`-subsets of `0..n` in lexicographic order.
fn combinations(n: usize, r: usize) -> Vec<Vec<usize>> {
    fn extend(start: usize, n: usize, r: usize, current: &mut Vec<usize>, output: &mut Vec<Vec<usize>>) {
        if current.len() == r {
            output.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            extend(i + 1, n, r, current, output);
            current.pop();
        }
    }
    let mut output = Vec::new();
    extend(0, n, r, &mut Vec::with_capacity(r), &mut output);
    output
}

/// A vertex, edge, face or the interior of the `D`-dimensional unit hypercube `[0, 1]^D`.
///
/// A sub-element of dimension `k` spans `k` active directions; the remaining `D - k` constant
/// directions are fixed to 0 or 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubElementTopology<const D: usize> {
    dim: usize,
    index: usize,
    active_directions: Vec<usize>,
    constant_directions: Vec<usize>,
    constant_values: Vec<usize>,
}

impl<const D: usize> SubElementTopology<D> {
    /// Topological dimension `k` of the sub-element.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Local index among the sub-elements of the same dimension.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn active_directions(&self) -> &[usize] {
        &self.active_directions
    }

    pub fn constant_directions(&self) -> &[usize] {
        &self.constant_directions
    }

    /// The values (0 or 1) of the constant directions, in the order of
    /// [`constant_directions`](Self::constant_directions).
    pub fn constant_values(&self) -> &[usize] {
        &self.constant_values
    }

    /// Whether this is the element itself.
    pub fn is_element(&self) -> bool {
        self.dim == D
    }

    /// Outward unit normal of a face of the unit hypercube, or `None` if this is not a face.
    pub fn reference_normal<T: Real>(&self) -> Option<SVector<T, D>> {
        if D == 0 || self.dim + 1 != D {
            return None;
        }
        let direction = self.constant_directions[0];
        let mut normal = SVector::zeros();
        normal[direction] = if self.constant_values[0] == 0 { -T::one() } else { T::one() };
        Some(normal)
    }
}

/// The reference hypercube `[0, 1]^D` and the canonical enumeration of its sub-elements.
///
/// Sub-elements of dimension `k` are ordered first by their set of constant directions
/// (lexicographically), then by the values of the constant directions with the first constant
/// direction varying fastest. For faces this gives `x_0 = 0, x_0 = 1, x_1 = 0, x_1 = 1, ...`, and
/// vertices are numbered like the flat indices of `{0, 1}^D`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitElement<const D: usize>;

impl<const D: usize> UnitElement<D> {
    pub const DIM: usize = D;

    pub fn n_sub_elements(k: usize) -> usize {
        n_sub_elements(D, k)
    }

    pub fn n_faces() -> usize {
        if D == 0 {
            0
        } else {
            2 * D
        }
    }

    pub fn n_vertices() -> usize {
        1 << D
    }

    /// The `j`-th sub-element of dimension `k`.
    ///
    /// # Panics
    ///
    /// Panics if `k > D` or if `j` is not a valid local index.
    pub fn sub_element(k: usize, j: usize) -> SubElementTopology<D> {
        let count = Self::n_sub_elements(k);
        assert!(
            j < count,
            "sub-element index {} is out of range for dimension {}: valid range is [0, {})",
            j,
            k,
            count
        );
        let n_values = 1 << (D - k);
        let constant_directions = combinations(D, D - k)
            .into_iter()
            .nth(j / n_values)
            .expect("Internal error: combination index must be in range");
        let value_index = j % n_values;
        let constant_values = (0..D - k).map(|i| (value_index >> i) & 1).collect();
        let active_directions = (0..D)
            .filter(|d| !constant_directions.contains(d))
            .collect();
        SubElementTopology {
            dim: k,
            index: j,
            active_directions,
            constant_directions,
            constant_values,
        }
    }

    /// The element itself, seen as its single sub-element of dimension `D`.
    pub fn element() -> SubElementTopology<D> {
        Self::sub_element(D, 0)
    }

    /// Lazily enumerates all sub-elements of dimension `k` in canonical order.
    ///
    /// The returned iterator can be cloned to restart the enumeration.
    pub fn sub_elements(k: usize) -> SubElementIter<D> {
        SubElementIter {
            k,
            next: 0,
            count: Self::n_sub_elements(k),
        }
    }
}

/// Iterator over the sub-elements of one dimension, see [`UnitElement::sub_elements`].
#[derive(Debug, Clone)]
pub struct SubElementIter<const D: usize> {
    k: usize,
    next: usize,
    count: usize,
}

impl<const D: usize> Iterator for SubElementIter<D> {
    type Item = SubElementTopology<D>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next < self.count {
            let sub_element = UnitElement::<D>::sub_element(self.k, self.next);
            self.next += 1;
            Some(sub_element)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl<const D: usize> ExactSizeIterator for SubElementIter<D> {}

impl<const D: usize> FusedIterator for SubElementIter<D> {}
