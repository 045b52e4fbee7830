use std::ops::{Deref, DerefMut};

/// Flat index of an accessor that has moved past the last element.
pub const PAST_THE_END: usize = usize::MAX;

/// An element accessor: a cursor that knows its own position in a structured container and
/// owns (or shares) the cache of the element it points at.
pub trait ElementAccessor {
    /// Displacement used by [`jump`](Self::jump).
    type Offset;

    fn flat_index(&self) -> usize;

    /// Moves to the next element carrying the accessor's property, or past the end.
    fn advance(&mut self);

    /// Moves to the element with the given flat index.
    fn move_to(&mut self, flat: usize);

    /// Moves by the given tensor offset. Returns `false` and leaves the accessor unmoved if the
    /// target does not exist or does not carry the accessor's property.
    fn jump(&mut self, offset: &Self::Offset) -> bool;

    /// Whether both accessors traverse the same container.
    fn same_container(&self, other: &Self) -> bool;

    fn is_past_the_end(&self) -> bool {
        self.flat_index() == PAST_THE_END
    }
}

/// A forward cursor over the elements of a grid.
///
/// The iterator wraps an accessor and dereferences to it. Iteration ends when the accessor
/// compares equal to the past-the-end iterator of the same container.
#[derive(Debug)]
pub struct ElementIterator<A> {
    accessor: A,
}

impl<A: ElementAccessor> ElementIterator<A> {
    pub fn new(accessor: A) -> Self {
        Self { accessor }
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    pub fn accessor_mut(&mut self) -> &mut A {
        &mut self.accessor
    }

    pub fn into_accessor(self) -> A {
        self.accessor
    }

    /// Moves to the next element.
    ///
    /// # Panics
    ///
    /// Panics if the iterator is already past the end.
    pub fn advance(&mut self) -> &mut Self {
        assert!(
            !self.accessor.is_past_the_end(),
            "cannot advance an element iterator that is past the end"
        );
        self.accessor.advance();
        self
    }

    pub fn move_to(&mut self, flat: usize) {
        self.accessor.move_to(flat);
    }

    pub fn jump(&mut self, offset: &A::Offset) -> bool {
        self.accessor.jump(offset)
    }

    pub fn is_past_the_end(&self) -> bool {
        self.accessor.is_past_the_end()
    }
}

impl<A> Deref for ElementIterator<A> {
    type Target = A;

    fn deref(&self) -> &A {
        &self.accessor
    }
}

impl<A> DerefMut for ElementIterator<A> {
    fn deref_mut(&mut self) -> &mut A {
        &mut self.accessor
    }
}

impl<A: ElementAccessor> PartialEq for ElementIterator<A> {
    fn eq(&self, other: &Self) -> bool {
        self.accessor.flat_index() == other.accessor.flat_index() && self.accessor.same_container(&other.accessor)
    }
}

/// Implements [`ElementAccessor`] for an accessor wrapping another accessor in the given field.
///
/// The wrapping accessor must have a `cache` field holding a [`SharedCache`](crate::cache::SharedCache),
/// which is invalidated whenever the accessor moves.
macro_rules! delegate_element_accessor {
    ($accessor:ty, $field:ident, [$($generics:tt)*]) => {
        impl<$($generics)*> $crate::grid::ElementAccessor for $accessor {
            type Offset = [isize; D];

            fn flat_index(&self) -> usize {
                $crate::grid::ElementAccessor::flat_index(&self.$field)
            }

            fn advance(&mut self) {
                $crate::grid::ElementAccessor::advance(&mut self.$field);
                self.cache.borrow_mut().clear_filled();
            }

            fn move_to(&mut self, flat: usize) {
                $crate::grid::ElementAccessor::move_to(&mut self.$field, flat);
                self.cache.borrow_mut().clear_filled();
            }

            fn jump(&mut self, offset: &[isize; D]) -> bool {
                let moved = $crate::grid::ElementAccessor::jump(&mut self.$field, offset);
                if moved {
                    self.cache.borrow_mut().clear_filled();
                }
                moved
            }

            fn same_container(&self, other: &Self) -> bool {
                $crate::grid::ElementAccessor::same_container(&self.$field, &other.$field)
            }
        }
    };
}

pub(crate) use delegate_element_accessor;
