//! Per-element storage of computed quantities.
//!
//! An [`ElementCache`] holds, for every sub-element dimension `k` that has been initialized and
//! every sub-element `j` of that dimension, one storage object with a table per requested
//! quantity. Every entry carries a "filled" status: reading an entry that was not requested or
//! not yet computed is a programming error and panics, unless the non-panicking
//! [`ElementCache::try_get`] is used.
use crate::flags::FlagSet;
use crate::topology::n_sub_elements;
use std::cell::RefCell;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

/// How an accessor's cache is duplicated when the accessor is copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyPolicy {
    /// The copy gets its own storage with the same contents.
    Deep,
    /// The copy shares storage with the original.
    Shallow,
}

/// A table of values indexed by (function, point), stored function-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTable<V> {
    n_functions: usize,
    n_points: usize,
    values: Vec<V>,
}

impl<V: Clone> ValueTable<V> {
    pub fn from_element(n_functions: usize, n_points: usize, value: V) -> Self {
        Self {
            n_functions,
            n_points,
            values: vec![value; n_functions * n_points],
        }
    }
}

impl<V> ValueTable<V> {
    pub fn from_fn(n_functions: usize, n_points: usize, mut f: impl FnMut(usize, usize) -> V) -> Self {
        let mut values = Vec::with_capacity(n_functions * n_points);
        for function in 0..n_functions {
            for point in 0..n_points {
                values.push(f(function, point));
            }
        }
        Self {
            n_functions,
            n_points,
            values,
        }
    }

    pub fn num_functions(&self) -> usize {
        self.n_functions
    }

    pub fn num_points(&self) -> usize {
        self.n_points
    }

    fn linear_index(&self, function: usize, point: usize) -> usize {
        assert!(
            function < self.n_functions,
            "function index {} is out of range: valid range is [0, {})",
            function,
            self.n_functions
        );
        assert!(
            point < self.n_points,
            "point index {} is out of range: valid range is [0, {})",
            point,
            self.n_points
        );
        function * self.n_points + point
    }

    pub fn get(&self, function: usize, point: usize) -> &V {
        &self.values[self.linear_index(function, point)]
    }

    pub fn get_mut(&mut self, function: usize, point: usize) -> &mut V {
        let index = self.linear_index(function, point);
        &mut self.values[index]
    }

    /// Values of one function at all points.
    pub fn function_values(&self, function: usize) -> &[V] {
        let start = self.linear_index(function, 0);
        &self.values[start..start + self.n_points]
    }

    pub fn function_values_mut(&mut self, function: usize) -> &mut [V] {
        let start = self.linear_index(function, 0);
        &mut self.values[start..start + self.n_points]
    }

    /// Values of all functions at one point.
    pub fn point_values(&self, point: usize) -> impl Iterator<Item = &V> {
        (0..self.n_functions).map(move |function| self.get(function, point))
    }

    pub fn as_slice(&self) -> &[V] {
        &self.values
    }

    /// Overwrites every entry.
    pub fn assign(&mut self, mut f: impl FnMut(usize, usize) -> V) {
        for function in 0..self.n_functions {
            for point in 0..self.n_points {
                self.values[function * self.n_points + point] = f(function, point);
            }
        }
    }
}

/// Storage for the quantities of one layer on one sub-element.
pub trait CacheStorage: Clone + Debug {
    type Flags: FlagSet;

    /// Allocates tables for the quantities in `flags`.
    fn allocate(flags: Self::Flags, n_points: usize, n_functions: usize) -> Self;
}

/// Typed access to one quantity in a [`CacheStorage`].
pub trait CachedQuantity<S: CacheStorage> {
    type Value;

    const NAME: &'static str;

    fn flag() -> S::Flags;

    fn table(storage: &S) -> Option<&ValueTable<Self::Value>>;

    fn table_mut(storage: &mut S) -> Option<&mut ValueTable<Self::Value>>;
}

/// Declares a marker type and implements [`CachedQuantity`] for it, given the storage field
/// holding its table.
macro_rules! cached_quantity {
    (
        $(#[$meta:meta])*
        $marker:ident [$($generics:tt)*]: $storage:ty, $flag:expr, $field:ident => $value:ty
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $marker;

        impl<$($generics)*> $crate::cache::CachedQuantity<$storage> for $marker {
            type Value = $value;

            const NAME: &'static str = stringify!($field);

            fn flag() -> <$storage as $crate::cache::CacheStorage>::Flags {
                $flag
            }

            fn table(storage: &$storage) -> Option<&$crate::cache::ValueTable<$value>> {
                storage.$field.as_ref()
            }

            fn table_mut(storage: &mut $storage) -> Option<&mut $crate::cache::ValueTable<$value>> {
                storage.$field.as_mut()
            }
        }
    };
}

pub(crate) use cached_quantity;

/// Failure to read a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// No sub-element of dimension `k` has been initialized.
    NotInitialized { k: usize },
    /// The quantity was not among the flags the cache was initialized with.
    NotRequested { quantity: &'static str, k: usize },
    /// The quantity was requested but has not been computed for this sub-element.
    NotFilled {
        quantity: &'static str,
        k: usize,
        j: usize,
    },
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized { k } => {
                write!(f, "the cache for sub-elements of dimension {k} has not been initialized")
            }
            Self::NotRequested { quantity, k } => write!(
                f,
                "{quantity} was not requested for sub-elements of dimension {k}: add its flag before reset"
            ),
            Self::NotFilled { quantity, k, j } => write!(
                f,
                "{quantity} has not been filled for sub-element {j} of dimension {k}: call fill_cache first"
            ),
        }
    }
}

impl std::error::Error for CacheError {}

#[derive(Debug, Clone)]
struct SubElementEntry<S: CacheStorage> {
    storage: S,
    filled: S::Flags,
}

#[derive(Debug, Clone)]
struct TopologyCache<S: CacheStorage> {
    flags: S::Flags,
    n_points: usize,
    n_functions: usize,
    sub_elements: Vec<SubElementEntry<S>>,
}

/// Cached quantities of one element, for each initialized sub-element dimension.
#[derive(Debug, Clone)]
pub struct ElementCache<S: CacheStorage> {
    dim: usize,
    topologies: Vec<Option<TopologyCache<S>>>,
}

/// A cache that may be shared between accessors.
pub type SharedCache<S> = Rc<RefCell<ElementCache<S>>>;

/// Copies a shared cache according to the copy policy.
pub fn copy_shared<S: CacheStorage>(cache: &SharedCache<S>, policy: CopyPolicy) -> SharedCache<S> {
    match policy {
        CopyPolicy::Deep => Rc::new(RefCell::new(cache.borrow().clone())),
        CopyPolicy::Shallow => Rc::clone(cache),
    }
}

impl<S: CacheStorage> ElementCache<S> {
    /// An empty cache for an element of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            topologies: vec![None; dim + 1],
        }
    }

    pub fn new_shared(dim: usize) -> SharedCache<S> {
        Rc::new(RefCell::new(Self::new(dim)))
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn topology(&self, k: usize) -> Result<&TopologyCache<S>, CacheError> {
        self.topologies
            .get(k)
            .and_then(Option::as_ref)
            .ok_or(CacheError::NotInitialized { k })
    }

    fn topology_mut(&mut self, k: usize) -> Result<&mut TopologyCache<S>, CacheError> {
        self.topologies
            .get_mut(k)
            .and_then(Option::as_mut)
            .ok_or(CacheError::NotInitialized { k })
    }

    /// Allocates storage for all sub-elements of dimension `k`.
    ///
    /// Calling `init` again with identical parameters keeps the storage. Any other call
    /// reallocates it and invalidates everything stored for dimension `k`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is larger than the element dimension.
    pub fn init(&mut self, k: usize, flags: S::Flags, n_points: usize, n_functions: usize) {
        assert!(
            k <= self.dim,
            "sub-element dimension {} is out of range: valid range is [0, {}]",
            k,
            self.dim
        );
        if let Some(existing) = &self.topologies[k] {
            if existing.flags == flags && existing.n_points == n_points && existing.n_functions == n_functions {
                return;
            }
        }
        let sub_elements = (0..n_sub_elements(self.dim, k))
            .map(|_| SubElementEntry {
                storage: S::allocate(flags, n_points, n_functions),
                filled: S::Flags::NONE,
            })
            .collect();
        self.topologies[k] = Some(TopologyCache {
            flags,
            n_points,
            n_functions,
            sub_elements,
        });
    }

    pub fn is_initialized(&self, k: usize) -> bool {
        self.topology(k).is_ok()
    }

    /// The flags dimension `k` was initialized with, if any.
    pub fn requested_flags(&self, k: usize) -> Option<S::Flags> {
        self.topology(k).ok().map(|topology| topology.flags)
    }

    /// Number of points per sub-element of dimension `k`.
    pub fn num_points(&self, k: usize) -> Option<usize> {
        self.topology(k).ok().map(|topology| topology.n_points)
    }

    /// Computes one quantity on one sub-element and marks it as filled.
    ///
    /// # Panics
    ///
    /// Panics if dimension `k` has not been initialized, if `j` is out of range or if the
    /// quantity was not requested.
    pub fn fill<Q, F>(&mut self, k: usize, j: usize, compute: F)
    where
        Q: CachedQuantity<S>,
        F: FnOnce(&mut ValueTable<Q::Value>),
    {
        let topology = match self.topology_mut(k) {
            Ok(topology) => topology,
            Err(err) => panic!("cannot fill {}: {}", Q::NAME, err),
        };
        if !topology.flags.contains(Q::flag()) {
            panic!(
                "cannot fill {}: {}",
                Q::NAME,
                CacheError::NotRequested { quantity: Q::NAME, k }
            );
        }
        let count = topology.sub_elements.len();
        let entry = topology.sub_elements.get_mut(j).unwrap_or_else(|| {
            panic!(
                "sub-element index {} is out of range for dimension {}: valid range is [0, {})",
                j, k, count
            )
        });
        let table = Q::table_mut(&mut entry.storage)
            .expect("Internal error: storage must be allocated for every requested flag");
        compute(table);
        entry.filled = entry.filled | Q::flag();
    }

    /// Reads one quantity on one sub-element.
    pub fn try_get<Q: CachedQuantity<S>>(&self, k: usize, j: usize) -> Result<&ValueTable<Q::Value>, CacheError> {
        let topology = self.topology(k)?;
        if !topology.flags.contains(Q::flag()) {
            return Err(CacheError::NotRequested { quantity: Q::NAME, k });
        }
        let not_filled = CacheError::NotFilled { quantity: Q::NAME, k, j };
        let entry = topology.sub_elements.get(j).ok_or_else(|| not_filled.clone())?;
        if !entry.filled.contains(Q::flag()) {
            return Err(not_filled);
        }
        Q::table(&entry.storage).ok_or(not_filled)
    }

    /// Reads one quantity on one sub-element.
    ///
    /// # Panics
    ///
    /// Panics with the corresponding [`CacheError`] if the entry cannot be read.
    pub fn get<Q: CachedQuantity<S>>(&self, k: usize, j: usize) -> &ValueTable<Q::Value> {
        match self.try_get::<Q>(k, j) {
            Ok(table) => table,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn is_filled<Q: CachedQuantity<S>>(&self, k: usize, j: usize) -> bool {
        self.try_get::<Q>(k, j).is_ok()
    }

    /// Marks every entry as not filled, keeping the allocated storage.
    pub fn clear_filled(&mut self) {
        for topology in self.topologies.iter_mut().flatten() {
            for entry in &mut topology.sub_elements {
                entry.filled = S::Flags::NONE;
            }
        }
    }
}
