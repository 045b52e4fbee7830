//! Value flags, cache flags and the activation tables connecting the evaluation layers.
//!
//! Evaluation is organised in layers: grid, grid function, domain, function and basis. Each
//! layer exposes a set of *value flags*, the quantities a client may request, and a set of
//! *cache flags*, the quantities the layer stores itself. A request at one layer is resolved by
//! its [`ActivationTable`] into the cache flags of that layer and the value flags needed from
//! the layer(s) below. Resolution is the bitwise OR of one row per requested bit, so it is
//! additive: requesting more never yields fewer dependencies.
use crate::Error;
use std::fmt::Debug;
use std::ops::BitOr;

/// Operations shared by all flag types.
pub trait FlagSet: Copy + Debug + Eq + BitOr<Output = Self> {
    const NONE: Self;
    const ALL: Self;

    fn bits(self) -> u32;

    fn from_bits_retain(bits: u32) -> Self;

    fn contains(self, other: Self) -> bool {
        self.bits() & other.bits() == other.bits()
    }

    fn intersects(self, other: Self) -> bool {
        self.bits() & other.bits() != 0
    }

    fn is_empty(self) -> bool {
        self.bits() == 0
    }
}

macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$flag_meta:meta])*
                const $flag:ident = $bit:expr;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            $(
                $(#[$flag_meta])*
                pub const $flag: Self = Self(1 << $bit);
            )*

            /// Every known flag.
            pub const ALL: Self = Self(0 $(| (1 << $bit))*);

            pub const NONE: Self = Self(0);

            pub const fn bits(self) -> u32 {
                self.0
            }

            /// Constructs a flag set from raw bits, keeping bits that correspond to no flag.
            pub const fn from_bits_retain(bits: u32) -> Self {
                Self(bits)
            }

            pub const fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }

            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Names of the flags set in `self`.
            pub fn names(self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $(
                    if self.contains(Self::$flag) {
                        names.push(stringify!($flag));
                    }
                )*
                names
            }
        }

        impl $crate::flags::FlagSet for $name {
            const NONE: Self = Self(0);
            const ALL: Self = $name::ALL;

            fn bits(self) -> u32 {
                self.0
            }

            fn from_bits_retain(bits: u32) -> Self {
                Self(bits)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let unknown = self.0 & !Self::ALL.0;
                write!(f, "{}(", stringify!($name))?;
                let names = self.names();
                if names.is_empty() && unknown == 0 {
                    write!(f, "NONE")?;
                } else {
                    write!(f, "{}", names.join(" | "))?;
                }
                if unknown != 0 {
                    if !names.is_empty() {
                        write!(f, " | ")?;
                    }
                    write!(f, "{:#b}", unknown)?;
                }
                write!(f, ")")
            }
        }
    };
}

/// Marker for the bottom of the layer stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NoLowerLayer;

impl BitOr for NoLowerLayer {
    type Output = Self;

    fn bitor(self, _rhs: Self) -> Self {
        NoLowerLayer
    }
}

/// One row of an activation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationRow<F, C, L> {
    pub flag: F,
    pub cache: C,
    pub lower: L,
}

/// The result of resolving a request at one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation<C, L> {
    /// Quantities the layer stores in its own cache.
    pub cache: C,
    /// Quantities requested from the layer(s) below.
    pub lower: L,
}

/// Static map from the value flags of a layer to what they require.
#[derive(Debug, Clone, Copy)]
pub struct ActivationTable<F: 'static, C: 'static, L: 'static> {
    pub layer: &'static str,
    pub empty_cache: C,
    pub empty_lower: L,
    pub rows: &'static [ActivationRow<F, C, L>],
}

impl<F, C, L> ActivationTable<F, C, L>
where
    F: FlagSet,
    C: Copy + BitOr<Output = C>,
    L: Copy + BitOr<Output = L>,
{
    /// Resolves a request into the layer's cache flags and the requests to the lower layers.
    ///
    /// Returns [`Error::UnsupportedFlags`] if the request contains bits not covered by any row.
    pub fn activate(&self, request: F) -> Result<Activation<C, L>, Error> {
        let mut covered = 0;
        let mut activation = Activation {
            cache: self.empty_cache,
            lower: self.empty_lower,
        };
        for row in self.rows {
            covered |= row.flag.bits();
            if request.contains(row.flag) {
                activation.cache = activation.cache | row.cache;
                activation.lower = activation.lower | row.lower;
            }
        }
        let unknown = request.bits() & !covered;
        if unknown != 0 {
            return Err(Error::UnsupportedFlags {
                layer: self.layer,
                bits: unknown,
            });
        }
        Ok(activation)
    }
}

pub mod grid_element {
    use super::{ActivationRow, ActivationTable, NoLowerLayer};

    flag_set! {
        /// Quantities provided by the grid layer.
        pub struct Flags {
            /// Quadrature points mapped to the element.
            const POINT = 0;
            /// Quadrature weights scaled by the element measure.
            const WEIGHT = 1;
        }
    }

    /// The grid layer stores exactly what it is asked for.
    pub type CacheFlags = Flags;

    pub const TABLE: ActivationTable<Flags, CacheFlags, NoLowerLayer> = ActivationTable {
        layer: "grid",
        empty_cache: Flags::NONE,
        empty_lower: NoLowerLayer,
        rows: &[
            ActivationRow {
                flag: Flags::POINT,
                cache: Flags::POINT,
                lower: NoLowerLayer,
            },
            ActivationRow {
                flag: Flags::WEIGHT,
                cache: Flags::WEIGHT,
                lower: NoLowerLayer,
            },
        ],
    };
}

pub mod grid_function_element {
    use super::{grid_element, ActivationRow, ActivationTable};

    flag_set! {
        /// Derivatives of a grid function.
        pub struct Flags {
            const D0 = 0;
            const D1 = 1;
            const D2 = 2;
        }
    }

    pub type CacheFlags = Flags;

    pub const TABLE: ActivationTable<Flags, CacheFlags, grid_element::Flags> = ActivationTable {
        layer: "grid function",
        empty_cache: Flags::NONE,
        empty_lower: grid_element::Flags::NONE,
        rows: &[
            ActivationRow {
                flag: Flags::D0,
                cache: Flags::D0,
                lower: grid_element::Flags::POINT,
            },
            ActivationRow {
                flag: Flags::D1,
                cache: Flags::D1,
                lower: grid_element::Flags::POINT,
            },
            ActivationRow {
                flag: Flags::D2,
                cache: Flags::D2,
                lower: grid_element::Flags::POINT,
            },
        ],
    };
}

pub mod domain_element {
    use super::{grid_element, grid_function_element, ActivationRow, ActivationTable};
    use std::ops::BitOr;

    flag_set! {
        /// Quantities provided by a domain.
        pub struct Flags {
            /// Physical points.
            const POINT = 0;
            /// Sub-element measure multiplied by the quadrature weight.
            const W_MEASURE = 1;
            /// Sub-element measure.
            const MEASURE = 2;
            /// Exterior normal of a codimension-one domain.
            const EXT_NORMAL = 3;
            const JACOBIAN = 4;
            const INV_JACOBIAN = 5;
            const HESSIAN = 6;
            const INV_HESSIAN = 7;
            /// Outward unit normal on the faces of the element.
            const BOUNDARY_NORMAL = 8;
        }
    }

    flag_set! {
        /// Quantities stored in the domain cache. Points, Jacobians and Hessians live in the
        /// grid function cache.
        pub struct CacheFlags {
            const MEASURE = 0;
            const INV_JACOBIAN = 1;
            const INV_HESSIAN = 2;
            const EXT_NORMAL = 3;
            const BOUNDARY_NORMAL = 4;
        }
    }

    /// Requests from the domain to the layers below it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LowerFlags {
        pub grid_function: grid_function_element::Flags,
        pub grid: grid_element::Flags,
    }

    impl LowerFlags {
        pub const NONE: Self = Self {
            grid_function: grid_function_element::Flags::NONE,
            grid: grid_element::Flags::NONE,
        };

        const fn grid_function(flags: grid_function_element::Flags) -> Self {
            Self {
                grid_function: flags,
                grid: grid_element::Flags::NONE,
            }
        }
    }

    impl BitOr for LowerFlags {
        type Output = Self;

        fn bitor(self, rhs: Self) -> Self {
            Self {
                grid_function: self.grid_function | rhs.grid_function,
                grid: self.grid | rhs.grid,
            }
        }
    }

    use grid_function_element::Flags as Gf;

    pub const TABLE: ActivationTable<Flags, CacheFlags, LowerFlags> = ActivationTable {
        layer: "domain",
        empty_cache: CacheFlags::NONE,
        empty_lower: LowerFlags::NONE,
        rows: &[
            ActivationRow {
                flag: Flags::POINT,
                cache: CacheFlags::NONE,
                lower: LowerFlags::grid_function(Gf::D0),
            },
            ActivationRow {
                flag: Flags::W_MEASURE,
                cache: CacheFlags::MEASURE,
                lower: LowerFlags {
                    grid_function: Gf::D1,
                    grid: grid_element::Flags::WEIGHT,
                },
            },
            ActivationRow {
                flag: Flags::MEASURE,
                cache: CacheFlags::MEASURE,
                lower: LowerFlags::grid_function(Gf::D1),
            },
            ActivationRow {
                flag: Flags::EXT_NORMAL,
                cache: CacheFlags::EXT_NORMAL,
                lower: LowerFlags::grid_function(Gf::D1),
            },
            ActivationRow {
                flag: Flags::JACOBIAN,
                cache: CacheFlags::NONE,
                lower: LowerFlags::grid_function(Gf::D1),
            },
            ActivationRow {
                flag: Flags::INV_JACOBIAN,
                cache: CacheFlags::INV_JACOBIAN,
                lower: LowerFlags::grid_function(Gf::D1),
            },
            ActivationRow {
                flag: Flags::HESSIAN,
                cache: CacheFlags::NONE,
                lower: LowerFlags::grid_function(Gf::D2),
            },
            ActivationRow {
                flag: Flags::INV_HESSIAN,
                cache: CacheFlags::INV_HESSIAN.union(CacheFlags::INV_JACOBIAN),
                lower: LowerFlags::grid_function(Gf::D1.union(Gf::D2)),
            },
            ActivationRow {
                flag: Flags::BOUNDARY_NORMAL,
                cache: CacheFlags::BOUNDARY_NORMAL.union(CacheFlags::INV_JACOBIAN),
                lower: LowerFlags::grid_function(Gf::D1),
            },
        ],
    };
}

pub mod function_element {
    use super::{domain_element, ActivationRow, ActivationTable};

    flag_set! {
        /// Derivatives of a function defined on a domain.
        pub struct Flags {
            const VALUE = 0;
            const GRADIENT = 1;
            const D2 = 2;
        }
    }

    pub type CacheFlags = Flags;

    pub const TABLE: ActivationTable<Flags, CacheFlags, domain_element::Flags> = ActivationTable {
        layer: "function",
        empty_cache: Flags::NONE,
        empty_lower: domain_element::Flags::NONE,
        rows: &[
            ActivationRow {
                flag: Flags::VALUE,
                cache: Flags::VALUE,
                lower: domain_element::Flags::POINT,
            },
            ActivationRow {
                flag: Flags::GRADIENT,
                cache: Flags::GRADIENT,
                lower: domain_element::Flags::POINT,
            },
            ActivationRow {
                flag: Flags::D2,
                cache: Flags::D2,
                lower: domain_element::Flags::POINT,
            },
        ],
    };
}

pub mod basis_element {
    use super::{domain_element, ActivationRow, ActivationTable};

    flag_set! {
        /// Quantities provided by a basis.
        pub struct Flags {
            const VALUE = 0;
            const GRADIENT = 1;
            const HESSIAN = 2;
            /// Physical points, delegated to the domain.
            const POINT = 3;
            /// Weighted measures, delegated to the domain.
            const W_MEASURE = 4;
        }
    }

    flag_set! {
        /// Quantities stored in the basis cache.
        pub struct CacheFlags {
            const VALUE = 0;
            const GRADIENT = 1;
            const HESSIAN = 2;
            /// Gradients on the reference element.
            const REF_GRADIENT = 3;
            /// Hessians on the reference element.
            const REF_HESSIAN = 4;
        }
    }

    use domain_element::Flags as Domain;

    pub const TABLE: ActivationTable<Flags, CacheFlags, domain_element::Flags> = ActivationTable {
        layer: "basis",
        empty_cache: CacheFlags::NONE,
        empty_lower: Domain::NONE,
        rows: &[
            ActivationRow {
                flag: Flags::VALUE,
                cache: CacheFlags::VALUE,
                lower: Domain::NONE,
            },
            ActivationRow {
                flag: Flags::GRADIENT,
                cache: CacheFlags::GRADIENT.union(CacheFlags::REF_GRADIENT),
                lower: Domain::INV_JACOBIAN,
            },
            ActivationRow {
                flag: Flags::HESSIAN,
                cache: CacheFlags::HESSIAN
                    .union(CacheFlags::REF_GRADIENT)
                    .union(CacheFlags::REF_HESSIAN),
                lower: Domain::INV_JACOBIAN.union(Domain::INV_HESSIAN),
            },
            ActivationRow {
                flag: Flags::POINT,
                cache: CacheFlags::NONE,
                lower: Domain::POINT,
            },
            ActivationRow {
                flag: Flags::W_MEASURE,
                cache: CacheFlags::NONE,
                lower: Domain::W_MEASURE,
            },
        ],
    };
}

/// The activation tables of all layers.
///
/// Handlers receive the tables by reference. [`ActivationTables::standard`] returns the tables
/// used by the library; custom tables can be used to restrict what a handler may compute.
#[derive(Debug, Clone, Copy)]
pub struct ActivationTables {
    pub grid: ActivationTable<grid_element::Flags, grid_element::CacheFlags, NoLowerLayer>,
    pub grid_function:
        ActivationTable<grid_function_element::Flags, grid_function_element::CacheFlags, grid_element::Flags>,
    pub domain: ActivationTable<domain_element::Flags, domain_element::CacheFlags, domain_element::LowerFlags>,
    pub function: ActivationTable<function_element::Flags, function_element::CacheFlags, domain_element::Flags>,
    pub basis: ActivationTable<basis_element::Flags, basis_element::CacheFlags, domain_element::Flags>,
}

impl ActivationTables {
    pub const STANDARD: Self = Self {
        grid: grid_element::TABLE,
        grid_function: grid_function_element::TABLE,
        domain: domain_element::TABLE,
        function: function_element::TABLE,
        basis: basis_element::TABLE,
    };

    pub fn standard() -> &'static Self {
        static STANDARD: ActivationTables = ActivationTables::STANDARD;
        &STANDARD
    }
}

/// Fully resolved flags of a basis request, one entry per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedBasisFlags {
    pub basis: basis_element::CacheFlags,
    pub domain: domain_element::CacheFlags,
    pub grid_function: grid_function_element::CacheFlags,
    pub grid: grid_element::CacheFlags,
}

impl ActivationTables {
    /// Resolves a grid function request down to the grid.
    pub fn resolve_grid_function(
        &self,
        request: grid_function_element::Flags,
    ) -> Result<(grid_function_element::CacheFlags, grid_element::CacheFlags), Error> {
        let gf = self.grid_function.activate(request)?;
        let grid = self.grid.activate(gf.lower)?;
        Ok((gf.cache, grid.cache))
    }

    /// Resolves a domain request down to the grid.
    pub fn resolve_domain(
        &self,
        request: domain_element::Flags,
    ) -> Result<
        (
            domain_element::CacheFlags,
            grid_function_element::CacheFlags,
            grid_element::CacheFlags,
        ),
        Error,
    > {
        let domain = self.domain.activate(request)?;
        let (gf_cache, grid_from_gf) = self.resolve_grid_function(domain.lower.grid_function)?;
        let grid = self.grid.activate(domain.lower.grid)?;
        Ok((domain.cache, gf_cache, grid_from_gf | grid.cache))
    }

    /// Resolves a basis request down to the grid.
    pub fn resolve_basis(&self, request: basis_element::Flags) -> Result<ResolvedBasisFlags, Error> {
        let basis = self.basis.activate(request)?;
        let (domain, grid_function, grid) = self.resolve_domain(basis.lower)?;
        Ok(ResolvedBasisFlags {
            basis: basis.cache,
            domain,
            grid_function,
            grid,
        })
    }
}
