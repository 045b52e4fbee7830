use crate::flags::{grid_element, ActivationTables};
use crate::grid::{ElementAccessor, Grid, GridElement, QuadPoints, QuadWeights};
use crate::quadrature::TensorProductQuadrature;
use crate::topology::{n_sub_elements, SubElementTopology, UnitElement};
use crate::{Error, Real};
use log::{debug, trace};
use nalgebra::Point;
use std::collections::BTreeSet;

/// Quadrature of one sub-element dimension together with its embedding into each sub-element.
#[derive(Debug, Clone)]
pub(crate) struct SubElementQuadratures<T, const D: usize> {
    quadrature: TensorProductQuadrature<T>,
    sub_elements: Vec<SubElementTopology<D>>,
    extended: Vec<TensorProductQuadrature<T>>,
}

impl<T: Real, const D: usize> SubElementQuadratures<T, D> {
    pub(crate) fn new(quadrature: &TensorProductQuadrature<T>) -> eyre::Result<Self> {
        let k = quadrature.dim();
        if k > D {
            return Err(Error::SubElementDimensionOutOfRange { k, dim: D }.into());
        }
        let sub_elements: Vec<_> = UnitElement::<D>::sub_elements(k).collect();
        let extended = sub_elements
            .iter()
            .map(|sub_element| quadrature.extend_to_sub_element(sub_element))
            .collect::<eyre::Result<_>>()?;
        Ok(Self {
            quadrature: quadrature.clone(),
            sub_elements,
            extended,
        })
    }

    pub(crate) fn quadrature(&self) -> &TensorProductQuadrature<T> {
        &self.quadrature
    }

    pub(crate) fn sub_element(&self, j: usize) -> &SubElementTopology<D> {
        &self.sub_elements[j]
    }

    /// The quadrature mapped to sub-element `j`.
    ///
    /// # Panics
    ///
    /// Panics if `j` is not a sub-element of the quadrature's dimension.
    pub(crate) fn extended(&self, j: usize) -> &TensorProductQuadrature<T> {
        let n = self.extended.len();
        assert!(j < n, "sub-element index {j} is out of range: valid range is [0, {n})");
        &self.extended[j]
    }

    pub(crate) fn num_points(&self) -> usize {
        self.quadrature.num_points()
    }
}

/// The elements a reset applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ElementSelection {
    /// Every element with the `active` property, possibly none.
    Active,
    /// An explicit list of elements, which must not be empty.
    Elements(BTreeSet<usize>),
}

impl ElementSelection {
    pub(crate) fn from_elements(elements: impl IntoIterator<Item = usize>) -> Self {
        Self::Elements(elements.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
struct GridTopologySetup<T, const D: usize> {
    flags: grid_element::CacheFlags,
    quadratures: SubElementQuadratures<T, D>,
}

/// Computes grid quantities (mapped quadrature points and scaled weights) on grid elements.
///
/// A handler is configured per sub-element dimension `k` by one of the `reset` methods, which
/// resolve the requested flags and associate a `k`-dimensional quadrature and an element selection
/// with the dimension. Selections of different dimensions are independent. Elements are then
/// prepared with [`init_cache`](Self::init_cache) and
/// [`fill_cache`](Self::fill_cache).
#[derive(Debug)]
pub struct GridHandler<'a, T: Real, const D: usize> {
    grid: &'a Grid<T, D>,
    tables: &'a ActivationTables,
    topologies: Vec<Option<GridTopologySetup<T, D>>>,
    selections: Vec<BTreeSet<usize>>,
}

impl<'a, T: Real, const D: usize> GridHandler<'a, T, D> {
    pub fn new(grid: &'a Grid<T, D>) -> Self {
        Self::with_tables(grid, ActivationTables::standard())
    }

    pub fn with_tables(grid: &'a Grid<T, D>, tables: &'a ActivationTables) -> Self {
        Self {
            grid,
            tables,
            topologies: vec![None; D + 1],
            selections: vec![BTreeSet::new(); D + 1],
        }
    }

    pub fn grid(&self) -> &'a Grid<T, D> {
        self.grid
    }

    pub fn tables(&self) -> &'a ActivationTables {
        self.tables
    }

    /// Configures the dimension of `quadrature` for all active elements.
    ///
    /// A grid without active elements is accepted: the dimension is configured and no element
    /// can be filled.
    pub fn reset(&mut self, flags: grid_element::Flags, quadrature: &TensorProductQuadrature<T>) -> eyre::Result<()> {
        self.reset_elements(flags, quadrature, ElementSelection::Active)
    }

    /// Configures the dimension of `quadrature` for the given elements only.
    ///
    /// Flag resolution is skipped if the dimension is already configured with the same flags and
    /// quadrature. Returns [`Error::EmptyElementSelection`] if `elements` is empty.
    pub fn reset_selected_elements(
        &mut self,
        flags: grid_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        elements: impl IntoIterator<Item = usize>,
    ) -> eyre::Result<()> {
        self.reset_elements(flags, quadrature, ElementSelection::from_elements(elements))
    }

    pub(crate) fn reset_elements(
        &mut self,
        flags: grid_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        selection: ElementSelection,
    ) -> eyre::Result<()> {
        let selection = match selection {
            ElementSelection::Active => self.grid.elements_with_property(crate::grid::ACTIVE)?.clone(),
            ElementSelection::Elements(elements) => validate_selection(self.grid.num_elements(), elements)?,
        };
        let k = quadrature.dim();
        if k > D {
            return Err(Error::SubElementDimensionOutOfRange { k, dim: D }.into());
        }
        let unchanged = matches!(
            &self.topologies[k],
            Some(setup) if setup.flags == flags && setup.quadratures.quadrature() == quadrature
        );
        if unchanged {
            trace!("Grid handler: dimension {} unchanged, only updating element selection", k);
        } else {
            let activation = self.tables.grid.activate(flags)?;
            self.topologies[k] = Some(GridTopologySetup {
                flags: activation.cache,
                quadratures: SubElementQuadratures::new(quadrature)?,
            });
            debug!(
                "Grid handler reset for dimension {}: {:?}, {} points per sub-element",
                k,
                activation.cache,
                quadrature.num_points()
            );
        }
        self.selections[k] = selection;
        Ok(())
    }

    /// Configures the dimension of `quadrature` for a single element.
    pub fn reset_one_element(
        &mut self,
        flags: grid_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        element: usize,
    ) -> eyre::Result<()> {
        self.reset_selected_elements(flags, quadrature, [element])
    }

    fn setup(&self, k: usize) -> eyre::Result<&GridTopologySetup<T, D>> {
        if k > D {
            return Err(Error::SubElementDimensionOutOfRange { k, dim: D }.into());
        }
        Ok(self.topologies[k]
            .as_ref()
            .ok_or(Error::TopologyNotConfigured { k })?)
    }

    /// The resolved cache flags of dimension `k`, if configured.
    pub fn flags(&self, k: usize) -> Option<grid_element::CacheFlags> {
        self.topologies.get(k)?.as_ref().map(|setup| setup.flags)
    }

    pub fn quadrature(&self, k: usize) -> Option<&TensorProductQuadrature<T>> {
        self.topologies
            .get(k)?
            .as_ref()
            .map(|setup| setup.quadratures.quadrature())
    }

    pub(crate) fn quadratures(&self, k: usize) -> eyre::Result<&SubElementQuadratures<T, D>> {
        Ok(&self.setup(k)?.quadratures)
    }

    /// The elements selected at the last reset of dimension `k`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is larger than the grid dimension.
    pub fn selected_elements(&self, k: usize) -> &BTreeSet<usize> {
        &self.selections[k]
    }

    pub fn is_selected(&self, k: usize, flat: usize) -> bool {
        self.selections
            .get(k)
            .map_or(false, |selection| selection.contains(&flat))
    }

    pub(crate) fn assert_selected(&self, k: usize, flat: usize) {
        assert!(
            self.is_selected(k, flat),
            "element {} is not among the {} elements selected for dimension {}",
            flat,
            self.selections[k].len(),
            k
        );
    }

    /// Allocates the element's cache for all sub-elements of dimension `k`.
    pub fn init_cache(&self, element: &mut GridElement<'_, T, D>, k: usize) -> eyre::Result<()> {
        let setup = self.setup(k)?;
        element
            .cache()
            .borrow_mut()
            .init(k, setup.flags, setup.quadratures.num_points(), 1);
        Ok(())
    }

    /// Computes the requested grid quantities on sub-element `j` of dimension `k`.
    ///
    /// # Panics
    ///
    /// Panics if `j` is not a sub-element of dimension `k`, if the element is not selected for
    /// `k` or if its cache has not been initialized for `k`.
    pub fn fill_cache(&self, element: &mut GridElement<'_, T, D>, k: usize, j: usize) -> eyre::Result<()> {
        let setup = self.setup(k)?;
        let n = n_sub_elements(D, k);
        assert!(j < n, "sub-element index {j} is out of range: valid range is [0, {n})");
        let flat = element.flat_index();
        self.assert_selected(k, flat);
        let quadrature = setup.quadratures.extended(j);
        let mut cache = element.cache().borrow_mut();

        if setup.flags.contains(grid_element::Flags::POINT) {
            let (lower, _) = self.grid.element_bounds(flat);
            let lengths = self.grid.element_lengths(flat);
            cache.fill::<QuadPoints, _>(k, j, |points| {
                points.assign(|_, q| {
                    let reference = quadrature.point::<D>(q);
                    Point::from(lower + lengths.component_mul(&reference.coords))
                })
            });
        }
        if setup.flags.contains(grid_element::Flags::WEIGHT) {
            let measure = self
                .grid
                .element_measure(flat, setup.quadratures.sub_element(j));
            cache.fill::<QuadWeights, _>(k, j, |weights| weights.assign(|_, q| quadrature.weight(q) * measure));
        }
        Ok(())
    }
}

/// Checks that an explicit element selection is non-empty and in range.
fn validate_selection(num_elements: usize, selection: BTreeSet<usize>) -> eyre::Result<BTreeSet<usize>> {
    if selection.is_empty() {
        return Err(Error::EmptyElementSelection.into());
    }
    if let Some(&index) = selection.iter().next_back() {
        if index >= num_elements {
            return Err(Error::ElementOutOfRange { index, num_elements }.into());
        }
    }
    Ok(selection)
}
