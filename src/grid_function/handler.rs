use crate::flags::{grid_element, grid_function_element, ActivationTables};
use crate::grid::{ElementSelection, GridHandler};
use crate::grid_function::{
    GridFunction, GridFunctionElement, GridFunctionHessians, GridFunctionJacobians, GridFunctionValues,
};
use crate::quadrature::TensorProductQuadrature;
use crate::{Error, Real};
use log::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GridFunctionSetup {
    requested: grid_function_element::Flags,
    extra_grid: grid_element::Flags,
    flags: grid_function_element::CacheFlags,
    grid: grid_element::Flags,
}

/// Computes grid function values and derivatives on grid elements.
#[derive(Debug)]
pub struct GridFunctionHandler<'a, T: Real, const D: usize, const S: usize> {
    function: &'a dyn GridFunction<T, D, S>,
    grid_handler: GridHandler<'a, T, D>,
    topologies: Vec<Option<GridFunctionSetup>>,
}

impl<'a, T: Real, const D: usize, const S: usize> GridFunctionHandler<'a, T, D, S> {
    pub fn new(function: &'a dyn GridFunction<T, D, S>) -> Self {
        Self::with_tables(function, ActivationTables::standard())
    }

    pub fn with_tables(function: &'a dyn GridFunction<T, D, S>, tables: &'a ActivationTables) -> Self {
        Self {
            function,
            grid_handler: GridHandler::with_tables(function.grid(), tables),
            topologies: vec![None; D + 1],
        }
    }

    pub fn function(&self) -> &'a dyn GridFunction<T, D, S> {
        self.function
    }

    pub fn grid_handler(&self) -> &GridHandler<'a, T, D> {
        &self.grid_handler
    }

    pub fn reset(
        &mut self,
        flags: grid_function_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
    ) -> eyre::Result<()> {
        self.reset_with_grid_flags(flags, grid_element::Flags::NONE, quadrature, ElementSelection::Active)
    }

    pub fn reset_selected_elements(
        &mut self,
        flags: grid_function_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        elements: impl IntoIterator<Item = usize>,
    ) -> eyre::Result<()> {
        let selection = ElementSelection::from_elements(elements);
        self.reset_with_grid_flags(flags, grid_element::Flags::NONE, quadrature, selection)
    }

    pub fn reset_one_element(
        &mut self,
        flags: grid_function_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        element: usize,
    ) -> eyre::Result<()> {
        self.reset_selected_elements(flags, quadrature, [element])
    }

    /// Resets the handler, additionally requesting `extra_grid` from the grid.
    ///
    /// Used by layers that need grid quantities besides those required by the grid function.
    pub(crate) fn reset_with_grid_flags(
        &mut self,
        flags: grid_function_element::Flags,
        extra_grid: grid_element::Flags,
        quadrature: &TensorProductQuadrature<T>,
        selection: ElementSelection,
    ) -> eyre::Result<()> {
        let k = quadrature.dim();
        if k > D {
            return Err(Error::SubElementDimensionOutOfRange { k, dim: D }.into());
        }
        let grid_flags = match self.topologies[k] {
            Some(setup) if setup.requested == flags && setup.extra_grid == extra_grid => {
                trace!("Grid function handler: dimension {} unchanged", k);
                setup.grid
            }
            _ => {
                let activation = self.grid_handler.tables().grid_function.activate(flags)?;
                let grid_flags = activation.lower | extra_grid;
                self.topologies[k] = Some(GridFunctionSetup {
                    requested: flags,
                    extra_grid,
                    flags: activation.cache,
                    grid: grid_flags,
                });
                debug!(
                    "Grid function handler reset for dimension {}: {:?}, grid {:?}",
                    k, activation.cache, grid_flags
                );
                grid_flags
            }
        };
        self.grid_handler
            .reset_elements(grid_flags, quadrature, selection)
    }

    pub fn flags(&self, k: usize) -> Option<grid_function_element::CacheFlags> {
        self.topologies.get(k)?.map(|setup| setup.flags)
    }

    pub fn init_cache(&self, element: &mut GridFunctionElement<'_, T, D, S>, k: usize) -> eyre::Result<()> {
        self.grid_handler.init_cache(element.grid_element_mut(), k)?;
        let flags = self.flags(k).unwrap_or(grid_function_element::Flags::NONE);
        let n_points = self.grid_handler.quadratures(k)?.num_points();
        element.cache().borrow_mut().init(k, flags, n_points, 1);
        Ok(())
    }

    /// Computes the requested grid function quantities on sub-element `j` of dimension `k`.
    ///
    /// # Panics
    ///
    /// Panics if the element is not selected or its cache has not been initialized for `k`.
    pub fn fill_cache(&self, element: &mut GridFunctionElement<'_, T, D, S>, k: usize, j: usize) -> eyre::Result<()> {
        self.grid_handler
            .fill_cache(element.grid_element_mut(), k, j)?;
        let flags = self.flags(k).unwrap_or(grid_function_element::Flags::NONE);
        if flags.is_empty() {
            return Ok(());
        }
        let points = element.parametric_points(k, j);
        let mut cache = element.cache().borrow_mut();
        use grid_function_element::Flags;
        if flags.contains(Flags::D0) {
            cache.fill::<GridFunctionValues, _>(k, j, |values| {
                self.function.evaluate_0(&points, values.function_values_mut(0))
            });
        }
        if flags.contains(Flags::D1) {
            cache.fill::<GridFunctionJacobians, _>(k, j, |jacobians| {
                self.function
                    .evaluate_1(&points, jacobians.function_values_mut(0))
            });
        }
        if flags.contains(Flags::D2) {
            cache.fill::<GridFunctionHessians, _>(k, j, |hessians| {
                self.function
                    .evaluate_2(&points, hessians.function_values_mut(0))
            });
        }
        Ok(())
    }
}
