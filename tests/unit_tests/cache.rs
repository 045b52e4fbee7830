use crate::{box_grid, gauss};
use igatools::cache::{CacheError, CopyPolicy, ValueTable};
use igatools::flags::grid_element::Flags;
use igatools::grid::{ElementAccessor, GridHandler, QuadPoints, QuadWeights, ACTIVE};
use igatools::Error;
use matrixcompare::assert_scalar_eq;
use nalgebra::Point2;
use util::{assert_error_matches, assert_panics};

#[test]
fn value_table_is_function_major() {
    let table = ValueTable::from_fn(2, 3, |f, q| 10 * f + q);
    assert_eq!(table.num_functions(), 2);
    assert_eq!(table.num_points(), 3);
    assert_eq!(table.function_values(1), &[10, 11, 12]);
    assert_eq!(table.point_values(2).copied().collect::<Vec<_>>(), vec![2, 12]);
    assert_eq!(*table.get(0, 1), 1);
    assert_panics!(table.get(2, 0));
    assert_panics!(table.get(0, 3));
}

#[test]
fn filled_points_and_weights() {
    let grid = box_grid::<2>(0.0, 2.0, 2);
    let quadrature = gauss(2, 2);
    let mut handler = GridHandler::new(&grid);
    handler.reset(Flags::POINT | Flags::WEIGHT, &quadrature).unwrap();

    let mut element = grid.begin();
    element.move_to(3);
    handler.init_cache(&mut element, 2).unwrap();
    handler.fill_cache(&mut element, 2, 0).unwrap();

    let reference = quadrature.point::<2>(0);
    assert_eq!(element.points(2, 0)[0], Point2::new(1.0 + reference[0], 1.0 + reference[1]));
    let weight_sum: f64 = element.weights(2, 0).iter().sum();
    assert_scalar_eq!(weight_sum, 1.0, comp = abs, tol = 1e-14);
}

#[test]
fn cache_entries_report_their_status() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let quadrature = gauss(2, 2);
    let mut handler = GridHandler::new(&grid);
    handler.reset(Flags::POINT, &quadrature).unwrap();
    let mut element = grid.begin();

    assert_eq!(
        element.cache().borrow().try_get::<QuadPoints>(2, 0).unwrap_err(),
        CacheError::NotInitialized { k: 2 }
    );
    // Filling before initializing is a sequencing error
    assert_panics!(handler.fill_cache(&mut grid.begin(), 2, 0));

    handler.init_cache(&mut element, 2).unwrap();
    assert_eq!(
        element.cache().borrow().try_get::<QuadPoints>(2, 0).unwrap_err(),
        CacheError::NotFilled {
            quantity: "points",
            k: 2,
            j: 0
        }
    );

    handler.fill_cache(&mut element, 2, 0).unwrap();
    assert_eq!(element.points(2, 0).len(), 4);
    assert!(matches!(
        element.cache().borrow().try_get::<QuadWeights>(2, 0),
        Err(CacheError::NotRequested { k: 2, .. })
    ));
}

#[test]
#[should_panic(expected = "has not been filled for sub-element 0 of dimension 2")]
fn reading_unfilled_entry_panics() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let mut handler = GridHandler::new(&grid);
    handler.reset(Flags::POINT, &gauss(2, 2)).unwrap();
    let mut element = grid.begin();
    handler.init_cache(&mut element, 2).unwrap();
    let _ = element.points(2, 0);
}

#[test]
#[should_panic(expected = "was not requested")]
fn reading_unrequested_entry_panics() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let mut handler = GridHandler::new(&grid);
    handler.reset(Flags::POINT, &gauss(2, 2)).unwrap();
    let mut element = grid.begin();
    handler.init_cache(&mut element, 2).unwrap();
    handler.fill_cache(&mut element, 2, 0).unwrap();
    let _ = element.weights(2, 0);
}

#[test]
#[should_panic(expected = "sub-element index 4 is out of range: valid range is [0, 4)")]
fn filling_out_of_range_sub_element_panics() {
    let grid = box_grid::<2>(0.0, 1.0, 1);
    let mut handler = GridHandler::new(&grid);
    handler.reset(Flags::POINT, &gauss(1, 2)).unwrap();
    let mut element = grid.begin();
    handler.init_cache(&mut element, 1).unwrap();
    handler.fill_cache(&mut element, 1, 4).unwrap();
}

#[test]
fn moving_invalidates_filled_entries() {
    let grid = box_grid::<1>(0.0, 1.0, 3);
    let quadrature = gauss(1, 2);
    let mut handler = GridHandler::new(&grid);
    handler.reset(Flags::POINT, &quadrature).unwrap();
    let mut element = grid.begin();
    handler.init_cache(&mut element, 1).unwrap();
    handler.fill_cache(&mut element, 1, 0).unwrap();
    assert!(element.cache().borrow().is_filled::<QuadPoints>(1, 0));

    element.advance();
    assert!(!element.cache().borrow().is_filled::<QuadPoints>(1, 0));
    // Storage survives the move, so filling without init works
    handler.fill_cache(&mut element, 1, 0).unwrap();
    assert!(element.points(1, 0)[0][0] > 1.0 / 3.0);
}

#[test]
fn faces_and_vertices_are_filled_per_sub_element() {
    let grid = box_grid::<2>(0.0, 1.0, 1);
    let mut handler = GridHandler::new(&grid);
    handler.reset(Flags::POINT | Flags::WEIGHT, &gauss(2, 2)).unwrap();
    handler.reset(Flags::POINT | Flags::WEIGHT, &gauss(1, 3)).unwrap();
    handler.reset(Flags::POINT, &gauss(0, 1)).unwrap();
    assert_eq!(handler.quadrature(1).map(|q| q.num_points()), Some(3));

    let mut element = grid.begin();
    handler.init_cache(&mut element, 1).unwrap();
    handler.init_cache(&mut element, 0).unwrap();
    for face in 0..4 {
        handler.fill_cache(&mut element, 1, face).unwrap();
        let value = if face % 2 == 0 { 0.0 } else { 1.0 };
        assert!(element.points(1, face).iter().all(|p| p[face / 2] == value));
        let length: f64 = element.weights(1, face).iter().sum();
        assert_scalar_eq!(length, 1.0, comp = abs, tol = 1e-14);
    }
    handler.fill_cache(&mut element, 0, 3).unwrap();
    assert_eq!(&*element.points(0, 3), &[Point2::new(1.0, 1.0)]);
}

#[test]
fn deep_and_shallow_copies() {
    let grid = box_grid::<1>(0.0, 1.0, 2);
    let mut handler = GridHandler::new(&grid);
    handler.reset(Flags::POINT, &gauss(1, 1)).unwrap();
    let mut element = grid.begin().into_accessor();
    handler.init_cache(&mut element, 1).unwrap();
    handler.fill_cache(&mut element, 1, 0).unwrap();

    let deep = element.copy(CopyPolicy::Deep);
    let shallow = element.copy(CopyPolicy::Shallow);
    assert!(!deep.shares_cache_with(&element));
    assert!(shallow.shares_cache_with(&element));
    assert_eq!(deep.points(1, 0)[0], element.points(1, 0)[0]);

    element.cache().borrow_mut().clear_filled();
    assert!(deep.cache().borrow().is_filled::<QuadPoints>(1, 0));
    assert!(!shallow.cache().borrow().is_filled::<QuadPoints>(1, 0));
}

#[test]
fn shallow_copies_see_refills_of_the_original() {
    let grid = box_grid::<1>(0.0, 1.0, 2);
    let mut handler = GridHandler::new(&grid);
    handler.reset(Flags::POINT, &gauss(1, 1)).unwrap();
    let mut element = grid.begin().into_accessor();
    handler.init_cache(&mut element, 1).unwrap();
    handler.fill_cache(&mut element, 1, 0).unwrap();

    let deep = element.copy(CopyPolicy::Deep);
    let shallow = element.copy(CopyPolicy::Shallow);
    element.advance();
    handler.fill_cache(&mut element, 1, 0).unwrap();

    assert_eq!(element.points(1, 0)[0][0], 0.75);
    assert_eq!(shallow.points(1, 0)[0][0], 0.75);
    assert_eq!(deep.points(1, 0)[0][0], 0.25);
    // The copies keep their own position
    assert_eq!(shallow.flat_index(), 0);
    assert_eq!(deep.flat_index(), 0);
}

#[test]
fn selections_are_kept_per_dimension() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let mut handler = GridHandler::new(&grid);
    handler.reset_one_element(Flags::POINT, &gauss(2, 2), 0).unwrap();
    handler.reset(Flags::POINT, &gauss(1, 2)).unwrap();
    assert_eq!(handler.selected_elements(2).len(), 1);
    assert_eq!(handler.selected_elements(1).len(), 4);
    assert!(handler.is_selected(1, 3));
    assert!(!handler.is_selected(2, 3));
    assert!(!handler.is_selected(0, 0));

    let mut element = grid.begin();
    handler.init_cache(&mut element, 2).unwrap();
    handler.init_cache(&mut element, 1).unwrap();
    handler.fill_cache(&mut element, 2, 0).unwrap();
    element.move_to(3);
    handler.fill_cache(&mut element, 1, 1).unwrap();
    assert!(element.points(1, 1).iter().all(|p| p[0] == 1.0));
}

#[test]
#[should_panic(expected = "element 3 is not among the 1 elements selected for dimension 2")]
fn reselecting_another_dimension_keeps_the_selection() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let mut handler = GridHandler::new(&grid);
    handler.reset_one_element(Flags::POINT, &gauss(2, 2), 0).unwrap();
    handler.reset(Flags::POINT, &gauss(1, 2)).unwrap();
    let mut element = grid.begin();
    element.move_to(3);
    handler.init_cache(&mut element, 2).unwrap();
    let _ = handler.fill_cache(&mut element, 2, 0);
}

#[test]
fn grids_without_active_elements_can_be_reset() {
    let mut grid = box_grid::<2>(0.0, 1.0, 2);
    grid.set_property(ACTIVE, 0..4, false).unwrap();
    let mut handler = GridHandler::new(&grid);
    handler.reset(Flags::POINT, &gauss(2, 2)).unwrap();
    assert!(handler.selected_elements(2).is_empty());
    assert_eq!(handler.flags(2), Some(Flags::POINT));
    assert!(grid.begin() == grid.end());
}

#[test]
fn handler_configuration_errors() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let mut handler = GridHandler::new(&grid);
    let mut element = grid.begin();
    assert_error_matches!(
        handler.init_cache(&mut element, 2),
        Error,
        Error::TopologyNotConfigured { k: 2 }
    );
    assert_error_matches!(
        handler.reset(Flags::POINT, &gauss(3, 1)),
        Error,
        Error::SubElementDimensionOutOfRange { k: 3, dim: 2 }
    );
    assert_error_matches!(
        handler.reset_selected_elements(Flags::POINT, &gauss(2, 1), Vec::<usize>::new()),
        Error,
        Error::EmptyElementSelection
    );
    assert_error_matches!(
        handler.reset_selected_elements(Flags::POINT, &gauss(2, 1), [1, 4]),
        Error,
        Error::ElementOutOfRange { index: 4, .. }
    );
    assert_error_matches!(
        handler.reset(Flags::from_bits_retain(1 << 9), &gauss(2, 1)),
        Error,
        Error::UnsupportedFlags { .. }
    );
}

#[test]
fn only_selected_elements_can_be_filled() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let mut handler = GridHandler::new(&grid);
    handler.reset_one_element(Flags::POINT, &gauss(2, 1), 2).unwrap();
    assert!(handler.is_selected(2, 2));
    assert!(!handler.is_selected(2, 0));

    let mut element = grid.begin();
    handler.init_cache(&mut element, 2).unwrap();
    assert_panics!(handler.fill_cache(&mut grid.begin(), 2, 0));
    element.move_to(2);
    handler.fill_cache(&mut element, 2, 0).unwrap();
    assert_eq!(element.points(2, 0)[0], Point2::new(0.25, 0.75));

    // Same flags and quadrature: only the selection changes
    handler.reset_selected_elements(Flags::POINT, &gauss(2, 1), [0, 1]).unwrap();
    assert_eq!(handler.selected_elements(2).len(), 2);
    assert_eq!(handler.flags(2), Some(Flags::POINT));
}
