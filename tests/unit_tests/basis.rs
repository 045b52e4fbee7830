use crate::{box_grid, gauss};
use igatools::basis::{
    boundary_dofs, evaluate_univariate, refinement_matrix, Basis, BasisHandler, EndBehaviour, ReferenceBasis,
    ReferenceElementHandler, SplineSpace,
};
use igatools::domain::Domain;
use igatools::flags::basis_element::Flags;
use igatools::grid::Grid;
use igatools::grid_function::{IdentityGridFunction, LinearGridFunction, PolarGridFunction};
use igatools::Error;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{matrix, DVector, Matrix2, Vector2};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::f64::consts::FRAC_PI_2;
use util::assert_error_matches;

/// Greville abscissae of the functions of one direction.
fn greville(space: &SplineSpace<'_, f64, 2>, direction: usize) -> Vec<f64> {
    let p = space.degree()[direction];
    let knots = space.knots(direction);
    (0..knots.len() - p - 1)
        .map(|i| knots[i + 1..=i + p].iter().sum::<f64>() / p as f64)
        .collect()
}

#[test]
fn zero_degree_is_rejected() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    assert_error_matches!(
        SplineSpace::new(&grid, [2, 0]),
        Error,
        Error::InvalidDegree { direction: 1, degree: 0 }
    );
}

#[test]
fn space_dimensions() {
    let grid = Grid::<f64, 2>::new([vec![0.0, 0.5, 1.0], vec![0.0, 0.25, 0.5, 1.0]]).unwrap();
    let space = SplineSpace::new(&grid, [2, 1]).unwrap();
    assert_eq!(space.knots(0), &[0.0, 0.0, 0.0, 0.5, 1.0, 1.0, 1.0]);
    assert_eq!(space.knots(1), &[0.0, 0.0, 0.25, 0.5, 1.0, 1.0]);
    assert_eq!(space.dof_distribution().num_basis_per_direction(), &[4, 4]);
    assert_eq!(space.num_dofs(), 16);
    assert_eq!(space.num_element_basis(), 6);
    // Element (1, 2): functions 1..=3 in direction 0 and 2..=3 in direction 1
    assert_eq!(space.local_to_global(5), vec![9, 10, 11, 13, 14, 15]);
}

#[test]
fn basis_requires_a_common_grid() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let other = box_grid::<2>(0.0, 1.0, 2);
    let identity = IdentityGridFunction::new(&other);
    let space = SplineSpace::with_uniform_degree(&grid, 2).unwrap();
    assert_error_matches!(
        Basis::new(ReferenceBasis::BSpline(space), Domain::new(&identity)),
        Error,
        Error::GridMismatch
    );
}

#[test]
fn linear_partition_of_unity() {
    let grid = Grid::<f64, 1>::new([vec![0.0, 0.5, 1.0]]).unwrap();
    let identity = IdentityGridFunction::new(&grid);
    let space = SplineSpace::with_uniform_degree(&grid, 1).unwrap();
    let basis = Basis::new(ReferenceBasis::BSpline(space), Domain::new(&identity)).unwrap();
    assert_eq!(basis.num_dofs(), 3);

    let mut handler = BasisHandler::new(&basis);
    handler.reset(Flags::VALUE | Flags::GRADIENT, &gauss(1, 2)).unwrap();
    let mut element = basis.begin();
    let end = basis.end();
    let mut dofs = Vec::new();
    while element != end {
        handler.init_cache(&mut element, 1).unwrap();
        handler.fill_cache(&mut element, 1, 0).unwrap();
        {
            let values = element.values(1, 0);
            let gradients = element.gradients(1, 0);
            assert_eq!(values.num_functions(), 2);
            assert_eq!(values.num_points(), 2);
            for q in 0..2 {
                assert_scalar_eq!(values.point_values(q).sum::<f64>(), 1.0, comp = abs, tol = 1e-14);
                let slope: f64 = gradients.point_values(q).map(|g| g[0]).sum();
                assert_scalar_eq!(slope, 0.0, comp = abs, tol = 1e-12);
                // Hat functions on intervals of length 1/2
                assert_scalar_eq!(gradients.get(0, q)[0], -2.0, comp = abs, tol = 1e-12);
                assert_scalar_eq!(gradients.get(1, q)[0], 2.0, comp = abs, tol = 1e-12);
            }
        }
        dofs.push(element.local_to_global());
        element.advance();
    }
    assert_eq!(dofs, vec![vec![0, 1], vec![1, 2]]);
}

#[test]
fn quadratic_partition_of_unity_on_faces() {
    let grid = box_grid::<2>(0.0, 1.0, 3);
    let identity = IdentityGridFunction::new(&grid);
    let space = SplineSpace::with_uniform_degree(&grid, 2).unwrap();
    let basis = Basis::new(ReferenceBasis::BSpline(space), Domain::new(&identity)).unwrap();
    let mut handler = BasisHandler::new(&basis);
    handler.reset(Flags::VALUE | Flags::HESSIAN, &gauss(1, 3)).unwrap();

    let mut element = basis.begin();
    element.move_to(4);
    handler.init_cache(&mut element, 1).unwrap();
    for face in 0..4 {
        handler.fill_cache(&mut element, 1, face).unwrap();
        let values = element.values(1, face);
        let hessians = element.hessians(1, face);
        assert_eq!(values.num_functions(), 9);
        for q in 0..3 {
            assert_scalar_eq!(values.point_values(q).sum::<f64>(), 1.0, comp = abs, tol = 1e-13);
            let hessian_sum = hessians.point_values(q).fold(Matrix2::zeros(), |sum, h| sum + h);
            assert_matrix_eq!(hessian_sum, Matrix2::<f64>::zeros(), comp = abs, tol = 1e-10);
        }
    }
}

#[test]
fn open_knots_interpolate_at_the_boundary() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let identity = IdentityGridFunction::new(&grid);
    let space = SplineSpace::with_uniform_degree(&grid, 2).unwrap();
    let basis = Basis::new(ReferenceBasis::BSpline(space), Domain::new(&identity)).unwrap();
    let mut handler = BasisHandler::new(&basis);
    handler.reset(Flags::VALUE, &gauss(0, 1)).unwrap();
    let mut element = basis.begin();
    handler.init_cache(&mut element, 0).unwrap();
    // Vertex (0, 0) of element 0 is a corner of the domain: only the first function is non-zero
    handler.fill_cache(&mut element, 0, 0).unwrap();
    let values = element.values(0, 0);
    assert_scalar_eq!(*values.get(0, 0), 1.0, comp = abs, tol = 1e-14);
    for f in 1..9 {
        assert_scalar_eq!(*values.get(f, 0), 0.0, comp = abs, tol = 1e-14);
    }
}

#[test]
fn gradients_are_pushed_forward_by_linear_maps() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let a = matrix![2.0, 1.0; -1.0, 3.0];
    let map = LinearGridFunction::new(&grid, a, Vector2::zeros()).unwrap();
    let space = SplineSpace::with_uniform_degree(&grid, 2).unwrap();
    let basis = Basis::new(ReferenceBasis::BSpline(space), Domain::new(&map)).unwrap();
    let mut handler = BasisHandler::new(&basis);
    handler.reset(Flags::GRADIENT, &gauss(2, 2)).unwrap();

    let mut element = basis.begin();
    element.move_to(3);
    handler.init_cache(&mut element, 2).unwrap();
    handler.fill_cache(&mut element, 2, 0).unwrap();
    let inverse_transpose = a.try_inverse().unwrap().transpose();
    let gradients = element.gradients(2, 0);
    let ref_gradients = element.ref_gradients(2, 0);
    for f in 0..gradients.num_functions() {
        for q in 0..gradients.num_points() {
            assert_matrix_eq!(
                *gradients.get(f, q),
                inverse_transpose * ref_gradients.get(f, q),
                comp = abs,
                tol = 1e-12
            );
        }
    }
}

#[test]
fn polar_basis_reproduces_the_radius() {
    // Sum of Greville abscissae times basis functions reproduces the parametric coordinate, so
    // in physical space it is r = |x| with known derivatives
    let grid = Grid::new([vec![1.0, 1.5, 2.0], vec![0.0, FRAC_PI_2 / 2.0, FRAC_PI_2]]).unwrap();
    let polar = PolarGridFunction::new(&grid);
    let space = SplineSpace::with_uniform_degree(&grid, 2).unwrap();
    let abscissae = greville(&space, 0);
    let basis = Basis::new(ReferenceBasis::BSpline(space), Domain::new(&polar)).unwrap();
    let dofs = basis.space().dof_distribution().clone();
    let mut handler = BasisHandler::new(&basis);
    handler
        .reset(Flags::VALUE | Flags::GRADIENT | Flags::HESSIAN | Flags::POINT, &gauss(2, 3))
        .unwrap();

    let mut element = basis.begin();
    let end = basis.end();
    while element != end {
        handler.init_cache(&mut element, 2).unwrap();
        handler.fill_cache(&mut element, 2, 0).unwrap();
        {
            let coefficients: Vec<f64> = element
                .local_to_global()
                .into_iter()
                .map(|global| abscissae[dofs.basis_flat_to_tensor(global)[0]])
                .collect();
            let points = element.points(2, 0);
            let values = element.values(2, 0);
            let gradients = element.gradients(2, 0);
            let hessians = element.hessians(2, 0);
            for (q, x) in points.iter().enumerate() {
                let r = x.coords.norm();
                let (mut value, mut gradient, mut hessian) = (0.0, Vector2::zeros(), Matrix2::zeros());
                for (f, c) in coefficients.iter().enumerate() {
                    value += c * values.get(f, q);
                    gradient += gradients.get(f, q) * *c;
                    hessian += hessians.get(f, q) * *c;
                }
                let expected_hessian = (Matrix2::identity() - x.coords * x.coords.transpose() / (r * r)) / r;
                assert_scalar_eq!(value, r, comp = abs, tol = 1e-12);
                assert_matrix_eq!(gradient, x.coords / r, comp = abs, tol = 1e-12);
                assert_matrix_eq!(hessian, expected_hessian, comp = abs, tol = 1e-10);
            }
        }
        element.advance();
    }
}

#[test]
fn univariate_tables_cover_selected_elements_only() {
    let grid = box_grid::<2>(0.0, 1.0, 4);
    let identity = IdentityGridFunction::new(&grid);
    let space = SplineSpace::with_uniform_degree(&grid, 3).unwrap();
    let basis = Basis::new(ReferenceBasis::BSpline(space), Domain::new(&identity)).unwrap();
    let mut handler = BasisHandler::new(&basis);
    handler.reset_selected_elements(Flags::VALUE, &gauss(2, 2), [1, 2]).unwrap();
    handler.reset_one_element(Flags::VALUE, &gauss(1, 2), 5).unwrap();

    let ReferenceElementHandler::BSpline(bspline) = handler.reference_handler() else {
        panic!("expected a B-spline handler");
    };
    // Element: intervals {1, 2} in direction 0 and {0} in direction 1
    assert_eq!(bspline.univariate_cache(2).map(|cache| cache.len()), Some(3));
    // Faces: four sub-elements, intervals {1} and {1}
    assert_eq!(bspline.univariate_cache(1).map(|cache| cache.len()), Some(8));
    assert!(bspline.univariate_cache(0).is_none());
    assert_eq!(handler.flags(2), Some(igatools::flags::basis_element::CacheFlags::VALUE));
}

#[test]
fn boundary_functions() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let space = SplineSpace::new(&grid, [1, 2]).unwrap();
    // 3 x 4 functions
    let left = boundary_dofs(&space, &BTreeSet::from([0]));
    assert_eq!(left, BTreeSet::from([0, 3, 6, 9]));
    let top = boundary_dofs(&space, &BTreeSet::from([3]));
    assert_eq!(top, BTreeSet::from([9, 10, 11]));
    let all = boundary_dofs(&space, &(0..4).collect());
    assert_eq!(all.len(), 12 - 2);
}

#[test]
fn reselecting_faces_keeps_the_element_selection() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let identity = IdentityGridFunction::new(&grid);
    let space = SplineSpace::with_uniform_degree(&grid, 2).unwrap();
    let basis = Basis::new(ReferenceBasis::BSpline(space), Domain::new(&identity)).unwrap();
    let mut handler = BasisHandler::new(&basis);
    handler.reset_one_element(Flags::VALUE, &gauss(2, 2), 0).unwrap();
    handler.reset(Flags::VALUE, &gauss(1, 2)).unwrap();

    let grid_handler = handler.domain_handler().grid_function_handler().grid_handler();
    assert_eq!(grid_handler.selected_elements(2), &BTreeSet::from([0]));
    assert_eq!(grid_handler.selected_elements(1).len(), 4);

    let mut element = basis.begin();
    handler.init_cache(&mut element, 2).unwrap();
    handler.init_cache(&mut element, 1).unwrap();
    handler.fill_cache(&mut element, 2, 0).unwrap();
    assert_scalar_eq!(element.values(2, 0).point_values(0).sum::<f64>(), 1.0, comp = abs, tol = 1e-13);
    element.move_to(3);
    handler.fill_cache(&mut element, 1, 1).unwrap();
    assert_scalar_eq!(element.values(1, 1).point_values(1).sum::<f64>(), 1.0, comp = abs, tol = 1e-13);
}

#[test]
#[should_panic(expected = "element 3 is not among the 1 elements selected for dimension 2")]
fn elements_outside_the_selection_of_their_dimension_cannot_be_filled() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let identity = IdentityGridFunction::new(&grid);
    let space = SplineSpace::with_uniform_degree(&grid, 2).unwrap();
    let basis = Basis::new(ReferenceBasis::BSpline(space), Domain::new(&identity)).unwrap();
    let mut handler = BasisHandler::new(&basis);
    handler.reset_one_element(Flags::VALUE, &gauss(2, 2), 0).unwrap();
    handler.reset(Flags::VALUE, &gauss(1, 2)).unwrap();
    let mut element = basis.begin();
    element.move_to(3);
    handler.init_cache(&mut element, 2).unwrap();
    let _ = handler.fill_cache(&mut element, 2, 0);
}

#[test]
fn reselection_with_the_same_flags_only_moves_the_selection() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let identity = IdentityGridFunction::new(&grid);
    let space = SplineSpace::with_uniform_degree(&grid, 2).unwrap();
    let basis = Basis::new(ReferenceBasis::BSpline(space), Domain::new(&identity)).unwrap();
    let mut handler = BasisHandler::new(&basis);
    let flags = Flags::VALUE | Flags::GRADIENT;
    handler.reset_one_element(flags, &gauss(2, 2), 0).unwrap();
    let resolved = (handler.flags(2), handler.domain_handler().flags(2));
    handler.reset_one_element(flags, &gauss(2, 2), 3).unwrap();
    assert_eq!((handler.flags(2), handler.domain_handler().flags(2)), resolved);

    let grid_handler = handler.domain_handler().grid_function_handler().grid_handler();
    assert_eq!(grid_handler.selected_elements(2), &BTreeSet::from([3]));
    let ReferenceElementHandler::BSpline(bspline) = handler.reference_handler() else {
        panic!("expected a B-spline handler");
    };
    // Interval 1 in both directions
    assert_eq!(bspline.univariate_cache(2).map(|cache| cache.len()), Some(2));

    let mut element = basis.begin();
    element.move_to(3);
    handler.init_cache(&mut element, 2).unwrap();
    handler.fill_cache(&mut element, 2, 0).unwrap();
    assert_scalar_eq!(element.values(2, 0).point_values(2).sum::<f64>(), 1.0, comp = abs, tol = 1e-13);
}

/// Global values and derivatives of a one-dimensional basis at a vertex of an element.
fn vertex_values<'a>(basis: &'a Basis<'a, f64, 1, 1>, flat: usize, vertex: usize) -> (DVector<f64>, DVector<f64>) {
    let mut handler = BasisHandler::new(basis);
    handler.reset(Flags::VALUE | Flags::GRADIENT, &gauss(0, 1)).unwrap();
    let mut element = basis.begin();
    element.move_to(flat);
    handler.init_cache(&mut element, 0).unwrap();
    handler.fill_cache(&mut element, 0, vertex).unwrap();
    let mut values = DVector::zeros(basis.num_dofs());
    let mut derivatives = DVector::zeros(basis.num_dofs());
    let value_table = element.values(0, vertex);
    let gradient_table = element.gradients(0, vertex);
    for (f, global) in element.local_to_global().into_iter().enumerate() {
        values[global] += *value_table.get(f, 0);
        derivatives[global] += gradient_table.get(f, 0)[0];
    }
    (values, derivatives)
}

#[test]
fn periodic_space_dimensions() {
    let grid = Grid::<f64, 2>::new([vec![0.0, 0.2, 0.5, 0.7, 1.0], vec![0.0, 0.5, 1.0]]).unwrap();
    let space =
        SplineSpace::with_end_behaviour(&grid, [2, 1], [EndBehaviour::Periodic, EndBehaviour::Interpolatory]).unwrap();
    let expected_knots = [-0.5, -0.3, 0.0, 0.2, 0.5, 0.7, 1.0, 1.2, 1.5];
    assert_eq!(space.knots(0).len(), expected_knots.len());
    for (&knot, expected) in space.knots(0).iter().zip(expected_knots) {
        assert_scalar_eq!(knot, expected, comp = abs, tol = 1e-15);
    }
    assert_eq!(space.dof_distribution().num_basis_per_direction(), &[4, 3]);
    // Element (3, 0) wraps around to the first functions of direction 0
    assert_eq!(space.local_to_global(3), vec![3, 0, 1, 7, 4, 5]);

    // Only faces normal to the interpolatory direction are boundary
    let all = boundary_dofs(&space, &(0..4).collect());
    assert_eq!(all, BTreeSet::from([0, 1, 2, 3, 8, 9, 10, 11]));
    assert!(boundary_dofs(&space, &BTreeSet::from([0, 1])).is_empty());
}

#[test]
fn periodic_directions_need_more_intervals_than_the_degree() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    assert_error_matches!(
        SplineSpace::with_end_behaviour(&grid, [1, 2], [EndBehaviour::Interpolatory, EndBehaviour::Periodic]),
        Error,
        Error::TooFewIntervals {
            direction: 1,
            degree: 2,
            num_intervals: 2
        }
    );
}

#[test]
fn periodic_functions_are_smooth_across_the_ends() {
    let grid = Grid::<f64, 1>::new([vec![0.0, 0.2, 0.5, 0.7, 1.0]]).unwrap();
    let identity = IdentityGridFunction::new(&grid);
    let space = SplineSpace::with_end_behaviour(&grid, [2], [EndBehaviour::Periodic]).unwrap();
    let basis = Basis::new(ReferenceBasis::BSpline(space), Domain::new(&identity)).unwrap();
    assert_eq!(basis.num_dofs(), 4);

    let (start_values, start_derivatives) = vertex_values(&basis, 0, 0);
    let (end_values, end_derivatives) = vertex_values(&basis, 3, 1);
    assert_scalar_eq!(start_values.sum(), 1.0, comp = abs, tol = 1e-13);
    assert_matrix_eq!(start_values, end_values, comp = abs, tol = 1e-13);
    assert_matrix_eq!(start_derivatives, end_derivatives, comp = abs, tol = 1e-11);
    // Unlike open knots, no function interpolates at the ends
    assert!(start_values.iter().all(|&v| v < 1.0));
}

#[test]
fn refined_spaces_contain_the_coarse_space() {
    let grid = Grid::<f64, 2>::new([vec![0.0, 0.4, 1.0], vec![0.0, 1.0]]).unwrap();
    let space = SplineSpace::new(&grid, [2, 1]).unwrap();
    let mut fine_grid = grid.clone();
    fine_grid.refine([2, 3]);
    let fine = space.refine_to(&fine_grid).unwrap();
    assert_eq!(fine.degree(), &[2, 1]);
    assert_eq!(fine.num_dofs(), 6 * 4);

    for direction in 0..2 {
        let matrix = refinement_matrix(&space, &fine, direction).unwrap();
        let n_fine = fine.dof_distribution().num_basis_per_direction()[direction];
        let n_coarse = space.dof_distribution().num_basis_per_direction()[direction];
        assert_eq!(matrix.shape(), (n_fine, n_coarse));
        for row in matrix.row_iter() {
            assert_scalar_eq!(row.sum(), 1.0, comp = abs, tol = 1e-12);
        }
        assert!(matrix.iter().all(|&r| r > -1e-12));
    }
    // Open knots: the end functions are kept as they are
    let matrix = refinement_matrix(&space, &fine, 0).unwrap();
    assert_scalar_eq!(matrix[(0, 0)], 1.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(matrix[(5, 3)], 1.0, comp = abs, tol = 1e-12);

    let other = box_grid::<2>(0.0, 1.0, 3);
    assert_error_matches!(space.refine_to(&other), Error, Error::NotNested { direction: 0 });
}

#[test]
fn periodic_refinement_wraps_around() {
    let grid = box_grid::<1>(0.0, 1.0, 4);
    let space = SplineSpace::with_end_behaviour(&grid, [2], [EndBehaviour::Periodic]).unwrap();
    let mut fine_grid = grid.clone();
    fine_grid.refine([2]);
    let fine = space.refine_to(&fine_grid).unwrap();
    assert_eq!(fine.num_dofs(), 8);
    assert_eq!(fine.end_behaviour(), &[EndBehaviour::Periodic]);

    let matrix = refinement_matrix(&space, &fine, 0).unwrap();
    // Uniform quadratic knot insertion: each coarse function splits as (1, 3, 3, 1) / 4
    for i in 0..4 {
        // Coarse function i starts two fine intervals before fine function 2 i
        let column: Vec<f64> = (0..8).map(|j| matrix[((2 * i + 6 + j) % 8, i)]).collect();
        let expected = [0.25, 0.75, 0.75, 0.25, 0.0, 0.0, 0.0, 0.0];
        for (c, e) in column.iter().zip(expected) {
            assert_scalar_eq!(*c, e, comp = abs, tol = 1e-12);
        }
    }
}

proptest! {
    #[test]
    fn univariate_derivatives_match_finite_differences(x in 0.01..0.99f64, degree in 1..4usize) {
        let knots: Vec<f64> = std::iter::repeat(0.0)
            .take(degree + 1)
            .chain([0.2, 0.45, 0.7])
            .chain(std::iter::repeat(1.0).take(degree + 1))
            .collect();
        let span = knots.iter().rposition(|&t| t <= x).unwrap();
        let h = 1e-6;
        // Stay away from breakpoints, where derivatives jump
        prop_assume!(knots.iter().all(|t| (t - x).abs() > 2.0 * h));
        let ders = evaluate_univariate(&knots, degree, span, x, 1);
        let plus = evaluate_univariate(&knots, degree, span, x + h, 0);
        let minus = evaluate_univariate(&knots, degree, span, x - h, 0);
        let values_sum: f64 = ders.row(0).sum();
        prop_assert!((values_sum - 1.0).abs() < 1e-12);
        for i in 0..=degree {
            let fd = (plus[(0, i)] - minus[(0, i)]) / (2.0 * h);
            prop_assert!((ders[(1, i)] - fd).abs() < 1e-5);
        }
    }
}
