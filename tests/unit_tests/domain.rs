use crate::{box_grid, gauss};
use igatools::domain::{Domain, DomainHandler};
use igatools::flags::domain_element::Flags;
use igatools::grid::{ElementAccessor, Grid};
use igatools::grid_function::{IdentityGridFunction, LinearGridFunction, PolarGridFunction};
use igatools::Error;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{matrix, vector, Matrix2, Vector2};
use std::f64::consts::{FRAC_PI_2, PI};
use util::assert_error_matches;

/// Sum of the weighted measures of sub-element `j` of dimension `k` over all active elements.
fn integrate_measure<const D: usize, const S: usize>(
    domain: Domain<'_, f64, D, S>,
    k: usize,
    j: usize,
    n_points: usize,
) -> f64 {
    let mut handler = DomainHandler::new(domain);
    handler.reset(Flags::W_MEASURE, &gauss(k, n_points)).unwrap();
    let mut element = domain.begin();
    let end = domain.end();
    let mut total = 0.0;
    while element != end {
        handler.init_cache(&mut element, k).unwrap();
        handler.fill_cache(&mut element, k, j).unwrap();
        total += element.w_measures(k, j).iter().sum::<f64>();
        element.advance();
    }
    total
}

#[test]
fn linear_map_measures_and_inverse() {
    let grid = box_grid::<2>(0.0, 1.0, 3);
    let a = matrix![2.0, 1.0; 0.0, 3.0];
    let map = LinearGridFunction::new(&grid, a, vector![5.0, 5.0]).unwrap();
    let domain = Domain::new(&map);
    assert_scalar_eq!(integrate_measure(domain, 2, 0, 2), 6.0, comp = abs, tol = 1e-12);

    let mut handler = DomainHandler::new(domain);
    handler
        .reset(Flags::MEASURE | Flags::INV_JACOBIAN | Flags::JACOBIAN, &gauss(2, 2))
        .unwrap();
    let mut element = domain.begin();
    element.move_to(4);
    handler.init_cache(&mut element, 2).unwrap();
    handler.fill_cache(&mut element, 2, 0).unwrap();
    let inverse = a.try_inverse().unwrap();
    for ((measure, inv_jacobian), jacobian) in element
        .measures(2, 0)
        .iter()
        .zip(element.inv_jacobians(2, 0).iter())
        .zip(element.jacobians(2, 0).iter())
    {
        assert_scalar_eq!(*measure, 6.0, comp = abs, tol = 1e-12);
        assert_matrix_eq!(*inv_jacobian, inverse, comp = abs, tol = 1e-12);
        assert_matrix_eq!(*jacobian, a, comp = abs, tol = 0.0);
    }
}

#[test]
fn face_measures_of_linear_map() {
    let grid = box_grid::<2>(0.0, 1.0, 2);
    let map = LinearGridFunction::new(&grid, matrix![2.0, 1.0; 0.0, 3.0], Vector2::zeros()).unwrap();
    let domain = Domain::new(&map);
    // Face x_0 = 0 is the image of the second column, face x_1 = 0 of the first
    let expected = [10.0f64.sqrt(), 10.0f64.sqrt(), 2.0, 2.0];
    for (face, &length) in expected.iter().enumerate() {
        // Four elements, each contributing half an edge
        assert_scalar_eq!(integrate_measure(domain, 1, face, 2), 2.0 * length, comp = abs, tol = 1e-12);
    }
}

#[test]
fn annulus_area() {
    let grid = Grid::new([vec![1.0, 1.5, 2.0], vec![0.0, FRAC_PI_2 / 3.0, FRAC_PI_2]]).unwrap();
    let polar = PolarGridFunction::new(&grid);
    let area = integrate_measure(Domain::new(&polar), 2, 0, 2);
    assert_scalar_eq!(area, 3.0 * PI / 4.0, comp = abs, tol = 1e-12);
}

#[test]
fn polar_inverse_hessians() {
    let grid = Grid::new([vec![1.0, 2.0], vec![0.0, FRAC_PI_2]]).unwrap();
    let polar = PolarGridFunction::new(&grid);
    let domain = Domain::new(&polar);
    let mut handler = DomainHandler::new(domain);
    handler.reset(Flags::POINT | Flags::INV_HESSIAN, &gauss(2, 2)).unwrap();
    let mut element = domain.begin();
    handler.init_cache(&mut element, 2).unwrap();
    handler.fill_cache(&mut element, 2, 0).unwrap();

    let points = element.points(2, 0);
    let inv_hessians = element.inv_hessians(2, 0);
    for (x, hessians) in points.iter().zip(inv_hessians.iter()) {
        let r = x.norm();
        let (x0, x1) = (x[0], x[1]);
        let hessian_r = (Matrix2::identity() - x * x.transpose() / (r * r)) / r;
        let hessian_theta = matrix![2.0 * x0 * x1, x1 * x1 - x0 * x0; x1 * x1 - x0 * x0, -2.0 * x0 * x1] / r.powi(4);
        assert_matrix_eq!(hessians[0], hessian_r, comp = abs, tol = 1e-12);
        assert_matrix_eq!(hessians[1], hessian_theta, comp = abs, tol = 1e-12);
    }
}

#[test]
fn boundary_normals_of_unit_square() {
    let grid = box_grid::<2>(0.0, 1.0, 1);
    let identity = IdentityGridFunction::new(&grid);
    let domain = Domain::new(&identity);
    let mut handler = DomainHandler::new(domain);
    handler.reset(Flags::BOUNDARY_NORMAL, &gauss(1, 2)).unwrap();
    let mut element = domain.begin();
    handler.init_cache(&mut element, 1).unwrap();
    let expected = [
        vector![-1.0, 0.0],
        vector![1.0, 0.0],
        vector![0.0, -1.0],
        vector![0.0, 1.0],
    ];
    for (face, normal) in expected.iter().enumerate() {
        handler.fill_cache(&mut element, 1, face).unwrap();
        for n in element.boundary_normals(1, face).iter() {
            assert_matrix_eq!(*n, *normal, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn boundary_normals_of_sheared_square() {
    let grid = box_grid::<2>(0.0, 1.0, 1);
    // Maps the unit square to the parallelogram with edges (1, 0) and (1, 1)
    let map = LinearGridFunction::new(&grid, matrix![1.0, 1.0; 0.0, 1.0], Vector2::zeros()).unwrap();
    let domain = Domain::new(&map);
    let mut handler = DomainHandler::new(domain);
    handler.reset(Flags::BOUNDARY_NORMAL, &gauss(1, 1)).unwrap();
    let mut element = domain.begin();
    handler.init_cache(&mut element, 1).unwrap();

    handler.fill_cache(&mut element, 1, 1).unwrap();
    let s = 0.5f64.sqrt();
    assert_matrix_eq!(element.boundary_normals(1, 1)[0], vector![s, -s], comp = abs, tol = 1e-14);
    handler.fill_cache(&mut element, 1, 3).unwrap();
    assert_matrix_eq!(element.boundary_normals(1, 3)[0], vector![0.0, 1.0], comp = abs, tol = 1e-14);
}

#[test]
fn exterior_normal_of_curve() {
    let grid = box_grid::<1>(0.0, 1.0, 2);
    let map = LinearGridFunction::new(&grid, matrix![3.0; 4.0], vector![0.0, 1.0]).unwrap();
    let domain = Domain::new(&map);
    let mut handler = DomainHandler::new(domain);
    handler.reset(Flags::EXT_NORMAL | Flags::MEASURE, &gauss(1, 2)).unwrap();
    let mut element = domain.begin();
    handler.init_cache(&mut element, 1).unwrap();
    handler.fill_cache(&mut element, 1, 0).unwrap();
    for (normal, measure) in element.ext_normals(1, 0).iter().zip(element.measures(1, 0).iter()) {
        assert_matrix_eq!(*normal, vector![0.8, -0.6], comp = abs, tol = 1e-14);
        assert_scalar_eq!(*measure, 5.0, comp = abs, tol = 1e-14);
    }
    assert_scalar_eq!(integrate_measure(domain, 1, 0, 1), 5.0, comp = abs, tol = 1e-12);
}

#[test]
fn unsupported_combinations_are_rejected() {
    let grid = box_grid::<2>(0.0, 1.0, 1);
    let identity = IdentityGridFunction::new(&grid);
    let mut handler = DomainHandler::new(Domain::new(&identity));
    assert_error_matches!(
        handler.reset(Flags::EXT_NORMAL, &gauss(2, 1)),
        Error,
        Error::UnsupportedCombination { layer: "domain", .. }
    );
    assert_error_matches!(
        handler.reset(Flags::BOUNDARY_NORMAL, &gauss(2, 1)),
        Error,
        Error::UnsupportedCombination { layer: "domain", .. }
    );
    assert_error_matches!(
        handler.reset(Flags::from_bits_retain(1 << 15), &gauss(2, 1)),
        Error,
        Error::UnsupportedFlags { layer: "domain", .. }
    );
}

#[test]
fn singular_jacobian_is_reported() {
    let grid = box_grid::<2>(0.0, 1.0, 1);
    let map = LinearGridFunction::new(&grid, matrix![1.0, 2.0; 2.0, 4.0], Vector2::zeros()).unwrap();
    let domain = Domain::new(&map);
    let mut handler = DomainHandler::new(domain);
    handler.reset(Flags::INV_JACOBIAN, &gauss(2, 1)).unwrap();
    let mut element = domain.begin();
    handler.init_cache(&mut element, 2).unwrap();
    assert_error_matches!(
        handler.fill_cache(&mut element, 2, 0),
        Error,
        Error::SingularJacobian { element: 0 }
    );
}

#[test]
fn copies_share_or_duplicate_every_layer() {
    use igatools::cache::CopyPolicy;
    let grid = box_grid::<1>(0.0, 1.0, 2);
    let identity = IdentityGridFunction::new(&grid);
    let domain = Domain::new(&identity);
    let mut handler = DomainHandler::new(domain);
    handler.reset(Flags::MEASURE, &gauss(1, 2)).unwrap();
    let mut element = domain.begin().into_accessor();
    handler.init_cache(&mut element, 1).unwrap();
    handler.fill_cache(&mut element, 1, 0).unwrap();

    let shallow = element.copy(CopyPolicy::Shallow);
    let deep = element.copy(CopyPolicy::Deep);
    assert!(shallow.shares_cache_with(&element));
    assert!(!deep.shares_cache_with(&element));

    element.advance();
    assert_eq!(shallow.flat_index(), 0);
    assert_eq!(element.flat_index(), 1);
    assert_eq!(deep.measures(1, 0).len(), 2);
}
