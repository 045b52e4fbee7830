use crate::cache::ValueTable;
use crate::topology::{TensorIndex, TensorIndexer};
use crate::Real;
use nalgebra::{DMatrix, SMatrix, SVector};

/// Evaluates tensor-product functions and their derivatives from one-dimensional tables.
///
/// Direction `d` contributes a slice of matrices, one per derivative order, each with one row
/// per univariate function and one column per univariate point. Functions and points of the
/// product are numbered with the first direction varying fastest.
#[derive(Debug, Clone)]
pub struct TensorProductEvaluator<'t, T: Real, const D: usize> {
    tables: [&'t [DMatrix<T>]; D],
    functions: TensorIndexer<D>,
    points: TensorIndexer<D>,
}

impl<'t, T: Real, const D: usize> TensorProductEvaluator<'t, T, D> {
    /// # Panics
    ///
    /// Panics if a direction has no tables or its tables disagree in size.
    pub fn new(tables: [&'t [DMatrix<T>]; D]) -> Self {
        for (d, direction_tables) in tables.iter().enumerate() {
            assert!(!direction_tables.is_empty(), "no univariate tables in direction {}", d);
            let shape = direction_tables[0].shape();
            assert!(
                direction_tables.iter().all(|table| table.shape() == shape),
                "univariate tables in direction {} have different shapes",
                d
            );
        }
        let functions = TensorIndexer::new(std::array::from_fn(|d| tables[d][0].nrows()));
        let points = TensorIndexer::new(std::array::from_fn(|d| tables[d][0].ncols()));
        Self {
            tables,
            functions,
            points,
        }
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Highest derivative order available in every direction.
    pub fn max_order(&self) -> usize {
        self.tables
            .iter()
            .map(|tables| tables.len() - 1)
            .min()
            .unwrap_or(usize::MAX)
    }

    /// The mixed derivative of the given order in each direction.
    pub fn derivative(&self, function: &TensorIndex<D>, point: &TensorIndex<D>, orders: [usize; D]) -> T {
        let mut result = T::one();
        for d in 0..D {
            result *= self.tables[d][orders[d]][(function[d], point[d])];
        }
        result
    }

    pub fn values(&self) -> ValueTable<T> {
        self.table(|f, q| self.derivative(f, q, [0; D]))
    }

    pub fn gradients(&self) -> ValueTable<SVector<T, D>> {
        assert!(self.max_order() >= 1, "gradients need first derivative tables");
        self.table(|f, q| {
            SVector::from_fn(|c, _| {
                let mut orders = [0; D];
                orders[c] = 1;
                self.derivative(f, q, orders)
            })
        })
    }

    pub fn hessians(&self) -> ValueTable<SMatrix<T, D, D>> {
        assert!(self.max_order() >= 2, "Hessians need second derivative tables");
        self.table(|f, q| {
            SMatrix::from_fn(|a, b| {
                let mut orders = [0; D];
                orders[a] += 1;
                orders[b] += 1;
                self.derivative(f, q, orders)
            })
        })
    }

    fn table<V>(&self, mut evaluate: impl FnMut(&TensorIndex<D>, &TensorIndex<D>) -> V) -> ValueTable<V> {
        ValueTable::from_fn(self.num_functions(), self.num_points(), |f, q| {
            evaluate(&self.functions.to_tensor(f), &self.points.to_tensor(q))
        })
    }
}
