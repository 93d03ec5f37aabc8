use ndarray::{Array2, ArrayView2};
use num_traits::ToPrimitive;

use crate::{graph::arborescence::Edge, Error, Result};

/// Immutable table of directed edge weights between `N` cities.
///
/// Weights may be asymmetric. The diagonal is never read, so it may hold
/// whatever placeholder the provider uses (TSPLIB files often put `9999` there).
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    weights: Array2<f64>,
}

impl DistanceMatrix {
    pub fn new(weights: Array2<f64>) -> Result<Self> {
        let (rows, columns) = weights.dim();
        if rows != columns {
            return Err(Error::Matrix {
                message: format!("expected a square matrix, got {rows}x{columns}"),
            });
        }
        if rows < 2 {
            return Err(Error::Matrix {
                message: format!("a tour needs at least 2 cities, got {rows}"),
            });
        }
        for ((from, to), weight) in weights.indexed_iter() {
            if from != to && !(weight.is_finite() && *weight >= 0.) {
                return Err(Error::Matrix {
                    message: format!("weight of {from} -> {to} must be finite and non-negative, got {weight}"),
                });
            }
        }
        Ok(Self { weights })
    }

    /// Build a matrix from rows of any numeric type, e.g. the integer weights of TSPLIB instances.
    pub fn from_rows<T: ToPrimitive>(rows: &[Vec<T>]) -> Result<Self> {
        let dimension = rows.len();
        let mut values = Vec::with_capacity(dimension * dimension);
        for (from, row) in rows.iter().enumerate() {
            if row.len() != dimension {
                return Err(Error::Matrix {
                    message: format!(
                        "row {from} has {} entries, expected {dimension}",
                        row.len()
                    ),
                });
            }
            for (to, weight) in row.iter().enumerate() {
                values.push(weight.to_f64().ok_or_else(|| Error::Matrix {
                    message: format!("weight of {from} -> {to} is not representable as f64"),
                })?);
            }
        }
        let weights = Array2::from_shape_vec((dimension, dimension), values).map_err(|err| {
            Error::Matrix {
                message: err.to_string(),
            }
        })?;
        Self::new(weights)
    }

    /// Number of cities.
    pub fn dim(&self) -> usize {
        self.weights.nrows()
    }

    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.weights[[from, to]]
    }

    pub fn view(&self) -> ArrayView2<f64> {
        self.weights.view()
    }

    /// Sum of the outgoing weights of a city, ignoring the diagonal.
    pub fn outgoing_sum(&self, from: usize) -> f64 {
        self.weights
            .row(from)
            .indexed_iter()
            .filter(|(to, _)| *to != from)
            .map(|(_, weight)| *weight)
            .sum()
    }

    /// All off-diagonal edges in row-major order.
    pub fn edges(&self) -> Vec<Edge> {
        self.weights
            .indexed_iter()
            .filter(|((from, to), _)| from != to)
            .map(|((from, to), weight)| Edge {
                from,
                to,
                weight: *weight,
            })
            .collect()
    }

    /// Length of the closed tour, including the edge from the last city back to the first.
    pub fn tour_length(&self, tour: &[usize]) -> f64 {
        tour_edges(tour).map(|(from, to)| self.get(from, to)).sum()
    }
}

/// Consecutive edges of a tour plus the closing edge.
///
/// Tours with fewer than 2 cities have no edges.
pub fn tour_edges(tour: &[usize]) -> impl Iterator<Item = (usize, usize)> + '_ {
    let closing = match tour {
        [first, .., last] => Some((*last, *first)),
        _ => None,
    };
    tour.windows(2).map(|pair| (pair[0], pair[1])).chain(closing)
}
