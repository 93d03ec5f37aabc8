use ndarray::{Array2, ArrayView2};
use tracing::debug;

use super::config::{BoundsPolicy, Config, InitialTrail};
use crate::{
    matrix::{tour_edges, DistanceMatrix},
    Error, Result,
};

/// Lower and upper limit of every pheromone intensity in the Max-Min Ant System.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailBounds {
    pub min: f64,
    pub max: f64,
}

impl TrailBounds {
    fn from_max(max: f64, exploration_factor: f64, ants: usize) -> Self {
        Self {
            min: max / (exploration_factor * ants as f64),
            max,
        }
    }

    pub fn contains(&self, intensity: f64) -> bool {
        (self.min..=self.max).contains(&intensity)
    }
}

/// Learned desirability of every directed edge.
///
/// Only [evaporate](PheromoneField::evaporate) and [reinforce](PheromoneField::reinforce)
/// mutate it, and the [solver](super::scheduler::Solver) calls them strictly after all ants
/// of an iteration have finished.
#[derive(Debug, Clone, PartialEq)]
pub struct PheromoneField {
    trail: Array2<f64>,
    bounds: Option<TrailBounds>,
}

impl PheromoneField {
    /// Fill the field according to `config.initial_trail`.
    ///
    /// With [BoundsPolicy::MinMax], the upper bound starts at the largest initial
    /// intensity and the lower bound at `max / (exploration_factor * ants)`.
    pub fn initialize(distances: &DistanceMatrix, config: &Config, ants: usize) -> Self {
        let dimension = distances.dim();
        let trail = match config.initial_trail {
            InitialTrail::Uniform => Array2::from_elem((dimension, dimension), 1.),
            InitialTrail::ReciprocalOutgoing => {
                let reciprocals = (0..dimension)
                    .map(|from| distances.outgoing_sum(from).recip())
                    .collect::<Vec<_>>();
                Array2::from_shape_fn((dimension, dimension), |(from, _)| reciprocals[from])
            }
        };
        let bounds = match config.bounds {
            BoundsPolicy::MinMax => {
                let max = trail.iter().copied().fold(f64::MIN, f64::max);
                Some(TrailBounds::from_max(max, config.exploration_factor, ants))
            }
            BoundsPolicy::Unbounded => None,
        };
        Self { trail, bounds }
    }

    #[cfg(test)]
    pub(crate) fn from_trail(trail: Array2<f64>, bounds: Option<TrailBounds>) -> Self {
        Self { trail, bounds }
    }

    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.trail[[from, to]]
    }

    pub fn view(&self) -> ArrayView2<f64> {
        self.trail.view()
    }

    /// Current bounds, [None] when the field is unbounded.
    pub fn bounds(&self) -> Option<TrailBounds> {
        self.bounds
    }

    /// Derive new bounds from the best tour length found so far:
    /// `max = 1 / ((1 - evaporation_rate) * best_length)` and `min = max / (exploration_factor * ants)`.
    ///
    /// Nothing changes while no tour has been found (`best_length` is infinite), when the
    /// best tour has length 0 (e.g. an ant stopped at its start city) or when the field is
    /// unbounded. Returns whether the bounds were updated.
    pub fn recompute_bounds(
        &mut self,
        best_length: f64,
        evaporation_rate: f64,
        exploration_factor: f64,
        ants: usize,
    ) -> Result<bool> {
        if self.bounds.is_none() || best_length == f64::INFINITY {
            return Ok(false);
        }
        if best_length == 0. {
            debug!("Keeping pheromone bounds, the best tour has length 0");
            return Ok(false);
        }
        if !(best_length.is_finite() && best_length > 0.) {
            return Err(Error::InvalidLength {
                length: best_length,
            });
        }
        let max = ((1. - evaporation_rate) * best_length).recip();
        self.bounds = Some(TrailBounds::from_max(max, exploration_factor, ants));
        Ok(true)
    }

    /// Decay every intensity by `evaporation_rate`, then clamp it into the bounds.
    pub fn evaporate(&mut self, evaporation_rate: f64) {
        let persistence = 1. - evaporation_rate;
        match self.bounds {
            Some(TrailBounds { min, max }) => self
                .trail
                .mapv_inplace(|intensity| (intensity * persistence).clamp(min, max)),
            None => self.trail.mapv_inplace(|intensity| intensity * persistence),
        }
    }

    /// Add `deposit` to every edge of the closed tour, capped by the upper bound.
    pub fn reinforce(&mut self, tour: &[usize], deposit: f64) {
        for (from, to) in tour_edges(tour) {
            let intensity = &mut self.trail[[from, to]];
            *intensity += deposit;
            if let Some(TrailBounds { max, .. }) = self.bounds {
                *intensity = intensity.min(max);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PheromoneField, TrailBounds};
    use crate::{
        colony::config::{BoundsPolicy, Config, InitialTrail},
        matrix::DistanceMatrix,
        Error,
    };
    use ndarray::Array2;
    use pretty_assertions::assert_eq;

    fn distances() -> DistanceMatrix {
        DistanceMatrix::from_rows(&[vec![0, 1, 3], vec![2, 0, 2], vec![4, 4, 0]]).unwrap()
    }

    fn bounded() -> PheromoneField {
        PheromoneField::initialize(&distances(), &Config::default(), 3)
    }

    fn assert_within_bounds(field: &PheromoneField) {
        let bounds = field.bounds().unwrap();
        for intensity in field.view() {
            assert!(bounds.contains(*intensity), "{intensity} not in {bounds:?}");
        }
    }

    #[test]
    fn test_uniform_initialization() {
        let field = bounded();
        assert!(field.view().iter().all(|intensity| *intensity == 1.));
        assert_eq!(
            field.bounds(),
            Some(TrailBounds {
                min: 1. / 30.,
                max: 1.
            })
        );
    }

    #[test]
    fn test_reciprocal_outgoing_initialization() {
        let config = Config {
            initial_trail: InitialTrail::ReciprocalOutgoing,
            bounds: BoundsPolicy::Unbounded,
            ..Config::default()
        };
        let field = PheromoneField::initialize(&distances(), &config, 3);
        assert_eq!(field.get(0, 1), 0.25);
        assert_eq!(field.get(0, 2), 0.25);
        assert_eq!(field.get(2, 0), 0.125);
        assert_eq!(field.bounds(), None);
    }

    #[test]
    fn test_reciprocal_outgoing_bounds_start_at_largest_cell() {
        let config = Config {
            initial_trail: InitialTrail::ReciprocalOutgoing,
            ..Config::default()
        };
        let field = PheromoneField::initialize(&distances(), &config, 3);
        // Outgoing sums are 4, 4 and 8
        assert_eq!(
            field.bounds(),
            Some(TrailBounds {
                min: 0.25 / 30.,
                max: 0.25
            })
        );
        assert_within_bounds(&field);
    }

    #[test]
    fn test_recompute_bounds() {
        let mut field = bounded();
        assert!(field.recompute_bounds(40., 0.8, 10., 3).unwrap());
        let bounds = field.bounds().unwrap();
        assert!((bounds.max - 0.125).abs() < 1e-15);
        assert!((bounds.min - 0.125 / 30.).abs() < 1e-15);
    }

    #[test]
    fn test_bounds_are_ordered_for_valid_configurations() {
        let mut field = bounded();
        for best_length in [1e-3, 1., 39., 6905., 1e9] {
            for evaporation_rate in [0.01, 0.5, 0.99] {
                for (exploration_factor, ants) in [(1., 1), (0.5, 2), (10., 17)] {
                    field
                        .recompute_bounds(best_length, evaporation_rate, exploration_factor, ants)
                        .unwrap();
                    let TrailBounds { min, max } = field.bounds().unwrap();
                    assert!(min.is_finite() && min > 0.);
                    assert!(max.is_finite() && max > 0.);
                    assert!(min <= max);
                }
            }
        }
    }

    #[test]
    fn test_infinite_best_length_leaves_bounds_unchanged() {
        let mut field = bounded();
        let before = field.bounds();
        assert!(!field.recompute_bounds(f64::INFINITY, 0.8, 10., 3).unwrap());
        assert_eq!(field.bounds(), before);
    }

    #[test]
    fn test_zero_best_length_leaves_bounds_unchanged() {
        for length in [0., -0.] {
            let mut field = bounded();
            let before = field.bounds();
            assert!(!field.recompute_bounds(length, 0.8, 10., 3).unwrap());
            assert_eq!(field.bounds(), before);
        }
    }

    #[test]
    fn test_degenerate_best_length_is_an_error() {
        for length in [-3., f64::NAN, f64::NEG_INFINITY] {
            let mut field = bounded();
            assert!(matches!(
                field.recompute_bounds(length, 0.8, 10., 3),
                Err(Error::InvalidLength { .. })
            ));
        }
    }

    #[test]
    fn test_unbounded_field_ignores_bounds() {
        let config = Config {
            bounds: BoundsPolicy::Unbounded,
            ..Config::default()
        };
        let mut field = PheromoneField::initialize(&distances(), &config, 3);
        assert!(!field.recompute_bounds(10., 0.8, 10., 3).unwrap());
        field.evaporate(0.5);
        field.reinforce(&[0, 1, 2], 4.);
        assert_eq!(field.get(0, 1), 4.5);
        assert_eq!(field.get(1, 0), 0.5);
    }

    #[test]
    fn test_evaporate_clamps_into_bounds() {
        let mut field = PheromoneField::from_trail(
            Array2::from_shape_vec((2, 2), vec![1., 0.1, 0.001, 0.5]).unwrap(),
            Some(TrailBounds { min: 0.01, max: 0.2 }),
        );
        field.evaporate(0.5);
        assert_eq!(field.view().iter().copied().collect::<Vec<_>>(), [0.2, 0.05, 0.01, 0.2]);
    }

    #[test]
    fn test_reinforce_includes_closing_edge_and_caps() {
        let mut field = bounded();
        field.recompute_bounds(2., 0.5, 10., 3).unwrap();
        field.evaporate(0.5);
        field.reinforce(&[2, 0, 1], 0.25);
        // max is 1 after recomputation, evaporation left 0.5
        assert_eq!(field.get(2, 0), 0.75);
        assert_eq!(field.get(0, 1), 0.75);
        assert_eq!(field.get(1, 2), 0.75);
        assert_eq!(field.get(0, 2), 0.5);
        field.reinforce(&[2, 0, 1], 1.);
        assert_eq!(field.get(1, 2), 1.);
        assert_within_bounds(&field);
    }

    #[test]
    fn test_single_city_tour_deposits_nothing() {
        let mut field = bounded();
        let before = field.clone();
        field.reinforce(&[1], 0.5);
        assert_eq!(field, before);
    }
}
