use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use rand::{thread_rng, Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use super::{
    ant::{Ant, Tour},
    config::{Config, DepositPolicy, Guidance},
    pheromone::PheromoneField,
};
use crate::{graph::arborescence::Forest, matrix::DistanceMatrix, Error, Result};

/// Chance of following the arborescence in the first iteration, decaying linearly to 0 in the last.
const INITIAL_GUIDANCE: f64 = 0.5;

/// Shortest tour of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub tour: Vec<usize>,
    pub length: f64,
    /// Iteration in which the tour was found
    pub iteration: usize,
    pub elapsed: Duration,
    /// Master seed of the run, reusing it reproduces the solution
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Best {
    pub tour: Tour,
    pub iteration: usize,
}

/// Runs the colony for a fixed number of iterations.
///
/// Each iteration builds one tour per ant in parallel over the read-only pheromone field.
/// Once every ant is done, the best tour is updated by a sequential scan and the field
/// is evaporated and reinforced.
pub struct Solver<'a> {
    distances: &'a DistanceMatrix,
    config: Config,
    ants: usize,
    seed: u64,
    trail: PheromoneField,
    forest: Option<Arc<Forest>>,
    best: Option<Best>,
}

impl<'a> Solver<'a> {
    pub fn new(distances: &'a DistanceMatrix, config: Config) -> Result<Self> {
        Self::with_forest(distances, config, None)
    }

    /// Like [Solver::new], but reuses the arborescences of an earlier run for guidance.
    pub fn with_forest(
        distances: &'a DistanceMatrix,
        config: Config,
        forest: Option<Arc<Forest>>,
    ) -> Result<Self> {
        let dimension = distances.dim();
        config.validate(dimension)?;
        let forest = match (config.guidance, forest) {
            (Guidance::Off, _) => None,
            (Guidance::Arborescence, Some(forest)) if forest.len() == dimension => Some(forest),
            (Guidance::Arborescence, Some(forest)) => {
                return Err(Error::config(format!(
                    "{} arborescences cannot guide {dimension} cities",
                    forest.len()
                )))
            }
            (Guidance::Arborescence, None) => Some(Arc::new(Forest::build(distances)?)),
        };
        let ants = config.ant_count(dimension);
        let seed = config.seed.unwrap_or_else(|| thread_rng().gen());
        let trail = PheromoneField::initialize(distances, &config, ants);
        Ok(Self {
            distances,
            config,
            ants,
            seed,
            trail,
            forest,
            best: None,
        })
    }

    pub fn ants(&self) -> usize {
        self.ants
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn trail(&self) -> &PheromoneField {
        &self.trail
    }

    /// Shortest tour found so far
    pub fn best(&self) -> Option<&Best> {
        self.best.as_ref()
    }

    pub fn run(&mut self) -> Result<Solution> {
        info!(
            "Running {} ants for {} iterations over {} cities (seed {})",
            self.ants,
            self.config.iterations,
            self.distances.dim(),
            self.seed
        );
        let start = Instant::now();
        for iteration in 0..self.config.iterations {
            self.iterate(iteration)?;
        }
        let elapsed = start.elapsed();

        let best = self
            .best
            .as_ref()
            .ok_or_else(|| Error::config("no iteration was run"))?;
        info!(
            "Best tour has length {} (iteration {}, {:?})",
            best.tour.length, best.iteration, elapsed
        );
        Ok(Solution {
            tour: best.tour.cities.clone(),
            length: best.tour.length,
            iteration: best.iteration,
            elapsed,
            seed: self.seed,
        })
    }

    /// Run a single iteration and return the tour of every ant.
    pub fn iterate(&mut self, iteration: usize) -> Result<Vec<Tour>> {
        let tours = self.construct(iteration);

        let incomplete = tours
            .iter()
            .filter(|tour| !tour.is_complete(self.distances.dim()))
            .count();
        if incomplete > 0 {
            debug!("{incomplete} ants stopped before visiting every city");
        }

        // Lowest ant index wins ties
        let mut iteration_best = 0;
        for (index, tour) in tours.iter().enumerate().skip(1) {
            if tour.length < tours[iteration_best].length {
                iteration_best = index;
            }
        }
        let iteration_best = &tours[iteration_best];
        if self
            .best
            .as_ref()
            .map_or(true, |best| iteration_best.length < best.tour.length)
        {
            debug!(
                "New best tour of length {} in iteration {}",
                iteration_best.length, iteration
            );
            self.best = Some(Best {
                tour: iteration_best.clone(),
                iteration,
            });
        }

        let best_length = self
            .best
            .as_ref()
            .map_or(f64::INFINITY, |best| best.tour.length);
        self.trail.recompute_bounds(
            best_length,
            self.config.evaporation_rate,
            self.config.exploration_factor,
            self.ants,
        )?;
        self.trail.evaporate(self.config.evaporation_rate);
        match self.config.deposit {
            DepositPolicy::IterationBest => {
                if let Some(amount) = deposit(1., iteration_best.length)? {
                    self.trail.reinforce(&iteration_best.cities, amount);
                }
            }
            DepositPolicy::AllAnts => {
                for tour in &tours {
                    if let Some(amount) = deposit(self.config.deposit_constant, tour.length)? {
                        self.trail.reinforce(&tour.cities, amount);
                    }
                }
            }
        }

        debug!(
            "Iteration {}/{} (best: {}, iteration best: {}, bounds: {:?})",
            iteration,
            self.config.iterations,
            best_length,
            iteration_best.length,
            self.trail.bounds()
        );
        Ok(tours)
    }

    /// Build one tour per ant. Ant `k` starts at city `k mod N`.
    fn construct(&self, iteration: usize) -> Vec<Tour> {
        let dimension = self.distances.dim();
        let guidance = guidance_probability(iteration, self.config.iterations);
        (0..self.ants)
            .into_par_iter()
            .map(|index| {
                let start = index % dimension;
                let ant = Ant {
                    distances: self.distances,
                    trail: &self.trail,
                    alpha: self.config.alpha,
                    beta: self.config.beta,
                    dead_end: self.config.dead_end,
                    guide: self
                        .forest
                        .as_ref()
                        .and_then(|forest| forest.get(start))
                        .map(|tree| (tree, guidance)),
                };
                ant.build_tour(start, &mut self.ant_rng(iteration, index))
            })
            .collect()
    }

    /// Every ant draws from its own stream, so tours don't depend on thread scheduling.
    fn ant_rng(&self, iteration: usize, index: usize) -> Pcg64 {
        let stream = (iteration * self.ants + index) as u64;
        Pcg64::seed_from_u64(
            self.seed
                .wrapping_add(stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        )
    }
}

/// Chance that an ant follows its arborescence at each step of `iteration`.
fn guidance_probability(iteration: usize, iterations: usize) -> f64 {
    INITIAL_GUIDANCE * (1. - iteration as f64 / iterations as f64)
}

/// Pheromone a tour of `length` leaves on each of its edges.
///
/// Tours of length 0 leave nothing, since `amount / 0` would saturate every edge they use.
fn deposit(amount: f64, length: f64) -> Result<Option<f64>> {
    if length == 0. {
        debug!("Skipping the deposit of a tour with length 0");
        Ok(None)
    } else if length.is_finite() && length > 0. {
        Ok(Some(amount / length))
    } else {
        Err(Error::InvalidLength { length })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{deposit, guidance_probability, Solver};
    use crate::{
        colony::config::{BoundsPolicy, Config, DepositPolicy, Guidance},
        graph::arborescence::Forest,
        matrix::DistanceMatrix,
        Error,
    };
    use pretty_assertions::assert_eq;

    fn six_cities() -> DistanceMatrix {
        DistanceMatrix::from_rows(&[
            vec![0, 3, 9, 4, 7, 2],
            vec![5, 0, 1, 8, 3, 6],
            vec![2, 7, 0, 3, 9, 4],
            vec![6, 2, 5, 0, 1, 8],
            vec![4, 9, 3, 2, 0, 5],
            vec![1, 6, 8, 7, 4, 0],
        ])
        .unwrap()
    }

    fn assert_permutation(tour: &[usize], dimension: usize) {
        let mut sorted = tour.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..dimension).collect::<Vec<_>>());
    }

    #[test]
    fn test_three_cities_single_ant() {
        let distances =
            DistanceMatrix::from_rows(&[vec![0, 1, 2], vec![1, 0, 1], vec![2, 1, 0]]).unwrap();
        let config = Config {
            ants: Some(1),
            iterations: 1,
            seed: Some(0),
            ..Config::default()
        };
        let solution = Solver::new(&distances, config).unwrap().run().unwrap();
        assert_permutation(&solution.tour, 3);
        assert_eq!(solution.length, 4.);
        assert_eq!(solution.iteration, 0);
        assert_eq!(solution.seed, 0);
    }

    #[test]
    fn test_same_seed_same_solution() {
        let distances = six_cities();
        let config = Config {
            iterations: 25,
            seed: Some(42),
            ..Config::default()
        };
        let first = Solver::new(&distances, config.clone()).unwrap().run().unwrap();
        let second = Solver::new(&distances, config).unwrap().run().unwrap();
        assert_eq!(first.tour, second.tour);
        assert_eq!(first.length, second.length);
        assert_eq!(first.iteration, second.iteration);
    }

    #[test]
    fn test_bounded_trail_and_monotone_best() {
        let distances = six_cities();
        let config = Config {
            iterations: 40,
            seed: Some(1),
            ..Config::default()
        };
        let mut solver = Solver::new(&distances, config).unwrap();
        let mut shortest = f64::INFINITY;
        for iteration in 0..40 {
            let tours = solver.iterate(iteration).unwrap();
            assert_eq!(tours.len(), 6);
            for tour in &tours {
                assert_permutation(&tour.cities, 6);
                assert_eq!(tour.length, distances.tour_length(&tour.cities));
                shortest = shortest.min(tour.length);
            }
            assert_eq!(solver.best().unwrap().tour.length, shortest);

            let bounds = solver.trail().bounds().unwrap();
            assert!(bounds.min <= bounds.max);
            for intensity in solver.trail().view() {
                assert!(bounds.contains(*intensity), "{intensity} not in {bounds:?}");
            }
        }
    }

    #[test]
    fn test_finds_dominant_cycle() {
        let dimension = 5;
        let rows = (0..dimension)
            .map(|from| {
                (0..dimension)
                    .map(|to| match to {
                        _ if to == from => 0.,
                        _ if to == (from + 1) % dimension => 1.,
                        _ => 100.,
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let distances = DistanceMatrix::from_rows(&rows).unwrap();
        let config = Config {
            iterations: 10,
            seed: Some(3),
            ..Config::default()
        };
        let solution = Solver::new(&distances, config).unwrap().run().unwrap();
        assert_eq!(solution.length, 5.);
    }

    #[test]
    fn test_alternative_strategies() {
        let distances = six_cities();
        let config = Config {
            iterations: 20,
            ants: Some(9),
            bounds: BoundsPolicy::Unbounded,
            deposit: DepositPolicy::AllAnts,
            deposit_constant: 2.,
            guidance: Guidance::Arborescence,
            seed: Some(8),
            ..Config::default()
        };
        let mut solver = Solver::new(&distances, config).unwrap();
        let solution = solver.run().unwrap();
        assert_permutation(&solution.tour, 6);
        assert_eq!(solution.length, distances.tour_length(&solution.tour));
        assert_eq!(solver.trail().bounds(), None);
    }

    #[test]
    fn test_shared_forest_must_match() {
        let distances = six_cities();
        let smaller =
            DistanceMatrix::from_rows(&[vec![0, 1, 2], vec![1, 0, 1], vec![2, 1, 0]]).unwrap();
        let forest = Arc::new(Forest::build(&smaller).unwrap());
        let config = Config {
            guidance: Guidance::Arborescence,
            ..Config::default()
        };
        assert!(matches!(
            Solver::with_forest(&distances, config.clone(), Some(forest)),
            Err(Error::Config { .. })
        ));
        let forest = Arc::new(Forest::build(&distances).unwrap());
        assert!(Solver::with_forest(&distances, config, Some(forest)).is_ok());
    }

    #[test]
    fn test_stuck_ant_does_not_abort_the_run() {
        // 1 / 1e-308 twice overflows the desirability sum, so ant 0 stops at its start city
        let distances = DistanceMatrix::from_rows(&[
            vec![0., 1e-308, 1e-308],
            vec![1., 0., 1.],
            vec![1., 1., 0.],
        ])
        .unwrap();
        let config = Config {
            beta: 1.,
            iterations: 3,
            seed: Some(4),
            ..Config::default()
        };
        let solution = Solver::new(&distances, config).unwrap().run().unwrap();
        assert_eq!(solution.tour, [0]);
        assert_eq!(solution.length, 0.);
        assert_eq!(solution.iteration, 0);
    }

    #[test]
    fn test_zero_distances_do_not_abort_the_run() {
        let distances = DistanceMatrix::from_rows(&[vec![0; 3], vec![0; 3], vec![0; 3]]).unwrap();
        for deposit in [DepositPolicy::IterationBest, DepositPolicy::AllAnts] {
            let config = Config {
                iterations: 2,
                deposit,
                seed: Some(0),
                ..Config::default()
            };
            let mut solver = Solver::new(&distances, config).unwrap();
            let solution = solver.run().unwrap();
            assert_permutation(&solution.tour, 3);
            assert_eq!(solution.length, 0.);
        }
    }

    #[test]
    fn test_deposit() {
        assert_eq!(deposit(2., 4.).unwrap(), Some(0.5));
        assert_eq!(deposit(1., 0.).unwrap(), None);
        assert_eq!(deposit(1., -0.).unwrap(), None);
        for length in [-1., f64::NAN, f64::INFINITY] {
            assert!(matches!(
                deposit(1., length),
                Err(Error::InvalidLength { .. })
            ));
        }
    }

    #[test]
    fn test_guidance_decays_to_nearly_nothing() {
        assert_eq!(guidance_probability(0, 100), 0.5);
        assert_eq!(guidance_probability(50, 100), 0.25);
        assert!((guidance_probability(99, 100) - 0.005).abs() < 1e-15);
        for iteration in 1..100 {
            assert!(guidance_probability(iteration, 100) < guidance_probability(iteration - 1, 100));
        }
    }

    #[test]
    fn test_invalid_configuration_fails_before_running() {
        let distances = six_cities();
        let config = Config {
            evaporation_rate: 1.,
            ..Config::default()
        };
        assert!(matches!(
            Solver::new(&distances, config),
            Err(Error::Config { .. })
        ));
    }
}
