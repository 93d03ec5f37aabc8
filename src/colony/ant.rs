use rand::Rng;
use serde::Serialize;

use super::{config::DeadEnd, pheromone::PheromoneField};
use crate::{graph::arborescence::Arborescence, math::pow, matrix::DistanceMatrix};

/// A sequence of cities visited by one ant and the length of the closed tour.
///
/// Normally a permutation of every city, but an ant may stop early (see [DeadEnd]).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tour {
    pub cities: Vec<usize>,
    pub length: f64,
}

impl Tour {
    pub fn is_complete(&self, dimension: usize) -> bool {
        self.cities.len() == dimension
    }
}

/// Probabilistic tour construction over read-only shared state.
#[derive(Debug, Clone, Copy)]
pub struct Ant<'a> {
    pub distances: &'a DistanceMatrix,
    pub trail: &'a PheromoneField,
    pub alpha: f64,
    pub beta: f64,
    pub dead_end: DeadEnd,
    /// Tree to follow, usually the one rooted at the start city, and the chance of following it at each step
    pub guide: Option<(&'a Arborescence, f64)>,
}

impl Ant<'_> {
    pub fn build_tour<R: Rng + ?Sized>(&self, start: usize, rng: &mut R) -> Tour {
        let dimension = self.distances.dim();
        let mut visited = vec![false; dimension];
        let mut desirability = vec![0.; dimension];
        let mut cities = Vec::with_capacity(dimension);
        cities.push(start);
        visited[start] = true;

        let mut current = start;
        while cities.len() < dimension {
            let next = match self.follow_guide(current, &visited, rng) {
                Some(next) => Some(next),
                None => self.select_next(current, &visited, &mut desirability, rng),
            };
            let next = match next {
                Some(next) => next,
                None => match self.dead_end {
                    DeadEnd::Stop => break,
                    DeadEnd::FirstUnvisited => match visited.iter().position(|seen| !seen) {
                        Some(next) => next,
                        None => break,
                    },
                },
            };
            cities.push(next);
            visited[next] = true;
            current = next;
        }

        let length = self.distances.tour_length(&cities);
        Tour { cities, length }
    }

    /// With the guide's probability, take the lowest numbered unvisited child of `current` in the tree.
    fn follow_guide<R: Rng + ?Sized>(
        &self,
        current: usize,
        visited: &[bool],
        rng: &mut R,
    ) -> Option<usize> {
        let (tree, probability) = self.guide?;
        if rng.gen::<f64>() >= probability {
            return None;
        }
        tree.children(current)
            .iter()
            .copied()
            .find(|child| !visited[*child])
    }

    /// Roulette wheel selection over the unvisited cities.
    ///
    /// A city whose probability is NaN (every desirability was 0 or infinite) is taken immediately.
    /// Returns [None] if the cumulative probability never exceeds the random draw.
    fn select_next<R: Rng + ?Sized>(
        &self,
        current: usize,
        visited: &[bool],
        desirability: &mut [f64],
        rng: &mut R,
    ) -> Option<usize> {
        let mut total = 0.;
        for (city, weight) in desirability.iter_mut().enumerate() {
            if visited[city] {
                continue;
            }
            *weight = pow(self.trail.get(current, city), self.alpha)
                * pow(self.distances.get(current, city).recip(), self.beta);
            total += *weight;
        }

        let draw: f64 = rng.gen();
        let mut cumulative = 0.;
        for (city, weight) in desirability.iter().enumerate() {
            if visited[city] {
                continue;
            }
            let probability = weight / total;
            cumulative += probability;
            if draw < cumulative || probability.is_nan() {
                return Some(city);
            }
        }
        None
    }
}
