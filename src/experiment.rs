//! Repeated independent runs of one configuration, summarized for comparison tables.

use std::{str::FromStr, sync::Arc, time::Duration};

use serde::Serialize;
use tracing::info;

use crate::{
    colony::{config::Guidance, Config, Solution, Solver},
    graph::arborescence::Forest,
    kbn_summation,
    matrix::tour_edges,
    tsplib::Instance,
    Error, Result,
};

/// Optimal tour lengths of the TSPLIB ATSP instances
///
/// <http://comopt.ifi.uni-heidelberg.de/software/TSPLIB95/ATSP.html>
const KNOWN_OPTIMA: [(&str, f64); 18] = [
    ("br17", 39.),
    ("ft53", 6905.),
    ("ft70", 38673.),
    ("ftv33", 1286.),
    ("ftv35", 1473.),
    ("ftv38", 1530.),
    ("ftv44", 1613.),
    ("ftv47", 1776.),
    ("ftv55", 1608.),
    ("ftv64", 1839.),
    ("ftv70", 1950.),
    ("ftv170", 2755.),
    ("p43", 5620.),
    ("rbg323", 1326.),
    ("rbg358", 1163.),
    ("rbg403", 2465.),
    ("rbg443", 2720.),
    ("ry48p", 14422.),
];

pub fn known_optimum(name: &str) -> Option<f64> {
    KNOWN_OPTIMA
        .iter()
        .find(|(instance, _)| *instance == name)
        .map(|(_, length)| *length)
}

/// Fraction of the edges of a closed tour that occur in at least one tree of the forest.
pub fn arborescence_overlap(tour: &[usize], forest: &Forest) -> f64 {
    if tour.is_empty() {
        return 0.;
    }
    tour_edges(tour)
        .filter(|(from, to)| forest.contains(*from, *to))
        .count() as f64
        / tour.len() as f64
}

#[derive(Debug, Clone)]
pub struct Experiment {
    pub config: Config,
    pub runs: usize,
    /// Optimal length to compare against, looked up by instance name when absent
    pub optimum: Option<f64>,
    /// Measure how many edges of the best tour come from minimum arborescences
    pub overlap: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub instance: String,
    pub dimension: usize,
    pub config: Config,
    pub ants: usize,
    pub runs: usize,
    pub average_length: f64,
    /// Shortest tour over all runs
    pub best: Solution,
    pub optimum: Option<f64>,
    /// Deviation of the average length from the optimum, in percent
    pub deviation: Option<f64>,
    /// Fraction of runs that found an optimal tour
    pub success_rate: Option<f64>,
    pub arborescence_overlap: Option<f64>,
    pub average_elapsed: Duration,
}

impl Experiment {
    pub fn run(&self, instance: &Instance) -> Result<Summary> {
        if self.runs == 0 {
            return Err(Error::config("an experiment needs at least one run"));
        }
        let distances = &instance.distances;
        let dimension = distances.dim();
        self.config.validate(dimension)?;

        let forest = if self.overlap || self.config.guidance == Guidance::Arborescence {
            Some(Arc::new(Forest::build(distances)?))
        } else {
            None
        };

        let mut solutions = Vec::with_capacity(self.runs);
        for run in 0..self.runs {
            let config = Config {
                seed: self.config.seed.map(|seed| seed.wrapping_add(run as u64)),
                ..self.config.clone()
            };
            let solution = Solver::with_forest(distances, config, forest.clone())?.run()?;
            info!(
                "Run {}/{} of {}: length {} in {:?}",
                run + 1,
                self.runs,
                instance.name,
                solution.length,
                solution.elapsed
            );
            solutions.push(solution);
        }

        kbn_summation! {
            for solution in &solutions => {
                total_length += solution.length;
                total_seconds += solution.elapsed.as_secs_f64();
            }
        }
        let runs = solutions.len() as f64;
        let average_length = total_length / runs;

        let optimum = self.optimum.or_else(|| known_optimum(&instance.name));
        let deviation = optimum.map(|optimum| 100. * (average_length - optimum) / optimum);
        let success_rate = optimum.map(|optimum| {
            solutions
                .iter()
                .filter(|solution| solution.length <= optimum)
                .count() as f64
                / runs
        });

        let best = solutions
            .into_iter()
            .reduce(|best, solution| {
                if solution.length < best.length {
                    solution
                } else {
                    best
                }
            })
            .ok_or_else(|| Error::config("an experiment needs at least one run"))?;
        let arborescence_overlap = forest
            .as_deref()
            .filter(|_| self.overlap)
            .map(|forest| arborescence_overlap(&best.tour, forest));

        Ok(Summary {
            instance: instance.name.clone(),
            dimension,
            ants: self.config.ant_count(dimension),
            config: self.config.clone(),
            runs: self.runs,
            average_length,
            best,
            optimum,
            deviation,
            success_rate,
            arborescence_overlap,
            average_elapsed: Duration::from_secs_f64(total_seconds / runs),
        })
    }
}

impl Summary {
    pub const TABLE_HEADER: &'static str = "| Instance | Alpha | Beta | Evaporation | Exploration | Ants | Iterations | Average | Best | Optimum | Deviation (%) | Success rate (%) | Overlap (%) | Time (ms) |\n|-|-|-|-|-|-|-|-|-|-|-|-|-|-|";

    /// Markdown table row matching [Summary::TABLE_HEADER]
    pub fn table_row(&self) -> String {
        fn optional(value: Option<f64>, scale: f64, precision: usize) -> String {
            value.map_or_else(
                || "-".to_owned(),
                |value| format!("{:.*}", precision, value * scale),
            )
        }
        format!(
            "| {} | {:.2} | {:.2} | {:.2} | {:.2} | {} | {} | {:.0} | {:.0} | {} | {} | {} | {} | {} |",
            self.instance,
            self.config.alpha,
            self.config.beta,
            self.config.evaporation_rate,
            self.config.exploration_factor,
            self.ants,
            self.config.iterations,
            self.average_length,
            self.best.length,
            optional(self.optimum, 1., 0),
            optional(self.deviation, 1., 2),
            optional(self.success_rate, 100., 2),
            optional(self.arborescence_overlap, 100., 2),
            self.average_elapsed.as_millis(),
        )
    }

    /// Closing line of a sweep, naming the parameters of this summary
    pub fn best_parameters(&self) -> String {
        let percent = |value: Option<f64>, scale: f64| {
            value.map_or_else(|| "-".to_owned(), |value| format!("{:.2}%", value * scale))
        };
        format!(
            "Best parameters: Alpha: {:.2}, Beta: {:.2}, Evaporation: {:.2}, Exploration: {:.2}, Best average length: {:.0} ({}), Deviation: {}, Success rate: {}",
            self.config.alpha,
            self.config.beta,
            self.config.evaporation_rate,
            self.config.exploration_factor,
            self.average_length,
            self.instance,
            percent(self.deviation, 1.),
            percent(self.success_rate, 100.),
        )
    }
}

/// Values from `start` to `end` inclusive, `step` apart.
///
/// Parsed from `start:end:step`, or from a single number for a fixed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Steps {
    start: f64,
    end: f64,
    step: f64,
}

impl Steps {
    pub fn new(start: f64, end: f64, step: f64) -> Result<Self> {
        if !(start.is_finite() && end.is_finite() && start <= end) {
            return Err(Error::config(format!("invalid range {start} to {end}")));
        }
        if !(step.is_finite() && step > 0.) {
            return Err(Error::config(format!("step must be finite and positive, got {step}")));
        }
        Ok(Self { start, end, step })
    }

    pub fn fixed(value: f64) -> Result<Self> {
        Self::new(value, value, 1.)
    }

    pub fn values(&self) -> Vec<f64> {
        // Tolerate rounding in the division, e.g. (0.9 - 0.6) / 0.1
        let count = ((self.end - self.start) / self.step + 1e-9).floor() as usize + 1;
        (0..count)
            .map(|index| self.start + index as f64 * self.step)
            .collect()
    }
}

impl FromStr for Steps {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let number = |value: &str| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|err| Error::config(format!("invalid number {value:?}: {err}")))
        };
        match s.split(':').collect::<Vec<_>>().as_slice() {
            [value] => Self::fixed(number(value)?),
            [start, end, step] => Self::new(number(start)?, number(end)?, number(step)?),
            _ => Err(Error::config(format!(
                "expected a number or start:end:step, got {s:?}"
            ))),
        }
    }
}

/// Parameter values to try. Absent parameters keep the value of the base configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    pub alpha: Option<Steps>,
    pub beta: Option<Steps>,
    pub evaporation_rate: Option<Steps>,
    pub exploration_factor: Option<Steps>,
}

impl Grid {
    /// Every combination of the parameter values, varying the exploration factor fastest.
    pub fn configs(&self, base: &Config) -> Vec<Config> {
        let values = |steps: &Option<Steps>, fixed: f64| {
            steps.as_ref().map_or_else(|| vec![fixed], Steps::values)
        };
        let mut configs = vec![];
        for alpha in values(&self.alpha, base.alpha) {
            for beta in values(&self.beta, base.beta) {
                for evaporation_rate in values(&self.evaporation_rate, base.evaporation_rate) {
                    for exploration_factor in
                        values(&self.exploration_factor, base.exploration_factor)
                    {
                        configs.push(Config {
                            alpha,
                            beta,
                            evaporation_rate,
                            exploration_factor,
                            ..base.clone()
                        });
                    }
                }
            }
        }
        configs
    }
}

/// An experiment repeated for every grid point on every instance.
#[derive(Debug, Clone)]
pub struct Sweep {
    pub experiment: Experiment,
    pub grid: Grid,
}

impl Sweep {
    /// Hand every summary to `report` as soon as it is ready and return the one with the
    /// lowest average length. The earliest summary wins ties.
    pub fn run<'a, I, F>(&self, instances: I, mut report: F) -> Result<Option<Summary>>
    where
        I: IntoIterator<Item = &'a Instance>,
        F: FnMut(&Summary) -> Result<()>,
    {
        let configs = self.grid.configs(&self.experiment.config);
        info!("Sweeping {} parameter combinations", configs.len());
        let mut best: Option<Summary> = None;
        for instance in instances {
            for config in &configs {
                let experiment = Experiment {
                    config: config.clone(),
                    ..self.experiment.clone()
                };
                let summary = experiment.run(instance)?;
                report(&summary)?;
                if best
                    .as_ref()
                    .map_or(true, |best| summary.average_length < best.average_length)
                {
                    best = Some(summary);
                }
            }
        }
        Ok(best)
    }
}
