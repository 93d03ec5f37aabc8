use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Whether pheromone intensities are kept within dynamic bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BoundsPolicy {
    /// Max-Min Ant System: clamp to bounds derived from the best length found so far
    #[default]
    MinMax,
    Unbounded,
}

/// Which tours reinforce the pheromone field after an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DepositPolicy {
    /// Only the shortest tour of the iteration deposits `1 / length`
    #[default]
    IterationBest,
    /// Every tour deposits `Q / length`
    AllAnts,
}

/// Whether ants are pulled towards minimum arborescence edges early in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Guidance {
    #[default]
    Off,
    /// Follow the arborescence rooted at the ant's start city with a probability
    /// that decays linearly from 0.5 to 0 over the run.
    ///
    /// <https://ieeexplore.ieee.org/document/5522700>
    Arborescence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InitialTrail {
    /// Every edge starts at 1
    #[default]
    Uniform,
    /// Edges leaving a city start at the reciprocal of the city's outgoing distance sum
    ReciprocalOutgoing,
}

/// What an ant does when roulette selection picks no city.
///
/// This happens when the selection probabilities don't add up to 1, e.g. when the desirability sum overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DeadEnd {
    /// Stop and hand back the partial tour
    #[default]
    Stop,
    /// Continue with the lowest numbered unvisited city
    FirstUnvisited,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Exponent of the pheromone intensity
    pub alpha: f64,
    /// Exponent of the inverse distance
    pub beta: f64,
    /// Fraction of pheromone that evaporates every iteration, in (0, 1)
    pub evaporation_rate: f64,
    /// Ratio between the upper and lower pheromone bound, per ant
    pub exploration_factor: f64,
    /// Number of ants, one per city when absent
    pub ants: Option<usize>,
    pub iterations: usize,
    pub bounds: BoundsPolicy,
    pub deposit: DepositPolicy,
    /// The `Q` of [DepositPolicy::AllAnts]
    pub deposit_constant: f64,
    pub guidance: Guidance,
    pub initial_trail: InitialTrail,
    pub dead_end: DeadEnd,
    /// Master seed, drawn at random when absent
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alpha: 1.,
            beta: 5.,
            evaporation_rate: 0.8,
            exploration_factor: 10.,
            ants: None,
            iterations: 500,
            bounds: BoundsPolicy::default(),
            deposit: DepositPolicy::default(),
            deposit_constant: 1.,
            guidance: Guidance::default(),
            initial_trail: InitialTrail::default(),
            dead_end: DeadEnd::default(),
            seed: None,
        }
    }
}

impl Config {
    /// Number of ants used for an instance with `dimension` cities.
    pub fn ant_count(&self, dimension: usize) -> usize {
        self.ants.unwrap_or(dimension)
    }

    /// Check every parameter before any iteration runs, so that no NaN or infinity can reach the pheromone field.
    pub fn validate(&self, dimension: usize) -> Result<()> {
        for (name, exponent) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !(exponent.is_finite() && exponent >= 0.) {
                return Err(Error::config(format!(
                    "{name} must be finite and non-negative, got {exponent}"
                )));
            }
        }
        if !(self.evaporation_rate > 0. && self.evaporation_rate < 1.) {
            return Err(Error::config(format!(
                "evaporation rate must be in (0, 1), got {}",
                self.evaporation_rate
            )));
        }
        if !(self.exploration_factor.is_finite() && self.exploration_factor > 0.) {
            return Err(Error::config(format!(
                "exploration factor must be finite and positive, got {}",
                self.exploration_factor
            )));
        }
        let ants = self.ant_count(dimension);
        if ants == 0 {
            return Err(Error::config("there must be at least one ant"));
        }
        if self.iterations == 0 {
            return Err(Error::config("there must be at least one iteration"));
        }
        if !(self.deposit_constant.is_finite() && self.deposit_constant > 0.) {
            return Err(Error::config(format!(
                "deposit constant must be finite and positive, got {}",
                self.deposit_constant
            )));
        }
        if self.bounds == BoundsPolicy::MinMax && self.exploration_factor * (ants as f64) < 1. {
            return Err(Error::config(format!(
                "exploration factor times ants must be at least 1 for the lower pheromone bound to stay below the upper one, got {} * {ants}",
                self.exploration_factor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundsPolicy, Config, DepositPolicy, Guidance};
    use crate::Error;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate(17).is_ok());
        assert_eq!(Config::default().ant_count(17), 17);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let invalid = [
            Config {
                evaporation_rate: 1.,
                ..Config::default()
            },
            Config {
                evaporation_rate: 0.,
                ..Config::default()
            },
            Config {
                alpha: f64::NAN,
                ..Config::default()
            },
            Config {
                beta: -1.,
                ..Config::default()
            },
            Config {
                exploration_factor: 0.,
                ..Config::default()
            },
            Config {
                ants: Some(0),
                ..Config::default()
            },
            Config {
                iterations: 0,
                ..Config::default()
            },
            Config {
                deposit_constant: f64::INFINITY,
                ..Config::default()
            },
            Config {
                exploration_factor: 0.5,
                ants: Some(1),
                ..Config::default()
            },
        ];
        for config in invalid {
            assert!(
                matches!(config.validate(5), Err(Error::Config { .. })),
                "{config:?}"
            );
        }
    }

    #[test]
    fn test_small_exploration_is_fine_without_bounds() {
        let config = Config {
            exploration_factor: 0.5,
            ants: Some(1),
            bounds: BoundsPolicy::Unbounded,
            ..Config::default()
        };
        assert!(config.validate(5).is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"beta": 2.5, "ants": 8, "deposit": "all-ants", "guidance": "arborescence"}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            Config {
                beta: 2.5,
                ants: Some(8),
                deposit: DepositPolicy::AllAnts,
                guidance: Guidance::Arborescence,
                ..Config::default()
            }
        );
    }
}
