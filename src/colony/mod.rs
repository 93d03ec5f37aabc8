//! [Max-Min Ant System](https://doi.org/10.1016/S0167-739X(00)00043-1) for the asymmetric traveling salesman problem.

/// Tour construction by a single ant
pub mod ant;
pub mod config;
/// Pheromone intensities and their bounds
pub mod pheromone;
/// Iteration loop shared by all ants
pub mod scheduler;

pub use ant::Tour;
pub use config::Config;
pub use scheduler::{Solution, Solver};
