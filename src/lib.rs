pub mod math;

pub mod colony;
pub mod error;
pub mod experiment;
pub mod graph;
pub mod matrix;
pub mod tsplib;

pub use error::{Error, Result};
