use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A solver parameter is outside of its valid range.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Pheromone bounds and deposits are only defined for finite, positive lengths.
    #[error("invalid configuration: pheromone update needs a finite positive length, got {length}")]
    InvalidLength { length: f64 },

    /// Raised by the arborescence builder when the graph is not connected from the root.
    #[error("vertex {vertex} cannot be reached from root {root}")]
    Unreachable { vertex: usize, root: usize },

    #[error("vertex {vertex} is not part of the graph")]
    UnknownVertex { vertex: usize },

    #[error("malformed distance matrix: {message}")]
    Matrix { message: String },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
