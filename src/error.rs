use std::path::PathBuf;

use thiserror::Error;

use crate::bdd::BddError;

/// Everything that can go wrong while reading circuits and checking them.
#[derive(Debug, Error)]
pub enum Error {
    /// The text is not a well-formed ASCII AIGER file.
    #[error("line {line}: {message}")]
    Format { line: usize, message: String },

    /// The file parses, but does not describe a usable circuit.
    #[error("malformed circuit: {0}")]
    MalformedCircuit(String),

    /// A game-shaped check needs both controllable and uncontrollable inputs.
    #[error("circuit has {controlled} controllable and {uncontrolled} uncontrollable inputs, both must be present")]
    MissingPartition { controlled: usize, uncontrolled: usize },

    /// A synthesized circuit does not have the shape of a solution of its game.
    #[error("synthesized circuit does not match its game: {0}")]
    SynthesisShape(String),

    /// Table sizes the decision diagram backend cannot be built with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The decision diagram backend ran out of room, even after garbage collection.
    #[error("decision diagram resources exhausted: {0}")]
    ResourceExhausted(#[from] BddError),

    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        Error::Format {
            line,
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
