use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a translation run.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad invocation or an unusable input set.
    #[error("configuration error: {0}")]
    Config(String),
    /// A source line that does not form a valid command.
    #[error("{unit}:{line}: syntax error: {reason} in `{text}`")]
    Syntax {
        unit: String,
        line: usize,
        text: String,
        reason: String,
    },
    /// A well-formed command that cannot be realized on the target.
    #[error("{unit}:{line}: cannot translate `{command}`: {reason}")]
    Codegen {
        unit: String,
        line: usize,
        command: String,
        reason: String,
    },
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
