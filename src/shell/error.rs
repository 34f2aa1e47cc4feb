use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::syntax::SyntaxError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    /// A file or directory named by the user could not be used.
    #[error("{}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },

    /// Pipe or process creation failed; the whole pipeline was abandoned.
    #[error("cannot launch pipeline: {reason}: {source}")]
    Launch {
        reason: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("{program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: nix::Error,
    },

    #[error("{0}")]
    Usage(String),

    #[error("argument contains a NUL byte: {0:?}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn resource<P: Into<PathBuf>>(path: P, source: nix::Error) -> Error {
        Error::Resource {
            path: path.into(),
            source,
        }
    }

    pub fn launch(reason: &'static str, source: nix::Error) -> Error {
        Error::Launch { reason, source }
    }
}
