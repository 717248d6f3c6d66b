use std::path::PathBuf;
use thiserror::Error;

/// Why a single region could not contribute source text.
///
/// `MissingSourceInfo` and `SourceNotFound` are recoverable: the assembler logs
/// them and moves on to the next ancestor. `Io` aborts the run.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("region {region} does not have source information")]
    MissingSourceInfo { region: String },

    #[error("source code not found: the source file {} does not exist", .path.display())]
    SourceNotFound { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ReasoningError {
    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("reasoning service returned no models at {url}")]
    NoModels { url: String },

    #[error("reasoning service returned no choices")]
    EmptyResponse,

    #[error("no usable answer after {attempts} attempts")]
    Exhausted { attempts: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ResolveError>;
