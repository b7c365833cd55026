//! Error types for the pescan analysis pipeline.
//!
//! Setup errors (arguments, missing inputs, config, rule loading) abort the
//! run before any target is processed. Per-target errors (parse, extraction)
//! are reported on the diagnostic stream and the batch continues.

use std::path::PathBuf;
use thiserror::Error;

use crate::formats::pe::PeError;

/// Exit status for a run that completed, even if some targets failed to parse.
pub const EXIT_SUCCESS: u8 = 0;

/// Exit status when a requested signature engine could not load its rules.
pub const EXIT_ENGINE_LOAD: u8 = 1;

/// Exit status when the report itself could not be written.
pub const EXIT_FAILURE: u8 = 1;

/// Exit status for argument, input or configuration problems.
pub const EXIT_USAGE: u8 = 2;

/// Main error type for pescan operations.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Malformed or incomplete command line
    #[error("Could not parse command line ({0})")]
    Argument(String),

    /// A literal target path does not exist
    #[error("{} not found", path.display())]
    MissingInput { path: PathBuf },

    /// Configuration file could not be read or decoded
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A requested signature engine failed to load its rules
    #[error("Could not load {engine} signatures from {} ({reason})", path.display())]
    EngineLoad {
        engine: String,
        path: PathBuf,
        reason: String,
    },

    /// A target is not a well-formed image
    #[error("Could not parse {} ({source})", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: PeError,
    },

    /// A directory of an otherwise valid image is malformed
    #[error("{0}")]
    Malformed(#[from] PeError),

    /// Resource extraction failed for one target
    #[error("Could not extract resources to {} ({reason})", path.display())]
    Extraction { path: PathBuf, reason: String },

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pescan operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    /// Whether this error ends the run instead of a single target.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Argument(_) | Self::MissingInput { .. } | Self::Config(_) | Self::EngineLoad { .. }
        )
    }

    /// Process exit status for a fatal error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::EngineLoad { .. } => EXIT_ENGINE_LOAD,
            Self::Argument(_) | Self::MissingInput { .. } | Self::Config(_) => EXIT_USAGE,
            // Output is incomplete once a write fails.
            Self::Io(_) => EXIT_FAILURE,
            // Per-target errors never end the run on their own.
            Self::Parse { .. } | Self::Malformed(_) | Self::Extraction { .. } => EXIT_SUCCESS,
        }
    }
}
