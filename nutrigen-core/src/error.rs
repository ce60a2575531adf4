//! Error kinds for the inference pipeline.
//!
//! Every failure the pipeline can report is one of these variants; the
//! presentation layer maps each kind to a display string instead of
//! catching untyped faults.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Tokenizer or checkpoint file absent at its fixed path.
    #[error("artifact not found at {0}")]
    ArtifactMissing(PathBuf),

    /// Checkpoint is structurally unusable (empty parameter set,
    /// malformed metadata).
    #[error("cannot resolve model configuration: {0}")]
    ConfigResolution(String),

    /// Saved parameters are incompatible with the instantiated model.
    #[error("checkpoint parameters incompatible with model: {0}")]
    ParameterMismatch(String),

    /// No ingredients supplied.
    #[error("no ingredients supplied")]
    EmptyInput,

    /// Fault during the forward-pass / sampling loop.
    #[error("generation failed: {0}")]
    Generation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
