//! Engine error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the allocation and mixing engine
#[derive(Error, Debug)]
pub enum MixError {
    /// Destination file name has no `?` run to number
    #[error("No sequence placeholder in pattern '{pattern}': add a run of '?' where the number goes")]
    NoPlaceholder { pattern: String },

    /// Next sequence number no longer fits the placeholder
    #[error("Sequence exhausted for pattern '{pattern}': numbers no longer fit {width} digits")]
    SequenceExhausted { pattern: String, width: usize },

    #[error("Invalid destination pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Not enough eligible recordings to satisfy a request
    #[error(
        "Samples not enough to satisfy request: {available} available < {requested} requested \
         for source {source_id} and pattern {pattern}"
    )]
    InsufficientSamples {
        pattern: String,
        source_id: String,
        available: usize,
        requested: usize,
    },

    /// Some requested microphone has no noise recording of the requested class
    #[error("No noise available for microphones {mics:?} (noise key prefix {noise_key}), pattern {pattern}")]
    NoNoiseAvailable {
        pattern: String,
        noise_key: String,
        mics: Vec<u8>,
    },

    /// No catalog entry of the class whose baseline is needed
    #[error("No catalog entries of class '{class}' to compute a baseline RMS")]
    MissingBaseline { class: char },

    #[error("Failed to decode audio file {path}: {reason}")]
    AudioDecode { path: PathBuf, reason: String },

    #[error("Resampling failed: {0}")]
    Resample(String),

    /// Noise baseline of zero would make the mix weight infinite
    #[error("Noise recording {id} has unusable RMS {rms}")]
    DegenerateNoise { id: String, rms: f64 },

    #[error("IO error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write WAV file {path}: {reason}")]
    WavWrite { path: PathBuf, reason: String },

    #[error("Invalid statistics table: {0}")]
    Catalog(String),

    /// A content swap failed; `holding` is set when data was left in the holding area
    #[error("Shuffle failed swapping {a} and {b}{}", holding.as_ref().map(|p| format!(" (content kept in {})", p.display())).unwrap_or_default())]
    Shuffle {
        a: PathBuf,
        b: PathBuf,
        holding: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },
}

impl MixError {
    /// Wrap an IO error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MixError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for engine operations
pub type MixResult<T> = Result<T, MixError>;
