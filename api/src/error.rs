//! The error type shared by all build stages.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort an index build. A half-built index is never returned: any of
/// these unwinds the whole build.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The build configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The builder was asked to build a second time.
    #[error("Index already built")]
    AlreadyBuilt,

    /// A color set does not fit in an empty staging buffer.
    #[error("Color set of {num_colors} colors needs {needed_bytes} bytes but a staging buffer holds only {capacity_bytes} bytes")]
    BufferTooSmall {
        /// Number of colors in the set that did not fit
        num_colors: usize,
        /// Bytes needed to stage the set, including its size prefix
        needed_bytes: usize,
        /// Capacity of one staging buffer
        capacity_bytes: usize,
    },

    /// The intermediate unitig file could not be created.
    #[error("Cannot open output file {}: {source}", path.display())]
    OpenOutput {
        /// Path that could not be opened
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing failed during the build.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The graph collaborator presented a malformed color set.
    #[error("Invalid color set for unitig {unitig}: {reason}")]
    InvalidColorSet {
        /// Position of the unitig in the stream
        unitig: usize,
        /// What is wrong with the set
        reason: String,
    },

    /// The graph collaborator failed while producing the stream.
    #[error("Unitig source failed: {0}")]
    Source(String),

    /// The stream did not contain a single unitig.
    #[error("The unitig stream is empty")]
    EmptyStream,

    /// An encoder worker panicked.
    #[error("Encoder worker {slot} panicked")]
    WorkerPanicked {
        /// Worker slot
        slot: usize,
    },

    /// An encoder worker stopped without returning its staging buffer.
    #[error("Encoder worker {slot} stopped unexpectedly")]
    WorkerDisconnected {
        /// Worker slot
        slot: usize,
    },

    /// The build was aborted because another thread failed.
    #[error("Build aborted")]
    Aborted,

    /// The k-mer dictionary could not be built.
    #[error("K-mer dictionary: {0}")]
    Dictionary(String),

    /// A consistency check on the finished structures failed.
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

impl BuildError {
    // Errors that are only a consequence of a failure elsewhere in the build.
    pub(crate) fn is_secondary(&self) -> bool {
        matches!(self, BuildError::Aborted | BuildError::WorkerDisconnected { .. })
    }
}
