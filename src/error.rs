use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Corpus source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Schema error in {corpus}: {message}")]
    Schema { corpus: String, message: String },

    #[error("Feature extractor is not fitted")]
    NotFitted,

    #[error("Feature extractor is already fitted")]
    AlreadyFitted,

    #[error(
        "Model artifact not found: {}. Run `cargo run --release --bin train` first",
        path.display()
    )]
    ArtifactMissing { path: PathBuf },

    #[error("Invalid artifact {}: {message}", path.display())]
    InvalidArtifact { path: PathBuf, message: String },

    #[error("After pruning, no terms remain; lower min_df or raise max_df")]
    EmptyVocabulary,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "training")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("FST error: {0}")]
    Fst(#[from] fst::Error),
}

impl Error {
    /// Stable identifier exposed across the serving boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SourceNotFound { .. } => "source_not_found",
            Error::Schema { .. } => "schema_error",
            Error::NotFitted => "not_fitted",
            Error::AlreadyFitted => "already_fitted",
            Error::ArtifactMissing { .. } => "artifact_missing",
            Error::InvalidArtifact { .. } => "invalid_artifact",
            Error::EmptyVocabulary => "empty_vocabulary",
            Error::Config(_) => "config_error",
            Error::Training(_) => "training_error",
            Error::Io(_) => "io_error",
            #[cfg(feature = "training")]
            Error::Csv(_) => "csv_error",
            Error::Fst(_) => "fst_error",
        }
    }

    pub(crate) fn schema(corpus: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Schema {
            corpus: corpus.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
