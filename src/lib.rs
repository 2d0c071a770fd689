use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

pub mod artifact;
pub mod classifier;
#[cfg(feature = "training")]
pub mod dataset;
pub mod error;
mod helpers;
pub mod label;
pub mod metrics;
pub mod predictor;
pub mod service;
mod stop_words;
#[cfg(feature = "training")]
pub mod trainer;
pub mod vectorizer;

pub use artifact::{Artifact, ArtifactPaths};
pub use classifier::{LogisticConfig, LogisticRegression};
#[cfg(feature = "training")]
pub use dataset::{CorpusDescriptor, CorpusSchema, LabeledEmail};
pub use error::{Error, Result};
pub use label::Label;
pub use predictor::{PredictionResult, Predictor};
pub use service::Service;
#[cfg(feature = "training")]
pub use trainer::{Trainer, TrainerConfig};
pub use vectorizer::{FeatureVector, TfidfVectorizer, VectorizerConfig, Vocabulary};

pub const DEFAULT_MODELS_DIR: &str = "models";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Settings {
    pub spam_threshold: f64,
    pub models_dir: PathBuf,
    pub data_dir: PathBuf,
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl Settings {
    /// Build from key/value pairs; missing or unparseable values fall back to
    /// their defaults.
    pub fn new(data: &HashMap<String, String>) -> Self {
        let spam_threshold = match data.get("SPAM_THRESHOLD") {
            Some(raw) => raw.trim().parse::<f64>().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "ignoring unparseable SPAM_THRESHOLD");
                predictor::DEFAULT_THRESHOLD
            }),
            None => predictor::DEFAULT_THRESHOLD,
        };

        let path = |key: &str, default: &str| {
            data.get(key)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };

        let bind_addr = data
            .get("SPAM_BIND_ADDR")
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        Self {
            spam_threshold,
            models_dir: path("SPAM_MODELS_DIR", DEFAULT_MODELS_DIR),
            data_dir: path("SPAM_DATA_DIR", DEFAULT_DATA_DIR),
            bind_addr,
        }
    }

    pub fn from_env() -> Self {
        Self::from_os_pairs(std::env::vars_os())
    }

    /// Pairs whose key or value is not valid UTF-8 are skipped.
    pub fn from_os_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let data = pairs
            .into_iter()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self::new(&data)
    }

    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.models_dir)
    }
}

/// Install the global `tracing` subscriber, honoring `RUST_LOG`.
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let data = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::new(&data)
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.spam_threshold, 0.7);
        assert_eq!(settings.models_dir, PathBuf::from("models"));
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.bind_addr, "127.0.0.1:8000");
        assert_eq!(settings.artifact_paths(), ArtifactPaths::in_dir("models"));
    }

    #[test]
    fn test_settings_overrides() {
        let settings = settings(&[
            ("SPAM_THRESHOLD", "0.85"),
            ("SPAM_MODELS_DIR", "/srv/models"),
            ("SPAM_DATA_DIR", "corpora"),
            ("SPAM_BIND_ADDR", "0.0.0.0:9000"),
        ]);
        assert_eq!(settings.spam_threshold, 0.85);
        assert_eq!(
            settings.artifact_paths().classifier,
            PathBuf::from("/srv/models/classifier.bin")
        );
        assert_eq!(settings.data_dir, PathBuf::from("corpora"));
        assert_eq!(settings.bind_addr, "0.0.0.0:9000");
    }

    #[test]
    fn test_unparseable_threshold_falls_back() {
        let settings = settings(&[("SPAM_THRESHOLD", "strict"), ("SPAM_MODELS_DIR", " ")]);
        assert_eq!(settings.spam_threshold, predictor::DEFAULT_THRESHOLD);
        assert_eq!(settings.models_dir, PathBuf::from("models"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_environment_is_skipped() {
        use std::os::unix::ffi::OsStringExt;

        let settings = Settings::from_os_pairs([
            (OsString::from("SPAM_THRESHOLD"), OsString::from("0.9")),
            (OsString::from("SPAM_DATA_DIR"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![0xc3]), OsString::from("ignored")),
        ]);
        assert_eq!(settings.spam_threshold, 0.9);
        assert_eq!(settings.data_dir, PathBuf::from("data"));
    }
}
