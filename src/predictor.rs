use tracing::info;

use crate::artifact::{Artifact, ArtifactPaths};
use crate::classifier::LogisticRegression;
use crate::error::{Error, Result};
use crate::vectorizer::TfidfVectorizer;

pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Per-call prediction.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PredictionResult {
    pub is_spam: bool,
    pub spam_probability: f64,
    pub threshold: f64,
}

/// Inclusive: a probability equal to the threshold is spam.
pub fn is_spam(spam_probability: f64, threshold: f64) -> bool {
    spam_probability >= threshold
}

pub fn validate_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::Config(format!(
            "threshold must be within [0, 1], got {threshold}"
        )));
    }
    Ok(())
}

/// Loaded artifacts plus a fixed decision threshold. Immutable once built, so
/// one instance can serve concurrent callers by shared reference.
#[derive(Debug)]
pub struct Predictor {
    vectorizer: TfidfVectorizer,
    classifier: LogisticRegression,
    threshold: f64,
}

impl Predictor {
    /// Load both artifacts; fails before returning if either is absent.
    pub fn new(threshold: f64, paths: &ArtifactPaths) -> Result<Self> {
        validate_threshold(threshold)?;
        for path in [&paths.vectorizer, &paths.classifier] {
            if !path.is_file() {
                return Err(Error::ArtifactMissing { path: path.clone() });
            }
        }

        let vectorizer = TfidfVectorizer::load(&paths.vectorizer)?;
        let classifier = LogisticRegression::load(&paths.classifier)?;
        let predictor = Self::from_parts(threshold, vectorizer, classifier).map_err(|err| {
            match err {
                Error::Config(message) => Error::InvalidArtifact {
                    path: paths.classifier.clone(),
                    message,
                },
                other => other,
            }
        })?;

        info!(
            threshold,
            features = predictor.classifier.n_features(),
            "loaded predictor"
        );
        Ok(predictor)
    }

    pub fn from_parts(
        threshold: f64,
        vectorizer: TfidfVectorizer,
        classifier: LogisticRegression,
    ) -> Result<Self> {
        validate_threshold(threshold)?;
        let vocabulary = vectorizer.vocabulary().ok_or(Error::NotFitted)?;
        if vocabulary.len() != classifier.n_features() {
            return Err(Error::Config(format!(
                "classifier expects {} features but the vocabulary has {}",
                classifier.n_features(),
                vocabulary.len()
            )));
        }

        Ok(Self {
            vectorizer,
            classifier,
            threshold,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }

    pub fn classifier(&self) -> &LogisticRegression {
        &self.classifier
    }

    pub fn spam_probability(&self, text: &str) -> Result<f64> {
        let features = self.vectorizer.transform_one(text)?;
        Ok(self.classifier.predict_probability(&features))
    }

    pub fn predict(&self, text: &str) -> Result<PredictionResult> {
        let spam_probability = self.spam_probability(text)?;
        Ok(PredictionResult {
            is_spam: is_spam(spam_probability, self.threshold),
            spam_probability,
            threshold: self.threshold,
        })
    }
}
