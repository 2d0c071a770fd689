//! Offline training: split, fit vectorizer and classifier, evaluate, persist.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::artifact::{Artifact, ArtifactPaths};
use crate::classifier::{FitSummary, LogisticConfig, LogisticRegression};
use crate::dataset::LabeledEmail;
use crate::error::{Error, Result};
use crate::label::Label;
use crate::metrics::{roc_auc, ClassificationReport, ConfusionMatrix};
use crate::vectorizer::{TfidfVectorizer, VectorizerConfig};

pub const DEFAULT_TEST_SIZE: f64 = 0.2;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainerConfig {
    /// Fraction of each class held out for evaluation.
    pub test_size: f64,
    pub seed: u64,
    pub vectorizer: VectorizerConfig,
    pub classifier: LogisticConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            test_size: DEFAULT_TEST_SIZE,
            seed: DEFAULT_SEED,
            vectorizer: VectorizerConfig::default(),
            classifier: LogisticConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Split<'a> {
    pub train: Vec<&'a LabeledEmail>,
    pub test: Vec<&'a LabeledEmail>,
}

/// Partition `emails` so both subsets keep the spam/legitimate ratio.
/// The result depends only on the input order and `seed`.
pub fn stratified_split(emails: &[LabeledEmail], test_size: f64, seed: u64) -> Result<Split<'_>> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(Error::Config(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for label in [Label::Legitimate, Label::Spam] {
        let mut members: Vec<&LabeledEmail> =
            emails.iter().filter(|email| email.label == label).collect();
        members.shuffle(&mut rng);

        let n_test = (members.len() as f64 * test_size).round() as usize;
        let rest = members.split_off(n_test);
        test.extend(members);
        train.extend(rest);
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok(Split { train, test })
}

/// Held-out performance of a fitted model.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub train_size: usize,
    pub test_size: usize,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
    /// `None` when the test set holds one class only.
    pub auc: Option<f64>,
    pub fit: FitSummary,
}

impl Evaluation {
    pub fn print(&self) {
        println!("=== Evaluation ===");
        println!("Train emails: {}", self.train_size);
        println!("Test emails: {}", self.test_size);
        println!(
            "Optimizer iterations: {} (converged: {})",
            self.fit.iterations, self.fit.converged
        );
        println!();
        println!("Confusion matrix [[TP, FN], [FP, TN]]: {:?}", self.confusion.to_matrix());
        println!();
        print!("{}", self.report);
        println!();
        match self.auc {
            Some(auc) => println!("AUC: {auc:.4}"),
            None => println!("AUC: unavailable (test set holds a single class)"),
        }
        println!("==================");
    }
}

#[derive(Debug)]
pub struct TrainedModel {
    pub vectorizer: TfidfVectorizer,
    pub classifier: LogisticRegression,
    pub evaluation: Evaluation,
}

impl TrainedModel {
    /// Write the two artifacts; each lands atomically.
    pub fn save(&self, paths: &ArtifactPaths) -> Result<()> {
        self.vectorizer.save(&paths.vectorizer)?;
        self.classifier.save(&paths.classifier)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Fit and evaluate. Nothing is written to disk.
    pub fn train(&self, emails: &[LabeledEmail]) -> Result<TrainedModel> {
        if emails.is_empty() {
            return Err(Error::Training("corpus is empty".into()));
        }

        let split = stratified_split(emails, self.config.test_size, self.config.seed)?;
        info!(
            train = split.train.len(),
            test = split.test.len(),
            "split corpus"
        );

        let train_texts: Vec<&str> = split.train.iter().map(|e| e.text.as_str()).collect();
        let train_labels: Vec<Label> = split.train.iter().map(|e| e.label).collect();

        let mut vectorizer = TfidfVectorizer::new(self.config.vectorizer);
        let x_train = vectorizer.fit_transform(&train_texts)?;
        let n_features = vectorizer.vocabulary().map_or(0, |v| v.len());

        let (classifier, fit) =
            LogisticRegression::fit(&x_train, &train_labels, n_features, &self.config.classifier)?;

        let evaluation = self.evaluate(&vectorizer, &classifier, &split, fit)?;
        Ok(TrainedModel {
            vectorizer,
            classifier,
            evaluation,
        })
    }

    /// Train, then persist only if training succeeded.
    pub fn train_and_save(
        &self,
        emails: &[LabeledEmail],
        paths: &ArtifactPaths,
    ) -> Result<TrainedModel> {
        let model = self.train(emails)?;
        model.save(paths)?;
        Ok(model)
    }

    fn evaluate(
        &self,
        vectorizer: &TfidfVectorizer,
        classifier: &LogisticRegression,
        split: &Split<'_>,
        fit: FitSummary,
    ) -> Result<Evaluation> {
        let test_texts: Vec<&str> = split.test.iter().map(|e| e.text.as_str()).collect();
        let actual: Vec<Label> = split.test.iter().map(|e| e.label).collect();
        let x_test = vectorizer.transform(&test_texts)?;

        let probabilities: Vec<f64> = x_test
            .iter()
            .map(|x| classifier.predict_probability(x))
            .collect();
        let predicted: Vec<Label> = x_test.iter().map(|x| classifier.predict(x)).collect();

        let confusion = ConfusionMatrix::from_predictions(&actual, &predicted);
        let auc = roc_auc(&actual, &probabilities);
        match auc {
            Some(auc) => info!(auc, "evaluated model"),
            None => warn!("AUC unavailable: test set holds a single class"),
        }

        Ok(Evaluation {
            train_size: split.train.len(),
            test_size: split.test.len(),
            confusion,
            report: ClassificationReport::new(&confusion),
            auc,
            fit,
        })
    }
}
