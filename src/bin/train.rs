use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use phishing_detector::classifier::LogisticConfig;
use phishing_detector::dataset::{self, CorpusStats};
use phishing_detector::trainer::{Trainer, TrainerConfig};
use phishing_detector::vectorizer::VectorizerConfig;
use phishing_detector::{init_logging, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Fits the TF-IDF vectorizer and spam classifier from the labeled corpora"
)]
struct Args {
    /// Directory holding the corpus CSV files [env: SPAM_DATA_DIR]
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory the two artifacts are written to [env: SPAM_MODELS_DIR]
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Seed of the stratified train/test split
    #[arg(long, default_value_t = phishing_detector::trainer::DEFAULT_SEED)]
    seed: u64,

    /// Fraction of each class held out for evaluation
    #[arg(long, default_value_t = phishing_detector::trainer::DEFAULT_TEST_SIZE)]
    test_size: f64,

    /// Minimum number of documents a term must appear in
    #[arg(long, default_value_t = phishing_detector::vectorizer::DEFAULT_MIN_DF)]
    min_df: u32,

    /// Maximum fraction of documents a term may appear in
    #[arg(long, default_value_t = phishing_detector::vectorizer::DEFAULT_MAX_DF)]
    max_df: f64,

    /// Inverse regularization strength
    #[arg(long, default_value_t = phishing_detector::classifier::DEFAULT_C)]
    c: f64,

    /// Solver iteration cap
    #[arg(long, default_value_t = phishing_detector::classifier::DEFAULT_MAX_ITER)]
    max_iter: usize,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let settings = Settings::from_env();
    let data_dir = args.data_dir.unwrap_or(settings.data_dir);
    let models_dir = args.models_dir.unwrap_or(settings.models_dir);

    println!("Reading training corpora from {}...", data_dir.display());
    let corpora = dataset::default_corpora(&data_dir);
    let emails = dataset::unify(&corpora).context("failed to load the training corpora")?;
    CorpusStats::from_emails(&emails).print();

    let config = TrainerConfig {
        test_size: args.test_size,
        seed: args.seed,
        vectorizer: VectorizerConfig {
            min_df: args.min_df,
            max_df: args.max_df,
            ..VectorizerConfig::default()
        },
        classifier: LogisticConfig {
            c: args.c,
            max_iter: args.max_iter,
            ..LogisticConfig::default()
        },
    };
    info!(?config, "starting training");

    let paths = phishing_detector::ArtifactPaths::in_dir(&models_dir);
    let model = Trainer::new(config)
        .train_and_save(&emails, &paths)
        .context("training failed")?;

    model.evaluation.print();
    println!("Vectorizer saved to: {}", paths.vectorizer.display());
    println!("Classifier saved to: {}", paths.classifier.display());

    Ok(())
}
