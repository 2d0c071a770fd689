use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use phishing_detector::{init_logging, PredictionResult, Predictor, Settings};

#[derive(Parser, Debug)]
#[command(name = "detect", about = "Classifies emails typed on standard input")]
struct Args {
    /// Spam probability at or above which an email is flagged [env: SPAM_THRESHOLD]
    #[arg(long)]
    threshold: Option<f64>,

    /// Directory holding the trained artifacts [env: SPAM_MODELS_DIR]
    #[arg(long)]
    models_dir: Option<PathBuf>,
}

const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    EXIT_COMMANDS.iter().any(|cmd| line.eq_ignore_ascii_case(cmd))
}

fn format_verdict(result: &PredictionResult) -> String {
    let verdict = if result.is_spam {
        "SPAM/PHISHING"
    } else {
        "LEGITIMATE"
    };
    format!(
        "Result: {verdict}\nSpam probability: {:.2}% (threshold: {:.2}%)",
        result.spam_probability * 100.0,
        result.threshold * 100.0
    )
}

fn run<R: BufRead, W: Write>(predictor: &Predictor, input: R, mut output: W) -> Result<()> {
    writeln!(output, "Paste an email and press enter (type 'exit' to quit).")?;
    write!(output, "> ")?;
    output.flush()?;

    for line in input.lines() {
        let line = line?;
        if is_exit_command(&line) {
            break;
        }
        if !line.trim().is_empty() {
            let result = predictor.predict(&line)?;
            writeln!(output, "{}", format_verdict(&result))?;
        }
        write!(output, "> ")?;
        output.flush()?;
    }

    writeln!(output)?;
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let settings = Settings::from_env();
    let threshold = args.threshold.unwrap_or(settings.spam_threshold);
    let models_dir = args.models_dir.unwrap_or(settings.models_dir);

    let predictor = Predictor::new(threshold, &phishing_detector::ArtifactPaths::in_dir(models_dir))
        .context("could not load the detector")?;

    run(&predictor, io::stdin().lock(), io::stdout().lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_verdict() {
        let spam = PredictionResult {
            is_spam: true,
            spam_probability: 0.85,
            threshold: 0.7,
        };
        assert_eq!(
            format_verdict(&spam),
            "Result: SPAM/PHISHING\nSpam probability: 85.00% (threshold: 70.00%)"
        );

        let ham = PredictionResult {
            is_spam: false,
            spam_probability: 0.123456,
            threshold: 0.7,
        };
        assert_eq!(
            format_verdict(&ham),
            "Result: LEGITIMATE\nSpam probability: 12.35% (threshold: 70.00%)"
        );
    }

    #[test]
    fn test_exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("  QUIT \n"));
        assert!(!is_exit_command("exit now"));
        assert!(!is_exit_command(""));
    }
}
