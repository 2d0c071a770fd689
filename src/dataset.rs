//! Loading and unifying labeled email corpora.
//!
//! Every corpus is a CSV file with a header row. Its [`CorpusSchema`] decides
//! which columns are required and how the email text is assembled. The unified
//! corpus is stripped, emptied rows are dropped and exact `(text, label)`
//! duplicates are removed keeping the first occurrence.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
pub use crate::label::Label;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledEmail {
    pub text: String,
    pub label: Label,
    /// Name of the corpus the email came from.
    pub source: String,
}

/// Shape of a corpus file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusSchema {
    /// `subject`, `body` and `label` columns; text is `subject + " " + body`.
    SubjectBody,
    /// `text_combined` and `label` columns.
    CombinedText,
}

impl CorpusSchema {
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            CorpusSchema::SubjectBody => &["subject", "body", "label"],
            CorpusSchema::CombinedText => &["text_combined", "label"],
        }
    }

    fn text_columns(self) -> &'static [&'static str] {
        let columns = self.required_columns();
        &columns[..columns.len() - 1]
    }

    /// Missing cells count as empty strings.
    fn assemble(self, fields: &[Option<&str>]) -> String {
        match self {
            CorpusSchema::SubjectBody => {
                let subject = fields.first().copied().flatten().unwrap_or_default();
                let body = fields.get(1).copied().flatten().unwrap_or_default();
                format!("{subject} {body}")
            }
            CorpusSchema::CombinedText => fields
                .first()
                .copied()
                .flatten()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusDescriptor {
    pub path: PathBuf,
    pub schema: CorpusSchema,
}

impl CorpusDescriptor {
    pub fn new(path: impl Into<PathBuf>, schema: CorpusSchema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// The standard corpora expected under `data_dir`.
pub fn default_corpora(data_dir: &Path) -> Vec<CorpusDescriptor> {
    const SUBJECT_BODY: &[&str] = &[
        "Enron.csv",
        "Ling.csv",
        "SpamAssasin.csv",
        "Nazario.csv",
        "Nigerian_Fraud.csv",
        "CEAS_08.csv",
    ];

    SUBJECT_BODY
        .iter()
        .map(|name| CorpusDescriptor::new(data_dir.join(name), CorpusSchema::SubjectBody))
        .chain(std::iter::once(CorpusDescriptor::new(
            data_dir.join("phishing_email.csv"),
            CorpusSchema::CombinedText,
        )))
        .collect()
}

/// Load one corpus file and normalize it to [`LabeledEmail`]s.
pub fn normalize(descriptor: &CorpusDescriptor) -> Result<Vec<LabeledEmail>> {
    let file = File::open(&descriptor.path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => Error::SourceNotFound {
            path: descriptor.path.clone(),
        },
        _ => Error::Io(err),
    })?;

    let emails = normalize_reader(io::BufReader::new(file), &descriptor.name(), descriptor.schema)?;
    info!(corpus = %descriptor.name(), rows = emails.len(), "loaded corpus");
    Ok(emails)
}

/// Normalize CSV data read from `reader`.
pub fn normalize_reader<R: io::Read>(
    reader: R,
    corpus: &str,
    schema: CorpusSchema,
) -> Result<Vec<LabeledEmail>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| header.trim() == name)
            .ok_or_else(|| Error::schema(corpus, format!("missing required column `{name}`")))
    };

    let text_indexes = schema
        .text_columns()
        .iter()
        .map(|name| column(name))
        .collect::<Result<Vec<_>>>()?;
    let label_index = column("label")?;

    let mut emails = Vec::new();
    for (row, record) in reader.records().enumerate() {
        // Header is line 1.
        let line = row + 2;
        let record = record
            .map_err(|err| Error::schema(corpus, format!("malformed row at line {line}: {err}")))?;

        let raw_label = record.get(label_index).unwrap_or_default();
        let label = Label::parse(raw_label).ok_or_else(|| {
            Error::schema(
                corpus,
                format!("invalid label {raw_label:?} at line {line}, expected 0 or 1"),
            )
        })?;

        let fields: Vec<Option<&str>> = text_indexes.iter().map(|&i| record.get(i)).collect();
        emails.push(LabeledEmail {
            text: schema.assemble(&fields),
            label,
            source: corpus.to_string(),
        });
    }

    Ok(emails)
}

/// Load every corpus and merge them into one deduplicated corpus.
///
/// Corpora load in parallel; the first failure aborts the whole run.
pub fn unify(sources: &[CorpusDescriptor]) -> Result<Vec<LabeledEmail>> {
    let corpora = std::thread::scope(|scope| {
        let handles: Vec<_> = sources
            .iter()
            .map(|descriptor| scope.spawn(move || normalize(descriptor)))
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(Error::Training("corpus loader panicked".into())))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(unify_corpora(corpora))
}

/// Concatenate already-normalized corpora, strip text, drop empty texts and
/// remove duplicate `(text, label)` pairs.
pub fn unify_corpora(corpora: Vec<Vec<LabeledEmail>>) -> Vec<LabeledEmail> {
    let mut emails: Vec<LabeledEmail> = corpora.into_iter().flatten().collect();
    let loaded = emails.len();

    for email in &mut emails {
        let trimmed = email.text.trim();
        if trimmed.len() != email.text.len() {
            email.text = trimmed.to_string();
        }
    }
    emails.retain(|email| !email.text.is_empty());
    let non_empty = emails.len();

    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(emails.len());
        emails
            .iter()
            .map(|email| seen.insert((email.text.as_str(), email.label)))
            .collect()
    };
    let mut keep = keep.into_iter();
    emails.retain(|_| keep.next().unwrap_or(false));

    debug!(loaded, empty = loaded - non_empty, "stripped corpus");
    info!(
        emails = emails.len(),
        duplicates = non_empty - emails.len(),
        "unified corpus"
    );
    emails
}

/// Label balance of a corpus, overall and per source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub total: usize,
    pub spam: usize,
    pub legitimate: usize,
    pub per_source: BTreeMap<String, (usize, usize)>,
}

impl CorpusStats {
    pub fn from_emails(emails: &[LabeledEmail]) -> Self {
        let mut stats = Self::default();
        for email in emails {
            let entry = stats.per_source.entry(email.source.clone()).or_default();
            stats.total += 1;
            if email.label.is_spam() {
                stats.spam += 1;
                entry.0 += 1;
            } else {
                stats.legitimate += 1;
                entry.1 += 1;
            }
        }
        stats
    }

    pub fn print(&self) {
        let share = |count: usize| {
            if self.total == 0 {
                0.0
            } else {
                count as f64 / self.total as f64 * 100.0
            }
        };

        println!("=== Corpus Statistics ===");
        println!("Total emails: {}", self.total);
        println!("Spam emails: {} ({:.1}%)", self.spam, share(self.spam));
        println!(
            "Legitimate emails: {} ({:.1}%)",
            self.legitimate,
            share(self.legitimate)
        );
        for (source, (spam, legitimate)) in &self.per_source {
            println!("  {source}: {spam} spam / {legitimate} legitimate");
        }
        println!("=========================");
    }
}
