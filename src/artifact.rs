//! On-disk artifacts: the fitted vectorizer and the classifier, stored as two
//! independent little-endian binary files.
//!
//! Vectorizer layout: magic, version, `min_df` u32, `max_df` f64, n-gram range
//! (2 × u8), flags u8, term count u64, one f64 IDF weight per term, FST length
//! u64, FST bytes.
//!
//! Classifier layout: magic, version, weight count u64, weights f64, bias f64.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::info;

use crate::classifier::LogisticRegression;
use crate::error::{Error, Result};
use crate::vectorizer::{TfidfVectorizer, VectorizerConfig, Vocabulary};

const VECTORIZER_MAGIC: &[u8; 8] = b"SPAMVEC\0";
const CLASSIFIER_MAGIC: &[u8; 8] = b"SPAMCLF\0";
const FORMAT_VERSION: u16 = 1;

const FLAG_SUBLINEAR_TF: u8 = 0b01;
const FLAG_STOP_WORDS: u8 = 0b10;

pub const VECTORIZER_FILE: &str = "vectorizer.bin";
pub const CLASSIFIER_FILE: &str = "classifier.bin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub vectorizer: PathBuf,
    pub classifier: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            vectorizer: dir.join(VECTORIZER_FILE),
            classifier: dir.join(CLASSIFIER_FILE),
        }
    }
}

/// Something that persists as a single binary file.
pub trait Artifact: Sized {
    fn encode(&self) -> Result<Bytes>;

    /// `path` is only used for error messages.
    fn decode(data: &[u8], path: &Path) -> Result<Self>;

    fn save(&self, path: &Path) -> Result<()> {
        let data = self.encode()?;
        write_atomic(path, &data)?;
        info!(path = %path.display(), bytes = data.len(), "saved artifact");
        Ok(())
    }

    fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::ArtifactMissing {
                path: path.to_path_buf(),
            },
            _ => Error::Io(err),
        })?;
        Self::decode(&data, path)
    }
}

/// Write through a temporary file in the target directory, then rename it
/// over `path`. Readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| Error::Io(err.error))?;
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
    path: &'a Path,
}

impl<'a> Reader<'a> {
    fn invalid(&self, message: impl Into<String>) -> Error {
        Error::InvalidArtifact {
            path: self.path.to_path_buf(),
            message: message.into(),
        }
    }

    fn ensure(&self, len: usize) -> Result<()> {
        if self.buf.remaining() < len {
            return Err(self.invalid("truncated file"));
        }
        Ok(())
    }

    fn header(&mut self, magic: &[u8; 8]) -> Result<()> {
        self.ensure(magic.len() + 2)?;
        if &self.buf[..magic.len()] != magic {
            return Err(self.invalid("unrecognized file header"));
        }
        self.buf.advance(magic.len());
        let version = self.buf.get_u16_le();
        if version != FORMAT_VERSION {
            return Err(self.invalid(format!("unsupported format version {version}")));
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn len(&mut self) -> Result<usize> {
        self.ensure(8)?;
        usize::try_from(self.buf.get_u64_le()).map_err(|_| self.invalid("length overflow"))
    }

    fn f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.buf.get_f64_le())
    }

    fn f64s(&mut self, count: usize) -> Result<Vec<f64>> {
        self.ensure(count.checked_mul(8).ok_or_else(|| self.invalid("length overflow"))?)?;
        Ok((0..count).map(|_| self.buf.get_f64_le()).collect())
    }

    fn bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        self.ensure(count)?;
        let bytes = self.buf[..count].to_vec();
        self.buf.advance(count);
        Ok(bytes)
    }

    fn finish(&self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(self.invalid("trailing bytes"));
        }
        Ok(())
    }
}

impl Artifact for TfidfVectorizer {
    fn encode(&self) -> Result<Bytes> {
        let vocabulary = self.vocabulary().ok_or(Error::NotFitted)?;
        let config = self.config();
        let fst = vocabulary.fst_bytes();

        let mut buf = BytesMut::with_capacity(64 + vocabulary.len() * 8 + fst.len());
        buf.put_slice(VECTORIZER_MAGIC);
        buf.put_u16_le(FORMAT_VERSION);
        buf.put_u32_le(config.min_df);
        buf.put_f64_le(config.max_df);
        buf.put_u8(config.ngram_range.0 as u8);
        buf.put_u8(config.ngram_range.1 as u8);

        let mut flags = 0;
        if config.sublinear_tf {
            flags |= FLAG_SUBLINEAR_TF;
        }
        if config.stop_words {
            flags |= FLAG_STOP_WORDS;
        }
        buf.put_u8(flags);

        buf.put_u64_le(vocabulary.len() as u64);
        for &idf in vocabulary.idf() {
            buf.put_f64_le(idf);
        }
        buf.put_u64_le(fst.len() as u64);
        buf.put_slice(fst);

        Ok(buf.freeze())
    }

    fn decode(data: &[u8], path: &Path) -> Result<Self> {
        let mut reader = Reader { buf: data, path };
        reader.header(VECTORIZER_MAGIC)?;

        let min_df = reader.u32()?;
        let max_df = reader.f64()?;
        let ngram_range = (reader.u8()? as usize, reader.u8()? as usize);
        let flags = reader.u8()?;
        let config = VectorizerConfig {
            min_df,
            max_df,
            ngram_range,
            sublinear_tf: flags & FLAG_SUBLINEAR_TF != 0,
            stop_words: flags & FLAG_STOP_WORDS != 0,
        };
        config
            .validate()
            .map_err(|err| reader.invalid(err.to_string()))?;

        let count = reader.len()?;
        let idf = reader.f64s(count)?;
        let fst_len = reader.len()?;
        let fst = reader.bytes(fst_len)?;
        reader.finish()?;

        let terms = fst::Map::new(fst).map_err(|err| reader.invalid(err.to_string()))?;
        let vocabulary =
            Vocabulary::from_parts(terms, idf).map_err(|err| reader.invalid(err.to_string()))?;
        Ok(TfidfVectorizer::fitted(config, vocabulary))
    }
}

impl Artifact for LogisticRegression {
    fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(32 + self.n_features() * 8);
        buf.put_slice(CLASSIFIER_MAGIC);
        buf.put_u16_le(FORMAT_VERSION);
        buf.put_u64_le(self.n_features() as u64);
        for &weight in self.weights() {
            buf.put_f64_le(weight);
        }
        buf.put_f64_le(self.bias());
        Ok(buf.freeze())
    }

    fn decode(data: &[u8], path: &Path) -> Result<Self> {
        let mut reader = Reader { buf: data, path };
        reader.header(CLASSIFIER_MAGIC)?;
        let count = reader.len()?;
        let weights = reader.f64s(count)?;
        let bias = reader.f64()?;
        reader.finish()?;

        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(reader.invalid("non-finite model parameter"));
        }
        Ok(LogisticRegression::from_parameters(weights, bias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fitted_vectorizer() -> TfidfVectorizer {
        let mut vectorizer = TfidfVectorizer::new(VectorizerConfig {
            min_df: 1,
            max_df: 1.0,
            ..VectorizerConfig::default()
        });
        vectorizer
            .fit(&["claim your free prize", "agenda for the meeting"])
            .unwrap();
        vectorizer
    }

    #[test]
    fn test_vectorizer_persists_vocabulary_and_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(VECTORIZER_FILE);
        let vectorizer = fitted_vectorizer();
        vectorizer.save(&path).unwrap();

        let loaded = TfidfVectorizer::load(&path).unwrap();
        assert_eq!(loaded.config(), vectorizer.config());
        assert_eq!(
            loaded.vocabulary().unwrap().terms(),
            vectorizer.vocabulary().unwrap().terms()
        );
        assert_eq!(
            loaded.transform_one("free prize meeting").unwrap(),
            vectorizer.transform_one("free prize meeting").unwrap()
        );
    }

    #[test]
    fn test_unfitted_vectorizer_cannot_be_saved() {
        let dir = tempfile::tempdir().unwrap();
        let result = TfidfVectorizer::default().save(&dir.path().join(VECTORIZER_FILE));
        assert!(matches!(result, Err(Error::NotFitted)));
        assert!(!dir.path().join(VECTORIZER_FILE).exists());
    }

    #[test]
    fn test_classifier_persists_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CLASSIFIER_FILE);
        let model = LogisticRegression::from_parameters(vec![0.25, -1.5, 3.0], -0.75);
        model.save(&path).unwrap();

        assert_eq!(LogisticRegression::load(&path).unwrap(), model);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let result = LogisticRegression::load(&dir.path().join(CLASSIFIER_FILE));
        assert!(matches!(result, Err(Error::ArtifactMissing { .. })));
    }

    #[test]
    fn test_truncated_artifact_is_rejected() {
        let model = LogisticRegression::from_parameters(vec![1.0, 2.0], 0.5);
        let data = model.encode().unwrap();
        let result = LogisticRegression::decode(&data[..data.len() - 3], Path::new("x"));
        assert!(matches!(result, Err(Error::InvalidArtifact { .. })));

        let data = fitted_vectorizer().encode().unwrap();
        let result = TfidfVectorizer::decode(&data[..data.len() - 1], Path::new("x"));
        assert!(matches!(result, Err(Error::InvalidArtifact { .. })));
    }

    fn vectorizer_bytes(terms: &[(&str, u64)], idf: &[f64]) -> BytesMut {
        let fst = fst::Map::from_iter(terms.iter().copied())
            .unwrap()
            .into_fst()
            .into_inner();
        let mut buf = BytesMut::new();
        buf.put_slice(VECTORIZER_MAGIC);
        buf.put_u16_le(FORMAT_VERSION);
        buf.put_u32_le(1);
        buf.put_f64_le(1.0);
        buf.put_u8(1);
        buf.put_u8(2);
        buf.put_u8(FLAG_SUBLINEAR_TF | FLAG_STOP_WORDS);
        buf.put_u64_le(idf.len() as u64);
        for &weight in idf {
            buf.put_f64_le(weight);
        }
        buf.put_u64_le(fst.len() as u64);
        buf.put_slice(&fst);
        buf
    }

    #[test]
    fn test_vectorizer_with_out_of_range_term_is_rejected() {
        let valid = vectorizer_bytes(&[("alpha", 0), ("beta", 1)], &[1.0, 1.5]);
        let vectorizer = TfidfVectorizer::decode(&valid, Path::new("x")).unwrap();
        assert_eq!(vectorizer.vocabulary().unwrap().len(), 2);

        let corrupt = vectorizer_bytes(&[("alpha", 0), ("beta", 7)], &[1.0, 1.5]);
        let result = TfidfVectorizer::decode(&corrupt, Path::new("x"));
        assert!(matches!(result, Err(Error::InvalidArtifact { .. })));

        let corrupt = vectorizer_bytes(&[("alpha", 0), ("beta", 1)], &[1.0, f64::INFINITY]);
        let result = TfidfVectorizer::decode(&corrupt, Path::new("x"));
        assert!(matches!(result, Err(Error::InvalidArtifact { .. })));
    }

    #[test]
    fn test_foreign_file_is_rejected() {
        let data = LogisticRegression::from_parameters(vec![1.0], 0.0)
            .encode()
            .unwrap();
        let result = TfidfVectorizer::decode(&data, Path::new("x"));
        assert!(matches!(result, Err(Error::InvalidArtifact { .. })));
    }

    #[test]
    fn test_atomic_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
