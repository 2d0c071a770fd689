//! TF-IDF feature extraction over unigrams and bigrams.
//!
//! The fitted [`Vocabulary`] is an FST map from term to feature index, with
//! indices assigned in lexicographic term order, plus one smoothed IDF weight
//! per index.

use std::collections::{HashMap, HashSet};

use fst::Streamer;
use tracing::info;

use crate::error::{Error, Result};
use crate::stop_words::is_stop_word;

pub const DEFAULT_MIN_DF: u32 = 5;
pub const DEFAULT_MAX_DF: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorizerConfig {
    /// Minimum number of documents a term must appear in.
    pub min_df: u32,
    /// Maximum fraction of documents a term may appear in.
    pub max_df: f64,
    pub ngram_range: (usize, usize),
    pub sublinear_tf: bool,
    pub stop_words: bool,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            min_df: DEFAULT_MIN_DF,
            max_df: DEFAULT_MAX_DF,
            ngram_range: (1, 2),
            sublinear_tf: true,
            stop_words: true,
        }
    }
}

impl VectorizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_df == 0 {
            return Err(Error::Config("min_df must be at least 1".into()));
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(Error::Config(format!(
                "max_df must be in (0, 1], got {}",
                self.max_df
            )));
        }
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n || max_n > u8::MAX as usize {
            return Err(Error::Config(format!(
                "invalid ngram range ({min_n}, {max_n})"
            )));
        }
        Ok(())
    }
}

/// Lowercased word tokens of at least two characters.
pub fn tokenize(input: &str) -> Vec<String> {
    use unobtanium_segmenter::augmentation::AugmentationClassify;
    use unobtanium_segmenter::chain::{ChainAugmenter, ChainSegmenter, StartSegmentationChain};
    use unobtanium_segmenter::normalization::NormalizationLowercase;
    use unobtanium_segmenter::segmentation::{UnicodeSentenceSplitter, UnicodeWordSplitter};
    use unobtanium_segmenter::SegmentedTokenKind;

    input
        .start_segmentation_chain()
        .chain_owned_segmenter(UnicodeSentenceSplitter::new())
        .chain_owned_segmenter(UnicodeWordSplitter::new())
        .chain_owned_augmenter(AugmentationClassify::new())
        .chain_owned_augmenter(NormalizationLowercase::new())
        .filter(|token| token.kind == Some(SegmentedTokenKind::AlphaNumeric))
        .flat_map(|token| split_word_chars(&token.get_text_prefer_normalized_owned()))
        .filter(|token| token.chars().count() >= 2)
        .collect()
}

/// The word splitter keeps `.` and `'` inside words such as `login.com` or `don't`.
fn split_word_chars(word: &str) -> Vec<String> {
    word.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|piece| !piece.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Sparse feature vector with strictly increasing indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    indices: Vec<u32>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Build from `(index, value)` pairs in any order. Zero values are dropped.
    pub fn from_pairs(mut pairs: Vec<(u32, f64)>) -> Self {
        pairs.sort_unstable_by_key(|&(index, _)| index);
        let (indices, values) = pairs.into_iter().filter(|&(_, value)| value != 0.0).unzip();
        Self { indices, values }
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_zero(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices
            .iter()
            .zip(&self.values)
            .map(|(&index, &value)| (index as usize, value))
    }

    pub fn get(&self, index: usize) -> f64 {
        self.indices
            .binary_search(&(index as u32))
            .map(|pos| self.values[pos])
            .unwrap_or(0.0)
    }

    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Dot product with a dense weight vector. Indices beyond `dense` count as zero.
    pub fn dot(&self, dense: &[f64]) -> f64 {
        self.iter()
            .filter_map(|(index, value)| dense.get(index).map(|w| w * value))
            .sum()
    }

    fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            self.values.iter_mut().for_each(|v| *v /= norm);
        }
    }
}

/// Term to feature index mapping, fixed once fitted.
pub struct Vocabulary {
    terms: fst::Map<Vec<u8>>,
    idf: Vec<f64>,
}

impl std::fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vocabulary")
            .field("len", &self.idf.len())
            .finish()
    }
}

impl Vocabulary {
    pub(crate) fn from_parts(terms: fst::Map<Vec<u8>>, idf: Vec<f64>) -> Result<Self> {
        if terms.len() != idf.len() {
            return Err(Error::Config(format!(
                "vocabulary has {} terms but {} idf weights",
                terms.len(),
                idf.len()
            )));
        }
        let mut stream = terms.stream();
        while let Some((term, index)) = stream.next() {
            if index >= idf.len() as u64 {
                return Err(Error::Config(format!(
                    "term {:?} maps to index {index} outside {} idf weights",
                    String::from_utf8_lossy(term),
                    idf.len()
                )));
            }
        }
        if let Some(position) = idf.iter().position(|weight| !weight.is_finite()) {
            return Err(Error::Config(format!("idf weight {position} is not finite")));
        }
        Ok(Self { terms, idf })
    }

    pub fn len(&self) -> usize {
        self.idf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idf.is_empty()
    }

    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.terms.get(term).map(|index| index as usize)
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    pub fn terms(&self) -> Vec<String> {
        let mut terms = Vec::with_capacity(self.len());
        let mut stream = self.terms.stream();
        while let Some((key, _)) = stream.next() {
            terms.push(String::from_utf8_lossy(key).into_owned());
        }
        terms
    }

    pub(crate) fn fst_bytes(&self) -> &[u8] {
        self.terms.as_fst().as_bytes()
    }
}

/// TF-IDF vectorizer; [`fit`](Self::fit) exactly once, then transform.
#[derive(Debug)]
pub struct TfidfVectorizer {
    config: VectorizerConfig,
    vocabulary: Option<Vocabulary>,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::new(VectorizerConfig::default())
    }
}

impl TfidfVectorizer {
    pub fn new(config: VectorizerConfig) -> Self {
        Self {
            config,
            vocabulary: None,
        }
    }

    pub(crate) fn fitted(config: VectorizerConfig, vocabulary: Vocabulary) -> Self {
        Self {
            config,
            vocabulary: Some(vocabulary),
        }
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocabulary.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.vocabulary.is_some()
    }

    /// Tokens, stop words removed, expanded into the configured n-grams.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let tokens: Vec<String> = tokenize(text)
            .into_iter()
            .filter(|token| !(self.config.stop_words && is_stop_word(token)))
            .collect();

        let (min_n, max_n) = self.config.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n {
            if n == 1 {
                terms.extend(tokens.iter().cloned());
            } else {
                terms.extend(tokens.windows(n).map(|window| window.join(" ")));
            }
        }
        terms
    }

    /// Learn the vocabulary and IDF weights from `texts`.
    pub fn fit<S: AsRef<str>>(&mut self, texts: &[S]) -> Result<&Vocabulary> {
        if self.vocabulary.is_some() {
            return Err(Error::AlreadyFitted);
        }
        self.config.validate()?;
        if texts.is_empty() {
            return Err(Error::Config("cannot fit on an empty set of texts".into()));
        }

        let n_docs = texts.len();
        let max_doc_count = self.config.max_df * n_docs as f64;
        if max_doc_count < self.config.min_df as f64 {
            return Err(Error::Config(format!(
                "max_df {} corresponds to fewer documents than min_df {}",
                self.config.max_df, self.config.min_df
            )));
        }

        let mut doc_freq: HashMap<String, u32> = HashMap::new();
        for text in texts {
            let unique: HashSet<String> = self.analyze(text.as_ref()).into_iter().collect();
            for term in unique {
                *doc_freq.entry(term).or_default() += 1;
            }
        }
        let candidates = doc_freq.len();

        let mut retained: Vec<(String, u32)> = doc_freq
            .into_iter()
            .filter(|&(_, df)| df >= self.config.min_df && df as f64 <= max_doc_count)
            .collect();
        if retained.is_empty() {
            return Err(Error::EmptyVocabulary);
        }
        retained.sort_unstable_by(|(left, _), (right, _)| left.cmp(right));

        let idf = retained
            .iter()
            .map(|&(_, df)| ((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0)
            .collect();
        let terms = fst::Map::from_iter(
            retained
                .iter()
                .enumerate()
                .map(|(index, (term, _))| (term.as_str(), index as u64)),
        )?;

        info!(
            documents = n_docs,
            candidates,
            retained = retained.len(),
            "fitted vocabulary"
        );

        Ok(self.vocabulary.insert(Vocabulary::from_parts(terms, idf)?))
    }

    pub fn transform<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<FeatureVector>> {
        texts
            .iter()
            .map(|text| self.transform_one(text.as_ref()))
            .collect()
    }

    /// Terms outside the vocabulary contribute nothing.
    pub fn transform_one(&self, text: &str) -> Result<FeatureVector> {
        let vocabulary = self.vocabulary.as_ref().ok_or(Error::NotFitted)?;

        let mut counts: HashMap<u32, u32> = HashMap::new();
        for term in self.analyze(text) {
            if let Some(index) = vocabulary.index_of(&term) {
                *counts.entry(index as u32).or_default() += 1;
            }
        }

        let pairs = counts
            .into_iter()
            .map(|(index, count)| {
                let tf = if self.config.sublinear_tf {
                    1.0 + (count as f64).ln()
                } else {
                    count as f64
                };
                (index, tf * vocabulary.idf[index as usize])
            })
            .collect();

        let mut vector = FeatureVector::from_pairs(pairs);
        vector.normalize();
        Ok(vector)
    }

    pub fn fit_transform<S: AsRef<str>>(&mut self, texts: &[S]) -> Result<Vec<FeatureVector>> {
        self.fit(texts)?;
        self.transform(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn loose() -> VectorizerConfig {
        VectorizerConfig {
            min_df: 1,
            max_df: 1.0,
            ..VectorizerConfig::default()
        }
    }

    #[test]
    fn test_tokenization() {
        let tokens = tokenize("Hello world! This is a TEST message, a b.");

        println!("Tokens: {:?}", tokens);

        assert!(tokens.contains(&"hello".to_string()));
        assert!(tokens.contains(&"world".to_string()));
        assert!(tokens.contains(&"test".to_string()));
        assert!(tokens.contains(&"message".to_string()));
        assert!(!tokens.iter().any(|t| t == "a" || t == "b"));
        assert!(!tokens.iter().any(|t| t.contains('!') || t.contains(',')));
    }

    #[test]
    fn test_tokenization_splits_addresses_and_urls() {
        assert_eq!(
            tokenize("user@paypal-secure.com don't"),
            vec!["user", "paypal", "secure", "com", "don"]
        );

        let tokens = tokenize("Visit http://www.bank-login.com/verify?id=123");
        for term in ["www", "bank", "login", "com", "verify", "id", "123"] {
            assert!(tokens.contains(&term.to_string()), "missing {term} in {tokens:?}");
        }
        assert!(!tokens.iter().any(|t| t.contains('.') || t.contains('/')));

        assert_eq!(tokenize("pi is 3.14"), vec!["pi", "is", "14"]);
        assert_eq!(tokenize("snake_case"), vec!["snake_case"]);
    }

    #[test]
    fn test_vocabulary_rejects_out_of_range_terms() {
        let terms = fst::Map::from_iter([("alpha", 0u64), ("beta", 7)]).unwrap();
        let err = Vocabulary::from_parts(terms, vec![1.0, 1.5]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("beta"));

        let terms = fst::Map::from_iter([("alpha", 0u64), ("beta", 1)]).unwrap();
        let err = Vocabulary::from_parts(terms, vec![1.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let terms = fst::Map::from_iter([("alpha", 0u64), ("beta", 1)]).unwrap();
        assert_eq!(Vocabulary::from_parts(terms, vec![1.0, 1.5]).unwrap().len(), 2);
    }

    #[test]
    fn test_analyze_builds_bigrams_after_stop_words() {
        let vectorizer = TfidfVectorizer::new(loose());
        let terms = vectorizer.analyze("Claim the free prize");
        assert_eq!(
            terms,
            vec!["claim", "free", "prize", "claim free", "free prize"]
        );
    }

    #[test]
    fn test_transform_before_fit() {
        let vectorizer = TfidfVectorizer::default();
        assert!(matches!(
            vectorizer.transform(&["hello"]),
            Err(Error::NotFitted)
        ));
    }

    #[test]
    fn test_fit_twice_is_rejected() {
        let mut vectorizer = TfidfVectorizer::new(loose());
        vectorizer.fit(&["hello world"]).unwrap();
        assert!(matches!(
            vectorizer.fit(&["hello world"]),
            Err(Error::AlreadyFitted)
        ));
    }

    #[test]
    fn test_vocabulary_is_sorted() {
        let mut vectorizer = TfidfVectorizer::new(loose());
        let vocabulary = vectorizer.fit(&["zebra apple", "mango apple"]).unwrap();

        assert_eq!(
            vocabulary.terms(),
            vec!["apple", "mango", "mango apple", "zebra", "zebra apple"]
        );
        assert_eq!(vocabulary.index_of("apple"), Some(0));
        assert_eq!(vocabulary.index_of("zebra"), Some(3));
        assert_eq!(vocabulary.index_of("kiwi"), None);
    }

    #[test]
    fn test_document_frequency_pruning() {
        let texts = [
            "invoice attached invoice",
            "invoice meeting",
            "invoice lunch",
            "invoice report meeting",
        ];
        let mut vectorizer = TfidfVectorizer::new(VectorizerConfig {
            min_df: 2,
            max_df: 0.9,
            ..VectorizerConfig::default()
        });
        let vocabulary = vectorizer.fit(&texts).unwrap();

        // "invoice" appears everywhere, everything else but "meeting" is too rare.
        assert_eq!(vocabulary.terms(), vec!["meeting"]);
    }

    #[test]
    fn test_everything_pruned() {
        let mut vectorizer = TfidfVectorizer::new(VectorizerConfig {
            min_df: 3,
            max_df: 1.0,
            ..VectorizerConfig::default()
        });
        let result = vectorizer.fit(&["alpha", "beta", "gamma"]);
        assert!(matches!(result, Err(Error::EmptyVocabulary)));
    }

    #[test]
    fn test_max_df_below_min_df() {
        let mut vectorizer = TfidfVectorizer::default();
        let result = vectorizer.fit(&["alpha", "beta"]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_idf_and_sublinear_weights() {
        let mut vectorizer = TfidfVectorizer::new(VectorizerConfig {
            ngram_range: (1, 1),
            ..loose()
        });
        vectorizer.fit(&["offer offer offer prize", "prize meeting"]).unwrap();

        let vocabulary = vectorizer.vocabulary().unwrap();
        let offer = vocabulary.index_of("offer").unwrap();
        let prize = vocabulary.index_of("prize").unwrap();
        let idf_offer = (3.0f64 / 2.0).ln() + 1.0;
        let idf_prize = 1.0;
        assert!((vocabulary.idf()[offer] - idf_offer).abs() < 1e-12);
        assert!((vocabulary.idf()[prize] - idf_prize).abs() < 1e-12);

        let vector = vectorizer.transform_one("offer offer offer prize").unwrap();
        let raw_offer = (1.0 + 3.0f64.ln()) * idf_offer;
        let raw_prize = idf_prize;
        let norm = (raw_offer * raw_offer + raw_prize * raw_prize).sqrt();
        assert!((vector.get(offer) - raw_offer / norm).abs() < 1e-12);
        assert!((vector.get(prize) - raw_prize / norm).abs() < 1e-12);
    }

    #[test]
    fn test_vectors_are_unit_length() {
        let texts = [
            "Win a free cruise today",
            "Quarterly report is attached",
            "Free cruise tickets for the team report",
            "the of and",
        ];
        let mut vectorizer = TfidfVectorizer::new(loose());
        let vectors = vectorizer.fit_transform(&texts).unwrap();

        for vector in &vectors[..3] {
            assert!((vector.norm() - 1.0).abs() < 1e-6);
        }
        // Only stop words.
        assert!(vectors[3].is_zero());
        assert_eq!(vectors[3].norm(), 0.0);
    }

    #[test]
    fn test_unseen_terms_are_ignored() {
        let mut vectorizer = TfidfVectorizer::new(loose());
        vectorizer.fit(&["free money", "team meeting"]).unwrap();

        let vector = vectorizer.transform_one("completely novel vocabulary").unwrap();
        assert!(vector.is_zero());

        let vector = vectorizer.transform_one("free novel").unwrap();
        assert_eq!(vector.nnz(), 1);
    }

    #[test]
    fn test_feature_vector_dot() {
        let vector = FeatureVector::from_pairs(vec![(3, 2.0), (0, 1.0), (5, 0.0)]);
        assert_eq!(vector.nnz(), 2);
        assert_eq!(vector.dot(&[1.0, 0.0, 0.0, 0.5]), 2.0);
        assert_eq!(vector.get(5), 0.0);
    }
}
