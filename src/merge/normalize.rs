//! Title normalization and fuzzy similarity.
//!
//! Normalization is what lets "Dan Da Dan", "Dandadan" and "DAN-DA-DAN!"
//! land on the same key while keeping season markers intact, so distinct
//! seasons of one franchise still compare as different strings.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Default localized synonyms: season words fold to `season`, split-cour
/// words fold to `part`.
pub const DEFAULT_SYNONYMS: &[(&str, &str)] = &[
    ("staffel", "season"),
    ("saison", "season"),
    ("temporada", "season"),
    ("stagione", "season"),
    ("sezon", "season"),
    ("seizoen", "season"),
    ("kisetsu", "season"),
    ("cour", "part"),
    ("teil", "part"),
    ("partie", "part"),
    ("parte", "part"),
];

static DEFAULT_NORMALIZER: LazyLock<Normalizer> = LazyLock::new(Normalizer::default);

/// Normalize with the default synonym table.
pub fn normalize(title: &str) -> NormalizedKey {
    DEFAULT_NORMALIZER.normalize(title)
}

/// Symmetric edit-distance similarity of two keys, in `[0, 100]`.
pub fn similarity(a: &NormalizedKey, b: &NormalizedKey) -> f64 {
    strsim::normalized_levenshtein(a.as_str(), b.as_str()) * 100.0
}

/// Canonical comparison form of a display title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Maximal runs of ASCII digits, in order ("season2part1" -> ["2", "1"]).
    pub fn digit_runs(&self) -> Vec<&str> {
        self.0
            .split(|c: char| !c.is_ascii_digit())
            .filter(|run| !run.is_empty())
            .collect()
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Invalid synonym table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynonymError {
    #[error("synonym key {0:?} is empty after normalization")]
    EmptyKey(String),

    #[error("synonym key {0:?} must be a single word")]
    MultiWordKey(String),

    #[error("synonym value {value:?} (for {key:?}) is itself a synonym key")]
    ChainedValue { key: String, value: String },
}

/// Word-level folding table for localized vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymTable {
    words: HashMap<String, String>,
}

impl SynonymTable {
    /// Build a table; keys and values are normalized first.
    ///
    /// A value that is also a key is rejected: folding must reach a fixed
    /// point in one step or normalization stops being idempotent.
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Result<Self, SynonymError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut words = HashMap::new();
        for (key, value) in entries {
            let raw_key = key.as_ref();
            let tokens = tokens(raw_key);
            let folded_key = match tokens.as_slice() {
                [] => return Err(SynonymError::EmptyKey(raw_key.to_string())),
                [single] => single.clone(),
                _ => return Err(SynonymError::MultiWordKey(raw_key.to_string())),
            };
            words.insert(folded_key, tokens_joined(value.as_ref()));
        }

        for (key, value) in &words {
            if words.contains_key(value) {
                return Err(SynonymError::ChainedValue {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }

        Ok(Self { words })
    }

    /// A table that folds nothing.
    pub fn empty() -> Self {
        Self {
            words: HashMap::new(),
        }
    }

    fn fold<'a>(&'a self, word: &'a str) -> &'a str {
        self.words.get(word).map(String::as_str).unwrap_or(word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        // The built-in table is statically well-formed.
        let words = DEFAULT_SYNONYMS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { words }
    }
}

/// Title normalizer parameterized by a synonym table.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    synonyms: SynonymTable,
}

impl Normalizer {
    pub fn new(synonyms: SynonymTable) -> Self {
        Self { synonyms }
    }

    /// Normalize a title. Total and deterministic.
    pub fn normalize(&self, title: &str) -> NormalizedKey {
        let mut key: String = tokens(title)
            .iter()
            .map(|word| self.synonyms.fold(word))
            .collect();

        // A previously normalized key is a single word on re-entry; fold it
        // here as well so the second pass has nothing left to do.
        if let Some(folded) = self.synonyms.words.get(&key) {
            key = folded.clone();
        }

        NormalizedKey(key)
    }
}

/// Lower-case, strip diacritics, split on anything non-alphanumeric.
fn tokens(text: &str) -> Vec<String> {
    let stripped: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    stripped.split_whitespace().map(str::to_string).collect()
}

fn tokens_joined(text: &str) -> String {
    tokens(text).concat()
}
