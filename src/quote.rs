// 📜 Quote Model - the atomic record and the ordered, text-unique RecordSet
//
// Identity is the exact `text` value (case-sensitive). Everything else
// (category, id, origin) is a value hanging off that identity.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;

// ============================================================================
// ORIGIN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Authored on this device (typed in, imported from a file)
    Local,

    /// Sourced from the remote endpoint
    Remote,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Local => "Local",
            Origin::Remote => "Remote",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Local" => Some(Origin::Local),
            "Remote" => Some(Origin::Remote),
            _ => None,
        }
    }
}

// ============================================================================
// MALFORMED RECORDS
// ============================================================================

/// A record that cannot become a Quote. Rejected at ingestion, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecordError {
    #[error("quote text is empty")]
    EmptyText,

    #[error("quote {text:?} has an empty category")]
    EmptyCategory { text: String },
}

// ============================================================================
// QUOTE
// ============================================================================

/// Loose wire/file shape of a quote, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

/// Validated quote. Fields are private so `origin` cannot be rewritten
/// after ingestion and `text`/`category` are never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuoteRecord", into = "QuoteRecord")]
pub struct Quote {
    text: String,
    category: String,
    origin: Origin,
    id: Option<i64>,
}

impl Quote {
    pub fn local(text: &str, category: &str) -> Result<Self, MalformedRecordError> {
        Self::build(text, category, Origin::Local, None)
    }

    pub fn remote(text: &str, category: &str, id: Option<i64>) -> Result<Self, MalformedRecordError> {
        Self::build(text, category, Origin::Remote, id)
    }

    /// Validate and assemble a quote. `text` is kept byte-exact; only the
    /// emptiness check looks at the trimmed value.
    pub(crate) fn build(
        text: &str,
        category: &str,
        origin: Origin,
        id: Option<i64>,
    ) -> Result<Self, MalformedRecordError> {
        if text.trim().is_empty() {
            return Err(MalformedRecordError::EmptyText);
        }

        let category = category.trim();
        if category.is_empty() {
            return Err(MalformedRecordError::EmptyCategory {
                text: text.to_string(),
            });
        }

        Ok(Quote {
            text: text.to_string(),
            category: category.to_string(),
            origin,
            id,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// True when any non-key field (category, id, origin) differs.
    pub fn differs_from(&self, other: &Quote) -> bool {
        self.category != other.category || self.id != other.id || self.origin != other.origin
    }
}

impl TryFrom<QuoteRecord> for Quote {
    type Error = MalformedRecordError;

    fn try_from(record: QuoteRecord) -> Result<Self, Self::Error> {
        Quote::build(
            &record.text,
            &record.category,
            record.origin.unwrap_or(Origin::Local),
            record.id,
        )
    }
}

impl From<Quote> for QuoteRecord {
    fn from(quote: Quote) -> Self {
        QuoteRecord {
            text: quote.text,
            category: quote.category,
            id: quote.id,
            origin: Some(quote.origin),
        }
    }
}

// ============================================================================
// RECORD SET
// ============================================================================

/// Insertion-ordered collection of quotes, unique by `text`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Quote>", into = "Vec<Quote>")]
pub struct RecordSet {
    quotes: Vec<Quote>,
}

impl RecordSet {
    pub fn new() -> Self {
        RecordSet { quotes: Vec::new() }
    }

    /// Build a set keeping the first occurrence of each text.
    pub fn from_quotes<I: IntoIterator<Item = Quote>>(quotes: I) -> Self {
        let mut seen = HashSet::new();
        let quotes = quotes
            .into_iter()
            .filter(|q| seen.insert(q.text.clone()))
            .collect();

        RecordSet { quotes }
    }

    /// Append a quote. Returns false (and leaves the set unchanged) when
    /// the text is already present.
    pub fn insert(&mut self, quote: Quote) -> bool {
        if self.contains(&quote.text) {
            return false;
        }
        self.quotes.push(quote);
        true
    }

    pub fn get(&self, text: &str) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.text == text)
    }

    pub fn contains(&self, text: &str) -> bool {
        self.get(text).is_some()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Quote> {
        self.quotes.iter()
    }

    pub fn as_slice(&self) -> &[Quote] {
        &self.quotes
    }

    pub fn into_vec(self) -> Vec<Quote> {
        self.quotes
    }

    /// Distinct categories in first-seen order
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.quotes
            .iter()
            .map(|q| q.category.as_str())
            .filter(|c| seen.insert(*c))
            .collect()
    }

    /// `None` or `"all"` selects every quote
    pub fn filter_by_category(&self, category: Option<&str>) -> Vec<&Quote> {
        match category {
            None | Some("all") => self.quotes.iter().collect(),
            Some(category) => self
                .quotes
                .iter()
                .filter(|q| q.category == category)
                .collect(),
        }
    }

    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Quote> {
        self.quotes.choose(rng)
    }

    pub fn random_in_category<R: Rng + ?Sized>(
        &self,
        category: Option<&str>,
        rng: &mut R,
    ) -> Option<&Quote> {
        self.filter_by_category(category).choose(rng).copied()
    }

    /// SHA-256 over every field of every quote, in order
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for quote in &self.quotes {
            hasher.update(quote.text.as_bytes());
            hasher.update([0u8]);
            hasher.update(quote.category.as_bytes());
            hasher.update([0u8]);
            hasher.update(quote.origin.as_str().as_bytes());
            hasher.update([0u8]);
            if let Some(id) = quote.id {
                hasher.update(id.to_string().as_bytes());
            }
            hasher.update([b'\n']);
        }
        format!("{:x}", hasher.finalize())
    }
}

impl From<Vec<Quote>> for RecordSet {
    fn from(quotes: Vec<Quote>) -> Self {
        RecordSet::from_quotes(quotes)
    }
}

impl From<RecordSet> for Vec<Quote> {
    fn from(set: RecordSet) -> Self {
        set.quotes
    }
}

impl FromIterator<Quote> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Quote>>(iter: I) -> Self {
        RecordSet::from_quotes(iter)
    }
}

impl IntoIterator for RecordSet {
    type Item = Quote;
    type IntoIter = std::vec::IntoIter<Quote>;

    fn into_iter(self) -> Self::IntoIter {
        self.quotes.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Quote;
    type IntoIter = std::slice::Iter<'a, Quote>;

    fn into_iter(self) -> Self::IntoIter {
        self.quotes.iter()
    }
}

// ============================================================================
// INGESTION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    /// Position of the record in the raw input
    pub index: usize,
    pub error: MalformedRecordError,
}

#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub quotes: RecordSet,
    pub rejected: Vec<Rejected>,
    pub duplicates: usize,
}

/// Validate raw records and tag them with `origin`.
///
/// Malformed records are dropped and reported; repeated texts keep the
/// first occurrence.
pub fn ingest<I>(records: I, origin: Origin) -> Ingested
where
    I: IntoIterator<Item = QuoteRecord>,
{
    let mut ingested = Ingested::default();

    for (index, record) in records.into_iter().enumerate() {
        match Quote::build(&record.text, &record.category, origin, record.id) {
            Ok(quote) => {
                if !ingested.quotes.insert(quote) {
                    ingested.duplicates += 1;
                }
            }
            Err(error) => ingested.rejected.push(Rejected { index, error }),
        }
    }

    ingested
}

// ============================================================================
// TESTS
// ============================================================================
