//! Content-based review deduplication
//!
//! Identity is derived from what a review says, not from its `id`: the first
//! 100 characters of the content, the author and the date, lower-cased with
//! all whitespace removed. Keys are hashed into a set so membership is O(1).

use std::collections::HashSet;

use crate::types::ReviewRecord;

/// Characters of content that participate in the identity key
pub const CONTENT_KEY_CHARS: usize = 100;

/// Joins key parts; control characters are stripped from the parts
const KEY_SEPARATOR: &str = "\u{1f}";

/// Lower-case with whitespace and control characters removed
fn fold(part: &str) -> String {
    part.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect()
}

/// Review deduplicator; the first record seen under a key wins
#[derive(Debug, Default)]
pub struct Deduplicator {
    /// Hashes of identity keys already accepted
    seen: HashSet<u64>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size for an expected number of records
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Identity key for a record
    pub fn identity_key(record: &ReviewRecord) -> String {
        let content: String = record
            .content
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(CONTENT_KEY_CHARS)
            .collect();
        let author = record.author.as_deref().unwrap_or_default();
        let date = record
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        [content.as_str(), author, date.as_str()]
            .iter()
            .map(|part| fold(part))
            .collect::<Vec<_>>()
            .join(KEY_SEPARATOR)
    }

    /// Record the key; returns true the first time it is seen
    pub fn is_new(&mut self, record: &ReviewRecord) -> bool {
        let hash = crate::util::fast_hash(&Self::identity_key(record));
        self.seen.insert(hash)
    }

    /// Number of distinct keys seen
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Drop duplicates, keeping first-seen order
    pub fn dedup(records: Vec<ReviewRecord>) -> Vec<ReviewRecord> {
        let mut dedup = Self::with_capacity(records.len());
        let before = records.len();
        let kept: Vec<ReviewRecord> = records.into_iter().filter(|r| dedup.is_new(r)).collect();
        if kept.len() < before {
            tracing::debug!("Removed {} duplicate reviews", before - kept.len());
        }
        kept
    }
}
