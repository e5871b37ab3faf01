//! IUPAC pattern encoding shared by the finder and comparer kernels.
//!
//! A pattern of length `L` is uploaded to a device as `2L` bytes, the
//! forward strand followed by its reverse complement, together with a
//! table of "significant" positions for each half. Positions holding `N`
//! match every base and are left out of the table so the kernels can skip
//! them.

use crate::bit4ops::{is_mixedbase_str, reverse_complement};
use crate::error::{Result, SearchError};

/// Terminates the significant position list of a half when it is shorter than the pattern.
pub const SIGNIFICANT_END: i32 = -1;

/// Device upload form of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPattern {
    /// forward bytes in `[0, L)`, reverse complement in `[L, 2L)`
    pub bytes: Vec<u8>,
    /// significant positions of each half, relative to the start of that half
    pub significant: Vec<i32>,
}

impl EncodedPattern {
    pub fn len(&self) -> usize {
        self.bytes.len() / 2
    }
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
    pub fn forward(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }
    pub fn reverse(&self) -> &[u8] {
        &self.bytes[self.len()..]
    }
    pub fn forward_significant(&self) -> &[i32] {
        &self.significant[..self.len()]
    }
    pub fn reverse_significant(&self) -> &[i32] {
        &self.significant[self.len()..]
    }
}

/// Ordered positions of every non-`N` symbol, followed by [`SIGNIFICANT_END`]
/// if any position was skipped.
pub fn significant_positions(seq: &[u8]) -> Vec<i32> {
    let mut positions: Vec<i32> = seq
        .iter()
        .enumerate()
        .filter(|(_, c)| **c != b'N')
        .map(|(i, _)| i as i32)
        .collect();
    if positions.len() != seq.len() {
        positions.push(SIGNIFICANT_END);
    }
    positions
}

fn padded_positions(seq: &[u8]) -> Vec<i32> {
    let mut positions = significant_positions(seq);
    positions.resize(seq.len(), SIGNIFICANT_END);
    positions
}

pub fn encode(pattern: &[u8]) -> EncodedPattern {
    let reversed = reverse_complement(pattern);
    let mut bytes = Vec::with_capacity(pattern.len() * 2);
    bytes.extend_from_slice(pattern);
    bytes.extend_from_slice(&reversed);
    let mut significant = padded_positions(pattern);
    significant.extend(padded_positions(&reversed));
    EncodedPattern { bytes, significant }
}

/// A query sequence with its own mismatch budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub sequence: String,
    pub threshold: u16,
}

impl Query {
    pub fn new(sequence: &str, threshold: u16) -> Query {
        Query {
            sequence: sequence.to_ascii_uppercase(),
            threshold,
        }
    }
    pub fn encode(&self) -> EncodedPattern {
        encode(self.sequence.as_bytes())
    }
}

/// Everything a run searches for: the header pattern used by the finder and
/// the queries scored by the comparer.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub pattern: String,
    pub queries: Vec<Query>,
}

impl SearchConfig {
    pub fn new(pattern: &str, queries: Vec<Query>) -> Result<SearchConfig> {
        let config = SearchConfig {
            pattern: pattern.to_ascii_uppercase(),
            queries,
        };
        config.validate()?;
        Ok(config)
    }
    pub fn pattern_len(&self) -> usize {
        self.pattern.len()
    }
    pub fn validate(&self) -> Result<()> {
        if self.pattern.is_empty() {
            return Err(SearchError::argument("Search pattern must not be empty"));
        }
        if !is_mixedbase_str(self.pattern.as_bytes()) {
            return Err(SearchError::argument(
                "Pattern in input file needs to be a mixed base string",
            ));
        }
        if self.queries.is_empty() {
            return Err(SearchError::argument(
                "Input file must contain at least 1 pattern line",
            ));
        }
        for query in self.queries.iter() {
            if query.sequence.len() != self.pattern.len() {
                return Err(SearchError::argument(format!(
                    "Query {} has length {}, all queries must match the pattern length {}",
                    query.sequence,
                    query.sequence.len(),
                    self.pattern.len()
                )));
            }
            if !is_mixedbase_str(query.sequence.as_bytes()) {
                return Err(SearchError::argument(format!(
                    "Query {} is not a mixed base string",
                    query.sequence
                )));
            }
        }
        Ok(())
    }
}
