use crate::error::{Result, SearchError};

pub struct Chromosome {
    pub name: String,
    // offset of the first base within the concatenated genome
    pub start: u64,
}

/// All chromosomes of a genome concatenated into one upper-cased buffer.
///
/// Chromosome starts are strictly increasing and the first one is 0, so every
/// locus in the buffer belongs to exactly one chromosome.
#[derive(Default)]
pub struct GenomeBuffer {
    data: Vec<u8>,
    chromosomes: Vec<Chromosome>,
}

impl GenomeBuffer {
    pub fn new() -> GenomeBuffer {
        GenomeBuffer::default()
    }
    /// Appends a chromosome. Empty sequences are skipped so starts stay strictly increasing.
    pub fn push_chromosome(&mut self, name: &str, seq: &[u8]) -> Result<()> {
        if name.is_empty() {
            return Err(SearchError::BadFileFormat(
                "> must be followed by chromosome name",
            ));
        }
        if seq.is_empty() {
            log::debug!("skipping empty chromosome {}", name);
            return Ok(());
        }
        self.chromosomes.push(Chromosome {
            name: name.to_string(),
            start: self.data.len() as u64,
        });
        self.data.extend(seq.iter().map(|c| c.to_ascii_uppercase()));
        Ok(())
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }
    /// Index of the chromosome holding `locus` and the offset within it.
    pub fn locate(&self, locus: u64) -> Option<(usize, u64)> {
        if locus >= self.data.len() as u64 {
            return None;
        }
        // last chromosome whose start is <= locus
        let idx = self.chromosomes.partition_point(|chr| chr.start <= locus) - 1;
        Some((idx, locus - self.chromosomes[idx].start))
    }
    /// One past the last base of chromosome `idx`.
    pub fn chromosome_end(&self, idx: usize) -> u64 {
        self.chromosomes
            .get(idx + 1)
            .map(|chr| chr.start)
            .unwrap_or(self.data.len() as u64)
    }
    /// Up to `len` bytes starting at `locus`, clipped to the end of the buffer.
    pub fn window(&self, locus: u64, len: usize) -> &[u8] {
        let start = std::cmp::min(locus as usize, self.data.len());
        let end = std::cmp::min(start + len, self.data.len());
        &self.data[start..end]
    }
}
