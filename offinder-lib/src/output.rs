use std::fmt;
use std::io::{BufWriter, Write};

use crate::bit4ops::{cmp_chars, reverse_complement_i};
use crate::device::{ComparerHit, Strand};
use crate::error::Result;
use crate::genome::GenomeBuffer;
use crate::pattern::Query;

/// One reported site. Written as soon as it is mapped, never kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult<'a> {
    pub query: &'a str,
    pub chromosome: &'a str,
    pub offset: u64,
    /// genome bases in query orientation, mismatching positions lower cased
    pub site: String,
    pub strand: Strand,
    pub mismatches: u16,
}

impl fmt::Display for MatchResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.query,
            self.chromosome,
            self.offset,
            self.site,
            self.strand.symbol(),
            self.mismatches
        )
    }
}

/// Lower cases every base of `site` the query symbol at the same position does
/// not allow. Positions under a query `N` are never counted, so never marked.
pub fn indicate_mismatches(site: &mut [u8], query: &[u8]) {
    for (dnac, rnac) in site.iter_mut().zip(query.iter()) {
        if *rnac != b'N' && !cmp_chars(*dnac, *rnac) {
            *dnac = dnac.to_ascii_lowercase();
        }
    }
}

/// Maps a comparer hit of a chunk starting at `chunk_start` back to genome
/// coordinates. Hits whose window runs past the end of their chromosome are
/// dropped, they only exist because chromosomes are concatenated.
pub fn map_hit<'a>(
    genome: &'a GenomeBuffer,
    query: &'a Query,
    chunk_start: u64,
    hit: &ComparerHit,
) -> Option<MatchResult<'a>> {
    if hit.mismatches > query.threshold {
        return None;
    }
    let pattern_len = query.sequence.len();
    let loci = chunk_start + hit.locus as u64;
    let (chr_idx, offset) = genome.locate(loci)?;
    if loci + pattern_len as u64 > genome.chromosome_end(chr_idx) {
        return None;
    }
    let mut site = genome.window(loci, pattern_len).to_vec();
    if hit.strand == Strand::Reverse {
        reverse_complement_i(&mut site);
    }
    indicate_mismatches(&mut site, query.sequence.as_bytes());
    Some(MatchResult {
        query: &query.sequence,
        chromosome: &genome.chromosomes()[chr_idx].name,
        offset,
        site: String::from_utf8_lossy(&site).into_owned(),
        strand: hit.strand,
        mismatches: hit.mismatches,
    })
}

/// Append-only, tab separated result sink.
pub struct MatchWriter<W: Write> {
    out: BufWriter<W>,
    lines: u64,
}

impl<W: Write> MatchWriter<W> {
    pub fn new(out: W) -> MatchWriter<W> {
        MatchWriter {
            out: BufWriter::new(out),
            lines: 0,
        }
    }
    pub fn write_match(&mut self, m: &MatchResult) -> Result<()> {
        writeln!(self.out, "{}", m)?;
        self.lines += 1;
        Ok(())
    }
    /// Maps and writes one device's batch of hits for one query, returns the number written.
    pub fn emit(
        &mut self,
        genome: &GenomeBuffer,
        query: &Query,
        chunk_start: u64,
        hits: &[ComparerHit],
    ) -> Result<u64> {
        let mut written = 0;
        for hit in hits.iter() {
            if let Some(m) = map_hit(genome, query, chunk_start, hit) {
                self.write_match(&m)?;
                written += 1;
            }
        }
        Ok(written)
    }
    pub fn lines_written(&self) -> u64 {
        self.lines
    }
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
    pub fn into_inner(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|err| crate::error::SearchError::IoError(err.into_error()))
    }
}
