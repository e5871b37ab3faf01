use crate::error::{Result, SearchError};
use crate::genome::GenomeBuffer;
use crate::read_2bit::read_2bit;
use std::fs::{read_dir, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const READ_BUF_CAPACITY: usize = 1 << 18;

const FASTA_EXTENSIONS: [&str; 4] = ["fa", "fasta", "fna", "fas"];

fn chrom_name(header: &str) -> &str {
    header[1..].split_ascii_whitespace().next().unwrap_or("")
}

pub fn read_fasta_from<R: BufRead>(genome: &mut GenomeBuffer, reader: R) -> Result<()> {
    let mut name: Option<String> = None;
    let mut seq: Vec<u8> = Vec::new();
    for linerd in reader.lines() {
        let line = linerd?;
        let line = line.trim_end();
        if line.starts_with('>') {
            if let Some(prev) = name.take() {
                genome.push_chromosome(&prev, &seq)?;
                seq.clear();
            }
            name = Some(chrom_name(line).to_string());
        } else if name.is_none() {
            if line.is_empty() {
                continue;
            }
            //catch this error to skip invalid files
            return Err(SearchError::BadFileFormat("fasta file needs to start with >"));
        } else {
            seq.extend_from_slice(line.as_bytes());
        }
    }
    if let Some(prev) = name {
        genome.push_chromosome(&prev, &seq)?;
    }
    Ok(())
}

pub fn read_fasta(genome: &mut GenomeBuffer, fname: &Path) -> Result<()> {
    let file = File::open(fname)?;
    read_fasta_from(genome, BufReader::with_capacity(READ_BUF_CAPACITY, file))
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn is_genome_file(path: &Path) -> bool {
    let ext = extension(path);
    ext == "2bit" || FASTA_EXTENSIONS.contains(&ext.as_str())
}

fn read_genome_file(genome: &mut GenomeBuffer, path: &Path) -> Result<()> {
    if extension(path) == "2bit" {
        read_2bit(genome, path)
    } else {
        read_fasta(genome, path)
    }
}

/// Reads every FASTA and .2bit file of `folder`, in file name order.
pub fn read_fasta_folder(genome: &mut GenomeBuffer, folder: &Path) -> Result<()> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in read_dir(folder)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    for path in paths.iter() {
        if is_genome_file(path) {
            log::info!("Reading {}...", path.display());
            read_genome_file(genome, path)?;
        } else {
            log::warn!("Skipping {}, not a FASTA or .2bit file", path.display());
        }
    }
    Ok(())
}

/// Loads a genome from a folder of sequence files, a FASTA file or a .2bit file.
pub fn load_genome(path: &Path) -> Result<GenomeBuffer> {
    let mut genome = GenomeBuffer::new();
    if path.is_dir() {
        read_fasta_folder(&mut genome, path)?;
    } else {
        // anything that is not .2bit is read as fasta
        read_genome_file(&mut genome, path)?;
    }
    if genome.is_empty() {
        return Err(SearchError::BadFileFormat("no chromosome sequences found"));
    }
    log::info!(
        "Loaded {} chromosome(s), {} bases",
        genome.chromosomes().len(),
        genome.len()
    );
    Ok(genome)
}
