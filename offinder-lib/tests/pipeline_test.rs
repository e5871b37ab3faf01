use offinder_lib::*;
use std::collections::HashSet;
use std::fs;
use std::fs::OpenOptions;
use std::path::Path;

fn write_fasta(dir: &Path, fname: &str, records: &[(&str, &str)]) {
    let mut text = String::new();
    for (name, seq) in records {
        text.push_str(&format!(">{}\n", name));
        // wrap like real fasta files
        for line in seq.as_bytes().chunks(60) {
            text.push_str(std::str::from_utf8(line).unwrap());
            text.push('\n');
        }
    }
    fs::write(dir.join(fname), text).unwrap();
}

fn random_bases(seed: u64, len: usize) -> String {
    let mut x = seed;
    (0..len)
        .map(|_| {
            x = x
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            b"ACGT"[((x >> 33) % 4) as usize] as char
        })
        .collect()
}

fn run_to_string<D: ComputeDevice>(
    pool: DevicePool<D>,
    genome: &GenomeBuffer,
    config: &SearchConfig,
) -> String {
    let mut writer = MatchWriter::new(Vec::new());
    search(pool, genome, config, &mut writer).unwrap();
    String::from_utf8(writer.into_inner().unwrap()).unwrap()
}

fn sorted_lines(out: &str) -> Vec<String> {
    let mut lines: Vec<String> = out.lines().map(String::from).collect();
    lines.sort();
    lines
}

#[test]
fn test_no_candidates_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_fasta(dir.path(), "chrT.fa", &[("chrT", "ACGTACGTNNACGT")]);
    let genome = load_genome(dir.path()).unwrap();
    let config = SearchConfig::new("NNNNRG", vec![Query::new("GGCCRG", 1)]).unwrap();

    let out_path = dir.path().join("out.txt");
    let out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&out_path)
        .unwrap();
    let mut writer = MatchWriter::new(out);
    let summary = search(
        DevicePool::host(1, DEFAULT_HOST_MAX_ALLOC).unwrap(),
        &genome,
        &config,
        &mut writer,
    )
    .unwrap();
    drop(writer);
    assert_eq!(summary.matches, 0);
    assert_eq!(fs::read_to_string(&out_path).unwrap(), "");
}

#[test]
fn test_genome_n_under_query_n_stays_upper_case() {
    let dir = tempfile::tempdir().unwrap();
    write_fasta(dir.path(), "chr1.fa", &[("chr1", "GGCCNNAAAA")]);
    let genome = load_genome(dir.path()).unwrap();
    let config = SearchConfig::new("NNNNNN", vec![Query::new("GGCCNN", 0)]).unwrap();
    let out = run_to_string(
        DevicePool::host(1, DEFAULT_HOST_MAX_ALLOC).unwrap(),
        &genome,
        &config,
    );
    assert_eq!(out, "GGCCNN\tchr1\t0\tGGCCNN\t+\t0\n");
}

#[test]
fn test_folder_search_appends() {
    let dir = tempfile::tempdir().unwrap();
    let genome_dir = dir.path().join("genome");
    fs::create_dir(&genome_dir).unwrap();
    write_fasta(&genome_dir, "a.fa", &[("chr1", "TTGGCCAGTT")]);
    write_fasta(&genome_dir, "b.fasta", &[("chr2", "AACTGGCCAA")]);
    fs::write(genome_dir.join("notes.txt"), "not a genome").unwrap();
    let genome = load_genome(&genome_dir).unwrap();
    let config = SearchConfig::new("NNNNRG", vec![Query::new("GGCCRG", 0)]).unwrap();

    let out_path = dir.path().join("out.txt");
    for _ in 0..2 {
        let out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&out_path)
            .unwrap();
        let mut writer = MatchWriter::new(out);
        let pool = DevicePool::host(2, DEFAULT_HOST_MAX_ALLOC).unwrap();
        search(pool, &genome, &config, &mut writer).unwrap();
    }
    let expected = "GGCCRG\tchr1\t2\tGGCCAG\t+\t0\nGGCCRG\tchr2\t2\tGGCCAG\t-\t0\n";
    assert_eq!(
        fs::read_to_string(&out_path).unwrap(),
        format!("{}{}", expected, expected)
    );
}

#[test]
fn test_results_within_threshold_and_unique() {
    let dir = tempfile::tempdir().unwrap();
    let (chr1, chr2, chr3) = (random_bases(1, 400), random_bases(2, 257), random_bases(3, 1000));
    write_fasta(
        dir.path(),
        "genome.fa",
        &[
            ("chr1", chr1.as_str()),
            ("chr2", chr2.as_str()),
            ("chr3", chr3.as_str()),
        ],
    );
    let genome = load_genome(&dir.path().join("genome.fa")).unwrap();
    let config = SearchConfig::new(
        "NNNNNNNRG",
        vec![Query::new("ACGTACNNN", 3), Query::new("TTGACANGG", 3)],
    )
    .unwrap();
    let out = run_to_string(DevicePool::host(1, DEFAULT_HOST_MAX_ALLOC).unwrap(), &genome, &config);
    assert!(!out.is_empty());

    let mut seen = HashSet::new();
    for line in out.lines() {
        let cols: Vec<&str> = line.split('\t').collect();
        assert_eq!(cols.len(), 6);
        let query = config.queries.iter().find(|q| q.sequence == cols[0]).unwrap();
        let mismatches: u16 = cols[5].parse().unwrap();
        assert!(mismatches <= query.threshold);
        // the genome has no N, so every lower cased base is a counted mismatch
        let lower = cols[3].bytes().filter(|c| c.is_ascii_lowercase()).count();
        assert_eq!(lower, mismatches as usize);
        assert!(seen.insert((cols[0], cols[1], cols[2], cols[4])));
    }
}

#[test]
fn test_device_split_does_not_change_results() {
    let chr1 = random_bases(11, 700);
    let chr2 = random_bases(12, 333);
    let mut genome = GenomeBuffer::new();
    genome.push_chromosome("chr1", chr1.as_bytes()).unwrap();
    genome.push_chromosome("chr2", chr2.as_bytes()).unwrap();
    let config = SearchConfig::new(
        "NNNNNNNRG",
        vec![Query::new("ACGTACNNN", 3), Query::new("GGATCCNNN", 2)],
    )
    .unwrap();
    let pattern_len = config.pattern_len();

    let reference = run_to_string(DevicePool::host(1, DEFAULT_HOST_MAX_ALLOC).unwrap(), &genome, &config);
    let expected = sorted_lines(&reference);
    assert!(!expected.is_empty());

    // small ceilings force many rounds over several devices
    for (n_devices, dice) in [(1, 64), (2, 50), (3, 17), (4, 1)] {
        let ceiling = fixed_overhead(pattern_len) + dice * PER_LOCUS_OVERHEAD;
        let pool = DevicePool::host(n_devices, ceiling).unwrap();
        let out = run_to_string(pool, &genome, &config);
        assert_eq!(sorted_lines(&out), expected, "{} devices, dice {}", n_devices, dice);
    }
}

#[test]
fn test_too_small_device_is_fatal() {
    let mut genome = GenomeBuffer::new();
    genome.push_chromosome("chr1", b"ACGTACGTAC").unwrap();
    let config = SearchConfig::new("NNNRG", vec![Query::new("ACGTA", 1)]).unwrap();
    let pool = DevicePool::host(1, 8).unwrap();
    let mut writer = MatchWriter::new(Vec::new());
    let res = search(pool, &genome, &config, &mut writer);
    assert!(matches!(
        res,
        Err(SearchError::InsufficientDeviceMemory { .. })
    ));
}
