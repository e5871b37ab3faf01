use offinder_lib::*;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};

/// Everything the input file describes.
pub struct SearchRunInfo {
    pub genome_path: String,
    pub config: SearchConfig,
}

/// Device class and optional device indices, e.g. `G` or `G0,2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceArg {
    pub class: DeviceClass,
    pub ids: Vec<usize>,
}

pub fn parse_device_arg(arg: &str) -> Result<DeviceArg> {
    let dev_parse_err = || SearchError::argument("2nd argument must be one of {C|G|A}[device_id(s)]");
    let mut chars = arg.chars();
    let class = match chars.next() {
        Some('C') => DeviceClass::Cpu,
        Some('G') => DeviceClass::Gpu,
        Some('A') => DeviceClass::Accelerator,
        _ => return Err(dev_parse_err()),
    };
    let rest = chars.as_str();
    let mut ids = Vec::new();
    if !rest.is_empty() {
        for part in rest.split(',') {
            let id = part.trim().parse::<usize>().map_err(|_| dev_parse_err())?;
            ids.push(id);
        }
    }
    Ok(DeviceArg { class, ids })
}

/// Reads the input file format:
///
/// ```text
/// <genome path>
/// <header pattern>
/// <query> <threshold>
/// ...
/// ```
///
/// Query lines end at the first blank line or EOF.
pub fn parse_input<R: BufRead>(reader: R) -> Result<SearchRunInfo> {
    let file_too_short_err = || SearchError::argument("Input file must contain at least 3 lines");
    let mut line_iter = reader.lines();
    let genome_path = line_iter.next().ok_or_else(file_too_short_err)??;
    let genome_path = genome_path.trim().to_string();
    let pattern = line_iter.next().ok_or_else(file_too_short_err)??;
    let pattern = pattern.trim().to_ascii_uppercase();
    if !is_mixedbase_str(pattern.as_bytes()) {
        return Err(SearchError::argument(
            "Pattern in input file needs to be a mixed base string",
        ));
    }

    let mut queries: Vec<Query> = Vec::new();
    for line_r in line_iter {
        let line = line_r?;
        let lineparts: Vec<&str> = line.split_ascii_whitespace().collect();
        if lineparts.is_empty() {
            break;
        }
        if lineparts.len() < 2 {
            return Err(SearchError::argument(
                "Pattern line must have following elements: <pattern> <mismatches>",
            ));
        }
        let threshold = lineparts[1].parse::<u16>().map_err(|_| {
            SearchError::argument(
                "2nd element of each pattern line must be an unsigned integer (mismatches)",
            )
        })?;
        queries.push(Query::new(lineparts[0], threshold));
    }
    if queries.is_empty() {
        return Err(file_too_short_err());
    }
    let config = SearchConfig::new(&pattern, queries)?;
    Ok(SearchRunInfo {
        genome_path,
        config,
    })
}

pub fn read_input(in_path: &str) -> Result<SearchRunInfo> {
    let file = if in_path != "-" {
        Box::new(File::open(in_path)?) as Box<dyn Read>
    } else {
        Box::new(std::io::stdin()) as Box<dyn Read>
    };
    parse_input(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    // Note this useful idiom: importing names from outer (for mod tests) scope.
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_device_arg() {
        assert_eq!(
            parse_device_arg("G").unwrap(),
            DeviceArg {
                class: DeviceClass::Gpu,
                ids: vec![]
            }
        );
        assert_eq!(parse_device_arg("C0,2").unwrap().ids, vec![0, 2]);
        assert_eq!(parse_device_arg("A1").unwrap().class, DeviceClass::Accelerator);
        assert!(parse_device_arg("X").is_err());
        assert!(parse_device_arg("").is_err());
        assert!(parse_device_arg("G0,x").is_err());
    }
    #[test]
    fn test_parse_input() {
        let text = "/var/chromosomes/hg19\nNNNNNNNNNNNNNNNNNNNNNrg\nGGCCGACCTGTCGCTGACGCNNN 5\ncgccagcgtcagcgacaggtNNN 4 extra\n\nACGT 1\n";
        let info = parse_input(Cursor::new(text)).unwrap();
        assert_eq!(info.genome_path, "/var/chromosomes/hg19");
        assert_eq!(info.config.pattern, "NNNNNNNNNNNNNNNNNNNNNRG");
        assert_eq!(info.config.queries.len(), 2);
        assert_eq!(info.config.queries[1].sequence, "CGCCAGCGTCAGCGACAGGTNNN");
        assert_eq!(info.config.queries[1].threshold, 4);
    }
    #[test]
    fn test_parse_input_errors() {
        // too short
        assert!(parse_input(Cursor::new("genome\nNNRG\n")).is_err());
        // length mismatch
        assert!(parse_input(Cursor::new("genome\nNNRG\nACGTA 1\n")).is_err());
        // bad threshold
        assert!(parse_input(Cursor::new("genome\nNNRG\nACGT -1\n")).is_err());
        assert!(parse_input(Cursor::new("genome\nNNRG\nACGT 70000\n")).is_err());
        // missing threshold
        assert!(parse_input(Cursor::new("genome\nNNRG\nACGT\n")).is_err());
        // not IUPAC
        assert!(parse_input(Cursor::new("genome\nNNRG\nACXT 1\n")).is_err());
        assert!(parse_input(Cursor::new("genome\nNNRX\nACGT 1\n")).is_err());
    }
}
