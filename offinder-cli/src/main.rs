mod cli_utils;

use crate::cli_utils::{parse_device_arg, read_input, DeviceArg, SearchRunInfo};
use clap::Parser;
use offinder_lib::*;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "cas-offinder", version)]
struct Args {
    /// Input file, `-` for stdin
    input: Option<String>,
    /// {C|G|A}[device_id(s)]: CPUs, GPUs or accelerators, optionally by index (e.g. G0,2)
    device: Option<String>,
    /// Output file, `-` for stdout; results are appended
    output: Option<String>,
}

fn get_usage(device_strs: &[String]) -> String {
    const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
    const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
    const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
    let dev_info = device_strs.join("\n");
    format!(
        "
Cas-OFFinder v{}

Copyright (c) 2022 {}
Website: {}

Usage: cas-offinder {{input_filename|-}} {{C|G|A}}[device_id(s)] {{output_filename|-}}
(C: using CPUs, G: using GPUs, A: using accelerators)

Example input file:
/var/chromosomes/human_hg19
NNNNNNNNNNNNNNNNNNNNNRG
GGCCGACCTGTCGCTGACGCNNN 5
CGCCAGCGTCAGCGACAGGTNNN 5
ACGGCGCCAGCGTCAGCGACNNN 5
GTCGCTGACGCTGGCGCCGTNNN 5

Available device list:
{}
",
        PKG_VERSION, AUTHORS, HOMEPAGE, dev_info
    )
}

#[cfg(not(feature = "opencl"))]
fn host_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(feature = "opencl")]
fn device_strs() -> Vec<String> {
    describe_devices()
}
#[cfg(not(feature = "opencl"))]
fn device_strs() -> Vec<String> {
    (0..host_pool_size())
        .map(|i| format!("{}: Rust host device {} (CPU)", i, i))
        .collect()
}

fn run_on<D: ComputeDevice>(
    pool: DevicePool<D>,
    dev: &DeviceArg,
    genome: &GenomeBuffer,
    run_info: &SearchRunInfo,
    out_path: &str,
) -> Result<SearchSummary> {
    let pool = pool.select(&dev.ids)?;
    let out: Box<dyn Write> = if out_path != "-" {
        Box::new(OpenOptions::new().create(true).append(true).open(out_path)?)
    } else {
        Box::new(std::io::stdout())
    };
    let mut writer = MatchWriter::new(out);
    let summary = search(pool, genome, &run_info.config, &mut writer)?;
    log::info!("{} result line(s) written", writer.lines_written());
    Ok(summary)
}

#[cfg(feature = "opencl")]
fn search_devices(
    dev: &DeviceArg,
    genome: &GenomeBuffer,
    run_info: &SearchRunInfo,
    out_path: &str,
) -> Result<SearchSummary> {
    let pool = DevicePool::<OclDevice>::discover(dev.class)?;
    run_on(pool, dev, genome, run_info, out_path)
}
#[cfg(not(feature = "opencl"))]
fn search_devices(
    dev: &DeviceArg,
    genome: &GenomeBuffer,
    run_info: &SearchRunInfo,
    out_path: &str,
) -> Result<SearchSummary> {
    match dev.class {
        DeviceClass::Cpu => {
            let pool = DevicePool::host(host_pool_size(), DEFAULT_HOST_MAX_ALLOC)?;
            run_on(pool, dev, genome, run_info, out_path)
        }
        other => Err(SearchError::NoDevices(other.to_string())),
    }
}

fn run(input: &str, device: &str, output: &str) -> Result<()> {
    let start_time = Instant::now();
    let dev = parse_device_arg(device)?;
    let run_info = read_input(input)?;
    let genome = load_genome(Path::new(&run_info.genome_path))?;
    let summary = search_devices(&dev, &genome, &run_info, output)?;
    log::info!(
        "{} match(es), completed in {}s",
        summary.matches,
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let (input, device, output) = match (args.input, args.device, args.output) {
        (Some(input), Some(device), Some(output)) => (input, device, output),
        (None, None, None) => {
            eprintln!("{}", get_usage(&device_strs()));
            return ExitCode::SUCCESS;
        }
        _ => {
            eprintln!("{}", get_usage(&device_strs()));
            return ExitCode::FAILURE;
        }
    };
    match run(&input, &device, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
