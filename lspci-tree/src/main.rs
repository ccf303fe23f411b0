use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use lspci_parser::{RangeForest, Report};
use tracing_subscriber::EnvFilter;

/// Report looked up in the working directory when no input is given.
const CACHED_REPORT: &str = "lspci.vvv";

/// Print the devices described by an `lspci -vvv` report, or the hierarchy of the
/// address ranges they claim.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Report to read, or `-` for stdin [default: ./lspci.vvv, else the output of `lspci -vvv`]
    input: Option<PathBuf>,

    /// Print the memory and I/O range forests instead of the device records
    #[arg(long)]
    ranges: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let source = read_report(cli.input.as_deref())?;
    let report = lspci_parser::from_str(&source).context("failed to parse lspci report")?;

    if cli.ranges {
        print_ranges(&report);
    } else {
        println!("{:#?}", report.devices);
    }

    Ok(())
}

fn read_report(input: Option<&Path>) -> Result<String> {
    let reader: Box<dyn Read> = match input {
        Some(path) if path == Path::new("-") => Box::new(io::stdin()),
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => match File::open(CACHED_REPORT) {
            Ok(file) => {
                tracing::info!("reading cached report {CACHED_REPORT}");
                Box::new(file)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return run_lspci(),
            Err(e) => return Err(e).with_context(|| format!("failed to open {CACHED_REPORT}")),
        },
    };

    let mut buf = String::new();
    BufReader::new(reader)
        .read_to_string(&mut buf)
        .context("failed to read report")?;
    Ok(buf)
}

fn run_lspci() -> Result<String> {
    tracing::info!("no cached report, running lspci -vvv");

    let output = Command::new("lspci")
        .arg("-vvv")
        .output()
        .context("failed to run lspci")?;
    if !output.status.success() {
        bail!("lspci -vvv failed: {}", output.status);
    }

    String::from_utf8(output.stdout).context("lspci output is not valid UTF-8")
}

fn print_ranges(report: &Report) {
    for (title, forest) in [("Memory", &report.memory), ("I/O ports", &report.io)] {
        println!("{title}:");
        print_forest(forest);
        println!();
    }
}

/// One line per range: bounds, size, then everything claiming it, indented by depth.
fn print_forest(forest: &RangeForest) {
    for (depth, node) in forest.walk() {
        let size = (node.end - node.start).saturating_add(1);
        let labels = node.labels.iter().map(String::as_str).collect::<Vec<_>>();

        println!(
            "{:indent$}{:012x}-{:012x} {size:>12x} | {}",
            "",
            node.start,
            node.end,
            labels.join(" && "),
            indent = depth * 2,
        );
    }
}
