use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use colored::control::set_override as set_color_override;
use dagcbor_conformance::aggregate::aggregate;
use dagcbor_conformance::codecs::builtin_adapters;
use dagcbor_conformance::config::load_harnesses;
use dagcbor_conformance::engine::{
    RunOptions, align_results, insert_results, run_participants, select_participants,
};
use dagcbor_conformance::error::HarnessError;
use dagcbor_conformance::fixture::load_fixtures;
use dagcbor_conformance::report::{build_render_model, print_human};
use dagcbor_conformance::types::{AdapterResults, ResultSet};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DEFAULT_FIXTURES: &str = "fixtures/cbor";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Run DAG-CBOR fixtures through codec libraries and report how they fare"
)]
struct Cli {
    /// Log progress (RUST_LOG overrides the level)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    /// Force colored output
    #[arg(
        short = 'c',
        long = "color",
        alias = "colour",
        global = true,
        conflicts_with = "no_color"
    )]
    color: bool,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the fixture corpus and print the result set as JSON
    Run(RunArgs),
    /// Combine result documents printed by harness programs into one result set
    Merge(MergeArgs),
    /// Aggregate a result set into report data and print a summary
    Report(ReportArgs),
    /// List the built-in adapters
    Adapters,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Fixture root directory
    #[arg(long, value_name = "DIR", default_value = DEFAULT_FIXTURES)]
    fixtures: PathBuf,

    /// Adapter or harness to run; repeat to select several (default: all)
    #[arg(short = 'a', long = "adapter", value_name = "NAME")]
    adapters: Vec<String>,

    /// YAML file describing external harness programs
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the result set here instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Run everything on one thread
    #[arg(long)]
    serial: bool,

    /// Silence harness stderr
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Harness outputs as NAME=PATH, in report order
    #[arg(value_name = "NAME=PATH", required = true)]
    inputs: Vec<String>,

    /// Fixture root the outputs are checked against
    #[arg(long, value_name = "DIR", default_value = DEFAULT_FIXTURES)]
    fixtures: PathBuf,

    /// Write the result set here instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Result set produced by `run` or `merge`
    #[arg(value_name = "RESULTS")]
    results: PathBuf,

    /// Fixture root the result set was produced from
    #[arg(long, value_name = "DIR", default_value = DEFAULT_FIXTURES)]
    fixtures: PathBuf,

    /// Where to write the report data for the HTML template
    #[arg(short = 'o', long, value_name = "FILE", default_value = "report.json")]
    output: PathBuf,

    /// Do not print the summary
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn read_result_set(path: &Path) -> Result<ResultSet> {
    let content = fs::read_to_string(path).map_err(|source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let set = serde_json::from_str(&content).map_err(|source| HarnessError::ResultParse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(set)
}

/// Compact JSON, to a file or stdout.
fn write_result_set(set: &ResultSet, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut w = BufWriter::new(file);
            serde_json::to_writer(&mut w, set)?;
            w.flush()?;
            info!("wrote results to {}", path.display());
        }
        None => {
            let mut w = io::stdout().lock();
            serde_json::to_writer(&mut w, set)?;
            w.flush()?;
        }
    }
    Ok(())
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let harnesses = match &args.config {
        Some(path) => load_harnesses(path, args.quiet)
            .with_context(|| format!("loading harness config {}", path.display()))?,
        None => Vec::new(),
    };
    let participants = select_participants(&args.adapters, builtin_adapters(), harnesses)?;
    let opts = RunOptions {
        serial: args.serial,
    };
    let set = run_participants(&args.fixtures, participants, opts)
        .with_context(|| format!("running fixtures from {}", args.fixtures.display()))?;
    write_result_set(&set, args.output.as_deref())
}

fn cmd_merge(args: MergeArgs) -> Result<()> {
    let files = load_fixtures(&args.fixtures)?;
    let mut set = ResultSet::new();
    for input in &args.inputs {
        let (name, path) = input
            .split_once('=')
            .with_context(|| format!("expected NAME=PATH, got '{input}'"))?;
        let path = Path::new(path.trim());
        let content = fs::read_to_string(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let results: AdapterResults =
            serde_json::from_str(&content).map_err(|source| HarnessError::ResultParse {
                path: path.to_path_buf(),
                source,
            })?;
        let name = name.trim();
        let results = align_results(name, results, &files)?;
        insert_results(&mut set, name, results)?;
    }
    write_result_set(&set, args.output.as_deref())
}

fn cmd_report(args: ReportArgs) -> Result<()> {
    let set = read_result_set(&args.results)?;
    let report = aggregate(&set, &args.fixtures)
        .with_context(|| format!("aggregating {}", args.results.display()))?;
    let model = build_render_model(&report, chrono::Utc::now());

    let file = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, &model)?;
    w.flush()?;
    info!("wrote report data to {}", args.output.display());

    if !args.quiet {
        print_human(&report);
    }
    Ok(())
}

fn cmd_adapters() {
    for adapter in builtin_adapters() {
        let meta = adapter.metadata();
        println!(
            "{}  {}  {}",
            adapter.name().bold(),
            meta.version,
            meta.link.dimmed()
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "dagcbor_conformance=info".to_string())
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "dagcbor_conformance=warn".to_string())
    };
    // stdout carries result documents; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if cli.no_color {
        set_color_override(false);
    } else if cli.color {
        set_color_override(true);
    }

    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Merge(args) => cmd_merge(args),
        Command::Report(args) => cmd_report(args),
        Command::Adapters => {
            cmd_adapters();
            Ok(())
        }
    }
}
