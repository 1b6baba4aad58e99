use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use flowstat::analysis::{analyse_batch, collect_captures};
use flowstat::config::Config;
use flowstat::report::{ReportFormat, SortOrder};
use flowstat::{analyse_capture, rollup, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ipnetwork::IpNetwork;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "flowstat")]
#[command(about = "Bidirectional flow statistics for pcap captures")]
#[command(version)]
struct Cli {
    #[arg(short, long, global = true, help = "Enable debug logging")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate capture files into per-flow packet and byte counters
    Flows(FlowsArgs),
    /// Sum a per-host traffic table by its label column
    Rollup(RollupArgs),
}

#[derive(Args)]
struct FlowsArgs {
    #[arg(required = true, help = "pcap/pcapng files or directories holding them")]
    captures: Vec<PathBuf>,

    #[arg(short, long, help = "Configuration file path")]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, help = "Report format")]
    format: Option<ReportFormat>,

    #[arg(
        short,
        long,
        help = "Report file for a single capture, report directory for several"
    )]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, help = "Report ordering")]
    sort: Option<SortOrder>,

    #[arg(short, long, help = "Only report the first N flows")]
    top: Option<usize>,

    #[arg(long, help = "Omit flows smaller than this many bytes")]
    min_bytes: Option<u64>,

    #[arg(long, help = "libpcap filter expression")]
    filter: Option<String>,

    #[arg(long = "ignore-net", help = "Drop packets touching this network (repeatable)")]
    ignore_networks: Vec<IpNetwork>,

    #[arg(long = "local-net", help = "Local side for the hosts report (repeatable, replaces the defaults)")]
    local_networks: Vec<IpNetwork>,

    #[arg(short, long, help = "Aggregate on up to this many worker threads")]
    partitions: Option<usize>,

    #[arg(long, help = "Print byte counters as KB/MB/GB")]
    human: bool,
}

#[derive(Args)]
struct RollupArgs {
    #[arg(help = "CSV traffic table with a label column")]
    input: PathBuf,

    #[arg(short, long, help = "Output path, defaults to <input>_by_label.csv")]
    output: Option<PathBuf>,
}

fn init_logging(debug: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn load_config(args: &FlowsArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };

    if let Some(format) = args.format {
        config.report.format = format;
    }
    if let Some(sort) = args.sort {
        config.report.sort = sort;
    }
    if args.top.is_some() {
        config.report.top = args.top;
    }
    if let Some(min_bytes) = args.min_bytes {
        config.report.min_bytes = min_bytes;
    }
    if args.human {
        config.report.human_units = true;
    }
    if args.filter.is_some() {
        config.capture.bpf_filter = args.filter.clone();
    }
    config.capture.ignore_networks.extend(args.ignore_networks.iter().copied());
    if !args.local_networks.is_empty() {
        config.report.local_networks = args.local_networks.clone();
    }
    if let Some(partitions) = args.partitions {
        if partitions == 0 {
            bail!("--partitions must be at least 1");
        }
        config.aggregation.partitions = partitions;
    }

    Ok(config)
}

fn run_single(capture: &Path, output: Option<&Path>, config: &Config) -> Result<()> {
    let analysis = analyse_capture(capture, config)
        .with_context(|| format!("Failed to analyse {}", capture.display()))?;

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Cannot create {}", path.display()))?;
            analysis.write_report(BufWriter::new(file), &config.report)?;
            log::info!("Report written to {}", path.display());
        },
        None => {
            analysis.write_report(io::stdout().lock(), &config.report)?;
        },
    }

    Ok(())
}

fn batch_progress(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    match ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(err) => log::debug!("Default progress style: {}", err),
    }
    pb
}

fn run_batch(captures: &[PathBuf], out_dir: &Path, config: &Config) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Cannot create report directory {}", out_dir.display()))?;

    let pb = batch_progress(captures.len());
    let outcomes = analyse_batch(captures, config, out_dir, |outcome| {
        pb.set_message(format!("{}", outcome.capture.display()));
        pb.inc(1);
    });
    let outcomes = match outcomes {
        Ok(outcomes) => outcomes,
        Err(err) => {
            pb.abandon();
            return Err(err.into());
        },
    };
    pb.finish_with_message(format!("{} captures analysed", outcomes.len()));

    for outcome in &outcomes {
        println!(
            "{}: {} flows -> {}",
            outcome.capture.display(),
            outcome.analysis.aggregator.len(),
            outcome.report.display()
        );
    }
    Ok(())
}

fn run_flows(args: FlowsArgs) -> Result<()> {
    let captures = collect_captures(&args.captures)?;
    if captures.is_empty() {
        bail!("No pcap or pcapng files found");
    }
    if let Some(missing) = captures.iter().find(|capture| !capture.is_file()) {
        bail!("Capture file not found: {}", missing.display());
    }

    let config = load_config(&args)?;

    // A lone file keeps the plain stdout / -o behaviour.
    if args.captures.len() == 1 && !args.captures[0].is_dir() {
        return run_single(&captures[0], args.output.as_deref(), &config);
    }

    let out_dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));
    run_batch(&captures, &out_dir, &config)
}

fn run_rollup(args: RollupArgs) -> Result<()> {
    if !args.input.is_file() {
        bail!("Traffic table not found: {}", args.input.display());
    }

    let output = args
        .output
        .unwrap_or_else(|| rollup::default_output_path(&args.input));
    rollup::rollup_file(&args.input, &output)?;
    println!("Rollup written to {}", output.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Command::Flows(args) => run_flows(args),
        Command::Rollup(args) => run_rollup(args),
    }
}
