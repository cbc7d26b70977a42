use anyhow::{bail, Context};
use chunkflow::executor::worker::serve_stdio;
use chunkflow::processor::{FrameMuonCutflow, MuonCutflow};
use chunkflow::{ExecutorArgs, FailureMode, Fileset, Processor, ProcessorRegistry, SchemaKind, Strategy};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, error, trace};

/// Run columnar event processors over chunked datasets
#[derive(Parser)]
#[command(name = "chunkflow")]
#[command(about = "Run columnar event processors over chunked datasets", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a fileset and print the accumulated result as JSON
    Run(RunArgs),
    /// Serve the worker protocol on stdin/stdout
    #[command(hide = true)]
    Worker,
}

#[derive(Args)]
struct RunArgs {
    /// JSON file mapping dataset names to lists of files
    #[arg(long)]
    fileset: PathBuf,

    /// Table to read from every file
    #[arg(long, default_value = "Events")]
    tree: String,

    /// Registered processor name (muon_cutflow, frame_muon_cutflow)
    #[arg(long)]
    processor: String,

    /// Processor state as a JSON object
    #[arg(long)]
    processor_config: Option<String>,

    /// serial, thread-parallel or process-parallel
    #[arg(short = 'e', long, default_value = "serial")]
    executor: Strategy,

    /// Executor options file (TOML); flags below override it
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// zlib level for results sent back by worker processes
    #[arg(long)]
    compression: Option<u32>,

    /// base or nanoaod
    #[arg(long)]
    schema: Option<SchemaKind>,

    /// Concatenate jagged branches in the base frame view
    #[arg(long)]
    flatten: bool,

    #[arg(long)]
    chunk_size: Option<u64>,

    /// Stop after this many chunks per dataset
    #[arg(long)]
    max_chunks: Option<usize>,

    /// Skip failed chunks instead of aborting
    #[arg(long)]
    best_effort: bool,

    #[arg(long)]
    retries: Option<u32>,

    /// Show a progress bar
    #[arg(long)]
    status: bool,

    /// Program started for process-parallel workers
    #[arg(long)]
    worker_program: Option<PathBuf>,
}

impl RunArgs {
    fn executor_args(&self) -> anyhow::Result<ExecutorArgs> {
        let mut args = match &self.config {
            Some(path) => ExecutorArgs::load(path)?,
            None => ExecutorArgs::default(),
        };

        if let Some(workers) = self.workers {
            args.workers = workers;
        }
        if self.compression.is_some() {
            args.compression = self.compression;
        }
        if self.schema.is_some() {
            args.schema = self.schema;
        }
        if self.chunk_size.is_some() {
            args.chunk_size = self.chunk_size;
        }
        if self.max_chunks.is_some() {
            args.max_chunks = self.max_chunks;
        }
        if let Some(retries) = self.retries {
            args.retries = retries;
        }
        if self.worker_program.is_some() {
            args.worker_program = self.worker_program.clone();
        }
        args.flatten |= self.flatten;
        args.status |= self.status;
        if self.best_effort {
            args.failure_mode = FailureMode::BestEffort;
        }
        Ok(args)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // stdout carries results and the worker protocol
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("chunkflow started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result = match cli.command {
        Commands::Run(args) => run_command(args).await,
        Commands::Worker => run_worker().await,
    };

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run_command(cmd: RunArgs) -> anyhow::Result<()> {
    let fileset = Fileset::from_json_file(&cmd.fileset)?;
    let args = cmd.executor_args()?;
    let state: Value = match &cmd.processor_config {
        Some(json) => serde_json::from_str(json).context("Invalid --processor-config JSON")?,
        None => Value::Object(Default::default()),
    };

    match cmd.processor.as_str() {
        name if name == MuonCutflow::NAME => {
            run_job::<MuonCutflow>(&fileset, &cmd.tree, state, cmd.executor, &args).await
        }
        name if name == FrameMuonCutflow::NAME => {
            run_job::<FrameMuonCutflow>(&fileset, &cmd.tree, state, cmd.executor, &args).await
        }
        other => bail!(
            "Unknown processor `{other}` (available: {})",
            ProcessorRegistry::builtin()
                .names()
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

async fn run_job<P: Processor>(
    fileset: &Fileset,
    tree: &str,
    state: Value,
    strategy: Strategy,
    args: &ExecutorArgs,
) -> anyhow::Result<()> {
    let processor: P = serde_json::from_value(state)
        .with_context(|| format!("Invalid configuration for processor `{}`", P::NAME))?;
    let output = chunkflow::run(fileset, tree, processor, strategy, args).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_worker() -> anyhow::Result<()> {
    let registry = ProcessorRegistry::builtin();
    tokio::task::spawn_blocking(move || serve_stdio(&registry))
        .await
        .context("Worker thread failed")??;
    Ok(())
}
