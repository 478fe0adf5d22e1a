//! Retrace CLI, the command-line front end for the waveform-replay engine.
//!
//! Provides `retrace run` for replaying a VCD file through a probe testbench,
//! `retrace info` for summarizing a trace, and `retrace cache clear` for
//! removing persisted replay caches.

#![warn(missing_docs)]

mod cache;
mod info;
mod run;
mod settings;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Retrace, a waveform replay engine with adaptive signal caching.
#[derive(Parser, Debug)]
#[command(name = "retrace", version, about = "Retrace waveform replay engine")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `retrace.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a waveform and report value changes of watched signals.
    Run(RunArgs),
    /// Summarize a waveform file.
    Info(InfoArgs),
    /// Manage the persisted replay cache.
    Cache {
        /// The cache operation.
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Arguments for the `retrace run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Waveform file (`.vcd` or gzipped `.vcd.gz`).
    pub wave: String,

    /// Hierarchical signal name to watch (repeatable).
    #[arg(short, long = "watch")]
    pub watch: Vec<String>,

    /// Format watched values are printed in.
    #[arg(short, long, value_enum, default_value_t = PrintFormat::Hex)]
    pub format: PrintFormat,

    /// End the replay with `$finish` this many trace time units after start.
    #[arg(long)]
    pub stop_after: Option<u64>,

    /// Print the run summary as JSON.
    #[arg(long)]
    pub json: bool,

    /// Do not read or write the persisted replay cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Disable the JIT optimizer.
    #[arg(long)]
    pub no_jit: bool,

    /// Reads before a signal is considered hot.
    #[arg(long)]
    pub threshold: Option<u64>,

    /// Indices decoded per optimizer window.
    #[arg(long)]
    pub window: Option<u64>,

    /// Cap on concurrently active optimizer threads.
    #[arg(long)]
    pub max_threads: Option<u64>,
}

/// Arguments for the `retrace info` subcommand.
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Waveform file (`.vcd` or gzipped `.vcd.gz`).
    pub wave: String,

    /// List every signal with its width and type.
    #[arg(short, long)]
    pub signals: bool,

    /// Print the summary as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Operations on the persisted replay cache.
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Delete the cache directory.
    Clear {
        /// Cache directory (default: `replay.cache_dir` from the configuration).
        #[arg(long)]
        dir: Option<String>,
    },
}

/// Format watched values are printed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PrintFormat {
    /// Unsigned integer of the low 32 bits.
    Int,
    /// Binary string, MSB first.
    Bin,
    /// Lowercase hex string.
    Hex,
    /// 32-bit chunks, least significant first.
    Vec,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

/// Exit code for a replay ended by SIGINT or SIGTERM.
pub const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Run(ref args) => run::run(args, &global),
        Command::Info(ref args) => info::run(args, &global),
        Command::Cache { ref action } => cache::run(action, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Default log filter for the given flags. `RUST_LOG` takes precedence.
fn default_log_filter(global: &GlobalArgs) -> &'static str {
    if global.quiet {
        "error"
    } else if global.verbose {
        "debug"
    } else {
        "info"
    }
}

fn init_logging(global: &GlobalArgs) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_log_filter(global)))
        .format_timestamp(None)
        .init();
}
