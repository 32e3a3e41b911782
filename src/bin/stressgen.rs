//! stressgen CLI - generate or verify a matching-engine stress stream.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use stressgen::logging::{init_logging, level_for};
use stressgen::{verify_reader, CancelPolicy, Generator, GeneratorConfig, VerifyLimits};
use tracing::info;

#[derive(Parser)]
#[command(name = "stressgen")]
#[command(about = "Command stream generator for multi-threaded matching engine stress tests")]
struct Cli {
    /// More diagnostics on stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report errors on stderr
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a command stream
    Generate(GenerateArgs),
    /// Check a command stream and print its summary
    Verify(VerifyArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Worker threads the consumer should start
    #[arg(short = 't', long, env = "STRESSGEN_THREADS", default_value_t = 40)]
    threads: u32,

    /// Number of buy/sell/cancel commands
    #[arg(short = 'n', long, env = "STRESSGEN_ORDERS", default_value_t = 100_000)]
    orders: u64,

    /// Number of symbols (SYM0 ..)
    #[arg(short = 'i', long, env = "STRESSGEN_INSTRUMENTS", default_value_t = 5)]
    instruments: u32,

    /// RNG seed; random when omitted (the chosen seed is logged)
    #[arg(short, long, env = "STRESSGEN_SEED")]
    seed: Option<u64>,

    #[arg(long, env = "STRESSGEN_PRICE_MIN", default_value_t = 100)]
    price_min: u32,

    #[arg(long, env = "STRESSGEN_PRICE_MAX", default_value_t = 10_000)]
    price_max: u32,

    #[arg(long, env = "STRESSGEN_QTY_MIN", default_value_t = 1)]
    qty_min: u32,

    #[arg(long, env = "STRESSGEN_QTY_MAX", default_value_t = 100)]
    qty_max: u32,

    /// Cancel targets: any-placed (double cancels possible) or live-only
    #[arg(long, env = "STRESSGEN_CANCEL_POLICY", default_value = "any-placed")]
    cancel_policy: CancelPolicy,

    /// Write to a file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

impl GenerateArgs {
    fn config(&self) -> GeneratorConfig {
        GeneratorConfig {
            num_threads: self.threads,
            orders: self.orders,
            num_instruments: self.instruments,
            seed: self.seed,
            price_min: self.price_min,
            price_max: self.price_max,
            qty_min: self.qty_min,
            qty_max: self.qty_max,
            cancel_policy: self.cancel_policy,
        }
    }
}

#[derive(Args)]
struct VerifyArgs {
    /// Stream to check (stdin when omitted)
    #[arg(value_name = "PATH")]
    input: Option<PathBuf>,

    /// Require exactly this many commands
    #[arg(long)]
    orders: Option<u64>,

    /// Require instruments within SYM0 .. SYM{n-1}
    #[arg(long)]
    instruments: Option<u32>,

    #[arg(long, requires = "price_max")]
    price_min: Option<u32>,

    #[arg(long, requires = "price_min")]
    price_max: Option<u32>,

    #[arg(long, requires = "qty_max")]
    qty_min: Option<u32>,

    #[arg(long, requires = "qty_min")]
    qty_max: Option<u32>,

    /// Reject streams that cancel an order twice
    #[arg(long)]
    live_only: bool,
}

impl VerifyArgs {
    fn limits(&self) -> VerifyLimits {
        VerifyLimits {
            orders: self.orders,
            num_instruments: self.instruments,
            price: self.price_min.zip(self.price_max),
            qty: self.qty_min.zip(self.qty_max),
            live_only: self.live_only,
        }
    }
}

fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    // Validate before touching the output so a bad config leaves nothing behind
    let generator = Generator::new(args.config()).context("invalid configuration")?;

    let stats = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            generator.run(file)?
        }
        None => generator.run(io::stdout().lock())?,
    };

    info!(seed = stats.seed, commands = stats.commands(), "done");
    Ok(())
}

fn verify(args: VerifyArgs) -> anyhow::Result<()> {
    let limits = args.limits();
    let summary = match &args.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            verify_reader(BufReader::new(file), limits)
        }
        None => verify_reader(io::stdin().lock(), limits),
    }
    .context("stream rejected")?;

    print!("{}", summary);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(level_for(cli.verbose, cli.quiet));

    match cli.command {
        Commands::Generate(args) => generate(args),
        Commands::Verify(args) => verify(args),
    }
}
