//! switchyard: relocation probe and find-user demo.
//!
//! - `switchyard relocate`: 2 スレッドで対称な relocate を回し、終わるかどうかを JSON で出す
//! - `switchyard demo`: facade 経由でユーザーを検索し、view に描画された結果を出す

mod demo;

use std::time::Duration;

use anyhow::bail;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use switchyard_core::registry::RelocationProbe;
use switchyard_core::{PoolConfig, RelocationStrategy};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "switchyard", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Relocate two channels symmetrically from two threads and report whether it finishes.
    Relocate(RelocateArgs),
    /// Look a user up through a scheduler facade and print what the view rendered.
    Demo(DemoArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    /// Holds the source lock while adding to the destination (can deadlock).
    Naive,
    /// Removes under the shared relocation lock, adds afterwards.
    Coordinated,
}

impl From<StrategyArg> for RelocationStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Naive => RelocationStrategy::Naive,
            StrategyArg::Coordinated => RelocationStrategy::coordinated(),
        }
    }
}

#[derive(Args, Debug)]
struct RelocateArgs {
    #[arg(long, value_enum, env = "SWITCHYARD_STRATEGY", default_value_t = StrategyArg::Coordinated)]
    strategy: StrategyArg,

    /// Back-and-forth moves per thread.
    #[arg(long, env = "SWITCHYARD_ROUNDS", default_value_t = 1)]
    rounds: u32,

    /// Give up and report a hang after this many milliseconds.
    #[arg(long, env = "SWITCHYARD_TIMEOUT_MS", default_value_t = 2_000)]
    timeout_ms: u64,
}

#[derive(Args, Debug)]
struct DemoArgs {
    #[arg(long, env = "SWITCHYARD_USER_ID", default_value = "u-1")]
    user_id: String,

    /// Detach the view right after scheduling; nothing should be rendered.
    #[arg(long)]
    detach_early: bool,

    /// Simulated repository latency in milliseconds.
    #[arg(long, env = "SWITCHYARD_LATENCY_MS", default_value_t = 200)]
    latency_ms: u64,

    #[arg(long, env = "SWITCHYARD_TIMEOUT_MS", default_value_t = 2_000)]
    timeout_ms: u64,

    #[arg(long, env = "SWITCHYARD_CORE_WORKERS", default_value_t = 2)]
    core_workers: usize,

    #[arg(long, env = "SWITCHYARD_MAX_WORKERS", default_value_t = 4)]
    max_workers: usize,

    #[arg(long, env = "SWITCHYARD_QUEUE_CAPACITY", default_value_t = 4)]
    queue_capacity: usize,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Relocate(args) => relocate(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}

async fn relocate(args: RelocateArgs) -> anyhow::Result<()> {
    let probe = RelocationProbe::new(args.strategy.into(), args.rounds);
    let timeout = Duration::from_millis(args.timeout_ms);
    info!(strategy = ?args.strategy, rounds = args.rounds, "starting relocation probe");

    // probe はスレッドを止めて待つので blocking 側で回す
    let report = tokio::task::spawn_blocking(move || probe.run(timeout)).await??;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.completed {
        bail!(
            "relocation did not finish within {} ms; the movers are deadlocked",
            args.timeout_ms
        );
    }
    Ok(())
}

async fn run_demo(args: DemoArgs) -> anyhow::Result<()> {
    let pool = PoolConfig::default()
        .with_workers(args.core_workers, args.max_workers)
        .with_queue_capacity(args.queue_capacity);
    let options = demo::DemoOptions {
        user_id: args.user_id,
        detach_early: args.detach_early,
        latency: Duration::from_millis(args.latency_ms),
        timeout: Duration::from_millis(args.timeout_ms),
        pool,
    };

    match demo::run(options).await? {
        Some(rendered) => println!("{}", serde_json::to_string_pretty(&rendered)?),
        None => info!("nothing was rendered"),
    }
    Ok(())
}
