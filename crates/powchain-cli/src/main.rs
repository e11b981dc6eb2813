use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use powchain_core::{
    calculate_hash, constants::AUTO_MINE_INTERVAL_MS, AutoMiner, Block, BlockCandidate,
    BlockView, Chain, ChainConfig, PowCheck, SharedChain, ValidationReport,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const DEMO_PAYLOADS: [&str; 3] = ["Block 1 Data", "Block 2 Data", "Block 3 Data"];

#[derive(Parser, Debug)]
#[command(name = "powchain")]
#[command(about = "Build, mine and validate a hash-linked proof-of-work chain")]
struct Cli {
    #[command(flatten)]
    chain: ChainArgs,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Multi-line, human-oriented log output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct ChainArgs {
    /// JSON chain config (difficulty, max_difficulty, genesis_data)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Leading zero hex characters required per block. Each step costs ~16x
    #[arg(long, global = true)]
    difficulty: Option<u32>,

    /// Upper bound accepted for the difficulty
    #[arg(long, global = true)]
    max_difficulty: Option<u32>,

    /// Payload of the genesis block
    #[arg(long, global = true)]
    genesis: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append the given payloads and print the chain
    Demo {
        #[arg(default_values = DEMO_PAYLOADS)]
        data: Vec<String>,
    },
    /// Mine blocks in the background until the count is reached or Ctrl-C
    AutoMine {
        /// Stop after this many blocks
        #[arg(long)]
        count: Option<u64>,
        /// Delay between blocks
        #[arg(long, default_value_t = AUTO_MINE_INTERVAL_MS)]
        interval_ms: u64,
    },
    /// Tamper with one block of a demo chain and report what validation finds
    Tamper {
        /// Block to modify
        #[arg(long, default_value_t = 2)]
        index: usize,
        /// Replacement payload
        #[arg(long, default_value = "TAMPERED")]
        data: String,
        /// Re-mine the tampered block so its own hash is consistent again
        #[arg(long)]
        remine: bool,
    },
    /// Print the digest of the given block fields
    Hash {
        #[arg(long)]
        index: u64,
        #[arg(long)]
        timestamp: f64,
        #[arg(long)]
        data: String,
        #[arg(long, default_value = "0")]
        previous_hash: String,
        #[arg(long, default_value_t = 0)]
        nonce: u64,
    },
}

#[derive(Serialize)]
struct ChainOutput<'a> {
    difficulty: u32,
    blocks: &'a [BlockView],
    report: &'a ValidationReport,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.pretty);

    let config = load_config(&cli.chain).await?;
    match cli.cmd {
        Command::Demo { data } => {
            let mut chain = Chain::with_config(config)?;
            for payload in data {
                let (index, hash) = chain.append(payload);
                info!(index, %hash, "appended");
            }
            let report = chain.audit(PowCheck::Recorded);
            print_chain(chain.difficulty(), &chain.snapshot(), &report, cli.json)?;
        }
        Command::AutoMine { count, interval_ms } => {
            let shared = SharedChain::new(Chain::with_config(config)?);
            let miner = AutoMiner::spawn(
                shared.clone(),
                Duration::from_millis(interval_ms),
                count,
                |n| format!("Auto Block {}", n + 1),
            );
            let signal = miner.stop_signal();
            let join = miner.join();
            tokio::pin!(join);
            let mined = tokio::select! {
                mined = &mut join => mined?,
                res = tokio::signal::ctrl_c() => {
                    res.context("listening for Ctrl-C")?;
                    info!("interrupt received, stopping after the current block");
                    signal.stop();
                    join.await?
                }
            };
            info!(mined, "auto-mining stopped");
            let (difficulty, blocks, report) = shared
                .read(|chain| {
                    (
                        chain.difficulty(),
                        chain.snapshot(),
                        chain.audit(PowCheck::Recorded),
                    )
                })
                .await;
            print_chain(difficulty, &blocks, &report, cli.json)?;
        }
        Command::Tamper { index, data, remine } => {
            let mut chain = Chain::with_config(config)?;
            for payload in DEMO_PAYLOADS {
                chain.append(payload);
            }
            let mut views = chain.snapshot();
            let Some(view) = views.get_mut(index) else {
                bail!("index {index} is outside the chain (len {})", chain.len());
            };
            view.data = data;
            if remine {
                let mut candidate = BlockCandidate::new(
                    view.index,
                    view.timestamp,
                    view.data.as_str(),
                    view.previous_hash.as_str(),
                );
                let stats = candidate.mine(chain.difficulty());
                info!(
                    index = view.index,
                    attempts = stats.attempts,
                    elapsed = ?stats.elapsed,
                    "re-mined tampered block"
                );
                *view = candidate.freeze().view();
            }
            let blocks = views.into_iter().map(Block::from_view).collect();
            let tampered = Chain::from_blocks(blocks, chain.config().clone())?;
            let report = tampered.audit(PowCheck::Recorded);
            print_chain(tampered.difficulty(), &tampered.snapshot(), &report, cli.json)?;
        }
        Command::Hash {
            index,
            timestamp,
            data,
            previous_hash,
            nonce,
        } => {
            let hash = calculate_hash(index, timestamp, &data, &previous_hash, nonce);
            if cli.json {
                println!("{}", serde_json::json!({ "hash": hash }));
            } else {
                println!("{hash}");
            }
        }
    }
    Ok(())
}

/// Logs go to stderr so stdout carries only the chain output.
fn init_tracing(pretty: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if pretty {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .pretty()
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn load_config(args: &ChainArgs) -> Result<ChainConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            ChainConfig::from_json(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => ChainConfig::default(),
    };
    if let Some(max) = args.max_difficulty {
        config.max_difficulty = max;
    }
    if let Some(difficulty) = args.difficulty {
        config.difficulty = difficulty;
    }
    if let Some(genesis) = &args.genesis {
        config.genesis_data = genesis.clone();
    }
    config.validate()?;
    Ok(config)
}

fn print_chain(
    difficulty: u32,
    blocks: &[BlockView],
    report: &ValidationReport,
    json: bool,
) -> Result<()> {
    if json {
        let out = ChainOutput {
            difficulty,
            blocks,
            report,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("difficulty: {difficulty}");
    for block in blocks {
        println!("{}", "-".repeat(72));
        println!("index:         {}", block.index);
        println!("timestamp:     {:.6}", block.timestamp);
        println!("data:          {}", block.data);
        println!("previous hash: {}", block.previous_hash);
        println!("hash:          {}", block.hash);
        println!("nonce:         {} (difficulty {})", block.nonce, block.difficulty);
    }
    println!("{}", "-".repeat(72));
    if report.is_valid() {
        println!("chain valid: yes");
    } else {
        println!("chain valid: no");
        if let Some(first) = report.first() {
            println!("first failure at block {}", first.index());
        }
        for violation in &report.violations {
            println!("  {violation}");
        }
    }
    Ok(())
}
