//! dmc-cli: command-line front end for the DMC storage-market ledger.
//!
//! Two groups of commands:
//!   merkle  build a file's Merkle tree and answer storage challenges for it
//!   state   create, drive and inspect a persisted market state

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use dmc_core::event::Event;
use dmc_core::host::Host;
use dmc_core::types::{Address, Balance, ContentHash, CycleIndex};
use dmc_crypto::hash::HashType;
use dmc_crypto::merkle::{MerkleTree, MerkleTreeData, ShowProof};
use dmc_exchange::{ExchangeCycleState, ExchangeMode};
use dmc_state::{MarketParams, StateDb, StateEngine, Transaction};

#[derive(Parser, Debug)]
#[command(name = "dmc-cli", version, about = "DMC storage-market ledger tool")]
struct Args {
    /// Directory for the persistent state database.
    #[arg(long, global = true, default_value = "~/.dmc/data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merkle tree tooling for stored files.
    #[command(subcommand)]
    Merkle(MerkleCommand),
    /// Persisted market state.
    #[command(subcommand)]
    State(StateCommand),
}

#[derive(Subcommand, Debug)]
enum MerkleCommand {
    /// Build the tree of FILE, save it next to the file and print its mixed hash.
    Create {
        #[arg(value_name = "FILE")]
        file_path: PathBuf,
        /// sha256 or keccak256
        hash_type: HashType,
    },
    /// Answer a challenge: the leaf with the lowest proof root, or LEAF_INDEX.
    Proof {
        #[arg(value_name = "FILE")]
        file_path: PathBuf,
        /// 0x-prefixed block hash of the nonce block.
        nonce_hash: String,
        leaf_index: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum StateCommand {
    /// Create the genesis state.
    Init {
        /// Path to market params JSON. Defaults apply when omitted.
        #[arg(long)]
        params: Option<PathBuf>,
    },
    /// Apply a JSON transaction, or an array of them, in order.
    Apply {
        #[arg(value_name = "TX_FILE")]
        tx_path: PathBuf,
    },
    /// Print a JSON summary of the state.
    Show {
        /// Also print the events from this index on.
        #[arg(long)]
        events_from: Option<u64>,
    },
    /// Print the simulated hash of a recent block.
    BlockHash { height: u64 },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dmc=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Merkle(cmd) => run_merkle(cmd),
        Command::State(cmd) => run_state(cmd, &expand_tilde(&args.data_dir)),
    }
}

// ── merkle ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ProofOutput {
    leaf_index: u64,
    path: Vec<String>,
    leaf: String,
    proof_root: String,
}

impl From<ShowProof> for ProofOutput {
    fn from(p: ShowProof) -> Self {
        Self {
            leaf_index: p.leaf_index,
            path: p.path.iter().map(|h| format!("0x{}", hex::encode(h))).collect(),
            leaf: format!("0x{}", hex::encode(&p.leaf)),
            proof_root: format!("0x{}", hex::encode(p.proof_root)),
        }
    }
}

fn run_merkle(cmd: MerkleCommand) -> anyhow::Result<()> {
    match cmd {
        MerkleCommand::Create { file_path, hash_type } => {
            let data = std::fs::read(&file_path)
                .with_context(|| format!("reading {}", file_path.display()))?;
            info!(file = %file_path.display(), bytes = data.len(), %hash_type, "building merkle tree");
            let tree = MerkleTree::from_data(hash_type, &data);
            let mixed = tree.mixed_root(data.len() as u64);

            let tree_path = file_path.with_extension("merkle");
            let json = serde_json::to_vec(&tree.save()).context("encoding merkle tree")?;
            std::fs::write(&tree_path, json)
                .with_context(|| format!("writing {}", tree_path.display()))?;
            info!(tree = %tree_path.display(), leaves = tree.leaf_count(), "merkle tree saved");
            println!("{mixed}");
        }
        MerkleCommand::Proof { file_path, nonce_hash, leaf_index } => {
            let tree_path = file_path.with_extension("merkle");
            let raw = std::fs::read(&tree_path)
                .with_context(|| format!("reading {} (run `merkle create` first)", tree_path.display()))?;
            let saved: MerkleTreeData = serde_json::from_slice(&raw).context("parsing merkle tree JSON")?;
            let tree = MerkleTree::load(&saved).context("loading merkle tree")?;
            let data = std::fs::read(&file_path)
                .with_context(|| format!("reading {}", file_path.display()))?;

            let mut nonce = [0u8; 32];
            hex::decode_to_slice(nonce_hash.strip_prefix("0x").unwrap_or(&nonce_hash), &mut nonce)
                .context("nonce hash must be 32 hex-encoded bytes")?;

            let proof = match leaf_index {
                Some(i) => tree.prove(&data, i, &nonce),
                None => tree.find_min_proof(&data, &nonce),
            };
            let Some(proof) = proof else {
                bail!("no leaf {} in a tree of {} leaves", leaf_index.unwrap_or(0), tree.leaf_count());
            };
            println!("{}", serde_json::to_string_pretty(&ProofOutput::from(proof))?);
        }
    }
    Ok(())
}

// ── state ─────────────────────────────────────────────────────────────────────

fn open_db(data_dir: &Path) -> anyhow::Result<Arc<StateDb>> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    Ok(Arc::new(StateDb::open(data_dir).context("opening state database")?))
}

fn run_state(cmd: StateCommand, data_dir: &Path) -> anyhow::Result<()> {
    let db = open_db(data_dir)?;
    match cmd {
        StateCommand::Init { params } => {
            let params = load_params(params.as_deref())?;
            let engine = StateEngine::init(db, &params).context("building genesis state")?;
            info!(height = engine.state().height(), "market state initialised");
        }
        StateCommand::Apply { tx_path } => {
            let json = std::fs::read_to_string(&tx_path)
                .with_context(|| format!("reading {}", tx_path.display()))?;
            let txs = parse_transactions(&json)?;
            let mut engine = StateEngine::open(Arc::clone(&db)).context("loading market state")?;
            for (i, tx) in txs.iter().enumerate() {
                let events = engine
                    .apply(tx)
                    .with_context(|| format!("transaction {i} by {} rejected", tx.caller))?;
                for event in events {
                    println!("{}", serde_json::to_string(&event)?);
                }
            }
            db.flush().context("flushing state database")?;
        }
        StateCommand::Show { events_from } => {
            let engine = StateEngine::open(Arc::clone(&db)).context("loading market state")?;
            let events = events_from.map(|from| db.events_since(from)).transpose()?;
            let summary = summarize(&engine, events)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        StateCommand::BlockHash { height } => {
            let engine = StateEngine::open(db).context("loading market state")?;
            match engine.state().chain.block_hash(height) {
                Some(hash) => println!("0x{}", hex::encode(hash)),
                None => bail!("block {height} is not settled or outside the recent window"),
            }
        }
    }
    Ok(())
}

/// A file holds either one transaction object or an array of them.
fn parse_transactions(json: &str) -> anyhow::Result<Vec<Transaction>> {
    if json.trim_start().starts_with('[') {
        serde_json::from_str(json).context("parsing transaction array")
    } else {
        Ok(vec![serde_json::from_str(json).context("parsing transaction")?])
    }
}

#[derive(Serialize)]
struct StateSummary<'a> {
    height: u64,
    tx_count: u64,
    event_count: usize,
    dividend: DividendSummary,
    exchange: ExchangeSummary<'a>,
    storage: StorageSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<Vec<Event>>,
}

#[derive(Serialize)]
struct DividendSummary {
    cycle: CycleIndex,
    total_staked: Balance,
}

#[derive(Serialize)]
struct ExchangeSummary<'a> {
    mode: ExchangeMode,
    cycle: Option<&'a ExchangeCycleState>,
    free_gwt: Balance,
    free_dmc: Balance,
}

#[derive(Serialize)]
struct StorageSummary {
    cycle: CycleIndex,
    board_capacity: usize,
    records: Vec<RecordSummary>,
}

#[derive(Serialize)]
struct RecordSummary {
    hash: ContentHash,
    owner: Option<Address>,
    sponsor: Address,
    total_deposit: Balance,
    balance: Balance,
    score: u128,
    ranking: Option<usize>,
    last_showed_suppliers: Vec<Address>,
}

fn summarize(engine: &StateEngine, events: Option<Vec<Event>>) -> anyhow::Result<StateSummary<'_>> {
    let state = engine.state();
    let chain = &state.chain;
    let dividend_cycle = state.dividend.current_cycle_index(chain);
    let (free_gwt, free_dmc) = state.exchange.free_balances();
    let records = state
        .storage
        .records()
        .map(|r| RecordSummary {
            hash: r.hash,
            owner: state.storage.data_owner(chain, &r.hash),
            sponsor: r.sponsor,
            total_deposit: r.total_deposit,
            balance: r.balance,
            score: r.score,
            ranking: state.storage.ranking(&r.hash).ok(),
            last_showed_suppliers: r.last_showed_suppliers.clone(),
        })
        .collect();

    Ok(StateSummary {
        height: state.height(),
        tx_count: engine.db().tx_count()?,
        event_count: engine.db().event_count(),
        dividend: DividendSummary {
            cycle: dividend_cycle,
            total_staked: state.dividend.get_total_staked(dividend_cycle),
        },
        exchange: ExchangeSummary {
            mode: state.exchange.mode(),
            cycle: state.exchange.cycle_state(),
            free_gwt,
            free_dmc,
        },
        storage: StorageSummary {
            cycle: state.storage.current_cycle_index(chain),
            board_capacity: state.storage.board().max_len(),
            records,
        },
        events,
    })
}

/// Load market params from a JSON file, or fall back to the defaults.
fn load_params(path: Option<&Path>) -> anyhow::Result<MarketParams> {
    if let Some(p) = path {
        let json = std::fs::read_to_string(p)
            .with_context(|| format!("reading market params from {}", p.display()))?;
        return serde_json::from_str(&json).context("parsing market params JSON");
    }
    warn!("no --params provided, using default market params");
    Ok(MarketParams::default())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
