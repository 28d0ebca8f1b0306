//! End-to-end smoke test for dmc-cli.
//!
//! Builds a Merkle tree for a random file, creates a market state in a fresh
//! data directory, drives it with transaction files and answers a storage
//! challenge with the proof printed by the CLI.
//!
//! Run with:
//!   cargo test -p dmc-node --test smoke

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rand::{Rng, SeedableRng};

use dmc_core::constants::TOKEN_UNIT;
use dmc_core::types::{Address, ContentHash};
use dmc_state::{Action, Allocation, MarketParams, Transaction};

const T: u128 = TOKEN_UNIT;

// ── Workspace lifecycle ───────────────────────────────────────────────────────

struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("dmc-cli-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        Self { dir }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn data_dir(&self) -> PathBuf {
        self.dir.join("data")
    }

    fn write_json<T: serde::Serialize>(&self, file: &str, value: &T) -> PathBuf {
        let path = self.path(file);
        std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

// ── CLI helpers ───────────────────────────────────────────────────────────────

fn cli(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dmc-cli"))
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .output()
        .expect("spawn dmc-cli")
}

fn cli_ok(data_dir: &Path, args: &[&str]) -> String {
    let out = cli(data_dir, args);
    assert!(
        out.status.success(),
        "dmc-cli {args:?} failed:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).expect("utf8 stdout")
}

fn show(data_dir: &Path) -> serde_json::Value {
    serde_json::from_str(&cli_ok(data_dir, &["state", "show"])).expect("show JSON")
}

// ── Test ──────────────────────────────────────────────────────────────────────

#[test]
fn merkle_tooling_and_state_lifecycle() {
    let ws = Workspace::new("lifecycle");
    let data_dir = ws.data_dir();
    let alice = Address::derive(b"alice");

    // ── merkle create ─────────────────────────────────────────────────────────
    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    let data: Vec<u8> = (0..3_000).map(|_| rng.gen()).collect();
    let file = ws.path("payload.bin");
    std::fs::write(&file, &data).unwrap();
    let file_arg = file.to_str().unwrap();

    let hash_line = cli_ok(&data_dir, &["merkle", "create", file_arg, "keccak256"]);
    let hash = ContentHash::from_hex(hash_line.trim()).expect("mixed hash on stdout");
    assert!(ws.path("payload.merkle").exists());
    assert!(!cli(&data_dir, &["merkle", "create", file_arg, "md5"]).status.success());

    // ── state init ────────────────────────────────────────────────────────────
    let mut params = MarketParams::default();
    params.clock.cycle_length = 100;
    params.allocations.push(Allocation { token: params.exchange.dmc_token, account: alice, amount: 10_000 * T });
    let params_path = ws.write_json("params.json", &params);
    let params_arg = params_path.to_str().unwrap();

    assert!(!cli(&data_dir, &["state", "show"]).status.success(), "show before init must fail");
    cli_ok(&data_dir, &["state", "init", "--params", params_arg]);
    assert!(!cli(&data_dir, &["state", "init", "--params", params_arg]).status.success());

    // ── fund, exchange, publish, pledge ──────────────────────────────────────
    let (dmc, gwt) = (params.exchange.dmc_token, params.exchange.gwt_token);
    let setup = vec![
        Transaction::single(params.exchange.admin, Action::EnableProdMode),
        Transaction::new(
            alice,
            vec![
                Action::Approve { token: dmc, spender: params.exchange.account, amount: u128::MAX },
                Action::DmcToGwt { dmc: 1_000 * T },
                Action::Approve { token: gwt, spender: params.storage.account, amount: u128::MAX },
                Action::CreatePublicData { hash, deposit_ratio: 64, amount: 768 * T, owner_bridge: None },
                Action::PledgeGwt { amount: 10_000 * T },
                Action::Mine { blocks: 1 },
            ],
        ),
    ];
    let events = cli_ok(&data_dir, &["state", "apply", ws.write_json("setup.json", &setup).to_str().unwrap()]);
    assert!(events.contains("ProdModeEnabled"));
    assert!(events.contains("PublicDataCreated"));

    // ── answer the challenge of block 0 ───────────────────────────────────────
    let nonce = cli_ok(&data_dir, &["state", "block-hash", "0"]);
    assert!(!cli(&data_dir, &["state", "block-hash", "1"]).status.success(), "current block is unsettled");
    let proof: serde_json::Value =
        serde_json::from_str(&cli_ok(&data_dir, &["merkle", "proof", file_arg, nonce.trim()])).unwrap();
    assert!(proof["leaf_index"].as_u64().unwrap() < 3);

    let show_action: Action = serde_json::from_value(serde_json::json!({
        "ShowData": {
            "hash": hash,
            "nonce_block": 0,
            "leaf_index": proof["leaf_index"],
            "path": proof["path"],
            "leaf": proof["leaf"],
            "mode": "Immediate",
        }
    }))
    .unwrap();
    let show_tx = ws.write_json("show.json", &Transaction::single(alice, show_action));
    let events = cli_ok(&data_dir, &["state", "apply", show_tx.to_str().unwrap()]);
    assert!(events.contains("ShowDataProof"));

    let summary = show(&data_dir);
    assert_eq!(summary["height"], 1);
    assert_eq!(summary["tx_count"], 3);
    assert_eq!(summary["exchange"]["mode"], "Production");
    assert_eq!(summary["storage"]["records"][0]["ranking"], 1);
    assert_eq!(summary["storage"]["records"][0]["last_showed_suppliers"][0], alice.to_hex());

    // ── a rejected transaction changes nothing ───────────────────────────────
    let bad = ws.write_json(
        "bad.json",
        &Transaction::new(alice, vec![Action::Mine { blocks: 50 }, Action::Unstake { amount: 5 * T }]),
    );
    let out = cli(&data_dir, &["state", "apply", bad.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("No stake record found"));
    let after = show(&data_dir);
    assert_eq!(after["height"], 1);
    assert_eq!(after["tx_count"], 3);

    let with_events: serde_json::Value =
        serde_json::from_str(&cli_ok(&data_dir, &["state", "show", "--events-from", "0"])).unwrap();
    assert_eq!(
        with_events["events"].as_array().unwrap().len() as u64,
        with_events["event_count"].as_u64().unwrap()
    );
}
