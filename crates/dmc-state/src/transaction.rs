use serde::{Deserialize, Serialize};

use dmc_core::types::{Address, Balance, ContentHash, CycleIndex};
use dmc_crypto::hash::HalfHash;
use dmc_storage::ShowMode;

// ── Action ────────────────────────────────────────────────────────────────────

/// Every state-changing operation on the market is one of these variants.
/// The acting account is the transaction's `caller`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Action {
    // ── Chain ────────────────────────────────────────────────────────────────

    /// Advance the simulated chain.
    Mine { blocks: u64 },

    /// Let `spender` pull up to `amount` of the caller's `token`.
    Approve { token: Address, spender: Address, amount: Balance },

    Transfer { token: Address, to: Address, amount: Balance },

    /// Record `owner` for `hash` in the ownership registry at `bridge`.
    SetBridgeOwner { bridge: Address, hash: ContentHash, owner: Address },

    /// Run pending cycle close-outs without any other effect.
    TryNewCycle,

    // ── Dividend ─────────────────────────────────────────────────────────────

    Stake { amount: Balance },

    Unstake { amount: Balance },

    DepositDividend { token: Address, amount: Balance },

    UpdateTokenBalance { token: Address },

    WithdrawDividends { cycles: Vec<CycleIndex>, tokens: Vec<Address> },

    AddTokenToWhitelist { tokens: Vec<Address> },

    RemoveTokenFromWhitelist { tokens: Vec<Address> },

    // ── Linear release ───────────────────────────────────────────────────────

    /// Lock `amount` of `token` for `receiver`: `first_release` unlocks after
    /// `first_duration` blocks, the rest linearly until `total_duration`.
    StartLock {
        token: Address,
        amount: Balance,
        receiver: Address,
        first_duration: u64,
        first_release: Balance,
        total_duration: u64,
    },

    WithdrawLock { id: u64 },

    // ── Exchange ─────────────────────────────────────────────────────────────

    EnableProdMode,

    AddFreeMintBalance { amount: Balance },

    AddFreeDmcTestMintBalance { amount: Balance },

    FreeMintGwt,

    GwtToDmcForTest { gwt: Balance },

    DmcToGwt { dmc: Balance },

    GwtToDmc { gwt: Balance },

    // ── Public data ──────────────────────────────────────────────────────────

    CreatePublicData {
        hash: ContentHash,
        deposit_ratio: u64,
        amount: Balance,
        #[serde(default)]
        owner_bridge: Option<Address>,
    },

    AddDeposit { hash: ContentHash, amount: Balance },

    PledgeGwt { amount: Balance },

    UnpledgeGwt { amount: Balance },

    /// Answer the challenge of `nonce_block` for `hash`.
    ShowData {
        hash: ContentHash,
        nonce_block: u64,
        leaf_index: u64,
        #[serde(with = "hex_halves")]
        path: Vec<HalfHash>,
        #[serde(with = "hex_bytes")]
        leaf: Vec<u8>,
        mode: ShowMode,
    },

    WithdrawShow { hash: ContentHash },

    WithdrawCycleReward { cycle: CycleIndex, hash: ContentHash },

    SetBoardCapacity { capacity: usize },
}

// ── Transaction ───────────────────────────────────────────────────────────────

/// A batch of actions by one caller, applied all-or-nothing.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub caller: Address,
    pub actions: Vec<Action>,
}

impl Transaction {
    pub fn new(caller: Address, actions: Vec<Action>) -> Self {
        Self { caller, actions }
    }

    pub fn single(caller: Address, action: Action) -> Self {
        Self { caller, actions: vec![action] }
    }
}

// ── Hex encodings for proof bytes ─────────────────────────────────────────────

mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(de::Error::custom)
    }
}

mod hex_halves {
    use dmc_crypto::hash::HalfHash;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(path: &[HalfHash], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(path.iter().map(|h| format!("0x{}", hex::encode(h))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<HalfHash>, D::Error> {
        let items = Vec::<String>::deserialize(deserializer)?;
        items
            .iter()
            .map(|s| {
                let mut out = [0u8; 16];
                hex::decode_to_slice(s.strip_prefix("0x").unwrap_or(s), &mut out)
                    .map_err(de::Error::custom)?;
                Ok(out)
            })
            .collect()
    }
}
