use serde::{Deserialize, Serialize};

use crate::types::{Address, Balance, BlockHeight, ContentHash, CycleIndex};

/// Which engine a cycle event belongs to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Module {
    Dividend,
    Exchange,
    Storage,
}

/// Recipient role in a cycle reward split.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RewardRole {
    Owner,
    Sponsor,
    Supplier,
}

/// Structured record of something that happened. Append-only; observers
/// read events, they never drive state from them.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    // ── Cycles ───────────────────────────────────────────────────────────────
    NewCycle { module: Module, cycle: CycleIndex },

    // ── Dividend ─────────────────────────────────────────────────────────────
    Staked { account: Address, cycle: CycleIndex, amount: Balance },
    Unstaked { account: Address, cycle: CycleIndex, amount: Balance },
    DividendDeposited { token: Address, cycle: CycleIndex, amount: Balance },
    DividendWithdrawn { account: Address, cycle: CycleIndex, token: Address, amount: Balance },

    // ── Linear release ───────────────────────────────────────────────────────
    LockStarted { id: u64, receiver: Address, token: Address, amount: Balance },
    LockWithdrawn { id: u64, receiver: Address, amount: Balance },

    // ── Exchange ─────────────────────────────────────────────────────────────
    ProdModeEnabled { cycle: CycleIndex },
    ExchangeCycle { cycle: CycleIndex, quota: Balance, stored_remainder: Balance, rate: u128 },
    DmcToGwt { account: Address, dmc: Balance, gwt: Balance },
    GwtToDmc { account: Address, gwt: Balance, dmc: Balance },
    FreeMint { account: Address, gwt: Balance },
    TestExchange { account: Address, gwt: Balance, dmc: Balance },

    // ── Public data ──────────────────────────────────────────────────────────
    PublicDataCreated { hash: ContentHash },
    SponsorChanged { hash: ContentHash, old: Address, new: Address },
    DepositData { depositor: Address, hash: ContentHash, balance_added: Balance, pool_added: Balance },
    SupplierBalanceChanged { supplier: Address, free: Balance, locked: Balance },
    ShowDataProof {
        supplier: Address,
        hash: ContentHash,
        nonce_block: BlockHeight,
        leaf_index: u64,
        proof_root: [u8; 32],
    },
    SupplierReward { supplier: Address, hash: ContentHash, amount: Balance },
    CycleRewardPaid {
        cycle: CycleIndex,
        hash: ContentHash,
        account: Address,
        role: RewardRole,
        amount: Balance,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events recorded at or after position `from`.
    pub fn since(&self, from: usize) -> &[Event] {
        &self.events[from.min(self.events.len())..]
    }

    pub fn contains(&self, event: &Event) -> bool {
        self.events.contains(event)
    }
}
