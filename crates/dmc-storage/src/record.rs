use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use dmc_core::constants::MAX_SHOWED_SUPPLIERS;
use dmc_core::types::{Address, Balance, BlockHeight, ContentHash};

/// How a show is settled.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShowMode {
    /// Paid in the same call; needs twice the lock as free collateral.
    Immediate,
    /// Locks collateral; paid by `withdraw_show` after the show timeout.
    Deferred,
}

/// The most recent show of a record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShowRecord {
    pub supplier: Address,
    pub show_block: BlockHeight,
    pub nonce_block: BlockHeight,
    pub leaf_index: u64,
    pub proof_root: [u8; 32],
    /// Collateral held until the show resolves.
    pub locked: Balance,
    pub resolved: bool,
}

impl ShowRecord {
    pub fn is_pending(&self) -> bool {
        !self.resolved
    }

    pub fn age(&self, now: BlockHeight) -> u64 {
        now.saturating_sub(self.show_block)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicDataRecord {
    pub hash: ContentHash,
    pub owner: Address,
    pub sponsor: Address,
    pub owner_bridge: Option<Address>,
    pub deposit_ratio: u64,
    pub total_deposit: Balance,
    /// Reward-bearing part of the deposits.
    pub balance: Balance,
    pub score: u128,
    pub depositors: BTreeMap<Address, Balance>,
    /// Most recent distinct suppliers, oldest first.
    pub last_showed_suppliers: Vec<Address>,
    pub last_show: Option<ShowRecord>,
}

impl PublicDataRecord {
    pub fn deposit_of(&self, account: &Address) -> Balance {
        self.depositors.get(account).copied().unwrap_or(0)
    }

    /// Largest cumulative deposit of any single depositor.
    pub fn max_deposit(&self) -> Balance {
        self.depositors.values().copied().max().unwrap_or(0)
    }

    /// Move `supplier` to the newest slot, evicting the oldest beyond the limit.
    pub fn note_supplier(&mut self, supplier: Address) {
        self.last_showed_suppliers.retain(|s| *s != supplier);
        self.last_showed_suppliers.push(supplier);
        if self.last_showed_suppliers.len() > MAX_SHOWED_SUPPLIERS {
            let excess = self.last_showed_suppliers.len() - MAX_SHOWED_SUPPLIERS;
            self.last_showed_suppliers.drain(..excess);
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupplierAccount {
    pub pledged: Balance,
    pub locked: Balance,
    /// Records with an unresolved show by this supplier.
    pub pending: BTreeSet<ContentHash>,
}

impl SupplierAccount {
    pub fn free(&self) -> Balance {
        self.pledged - self.locked
    }
}
