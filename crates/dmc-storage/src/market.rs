use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use dmc_core::constants::{
    DEFAULT_BOARD_CAPACITY, DEFAULT_MAX_NONCE_BLOCK_DISTANCE, DEFAULT_SHOW_TIMEOUT,
    DEPOSIT_BALANCE_PERCENT, DEPOSIT_WEEKS, IMMEDIATE_COLLATERAL_FACTOR,
    MERKLE_LEAF_SIZE, MIN_DEPOSIT_RATIO, PERCENT, SHOW_LOCK_WEEKS, SHOW_REWARD_PERCENT,
    SUPPLIER_REWARD_PERCENT, TOKEN_UNIT,
};
use dmc_core::cycle::{ClockConfig, CycleClock};
use dmc_core::error::DmcError;
use dmc_core::event::{Event, Module, RewardRole};
use dmc_core::host::Host;
use dmc_core::math::mul_div;
use dmc_core::types::{Address, Balance, BlockHeight, ContentHash, CycleIndex};
use dmc_crypto::hash::HalfHash;
use dmc_crypto::merkle::{nonce_leaf, root_from_path};
use dmc_crypto::mixhash;

use crate::board::SortedScoreBoard;
use crate::record::{PublicDataRecord, ShowMode, ShowRecord, SupplierAccount};
use crate::reward::{CycleSnapshot, RewardSplit};

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Custody account for deposits, pledges and the cycle pools.
    pub account: Address,
    pub gwt_token: Address,
    pub admin: Address,
    pub board_capacity: usize,
    pub show_timeout: u64,
    pub max_nonce_block_distance: u64,
    pub min_deposit_ratio: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            account: Address::derive(b"dmc.storage"),
            gwt_token: Address::derive(b"token.gwt"),
            admin: Address::derive(b"dmc.admin"),
            board_capacity: DEFAULT_BOARD_CAPACITY,
            show_timeout: DEFAULT_SHOW_TIMEOUT,
            max_nonce_block_distance: DEFAULT_MAX_NONCE_BLOCK_DISTANCE,
            min_deposit_ratio: MIN_DEPOSIT_RATIO,
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), DmcError> {
        if self.board_capacity == 0 {
            return Err(DmcError::InvalidConfig("board_capacity must be non-zero".into()));
        }
        if self.min_deposit_ratio == 0 {
            return Err(DmcError::InvalidConfig("min_deposit_ratio must be non-zero".into()));
        }
        if self.max_nonce_block_distance == 0 {
            return Err(DmcError::InvalidConfig("max_nonce_block_distance must be non-zero".into()));
        }
        Ok(())
    }
}

// ── Sizing ────────────────────────────────────────────────────────────────────

/// GWT covering `weeks` of storage for `hash` at `ratio`.
fn weeks_of_storage(hash: &ContentHash, weeks: u128, ratio: u64) -> Result<Balance, DmcError> {
    score_unit(hash, ratio)?
        .checked_mul(weeks)
        .and_then(|v| v.checked_mul(TOKEN_UNIT))
        .map(|v| v / 8)
        .ok_or(DmcError::Overflow)
}

pub fn min_deposit(hash: &ContentHash, ratio: u64) -> Result<Balance, DmcError> {
    weeks_of_storage(hash, DEPOSIT_WEEKS, ratio)
}

pub fn required_lock(hash: &ContentHash, ratio: u64) -> Result<Balance, DmcError> {
    weeks_of_storage(hash, SHOW_LOCK_WEEKS, ratio)
}

/// Score gained by one show.
fn score_unit(hash: &ContentHash, ratio: u64) -> Result<u128, DmcError> {
    mixhash::size_eighths(hash)
        .checked_mul(u128::from(ratio))
        .ok_or(DmcError::Overflow)
}

// ── DataStorageMarket ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataStorageMarket {
    config: StorageConfig,
    clock: CycleClock,
    records: BTreeMap<ContentHash, PublicDataRecord>,
    suppliers: BTreeMap<Address, SupplierAccount>,
    board: SortedScoreBoard,
    /// Pool collected during each cycle.
    cycle_pools: BTreeMap<CycleIndex, Balance>,
    snapshots: BTreeMap<CycleIndex, CycleSnapshot>,
}

impl DataStorageMarket {
    pub fn new(config: &StorageConfig, clock: &ClockConfig) -> Result<Self, DmcError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            clock: CycleClock::new(clock)?,
            records: BTreeMap::new(),
            suppliers: BTreeMap::new(),
            board: SortedScoreBoard::new(config.board_capacity),
            cycle_pools: BTreeMap::new(),
            snapshots: BTreeMap::new(),
        })
    }

    pub fn account(&self) -> &Address {
        &self.config.account
    }

    // ── Cycles ────────────────────────────────────────────────────────────────

    /// Freeze the board with the pool of every cycle that closed. A closed
    /// cycle without a pool keeps no snapshot and pays nothing.
    fn advance(&mut self, host: &mut dyn Host) -> CycleIndex {
        if let Some(adv) = self.clock.try_advance(host.block_height()) {
            let pooled: Vec<(CycleIndex, Balance)> =
                self.cycle_pools.range(adv.closed()).map(|(c, p)| (*c, *p)).collect();
            for (cycle, pool) in pooled {
                let records = &self.records;
                let snapshot = CycleSnapshot::capture(&self.board, pool, |hash| {
                    records
                        .get(hash)
                        .map(|r| (r.sponsor, r.last_showed_suppliers.clone()))
                });
                info!(
                    cycle,
                    pool,
                    entries = snapshot.entries.len(),
                    total_score = snapshot.total_score,
                    "storage cycle closed"
                );
                self.snapshots.insert(cycle, snapshot);
            }
            host.emit(Event::NewCycle { module: Module::Storage, cycle: adv.to });
        }
        self.clock.current()
    }

    pub fn try_new_cycle(&mut self, host: &mut dyn Host) {
        self.advance(host);
    }

    fn add_to_pool(&mut self, cycle: CycleIndex, amount: Balance) {
        if amount > 0 {
            *self.cycle_pools.entry(cycle).or_insert(0) += amount;
        }
    }

    /// Split a deposit into record balance and cycle pool.
    fn credit_deposit(
        &mut self,
        host: &mut dyn Host,
        cycle: CycleIndex,
        depositor: &Address,
        hash: &ContentHash,
        amount: Balance,
    ) -> Result<(), DmcError> {
        let balance_added = mul_div(amount, DEPOSIT_BALANCE_PERCENT, PERCENT)?;
        let pool_added = amount - balance_added;
        let record = self.records.get_mut(hash).ok_or(DmcError::NotExist)?;
        record.total_deposit += amount;
        record.balance += balance_added;
        *record.depositors.entry(*depositor).or_insert(0) += amount;
        self.add_to_pool(cycle, pool_added);
        host.emit(Event::DepositData {
            depositor: *depositor,
            hash: *hash,
            balance_added,
            pool_added,
        });
        Ok(())
    }

    // ── Public data ───────────────────────────────────────────────────────────

    pub fn create_public_data(
        &mut self,
        host: &mut dyn Host,
        caller: &Address,
        hash: ContentHash,
        deposit_ratio: u64,
        amount: Balance,
        owner_bridge: Option<Address>,
    ) -> Result<(), DmcError> {
        if hash.is_zero() {
            return Err(DmcError::DataHashEmpty);
        }
        if self.records.contains_key(&hash) {
            return Err(DmcError::AlreadyExists);
        }
        if deposit_ratio < self.config.min_deposit_ratio {
            return Err(DmcError::RatioTooSmall);
        }
        mixhash::hash_type(&hash)?;
        let min = min_deposit(&hash, deposit_ratio)?;
        if amount < min {
            return Err(DmcError::DepositTooSmall { min });
        }
        let score = mul_div(score_unit(&hash, deposit_ratio)?, amount, min)?;

        host.transfer_from(&self.config.gwt_token, &self.config.account, caller, &self.config.account, amount)?;
        let cycle = self.advance(host);

        self.records.insert(
            hash,
            PublicDataRecord {
                hash,
                owner: *caller,
                sponsor: *caller,
                owner_bridge,
                deposit_ratio,
                total_deposit: 0,
                balance: 0,
                score,
                depositors: BTreeMap::new(),
                last_showed_suppliers: Vec::new(),
                last_show: None,
            },
        );
        host.emit(Event::PublicDataCreated { hash });
        host.emit(Event::SponsorChanged { hash, old: Address::ZERO, new: *caller });
        self.credit_deposit(host, cycle, caller, &hash, amount)?;
        self.board.add_score(hash, score);

        info!(%hash, owner = %caller, deposit_ratio, amount, score, "public data created");
        Ok(())
    }

    /// Add to a record's deposit. The caller becomes sponsor once its
    /// cumulative deposit strictly exceeds the current sponsor's.
    pub fn add_deposit(
        &mut self,
        host: &mut dyn Host,
        caller: &Address,
        hash: &ContentHash,
        amount: Balance,
    ) -> Result<Balance, DmcError> {
        if !self.records.contains_key(hash) {
            return Err(DmcError::NotExist);
        }
        if amount == 0 {
            return Err(DmcError::ZeroAmount);
        }

        host.transfer_from(&self.config.gwt_token, &self.config.account, caller, &self.config.account, amount)?;
        let cycle = self.advance(host);
        self.credit_deposit(host, cycle, caller, hash, amount)?;

        let record = self.records.get_mut(hash).ok_or(DmcError::NotExist)?;
        let old = record.sponsor;
        if old != *caller && record.deposit_of(caller) > record.deposit_of(&old) {
            record.sponsor = *caller;
            info!(%hash, %old, new = %caller, "sponsor changed");
            host.emit(Event::SponsorChanged { hash: *hash, old, new: *caller });
        }
        debug_assert_eq!(record.deposit_of(&record.sponsor), record.max_deposit());
        Ok(amount)
    }

    // ── Supplier collateral ───────────────────────────────────────────────────

    pub fn pledge_gwt(&mut self, host: &mut dyn Host, caller: &Address, amount: Balance) -> Result<(), DmcError> {
        if amount == 0 {
            return Err(DmcError::ZeroAmount);
        }
        host.transfer_from(&self.config.gwt_token, &self.config.account, caller, &self.config.account, amount)?;
        self.advance(host);
        let supplier = self.suppliers.entry(*caller).or_default();
        supplier.pledged += amount;
        let (free, locked) = (supplier.free(), supplier.locked);
        debug!(supplier = %caller, amount, free, locked, "gwt pledged");
        host.emit(Event::SupplierBalanceChanged { supplier: *caller, free, locked });
        Ok(())
    }

    /// Withdraw unlocked collateral.
    pub fn unpledge_gwt(&mut self, host: &mut dyn Host, caller: &Address, amount: Balance) -> Result<(), DmcError> {
        if amount == 0 {
            return Err(DmcError::ZeroAmount);
        }
        self.advance(host);
        let supplier = self.suppliers.get_mut(caller).ok_or(DmcError::InsufficientCollateral {
            need: amount,
            free: 0,
        })?;
        let free = supplier.free();
        if free < amount {
            return Err(DmcError::InsufficientCollateral { need: amount, free });
        }
        supplier.pledged -= amount;
        let (free, locked) = (supplier.free(), supplier.locked);

        host.transfer(&self.config.gwt_token, &self.config.account, caller, amount)?;
        debug!(supplier = %caller, amount, free, locked, "gwt unpledged");
        host.emit(Event::SupplierBalanceChanged { supplier: *caller, free, locked });
        Ok(())
    }

    // ── Shows ─────────────────────────────────────────────────────────────────

    /// Prove possession of `hash` against the entropy of `nonce_block`.
    ///
    /// `merkle_path` and `leaf` must rebuild the record's root; the proof
    /// root recorded for the show is rebuilt from `leaf ++ blockHash(nonce)`.
    #[allow(clippy::too_many_arguments)]
    pub fn show_data(
        &mut self,
        host: &mut dyn Host,
        caller: &Address,
        hash: &ContentHash,
        nonce_block: BlockHeight,
        leaf_index: u64,
        merkle_path: &[HalfHash],
        leaf: &[u8],
        mode: ShowMode,
    ) -> Result<[u8; 32], DmcError> {
        let record = self.records.get(hash).ok_or(DmcError::NotExist)?;
        let now = host.block_height();
        if nonce_block >= now {
            return Err(DmcError::NonceNotFinalized);
        }
        if now - nonce_block > self.config.max_nonce_block_distance {
            return Err(DmcError::NonceTooOld);
        }
        let nonce = host.block_hash(nonce_block).ok_or(DmcError::NonceTooOld)?;

        // a younger pending show blocks; an older one is settled below
        let mut settle_previous = false;
        if let Some(last) = record.last_show.as_ref().filter(|s| s.is_pending()) {
            if last.age(now) < self.config.show_timeout {
                return Err(DmcError::ShowPending);
            }
            settle_previous = true;
        }

        let hash_type = mixhash::hash_type(hash)?;
        let leaf_count = mixhash::data_length(hash).div_ceil(MERKLE_LEAF_SIZE as u64).max(1);
        if leaf.len() != MERKLE_LEAF_SIZE || leaf_index >= leaf_count {
            return Err(DmcError::InvalidProof);
        }
        let root = root_from_path(hash_type, merkle_path, leaf_index, leaf);
        if !mixhash::root_matches(hash, &root) {
            return Err(DmcError::InvalidProof);
        }
        let proof_root = root_from_path(hash_type, merkle_path, leaf_index, &nonce_leaf(leaf, &nonce));

        let lock = required_lock(hash, record.deposit_ratio)?;
        let gained = score_unit(hash, record.deposit_ratio)?;
        let score = record.score.checked_add(gained).ok_or(DmcError::Overflow)?;
        let released = match &record.last_show {
            Some(last) if settle_previous && last.supplier == *caller => last.locked,
            _ => 0,
        };
        let free = self.suppliers.get(caller).map(|s| s.free()).unwrap_or(0) + released;
        let need = match mode {
            ShowMode::Immediate => lock.checked_mul(IMMEDIATE_COLLATERAL_FACTOR).ok_or(DmcError::Overflow)?,
            ShowMode::Deferred => lock,
        };
        if free < need {
            return Err(DmcError::InsufficientCollateral { need, free });
        }

        // ── Effects ───────────────────────────────────────────────────────────
        let cycle = self.advance(host);
        let mut payouts: Vec<(Address, Balance)> = Vec::new();
        if settle_previous {
            payouts.push(self.settle_show(host, cycle, hash)?);
        }

        let show = ShowRecord {
            supplier: *caller,
            show_block: now,
            nonce_block,
            leaf_index,
            proof_root,
            locked: if mode == ShowMode::Deferred { lock } else { 0 },
            resolved: false,
        };
        let record = self.records.get_mut(hash).ok_or(DmcError::NotExist)?;
        record.last_show = Some(show);
        record.note_supplier(*caller);
        record.score = score;
        self.board.add_score(*hash, score);

        host.emit(Event::ShowDataProof {
            supplier: *caller,
            hash: *hash,
            nonce_block,
            leaf_index,
            proof_root,
        });

        match mode {
            ShowMode::Deferred => {
                let supplier = self.suppliers.entry(*caller).or_default();
                supplier.locked += lock;
                supplier.pending.insert(*hash);
                let (free, locked) = (supplier.free(), supplier.locked);
                host.emit(Event::SupplierBalanceChanged { supplier: *caller, free, locked });
            }
            ShowMode::Immediate => {
                payouts.push(self.settle_show(host, cycle, hash)?);
            }
        }
        info!(%hash, supplier = %caller, nonce_block, leaf_index, ?mode, score, "data shown");

        for (to, amount) in payouts {
            if amount > 0 {
                host.transfer(&self.config.gwt_token, &self.config.account, &to, amount)?;
            }
        }
        Ok(proof_root)
    }

    /// Claim a matured deferred show: pays the reward and releases the lock.
    pub fn withdraw_show(&mut self, host: &mut dyn Host, caller: &Address, hash: &ContentHash) -> Result<Balance, DmcError> {
        let record = self.records.get(hash).ok_or(DmcError::NotExist)?;
        let last = match &record.last_show {
            Some(last) if last.supplier == *caller => last,
            _ => return Err(DmcError::ShowNotFound),
        };
        if !last.is_pending() {
            return Err(DmcError::AlreadyWithdrawn);
        }
        if last.age(host.block_height()) < self.config.show_timeout {
            return Err(DmcError::ShowNotMatured);
        }

        let cycle = self.advance(host);
        let (to, amount) = self.settle_show(host, cycle, hash)?;
        if amount > 0 {
            host.transfer(&self.config.gwt_token, &self.config.account, &to, amount)?;
        }
        Ok(amount)
    }

    /// Resolve the pending show of `hash`: take the reward out of the record
    /// balance, release the lock and return the supplier's payout.
    fn settle_show(
        &mut self,
        host: &mut dyn Host,
        cycle: CycleIndex,
        hash: &ContentHash,
    ) -> Result<(Address, Balance), DmcError> {
        let record = self.records.get_mut(hash).ok_or(DmcError::NotExist)?;
        let show = record
            .last_show
            .as_mut()
            .filter(|s| s.is_pending())
            .ok_or(DmcError::ShowNotFound)?;
        show.resolved = true;
        let supplier_addr = show.supplier;
        let released = std::mem::take(&mut show.locked);

        let reward = mul_div(record.balance, SHOW_REWARD_PERCENT, PERCENT)?;
        record.balance -= reward;
        let to_supplier = mul_div(reward, SUPPLIER_REWARD_PERCENT, PERCENT)?;
        self.add_to_pool(cycle, reward - to_supplier);

        if released > 0 {
            let supplier = self
                .suppliers
                .get_mut(&supplier_addr)
                .ok_or_else(|| DmcError::Invariant("locked show without supplier account".into()))?;
            if supplier.locked < released {
                return Err(DmcError::Invariant("supplier lock below show lock".into()));
            }
            supplier.locked -= released;
            supplier.pending.remove(hash);
            let (free, locked) = (supplier.free(), supplier.locked);
            host.emit(Event::SupplierBalanceChanged { supplier: supplier_addr, free, locked });
        }

        debug!(%hash, supplier = %supplier_addr, reward, to_supplier, released, "show settled");
        host.emit(Event::SupplierReward { supplier: supplier_addr, hash: *hash, amount: reward });
        Ok((supplier_addr, to_supplier))
    }

    // ── Cycle rewards ─────────────────────────────────────────────────────────

    /// Pay a record's share of a closed cycle's pool to its owner, sponsor and
    /// recent suppliers. Anyone may trigger it; each `(cycle, hash)` pays once.
    pub fn withdraw_cycle_reward(
        &mut self,
        host: &mut dyn Host,
        cycle: CycleIndex,
        hash: &ContentHash,
    ) -> Result<Balance, DmcError> {
        let current = self.advance(host);
        if cycle >= current {
            return Err(DmcError::FutureOrCurrentCycle);
        }
        let owner = self.data_owner(&*host, hash).ok_or(DmcError::NotExist)?;
        let Some(snapshot) = self.snapshots.get_mut(&cycle) else {
            debug!(%hash, cycle, "no pool for closed cycle");
            return Ok(0);
        };
        let entry = snapshot.entries.get(hash).cloned().ok_or(DmcError::NotFound)?;
        if snapshot.claimed.contains(hash) {
            return Err(DmcError::RewardAlreadyWithdrawn);
        }
        let share = snapshot.share_of(hash)?;

        let split = RewardSplit::new(share, entry.suppliers.len());
        let mut payouts = vec![(owner, RewardRole::Owner, split.owner), (entry.sponsor, RewardRole::Sponsor, split.sponsor)];
        payouts.extend(
            entry
                .suppliers
                .iter()
                .map(|s| (*s, RewardRole::Supplier, split.per_supplier)),
        );

        payouts.retain(|(_, _, amount)| *amount > 0);
        let paid: Balance = payouts.iter().map(|(_, _, amount)| *amount).sum();
        if paid > share {
            warn!(%hash, cycle, paid, share, "cycle reward exceeds share");
            return Err(DmcError::Invariant("cycle reward exceeds share".into()));
        }
        if host.balance_of(&self.config.gwt_token, &self.config.account) < paid {
            return Err(DmcError::Invariant("cycle reward exceeds custody balance".into()));
        }
        snapshot.claimed.insert(*hash);

        for (account, role, amount) in payouts {
            host.transfer(&self.config.gwt_token, &self.config.account, &account, amount)?;
            host.emit(Event::CycleRewardPaid { cycle, hash: *hash, account, role, amount });
        }
        info!(%hash, cycle, share, paid, "cycle reward withdrawn");
        Ok(paid)
    }

    // ── Administration ────────────────────────────────────────────────────────

    pub fn set_board_capacity(&mut self, caller: &Address, capacity: usize) -> Result<(), DmcError> {
        if *caller != self.config.admin {
            return Err(DmcError::NotAdmin);
        }
        self.board.set_max_len(capacity)?;
        info!(capacity, "score board capacity raised");
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn public_data(&self, hash: &ContentHash) -> Option<&PublicDataRecord> {
        self.records.get(hash)
    }

    pub fn data_balance(&self, hash: &ContentHash) -> Balance {
        self.records.get(hash).map(|r| r.balance).unwrap_or(0)
    }

    /// Owner according to the record's bridge when it has one, else the creator.
    pub fn data_owner(&self, host: &dyn Host, hash: &ContentHash) -> Option<Address> {
        let record = self.records.get(hash)?;
        let bridged = record.owner_bridge.and_then(|b| host.owner_of(&b, hash));
        Some(bridged.unwrap_or(record.owner))
    }

    pub fn supplier(&self, account: &Address) -> Option<&SupplierAccount> {
        self.suppliers.get(account)
    }

    pub fn ranking(&self, hash: &ContentHash) -> Result<usize, DmcError> {
        self.board.get_ranking(hash)
    }

    pub fn board(&self) -> &SortedScoreBoard {
        &self.board
    }

    pub fn cycle_pool(&self, cycle: CycleIndex) -> Balance {
        self.cycle_pools.get(&cycle).copied().unwrap_or(0)
    }

    pub fn cycle_snapshot(&self, cycle: CycleIndex) -> Option<&CycleSnapshot> {
        self.snapshots.get(&cycle)
    }

    pub fn current_cycle_index(&self, host: &dyn Host) -> CycleIndex {
        self.clock.index_at(host.block_height())
    }

    pub fn records(&self) -> impl Iterator<Item = &PublicDataRecord> {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmc_crypto::hash::HashType;

    fn hash_of_len(len: u64) -> ContentHash {
        mixhash::pack(&[0x11; 32], len, HashType::Sha256)
    }

    #[test]
    fn sizing_matches_reference_numbers() {
        let h = hash_of_len(4096);
        assert_eq!(min_deposit(&h, 64), Ok(768 * TOKEN_UNIT));
        assert_eq!(required_lock(&h, 64), Ok(192 * TOKEN_UNIT));
        assert_eq!(min_deposit(&hash_of_len(1 << 30), 48), Ok(8 * 96 * 48 * TOKEN_UNIT / 8));
    }

    #[test]
    fn oversized_ratio_overflows_cleanly() {
        let h = hash_of_len(4096);
        assert_eq!(min_deposit(&h, u64::MAX), Err(DmcError::Overflow));
        assert_eq!(required_lock(&h, u64::MAX), Err(DmcError::Overflow));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let cfg = StorageConfig { board_capacity: 0, ..StorageConfig::default() };
        assert!(matches!(
            DataStorageMarket::new(&cfg, &ClockConfig::default()),
            Err(DmcError::InvalidConfig(_))
        ));
    }
}
