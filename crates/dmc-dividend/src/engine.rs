use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use dmc_core::cycle::{ClockConfig, CycleClock};
use dmc_core::error::DmcError;
use dmc_core::event::{Event, Module};
use dmc_core::host::Host;
use dmc_core::math::mul_div;
use dmc_core::types::{Address, Balance, CycleIndex};

use crate::stake::StakeHistory;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DividendConfig {
    /// Custody account holding stakes and undistributed dividends.
    pub account: Address,
    /// Token staked by participants.
    pub stake_token: Address,
    /// Account allowed to edit the whitelist.
    pub admin: Address,
    /// Reward tokens accepted at launch.
    pub whitelist: Vec<Address>,
}

impl Default for DividendConfig {
    fn default() -> Self {
        Self {
            account: Address::derive(b"dmc.dividend"),
            stake_token: Address::derive(b"token.dmc"),
            admin: Address::derive(b"dmc.admin"),
            whitelist: vec![Address::derive(b"token.gwt")],
        }
    }
}

// ── DividendEngine ────────────────────────────────────────────────────────────

/// Stake ledger plus per-cycle, per-token dividend pools.
///
/// A participant's share of cycle `c` is the stake it held through the whole
/// of `c` over the total held through `c`: stake added during `c` first counts
/// in `c + 1`, and unstaking past the stake added during `c` lowers the `c`
/// figure. Pools are claimable once the cycle has closed. A pool whose cycle
/// ends with nothing held through it moves into the next cycle.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DividendEngine {
    account: Address,
    stake_token: Address,
    admin: Address,
    clock: CycleClock,
    whitelist: BTreeSet<Address>,
    stakes: BTreeMap<Address, StakeHistory>,
    total_staked: StakeHistory,
    /// cycle → token → deposited amount
    balance_by_cycle: BTreeMap<CycleIndex, BTreeMap<Address, Balance>>,
    /// (account, cycle, token)
    claimed: BTreeSet<(Address, CycleIndex, Address)>,
    /// Balance per token the engine believes it holds.
    tracked: BTreeMap<Address, Balance>,
}

impl DividendEngine {
    pub fn new(config: &DividendConfig, clock: &ClockConfig) -> Result<Self, DmcError> {
        Ok(Self {
            account: config.account,
            stake_token: config.stake_token,
            admin: config.admin,
            clock: CycleClock::new(clock)?,
            whitelist: config.whitelist.iter().copied().collect(),
            stakes: BTreeMap::new(),
            total_staked: StakeHistory::new(),
            balance_by_cycle: BTreeMap::new(),
            claimed: BTreeSet::new(),
            tracked: BTreeMap::new(),
        })
    }

    pub fn account(&self) -> &Address {
        &self.account
    }

    // ── Cycles ────────────────────────────────────────────────────────────────

    fn advance(&mut self, host: &mut dyn Host) -> CycleIndex {
        if let Some(adv) = self.clock.try_advance(host.block_height()) {
            let mut cursor = adv.from;
            while let Some(cycle) = self.balance_by_cycle.range(cursor..adv.to).next().map(|(c, _)| *c) {
                if self.total_staked.start_of(cycle) == 0 {
                    self.roll_pool_forward(cycle, adv.to);
                }
                cursor = cycle + 1;
            }
            info!(from = adv.from, to = adv.to, "dividend cycle closed");
            host.emit(Event::NewCycle { module: Module::Dividend, cycle: adv.to });
        }
        self.clock.current()
    }

    /// Move an unclaimable pool into the first later cycle that starts with
    /// stake held, or into the open cycle if none has closed yet.
    fn roll_pool_forward(&mut self, cycle: CycleIndex, open: CycleIndex) {
        let Some(pool) = self.balance_by_cycle.remove(&cycle) else {
            return;
        };
        let target = self
            .total_staked
            .entries()
            .iter()
            .find(|(c, v)| *c >= cycle && *v > 0)
            .map_or(open, |(c, _)| (c + 1).min(open));
        let next = self.balance_by_cycle.entry(target).or_default();
        for (token, amount) in pool {
            info!(%token, from = cycle, to = target, amount, "dividend pool rolled forward");
            *next.entry(token).or_insert(0) += amount;
        }
    }

    /// Force-settle: close every cycle that ended before the current block.
    pub fn try_new_cycle(&mut self, host: &mut dyn Host) {
        self.advance(host);
    }

    /// Cycle containing the current block, whether or not it has been settled.
    pub fn current_cycle_index(&self, host: &dyn Host) -> CycleIndex {
        self.clock.index_at(host.block_height())
    }

    // ── Staking ───────────────────────────────────────────────────────────────

    pub fn stake(&mut self, host: &mut dyn Host, caller: &Address, amount: Balance) -> Result<(), DmcError> {
        if amount == 0 {
            return Err(DmcError::StakeZero);
        }
        host.transfer_from(&self.stake_token, &self.account, caller, &self.account, amount)?;
        let cycle = self.advance(host);

        self.stakes.entry(*caller).or_default().add(cycle, amount);
        self.total_staked.add(cycle, amount);
        *self.tracked.entry(self.stake_token).or_insert(0) += amount;

        debug!(%caller, cycle, amount, total = self.total_staked.latest(), "staked");
        host.emit(Event::Staked { account: *caller, cycle, amount });
        Ok(())
    }

    pub fn unstake(&mut self, host: &mut dyn Host, caller: &Address, amount: Balance) -> Result<(), DmcError> {
        let current = self
            .stakes
            .get(caller)
            .ok_or(DmcError::NoStakeRecord)?
            .latest();
        if amount == 0 {
            return Err(DmcError::UnstakeZero);
        }
        if amount > current {
            return Err(DmcError::InsufficientStake);
        }
        if self.total_staked.latest() < amount {
            return Err(DmcError::Invariant("total staked below account stake".into()));
        }
        let cycle = self.advance(host);

        let excess = match self.stakes.get_mut(caller) {
            Some(history) => history.remove(cycle, amount),
            None => 0,
        };
        self.total_staked.sub(cycle, amount);
        self.total_staked.cut_start(cycle, excess);
        if let Some(t) = self.tracked.get_mut(&self.stake_token) {
            *t = t.saturating_sub(amount);
        }

        host.transfer(&self.stake_token, &self.account, caller, amount)?;
        debug!(%caller, cycle, amount, total = self.total_staked.latest(), "unstaked");
        host.emit(Event::Unstaked { account: *caller, cycle, amount });
        Ok(())
    }

    /// Stake of `account` recorded for `cycle` (or now, for the open cycle).
    /// The stake earning in `cycle` is the value recorded for `cycle - 1`.
    pub fn get_stake_amount(&self, host: &dyn Host, account: &Address, cycle: CycleIndex) -> Result<Balance, DmcError> {
        if cycle > self.current_cycle_index(host) {
            return Err(DmcError::InvalidCycleIndex);
        }
        Ok(self.stakes.get(account).map(|h| h.at(cycle)).unwrap_or(0))
    }

    pub fn get_total_staked(&self, cycle: CycleIndex) -> Balance {
        self.total_staked.at(cycle)
    }

    // ── Dividends ─────────────────────────────────────────────────────────────

    pub fn deposit(
        &mut self,
        host: &mut dyn Host,
        caller: &Address,
        amount: Balance,
        token: &Address,
    ) -> Result<(), DmcError> {
        if !self.whitelist.contains(token) {
            return Err(DmcError::TokenNotWhitelisted);
        }
        if amount == 0 {
            return Err(DmcError::ZeroAmount);
        }
        host.transfer_from(token, &self.account, caller, &self.account, amount)?;
        let cycle = self.advance(host);
        self.credit_pool(host, cycle, token, amount);
        Ok(())
    }

    /// Pick up tokens sent to the custody account without `deposit` and add
    /// them to the open cycle's pool. A second call in a row is a no-op.
    pub fn update_token_balance(&mut self, host: &mut dyn Host, token: &Address) -> Result<Balance, DmcError> {
        if !self.whitelist.contains(token) {
            return Err(DmcError::TokenNotWhitelisted);
        }
        let cycle = self.advance(host);
        let actual = host.balance_of(token, &self.account);
        let tracked = self.tracked.get(token).copied().unwrap_or(0);
        if actual < tracked {
            warn!(%token, actual, tracked, "custody balance below tracked balance");
            return Ok(0);
        }
        let delta = actual - tracked;
        if delta > 0 {
            self.credit_pool(host, cycle, token, delta);
        }
        Ok(delta)
    }

    fn credit_pool(&mut self, host: &mut dyn Host, cycle: CycleIndex, token: &Address, amount: Balance) {
        *self
            .balance_by_cycle
            .entry(cycle)
            .or_default()
            .entry(*token)
            .or_insert(0) += amount;
        *self.tracked.entry(*token).or_insert(0) += amount;
        info!(%token, cycle, amount, "dividend deposited");
        host.emit(Event::DividendDeposited { token: *token, cycle, amount });
    }

    /// Claim every `(cycle, token)` pair. All pairs are checked before any
    /// is marked or paid; one bad pair rejects the whole call.
    pub fn withdraw_dividends(
        &mut self,
        host: &mut dyn Host,
        caller: &Address,
        cycles: &[CycleIndex],
        tokens: &[Address],
    ) -> Result<BTreeMap<Address, Balance>, DmcError> {
        let current = self.advance(host);

        let mut pairs: BTreeSet<(Address, CycleIndex, Address)> = BTreeSet::new();
        let mut shares: Vec<(CycleIndex, Address, Balance)> = Vec::new();
        for &cycle in cycles {
            if cycle >= current {
                return Err(DmcError::FutureOrCurrentCycle);
            }
            for token in tokens {
                let key = (*caller, cycle, *token);
                if self.claimed.contains(&key) || !pairs.insert(key) {
                    return Err(DmcError::AlreadyClaimed);
                }
                let share = self.share_of(caller, cycle, token)?;
                shares.push((cycle, *token, share));
            }
        }

        let mut paid: BTreeMap<Address, Balance> = BTreeMap::new();
        for (_, token, share) in &shares {
            if *share > 0 {
                let total = paid.entry(*token).or_insert(0);
                *total = total.checked_add(*share).ok_or(DmcError::Overflow)?;
            }
        }
        for (token, amount) in &paid {
            let tracked = self.tracked.get(token).copied().unwrap_or(0);
            if tracked < *amount || host.balance_of(token, &self.account) < *amount {
                return Err(DmcError::Invariant(format!("dividend payout exceeds custody of {token}")));
            }
        }

        self.claimed.extend(pairs);
        for (token, amount) in &paid {
            if let Some(t) = self.tracked.get_mut(token) {
                *t -= *amount;
            }
        }
        for (token, amount) in &paid {
            host.transfer(token, &self.account, caller, *amount)?;
        }
        for (cycle, token, amount) in shares {
            debug!(%caller, cycle, %token, amount, "dividend withdrawn");
            host.emit(Event::DividendWithdrawn { account: *caller, cycle, token, amount });
        }
        Ok(paid)
    }

    /// `pool × stake / total` over the stake held through `cycle`, floored.
    /// Zero when nobody held stake through it.
    fn share_of(&self, account: &Address, cycle: CycleIndex, token: &Address) -> Result<Balance, DmcError> {
        let pool = self.cycle_balance(cycle, token);
        let total = self.total_staked.start_of(cycle);
        let stake = self.stakes.get(account).map(|h| h.start_of(cycle)).unwrap_or(0);
        if pool == 0 || total == 0 || stake == 0 {
            return Ok(0);
        }
        debug_assert!(stake <= total);
        mul_div(pool, stake, total)
    }

    pub fn cycle_balance(&self, cycle: CycleIndex, token: &Address) -> Balance {
        self.balance_by_cycle
            .get(&cycle)
            .and_then(|m| m.get(token))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_dividend_withdrawn(&self, account: &Address, cycle: CycleIndex, token: &Address) -> bool {
        self.claimed.contains(&(*account, cycle, *token))
    }

    // ── Whitelist ─────────────────────────────────────────────────────────────

    pub fn is_whitelisted(&self, token: &Address) -> bool {
        self.whitelist.contains(token)
    }

    pub fn add_token_to_whitelist(&mut self, caller: &Address, tokens: &[Address]) -> Result<(), DmcError> {
        self.require_admin(caller)?;
        for token in tokens {
            if self.whitelist.insert(*token) {
                info!(%token, "token whitelisted");
            }
        }
        Ok(())
    }

    /// Past pools of a removed token stay claimable.
    pub fn remove_token_from_whitelist(&mut self, caller: &Address, tokens: &[Address]) -> Result<(), DmcError> {
        self.require_admin(caller)?;
        for token in tokens {
            if self.whitelist.remove(token) {
                info!(%token, "token removed from whitelist");
            }
        }
        Ok(())
    }

    fn require_admin(&self, caller: &Address) -> Result<(), DmcError> {
        if *caller != self.admin {
            return Err(DmcError::NotAdmin);
        }
        Ok(())
    }
}
