//! In-memory execution environment.
//!
//! `MemoryChain` is the reference [`Host`]: a set of fungible tokens with
//! balances, allowances and minters, a monotonic block height with
//! deterministic block-hash entropy, ownership-bridge registries, and the
//! event log. It is fully serializable so it can be persisted together with
//! the engines it serves.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::constants::BLOCK_HASH_WINDOW;
use crate::error::DmcError;
use crate::event::{Event, EventLog};
use crate::host::Host;
use crate::types::{Address, Balance, BlockHeight, ContentHash};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenState {
    pub balances: BTreeMap<Address, Balance>,
    /// owner → spender → remaining allowance
    pub allowances: BTreeMap<Address, BTreeMap<Address, Balance>>,
    pub minters: BTreeSet<Address>,
    pub total_supply: Balance,
}

impl TokenState {
    fn balance(&self, account: &Address) -> Balance {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Balance {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: Balance) -> Result<(), DmcError> {
        let have = self.balance(from);
        if have < amount {
            return Err(DmcError::InsufficientBalance);
        }
        self.balances.insert(*from, have - amount);
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }

    /// New units for `to`. Fails before touching anything if the supply would overflow.
    fn add_supply(&mut self, to: &Address, amount: Balance) -> Result<(), DmcError> {
        let supply = self.total_supply.checked_add(amount).ok_or(DmcError::Overflow)?;
        *self.balances.entry(*to).or_insert(0) += amount;
        self.total_supply = supply;
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryChain {
    height: BlockHeight,
    entropy_seed: [u8; 32],
    tokens: BTreeMap<Address, TokenState>,
    /// bridge address → content hash → owner
    bridges: BTreeMap<Address, BTreeMap<ContentHash, Address>>,
    events: EventLog,
}

impl MemoryChain {
    pub fn new(entropy_seed: [u8; 32]) -> Self {
        Self { entropy_seed, ..Default::default() }
    }

    // ── Blocks ───────────────────────────────────────────────────────────────

    /// Advance the chain by `blocks`. The height saturates at `u64::MAX`.
    pub fn mine(&mut self, blocks: u64) {
        self.height = self.height.saturating_add(blocks);
    }

    pub fn set_height(&mut self, height: BlockHeight) {
        debug_assert!(height >= self.height, "block height is monotonic");
        self.height = self.height.max(height);
    }

    fn derive_block_hash(&self, height: BlockHeight) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.entropy_seed);
        hasher.update(&height.to_be_bytes());
        *hasher.finalize().as_bytes()
    }

    // ── Tokens ───────────────────────────────────────────────────────────────

    pub fn create_token(&mut self, token: Address, minters: &[Address]) {
        let state = self.tokens.entry(token).or_default();
        state.minters.extend(minters.iter().copied());
    }

    pub fn add_minter(&mut self, token: &Address, minter: Address) -> Result<(), DmcError> {
        self.token_mut(token)?.minters.insert(minter);
        Ok(())
    }

    /// Create tokens out of thin air, bypassing minter checks (genesis/test funding).
    pub fn credit(&mut self, token: &Address, to: &Address, amount: Balance) -> Result<(), DmcError> {
        self.token_mut(token)?.add_supply(to, amount)
    }

    pub fn approve(
        &mut self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: Balance,
    ) -> Result<(), DmcError> {
        self.token_mut(token)?
            .allowances
            .entry(*owner)
            .or_default()
            .insert(*spender, amount);
        Ok(())
    }

    pub fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Balance {
        self.tokens
            .get(token)
            .map(|t| t.allowance(owner, spender))
            .unwrap_or(0)
    }

    pub fn total_supply(&self, token: &Address) -> Balance {
        self.tokens.get(token).map(|t| t.total_supply).unwrap_or(0)
    }

    fn token_mut(&mut self, token: &Address) -> Result<&mut TokenState, DmcError> {
        self.tokens
            .get_mut(token)
            .ok_or_else(|| DmcError::UnknownToken(token.to_string()))
    }

    // ── Bridges ──────────────────────────────────────────────────────────────

    pub fn set_bridge_owner(&mut self, bridge: Address, hash: ContentHash, owner: Address) {
        self.bridges.entry(bridge).or_default().insert(hash, owner);
    }

    // ── Events ───────────────────────────────────────────────────────────────

    pub fn events(&self) -> &EventLog {
        &self.events
    }
}

impl Host for MemoryChain {
    fn block_height(&self) -> BlockHeight {
        self.height
    }

    fn block_hash(&self, height: BlockHeight) -> Option<[u8; 32]> {
        if height >= self.height || self.height - height > BLOCK_HASH_WINDOW {
            return None;
        }
        Some(self.derive_block_hash(height))
    }

    fn balance_of(&self, token: &Address, account: &Address) -> Balance {
        self.tokens.get(token).map(|t| t.balance(account)).unwrap_or(0)
    }

    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), DmcError> {
        self.token_mut(token)?.move_balance(from, to, amount)?;
        debug!(%token, %from, %to, amount, "transfer");
        Ok(())
    }

    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), DmcError> {
        let state = self.token_mut(token)?;
        let allowed = state.allowance(from, spender);
        if allowed < amount {
            return Err(DmcError::InsufficientAllowance);
        }
        state.move_balance(from, to, amount)?;
        state
            .allowances
            .entry(*from)
            .or_default()
            .insert(*spender, allowed - amount);
        debug!(%token, %spender, %from, %to, amount, "transfer_from");
        Ok(())
    }

    fn mint(
        &mut self,
        token: &Address,
        minter: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), DmcError> {
        let state = self.token_mut(token)?;
        if !state.minters.contains(minter) {
            return Err(DmcError::NotMinter);
        }
        state.add_supply(to, amount)
    }

    fn burn(&mut self, token: &Address, holder: &Address, amount: Balance) -> Result<(), DmcError> {
        let state = self.token_mut(token)?;
        let have = state.balance(holder);
        if have < amount {
            return Err(DmcError::InsufficientBalance);
        }
        state.balances.insert(*holder, have - amount);
        state.total_supply -= amount;
        Ok(())
    }

    fn owner_of(&self, bridge: &Address, hash: &ContentHash) -> Option<Address> {
        self.bridges.get(bridge).and_then(|m| m.get(hash)).copied()
    }

    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}
