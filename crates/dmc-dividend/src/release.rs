use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use dmc_core::error::DmcError;
use dmc_core::event::Event;
use dmc_core::host::Host;
use dmc_core::math::mul_div;
use dmc_core::types::{Address, Balance, BlockHeight};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseConfig {
    /// Custody account holding locked tokens.
    pub account: Address,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self { account: Address::derive(b"dmc.release") }
    }
}

/// Tokens vesting to one receiver.
///
/// Nothing is released before `start + first_duration`. At that point
/// `first_release` unlocks at once and the rest vests linearly until
/// `start + total_duration`. Durations are in blocks.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseLock {
    pub token: Address,
    pub receiver: Address,
    pub amount: Balance,
    pub first_release: Balance,
    pub start: BlockHeight,
    pub first_duration: u64,
    pub total_duration: u64,
    pub withdrawn: Balance,
}

impl ReleaseLock {
    /// Amount vested by `height`, withdrawn or not.
    pub fn vested(&self, height: BlockHeight) -> Result<Balance, DmcError> {
        let elapsed = height.saturating_sub(self.start);
        if elapsed < self.first_duration {
            return Ok(0);
        }
        if elapsed >= self.total_duration {
            return Ok(self.amount);
        }
        let linear = mul_div(
            self.amount - self.first_release,
            u128::from(elapsed - self.first_duration),
            u128::from(self.total_duration - self.first_duration),
        )?;
        Ok(self.first_release + linear)
    }
}

/// Linear token release ledger. Lock ids start at 1.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinearRelease {
    account: Address,
    next_id: u64,
    locks: BTreeMap<u64, ReleaseLock>,
}

impl LinearRelease {
    pub fn new(config: &ReleaseConfig) -> Self {
        Self { account: config.account, next_id: 1, locks: BTreeMap::new() }
    }

    pub fn account(&self) -> &Address {
        &self.account
    }

    /// Pull `amount` of `token` from the caller and lock it for `receiver`.
    #[allow(clippy::too_many_arguments)]
    pub fn start_lock(
        &mut self,
        host: &mut dyn Host,
        caller: &Address,
        token: &Address,
        amount: Balance,
        receiver: &Address,
        first_duration: u64,
        first_release: Balance,
        total_duration: u64,
    ) -> Result<u64, DmcError> {
        if amount == 0 {
            return Err(DmcError::ZeroAmount);
        }
        if total_duration == 0 || total_duration < first_duration {
            return Err(DmcError::InvalidDuration);
        }
        if first_release > amount {
            return Err(DmcError::InvalidReleaseAmount);
        }
        host.transfer_from(token, &self.account, caller, &self.account, amount)?;

        let id = self.next_id;
        self.next_id += 1;
        self.locks.insert(
            id,
            ReleaseLock {
                token: *token,
                receiver: *receiver,
                amount,
                first_release,
                start: host.block_height(),
                first_duration,
                total_duration,
                withdrawn: 0,
            },
        );
        info!(id, %receiver, %token, amount, first_duration, total_duration, "lock started");
        host.emit(Event::LockStarted { id, receiver: *receiver, token: *token, amount });
        Ok(id)
    }

    /// Vested and not yet withdrawn.
    pub fn can_withdraw(&self, host: &dyn Host, id: u64) -> Result<Balance, DmcError> {
        let lock = self.locks.get(&id).ok_or(DmcError::LockNotFound)?;
        Ok(lock.vested(host.block_height())?.saturating_sub(lock.withdrawn))
    }

    pub fn withdraw(&mut self, host: &mut dyn Host, caller: &Address, id: u64) -> Result<Balance, DmcError> {
        let height = host.block_height();
        let lock = self.locks.get_mut(&id).ok_or(DmcError::LockNotFound)?;
        if lock.receiver != *caller {
            return Err(DmcError::InvalidReceiver);
        }
        if height.saturating_sub(lock.start) < lock.first_duration {
            return Err(DmcError::LockNotMatured);
        }
        let amount = lock.vested(height)?.saturating_sub(lock.withdrawn);
        if amount == 0 {
            return Err(DmcError::ZeroAmount);
        }
        lock.withdrawn += amount;
        let token = lock.token;

        host.transfer(&token, &self.account, caller, amount)?;
        debug!(id, %caller, amount, "lock withdrawn");
        host.emit(Event::LockWithdrawn { id, receiver: *caller, amount });
        Ok(amount)
    }

    pub fn lock(&self, id: u64) -> Option<&ReleaseLock> {
        self.locks.get(&id)
    }
}
