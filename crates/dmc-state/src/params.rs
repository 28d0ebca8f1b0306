use serde::{Deserialize, Serialize};

use dmc_core::cycle::ClockConfig;
use dmc_core::error::DmcError;
use dmc_core::types::{Address, Balance, BlockHeight};
use dmc_dividend::{DividendConfig, ReleaseConfig};
use dmc_exchange::ExchangeConfig;
use dmc_storage::StorageConfig;

/// Tokens credited to an account when the state is created.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Allocation {
    pub token: Address,
    pub account: Address,
    /// Base units.
    pub amount: Balance,
}

/// Everything needed to build a fresh market state.
///
/// Loaded from JSON by the CLI; every section falls back to its default so a
/// file only has to name what it changes.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarketParams {
    /// Seed for the simulated block hashes.
    pub entropy_seed: [u8; 32],
    /// Block height the chain starts at.
    pub start_height: BlockHeight,
    pub clock: ClockConfig,
    pub dividend: DividendConfig,
    pub exchange: ExchangeConfig,
    pub storage: StorageConfig,
    pub release: ReleaseConfig,
    pub allocations: Vec<Allocation>,
}

impl MarketParams {
    pub fn validate(&self) -> Result<(), DmcError> {
        if self.clock.cycle_length == 0 {
            return Err(DmcError::InvalidConfig("cycle_length must be non-zero".into()));
        }
        self.exchange.validate()?;
        self.storage.validate()?;
        if self.allocations.iter().any(|a| a.amount == 0) {
            return Err(DmcError::InvalidConfig("allocation amount must be non-zero".into()));
        }
        Ok(())
    }

    /// Every token the engines refer to, each with the accounts allowed to
    /// mint it.
    pub fn tokens(&self) -> Vec<(Address, Vec<Address>)> {
        let ex = &self.exchange;
        let mut tokens = vec![(ex.dmc_token, vec![ex.account]), (ex.gwt_token, vec![ex.account])];
        let others = std::iter::once(self.dividend.stake_token)
            .chain(self.dividend.whitelist.iter().copied())
            .chain(std::iter::once(self.storage.gwt_token))
            .chain(self.allocations.iter().map(|a| a.token));
        for token in others {
            if !tokens.iter().any(|(t, _)| *t == token) {
                tokens.push((token, Vec::new()));
            }
        }
        tokens
    }
}
