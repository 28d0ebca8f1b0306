use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dmc_core::chain::MemoryChain;
use dmc_core::error::DmcError;
use dmc_core::event::Event;
use dmc_core::host::Host;
use dmc_core::types::Address;
use dmc_dividend::{DividendEngine, LinearRelease};
use dmc_exchange::ExchangeEngine;
use dmc_storage::DataStorageMarket;

use crate::db::StateDb;
use crate::params::MarketParams;
use crate::transaction::{Action, Transaction};

// ── MarketState ───────────────────────────────────────────────────────────────

/// The whole ledger: the chain the engines run on plus the engines.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketState {
    pub chain: MemoryChain,
    pub dividend: DividendEngine,
    pub exchange: ExchangeEngine,
    pub storage: DataStorageMarket,
    pub release: LinearRelease,
}

impl MarketState {
    /// Build the initial state: tokens, minters and allocations on a fresh
    /// chain, engines at cycle 0.
    pub fn genesis(params: &MarketParams) -> Result<Self, DmcError> {
        params.validate()?;
        let mut chain = MemoryChain::new(params.entropy_seed);
        chain.set_height(params.start_height);
        for (token, minters) in params.tokens() {
            chain.create_token(token, &minters);
        }
        for a in &params.allocations {
            chain.credit(&a.token, &a.account, a.amount)?;
            debug!(token = %a.token, account = %a.account, amount = a.amount, "genesis allocation");
        }
        let state = Self {
            dividend: DividendEngine::new(&params.dividend, &params.clock)?,
            exchange: ExchangeEngine::new(&params.exchange, &params.clock)?,
            storage: DataStorageMarket::new(&params.storage, &params.clock)?,
            release: LinearRelease::new(&params.release),
            chain,
        };
        info!(height = params.start_height, allocations = params.allocations.len(), "market genesis built");
        Ok(state)
    }

    pub fn height(&self) -> u64 {
        self.chain.block_height()
    }

    /// Run one action on behalf of `caller`. On error the state may be
    /// partially modified; callers stage a copy (see [`StateEngine::apply`]).
    pub fn execute(&mut self, caller: &Address, action: &Action) -> Result<(), DmcError> {
        let Self { chain, dividend, exchange, storage, release } = self;
        match action {
            // ── Chain ─────────────────────────────────────────────────────────
            Action::Mine { blocks } => {
                chain.block_height().checked_add(*blocks).ok_or(DmcError::Overflow)?;
                chain.mine(*blocks);
            }
            Action::Approve { token, spender, amount } => {
                chain.approve(token, caller, spender, *amount)?;
            }
            Action::Transfer { token, to, amount } => {
                if *amount == 0 {
                    return Err(DmcError::ZeroAmount);
                }
                chain.transfer(token, caller, to, *amount)?;
            }
            Action::SetBridgeOwner { bridge, hash, owner } => {
                chain.set_bridge_owner(*bridge, *hash, *owner);
            }
            Action::TryNewCycle => {
                dividend.try_new_cycle(chain);
                exchange.try_new_cycle(chain)?;
                storage.try_new_cycle(chain);
            }

            // ── Dividend ──────────────────────────────────────────────────────
            Action::Stake { amount } => dividend.stake(chain, caller, *amount)?,
            Action::Unstake { amount } => dividend.unstake(chain, caller, *amount)?,
            Action::DepositDividend { token, amount } => {
                dividend.deposit(chain, caller, *amount, token)?;
            }
            Action::UpdateTokenBalance { token } => {
                let added = dividend.update_token_balance(chain, token)?;
                debug!(%token, added, "token balance updated");
            }
            Action::WithdrawDividends { cycles, tokens } => {
                let paid = dividend.withdraw_dividends(chain, caller, cycles, tokens)?;
                debug!(account = %caller, tokens = paid.len(), "dividends withdrawn");
            }
            Action::AddTokenToWhitelist { tokens } => dividend.add_token_to_whitelist(caller, tokens)?,
            Action::RemoveTokenFromWhitelist { tokens } => {
                dividend.remove_token_from_whitelist(caller, tokens)?;
            }

            // ── Linear release ────────────────────────────────────────────────
            Action::StartLock { token, amount, receiver, first_duration, first_release, total_duration } => {
                let id = release.start_lock(
                    chain,
                    caller,
                    token,
                    *amount,
                    receiver,
                    *first_duration,
                    *first_release,
                    *total_duration,
                )?;
                debug!(id, %receiver, "lock recorded");
            }
            Action::WithdrawLock { id } => {
                release.withdraw(chain, caller, *id)?;
            }

            // ── Exchange ──────────────────────────────────────────────────────
            Action::EnableProdMode => exchange.enable_prod_mode(chain, caller)?,
            Action::AddFreeMintBalance { amount } => exchange.add_free_mint_balance(chain, caller, *amount)?,
            Action::AddFreeDmcTestMintBalance { amount } => {
                exchange.add_free_dmc_test_mint_balance(chain, caller, *amount)?;
            }
            Action::FreeMintGwt => {
                exchange.free_mint_gwt(chain, caller)?;
            }
            Action::GwtToDmcForTest { gwt } => {
                exchange.gwt_to_dmc_for_test(chain, caller, *gwt)?;
            }
            Action::DmcToGwt { dmc } => {
                exchange.dmc_to_gwt(chain, caller, *dmc)?;
            }
            Action::GwtToDmc { gwt } => {
                exchange.gwt_to_dmc(chain, caller, *gwt)?;
            }

            // ── Public data ───────────────────────────────────────────────────
            Action::CreatePublicData { hash, deposit_ratio, amount, owner_bridge } => {
                storage.create_public_data(chain, caller, *hash, *deposit_ratio, *amount, *owner_bridge)?;
            }
            Action::AddDeposit { hash, amount } => {
                storage.add_deposit(chain, caller, hash, *amount)?;
            }
            Action::PledgeGwt { amount } => storage.pledge_gwt(chain, caller, *amount)?,
            Action::UnpledgeGwt { amount } => storage.unpledge_gwt(chain, caller, *amount)?,
            Action::ShowData { hash, nonce_block, leaf_index, path, leaf, mode } => {
                storage.show_data(chain, caller, hash, *nonce_block, *leaf_index, path, leaf, *mode)?;
            }
            Action::WithdrawShow { hash } => {
                storage.withdraw_show(chain, caller, hash)?;
            }
            Action::WithdrawCycleReward { cycle, hash } => {
                storage.withdraw_cycle_reward(chain, *cycle, hash)?;
            }
            Action::SetBoardCapacity { capacity } => storage.set_board_capacity(caller, *capacity)?,
        }
        Ok(())
    }
}

// ── StateEngine ───────────────────────────────────────────────────────────────

/// Applies transactions to the persisted market state.
///
/// Each `apply` call is atomic: the actions run against a staged copy of the
/// state, which replaces the live state and is written to the database only
/// if every action succeeds.
pub struct StateEngine {
    db: Arc<StateDb>,
    state: MarketState,
}

impl StateEngine {
    /// Build the genesis state into an empty database.
    pub fn init(db: Arc<StateDb>, params: &MarketParams) -> Result<Self, DmcError> {
        if db.has_state()? {
            return Err(DmcError::Storage("market state already initialised".into()));
        }
        let state = MarketState::genesis(params)?;
        db.put_state(&state)?;
        db.append_events(0, state.chain.events().events())?;
        let params_json = serde_json::to_vec(params).map_err(|e| DmcError::Serialization(e.to_string()))?;
        db.put_meta("params", &params_json)?;
        db.flush()?;
        Ok(Self { db, state })
    }

    /// Load the state previously written to `db`.
    pub fn open(db: Arc<StateDb>) -> Result<Self, DmcError> {
        let state = db
            .get_state()?
            .ok_or_else(|| DmcError::Storage("no market state in database".into()))?;
        info!(height = state.height(), "market state loaded");
        Ok(Self { db, state })
    }

    pub fn state(&self) -> &MarketState {
        &self.state
    }

    pub fn db(&self) -> &StateDb {
        &self.db
    }

    /// Validate and apply a transaction. Returns the events it emitted.
    pub fn apply(&mut self, tx: &Transaction) -> Result<Vec<Event>, DmcError> {
        if tx.actions.is_empty() {
            return Err(DmcError::InvalidConfig("transaction has no actions".into()));
        }

        // ── Stage ─────────────────────────────────────────────────────────────
        let mut staged = self.state.clone();
        let events_before = staged.chain.events().len();
        for (i, action) in tx.actions.iter().enumerate() {
            if let Err(e) = staged.execute(&tx.caller, action) {
                warn!(caller = %tx.caller, index = i, error = %e, "transaction rejected");
                return Err(e);
            }
        }
        let emitted = staged.chain.events().since(events_before).to_vec();

        // ── Commit ────────────────────────────────────────────────────────────
        self.db.put_state(&staged)?;
        self.db.append_events(events_before as u64, &emitted)?;
        let count = self.db.tx_count()? + 1;
        self.db.put_meta("tx_count", &count.to_be_bytes())?;
        self.state = staged;

        info!(
            caller = %tx.caller,
            actions = tx.actions.len(),
            events = emitted.len(),
            height = self.state.height(),
            "transaction applied"
        );
        Ok(emitted)
    }
}
