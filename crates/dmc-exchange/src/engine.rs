use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use dmc_core::constants::{
    BASE_RELEASE_DMC, DMC_TO_GWT_BONUS_DEN, DMC_TO_GWT_BONUS_NUM, FREE_MINT_GWT,
    INITIAL_EXCHANGE_RATE, MIN_EXCHANGE_RATE, RATE_PRECISION, TOKEN_UNIT,
};
use dmc_core::cycle::{ClockConfig, CycleClock};
use dmc_core::error::DmcError;
use dmc_core::event::{Event, Module};
use dmc_core::host::Host;
use dmc_core::types::{Address, Balance, CycleIndex};

use crate::cycle::ExchangeCycleState;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Custody account; must be a minter of both tokens.
    pub account: Address,
    pub dmc_token: Address,
    pub gwt_token: Address,
    pub admin: Address,
    /// GWT per DMC, whole units.
    pub initial_rate: u128,
    pub min_rate: u128,
    /// DMC added to the quota every cycle, base units.
    pub base_release: Balance,
    /// GWT handed out by one `free_mint_gwt`, base units.
    pub free_mint_amount: Balance,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            account: Address::derive(b"dmc.exchange"),
            dmc_token: Address::derive(b"token.dmc"),
            gwt_token: Address::derive(b"token.gwt"),
            admin: Address::derive(b"dmc.admin"),
            initial_rate: INITIAL_EXCHANGE_RATE,
            min_rate: MIN_EXCHANGE_RATE,
            base_release: BASE_RELEASE_DMC * TOKEN_UNIT,
            free_mint_amount: FREE_MINT_GWT * TOKEN_UNIT,
        }
    }
}

impl ExchangeConfig {
    pub fn validate(&self) -> Result<(), DmcError> {
        if self.min_rate == 0 || self.initial_rate < self.min_rate {
            return Err(DmcError::InvalidConfig("exchange rates out of order".into()));
        }
        if self.base_release == 0 {
            return Err(DmcError::InvalidConfig("base_release must be non-zero".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExchangeMode {
    Test,
    Production,
}

// ── ExchangeEngine ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeEngine {
    config: ExchangeConfig,
    mode: ExchangeMode,
    clock: CycleClock,
    /// Present once production mode is on.
    cycle: Option<ExchangeCycleState>,
    free_gwt_balance: Balance,
    free_dmc_balance: Balance,
    free_minted: BTreeSet<Address>,
    test_exchanged: BTreeSet<Address>,
}

impl ExchangeEngine {
    pub fn new(config: &ExchangeConfig, clock: &ClockConfig) -> Result<Self, DmcError> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            mode: ExchangeMode::Test,
            clock: CycleClock::new(clock)?,
            cycle: None,
            free_gwt_balance: 0,
            free_dmc_balance: 0,
            free_minted: BTreeSet::new(),
            test_exchanged: BTreeSet::new(),
        })
    }

    pub fn mode(&self) -> ExchangeMode {
        self.mode
    }

    pub fn account(&self) -> &Address {
        &self.config.account
    }

    fn require_admin(&self, caller: &Address) -> Result<(), DmcError> {
        if *caller != self.config.admin {
            return Err(DmcError::NotAdmin);
        }
        Ok(())
    }

    fn require_test(&self) -> Result<(), DmcError> {
        match self.mode {
            ExchangeMode::Test => Ok(()),
            ExchangeMode::Production => Err(DmcError::TestModeOnly),
        }
    }

    // ── Cycles ────────────────────────────────────────────────────────────────

    /// Roll the quota over every cycle closed since the last call.
    fn advance(&mut self, host: &mut dyn Host) -> Result<&mut ExchangeCycleState, DmcError> {
        let Some(state) = self.cycle.as_mut() else {
            return Err(DmcError::ProdModeOnly);
        };
        if let Some(adv) = self.clock.try_advance(host.block_height()) {
            for _ in adv.closed() {
                state.roll_over(self.config.initial_rate, self.config.min_rate);
            }
            debug_assert_eq!(state.cycle_index, adv.to);
            info!(
                cycle = state.cycle_index,
                quota = state.current_quota,
                stored = state.stored_remainder,
                rate = state.rate,
                "exchange cycle opened"
            );
            host.emit(Event::NewCycle { module: Module::Exchange, cycle: adv.to });
            host.emit(Event::ExchangeCycle {
                cycle: state.cycle_index,
                quota: state.current_quota,
                stored_remainder: state.stored_remainder,
                rate: state.rate,
            });
        }
        Ok(state)
    }

    /// Settle every closed cycle without trading. Nothing to do in test mode.
    pub fn try_new_cycle(&mut self, host: &mut dyn Host) -> Result<(), DmcError> {
        if self.cycle.is_none() {
            return Ok(());
        }
        self.advance(host).map(|_| ())
    }

    /// One-way switch from test to production mode.
    pub fn enable_prod_mode(&mut self, host: &mut dyn Host, caller: &Address) -> Result<(), DmcError> {
        self.require_admin(caller)?;
        self.require_test()?;
        let now = host.block_height();
        let cycle = self.clock.index_at(now);
        self.clock.try_advance(now);
        self.cycle = Some(ExchangeCycleState::genesis(
            cycle,
            self.config.base_release,
            self.config.initial_rate,
        ));
        self.mode = ExchangeMode::Production;
        info!(cycle, "exchange production mode enabled");
        host.emit(Event::ProdModeEnabled { cycle });
        Ok(())
    }

    // ── Test mode ─────────────────────────────────────────────────────────────

    pub fn add_free_mint_balance(&mut self, host: &mut dyn Host, caller: &Address, amount: Balance) -> Result<(), DmcError> {
        self.require_admin(caller)?;
        if amount == 0 {
            return Err(DmcError::ZeroAmount);
        }
        host.transfer_from(&self.config.gwt_token, &self.config.account, caller, &self.config.account, amount)?;
        self.free_gwt_balance += amount;
        debug!(amount, total = self.free_gwt_balance, "free GWT balance added");
        Ok(())
    }

    pub fn add_free_dmc_test_mint_balance(
        &mut self,
        host: &mut dyn Host,
        caller: &Address,
        amount: Balance,
    ) -> Result<(), DmcError> {
        self.require_admin(caller)?;
        if amount == 0 {
            return Err(DmcError::ZeroAmount);
        }
        host.transfer_from(&self.config.dmc_token, &self.config.account, caller, &self.config.account, amount)?;
        self.free_dmc_balance += amount;
        debug!(amount, total = self.free_dmc_balance, "free DMC balance added");
        Ok(())
    }

    /// Hand out the configured free GWT amount, once per caller.
    pub fn free_mint_gwt(&mut self, host: &mut dyn Host, caller: &Address) -> Result<Balance, DmcError> {
        self.require_test()?;
        if self.free_minted.contains(caller) {
            return Err(DmcError::FreeMintUsed);
        }
        let amount = self.config.free_mint_amount;
        if self.free_gwt_balance < amount {
            return Err(DmcError::FreeBalanceExhausted);
        }
        self.free_minted.insert(*caller);
        self.free_gwt_balance -= amount;

        host.transfer(&self.config.gwt_token, &self.config.account, caller, amount)?;
        info!(%caller, amount, "free GWT minted");
        host.emit(Event::FreeMint { account: *caller, gwt: amount });
        Ok(amount)
    }

    /// Buy DMC from the free pool at the initial rate, once per caller.
    pub fn gwt_to_dmc_for_test(&mut self, host: &mut dyn Host, caller: &Address, gwt: Balance) -> Result<Balance, DmcError> {
        self.require_test()?;
        if self.test_exchanged.contains(caller) {
            return Err(DmcError::TestExchangeUsed);
        }
        let dmc = gwt / self.config.initial_rate;
        if dmc == 0 {
            return Err(DmcError::ZeroAmount);
        }
        if self.free_dmc_balance < dmc {
            return Err(DmcError::FreeBalanceExhausted);
        }
        host.transfer_from(&self.config.gwt_token, &self.config.account, caller, &self.config.account, gwt)?;
        self.test_exchanged.insert(*caller);
        self.free_dmc_balance -= dmc;

        host.transfer(&self.config.dmc_token, &self.config.account, caller, dmc)?;
        info!(%caller, gwt, dmc, "test exchange");
        host.emit(Event::TestExchange { account: *caller, gwt, dmc });
        Ok(dmc)
    }

    // ── Production mode ───────────────────────────────────────────────────────

    /// Sell DMC for GWT at the current rate plus the 6/5 bonus. Quota is untouched.
    pub fn dmc_to_gwt(&mut self, host: &mut dyn Host, caller: &Address, dmc: Balance) -> Result<Balance, DmcError> {
        if dmc == 0 {
            return Err(DmcError::ZeroAmount);
        }
        let (dmc_token, gwt_token, account) = (self.config.dmc_token, self.config.gwt_token, self.config.account);
        let state = self.advance(host)?;
        let gwt = state
            .gwt_for(dmc)?
            .checked_mul(DMC_TO_GWT_BONUS_NUM)
            .ok_or(DmcError::Overflow)?
            / DMC_TO_GWT_BONUS_DEN;

        host.transfer_from(&dmc_token, &account, caller, &account, dmc)?;
        host.mint(&gwt_token, &account, caller, gwt)?;
        info!(%caller, dmc, gwt, "DMC exchanged to GWT");
        host.emit(Event::DmcToGwt { account: *caller, dmc, gwt });
        Ok(gwt)
    }

    /// Buy DMC with GWT against the cycle quota. The GWT is burned.
    pub fn gwt_to_dmc(&mut self, host: &mut dyn Host, caller: &Address, gwt: Balance) -> Result<Balance, DmcError> {
        let (dmc_token, gwt_token, account) = (self.config.dmc_token, self.config.gwt_token, self.config.account);
        let state = self.advance(host)?;
        let dmc = state.dmc_for(gwt)?;
        if dmc == 0 {
            return Err(DmcError::ZeroAmount);
        }
        let remaining = state.remaining_quota();
        if dmc > remaining {
            return Err(DmcError::QuotaExceeded { want: dmc, remaining });
        }

        host.transfer_from(&gwt_token, &account, caller, &account, gwt)?;
        host.burn(&gwt_token, &account, gwt)?;
        state.consumed += dmc;
        let consumed = state.consumed;
        host.mint(&dmc_token, &account, caller, dmc)?;
        info!(%caller, gwt, dmc, consumed, "GWT exchanged to DMC");
        host.emit(Event::GwtToDmc { account: *caller, gwt, dmc });
        Ok(dmc)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// `(cycle_index, stored_remainder, current_quota)` of the last settled cycle.
    pub fn get_cycle_info(&self) -> Option<(CycleIndex, Balance, Balance)> {
        self.cycle
            .as_ref()
            .map(|s| (s.cycle_index, s.stored_remainder, s.current_quota))
    }

    pub fn cycle_state(&self) -> Option<&ExchangeCycleState> {
        self.cycle.as_ref()
    }

    pub fn remaining_quota(&self) -> Balance {
        self.cycle.as_ref().map(|s| s.remaining_quota()).unwrap_or(0)
    }

    /// GWT per DMC, fixed-point.
    pub fn current_rate(&self) -> u128 {
        self.cycle
            .as_ref()
            .map(|s| s.rate)
            .unwrap_or(self.config.initial_rate * RATE_PRECISION)
    }

    pub fn free_balances(&self) -> (Balance, Balance) {
        (self.free_gwt_balance, self.free_dmc_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmc_core::chain::MemoryChain;

    fn setup() -> (MemoryChain, ExchangeEngine, ExchangeConfig) {
        let cfg = ExchangeConfig::default();
        let mut chain = MemoryChain::new([5u8; 32]);
        chain.create_token(cfg.dmc_token, &[cfg.account]);
        chain.create_token(cfg.gwt_token, &[cfg.account]);
        let engine = ExchangeEngine::new(&cfg, &ClockConfig::default()).unwrap();
        (chain, engine, cfg)
    }

    #[test]
    fn bad_rates_are_rejected() {
        let cfg = ExchangeConfig { min_rate: 300, ..ExchangeConfig::default() };
        assert!(matches!(
            ExchangeEngine::new(&cfg, &ClockConfig::default()),
            Err(DmcError::InvalidConfig(_))
        ));
    }

    #[test]
    fn production_paths_closed_in_test_mode() {
        let (mut chain, mut engine, _) = setup();
        let alice = Address::derive(b"alice");
        assert_eq!(engine.gwt_to_dmc(&mut chain, &alice, 1_000), Err(DmcError::ProdModeOnly));
        assert_eq!(engine.get_cycle_info(), None);
    }

    #[test]
    fn prod_mode_is_admin_only_and_one_way() {
        let (mut chain, mut engine, cfg) = setup();
        let alice = Address::derive(b"alice");
        assert_eq!(engine.enable_prod_mode(&mut chain, &alice), Err(DmcError::NotAdmin));
        chain.mine(2_500);
        engine.enable_prod_mode(&mut chain, &cfg.admin).unwrap();
        assert_eq!(engine.mode(), ExchangeMode::Production);
        assert_eq!(engine.get_cycle_info(), Some((2, 0, cfg.base_release)));
        assert_eq!(
            engine.enable_prod_mode(&mut chain, &cfg.admin),
            Err(DmcError::TestModeOnly)
        );
        assert_eq!(engine.free_mint_gwt(&mut chain, &alice), Err(DmcError::TestModeOnly));
    }

    #[test]
    fn quota_caps_gwt_to_dmc() {
        let (mut chain, mut engine, cfg) = setup();
        let alice = Address::derive(b"alice");
        engine.enable_prod_mode(&mut chain, &cfg.admin).unwrap();
        chain.credit(&cfg.gwt_token, &alice, 100_000 * TOKEN_UNIT).unwrap();
        chain.approve(&cfg.gwt_token, &alice, &cfg.account, u128::MAX).unwrap();

        let too_much = 211 * 210 * TOKEN_UNIT;
        assert_eq!(
            engine.gwt_to_dmc(&mut chain, &alice, too_much),
            Err(DmcError::QuotaExceeded { want: 211 * TOKEN_UNIT, remaining: 210 * TOKEN_UNIT })
        );
        assert_eq!(engine.gwt_to_dmc(&mut chain, &alice, 100), Err(DmcError::ZeroAmount));
        let dmc = engine.gwt_to_dmc(&mut chain, &alice, 210 * 210 * TOKEN_UNIT).unwrap();
        assert_eq!(dmc, 210 * TOKEN_UNIT);
        assert_eq!(engine.remaining_quota(), 0);
        assert_eq!(chain.balance_of(&cfg.dmc_token, &alice), 210 * TOKEN_UNIT);
        assert_eq!(chain.total_supply(&cfg.gwt_token), 100_000 * TOKEN_UNIT - 210 * 210 * TOKEN_UNIT);
    }

    #[test]
    fn failed_payment_leaves_quota_untouched() {
        let (mut chain, mut engine, cfg) = setup();
        let alice = Address::derive(b"alice");
        engine.enable_prod_mode(&mut chain, &cfg.admin).unwrap();
        chain.credit(&cfg.gwt_token, &alice, 1_000 * TOKEN_UNIT).unwrap();

        assert_eq!(
            engine.gwt_to_dmc(&mut chain, &alice, 210 * TOKEN_UNIT),
            Err(DmcError::InsufficientAllowance)
        );
        assert_eq!(engine.remaining_quota(), 210 * TOKEN_UNIT);
        assert_eq!(engine.cycle_state().unwrap().consumed, 0);
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        let (mut chain, mut engine, cfg) = setup();
        let alice = Address::derive(b"alice");
        engine.enable_prod_mode(&mut chain, &cfg.admin).unwrap();
        assert_eq!(engine.gwt_to_dmc(&mut chain, &alice, u128::MAX / 100), Err(DmcError::Overflow));
        assert_eq!(engine.dmc_to_gwt(&mut chain, &alice, u128::MAX / 100), Err(DmcError::Overflow));
        assert_eq!(engine.remaining_quota(), 210 * TOKEN_UNIT);
    }

    #[test]
    fn try_new_cycle_settles_without_trading() {
        let (mut chain, mut engine, cfg) = setup();
        engine.try_new_cycle(&mut chain).unwrap();
        assert_eq!(engine.get_cycle_info(), None);

        engine.enable_prod_mode(&mut chain, &cfg.admin).unwrap();
        chain.mine(2_000);
        engine.try_new_cycle(&mut chain).unwrap();
        assert_eq!(engine.get_cycle_info().map(|(cycle, _, _)| cycle), Some(2));
    }

    #[test]
    fn cycle_state_serializes_as_json() {
        let (mut chain, mut engine, cfg) = setup();
        engine.enable_prod_mode(&mut chain, &cfg.admin).unwrap();
        let json = serde_json::to_string(engine.cycle_state().unwrap()).unwrap();
        let back: ExchangeCycleState = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, engine.cycle_state().unwrap());
    }
}
