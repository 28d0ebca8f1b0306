use dmc_core::chain::MemoryChain;
use dmc_core::constants::TOKEN_UNIT;
use dmc_core::cycle::ClockConfig;
use dmc_core::error::DmcError;
use dmc_core::host::Host;
use dmc_core::types::Address;
use dmc_exchange::{ExchangeConfig, ExchangeEngine, ExchangeMode};

const T: u128 = TOKEN_UNIT;

fn setup() -> (MemoryChain, ExchangeEngine, ExchangeConfig, Address) {
    let cfg = ExchangeConfig::default();
    let alice = Address::derive(b"alice");
    let mut chain = MemoryChain::new([9u8; 32]);
    chain.create_token(cfg.dmc_token, &[cfg.account]);
    chain.create_token(cfg.gwt_token, &[cfg.account]);
    for who in [cfg.admin, alice] {
        chain.credit(&cfg.gwt_token, &who, 300_000 * T).unwrap();
        chain.credit(&cfg.dmc_token, &who, 10 * T).unwrap();
        chain.approve(&cfg.gwt_token, &who, &cfg.account, u128::MAX).unwrap();
        chain.approve(&cfg.dmc_token, &who, &cfg.account, u128::MAX).unwrap();
    }
    let engine = ExchangeEngine::new(&cfg, &ClockConfig::default()).unwrap();
    (chain, engine, cfg, alice)
}

#[test]
fn test_mode_then_production() {
    let (mut chain, mut engine, cfg, alice) = setup();

    engine.add_free_mint_balance(&mut chain, &cfg.admin, 210 * T).unwrap();
    engine.add_free_dmc_test_mint_balance(&mut chain, &cfg.admin, T).unwrap();
    assert_eq!(
        engine.add_free_mint_balance(&mut chain, &alice, T),
        Err(DmcError::NotAdmin)
    );

    let gwt_before = chain.balance_of(&cfg.gwt_token, &alice);
    assert_eq!(engine.free_mint_gwt(&mut chain, &alice), Ok(210 * T));
    assert_eq!(chain.balance_of(&cfg.gwt_token, &alice), gwt_before + 210 * T);
    assert_eq!(engine.free_mint_gwt(&mut chain, &alice), Err(DmcError::FreeMintUsed));
    assert_eq!(
        engine.free_mint_gwt(&mut chain, &cfg.admin),
        Err(DmcError::FreeBalanceExhausted)
    );

    assert_eq!(engine.gwt_to_dmc_for_test(&mut chain, &alice, 210 * T), Ok(T));
    assert_eq!(
        engine.gwt_to_dmc_for_test(&mut chain, &alice, 210 * T),
        Err(DmcError::TestExchangeUsed)
    );
    assert_eq!(engine.dmc_to_gwt(&mut chain, &alice, T), Err(DmcError::ProdModeOnly));

    chain.mine(20);
    engine.enable_prod_mode(&mut chain, &cfg.admin).unwrap();
    assert_eq!(engine.mode(), ExchangeMode::Production);
    assert_eq!(
        engine.gwt_to_dmc_for_test(&mut chain, &cfg.admin, 210 * T),
        Err(DmcError::TestModeOnly)
    );

    // 1 DMC buys 210 × 6/5 GWT and leaves the quota alone
    let gwt_before = chain.balance_of(&cfg.gwt_token, &alice);
    assert_eq!(engine.dmc_to_gwt(&mut chain, &alice, T), Ok(252 * T));
    assert_eq!(chain.balance_of(&cfg.gwt_token, &alice), gwt_before + 252 * T);
    assert_eq!(engine.remaining_quota(), 210 * T);
}

#[test]
fn quota_evolves_with_consumption() {
    let (mut chain, mut engine, cfg, alice) = setup();
    engine.enable_prod_mode(&mut chain, &cfg.admin).unwrap();
    assert_eq!(engine.get_cycle_info(), Some((0, 0, 210 * T)));
    assert_eq!(engine.dmc_to_gwt(&mut chain, &alice, T), Ok(252 * T));

    // cycle 0 left its whole quota: 210 + 210 / 1
    chain.mine(1_000);
    assert_eq!(engine.gwt_to_dmc(&mut chain, &alice, 67_200 * T), Ok(320 * T));
    assert_eq!(engine.get_cycle_info(), Some((1, 0, 420 * T)));
    assert_eq!(engine.current_rate(), 210_000);

    // 100 left: stored 100, released 100 / 2
    chain.mine(1_000);
    assert_eq!(engine.gwt_to_dmc(&mut chain, &alice, 33_600 * T), Ok(160 * T));
    assert_eq!(engine.get_cycle_info(), Some((2, 50 * T, 260 * T)));
    assert_eq!(engine.current_rate(), 210_000);

    // 100 left again: stored 150, released 150 / 3
    chain.mine(1_000);
    assert_eq!(engine.gwt_to_dmc(&mut chain, &alice, 54_600 * T), Ok(260 * T));
    assert_eq!(engine.get_cycle_info(), Some((3, 100 * T, 260 * T)));
    assert_eq!(engine.remaining_quota(), 0);
    assert!(matches!(
        engine.gwt_to_dmc(&mut chain, &alice, 210 * T),
        Err(DmcError::QuotaExceeded { .. })
    ));

    // fully consumed: divisor drops back to 2
    chain.mine(1_000);
    assert_eq!(engine.gwt_to_dmc(&mut chain, &alice, 54_600 * T), Ok(260 * T));
    assert_eq!(engine.get_cycle_info(), Some((4, 50 * T, 260 * T)));
    assert_eq!(engine.current_rate(), 210_000);
    assert_eq!(chain.balance_of(&cfg.dmc_token, &alice), (10 - 1 + 320 + 160 + 260 + 260) * T);
}

#[test]
fn skipped_cycles_roll_with_zero_consumption() {
    let (mut chain, mut engine, cfg, alice) = setup();
    engine.enable_prod_mode(&mut chain, &cfg.admin).unwrap();
    chain.mine(3_000);
    engine.dmc_to_gwt(&mut chain, &alice, T).unwrap();
    // each idle cycle raises the divisor: releases 210/1, 420/2, 630/3
    let (cycle, stored, quota) = engine.get_cycle_info().unwrap();
    assert_eq!(cycle, 3);
    assert_eq!(quota, 420 * T);
    assert_eq!(stored, 420 * T);
    assert_eq!(engine.current_rate(), 210_000);
}
