//! DMC ⇄ GWT exchange with a per-cycle DMC quota.

pub mod cycle;
pub mod engine;

pub use cycle::ExchangeCycleState;
pub use engine::{ExchangeConfig, ExchangeEngine, ExchangeMode};
