//! dmc-state
//!
//! Ties the three market engines, the linear release ledger and the
//! in-memory chain into one `MarketState`, applies `Transaction`s to it
//! atomically and persists the result in a sled database.

pub mod db;
pub mod engine;
pub mod params;
pub mod transaction;

pub use db::StateDb;
pub use engine::{MarketState, StateEngine};
pub use params::{Allocation, MarketParams};
pub use transaction::{Action, Transaction};
