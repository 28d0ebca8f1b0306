//! Public data storage market: deposits, supplier collateral, proof of
//! possession and per-cycle reward distribution over a bounded score board.

pub mod board;
pub mod market;
pub mod record;
pub mod reward;

pub use board::SortedScoreBoard;
pub use market::{DataStorageMarket, StorageConfig};
pub use record::{PublicDataRecord, ShowMode, ShowRecord, SupplierAccount};
pub use reward::{CycleSnapshot, RewardSplit, SnapshotEntry};
