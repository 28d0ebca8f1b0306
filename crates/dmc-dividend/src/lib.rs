//! Cycle-based staking and dividend distribution, plus linear token release.

pub mod engine;
pub mod release;
pub mod stake;

pub use engine::{DividendConfig, DividendEngine};
pub use release::{LinearRelease, ReleaseConfig, ReleaseLock};
pub use stake::StakeHistory;
