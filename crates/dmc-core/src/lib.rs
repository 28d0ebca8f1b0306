pub mod chain;
pub mod constants;
pub mod cycle;
pub mod error;
pub mod event;
pub mod host;
pub mod math;
pub mod types;

pub use chain::MemoryChain;
pub use constants::*;
pub use cycle::{current_cycle_index, ClockConfig, CycleAdvance, CycleClock};
pub use error::{DmcError, ErrorKind};
pub use event::{Event, EventLog, Module, RewardRole};
pub use host::Host;
pub use types::*;
