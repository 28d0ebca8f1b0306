use thiserror::Error;

/// Coarse classification of a failure, used by callers deciding whether to
/// fix their input, re-read state and retry, or treat the node as broken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: zero hash, zero amount, bad proof shape.
    Validation,
    /// Input is well-formed but the current state forbids the operation.
    State,
    /// Internal bookkeeping produced an impossible result.
    Invariant,
}

/// Every failure a market operation can produce.
///
/// The message strings are part of the external contract: clients match on
/// them, so they must stay stable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DmcError {
    // ── Token capability ─────────────────────────────────────────────────────
    #[error("insufficient allowance")]
    InsufficientAllowance,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("unknown token: {0}")]
    UnknownToken(String),

    #[error("caller is not a minter")]
    NotMinter,

    #[error("caller is not admin")]
    NotAdmin,

    // ── Dividend / staking ───────────────────────────────────────────────────
    #[error("Cannot stake 0")]
    StakeZero,

    #[error("Cannot unstake 0")]
    UnstakeZero,

    #[error("No stake record found")]
    NoStakeRecord,

    #[error("Insufficient stake amount")]
    InsufficientStake,

    #[error("Invalid cycle index")]
    InvalidCycleIndex,

    #[error("Token is not in whitelist")]
    TokenNotWhitelisted,

    #[error("Cannot claim current or future cycle")]
    FutureOrCurrentCycle,

    #[error("Already claimed")]
    AlreadyClaimed,

    // ── Exchange ─────────────────────────────────────────────────────────────
    #[error("not in test mode")]
    TestModeOnly,

    #[error("not in prod mode")]
    ProdModeOnly,

    #[error("free mint already used")]
    FreeMintUsed,

    #[error("test exchange already used")]
    TestExchangeUsed,

    #[error("free balance not enough")]
    FreeBalanceExhausted,

    #[error("exceed current cycle quota: want {want}, remaining {remaining}")]
    QuotaExceeded { want: u128, remaining: u128 },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    // ── Public data ──────────────────────────────────────────────────────────
    #[error("data hash is empty")]
    DataHashEmpty,

    #[error("public data already exists")]
    AlreadyExists,

    #[error("deposit ratio is too small")]
    RatioTooSmall,

    #[error("deposit amount is too small: need {min}")]
    DepositTooSmall { min: u128 },

    #[error("public data not exist")]
    NotExist,

    #[error("nonce block too old")]
    NonceTooOld,

    #[error("nonce block not finalized")]
    NonceNotFinalized,

    #[error("invalid merkle proof")]
    InvalidProof,

    #[error("supplier balance not enough: need {need}, free {free}")]
    InsufficientCollateral { need: u128, free: u128 },

    #[error("last show not finished")]
    ShowPending,

    #[error("no pending show")]
    ShowNotFound,

    #[error("show timeout not reached")]
    ShowNotMatured,

    #[error("already withdrawn")]
    AlreadyWithdrawn,

    #[error("reward already withdrawn")]
    RewardAlreadyWithdrawn,

    // ── Sorted score board ───────────────────────────────────────────────────
    #[error("max_length must be greater than current max_length")]
    CapacityCannotShrink,

    #[error("item not found")]
    NotFound,

    // ── Linear release ───────────────────────────────────────────────────────
    #[error("invalid duration")]
    InvalidDuration,

    #[error("first release exceeds locked amount")]
    InvalidReleaseAmount,

    #[error("invalid receiver")]
    InvalidReceiver,

    #[error("not time")]
    LockNotMatured,

    #[error("lock not found")]
    LockNotFound,

    // ── Configuration / storage ──────────────────────────────────────────────
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("arithmetic overflow")]
    Overflow,

    // ── Invariants ───────────────────────────────────────────────────────────
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl DmcError {
    pub fn kind(&self) -> ErrorKind {
        use DmcError::*;
        match self {
            StakeZero | UnstakeZero | ZeroAmount | DataHashEmpty | RatioTooSmall
            | DepositTooSmall { .. } | InvalidProof | InvalidConfig(_) | InvalidDuration
            | InvalidReleaseAmount | Overflow => ErrorKind::Validation,
            Invariant(_) | Serialization(_) | Storage(_) => ErrorKind::Invariant,
            _ => ErrorKind::State,
        }
    }
}
