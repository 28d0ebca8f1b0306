/// ─── DMC Market Constants ───────────────────────────────────────────────────
///
/// DMC: the scarce staking/exchange token.
/// GWT: the abundant utility token used for storage deposits and rewards.
/// Both use 18 decimals.

// ── Units ────────────────────────────────────────────────────────────────────

/// One whole token in base units.
pub const TOKEN_UNIT: u128 = 1_000_000_000_000_000_000;

/// Denominator for percentage values.
pub const PERCENT: u128 = 100;

// ── Cycles ───────────────────────────────────────────────────────────────────

/// Default cycle length in blocks.
pub const DEFAULT_CYCLE_LENGTH: u64 = 1000;

// ── Exchange ─────────────────────────────────────────────────────────────────

/// Fixed-point scale of the exchange rate (rate 210 GWT/DMC is stored as 210_000).
pub const RATE_PRECISION: u128 = 1_000;

/// GWT per DMC at launch.
pub const INITIAL_EXCHANGE_RATE: u128 = 210;

/// DMC released into the exchange quota every cycle.
pub const BASE_RELEASE_DMC: u128 = 210;

/// Lower bound for the recomputed rate (GWT per DMC). Leftover quota never
/// prices DMC below the launch rate unless a deployment configures a lower floor.
pub const MIN_EXCHANGE_RATE: u128 = INITIAL_EXCHANGE_RATE;

/// DMC → GWT conversions receive a 6/5 (120%) bonus.
pub const DMC_TO_GWT_BONUS_NUM: u128 = 6;
pub const DMC_TO_GWT_BONUS_DEN: u128 = 5;

/// GWT paid out once per caller by `free_mint_gwt` in test mode.
pub const FREE_MINT_GWT: u128 = 210;

// ── Public data storage ──────────────────────────────────────────────────────

/// Data size unit: 1/8 GiB.
pub const SIZE_UNIT_BYTES: u64 = 128 * 1024 * 1024;

/// Deposit must cover this many weeks of storage at creation.
pub const DEPOSIT_WEEKS: u128 = 96;

/// A show locks collateral covering this many weeks.
pub const SHOW_LOCK_WEEKS: u128 = 24;

/// Smallest accepted deposit ratio.
pub const MIN_DEPOSIT_RATIO: u64 = 48;

/// Share of every deposit that stays on the record as reward balance; the
/// rest enters the current cycle pool.
pub const DEPOSIT_BALANCE_PERCENT: u128 = 80;

/// Share of a record's balance paid out per resolved show.
pub const SHOW_REWARD_PERCENT: u128 = 10;

/// Share of a show reward kept by the supplier; the rest enters the cycle pool.
pub const SUPPLIER_REWARD_PERCENT: u128 = 80;

/// Immediate shows require free collateral of this many times the lock.
pub const IMMEDIATE_COLLATERAL_FACTOR: u128 = 2;

/// Blocks a pending show must age before it resolves.
pub const DEFAULT_SHOW_TIMEOUT: u64 = 720;

/// How far back a nonce block may lie.
pub const DEFAULT_MAX_NONCE_BLOCK_DISTANCE: u64 = 2;

/// Number of recent distinct suppliers remembered per record.
pub const MAX_SHOWED_SUPPLIERS: usize = 5;

/// Capacity of the score board at launch.
pub const DEFAULT_BOARD_CAPACITY: usize = 32;

/// Cycle pool split: share distributed to records, then per-role shares.
pub const CYCLE_POOL_DISTRIBUTED_PERCENT: u128 = 80;
pub const OWNER_REWARD_PERCENT: u128 = 20;
pub const SPONSOR_REWARD_PERCENT: u128 = 50;
pub const SUPPLIERS_REWARD_PERCENT: u128 = 30;

// ── Environment ──────────────────────────────────────────────────────────────

/// Block hashes are retrievable only this many blocks back.
pub const BLOCK_HASH_WINDOW: u64 = 256;

/// Merkle leaf size in bytes.
pub const MERKLE_LEAF_SIZE: usize = 1024;
