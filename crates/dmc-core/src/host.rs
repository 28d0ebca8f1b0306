use crate::error::DmcError;
use crate::event::Event;
use crate::types::{Address, Balance, BlockHeight, ContentHash};

/// Everything an engine needs from the execution environment.
///
/// Token operations are addressed by token address; `from`/`spender`/`minter`
/// is always the identity on whose behalf the call is made (for outgoing
/// payouts that is the engine's own address). A failed call must leave the
/// token state untouched.
pub trait Host {
    // ── Block environment ────────────────────────────────────────────────────

    fn block_height(&self) -> BlockHeight;

    /// Hash of a settled block within the recent window, `None` otherwise.
    fn block_hash(&self, height: BlockHeight) -> Option<[u8; 32]>;

    // ── Fungible asset capability ────────────────────────────────────────────

    fn balance_of(&self, token: &Address, account: &Address) -> Balance;

    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), DmcError>;

    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), DmcError>;

    fn mint(
        &mut self,
        token: &Address,
        minter: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), DmcError>;

    fn burn(&mut self, token: &Address, holder: &Address, amount: Balance) -> Result<(), DmcError>;

    // ── Ownership bridge ─────────────────────────────────────────────────────

    /// Owner recorded by an external ownership registry at `bridge`.
    fn owner_of(&self, bridge: &Address, hash: &ContentHash) -> Option<Address>;

    // ── Observability ────────────────────────────────────────────────────────

    fn emit(&mut self, event: Event);
}
