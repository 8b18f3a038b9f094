// 3.0: the pool ledger seam. everything the manager needs from the underlying pool manager
// goes through the Ledger trait: session open/close, liquidity, swaps, fee growth reads and
// token movement. curve math and tick bookkeeping stay on the other side of this trait.

mod memory;

pub use memory::InMemoryLedger;

use crate::types::{AccountId, BalanceDelta, Currency, FeeGrowth, PoolKey, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifyLiquidityResult {
    // principal owed to (positive) or by (negative) the locker
    pub principal: BalanceDelta,
    // fees the locker's aggregated range position earned since it was last touched
    pub fees_accrued: BalanceDelta,
}

impl ModifyLiquidityResult {
    pub fn total(&self) -> BalanceDelta {
        self.principal + self.fees_accrued
    }
}

// Consumed interface of the pool ledger. all amounts flow through the single locker that
// opened the session; the ledger refuses to lock while any currency delta is nonzero.
pub trait Ledger {
    fn unlock(&mut self, locker: AccountId) -> Result<(), LedgerError>;

    fn lock(&mut self) -> Result<(), LedgerError>;

    fn locker(&self) -> Option<AccountId>;

    fn is_unlocked(&self) -> bool {
        self.locker().is_some()
    }

    // `hook_data` travels untouched to whatever the pool runs around the change
    fn modify_liquidity(
        &mut self,
        range: &Range,
        liquidity_delta: i128,
        hook_data: &[u8],
    ) -> Result<ModifyLiquidityResult, LedgerError>;

    // exact input swap. returns the locker's delta in pool currency order.
    fn swap(&mut self, pool: &PoolKey, zero_for_one: bool, amount_in: u128) -> Result<BalanceDelta, LedgerError>;

    fn fee_growth_inside(&self, range: &Range) -> Result<FeeGrowth, LedgerError>;

    // outstanding delta of the current locker. positive = ledger owes the locker.
    fn currency_delta(&self, currency: Currency) -> i128;

    // pay in from `payer`'s wallet
    fn settle(&mut self, currency: Currency, payer: AccountId, amount: u128) -> Result<(), LedgerError>;

    // pay out to `recipient`'s wallet
    fn take(&mut self, currency: Currency, recipient: AccountId, amount: u128) -> Result<(), LedgerError>;

    // leave the amount inside the ledger as a credit held by `recipient`
    fn mint_credit(&mut self, currency: Currency, recipient: AccountId, amount: u128) -> Result<(), LedgerError>;

    // spend a credit held by `holder`
    fn burn_credit(&mut self, currency: Currency, holder: AccountId, amount: u128) -> Result<(), LedgerError>;

    fn balance_of(&self, account: AccountId, currency: Currency) -> u128;

    fn credit_of(&self, account: AccountId, currency: Currency) -> u128;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger is already unlocked by {0}")]
    AlreadyUnlocked(AccountId),

    #[error("Ledger is not unlocked")]
    NotUnlocked,

    #[error("Currency {currency} not settled: outstanding delta {delta}")]
    CurrencyNotSettled { currency: Currency, delta: i128 },

    #[error("Pool {0:?} is not initialized")]
    PoolNotInitialized(PoolKey),

    #[error("Pool {0:?} is already initialized")]
    PoolAlreadyInitialized(PoolKey),

    #[error("Insufficient ledger liquidity on {range}: requested {requested}, available {available}")]
    InsufficientLiquidity { range: Range, requested: u128, available: u128 },

    #[error("Insufficient balance of {currency} for {account}: requested {requested}, available {available}")]
    InsufficientBalance { account: AccountId, currency: Currency, requested: u128, available: u128 },

    #[error("Insufficient credit of {currency} for {account}: requested {requested}, available {available}")]
    InsufficientCredit { account: AccountId, currency: Currency, requested: u128, available: u128 },

    #[error("Insufficient reserves of {currency}: requested {requested}, available {available}")]
    InsufficientReserves { currency: Currency, requested: u128, available: u128 },

    #[error("Amount overflow")]
    AmountOverflow,
}
