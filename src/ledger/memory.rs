// 3.1 ledger/memory.rs: MOCKED pool manager. deterministic, in-memory, used by the simulator
// and tests. the price curve is a linear stand-in: a range's principal splits between the
// two currencies by where the current tick sits, and swaps fill 1:1 minus the pool fee.

use primitive_types::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::{Ledger, LedgerError, ModifyLiquidityResult};
use crate::types::{
    accrue_q128, to_signed, AccountId, BalanceDelta, Currency, FeeGrowth, PoolKey, Range,
};

#[derive(Debug, Clone, Default)]
struct LedgerPosition {
    liquidity: u128,
    fee_growth_last: FeeGrowth,
    // sub-unit fee remainders (Q128) so repeated pokes never round away owed fees
    carry0: u128,
    carry1: u128,
}

#[derive(Debug, Clone, Default)]
struct RangeState {
    liquidity: u128,
    fee_growth: FeeGrowth,
    positions: HashMap<AccountId, LedgerPosition>,
}

#[derive(Debug, Clone)]
struct PoolState {
    tick: i32,
    ranges: HashMap<(i32, i32), RangeState>,
}

impl PoolState {
    fn active_liquidity(&self) -> u128 {
        self.ranges
            .iter()
            .filter(|((lower, upper), _)| *lower <= self.tick && self.tick < *upper)
            .map(|(_, state)| state.liquidity)
            .fold(0u128, |acc, l| acc.saturating_add(l))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    pools: HashMap<PoolKey, PoolState>,
    wallets: HashMap<(AccountId, Currency), u128>,
    credits: HashMap<(AccountId, Currency), u128>,
    reserves: HashMap<Currency, u128>,
    deltas: HashMap<Currency, i128>,
    locker: Option<AccountId>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize_pool(&mut self, pool: PoolKey, tick: i32) -> Result<(), LedgerError> {
        if self.pools.contains_key(&pool) {
            return Err(LedgerError::PoolAlreadyInitialized(pool));
        }
        self.pools.insert(
            pool,
            PoolState {
                tick,
                ranges: HashMap::new(),
            },
        );
        Ok(())
    }

    pub fn set_tick(&mut self, pool: &PoolKey, tick: i32) -> Result<(), LedgerError> {
        let state = self
            .pools
            .get_mut(pool)
            .ok_or(LedgerError::PoolNotInitialized(*pool))?;
        state.tick = tick;
        Ok(())
    }

    pub fn tick(&self, pool: &PoolKey) -> Option<i32> {
        self.pools.get(pool).map(|state| state.tick)
    }

    // faucet for simulations
    pub fn mint_tokens(&mut self, account: AccountId, currency: Currency, amount: u128) {
        let balance = self.wallets.entry((account, currency)).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn reserves_of(&self, currency: Currency) -> u128 {
        self.reserves.get(&currency).copied().unwrap_or(0)
    }

    pub fn range_liquidity(&self, range: &Range) -> u128 {
        self.pools
            .get(&range.pool)
            .and_then(|state| state.ranges.get(&(range.tick_lower, range.tick_upper)))
            .map_or(0, |state| state.liquidity)
    }

    // one-shot trade outside any manager session: unlock, swap, pay in, pay out, lock
    pub fn swap_exact_in(
        &mut self,
        trader: AccountId,
        pool: &PoolKey,
        zero_for_one: bool,
        amount_in: u128,
    ) -> Result<u128, LedgerError> {
        let (input, output) = if zero_for_one {
            (pool.currency0, pool.currency1)
        } else {
            (pool.currency1, pool.currency0)
        };

        self.unlock(trader)?;
        match self.fill_swap(trader, pool, zero_for_one, amount_in, input, output) {
            Ok(out) => {
                self.lock()?;
                Ok(out)
            }
            Err(e) => {
                self.deltas.clear();
                self.locker = None;
                Err(e)
            }
        }
    }

    fn fill_swap(
        &mut self,
        trader: AccountId,
        pool: &PoolKey,
        zero_for_one: bool,
        amount_in: u128,
        input: Currency,
        output: Currency,
    ) -> Result<u128, LedgerError> {
        let delta = self.swap(pool, zero_for_one, amount_in)?;
        let out = if zero_for_one { delta.amount1 } else { delta.amount0 };
        let out = out.max(0).unsigned_abs();
        self.settle(input, trader, amount_in)?;
        self.take(output, trader, out)?;
        Ok(out)
    }

    fn require_locker(&self) -> Result<AccountId, LedgerError> {
        self.locker.ok_or(LedgerError::NotUnlocked)
    }

    fn account_delta(&mut self, currency: Currency, delta: i128) {
        if delta == 0 {
            return;
        }
        let entry = self.deltas.entry(currency).or_insert(0);
        *entry = entry.saturating_add(delta);
        if *entry == 0 {
            self.deltas.remove(&currency);
        }
    }

    fn account_pair(&mut self, pool: &PoolKey, delta: BalanceDelta) {
        self.account_delta(pool.currency0, delta.amount0);
        self.account_delta(pool.currency1, delta.amount1);
    }
}

// principal for `liquidity` units on `range` at `tick`. rounds up when the locker pays.
fn amounts_for_liquidity(
    range: &Range,
    tick: i32,
    liquidity: u128,
    round_up: bool,
) -> Result<(u128, u128), LedgerError> {
    if tick < range.tick_lower {
        return Ok((liquidity, 0));
    }
    if tick >= range.tick_upper {
        return Ok((0, liquidity));
    }

    let signed = i128::try_from(liquidity).map_err(|_| LedgerError::AmountOverflow)?;
    let total = Decimal::try_from_i128_with_scale(signed, 0).map_err(|_| LedgerError::AmountOverflow)?;
    let share0 = Decimal::from(i64::from(range.tick_upper) - i64::from(tick)) / Decimal::from(range.width());
    let raw0 = total * share0;
    let raw1 = total - raw0;

    let round = |value: Decimal| {
        let rounded = if round_up { value.ceil() } else { value.floor() };
        rounded.to_u128().ok_or(LedgerError::AmountOverflow)
    };
    Ok((round(raw0)?, round(raw1)?))
}

impl Ledger for InMemoryLedger {
    fn unlock(&mut self, locker: AccountId) -> Result<(), LedgerError> {
        if let Some(current) = self.locker {
            return Err(LedgerError::AlreadyUnlocked(current));
        }
        self.locker = Some(locker);
        Ok(())
    }

    fn lock(&mut self) -> Result<(), LedgerError> {
        self.require_locker()?;
        if let Some((currency, delta)) = self.deltas.iter().min_by_key(|(c, _)| **c) {
            return Err(LedgerError::CurrencyNotSettled {
                currency: *currency,
                delta: *delta,
            });
        }
        self.locker = None;
        Ok(())
    }

    fn locker(&self) -> Option<AccountId> {
        self.locker
    }

    fn modify_liquidity(
        &mut self,
        range: &Range,
        liquidity_delta: i128,
        _hook_data: &[u8],
    ) -> Result<ModifyLiquidityResult, LedgerError> {
        let locker = self.require_locker()?;
        let pool = self
            .pools
            .get_mut(&range.pool)
            .ok_or(LedgerError::PoolNotInitialized(range.pool))?;
        let tick = pool.tick;
        let state = pool
            .ranges
            .entry((range.tick_lower, range.tick_upper))
            .or_default();
        let growth = state.fee_growth;
        let position = state.positions.entry(locker).or_default();

        let magnitude = liquidity_delta.unsigned_abs();
        if liquidity_delta < 0 && position.liquidity < magnitude {
            return Err(LedgerError::InsufficientLiquidity {
                range: *range,
                requested: magnitude,
                available: position.liquidity,
            });
        }

        // poke: fees owed to the aggregated position since its last touch
        let delta = growth.since(&position.fee_growth_last);
        let fees0 = accrue_q128(position.liquidity, delta.inside0_x128, &mut position.carry0);
        let fees1 = accrue_q128(position.liquidity, delta.inside1_x128, &mut position.carry1);
        position.fee_growth_last = growth;

        let principal = if liquidity_delta >= 0 {
            position.liquidity = position
                .liquidity
                .checked_add(magnitude)
                .ok_or(LedgerError::AmountOverflow)?;
            state.liquidity = state.liquidity.saturating_add(magnitude);
            let (amount0, amount1) = amounts_for_liquidity(range, tick, magnitude, true)?;
            -BalanceDelta::owed(amount0, amount1)
        } else {
            position.liquidity -= magnitude;
            state.liquidity = state.liquidity.saturating_sub(magnitude);
            let (amount0, amount1) = amounts_for_liquidity(range, tick, magnitude, false)?;
            BalanceDelta::owed(amount0, amount1)
        };

        let result = ModifyLiquidityResult {
            principal,
            fees_accrued: BalanceDelta::owed(fees0, fees1),
        };
        self.account_pair(&range.pool, result.total());
        Ok(result)
    }

    fn swap(&mut self, pool: &PoolKey, zero_for_one: bool, amount_in: u128) -> Result<BalanceDelta, LedgerError> {
        self.require_locker()?;
        let fee_fraction = pool.fee_fraction();
        let state = self
            .pools
            .get_mut(pool)
            .ok_or(LedgerError::PoolNotInitialized(*pool))?;

        let signed = i128::try_from(amount_in).map_err(|_| LedgerError::AmountOverflow)?;
        let fee = (Decimal::try_from_i128_with_scale(signed, 0).map_err(|_| LedgerError::AmountOverflow)?
            * fee_fraction)
            .floor()
            .to_u128()
            .ok_or(LedgerError::AmountOverflow)?;
        let amount_out = amount_in - fee.min(amount_in);

        // fees go to every range straddling the current tick, pro rata per unit of liquidity
        let active = state.active_liquidity();
        if active > 0 && fee > 0 {
            let growth = (U256::from(fee) << 128) / U256::from(active);
            let tick = state.tick;
            for ((lower, upper), range_state) in state.ranges.iter_mut() {
                if *lower <= tick && tick < *upper && range_state.liquidity > 0 {
                    let slot = if zero_for_one {
                        &mut range_state.fee_growth.inside0_x128
                    } else {
                        &mut range_state.fee_growth.inside1_x128
                    };
                    *slot = slot.overflowing_add(growth).0;
                }
            }
        }

        let delta = if zero_for_one {
            BalanceDelta::new(-to_signed(amount_in), to_signed(amount_out))
        } else {
            BalanceDelta::new(to_signed(amount_out), -to_signed(amount_in))
        };
        self.account_pair(pool, delta);
        Ok(delta)
    }

    fn fee_growth_inside(&self, range: &Range) -> Result<FeeGrowth, LedgerError> {
        let pool = self
            .pools
            .get(&range.pool)
            .ok_or(LedgerError::PoolNotInitialized(range.pool))?;
        Ok(pool
            .ranges
            .get(&(range.tick_lower, range.tick_upper))
            .map(|state| state.fee_growth)
            .unwrap_or_default())
    }

    fn currency_delta(&self, currency: Currency) -> i128 {
        self.deltas.get(&currency).copied().unwrap_or(0)
    }

    fn settle(&mut self, currency: Currency, payer: AccountId, amount: u128) -> Result<(), LedgerError> {
        self.require_locker()?;
        let available = self.balance_of(payer, currency);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: payer,
                currency,
                requested: amount,
                available,
            });
        }
        self.wallets.insert((payer, currency), available - amount);
        let reserve = self.reserves.entry(currency).or_insert(0);
        *reserve = reserve.saturating_add(amount);
        self.account_delta(currency, to_signed(amount));
        Ok(())
    }

    fn take(&mut self, currency: Currency, recipient: AccountId, amount: u128) -> Result<(), LedgerError> {
        self.require_locker()?;
        let available = self.reserves_of(currency);
        if available < amount {
            return Err(LedgerError::InsufficientReserves {
                currency,
                requested: amount,
                available,
            });
        }
        self.reserves.insert(currency, available - amount);
        self.mint_tokens(recipient, currency, amount);
        self.account_delta(currency, -to_signed(amount));
        Ok(())
    }

    fn mint_credit(&mut self, currency: Currency, recipient: AccountId, amount: u128) -> Result<(), LedgerError> {
        self.require_locker()?;
        let credit = self.credits.entry((recipient, currency)).or_insert(0);
        *credit = credit.saturating_add(amount);
        self.account_delta(currency, -to_signed(amount));
        Ok(())
    }

    fn burn_credit(&mut self, currency: Currency, holder: AccountId, amount: u128) -> Result<(), LedgerError> {
        self.require_locker()?;
        let available = self.credit_of(holder, currency);
        if available < amount {
            return Err(LedgerError::InsufficientCredit {
                account: holder,
                currency,
                requested: amount,
                available,
            });
        }
        self.credits.insert((holder, currency), available - amount);
        self.account_delta(currency, to_signed(amount));
        Ok(())
    }

    fn balance_of(&self, account: AccountId, currency: Currency) -> u128 {
        self.wallets.get(&(account, currency)).copied().unwrap_or(0)
    }

    fn credit_of(&self, account: AccountId, currency: Currency) -> u128 {
        self.credits.get(&(account, currency)).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::mul_q128;

    const LP: AccountId = AccountId(1);
    const TRADER: AccountId = AccountId(2);

    fn pool() -> PoolKey {
        PoolKey::new(Currency(1), Currency(2), 100, 60)
    }

    fn ledger() -> InMemoryLedger {
        let mut ledger = InMemoryLedger::new();
        ledger.initialize_pool(pool(), 0).unwrap();
        ledger
    }

    #[test]
    fn unlock_is_exclusive() {
        let mut ledger = ledger();
        ledger.unlock(LP).unwrap();
        assert_eq!(ledger.unlock(TRADER), Err(LedgerError::AlreadyUnlocked(LP)));
        ledger.lock().unwrap();
        assert!(!ledger.is_unlocked());
    }

    #[test]
    fn lock_rejects_open_deltas() {
        let mut ledger = ledger();
        let range = Range::new(pool(), -60, 60).unwrap();
        ledger.unlock(LP).unwrap();
        let result = ledger.modify_liquidity(&range, 1000, &[]).unwrap();
        assert_eq!(result.principal, BalanceDelta::new(-500, -500));
        assert!(matches!(ledger.lock(), Err(LedgerError::CurrencyNotSettled { .. })));
    }

    #[test]
    fn add_then_settle_then_lock() {
        let mut ledger = ledger();
        let range = Range::new(pool(), -60, 60).unwrap();
        ledger.mint_tokens(LP, Currency(1), 1000);
        ledger.mint_tokens(LP, Currency(2), 1000);

        ledger.unlock(LP).unwrap();
        ledger.modify_liquidity(&range, 1000, &[]).unwrap();
        ledger.settle(Currency(1), LP, 500).unwrap();
        ledger.settle(Currency(2), LP, 500).unwrap();
        ledger.lock().unwrap();

        assert_eq!(ledger.balance_of(LP, Currency(1)), 500);
        assert_eq!(ledger.reserves_of(Currency(2)), 500);
        assert_eq!(ledger.range_liquidity(&range), 1000);
    }

    #[test]
    fn out_of_range_principal_is_single_sided() {
        let range = Range::new(pool(), 60, 120).unwrap();
        assert_eq!(amounts_for_liquidity(&range, 0, 100, true).unwrap(), (100, 0));
        assert_eq!(amounts_for_liquidity(&range, 120, 100, true).unwrap(), (0, 100));
    }

    #[test]
    fn rounding_favors_the_ledger() {
        let range = Range::new(pool(), -60, 120).unwrap();
        // share0 = 120/180 = 2/3
        assert_eq!(amounts_for_liquidity(&range, 0, 100, true).unwrap(), (67, 34));
        assert_eq!(amounts_for_liquidity(&range, 0, 100, false).unwrap(), (66, 33));
    }

    #[test]
    fn swap_distributes_fee_growth() {
        let mut ledger = ledger();
        let range = Range::new(pool(), -60, 60).unwrap();
        ledger.mint_tokens(LP, Currency(1), 10_000);
        ledger.mint_tokens(LP, Currency(2), 10_000);
        ledger.mint_tokens(TRADER, Currency(1), 1_000);

        ledger.unlock(LP).unwrap();
        ledger.modify_liquidity(&range, 2000, &[]).unwrap();
        ledger.settle(Currency(1), LP, 1000).unwrap();
        ledger.settle(Currency(2), LP, 1000).unwrap();
        ledger.lock().unwrap();

        let out = ledger.swap_exact_in(TRADER, &pool(), true, 1000).unwrap();
        assert_eq!(out, 990);
        assert_eq!(ledger.balance_of(TRADER, Currency(2)), 990);

        let growth = ledger.fee_growth_inside(&range).unwrap();
        assert_eq!(mul_q128(2000, growth.inside0_x128).0, 9); // 10 fee, floor on growth
        assert!(growth.inside1_x128.is_zero());

        // poke pays the aggregated fee
        ledger.unlock(LP).unwrap();
        let poke = ledger.modify_liquidity(&range, 0, &[]).unwrap();
        assert_eq!(poke.principal, BalanceDelta::ZERO);
        assert!(poke.fees_accrued.amount0 >= 9);
        assert_eq!(poke.fees_accrued.amount1, 0);
    }

    #[test]
    fn credits_round_trip() {
        let mut ledger = ledger();
        ledger.mint_tokens(LP, Currency(1), 100);
        ledger.unlock(LP).unwrap();
        ledger.settle(Currency(1), LP, 100).unwrap();
        ledger.mint_credit(Currency(1), LP, 100).unwrap();
        ledger.lock().unwrap();
        assert_eq!(ledger.credit_of(LP, Currency(1)), 100);

        ledger.unlock(LP).unwrap();
        assert!(matches!(
            ledger.burn_credit(Currency(1), LP, 101),
            Err(LedgerError::InsufficientCredit { .. })
        ));
        ledger.burn_credit(Currency(1), LP, 100).unwrap();
        ledger.take(Currency(1), LP, 100).unwrap();
        ledger.lock().unwrap();
        assert_eq!(ledger.balance_of(LP, Currency(1)), 100);
    }

    #[test]
    fn removing_more_than_held_fails() {
        let mut ledger = ledger();
        let range = Range::new(pool(), -60, 60).unwrap();
        ledger.unlock(LP).unwrap();
        assert!(matches!(
            ledger.modify_liquidity(&range, -1, &[]),
            Err(LedgerError::InsufficientLiquidity { .. })
        ));
    }
}
