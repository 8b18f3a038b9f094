// 1.0: all the primitives live here. nothing in the manager works without these types.
// IDs, currencies, pool keys, ranges, deltas, fee growth, timestamps. each is a newtype
// so the compiler catches type mixups.

use primitive_types::{U256, U512};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Currency(pub u32);

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cur#{}", self.0)
    }
}

// 1.1: receipt id. zero is never issued, real ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReceiptId(pub u64);

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// 1.2: pool identity. currencies are always stored sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolKey {
    pub currency0: Currency,
    pub currency1: Currency,
    pub fee_bps: u32,
    pub tick_spacing: i32,
}

impl PoolKey {
    pub fn new(a: Currency, b: Currency, fee_bps: u32, tick_spacing: i32) -> Self {
        let (currency0, currency1) = if a <= b { (a, b) } else { (b, a) };
        Self {
            currency0,
            currency1,
            fee_bps,
            tick_spacing,
        }
    }

    pub fn currencies(&self) -> [Currency; 2] {
        [self.currency0, self.currency1]
    }

    // fee rate as a fraction. 30 bps → 0.003
    pub fn fee_fraction(&self) -> Decimal {
        Decimal::from(self.fee_bps) / dec!(10_000)
    }
}

// tick bounds of the price curve
pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

// 1.3: a liquidity band inside one pool. immutable once a position opens on it.
// fields are public for literals and decoding, so anything taking outside input checks is_valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Range {
    pub pool: PoolKey,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

impl Range {
    #[must_use]
    pub fn new(pool: PoolKey, tick_lower: i32, tick_upper: i32) -> Option<Self> {
        if tick_lower >= tick_upper || pool.tick_spacing <= 0 {
            return None;
        }
        if tick_lower < MIN_TICK || tick_upper > MAX_TICK {
            return None;
        }
        if tick_lower % pool.tick_spacing != 0 || tick_upper % pool.tick_spacing != 0 {
            return None;
        }
        Some(Self {
            pool,
            tick_lower,
            tick_upper,
        })
    }

    // lower inclusive, upper exclusive
    pub fn contains(&self, tick: i32) -> bool {
        self.tick_lower <= tick && tick < self.tick_upper
    }

    pub fn is_valid(&self) -> bool {
        Range::new(self.pool, self.tick_lower, self.tick_upper).is_some()
    }

    pub fn width(&self) -> i64 {
        i64::from(self.tick_upper) - i64::from(self.tick_lower)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}bps [{}, {})",
            self.pool.currency0, self.pool.currency1, self.pool.fee_bps, self.tick_lower, self.tick_upper
        )
    }
}

// 1.4: signed per-currency pair. positive = owed to the holder, negative = holder owes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub amount0: i128,
    pub amount1: i128,
}

impl BalanceDelta {
    pub const ZERO: BalanceDelta = BalanceDelta { amount0: 0, amount1: 0 };

    pub fn new(amount0: i128, amount1: i128) -> Self {
        Self { amount0, amount1 }
    }

    pub fn is_zero(&self) -> bool {
        self.amount0 == 0 && self.amount1 == 0
    }

    // owed amounts (u128) as a positive delta
    pub fn owed(amount0: u128, amount1: u128) -> Self {
        Self {
            amount0: to_signed(amount0),
            amount1: to_signed(amount1),
        }
    }

    pub fn with_currencies(&self, pool: &PoolKey) -> [(Currency, i128); 2] {
        [(pool.currency0, self.amount0), (pool.currency1, self.amount1)]
    }
}

impl Add for BalanceDelta {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            amount0: self.amount0.saturating_add(rhs.amount0),
            amount1: self.amount1.saturating_add(rhs.amount1),
        }
    }
}

impl AddAssign for BalanceDelta {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for BalanceDelta {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl Neg for BalanceDelta {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            amount0: self.amount0.saturating_neg(),
            amount1: self.amount1.saturating_neg(),
        }
    }
}

impl fmt::Display for BalanceDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.amount0, self.amount1)
    }
}

pub fn to_signed(amount: u128) -> i128 {
    i128::try_from(amount).unwrap_or(i128::MAX)
}

// 1.5: fee growth per unit of liquidity, Q128 fixed point. wraps like the ledger's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeGrowth {
    pub inside0_x128: U256,
    pub inside1_x128: U256,
}

impl FeeGrowth {
    pub fn new(inside0_x128: U256, inside1_x128: U256) -> Self {
        Self {
            inside0_x128,
            inside1_x128,
        }
    }

    pub fn since(&self, last: &FeeGrowth) -> FeeGrowth {
        FeeGrowth {
            inside0_x128: self.inside0_x128.overflowing_sub(last.inside0_x128).0,
            inside1_x128: self.inside1_x128.overflowing_sub(last.inside1_x128).0,
        }
    }
}

pub fn q128() -> U256 {
    U256::one() << 128
}

// 1.6: liquidity × growth / 2^128, full precision. returns (whole units, fractional remainder).
pub fn mul_q128(liquidity: u128, growth_x128: U256) -> (u128, u128) {
    let product: U512 = growth_x128.full_mul(U256::from(liquidity));
    split_q128(product)
}

// whole units for `liquidity` over `growth`, carrying the Q128 remainder forward
pub fn accrue_q128(liquidity: u128, growth_x128: U256, carry: &mut u128) -> u128 {
    let (whole, remainder) = mul_q128(liquidity, growth_x128);
    let (sum, overflow) = remainder.overflowing_add(*carry);
    // remainders are both < 2^128; a wrap means one more whole unit
    let extra = if overflow { 1 } else { 0 };
    *carry = sum;
    whole.saturating_add(extra)
}

pub fn split_q128(value: U512) -> (u128, u128) {
    let whole = value >> 128;
    let remainder = (value - (whole << 128)).low_u128();
    let whole = if whole > U512::from(u128::MAX) {
        u128::MAX
    } else {
        whole.low_u128()
    };
    (whole, remainder)
}

// 1.7: millisecond timestamp. doubles as the deadline type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub const MAX: Timestamp = Timestamp(i64::MAX);

    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn plus_millis(&self, ms: i64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}
