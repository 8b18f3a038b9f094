// 4.0: per-owner liquidity position. fees owed = liquidity * (growth_now - growth_last).
// 4.2 has the fee sync and 4.3 the liquidity delta logic at the bottom.

use crate::types::{accrue_q128, AccountId, FeeGrowth, Range, ReceiptId, Timestamp};
use serde::{Deserialize, Serialize};

// storage key for a position. salted with the receipt so two receipts never share a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub owner: AccountId,
    pub range: Range,
    pub salt: ReceiptId,
}

impl PositionKey {
    pub fn new(owner: AccountId, range: Range, salt: ReceiptId) -> Self {
        Self { owner, range, salt }
    }

    pub fn with_owner(&self, owner: AccountId) -> Self {
        Self { owner, ..*self }
    }
}

// Delegate allowed to act for the owner. expires at `expires_at` when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub account: AccountId,
    pub expires_at: Option<Timestamp>,
}

impl Operator {
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |expiry| now <= expiry)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub liquidity: u128,
    pub fee_growth_last: FeeGrowth,
    pub tokens_owed0: u128,
    pub tokens_owed1: u128,
    // Q128 remainders below one whole fee unit, paid out once they add up
    #[serde(default)]
    pub carry0: u128,
    #[serde(default)]
    pub carry1: u128,
    pub operator: Option<Operator>,
    pub nonce: u64,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Position {
    pub fn new(fee_growth: FeeGrowth, timestamp: Timestamp) -> Self {
        Self {
            liquidity: 0,
            fee_growth_last: fee_growth,
            tokens_owed0: 0,
            tokens_owed1: 0,
            carry0: 0,
            carry1: 0,
            operator: None,
            nonce: 0,
            opened_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn has_fees(&self) -> bool {
        self.tokens_owed0 > 0 || self.tokens_owed1 > 0
    }

    // nothing left to claim. the only state in which a position may be cleared.
    pub fn is_empty(&self) -> bool {
        self.liquidity == 0 && !self.has_fees()
    }

    pub fn fees_owed(&self) -> (u128, u128) {
        (self.tokens_owed0, self.tokens_owed1)
    }

    // 4.1: fees that would be owed if the position synced against `growth` right now
    pub fn pending_fees(&self, growth: &FeeGrowth) -> (u128, u128) {
        let mut preview = self.clone();
        sync_fees(&mut preview, *growth);
        preview.fees_owed()
    }

    pub fn is_operator(&self, account: AccountId, now: Timestamp) -> bool {
        self.operator
            .map_or(false, |op| op.account == account && op.is_live(now))
    }
}

// 4.2: fold fresh fee growth into tokens_owed and move the checkpoint. the fee formula is
// liquidity * (growth_now - growth_last) / 2^128; the fraction below one unit rides in the
// carry, so how often a position syncs never changes what it earns in total.
// must run before any liquidity change, otherwise fees earned at the old liquidity are lost.
pub fn sync_fees(position: &mut Position, growth: FeeGrowth) -> (u128, u128) {
    let (earned0, earned1) = if position.liquidity == 0 {
        (0, 0)
    } else {
        let delta = growth.since(&position.fee_growth_last);
        (
            accrue_q128(position.liquidity, delta.inside0_x128, &mut position.carry0),
            accrue_q128(position.liquidity, delta.inside1_x128, &mut position.carry1),
        )
    };
    position.tokens_owed0 = position.tokens_owed0.saturating_add(earned0);
    position.tokens_owed1 = position.tokens_owed1.saturating_add(earned1);
    position.fee_growth_last = growth;
    (earned0, earned1)
}

// 4.3: apply a signed liquidity delta. None when it would drive liquidity below zero.
pub fn apply_liquidity_delta(position: &Position, delta: i128, timestamp: Timestamp) -> Option<Position> {
    let liquidity = if delta >= 0 {
        position.liquidity.checked_add(delta.unsigned_abs())?
    } else {
        position.liquidity.checked_sub(delta.unsigned_abs())?
    };

    Some(Position {
        liquidity,
        updated_at: timestamp,
        ..position.clone()
    })
}
