// 5.0 registry.rs: receipts and the positions behind them.
// receipt → (owner, range), PositionKey → Position. every mutation pokes the ledger range
// first so the manager's aggregated range position is paid its fees, then pulls fresh fee
// growth into the position before the liquidity change lands.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::ledger::{Ledger, LedgerError};
use crate::position::{apply_liquidity_delta, sync_fees, Operator, Position, PositionKey};
use crate::types::{AccountId, BalanceDelta, Range, ReceiptId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub owner: AccountId,
    pub range: Range,
    pub minted_at: Timestamp,
}

impl ReceiptRecord {
    pub fn key(&self, receipt: ReceiptId) -> PositionKey {
        PositionKey::new(self.owner, self.range, receipt)
    }
}

/** 5.1: what one registry mutation owes whom. `caller` is principal and paid out fees,
`manager` is the fee residue the manager holds for positions on the same range. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Legs {
    pub caller: BalanceDelta,
    pub manager: BalanceDelta,
    // fees this position earned since its previous touch
    pub fees_earned: BalanceDelta,
    pub liquidity_after: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Receipt {0} does not exist")]
    UnknownReceipt(ReceiptId),

    #[error("Position for receipt {0} is missing")]
    PositionNotFound(ReceiptId),

    #[error("Position {receipt} is not empty: liquidity {liquidity}, owed ({owed0}, {owed1})")]
    PositionNotEmpty { receipt: ReceiptId, liquidity: u128, owed0: u128, owed1: u128 },

    #[error("Insufficient liquidity on {receipt}: requested {requested}, available {available}")]
    InsufficientLiquidity { receipt: ReceiptId, requested: u128, available: u128 },

    #[error("Liquidity amount {0} is out of range")]
    LiquidityOverflow(u128),

    #[error("Invalid range [{tick_lower}, {tick_upper}) for tick spacing {tick_spacing}")]
    InvalidRange { tick_lower: i32, tick_upper: i32, tick_spacing: i32 },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone)]
pub struct PositionRegistry {
    receipts: BTreeMap<ReceiptId, ReceiptRecord>,
    positions: HashMap<PositionKey, Position>,
    next_id: u64,
}

impl Default for PositionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self {
            receipts: BTreeMap::new(),
            positions: HashMap::new(),
            next_id: 1,
        }
    }

    // id the next mint will receive. ids are never reused.
    pub fn next_receipt_id(&self) -> ReceiptId {
        ReceiptId(self.next_id)
    }

    pub fn receipt(&self, receipt: ReceiptId) -> Option<&ReceiptRecord> {
        self.receipts.get(&receipt)
    }

    pub fn position(&self, receipt: ReceiptId) -> Option<&Position> {
        let record = self.receipts.get(&receipt)?;
        self.positions.get(&record.key(receipt))
    }

    pub fn position_mut(&mut self, receipt: ReceiptId) -> Result<&mut Position, RegistryError> {
        let key = self.key_of(receipt)?;
        self.positions
            .get_mut(&key)
            .ok_or(RegistryError::PositionNotFound(receipt))
    }

    pub fn owner_of(&self, receipt: ReceiptId) -> Result<AccountId, RegistryError> {
        self.receipts
            .get(&receipt)
            .map(|record| record.owner)
            .ok_or(RegistryError::UnknownReceipt(receipt))
    }

    pub fn receipts_of(&self, owner: AccountId) -> Vec<ReceiptId> {
        self.receipts
            .iter()
            .filter(|(_, record)| record.owner == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    // 5.2: new receipt plus its first liquidity. the position checkpoints the range's
    // current fee growth so it earns nothing from before it existed.
    pub fn open<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        owner: AccountId,
        range: Range,
        liquidity: u128,
        hook_data: &[u8],
        now: Timestamp,
    ) -> Result<(ReceiptId, Legs), RegistryError> {
        if !range.is_valid() {
            return Err(RegistryError::InvalidRange {
                tick_lower: range.tick_lower,
                tick_upper: range.tick_upper,
                tick_spacing: range.pool.tick_spacing,
            });
        }
        let delta = i128::try_from(liquidity).map_err(|_| RegistryError::LiquidityOverflow(liquidity))?;
        let modified = ledger.modify_liquidity(&range, delta, hook_data)?;
        let growth = ledger.fee_growth_inside(&range)?;

        let receipt = ReceiptId(self.next_id);
        self.next_id += 1;

        let mut position = Position::new(growth, now);
        position.liquidity = liquidity;

        let record = ReceiptRecord {
            owner,
            range,
            minted_at: now,
        };
        self.positions.insert(record.key(receipt), position);
        self.receipts.insert(receipt, record);

        Ok((
            receipt,
            Legs {
                caller: modified.principal,
                manager: modified.fees_accrued,
                fees_earned: BalanceDelta::ZERO,
                liquidity_after: liquidity,
            },
        ))
    }

    // 5.3: signed liquidity change on an existing position. overdraft is rejected before the
    // ledger is touched.
    pub fn adjust<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        receipt: ReceiptId,
        liquidity_delta: i128,
        hook_data: &[u8],
        now: Timestamp,
    ) -> Result<Legs, RegistryError> {
        let key = self.key_of(receipt)?;
        let current = self
            .positions
            .get(&key)
            .ok_or(RegistryError::PositionNotFound(receipt))?;

        let magnitude = liquidity_delta.unsigned_abs();
        if liquidity_delta < 0 && magnitude > current.liquidity {
            return Err(RegistryError::InsufficientLiquidity {
                receipt,
                requested: magnitude,
                available: current.liquidity,
            });
        }

        let modified = ledger.modify_liquidity(&key.range, liquidity_delta, hook_data)?;
        let growth = ledger.fee_growth_inside(&key.range)?;

        let mut synced = current.clone();
        let (earned0, earned1) = sync_fees(&mut synced, growth);
        let updated = apply_liquidity_delta(&synced, liquidity_delta, now).ok_or(
            RegistryError::InsufficientLiquidity {
                receipt,
                requested: magnitude,
                available: synced.liquidity,
            },
        )?;
        let liquidity_after = updated.liquidity;
        self.positions.insert(key, updated);

        Ok(Legs {
            caller: modified.principal,
            manager: modified.fees_accrued,
            fees_earned: BalanceDelta::owed(earned0, earned1),
            liquidity_after,
        })
    }

    // 5.4: pay out everything owed. the caller leg carries the owed fees; the manager leg
    // is what the poke accrued minus what left, so it goes negative when fees parked by
    // earlier pokes are paid now.
    pub fn collect<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        receipt: ReceiptId,
        hook_data: &[u8],
        now: Timestamp,
    ) -> Result<Legs, RegistryError> {
        let key = self.key_of(receipt)?;
        if !self.positions.contains_key(&key) {
            return Err(RegistryError::PositionNotFound(receipt));
        }

        let modified = ledger.modify_liquidity(&key.range, 0, hook_data)?;
        let growth = ledger.fee_growth_inside(&key.range)?;

        let position = self
            .positions
            .get_mut(&key)
            .ok_or(RegistryError::PositionNotFound(receipt))?;
        let (earned0, earned1) = sync_fees(position, growth);
        let paid = BalanceDelta::owed(position.tokens_owed0, position.tokens_owed1);
        position.tokens_owed0 = 0;
        position.tokens_owed1 = 0;
        position.updated_at = now;

        Ok(Legs {
            caller: paid,
            manager: modified.fees_accrued - paid,
            fees_earned: BalanceDelta::owed(earned0, earned1),
            liquidity_after: position.liquidity,
        })
    }

    pub fn ensure_empty(&self, receipt: ReceiptId) -> Result<(), RegistryError> {
        let position = self
            .position(receipt)
            .ok_or(RegistryError::UnknownReceipt(receipt))?;
        if !position.is_empty() {
            return Err(RegistryError::PositionNotEmpty {
                receipt,
                liquidity: position.liquidity,
                owed0: position.tokens_owed0,
                owed1: position.tokens_owed1,
            });
        }
        Ok(())
    }

    // 5.5: clear an empty position and retire its receipt
    pub fn close(&mut self, receipt: ReceiptId) -> Result<ReceiptRecord, RegistryError> {
        self.ensure_empty(receipt)?;
        let record = self
            .receipts
            .remove(&receipt)
            .ok_or(RegistryError::UnknownReceipt(receipt))?;
        self.positions.remove(&record.key(receipt));
        Ok(record)
    }

    // 5.6: move the record to the new owner's key. the operator does not travel.
    pub fn transfer_record(&mut self, receipt: ReceiptId, to: AccountId, now: Timestamp) -> Result<AccountId, RegistryError> {
        let record = self
            .receipts
            .get_mut(&receipt)
            .ok_or(RegistryError::UnknownReceipt(receipt))?;
        let from = record.owner;
        let old_key = record.key(receipt);

        let mut position = self
            .positions
            .remove(&old_key)
            .ok_or(RegistryError::PositionNotFound(receipt))?;
        position.operator = None;
        position.updated_at = now;

        record.owner = to;
        self.positions.insert(old_key.with_owner(to), position);
        Ok(from)
    }

    pub fn set_operator(&mut self, receipt: ReceiptId, operator: Option<Operator>, now: Timestamp) -> Result<(), RegistryError> {
        let position = self.position_mut(receipt)?;
        position.operator = operator;
        position.updated_at = now;
        Ok(())
    }

    // bumps the nonce and returns the new value
    pub fn use_nonce(&mut self, receipt: ReceiptId) -> Result<u64, RegistryError> {
        let position = self.position_mut(receipt)?;
        position.nonce += 1;
        Ok(position.nonce)
    }

    fn key_of(&self, receipt: ReceiptId) -> Result<PositionKey, RegistryError> {
        self.receipts
            .get(&receipt)
            .map(|record| record.key(receipt))
            .ok_or(RegistryError::UnknownReceipt(receipt))
    }
}
