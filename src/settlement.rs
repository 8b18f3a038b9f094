// 6.0 settlement.rs: session netting. every step folds its signed deltas into a running
// balance per (participant, currency); close flushes each balance against the ledger.
// lives for one session only.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::ledger::{Ledger, LedgerError};
use crate::types::{to_signed, AccountId, BalanceDelta, Currency, PoolKey};

// Token movements the netting layer asked the ledger for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementInstruction {
    // ledger pays out to a wallet
    Take {
        currency: Currency,
        to: AccountId,
        amount: u128,
    },

    // ledger keeps the tokens and credits the recipient
    MintCredit {
        currency: Currency,
        to: AccountId,
        amount: u128,
    },

    // participant pays in from its wallet
    Settle {
        currency: Currency,
        from: AccountId,
        amount: u128,
    },

    // participant spends a ledger credit
    BurnCredit {
        currency: Currency,
        from: AccountId,
        amount: u128,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    #[error("Insufficient funds: {participant} must supply {required} of {currency}")]
    InsufficientFunds { participant: AccountId, currency: Currency, required: u128 },

    #[error("Delta for {currency} held by {participant} is {balance}, expected it to be non-positive")]
    DeltaNotNegative { participant: AccountId, currency: Currency, balance: i128 },

    #[error("Delta for {currency} held by {participant} is {balance}, expected it to be non-negative")]
    DeltaNotPositive { participant: AccountId, currency: Currency, balance: i128 },

    #[error("Conservation violated for {currency}: legs sum to {legs}, ledger holds {ledger}")]
    ConservationViolated { currency: Currency, legs: i128, ledger: i128 },

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for SettlementError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientBalance { account, currency, requested, .. }
            | LedgerError::InsufficientCredit { account, currency, requested, .. } => {
                SettlementError::InsufficientFunds {
                    participant: account,
                    currency,
                    required: requested,
                }
            }
            other => SettlementError::Ledger(other),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeltaBook {
    // outstanding per leg. zero entries are removed
    open: HashMap<(AccountId, Currency), i128>,
    // what each leg actually received (+) or paid (-) at close
    settled: HashMap<(AccountId, Currency), i128>,
    instructions: Vec<SettlementInstruction>,
}

impl DeltaBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, participant: AccountId, currency: Currency, delta: i128) {
        if delta == 0 {
            return;
        }
        let entry = self.open.entry((participant, currency)).or_insert(0);
        *entry = entry.saturating_add(delta);
        if *entry == 0 {
            self.open.remove(&(participant, currency));
        }
    }

    pub fn fold_pair(&mut self, participant: AccountId, pool: &PoolKey, delta: BalanceDelta) {
        for (currency, amount) in delta.with_currencies(pool) {
            self.fold(participant, currency, amount);
        }
    }

    pub fn balance(&self, participant: AccountId, currency: Currency) -> i128 {
        self.open.get(&(participant, currency)).copied().unwrap_or(0)
    }

    pub fn settled(&self, participant: AccountId, currency: Currency) -> i128 {
        self.settled.get(&(participant, currency)).copied().unwrap_or(0)
    }

    // sum over every leg for one currency
    pub fn net(&self, currency: Currency) -> i128 {
        self.open
            .iter()
            .filter(|((_, c), _)| *c == currency)
            .map(|(_, v)| *v)
            .fold(0i128, |acc, v| acc.saturating_add(v))
    }

    pub fn open_currencies(&self) -> Vec<Currency> {
        let mut currencies: Vec<Currency> = self.open.keys().map(|(_, c)| *c).collect();
        currencies.sort();
        currencies.dedup();
        currencies
    }

    pub fn is_flat(&self) -> bool {
        self.open.is_empty()
    }

    pub fn instructions(&self) -> &[SettlementInstruction] {
        &self.instructions
    }

    // legs must mirror the ledger exactly. anything else means a step misattributed a delta.
    pub fn check_conservation<L: Ledger + ?Sized>(&self, ledger: &L, currency: Currency) -> Result<(), SettlementError> {
        let legs = self.net(currency);
        let held = ledger.currency_delta(currency);
        if legs != held {
            return Err(SettlementError::ConservationViolated {
                currency,
                legs,
                ledger: held,
            });
        }
        Ok(())
    }

    // flush one leg. positive pays `recipient`, negative charges `participant`.
    pub fn close<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        currency: Currency,
        participant: AccountId,
        recipient: AccountId,
        use_credit: bool,
    ) -> Result<i128, SettlementError> {
        let balance = self.balance(participant, currency);
        if balance > 0 {
            self.pay_out(ledger, currency, participant, recipient, balance.unsigned_abs(), use_credit)?;
        } else if balance < 0 {
            self.pay_in(ledger, currency, participant, balance.unsigned_abs(), use_credit)?;
        }
        Ok(balance)
    }

    // whole outstanding debt of the leg, paid from its wallet
    pub fn settle_all<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        currency: Currency,
        participant: AccountId,
    ) -> Result<u128, SettlementError> {
        let balance = self.balance(participant, currency);
        if balance > 0 {
            return Err(SettlementError::DeltaNotNegative {
                participant,
                currency,
                balance,
            });
        }
        let amount = balance.unsigned_abs();
        if amount > 0 {
            self.pay_in(ledger, currency, participant, amount, false)?;
        }
        Ok(amount)
    }

    // whole outstanding credit of the leg, paid to `recipient`
    pub fn take_all<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        currency: Currency,
        participant: AccountId,
        recipient: AccountId,
    ) -> Result<u128, SettlementError> {
        let balance = self.balance(participant, currency);
        if balance < 0 {
            return Err(SettlementError::DeltaNotPositive {
                participant,
                currency,
                balance,
            });
        }
        let amount = balance.unsigned_abs();
        if amount > 0 {
            self.pay_out(ledger, currency, participant, recipient, amount, false)?;
        }
        Ok(amount)
    }

    // move exactly `amount` against the leg right now. positive pays `recipient`,
    // negative charges `participant`. used for per-step settlement and foreign recipients.
    pub fn flush<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        currency: Currency,
        participant: AccountId,
        recipient: AccountId,
        amount: i128,
        use_credit: bool,
    ) -> Result<(), SettlementError> {
        if amount > 0 {
            self.pay_out(ledger, currency, participant, recipient, amount.unsigned_abs(), use_credit)
        } else if amount < 0 {
            self.pay_in(ledger, currency, participant, amount.unsigned_abs(), use_credit)
        } else {
            Ok(())
        }
    }

    // net movement per account across the executed instructions
    pub fn net_flows(&self) -> BTreeMap<(AccountId, Currency), Decimal> {
        let mut flows = BTreeMap::new();
        for instruction in &self.instructions {
            let (key, amount) = match instruction {
                SettlementInstruction::Take { currency, to, amount }
                | SettlementInstruction::MintCredit { currency, to, amount } => {
                    ((*to, *currency), Decimal::from(*amount))
                }
                SettlementInstruction::Settle { currency, from, amount }
                | SettlementInstruction::BurnCredit { currency, from, amount } => {
                    ((*from, *currency), -Decimal::from(*amount))
                }
            };
            *flows.entry(key).or_insert(Decimal::ZERO) += amount;
        }
        flows
    }

    fn pay_out<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        currency: Currency,
        participant: AccountId,
        recipient: AccountId,
        amount: u128,
        use_credit: bool,
    ) -> Result<(), SettlementError> {
        let instruction = if use_credit {
            ledger.mint_credit(currency, recipient, amount)?;
            SettlementInstruction::MintCredit {
                currency,
                to: recipient,
                amount,
            }
        } else {
            ledger.take(currency, recipient, amount)?;
            SettlementInstruction::Take {
                currency,
                to: recipient,
                amount,
            }
        };
        self.record(participant, currency, to_signed(amount), instruction);
        Ok(())
    }

    fn pay_in<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        currency: Currency,
        participant: AccountId,
        amount: u128,
        use_credit: bool,
    ) -> Result<(), SettlementError> {
        let instruction = if use_credit {
            ledger.burn_credit(currency, participant, amount)?;
            SettlementInstruction::BurnCredit {
                currency,
                from: participant,
                amount,
            }
        } else {
            ledger.settle(currency, participant, amount)?;
            SettlementInstruction::Settle {
                currency,
                from: participant,
                amount,
            }
        };
        self.record(participant, currency, -to_signed(amount), instruction);
        Ok(())
    }

    // a payout of `moved` clears the same amount of the leg's open balance
    fn record(&mut self, participant: AccountId, currency: Currency, moved: i128, instruction: SettlementInstruction) {
        self.fold(participant, currency, -moved);
        let settled = self.settled.entry((participant, currency)).or_insert(0);
        *settled = settled.saturating_add(moved);
        self.instructions.push(instruction);
    }
}
