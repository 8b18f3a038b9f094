//! Notification dispatcher.
//!
//! At most one external observer per receipt. Subscribe runs the observer with an unbounded
//! budget and fails if it fails. Unsubscribe always clears the registration and runs the
//! observer under a small fixed stipend; whatever the observer does is swallowed. Liquidity
//! and transfer notifications go to the current observer, or to the null observer when
//! there is none.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::types::{AccountId, BalanceDelta, ReceiptId};

// 6.3: observer trait, gas budget and the dispatcher
/// Gas available to one observer call. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasBudget {
    limit: Option<u64>,
    used: u64,
}

impl GasBudget {
    pub fn unlimited() -> Self {
        Self { limit: None, used: 0 }
    }

    pub fn limited(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            used: 0,
        }
    }

    /// Spends gas, failing once the stipend is exhausted.
    pub fn charge(&mut self, gas: u64) -> Result<(), NotifyError> {
        let next = self.used.saturating_add(gas);
        if let Some(limit) = self.limit {
            if next > limit {
                self.used = limit;
                return Err(NotifyError::OutOfGas { limit });
            }
        }
        self.used = next;
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|limit| limit.saturating_sub(self.used))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("Observer ran out of gas (stipend {limit})")]
    OutOfGas { limit: u64 },

    #[error("Observer reverted: {0}")]
    Reverted(String),

    #[error("Observer panicked")]
    Panicked,
}

/// External observer of receipt lifecycle events.
pub trait Subscriber: fmt::Debug {
    fn notify_subscribe(&self, receipt: ReceiptId, data: &[u8], gas: &mut GasBudget) -> Result<(), NotifyError>;

    fn notify_unsubscribe(&self, receipt: ReceiptId, data: &[u8], gas: &mut GasBudget) -> Result<(), NotifyError>;

    fn notify_modify_liquidity(
        &self,
        receipt: ReceiptId,
        liquidity_change: i128,
        fees_accrued: BalanceDelta,
        gas: &mut GasBudget,
    ) -> Result<(), NotifyError>;

    fn notify_transfer(
        &self,
        receipt: ReceiptId,
        from: AccountId,
        to: AccountId,
        gas: &mut GasBudget,
    ) -> Result<(), NotifyError>;
}

/// Absorbs every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSubscriber;

impl Subscriber for NullSubscriber {
    fn notify_subscribe(&self, _: ReceiptId, _: &[u8], _: &mut GasBudget) -> Result<(), NotifyError> {
        Ok(())
    }

    fn notify_unsubscribe(&self, _: ReceiptId, _: &[u8], _: &mut GasBudget) -> Result<(), NotifyError> {
        Ok(())
    }

    fn notify_modify_liquidity(&self, _: ReceiptId, _: i128, _: BalanceDelta, _: &mut GasBudget) -> Result<(), NotifyError> {
        Ok(())
    }

    fn notify_transfer(&self, _: ReceiptId, _: AccountId, _: AccountId, _: &mut GasBudget) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Receipt {0} already has a subscriber")]
    AlreadySubscribed(ReceiptId),

    #[error("Receipt {0} has no subscriber")]
    NotSubscribed(ReceiptId),

    #[error("Subscriber rejected receipt {receipt}: {source}")]
    SubscriptionReverted { receipt: ReceiptId, source: NotifyError },
}

/// What happened to the observer call of an unsubscribe. The registration is gone either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeOutcome {
    pub notification: Result<(), NotifyError>,
    pub gas_used: u64,
}

#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    subscribers: HashMap<ReceiptId, Arc<dyn Subscriber>>,
    null: Arc<dyn Subscriber>,
    unsubscribe_gas_limit: u64,
}

impl NotificationDispatcher {
    pub fn new(unsubscribe_gas_limit: u64) -> Self {
        Self {
            subscribers: HashMap::new(),
            null: Arc::new(NullSubscriber),
            unsubscribe_gas_limit,
        }
    }

    pub fn unsubscribe_gas_limit(&self) -> u64 {
        self.unsubscribe_gas_limit
    }

    pub fn is_subscribed(&self, receipt: ReceiptId) -> bool {
        self.subscribers.contains_key(&receipt)
    }

    /// Current observer, or the null observer.
    pub fn subscriber_of(&self, receipt: ReceiptId) -> Arc<dyn Subscriber> {
        self.subscribers
            .get(&receipt)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.null))
    }

    pub fn subscribe(
        &mut self,
        receipt: ReceiptId,
        subscriber: Arc<dyn Subscriber>,
        data: &[u8],
    ) -> Result<(), SubscriptionError> {
        if self.is_subscribed(receipt) {
            return Err(SubscriptionError::AlreadySubscribed(receipt));
        }

        let mut gas = GasBudget::unlimited();
        isolated(|| subscriber.notify_subscribe(receipt, data, &mut gas))
            .map_err(|source| SubscriptionError::SubscriptionReverted { receipt, source })?;

        self.subscribers.insert(receipt, subscriber);
        Ok(())
    }

    pub fn unsubscribe(&mut self, receipt: ReceiptId, data: &[u8]) -> Result<UnsubscribeOutcome, SubscriptionError> {
        let subscriber = self
            .subscribers
            .remove(&receipt)
            .ok_or(SubscriptionError::NotSubscribed(receipt))?;

        let mut gas = GasBudget::limited(self.unsubscribe_gas_limit);
        let notification = isolated(|| subscriber.notify_unsubscribe(receipt, data, &mut gas));
        Ok(UnsubscribeOutcome {
            notification,
            gas_used: gas.used(),
        })
    }

    pub fn notify_modify_liquidity(
        &self,
        receipt: ReceiptId,
        liquidity_change: i128,
        fees_accrued: BalanceDelta,
    ) -> Result<(), NotifyError> {
        let subscriber = self.subscriber_of(receipt);
        let mut gas = GasBudget::unlimited();
        isolated(|| subscriber.notify_modify_liquidity(receipt, liquidity_change, fees_accrued, &mut gas))
    }

    pub fn notify_transfer(&self, receipt: ReceiptId, from: AccountId, to: AccountId) -> Result<(), NotifyError> {
        let subscriber = self.subscriber_of(receipt);
        let mut gas = GasBudget::unlimited();
        isolated(|| subscriber.notify_transfer(receipt, from, to, &mut gas))
    }

    pub fn subscribed_receipts(&self) -> Vec<ReceiptId> {
        let mut receipts: Vec<ReceiptId> = self.subscribers.keys().copied().collect();
        receipts.sort();
        receipts
    }
}

// a panicking observer is treated like one that reverted
fn isolated<F>(call: F) -> Result<(), NotifyError>
where
    F: FnOnce() -> Result<(), NotifyError>,
{
    catch_unwind(AssertUnwindSafe(call)).unwrap_or(Err(NotifyError::Panicked))
}
