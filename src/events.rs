// 11.0: every state change produces an event. used for audit trails and for replaying what a
// session did. the EventPayload enum lists all event types.

use crate::types::{AccountId, BalanceDelta, Currency, PoolKey, Range, ReceiptId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    Minted(MintedEvent),
    LiquidityModified(LiquidityModifiedEvent),
    Collected(CollectedEvent),
    Burned(BurnedEvent),

    // Receipt events
    Transferred(TransferredEvent),
    OperatorChanged(OperatorChangedEvent),

    // Trade events
    Swapped(SwappedEvent),

    // Observer events
    Subscribed(SubscribedEvent),
    Unsubscribed(UnsubscribedEvent),
    NotificationFailed(NotificationFailedEvent),

    // Session events
    SessionOpened(SessionOpenedEvent),
    CurrencyClosed(CurrencyClosedEvent),
    SessionClosed(SessionClosedEvent),
    SessionAborted(SessionAbortedEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintedEvent {
    pub receipt: ReceiptId,
    pub owner: AccountId,
    pub range: Range,
    pub liquidity: u128,
    pub caller_delta: BalanceDelta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityModifiedEvent {
    pub receipt: ReceiptId,
    pub liquidity_change: i128,
    pub liquidity: u128,
    pub caller_delta: BalanceDelta,
    pub fees_earned: BalanceDelta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedEvent {
    pub receipt: ReceiptId,
    pub recipient: AccountId,
    pub amount0: u128,
    pub amount1: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnedEvent {
    pub receipt: ReceiptId,
    pub owner: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferredEvent {
    pub receipt: ReceiptId,
    pub from: AccountId,
    pub to: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorChangedEvent {
    pub receipt: ReceiptId,
    pub operator: Option<AccountId>, // None = revoked
    pub expires_at: Option<Timestamp>,
    pub nonce: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwappedEvent {
    pub caller: AccountId,
    pub pool: PoolKey,
    pub zero_for_one: bool,
    pub amount_in: u128,
    pub amount_out: u128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribedEvent {
    pub receipt: ReceiptId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribedEvent {
    pub receipt: ReceiptId,
    pub notified: bool,
    pub gas_used: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Unsubscribe,
    ModifyLiquidity,
    Transfer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFailedEvent {
    pub receipt: ReceiptId,
    pub kind: NotificationKind,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOpenedEvent {
    pub caller: AccountId,
    pub nonce: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyClosedEvent {
    pub participant: AccountId,
    pub currency: Currency,
    pub amount: i128, // + paid out, - paid in
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClosedEvent {
    pub caller: AccountId,
    pub nonce: u64,
    pub settled: Vec<(Currency, i128)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAbortedEvent {
    pub caller: AccountId,
    pub nonce: u64,
    pub reason: String,
}
