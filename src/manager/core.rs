// 8.0 manager/core.rs: main manager. holds the ledger, registry, observers and session flag.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::results::{ManagerError, PositionInfo};
use super::session::{OpenSession, Session};
use crate::authority::{OwnerOnly, ReceiptAuthority};
use crate::config::ManagerConfig;
use crate::events::{Event, EventId, EventPayload};
use crate::ledger::Ledger;
use crate::registry::{PositionRegistry, ReceiptRecord, RegistryError};
use crate::subscriber::{NotificationDispatcher, Subscriber};
use crate::types::{AccountId, BalanceDelta, Currency, PoolKey, Range, ReceiptId, Timestamp};

// tells sessions of different managers apart
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/** 8.1: main manager struct. all state lives here */
#[derive(Debug)]
pub struct PositionManager<L, A = OwnerOnly> {
    pub(super) config: ManagerConfig,
    pub(super) ledger: L,
    pub(super) registry: PositionRegistry,
    pub(super) dispatcher: NotificationDispatcher,
    pub(super) authority: A,
    pub(super) session: Option<OpenSession>,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) next_session_nonce: u64,
    pub(super) current_time: Timestamp,
    pub(super) self_id: AccountId,
    pub(super) instance: u64,
}

impl<L: Ledger + Clone> PositionManager<L, OwnerOnly> {
    pub fn new(config: ManagerConfig, ledger: L, self_id: AccountId) -> Result<Self, ManagerError> {
        Self::with_authority(config, ledger, self_id, OwnerOnly)
    }
}

impl<L: Ledger + Clone, A: ReceiptAuthority> PositionManager<L, A> {
    pub fn with_authority(config: ManagerConfig, ledger: L, self_id: AccountId, authority: A) -> Result<Self, ManagerError> {
        config.validate()?;
        let dispatcher = NotificationDispatcher::new(config.unsubscribe_gas_limit());
        Ok(Self {
            config,
            ledger,
            registry: PositionRegistry::new(),
            dispatcher,
            authority,
            session: None,
            events: Vec::new(),
            next_event_id: 1,
            next_session_nonce: 1,
            current_time: Timestamp::from_millis(0),
            self_id,
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        })
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = self.current_time.plus_millis(millis);
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // the manager's own account on the ledger
    pub fn self_id(&self) -> AccountId {
        self.self_id
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    // direct ledger access for setup. refused mid-session.
    pub fn ledger_mut(&mut self) -> Result<&mut L, ManagerError> {
        if self.session.is_some() {
            return Err(ManagerError::SessionInProgress);
        }
        Ok(&mut self.ledger)
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    pub fn authority_mut(&mut self) -> &mut A {
        &mut self.authority
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.is_some()
    }

    pub fn receipt(&self, receipt: ReceiptId) -> Option<ReceiptRecord> {
        self.registry.receipt(receipt).copied()
    }

    pub fn positions_of(&self, owner: AccountId) -> Vec<ReceiptId> {
        self.registry.receipts_of(owner)
    }

    pub fn next_receipt_id(&self) -> ReceiptId {
        self.registry.next_receipt_id()
    }

    pub fn position_info(&self, receipt: ReceiptId) -> Result<PositionInfo, ManagerError> {
        let record = self
            .registry
            .receipt(receipt)
            .ok_or(RegistryError::UnknownReceipt(receipt))?;
        let position = self
            .registry
            .position(receipt)
            .ok_or(RegistryError::PositionNotFound(receipt))?;
        Ok(PositionInfo {
            receipt,
            owner: record.owner,
            range: record.range,
            liquidity: position.liquidity,
            tokens_owed0: position.tokens_owed0,
            tokens_owed1: position.tokens_owed1,
            operator: position.operator,
            nonce: position.nonce,
            subscribed: self.dispatcher.is_subscribed(receipt),
        })
    }

    // owed fees including growth the position has not synced yet. read only.
    pub fn fees_owed(&self, receipt: ReceiptId) -> Result<(u128, u128), ManagerError> {
        let record = self
            .registry
            .receipt(receipt)
            .ok_or(RegistryError::UnknownReceipt(receipt))?;
        let position = self
            .registry
            .position(receipt)
            .ok_or(RegistryError::PositionNotFound(receipt))?;
        let growth = self.ledger.fee_growth_inside(&record.range)?;
        Ok(position.pending_fees(&growth))
    }

    pub fn subscriber_of(&self, receipt: ReceiptId) -> Option<Arc<dyn Subscriber>> {
        if self.dispatcher.is_subscribed(receipt) {
            Some(self.dispatcher.subscriber_of(receipt))
        } else {
            None
        }
    }

    // ledger credit the manager holds for fees not yet paid to positions
    pub fn manager_credit(&self, currency: Currency) -> u128 {
        self.ledger.credit_of(self.self_id, currency)
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    // owner, live operator, or whoever the authority approves
    pub(super) fn require_authorized(&self, caller: AccountId, receipt: ReceiptId) -> Result<AccountId, ManagerError> {
        let owner = self.registry.owner_of(receipt)?;
        let operator = self
            .registry
            .position(receipt)
            .map_or(false, |position| position.is_operator(caller, self.current_time));
        if caller == owner || operator || self.authority.is_authorized(caller, owner, receipt) {
            return Ok(owner);
        }
        Err(ManagerError::Unauthorized { caller, receipt })
    }

    // owner or authority approval. operators may not move the receipt or pick operators.
    pub(super) fn require_owner_or_approved(&self, caller: AccountId, receipt: ReceiptId) -> Result<AccountId, ManagerError> {
        let owner = self.registry.owner_of(receipt)?;
        if caller == owner || self.authority.is_authorized(caller, owner, receipt) {
            return Ok(owner);
        }
        Err(ManagerError::Unauthorized { caller, receipt })
    }

    pub(super) fn require_config(&self, receipt: ReceiptId, config: &Range) -> Result<(), ManagerError> {
        let record = self
            .registry
            .receipt(receipt)
            .ok_or(RegistryError::UnknownReceipt(receipt))?;
        if record.range != *config {
            return Err(ManagerError::IncorrectPositionConfig { receipt });
        }
        Ok(())
    }

    pub(super) fn require_idle(&self) -> Result<(), ManagerError> {
        if self.session.is_some() {
            return Err(ManagerError::SessionInProgress);
        }
        Ok(())
    }

    pub(super) fn check_deadline(&self, deadline: Timestamp) -> Result<(), ManagerError> {
        if self.current_time > deadline {
            return Err(ManagerError::DeadlinePassed {
                deadline,
                now: self.current_time,
            });
        }
        Ok(())
    }

    // the session must be the one this manager has open right now
    pub(super) fn require_session(&self, session: &Session) -> Result<(), ManagerError> {
        match &self.session {
            Some(open) if session.manager == self.instance && session.nonce == open.nonce => Ok(()),
            _ => Err(ManagerError::MustBeUnlockedByThisContract),
        }
    }

    pub(super) fn open_session_mut(&mut self) -> Result<&mut OpenSession, ManagerError> {
        self.session
            .as_mut()
            .ok_or(ManagerError::MustBeUnlockedByThisContract)
    }

    // caller leg under the session caller, fee residue under the manager itself
    pub(super) fn fold_legs(&mut self, session: &Session, pool: &PoolKey, caller: BalanceDelta, manager: BalanceDelta) -> Result<(), ManagerError> {
        let self_id = self.self_id;
        let open = self.open_session_mut()?;
        open.book.fold_pair(session.caller, pool, caller);
        open.book.fold_pair(self_id, pool, manager);
        Ok(())
    }

    // settle exactly `delta` for the caller now instead of at close
    pub(super) fn flush_caller(
        &mut self,
        session: &Session,
        pool: &PoolKey,
        delta: BalanceDelta,
        recipient: AccountId,
        use_credit: bool,
    ) -> Result<(), ManagerError> {
        let open = self
            .session
            .as_mut()
            .ok_or(ManagerError::MustBeUnlockedByThisContract)?;
        for (currency, amount) in delta.with_currencies(pool) {
            open.book
                .flush(&mut self.ledger, currency, session.caller, recipient, amount, use_credit)?;
        }
        Ok(())
    }

    // events raised inside a session are held back until it commits
    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        if self.config.verbose {
            tracing::info!(id = event.id.0, payload = ?event.payload, "event");
        } else {
            tracing::debug!(id = event.id.0, payload = ?event.payload, "event");
        }

        match self.session.as_mut() {
            Some(open) => open.events.push(event),
            None => self.commit_event(event),
        }
    }

    pub(super) fn commit_event(&mut self, event: Event) {
        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
