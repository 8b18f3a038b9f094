// 8.2 manager/session.rs: the unlock cycle. Idle → Unlocking → Idle.
// a session snapshots the manager and the ledger, unlocks the ledger under the manager's own
// account, runs the body, closes every named currency for the caller and for the manager,
// then locks. any failure restores the snapshot and hands the inner error back unchanged.

use super::core::PositionManager;
use super::results::ManagerError;
use crate::authority::ReceiptAuthority;
use crate::events::{
    CurrencyClosedEvent, Event, EventPayload, SessionAbortedEvent, SessionClosedEvent, SessionOpenedEvent,
};
use crate::ledger::Ledger;
use crate::registry::PositionRegistry;
use crate::settlement::DeltaBook;
use crate::subscriber::NotificationDispatcher;
use crate::types::{AccountId, Currency};

/// Proof that a session is open. Only `unlock_with` hands one out, and only for the
/// duration of its body, so a session can never outlive its unlock.
#[derive(Debug)]
pub struct Session {
    pub(super) manager: u64,
    pub(super) nonce: u64,
    pub(super) caller: AccountId,
}

impl Session {
    pub fn caller(&self) -> AccountId {
        self.caller
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

#[derive(Debug)]
pub(crate) struct OpenSession {
    pub(super) nonce: u64,
    pub(super) caller: AccountId,
    pub(super) book: DeltaBook,
    pub(super) events: Vec<Event>,
}

struct Snapshot<L> {
    ledger: L,
    registry: PositionRegistry,
    dispatcher: NotificationDispatcher,
    next_event_id: u64,
}

impl<L: Ledger + Clone, A: ReceiptAuthority> PositionManager<L, A> {
    /// Opens a session for `caller`, runs `body` inside it, then settles `currencies`.
    /// Returns the body's value and the caller's settled amount per requested currency
    /// (+ received, - paid).
    pub fn unlock_with<T, F>(
        &mut self,
        caller: AccountId,
        currencies: &[Currency],
        body: F,
    ) -> Result<(T, Vec<i128>), ManagerError>
    where
        F: FnOnce(&mut Self, &Session) -> Result<T, ManagerError>,
    {
        if self.session.is_some() {
            return Err(ManagerError::SessionAlreadyOpen);
        }

        let snapshot = self.snapshot();
        self.ledger.unlock(self.self_id)?;

        let nonce = self.next_session_nonce;
        self.next_session_nonce += 1;
        self.session = Some(OpenSession {
            nonce,
            caller,
            book: DeltaBook::new(),
            events: Vec::new(),
        });
        let session = Session {
            manager: self.instance,
            nonce,
            caller,
        };
        tracing::info!(%caller, nonce, "session opened");
        self.emit_event(EventPayload::SessionOpened(SessionOpenedEvent { caller, nonce }));

        let result = match body(self, &session) {
            Ok(value) => self.close_session(&session, currencies).map(|settled| (value, settled)),
            Err(e) => Err(e),
        };

        // released on every path
        let open = self.session.take();

        match result {
            Ok((value, settled)) => {
                if let Some(open) = open {
                    for event in open.events {
                        self.commit_event(event);
                    }
                }
                tracing::info!(%caller, nonce, ?settled, "session closed");
                self.emit_event(EventPayload::SessionClosed(SessionClosedEvent {
                    caller,
                    nonce,
                    settled: currencies.iter().copied().zip(settled.iter().copied()).collect(),
                }));
                Ok((value, settled))
            }
            Err(e) => {
                self.restore(snapshot);
                tracing::warn!(%caller, nonce, error = %e, "session aborted");
                self.emit_event(EventPayload::SessionAborted(SessionAbortedEvent {
                    caller,
                    nonce,
                    reason: e.to_string(),
                }));
                Err(e)
            }
        }
    }

    // running balance of `participant` in the open session
    pub fn session_balance(&self, session: &Session, participant: AccountId, currency: Currency) -> Result<i128, ManagerError> {
        self.require_session(session)?;
        Ok(self
            .session
            .as_ref()
            .map_or(0, |open| open.book.balance(participant, currency)))
    }

    fn close_session(&mut self, session: &Session, currencies: &[Currency]) -> Result<Vec<i128>, ManagerError> {
        self.require_session(session)?;
        let caller = session.caller;
        let manager = self.self_id;

        let open = self
            .session
            .as_mut()
            .ok_or(ManagerError::MustBeUnlockedByThisContract)?;

        let mut closed = Vec::new();
        for &currency in currencies {
            open.book.check_conservation(&self.ledger, currency)?;
            let paid = open.book.close(&mut self.ledger, currency, caller, caller, false)?;
            // the manager's leg never leaves the ledger
            let residue = open.book.close(&mut self.ledger, currency, manager, manager, true)?;
            closed.push((caller, currency, paid));
            closed.push((manager, currency, residue));
        }

        self.ledger.lock()?;
        let settled: Vec<i128> = currencies
            .iter()
            .map(|currency| open.book.settled(caller, *currency))
            .collect();

        for (participant, currency, amount) in closed {
            if amount != 0 {
                self.emit_event(EventPayload::CurrencyClosed(CurrencyClosedEvent {
                    participant,
                    currency,
                    amount,
                }));
            }
        }
        Ok(settled)
    }

    fn snapshot(&self) -> Snapshot<L> {
        Snapshot {
            ledger: self.ledger.clone(),
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            next_event_id: self.next_event_id,
        }
    }

    fn restore(&mut self, snapshot: Snapshot<L>) {
        self.ledger = snapshot.ledger;
        self.registry = snapshot.registry;
        self.dispatcher = snapshot.dispatcher;
        self.next_event_id = snapshot.next_event_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::ledger::{InMemoryLedger, LedgerError};
    use crate::plan::MintParams;
    use crate::types::{PoolKey, Range, Timestamp};

    const MANAGER: AccountId = AccountId(1_000);
    const ALICE: AccountId = AccountId(1);

    fn pool() -> PoolKey {
        PoolKey::new(Currency(1), Currency(2), 100, 60)
    }

    fn manager() -> PositionManager<InMemoryLedger> {
        let mut ledger = InMemoryLedger::new();
        ledger.initialize_pool(pool(), 0).unwrap();
        ledger.mint_tokens(ALICE, Currency(1), 10_000);
        ledger.mint_tokens(ALICE, Currency(2), 10_000);
        PositionManager::new(ManagerConfig::default(), ledger, MANAGER).unwrap()
    }

    fn mint(liquidity: u128) -> MintParams {
        MintParams {
            range: Range::new(pool(), -60, 60).unwrap(),
            liquidity,
            deadline: Timestamp::MAX,
            owner: ALICE,
            hook_data: Vec::new(),
        }
    }

    #[test]
    fn nested_session_rejected() {
        let mut manager = manager();
        let result = manager.unlock_with(ALICE, &[], |m, _| {
            assert!(m.is_unlocked());
            m.unlock_with(ALICE, &[], |_, _| Ok(()))
        });
        assert_eq!(result.unwrap_err(), ManagerError::SessionAlreadyOpen);
        assert!(!manager.is_unlocked());
        assert!(!manager.ledger().is_unlocked());
    }

    #[test]
    fn flag_released_after_success() {
        let mut manager = manager();
        let (receipt, settled) = manager
            .unlock_with(ALICE, &[Currency(1), Currency(2)], |m, s| m.mint(s, mint(1000)))
            .unwrap();
        assert_eq!(settled, vec![-500, -500]);
        assert!(!manager.is_unlocked());
        assert_eq!(manager.position_info(receipt).unwrap().liquidity, 1000);
        assert_eq!(manager.ledger().balance_of(ALICE, Currency(1)), 9_500);
    }

    #[test]
    fn unsettled_currency_aborts_and_restores() {
        let mut manager = manager();
        // only currency 1 is named, currency 2 stays open
        let result = manager.unlock_with(ALICE, &[Currency(1)], |m, s| m.mint(s, mint(1000)));
        assert!(matches!(
            result,
            Err(ManagerError::Ledger(LedgerError::CurrencyNotSettled { .. }))
        ));
        assert!(!manager.is_unlocked());
        assert!(!manager.ledger().is_unlocked());
        assert_eq!(manager.ledger().balance_of(ALICE, Currency(1)), 10_000);
        assert!(manager.receipt(crate::types::ReceiptId(1)).is_none());
        assert_eq!(manager.next_receipt_id(), crate::types::ReceiptId(1));
    }

    #[test]
    fn session_from_another_manager_rejected() {
        let mut a = manager();
        let mut b = manager();
        let result = a.unlock_with(ALICE, &[], |_, session| b.mint(session, mint(10)));
        assert_eq!(result.unwrap_err(), ManagerError::MustBeUnlockedByThisContract);
    }

    #[test]
    fn aborted_session_keeps_only_abort_event() {
        let mut manager = manager();
        let _ = manager.unlock_with(ALICE, &[Currency(1)], |m, s| m.mint(s, mint(1000)));
        let events = manager.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].payload, EventPayload::SessionAborted(_)));
    }
}
