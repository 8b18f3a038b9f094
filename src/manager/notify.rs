// 8.7 manager/notify.rs: observer registration and the notifications sent after position
// changes. only subscribe can fail because of the observer.

use std::sync::Arc;

use super::core::PositionManager;
use super::results::ManagerError;
use crate::authority::ReceiptAuthority;
use crate::events::{
    EventPayload, NotificationFailedEvent, NotificationKind, SubscribedEvent, UnsubscribedEvent,
};
use crate::ledger::Ledger;
use crate::subscriber::{NotifyError, Subscriber, UnsubscribeOutcome};
use crate::types::{AccountId, BalanceDelta, Range, ReceiptId};

impl<L: Ledger + Clone, A: ReceiptAuthority> PositionManager<L, A> {
    pub fn subscribe(
        &mut self,
        caller: AccountId,
        receipt: ReceiptId,
        config: &Range,
        subscriber: Arc<dyn Subscriber>,
        data: &[u8],
    ) -> Result<(), ManagerError> {
        self.require_idle()?;
        self.require_authorized(caller, receipt)?;
        self.require_config(receipt, config)?;

        self.dispatcher.subscribe(receipt, subscriber, data)?;
        tracing::debug!(%receipt, %caller, "subscribed");
        self.emit_event(EventPayload::Subscribed(SubscribedEvent { receipt }));
        Ok(())
    }

    /// Removes the observer. Succeeds whatever the observer does with its stipend.
    pub fn unsubscribe(
        &mut self,
        caller: AccountId,
        receipt: ReceiptId,
        config: &Range,
        data: &[u8],
    ) -> Result<UnsubscribeOutcome, ManagerError> {
        self.require_idle()?;
        self.require_authorized(caller, receipt)?;
        self.require_config(receipt, config)?;
        self.unsubscribe_observer(receipt, data)
    }

    pub(super) fn unsubscribe_observer(&mut self, receipt: ReceiptId, data: &[u8]) -> Result<UnsubscribeOutcome, ManagerError> {
        let outcome = self.dispatcher.unsubscribe(receipt, data)?;
        if let Err(e) = &outcome.notification {
            self.report_failure(receipt, NotificationKind::Unsubscribe, e);
        }
        self.emit_event(EventPayload::Unsubscribed(UnsubscribedEvent {
            receipt,
            notified: outcome.notification.is_ok(),
            gas_used: outcome.gas_used,
        }));
        Ok(outcome)
    }

    pub(super) fn notify_modify(&mut self, receipt: ReceiptId, liquidity_change: i128, fees_accrued: BalanceDelta) {
        if let Err(e) = self
            .dispatcher
            .notify_modify_liquidity(receipt, liquidity_change, fees_accrued)
        {
            self.report_failure(receipt, NotificationKind::ModifyLiquidity, &e);
        }
    }

    pub(super) fn notify_transfer(&mut self, receipt: ReceiptId, from: AccountId, to: AccountId) {
        if let Err(e) = self.dispatcher.notify_transfer(receipt, from, to) {
            self.report_failure(receipt, NotificationKind::Transfer, &e);
        }
    }

    fn report_failure(&mut self, receipt: ReceiptId, kind: NotificationKind, error: &NotifyError) {
        tracing::warn!(%receipt, ?kind, %error, "observer notification failed");
        self.emit_event(EventPayload::NotificationFailed(NotificationFailedEvent {
            receipt,
            kind,
            reason: error.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::config::ManagerConfig;
    use crate::ledger::InMemoryLedger;
    use crate::plan::{BurnParams, MintParams, ModifyLiquidityParams};
    use crate::subscriber::{GasBudget, SubscriptionError};
    use crate::types::{Currency, PoolKey, Timestamp};

    const MANAGER: AccountId = AccountId(1_000);
    const ALICE: AccountId = AccountId(1);
    const BOB: AccountId = AccountId(2);
    const C0: Currency = Currency(1);
    const C1: Currency = Currency(2);

    #[derive(Debug, Default)]
    struct Log {
        calls: Mutex<Vec<String>>,
        refuse_subscribe: bool,
    }

    impl Subscriber for Log {
        fn notify_subscribe(&self, receipt: ReceiptId, _: &[u8], _: &mut GasBudget) -> Result<(), NotifyError> {
            if self.refuse_subscribe {
                return Err(NotifyError::Reverted("not today".into()));
            }
            self.calls.lock().unwrap().push(format!("subscribe {receipt}"));
            Ok(())
        }

        fn notify_unsubscribe(&self, receipt: ReceiptId, _: &[u8], _: &mut GasBudget) -> Result<(), NotifyError> {
            self.calls.lock().unwrap().push(format!("unsubscribe {receipt}"));
            Ok(())
        }

        fn notify_modify_liquidity(&self, receipt: ReceiptId, change: i128, _: BalanceDelta, _: &mut GasBudget) -> Result<(), NotifyError> {
            self.calls.lock().unwrap().push(format!("modify {receipt} {change}"));
            Ok(())
        }

        fn notify_transfer(&self, receipt: ReceiptId, from: AccountId, to: AccountId, _: &mut GasBudget) -> Result<(), NotifyError> {
            self.calls.lock().unwrap().push(format!("transfer {receipt} {from} {to}"));
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Hostile;

    impl Subscriber for Hostile {
        fn notify_subscribe(&self, _: ReceiptId, _: &[u8], _: &mut GasBudget) -> Result<(), NotifyError> {
            Ok(())
        }

        fn notify_unsubscribe(&self, _: ReceiptId, _: &[u8], gas: &mut GasBudget) -> Result<(), NotifyError> {
            loop {
                gas.charge(50_000)?;
            }
        }

        fn notify_modify_liquidity(&self, _: ReceiptId, _: i128, _: BalanceDelta, _: &mut GasBudget) -> Result<(), NotifyError> {
            Err(NotifyError::Reverted("modify".into()))
        }

        fn notify_transfer(&self, _: ReceiptId, _: AccountId, _: AccountId, _: &mut GasBudget) -> Result<(), NotifyError> {
            panic!("transfer");
        }
    }

    fn pool() -> PoolKey {
        PoolKey::new(C0, C1, 100, 60)
    }

    fn range() -> Range {
        Range::new(pool(), -60, 60).unwrap()
    }

    fn manager() -> (PositionManager<InMemoryLedger>, ReceiptId) {
        let mut ledger = InMemoryLedger::new();
        ledger.initialize_pool(pool(), 0).unwrap();
        ledger.mint_tokens(ALICE, C0, 10_000);
        ledger.mint_tokens(ALICE, C1, 10_000);
        let mut manager = PositionManager::new(ManagerConfig::default(), ledger, MANAGER).unwrap();
        let (receipt, _) = manager
            .unlock_with(ALICE, &[C0, C1], |m, s| {
                m.mint(
                    s,
                    MintParams {
                        range: range(),
                        liquidity: 1000,
                        deadline: Timestamp::MAX,
                        owner: ALICE,
                        hook_data: Vec::new(),
                    },
                )
            })
            .unwrap();
        (manager, receipt)
    }

    fn decrease(manager: &mut PositionManager<InMemoryLedger>, receipt: ReceiptId, liquidity: u128) {
        manager
            .unlock_with(ALICE, &[C0, C1], |m, s| {
                m.decrease_liquidity(
                    s,
                    ModifyLiquidityParams {
                        receipt,
                        liquidity,
                        deadline: Timestamp::MAX,
                        hook_data: Vec::new(),
                        use_credit: false,
                    },
                )
            })
            .unwrap();
    }

    #[test]
    fn observer_sees_lifecycle() {
        let (mut manager, receipt) = manager();
        let log = Arc::new(Log::default());
        manager.subscribe(ALICE, receipt, &range(), log.clone(), &[]).unwrap();
        decrease(&mut manager, receipt, 100);
        manager.transfer(ALICE, receipt, BOB).unwrap();
        let outcome = manager.unsubscribe(BOB, receipt, &range(), &[]).unwrap();
        assert_eq!(outcome.notification, Ok(()));

        let calls = log.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                "subscribe #1".to_string(),
                "modify #1 -100".to_string(),
                "transfer #1 acct#1 acct#2".to_string(),
                "unsubscribe #1".to_string(),
            ]
        );
    }

    #[test]
    fn wrong_config_rejected() {
        let (mut manager, receipt) = manager();
        let other = Range::new(pool(), -120, 120).unwrap();
        assert_eq!(
            manager.subscribe(ALICE, receipt, &other, Arc::new(Log::default()), &[]),
            Err(ManagerError::IncorrectPositionConfig { receipt })
        );
        assert!(manager.subscriber_of(receipt).is_none());
    }

    #[test]
    fn stranger_cannot_subscribe() {
        let (mut manager, receipt) = manager();
        assert!(matches!(
            manager.subscribe(BOB, receipt, &range(), Arc::new(Log::default()), &[]),
            Err(ManagerError::Unauthorized { .. })
        ));
    }

    #[test]
    fn refusing_observer_fails_subscribe() {
        let (mut manager, receipt) = manager();
        let log = Arc::new(Log {
            refuse_subscribe: true,
            ..Log::default()
        });
        let result = manager.subscribe(ALICE, receipt, &range(), log, &[]);
        assert!(matches!(
            result,
            Err(ManagerError::Subscription(SubscriptionError::SubscriptionReverted { .. }))
        ));
        assert!(!manager.position_info(receipt).unwrap().subscribed);
    }

    #[test]
    fn hostile_observer_cannot_block_anything() {
        let (mut manager, receipt) = manager();
        manager.subscribe(ALICE, receipt, &range(), Arc::new(Hostile), &[]).unwrap();

        decrease(&mut manager, receipt, 100);
        manager.transfer(ALICE, receipt, BOB).unwrap();
        let outcome = manager.unsubscribe(BOB, receipt, &range(), &[]).unwrap();

        let limit = manager.config().unsubscribe_gas_limit();
        assert_eq!(outcome.notification, Err(NotifyError::OutOfGas { limit }));
        assert_eq!(outcome.gas_used, limit);
        assert!(manager.subscriber_of(receipt).is_none());

        let failures: Vec<NotificationKind> = manager
            .events()
            .iter()
            .filter_map(|event| match &event.payload {
                EventPayload::NotificationFailed(failed) => Some(failed.kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            failures,
            vec![
                NotificationKind::ModifyLiquidity,
                NotificationKind::Transfer,
                NotificationKind::Unsubscribe,
            ]
        );
    }

    #[test]
    fn burn_unsubscribes() {
        let (mut manager, receipt) = manager();
        let log = Arc::new(Log::default());
        manager.subscribe(ALICE, receipt, &range(), log.clone(), &[]).unwrap();
        manager
            .unlock_with(ALICE, &[C0, C1], |m, s| {
                m.decrease_liquidity(
                    s,
                    ModifyLiquidityParams {
                        receipt,
                        liquidity: 1000,
                        deadline: Timestamp::MAX,
                        hook_data: Vec::new(),
                        use_credit: false,
                    },
                )?;
                m.burn(
                    s,
                    BurnParams { receipt },
                )
            })
            .unwrap();
        assert!(manager.receipt(receipt).is_none());
        assert_eq!(log.calls.lock().unwrap().last().map(String::as_str), Some("unsubscribe #1"));
    }

    #[test]
    fn subscribe_refused_mid_session() {
        let (mut manager, receipt) = manager();
        let result = manager.unlock_with(ALICE, &[], |m, _| {
            m.subscribe(ALICE, receipt, &range(), Arc::new(Log::default()), &[])
        });
        assert_eq!(result.unwrap_err(), ManagerError::SessionInProgress);
    }
}
