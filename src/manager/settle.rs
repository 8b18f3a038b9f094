// 8.4 manager/settle.rs: delta resolution steps. close a currency, settle a whole debt,
// take a whole credit. all act on the session caller's leg.

use super::core::PositionManager;
use super::results::ManagerError;
use super::session::Session;
use crate::authority::ReceiptAuthority;
use crate::events::{CurrencyClosedEvent, EventPayload};
use crate::ledger::Ledger;
use crate::plan::{CloseCurrencyParams, SettleAllParams, TakeAllParams};

impl<L: Ledger + Clone, A: ReceiptAuthority> PositionManager<L, A> {
    // returns the amount moved. + paid out to the caller, - paid in by the caller
    pub fn close_currency(&mut self, session: &Session, params: CloseCurrencyParams) -> Result<i128, ManagerError> {
        self.require_session(session)?;
        let caller = session.caller;
        let open = self
            .session
            .as_mut()
            .ok_or(ManagerError::MustBeUnlockedByThisContract)?;
        let amount = open
            .book
            .close(&mut self.ledger, params.currency, caller, caller, params.use_credit)?;

        if amount != 0 {
            self.emit_event(EventPayload::CurrencyClosed(CurrencyClosedEvent {
                participant: caller,
                currency: params.currency,
                amount,
            }));
        }
        Ok(amount)
    }

    pub fn settle_all(&mut self, session: &Session, params: SettleAllParams) -> Result<u128, ManagerError> {
        self.require_session(session)?;
        let caller = session.caller;
        let open = self
            .session
            .as_mut()
            .ok_or(ManagerError::MustBeUnlockedByThisContract)?;
        let paid = open.book.settle_all(&mut self.ledger, params.currency, caller)?;
        tracing::debug!(%caller, currency = %params.currency, paid, "settled all");
        Ok(paid)
    }

    pub fn take_all(&mut self, session: &Session, params: TakeAllParams) -> Result<u128, ManagerError> {
        self.require_session(session)?;
        let caller = session.caller;
        let open = self
            .session
            .as_mut()
            .ok_or(ManagerError::MustBeUnlockedByThisContract)?;
        let taken = open
            .book
            .take_all(&mut self.ledger, params.currency, caller, params.recipient)?;
        tracing::debug!(%caller, recipient = %params.recipient, currency = %params.currency, taken, "took all");
        Ok(taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::ledger::InMemoryLedger;
    use crate::plan::SwapParams;
    use crate::settlement::SettlementError;
    use crate::types::{AccountId, Currency, PoolKey};

    const MANAGER: AccountId = AccountId(1_000);
    const TRADER: AccountId = AccountId(5);
    const C0: Currency = Currency(1);
    const C1: Currency = Currency(2);

    fn pool() -> PoolKey {
        PoolKey::new(C0, C1, 100, 60)
    }

    fn manager() -> PositionManager<InMemoryLedger> {
        let mut ledger = InMemoryLedger::new();
        ledger.initialize_pool(pool(), 0).unwrap();
        ledger.mint_tokens(TRADER, C0, 5_000);
        // reserves for the trade to draw on
        ledger.mint_tokens(MANAGER, C1, 5_000);
        ledger.unlock(MANAGER).unwrap();
        ledger.settle(C1, MANAGER, 5_000).unwrap();
        ledger.mint_credit(C1, MANAGER, 5_000).unwrap();
        ledger.lock().unwrap();
        PositionManager::new(ManagerConfig::default(), ledger, MANAGER).unwrap()
    }

    fn swap() -> SwapParams {
        SwapParams {
            pool: pool(),
            zero_for_one: true,
            amount_in: 1_000,
            min_amount_out: 0,
        }
    }

    #[test]
    fn settle_all_then_take_all() {
        let mut manager = manager();
        let ((paid, taken), settled) = manager
            .unlock_with(TRADER, &[C0, C1], |m, s| {
                m.swap(s, swap())?;
                let paid = m.settle_all(s, SettleAllParams { currency: C0 })?;
                let taken = m.take_all(
                    s,
                    TakeAllParams {
                        currency: C1,
                        recipient: TRADER,
                    },
                )?;
                Ok((paid, taken))
            })
            .unwrap();
        assert_eq!((paid, taken), (1_000, 990));
        assert_eq!(settled, vec![-1_000, 990]);
        assert_eq!(manager.ledger().balance_of(TRADER, C1), 990);
    }

    #[test]
    fn settle_all_on_credit_fails() {
        let mut manager = manager();
        let result = manager.unlock_with(TRADER, &[C0, C1], |m, s| {
            m.swap(s, swap())?;
            m.settle_all(s, SettleAllParams { currency: C1 })
        });
        assert!(matches!(
            result,
            Err(ManagerError::Settlement(SettlementError::DeltaNotNegative { .. }))
        ));
        assert_eq!(manager.ledger().balance_of(TRADER, C0), 5_000);
    }

    #[test]
    fn close_currency_with_credit() {
        let mut manager = manager();
        let (amount, settled) = manager
            .unlock_with(TRADER, &[C0, C1], |m, s| {
                m.swap(s, swap())?;
                m.close_currency(
                    s,
                    CloseCurrencyParams {
                        currency: C1,
                        use_credit: true,
                    },
                )
            })
            .unwrap();
        assert_eq!(amount, 990);
        assert_eq!(settled, vec![-1_000, 990]);
        assert_eq!(manager.ledger().credit_of(TRADER, C1), 990);
        assert_eq!(manager.ledger().balance_of(TRADER, C1), 0);
    }
}
