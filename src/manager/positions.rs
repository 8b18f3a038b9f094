// 8.3 manager/positions.rs: liquidity steps. mint, increase, decrease, collect, burn, swap.
// every step needs this manager's open session; deadline is checked before anything moves.

use super::core::PositionManager;
use super::results::ManagerError;
use super::session::Session;
use crate::authority::ReceiptAuthority;
use crate::events::{BurnedEvent, CollectedEvent, EventPayload, LiquidityModifiedEvent, MintedEvent, SwappedEvent};
use crate::ledger::Ledger;
use crate::plan::{BurnParams, CollectParams, MintParams, ModifyLiquidityParams, SwapParams};
use crate::registry::RegistryError;
use crate::types::{BalanceDelta, ReceiptId};

impl<L: Ledger + Clone, A: ReceiptAuthority> PositionManager<L, A> {
    pub fn mint(&mut self, session: &Session, params: MintParams) -> Result<ReceiptId, ManagerError> {
        self.require_session(session)?;
        self.check_deadline(params.deadline)?;

        let now = self.current_time;
        let (receipt, legs) = self.registry.open(
            &mut self.ledger,
            params.owner,
            params.range,
            params.liquidity,
            &params.hook_data,
            now,
        )?;
        self.fold_legs(session, &params.range.pool, legs.caller, legs.manager)?;

        tracing::debug!(%receipt, owner = %params.owner, range = %params.range, liquidity = params.liquidity, "minted");
        self.emit_event(EventPayload::Minted(MintedEvent {
            receipt,
            owner: params.owner,
            range: params.range,
            liquidity: params.liquidity,
            caller_delta: legs.caller,
        }));
        Ok(receipt)
    }

    pub fn increase_liquidity(&mut self, session: &Session, params: ModifyLiquidityParams) -> Result<BalanceDelta, ManagerError> {
        self.modify_position(session, params, true)
    }

    pub fn decrease_liquidity(&mut self, session: &Session, params: ModifyLiquidityParams) -> Result<BalanceDelta, ManagerError> {
        self.modify_position(session, params, false)
    }

    // pays out everything owed to `recipient`. returns the caller leg of the step.
    pub fn collect(&mut self, session: &Session, params: CollectParams) -> Result<BalanceDelta, ManagerError> {
        self.require_session(session)?;
        let receipt = params.receipt;
        self.require_authorized(session.caller, receipt)?;
        let range = self
            .registry
            .receipt(receipt)
            .ok_or(RegistryError::UnknownReceipt(receipt))?
            .range;

        let now = self.current_time;
        let legs = self
            .registry
            .collect(&mut self.ledger, receipt, &params.hook_data, now)?;
        self.fold_legs(session, &range.pool, legs.caller, legs.manager)?;

        // a foreign recipient or a credit payout settles now; otherwise it nets at close
        if params.use_credit || params.recipient != session.caller {
            self.flush_caller(session, &range.pool, legs.caller, params.recipient, params.use_credit)?;
        }

        tracing::debug!(%receipt, recipient = %params.recipient, paid = %legs.caller, "collected");
        self.emit_event(EventPayload::Collected(CollectedEvent {
            receipt,
            recipient: params.recipient,
            amount0: legs.caller.amount0.unsigned_abs(),
            amount1: legs.caller.amount1.unsigned_abs(),
        }));
        self.notify_modify(receipt, 0, legs.fees_earned);
        Ok(legs.caller)
    }

    // clears an empty position. a live subscription is dropped first through the stipend path.
    pub fn burn(&mut self, session: &Session, params: BurnParams) -> Result<(), ManagerError> {
        self.require_session(session)?;
        let receipt = params.receipt;
        self.require_authorized(session.caller, receipt)?;
        self.registry.ensure_empty(receipt)?;

        if self.dispatcher.is_subscribed(receipt) {
            self.unsubscribe_observer(receipt, &[])?;
        }

        let record = self.registry.close(receipt)?;
        tracing::debug!(%receipt, owner = %record.owner, "burned");
        self.emit_event(EventPayload::Burned(BurnedEvent {
            receipt,
            owner: record.owner,
        }));
        Ok(())
    }

    // exact input swap on behalf of the session caller
    pub fn swap(&mut self, session: &Session, params: SwapParams) -> Result<BalanceDelta, ManagerError> {
        self.require_session(session)?;

        let delta = self
            .ledger
            .swap(&params.pool, params.zero_for_one, params.amount_in)?;
        let out = if params.zero_for_one { delta.amount1 } else { delta.amount0 };
        let amount_out = out.max(0).unsigned_abs();
        if amount_out < params.min_amount_out {
            return Err(ManagerError::SlippageExceeded {
                min: params.min_amount_out,
                actual: amount_out,
            });
        }

        self.fold_legs(session, &params.pool, delta, BalanceDelta::ZERO)?;
        self.emit_event(EventPayload::Swapped(SwappedEvent {
            caller: session.caller,
            pool: params.pool,
            zero_for_one: params.zero_for_one,
            amount_in: params.amount_in,
            amount_out,
        }));
        Ok(delta)
    }

    fn modify_position(&mut self, session: &Session, params: ModifyLiquidityParams, increase: bool) -> Result<BalanceDelta, ManagerError> {
        self.require_session(session)?;
        self.check_deadline(params.deadline)?;
        let receipt = params.receipt;
        self.require_authorized(session.caller, receipt)?;

        let magnitude =
            i128::try_from(params.liquidity).map_err(|_| RegistryError::LiquidityOverflow(params.liquidity))?;
        let liquidity_change = if increase { magnitude } else { -magnitude };
        let range = self
            .registry
            .receipt(receipt)
            .ok_or(RegistryError::UnknownReceipt(receipt))?
            .range;

        let now = self.current_time;
        let legs = self
            .registry
            .adjust(&mut self.ledger, receipt, liquidity_change, &params.hook_data, now)?;
        self.fold_legs(session, &range.pool, legs.caller, legs.manager)?;

        if params.use_credit {
            let caller = session.caller;
            self.flush_caller(session, &range.pool, legs.caller, caller, true)?;
        }

        tracing::debug!(%receipt, liquidity_change, liquidity = legs.liquidity_after, "liquidity modified");
        self.emit_event(EventPayload::LiquidityModified(LiquidityModifiedEvent {
            receipt,
            liquidity_change,
            liquidity: legs.liquidity_after,
            caller_delta: legs.caller,
            fees_earned: legs.fees_earned,
        }));
        self.notify_modify(receipt, liquidity_change, legs.fees_earned);
        Ok(legs.caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::ledger::InMemoryLedger;
    use crate::types::{AccountId, Currency, PoolKey, Range, Timestamp};

    const MANAGER: AccountId = AccountId(1_000);
    const ALICE: AccountId = AccountId(1);
    const MALLORY: AccountId = AccountId(66);
    const C0: Currency = Currency(1);
    const C1: Currency = Currency(2);

    fn pool() -> PoolKey {
        PoolKey::new(C0, C1, 100, 60)
    }

    fn range() -> Range {
        Range::new(pool(), -60, 60).unwrap()
    }

    fn manager() -> PositionManager<InMemoryLedger> {
        let mut ledger = InMemoryLedger::new();
        ledger.initialize_pool(pool(), 0).unwrap();
        for account in [ALICE, MALLORY] {
            ledger.mint_tokens(account, C0, 100_000);
            ledger.mint_tokens(account, C1, 100_000);
        }
        let mut manager = PositionManager::new(ManagerConfig::default(), ledger, MANAGER).unwrap();
        manager.set_time(Timestamp::from_millis(10_000));
        manager
    }

    fn open_position(manager: &mut PositionManager<InMemoryLedger>, liquidity: u128) -> ReceiptId {
        let (receipt, _) = manager
            .unlock_with(ALICE, &[C0, C1], |m, s| {
                m.mint(
                    s,
                    MintParams {
                        range: range(),
                        liquidity,
                        deadline: Timestamp::MAX,
                        owner: ALICE,
                        hook_data: Vec::new(),
                    },
                )
            })
            .unwrap();
        receipt
    }

    fn change(receipt: ReceiptId, liquidity: u128, deadline: Timestamp) -> ModifyLiquidityParams {
        ModifyLiquidityParams {
            receipt,
            liquidity,
            deadline,
            hook_data: Vec::new(),
            use_credit: false,
        }
    }

    #[test]
    fn expired_deadline_rejected_before_mutation() {
        let mut manager = manager();
        let receipt = open_position(&mut manager, 1000);
        let result = manager.unlock_with(ALICE, &[C0, C1], |m, s| {
            m.increase_liquidity(s, change(receipt, 10, Timestamp::from_millis(9_999)))
        });
        assert!(matches!(result, Err(ManagerError::DeadlinePassed { .. })));
        assert_eq!(manager.position_info(receipt).unwrap().liquidity, 1000);
    }

    #[test]
    fn stranger_cannot_decrease() {
        let mut manager = manager();
        let receipt = open_position(&mut manager, 1000);
        let result = manager.unlock_with(MALLORY, &[C0, C1], |m, s| {
            m.decrease_liquidity(s, change(receipt, 10, Timestamp::MAX))
        });
        assert_eq!(
            result.unwrap_err(),
            ManagerError::Unauthorized {
                caller: MALLORY,
                receipt
            }
        );
    }

    #[test]
    fn decrease_pays_principal_back() {
        let mut manager = manager();
        let receipt = open_position(&mut manager, 1000);
        let (delta, settled) = manager
            .unlock_with(ALICE, &[C0, C1], |m, s| {
                m.decrease_liquidity(s, change(receipt, 400, Timestamp::MAX))
            })
            .unwrap();
        assert_eq!(delta, BalanceDelta::new(200, 200));
        assert_eq!(settled, vec![200, 200]);
        assert_eq!(manager.position_info(receipt).unwrap().liquidity, 600);
        assert_eq!(manager.ledger().balance_of(ALICE, C0), 100_000 - 500 + 200);
    }

    #[test]
    fn overdraft_fails_with_insufficient_liquidity() {
        let mut manager = manager();
        let receipt = open_position(&mut manager, 1000);
        let result = manager.unlock_with(ALICE, &[C0, C1], |m, s| {
            m.decrease_liquidity(s, change(receipt, 1001, Timestamp::MAX))
        });
        assert!(result.unwrap_err().is_insufficient_liquidity());
    }

    #[test]
    fn burn_requires_empty_position() {
        let mut manager = manager();
        let receipt = open_position(&mut manager, 1000);
        let result = manager.unlock_with(ALICE, &[C0, C1], |m, s| m.burn(s, BurnParams { receipt }));
        assert!(matches!(
            result,
            Err(ManagerError::Registry(RegistryError::PositionNotEmpty { .. }))
        ));

        manager
            .unlock_with(ALICE, &[C0, C1], |m, s| {
                m.decrease_liquidity(s, change(receipt, 1000, Timestamp::MAX))?;
                m.burn(s, BurnParams { receipt })
            })
            .unwrap();
        assert!(manager.receipt(receipt).is_none());
        assert!(manager.positions_of(ALICE).is_empty());
    }

    #[test]
    fn swap_respects_minimum_out() {
        let mut manager = manager();
        open_position(&mut manager, 10_000);
        let swap = SwapParams {
            pool: pool(),
            zero_for_one: true,
            amount_in: 1_000,
            min_amount_out: 991,
        };
        let result = manager.unlock_with(MALLORY, &[C0, C1], |m, s| m.swap(s, swap.clone()));
        assert_eq!(
            result.unwrap_err(),
            ManagerError::SlippageExceeded { min: 991, actual: 990 }
        );

        let (_, settled) = manager
            .unlock_with(MALLORY, &[C0, C1], |m, s| {
                m.swap(
                    s,
                    SwapParams {
                        min_amount_out: 990,
                        ..swap
                    },
                )
            })
            .unwrap();
        assert_eq!(settled, vec![-1_000, 990]);
    }

    #[test]
    fn collect_to_foreign_recipient_pays_immediately() {
        let mut manager = manager();
        let receipt = open_position(&mut manager, 4000);
        manager
            .ledger_mut()
            .unwrap()
            .swap_exact_in(MALLORY, &pool(), true, 1_000)
            .unwrap();

        let recipient = AccountId(77);
        let (paid, settled) = manager
            .unlock_with(ALICE, &[C0, C1], |m, s| {
                m.collect(
                    s,
                    CollectParams {
                        receipt,
                        recipient,
                        hook_data: Vec::new(),
                        use_credit: false,
                    },
                )
            })
            .unwrap();
        assert!(paid.amount0 > 0);
        assert_eq!(paid.amount1, 0);
        assert_eq!(manager.ledger().balance_of(recipient, C0), paid.amount0.unsigned_abs());
        // the payout is booked against the caller
        assert_eq!(settled[0], paid.amount0);
    }
}
