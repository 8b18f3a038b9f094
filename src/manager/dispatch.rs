// 8.5 manager/dispatch.rs: replay an encoded plan inside the open session. every step goes
// back through the same public entry points a direct caller would use.

use super::core::PositionManager;
use super::results::ManagerError;
use super::session::Session;
use crate::authority::ReceiptAuthority;
use crate::ledger::Ledger;
use crate::plan::{Plan, PlanError, Step};
use crate::types::{AccountId, Currency};

impl<L: Ledger + Clone, A: ReceiptAuthority> PositionManager<L, A> {
    /// Decodes `payload`, runs it in one session for `caller` and settles `currencies`.
    /// Returns the caller's settled amount per requested currency.
    pub fn unlock_and_execute(
        &mut self,
        caller: AccountId,
        payload: &[u8],
        currencies: &[Currency],
    ) -> Result<Vec<i128>, ManagerError> {
        let (_, settled) = self.unlock_with(caller, currencies, |manager, session| {
            manager.execute_plan(session, payload)
        })?;
        Ok(settled)
    }

    // whole plan is decoded before the first step runs
    pub fn execute_plan(&mut self, session: &Session, payload: &[u8]) -> Result<usize, ManagerError> {
        self.require_session(session)?;
        let plan = Plan::decode(payload)?;
        if plan.len() > self.config.max_plan_actions {
            return Err(PlanError::TooManyActions {
                count: plan.len(),
                max: self.config.max_plan_actions,
            }
            .into());
        }

        let steps = plan.steps()?;
        let count = steps.len();
        for (index, step) in steps.into_iter().enumerate() {
            let action = step.action();
            tracing::debug!(index, ?action, "dispatching step");
            if let Err(e) = self.dispatch(session, step) {
                tracing::warn!(index, ?action, error = %e, "step failed");
                return Err(e);
            }
        }
        Ok(count)
    }

    pub fn dispatch(&mut self, session: &Session, step: Step) -> Result<(), ManagerError> {
        match step {
            Step::Mint(params) => self.mint(session, params).map(|_| ()),
            Step::IncreaseLiquidity(params) => self.increase_liquidity(session, params).map(|_| ()),
            Step::DecreaseLiquidity(params) => self.decrease_liquidity(session, params).map(|_| ()),
            Step::Collect(params) => self.collect(session, params).map(|_| ()),
            Step::Burn(params) => self.burn(session, params),
            Step::Swap(params) => self.swap(session, params).map(|_| ()),
            Step::CloseCurrency(params) => self.close_currency(session, params).map(|_| ()),
            Step::SettleAll(params) => self.settle_all(session, params).map(|_| ()),
            Step::TakeAll(params) => self.take_all(session, params).map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::ledger::InMemoryLedger;
    use crate::plan::{Action, MintParams};
    use crate::types::{PoolKey, Range, ReceiptId, Timestamp};

    const MANAGER: AccountId = AccountId(1_000);
    const ALICE: AccountId = AccountId(1);

    fn pool() -> PoolKey {
        PoolKey::new(Currency(1), Currency(2), 100, 60)
    }

    fn manager(config: ManagerConfig) -> PositionManager<InMemoryLedger> {
        let mut ledger = InMemoryLedger::new();
        ledger.initialize_pool(pool(), 0).unwrap();
        ledger.mint_tokens(ALICE, Currency(1), 10_000);
        ledger.mint_tokens(ALICE, Currency(2), 10_000);
        PositionManager::new(config, ledger, MANAGER).unwrap()
    }

    fn mint_step(liquidity: u128) -> Step {
        Step::Mint(MintParams {
            range: Range::new(pool(), -60, 60).unwrap(),
            liquidity,
            deadline: Timestamp::MAX,
            owner: ALICE,
            hook_data: Vec::new(),
        })
    }

    #[test]
    fn executes_finalized_plan() {
        let mut manager = manager(ManagerConfig::default());
        let payload = Plan::new()
            .with(mint_step(1000))
            .unwrap()
            .finalize_liquidity(&pool())
            .unwrap();
        let settled = manager
            .unlock_and_execute(ALICE, &payload, &[Currency(1), Currency(2)])
            .unwrap();
        assert_eq!(settled, vec![-500, -500]);
        assert_eq!(manager.position_info(ReceiptId(1)).unwrap().liquidity, 1000);
    }

    #[test]
    fn too_many_actions_rejected() {
        let config = ManagerConfig {
            max_plan_actions: 2,
            ..ManagerConfig::default()
        };
        let mut manager = manager(config);
        let payload = Plan::new()
            .with(mint_step(1))
            .unwrap()
            .finalize_liquidity(&pool())
            .unwrap();
        let result = manager.unlock_and_execute(ALICE, &payload, &[Currency(1), Currency(2)]);
        assert_eq!(
            result.unwrap_err(),
            ManagerError::Plan(PlanError::TooManyActions { count: 3, max: 2 })
        );
    }

    #[test]
    fn bad_params_abort_before_any_step() {
        let mut manager = manager(ManagerConfig::default());
        let payload = Plan::new()
            .with(mint_step(1000))
            .unwrap()
            .append(Action::Collect, b"not json".to_vec())
            .encode()
            .unwrap();
        let result = manager.unlock_and_execute(ALICE, &payload, &[Currency(1), Currency(2)]);
        assert!(matches!(
            result,
            Err(ManagerError::Plan(PlanError::InvalidParams { index: 1, .. }))
        ));
        assert!(manager.receipt(ReceiptId(1)).is_none());
    }

    #[test]
    fn garbage_payload_is_malformed() {
        let mut manager = manager(ManagerConfig::default());
        let result = manager.unlock_and_execute(ALICE, b"\x00\x01", &[]);
        assert!(matches!(result, Err(ManagerError::Plan(PlanError::Malformed(_)))));
        assert!(!manager.is_unlocked());
    }
}
