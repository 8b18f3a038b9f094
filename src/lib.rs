// posm-core: concentrated liquidity position manager.
// every liquidity change runs inside one unlock session against the ledger and either
// settles every currency to zero or rolls back entirely.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, Currency, PoolKey, Range, BalanceDelta, Q128 math
//   2.x  plan.rs: action tags, step params, plan encoding and finalizers
//   3.x  ledger/: pool ledger trait + in-memory ledger
//   4.x  position.rs: position struct, fee growth accounting, operators
//   5.x  registry.rs: receipt registry, salted positions, caller/manager legs
//   6.x  settlement.rs: per session delta book, close/settle/take/flush
//   6.2  authority.rs: receipt approvals beyond the owner
//   6.3  subscriber.rs: observer notifications under gas stipends
//   7.x  config.rs: limits, gas stipend, env presets
//   8.x  manager/: session cycle, position ops, batch dispatch, receipts, observers
//   11.x events.rs: state transition events for audit

// core modules
pub mod ledger;
pub mod manager;
pub mod plan;
pub mod position;
pub mod registry;
pub mod settlement;
pub mod types;

// capability and observer modules
pub mod authority;
pub mod subscriber;

// integration modules
pub mod config;
pub mod events;

// re exports for convenience
pub use events::*;
pub use position::*;
pub use types::*;
pub use authority::{ApprovalBook, OwnerOnly, ReceiptAuthority};
pub use config::{ConfigError, Environment, ManagerConfig};
pub use ledger::{InMemoryLedger, Ledger, LedgerError, ModifyLiquidityResult};
pub use manager::{ErrorClass, ManagerError, OperatorPermit, PositionInfo, PositionManager, Session};
pub use plan::{
    Action, BurnParams, CloseCurrencyParams, CollectParams, MintParams, ModifyLiquidityParams, Plan, PlanError,
    SettleAllParams, Step, SwapParams, TakeAllParams,
};
pub use registry::{Legs, PositionRegistry, ReceiptRecord, RegistryError};
pub use settlement::{DeltaBook, SettlementError, SettlementInstruction};
pub use subscriber::{
    GasBudget, NotificationDispatcher, NotifyError, NullSubscriber, Subscriber, SubscriptionError, UnsubscribeOutcome,
};
