// 8.0: position manager. owns the registry, the observer registrations and the session
// state, and drives every mutation through one atomic ledger session.
// deterministic and event-driven; the ledger is the only collaborator with token state.

mod core;
mod dispatch;
mod notify;
mod positions;
mod receipts;
mod results;
mod session;
mod settle;

pub use self::core::PositionManager;
pub use receipts::OperatorPermit;
pub use results::{ErrorClass, ManagerError, PositionInfo};
pub use session::Session;
