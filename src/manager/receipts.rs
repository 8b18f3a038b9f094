// 8.6 manager/receipts.rs: receipt transfer and operator capabilities. all of these run
// outside a session.

use serde::{Deserialize, Serialize};

use super::core::PositionManager;
use super::results::ManagerError;
use crate::authority::ReceiptAuthority;
use crate::events::{EventPayload, OperatorChangedEvent, TransferredEvent};
use crate::ledger::Ledger;
use crate::position::Operator;
use crate::registry::RegistryError;
use crate::types::{AccountId, ReceiptId, Timestamp};

// operator grant signed off-chain by the owner. signature checking happens upstream; this is
// the already verified content, bound to the position nonce so it can be used once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorPermit {
    pub receipt: ReceiptId,
    pub signer: AccountId,
    pub operator: AccountId,
    pub expires_at: Option<Timestamp>,
    pub nonce: u64,
    pub deadline: Timestamp,
}

impl<L: Ledger + Clone, A: ReceiptAuthority> PositionManager<L, A> {
    pub fn transfer(&mut self, caller: AccountId, receipt: ReceiptId, to: AccountId) -> Result<(), ManagerError> {
        self.require_idle()?;
        self.require_owner_or_approved(caller, receipt)?;

        let now = self.current_time;
        let from = self.registry.transfer_record(receipt, to, now)?;
        self.authority.on_transfer(receipt, from, to);

        tracing::debug!(%receipt, %from, %to, "transferred");
        self.emit_event(EventPayload::Transferred(TransferredEvent { receipt, from, to }));
        self.notify_transfer(receipt, from, to);
        Ok(())
    }

    pub fn approve_operator(
        &mut self,
        caller: AccountId,
        receipt: ReceiptId,
        operator: AccountId,
        expires_at: Option<Timestamp>,
    ) -> Result<(), ManagerError> {
        self.require_idle()?;
        self.require_owner_or_approved(caller, receipt)?;
        self.set_operator(receipt, Some(Operator { account: operator, expires_at }))
    }

    pub fn revoke_operator(&mut self, caller: AccountId, receipt: ReceiptId) -> Result<(), ManagerError> {
        self.require_idle()?;
        self.require_owner_or_approved(caller, receipt)?;
        self.set_operator(receipt, None)
    }

    // consumes the permit and returns the position's new nonce
    pub fn permit_operator(&mut self, permit: OperatorPermit) -> Result<u64, ManagerError> {
        self.require_idle()?;
        self.check_deadline(permit.deadline)?;
        let owner = self.require_owner_or_approved(permit.signer, permit.receipt)?;

        let expected = self
            .registry
            .position(permit.receipt)
            .ok_or(RegistryError::PositionNotFound(permit.receipt))?
            .nonce;
        if permit.nonce != expected {
            return Err(ManagerError::InvalidNonce {
                receipt: permit.receipt,
                expected,
                got: permit.nonce,
            });
        }

        let nonce = self.registry.use_nonce(permit.receipt)?;
        self.authority.on_nonce_used(owner, permit.receipt, nonce);
        self.set_operator(
            permit.receipt,
            Some(Operator {
                account: permit.operator,
                expires_at: permit.expires_at,
            }),
        )?;
        Ok(nonce)
    }

    fn set_operator(&mut self, receipt: ReceiptId, operator: Option<Operator>) -> Result<(), ManagerError> {
        let now = self.current_time;
        self.registry.set_operator(receipt, operator, now)?;
        let nonce = self
            .registry
            .position(receipt)
            .map_or(0, |position| position.nonce);

        self.emit_event(EventPayload::OperatorChanged(OperatorChangedEvent {
            receipt,
            operator: operator.map(|op| op.account),
            expires_at: operator.and_then(|op| op.expires_at),
            nonce,
        }));
        Ok(())
    }
}
