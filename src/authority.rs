// 6.2 authority.rs: receipt authorization collaborator. answers "may this caller act on
// receipt X" and hears about every transfer and consumed permit nonce. the manager checks
// ownership and live operators itself before falling back to the authority.

use std::collections::{HashMap, HashSet};

use crate::types::{AccountId, ReceiptId};

pub trait ReceiptAuthority {
    fn is_authorized(&self, caller: AccountId, owner: AccountId, receipt: ReceiptId) -> bool;

    fn on_transfer(&mut self, receipt: ReceiptId, from: AccountId, to: AccountId);

    // permit nonce consumed for `receipt`. `nonce` is the new position nonce.
    fn on_nonce_used(&mut self, _owner: AccountId, _receipt: ReceiptId, _nonce: u64) {}
}

/// Only the owner may act.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerOnly;

impl ReceiptAuthority for OwnerOnly {
    fn is_authorized(&self, caller: AccountId, owner: AccountId, _receipt: ReceiptId) -> bool {
        caller == owner
    }

    fn on_transfer(&mut self, _receipt: ReceiptId, _from: AccountId, _to: AccountId) {}
}

// 6.2.1: per-receipt approvals plus blanket approvals per owner. a transfer clears the
// receipt's approval; blanket approvals belong to the owner and stay.
#[derive(Debug, Clone, Default)]
pub struct ApprovalBook {
    approved: HashMap<ReceiptId, AccountId>,
    approved_for_all: HashSet<(AccountId, AccountId)>,
    nonces_used: HashMap<AccountId, u64>,
}

impl ApprovalBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn approve(&mut self, receipt: ReceiptId, spender: AccountId) {
        self.approved.insert(receipt, spender);
    }

    pub fn clear_approval(&mut self, receipt: ReceiptId) {
        self.approved.remove(&receipt);
    }

    pub fn set_approval_for_all(&mut self, owner: AccountId, operator: AccountId, approved: bool) {
        if approved {
            self.approved_for_all.insert((owner, operator));
        } else {
            self.approved_for_all.remove(&(owner, operator));
        }
    }

    pub fn approved(&self, receipt: ReceiptId) -> Option<AccountId> {
        self.approved.get(&receipt).copied()
    }

    pub fn permits_used(&self, owner: AccountId) -> u64 {
        self.nonces_used.get(&owner).copied().unwrap_or(0)
    }
}

impl ReceiptAuthority for ApprovalBook {
    fn is_authorized(&self, caller: AccountId, owner: AccountId, receipt: ReceiptId) -> bool {
        caller == owner
            || self.approved(receipt) == Some(caller)
            || self.approved_for_all.contains(&(owner, caller))
    }

    fn on_transfer(&mut self, receipt: ReceiptId, _from: AccountId, _to: AccountId) {
        self.clear_approval(receipt);
    }

    fn on_nonce_used(&mut self, owner: AccountId, _receipt: ReceiptId, _nonce: u64) {
        *self.nonces_used.entry(owner).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: AccountId = AccountId(1);
    const SPENDER: AccountId = AccountId(2);

    #[test]
    fn owner_only() {
        let authority = OwnerOnly;
        assert!(authority.is_authorized(OWNER, OWNER, ReceiptId(1)));
        assert!(!authority.is_authorized(SPENDER, OWNER, ReceiptId(1)));
    }

    #[test]
    fn receipt_approval_cleared_on_transfer() {
        let mut book = ApprovalBook::new();
        book.approve(ReceiptId(1), SPENDER);
        assert!(book.is_authorized(SPENDER, OWNER, ReceiptId(1)));
        assert!(!book.is_authorized(SPENDER, OWNER, ReceiptId(2)));

        book.on_transfer(ReceiptId(1), OWNER, AccountId(3));
        assert!(!book.is_authorized(SPENDER, AccountId(3), ReceiptId(1)));
    }

    #[test]
    fn blanket_approval_follows_owner() {
        let mut book = ApprovalBook::new();
        book.set_approval_for_all(OWNER, SPENDER, true);
        assert!(book.is_authorized(SPENDER, OWNER, ReceiptId(7)));
        assert!(!book.is_authorized(SPENDER, AccountId(3), ReceiptId(7)));

        book.set_approval_for_all(OWNER, SPENDER, false);
        assert!(!book.is_authorized(SPENDER, OWNER, ReceiptId(7)));
    }
}
