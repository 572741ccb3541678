use common::{TxnId, VariableId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LockKind {
    Read,
    Write,
}

/// The cached lock status of a variable, kept consistent with its lock queue:
/// `Write` iff the queue holds exactly one write lock, `Read` iff it holds one
/// or more read locks and no write lock, `Free` iff the queue is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockState {
    Free,
    Read,
    Write,
}

/// A lock entry in a site's queue. Two locks are the same lock iff the whole
/// triple matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lock {
    pub txn: TxnId,
    pub var: VariableId,
    pub kind: LockKind,
}

impl Lock {
    pub fn new(txn: TxnId, var: VariableId, kind: LockKind) -> Self {
        Self { txn, var, kind }
    }

    pub fn read(txn: TxnId, var: VariableId) -> Self {
        Self::new(txn, var, LockKind::Read)
    }

    pub fn write(txn: TxnId, var: VariableId) -> Self {
        Self::new(txn, var, LockKind::Write)
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            LockKind::Read => "S",
            LockKind::Write => "X",
        };
        write!(f, "{}({}, {})", kind, self.txn, self.var)
    }
}

/// Outcome of [`crate::Site::apply_lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReply {
    /// Lock inserted into the queue; the variable's lock state reflects it.
    Granted,
    /// The caller already holds a compatible lock (or is the sole reader
    /// requesting a write); re-apply with `force` to take it.
    Upgradable,
    /// Held by another transaction.
    Conflict,
    SiteFailed,
    NoSuchVariable,
    /// Reads of a replicated variable are blocked at a just-recovered site
    /// until a committed write lands there.
    RecoveredReplicaBlocked,
}

impl LockReply {
    /// Refusals mean this replica is simply not usable for the request; the
    /// manager routes around them rather than treating them as contention.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            LockReply::SiteFailed | LockReply::NoSuchVariable | LockReply::RecoveredReplicaBlocked
        )
    }
}

/// Outcome of [`crate::Site::release_lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReply {
    Released,
    SiteFailed,
    NoSuchVariable,
    /// A read lock needs no release when the same transaction's write lock
    /// already covers the variable.
    CoveredByWrite,
    NotFound,
}
