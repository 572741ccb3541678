use common::{OpId, SiteId, Timestamp, TxnId};
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TxnKind {
    /// Takes locks, writes to every available replica, commits at `end`.
    ReadWrite,
    /// Lock-free snapshot reads as of its begin timestamp.
    ReadOnly,
}

/// Why a transaction was (or will be) aborted. The reason is latched by the
/// first event that dooms the transaction and reported verbatim at `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AbortReason {
    #[error("it accessed site {0} and it failed later.")]
    SiteFailed(SiteId),
    #[error("it failed to get all required locks to work.")]
    LocksUnavailable,
    #[error("aborted due to deadlock")]
    Deadlock,
}

/// The per-transaction record: identity, kind, start timestamp, the ordered
/// list of its operations, and the latched abort reason if any.
#[derive(Debug, Clone, Getters, TypedBuilder)]
#[getset(get = "pub")]
pub struct Transaction {
    id: TxnId,
    kind: TxnKind,
    start_ts: Timestamp,
    abort_reason: Option<AbortReason>,
    ops: Vec<OpId>,
    failed_sites: Vec<SiteId>,
}

impl Transaction {
    pub fn new(id: TxnId, kind: TxnKind, start_ts: Timestamp) -> Self {
        Transaction::builder()
            .id(id)
            .kind(kind)
            .start_ts(start_ts)
            .abort_reason(None)
            .ops(Vec::new())
            .failed_sites(Vec::new())
            .build()
    }

    pub fn is_read_only(&self) -> bool {
        self.kind == TxnKind::ReadOnly
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    pub fn add_op(&mut self, op: OpId) {
        self.ops.push(op);
    }

    /// Latch an abort reason; the first one sticks.
    pub fn mark_aborted(&mut self, reason: AbortReason) {
        if self.abort_reason.is_none() {
            self.abort_reason = Some(reason);
        }
    }

    /// Record that a site this transaction operated on has failed, dooming it.
    pub fn mark_failed_site(&mut self, site: SiteId) {
        if !self.failed_sites.contains(&site) {
            self.failed_sites.push(site);
        }
        self.mark_aborted(AbortReason::SiteFailed(site));
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Transaction {}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transaction {{ id: {}, kind: {:?}, start: {} }}",
            self.id,
            self.kind,
            self.start_ts.as_u64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_reason_is_latched_first_wins() {
        let mut txn = Transaction::new(TxnId::new(1), TxnKind::ReadWrite, Timestamp::from(3));
        assert!(!txn.is_aborted());

        txn.mark_failed_site(SiteId::new(4));
        txn.mark_aborted(AbortReason::Deadlock);

        assert_eq!(
            txn.abort_reason(),
            &Some(AbortReason::SiteFailed(SiteId::new(4)))
        );
    }

    #[test]
    fn abort_reasons_render_the_protocol_text() {
        assert_eq!(
            AbortReason::SiteFailed(SiteId::new(3)).to_string(),
            "it accessed site 3 and it failed later."
        );
        assert_eq!(
            AbortReason::LocksUnavailable.to_string(),
            "it failed to get all required locks to work."
        );
        assert_eq!(AbortReason::Deadlock.to_string(), "aborted due to deadlock");
    }

    #[test]
    fn failed_sites_accumulate_without_duplicates() {
        let mut txn = Transaction::new(TxnId::new(2), TxnKind::ReadWrite, Timestamp::from(9));
        txn.mark_failed_site(SiteId::new(1));
        txn.mark_failed_site(SiteId::new(1));
        txn.mark_failed_site(SiteId::new(2));
        assert_eq!(
            txn.failed_sites(),
            &vec![SiteId::new(1), SiteId::new(2)]
        );
    }
}
