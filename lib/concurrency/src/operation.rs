use common::{OpId, SiteId, TxnId, VariableId};
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::fmt;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Read,
    Write,
}

/// A single read or write issued by a transaction.
///
/// Operations are owned by the manager in an id-keyed map; the transaction
/// record and the wait list refer to them by [`OpId`]. `locked_sites` remembers
/// every site where this operation's lock was recorded, which is also where a
/// write executed and must later commit or undo.
#[derive(Debug, Clone, Getters, TypedBuilder)]
#[getset(get = "pub")]
pub struct Operation {
    id: OpId,
    txn: TxnId,
    kind: OpKind,
    var: VariableId,
    value: Option<i64>,
    executed: bool,
    locked_sites: Vec<SiteId>,
}

impl Operation {
    pub fn read(id: OpId, txn: TxnId, var: VariableId) -> Self {
        Operation::builder()
            .id(id)
            .txn(txn)
            .kind(OpKind::Read)
            .var(var)
            .value(None)
            .executed(false)
            .locked_sites(Vec::new())
            .build()
    }

    pub fn write(id: OpId, txn: TxnId, var: VariableId, value: i64) -> Self {
        Operation::builder()
            .id(id)
            .txn(txn)
            .kind(OpKind::Write)
            .var(var)
            .value(Some(value))
            .executed(false)
            .locked_sites(Vec::new())
            .build()
    }

    pub fn is_write(&self) -> bool {
        self.kind == OpKind::Write
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    pub fn mark_executed(&mut self) {
        self.executed = true;
    }

    /// Remember a site where this operation's lock landed.
    pub fn record_locked_site(&mut self, site: SiteId) {
        if !self.locked_sites.contains(&site) {
            self.locked_sites.push(site);
        }
    }

    /// Forget a site, e.g. because it failed while the lock was held.
    pub fn forget_locked_site(&mut self, site: SiteId) {
        self.locked_sites.retain(|s| *s != site);
    }

    pub fn clear_locked_sites(&mut self) {
        self.locked_sites.clear();
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OpKind::Read => write!(f, "R({}, {})", self.txn, self.var),
            OpKind::Write => write!(f, "W({}, {}, {})", self.txn, self.var, self.value.unwrap_or(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_sites_are_deduplicated() {
        let mut op = Operation::read(OpId::new(1), TxnId::new(1), VariableId::new(2));
        op.record_locked_site(SiteId::new(3));
        op.record_locked_site(SiteId::new(3));
        op.record_locked_site(SiteId::new(5));
        assert_eq!(op.locked_sites(), &vec![SiteId::new(3), SiteId::new(5)]);

        op.forget_locked_site(SiteId::new(3));
        assert_eq!(op.locked_sites(), &vec![SiteId::new(5)]);
    }

    #[test]
    fn display_reads_like_the_command_language() {
        let op = Operation::write(OpId::new(7), TxnId::new(2), VariableId::new(6), 66);
        assert_eq!(op.to_string(), "W(T2, x6, 66)");
    }
}
