use crate::lock::{Lock, LockKind, LockReply, LockState, ReleaseReply};
use crate::placement;
use crate::variable::Variable;
use common::{SiteId, SystemConfig, Timestamp};
use concurrency::{OpKind, Operation, Transaction, TxnKind};
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteStatus {
    Available,
    Failed,
}

/// A replica host: the variables with a copy here, their lock queues, and the
/// site's availability.
///
/// The site enforces the local lock-compatibility rules and performs the actual
/// reads, writes, commits and undos; which replicas participate in an operation
/// is the manager's call. While the site is failed every lock queue is empty
/// and every variable reads as `Free`.
#[derive(Debug, Getters, CopyGetters)]
pub struct Site {
    #[getset(get_copy = "pub")]
    id: SiteId,
    #[getset(get_copy = "pub")]
    status: SiteStatus,
    #[getset(get = "pub")]
    variables: BTreeMap<common::VariableId, Variable>,
    #[getset(get = "pub")]
    lock_table: BTreeMap<common::VariableId, Vec<Lock>>,
}

impl Site {
    pub fn new(id: SiteId, config: &SystemConfig) -> Self {
        let mut variables = BTreeMap::new();
        let mut lock_table = BTreeMap::new();
        for var in placement::variables_at(config, id) {
            variables.insert(var, Variable::new(var, config.initial_value(var)));
            lock_table.insert(var, Vec::new());
        }
        Self {
            id,
            status: SiteStatus::Available,
            variables,
            lock_table,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == SiteStatus::Available
    }

    pub fn hosts(&self, var: common::VariableId) -> bool {
        self.variables.contains_key(&var)
    }

    /// The locks currently queued on `var` (empty while failed).
    pub fn lock_holders(&self, var: common::VariableId) -> &[Lock] {
        self.lock_table.get(&var).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Try to queue `lock` on its variable.
    ///
    /// `force` is the second half of the upgrade protocol: a caller that got
    /// [`LockReply::Upgradable`] re-applies with `force=true` to take the lock,
    /// upgrading sole-reader → writer in place. A forced re-request of a lock
    /// the transaction already effectively holds leaves the queue untouched.
    pub fn apply_lock(&mut self, lock: Lock, force: bool) -> LockReply {
        if self.status == SiteStatus::Failed {
            return LockReply::SiteFailed;
        }
        let Some(variable) = self.variables.get_mut(&lock.var) else {
            trace!(site = %self.id, var = %lock.var, "variable not hosted here");
            return LockReply::NoSuchVariable;
        };
        if variable.is_recovered() && lock.kind == LockKind::Read && lock.var.is_replicated() {
            // unreadable until a committed write refreshes this replica
            return LockReply::RecoveredReplicaBlocked;
        }

        let queue = self
            .lock_table
            .get_mut(&lock.var)
            .expect("hosted variables always have a lock queue");

        match variable.lock_state() {
            LockState::Free => {
                variable.set_lock_state(match lock.kind {
                    LockKind::Read => LockState::Read,
                    LockKind::Write => LockState::Write,
                });
                queue.push(lock);
                LockReply::Granted
            }
            LockState::Write => {
                // exactly one write lock is in the queue
                if queue[0].txn == lock.txn {
                    // the write lock already covers any request by its owner
                    if force {
                        LockReply::Granted
                    } else {
                        LockReply::Upgradable
                    }
                } else {
                    LockReply::Conflict
                }
            }
            LockState::Read => match lock.kind {
                LockKind::Write => {
                    if queue.len() == 1 && queue[0].txn == lock.txn {
                        if force {
                            debug!(site = %self.id, %lock, "upgrading sole read lock to write");
                            queue.clear();
                            queue.push(lock);
                            variable.set_lock_state(LockState::Write);
                            LockReply::Granted
                        } else {
                            LockReply::Upgradable
                        }
                    } else {
                        LockReply::Conflict
                    }
                }
                LockKind::Read => {
                    if queue.iter().any(|held| held.txn == lock.txn) {
                        // this transaction already reads the variable here
                        if force {
                            LockReply::Granted
                        } else {
                            LockReply::Upgradable
                        }
                    } else {
                        queue.push(lock);
                        LockReply::Granted
                    }
                }
            },
        }
    }

    /// Remove `lock` from its queue, freeing the variable when the queue
    /// empties.
    pub fn release_lock(&mut self, lock: &Lock) -> ReleaseReply {
        if self.status == SiteStatus::Failed {
            return ReleaseReply::SiteFailed;
        }
        let Some(variable) = self.variables.get_mut(&lock.var) else {
            return ReleaseReply::NoSuchVariable;
        };
        let queue = self
            .lock_table
            .get_mut(&lock.var)
            .expect("hosted variables always have a lock queue");

        if lock.kind == LockKind::Read
            && variable.lock_state() == LockState::Write
            && queue.first().map(|held| held.txn) == Some(lock.txn)
        {
            // the read was absorbed by this transaction's own write lock
            return ReleaseReply::CoveredByWrite;
        }

        let before = queue.len();
        queue.retain(|held| held != lock);
        let removed = queue.len() != before;

        if queue.is_empty() {
            variable.set_lock_state(LockState::Free);
        }

        if removed {
            ReleaseReply::Released
        } else {
            ReleaseReply::NotFound
        }
    }

    /// Run `op` against this replica's current state, printing the observable
    /// line for successful reads. Returns whether the replica served it.
    pub fn execute(&mut self, op: &Operation, txn: &Transaction) -> bool {
        if self.status == SiteStatus::Failed {
            trace!(site = %self.id, %op, "execute refused: site failed");
            return false;
        }
        let Some(variable) = self.variables.get_mut(op.var()) else {
            return false;
        };

        match txn.kind() {
            TxnKind::ReadOnly => match op.kind() {
                OpKind::Read => {
                    if variable.is_recovered() && op.var().is_replicated() {
                        return false;
                    }
                    println!(
                        "{} read last COMMITTED variable {} on site{} returns {}.",
                        txn.id(),
                        op.var().as_u32(),
                        self.id,
                        variable.committed_value_at(*txn.start_ts())
                    );
                    true
                }
                // read-only transactions never carry writes
                OpKind::Write => false,
            },
            TxnKind::ReadWrite => match op.kind() {
                OpKind::Read => {
                    if variable.is_recovered() && op.var().is_replicated() {
                        return false;
                    }
                    println!(
                        "{} read variable {} on site{} returns {}.",
                        txn.id(),
                        op.var().as_u32(),
                        self.id,
                        variable.value()
                    );
                    true
                }
                OpKind::Write => {
                    if let Some(value) = op.value() {
                        variable.set_value(*value);
                        trace!(site = %self.id, %op, "wrote uncommitted value");
                        true
                    } else {
                        false
                    }
                }
            },
        }
    }

    /// Commit `op`'s effect at timestamp `at`. Reads and read-only transactions
    /// commit trivially; a committed write also refreshes a recovered replica.
    pub fn commit(&mut self, op: &Operation, txn: &Transaction, at: Timestamp) -> bool {
        if self.status == SiteStatus::Failed {
            debug!(site = %self.id, %op, "commit refused: site failed");
            return false;
        }
        let Some(variable) = self.variables.get_mut(op.var()) else {
            return false;
        };
        if op.kind() == &OpKind::Read || txn.kind() == &TxnKind::ReadOnly {
            return true;
        }

        variable.commit(at);
        if variable.is_recovered() {
            variable.set_is_recovered(false);
        }
        true
    }

    /// Revert `op`'s uncommitted write, if any.
    pub fn undo(&mut self, op: &Operation) -> bool {
        if self.status == SiteStatus::Failed {
            return false;
        }
        let Some(variable) = self.variables.get_mut(op.var()) else {
            // nothing to undo here
            return true;
        };
        if op.kind() == &OpKind::Read {
            return true;
        }
        variable.undo();
        true
    }

    /// Print this site's variables ascending by id.
    pub fn dump(&self, committed: bool) {
        let entries = self
            .variables
            .values()
            .map(|variable| {
                let value = if committed {
                    variable.latest_committed()
                } else {
                    variable.value()
                };
                format!("x{}: {}", variable.id().as_u32(), value)
            })
            .collect::<Vec<_>>()
            .join(", ");
        println!("site {} - {}", self.id, entries);
    }

    /// Crash this site: all lock queues clear and every variable frees.
    pub fn fail(&mut self) {
        self.status = SiteStatus::Failed;
        for queue in self.lock_table.values_mut() {
            queue.clear();
        }
        for variable in self.variables.values_mut() {
            variable.set_lock_state(LockState::Free);
        }
    }

    /// Bring a failed site back: uncommitted values roll back and every
    /// variable is flagged recovered until a committed write refreshes it.
    pub fn recover(&mut self) {
        self.status = SiteStatus::Available;
        for variable in self.variables.values_mut() {
            variable.undo();
            variable.set_is_recovered(true);
        }
    }
}


#[cfg(test)]
mod lock_release {
    use super::*;
    use common::{TxnId, VariableId};
    use pretty_assertions_sorted::assert_eq;

    const T1: TxnId = TxnId(1);
    const T2: TxnId = TxnId(2);
    const X2: VariableId = VariableId(2);

    fn site() -> Site {
        Site::new(SiteId::new(1), &SystemConfig::default())
    }

    #[test]
    fn releasing_the_last_lock_frees_the_variable() {
        let mut site = site();
        site.apply_lock(Lock::write(T1, X2), false);
        assert_eq!(
            site.release_lock(&Lock::write(T1, X2)),
            ReleaseReply::Released
        );
        assert_eq!(
            site.variables().get(&X2).unwrap().lock_state(),
            LockState::Free
        );
    }

    #[test]
    fn releasing_one_of_two_readers_keeps_the_variable_read_locked() {
        let mut site = site();
        site.apply_lock(Lock::read(T1, X2), false);
        site.apply_lock(Lock::read(T2, X2), false);
        assert_eq!(
            site.release_lock(&Lock::read(T1, X2)),
            ReleaseReply::Released
        );
        assert_eq!(
            site.variables().get(&X2).unwrap().lock_state(),
            LockState::Read
        );
        assert_eq!(site.lock_holders(X2), &[Lock::read(T2, X2)]);
    }

    #[test]
    fn read_release_under_own_write_lock_is_covered() {
        let mut site = site();
        site.apply_lock(Lock::read(T1, X2), false);
        site.apply_lock(Lock::write(T1, X2), true);
        assert_eq!(
            site.release_lock(&Lock::read(T1, X2)),
            ReleaseReply::CoveredByWrite
        );
        assert_eq!(site.lock_holders(X2), &[Lock::write(T1, X2)]);
    }

    #[test]
    fn unknown_lock_reports_not_found() {
        let mut site = site();
        site.apply_lock(Lock::read(T1, X2), false);
        assert_eq!(
            site.release_lock(&Lock::read(T2, X2)),
            ReleaseReply::NotFound
        );
    }
}

#[cfg(test)]
mod lifecycle {
    use super::*;
    use common::{OpId, TxnId, VariableId};
    use pretty_assertions_sorted::assert_eq;

    const T1: TxnId = TxnId(1);
    const X6: VariableId = VariableId(6);

    fn rw_txn() -> Transaction {
        Transaction::new(T1, TxnKind::ReadWrite, Timestamp::from(1))
    }

    #[test]
    fn fail_clears_every_queue_and_frees_every_variable() {
        let mut site = Site::new(SiteId::new(1), &SystemConfig::default());
        site.apply_lock(Lock::write(T1, X6), false);
        site.apply_lock(Lock::read(T1, VariableId::new(4)), false);

        site.fail();

        assert_eq!(site.status(), SiteStatus::Failed);
        assert!(site.lock_table().values().all(Vec::is_empty));
        assert!(site
            .variables()
            .values()
            .all(|v| v.lock_state() == LockState::Free));
    }

    #[test]
    fn recover_rolls_back_uncommitted_values_and_flags_replicas() {
        let mut site = Site::new(SiteId::new(1), &SystemConfig::default());
        let txn = rw_txn();
        let op = Operation::write(OpId::new(1), T1, X6, 66);
        assert!(site.execute(&op, &txn));
        assert_eq!(site.variables().get(&X6).unwrap().value(), 66);

        site.fail();
        site.recover();

        let variable = site.variables().get(&X6).unwrap();
        assert_eq!(site.status(), SiteStatus::Available);
        assert_eq!(variable.value(), 60);
        assert!(variable.is_recovered());
    }

    #[test]
    fn committed_write_refreshes_a_recovered_replica() {
        let mut site = Site::new(SiteId::new(1), &SystemConfig::default());
        site.fail();
        site.recover();

        let txn = rw_txn();
        let op = Operation::write(OpId::new(1), T1, X6, 66);
        assert!(site.execute(&op, &txn));
        assert!(site.commit(&op, &txn, Timestamp::from(5)));

        let variable = site.variables().get(&X6).unwrap();
        assert!(!variable.is_recovered());
        assert_eq!(variable.latest_committed(), 66);
    }

    #[test]
    fn undo_reverts_an_executed_write() {
        let mut site = Site::new(SiteId::new(1), &SystemConfig::default());
        let txn = rw_txn();
        let op = Operation::write(OpId::new(1), T1, X6, 66);
        site.execute(&op, &txn);

        assert!(site.undo(&op));
        assert_eq!(site.variables().get(&X6).unwrap().value(), 60);
    }

    #[test]
    fn read_only_snapshot_ignores_later_commits() {
        let mut site = Site::new(SiteId::new(1), &SystemConfig::default());
        let writer = rw_txn();
        let write = Operation::write(OpId::new(1), T1, X6, 66);
        site.execute(&write, &writer);
        site.commit(&write, &writer, Timestamp::from(5));

        // the snapshot transaction began before the commit above
        let reader = Transaction::new(TxnId::new(9), TxnKind::ReadOnly, Timestamp::from(2));
        let variable = site.variables().get(&X6).unwrap();
        assert_eq!(variable.committed_value_at(*reader.start_ts()), 60);
        let read = Operation::read(OpId::new(2), TxnId::new(9), X6);
        assert!(site.execute(&read, &reader));
    }

    #[test]
    fn recovered_replica_refuses_rw_reads_until_refreshed() {
        let mut site = Site::new(SiteId::new(1), &SystemConfig::default());
        site.fail();
        site.recover();

        let txn = rw_txn();
        let read = Operation::read(OpId::new(1), T1, X6);
        assert!(!site.execute(&read, &txn));

        let write = Operation::write(OpId::new(2), T1, X6, 61);
        assert!(site.execute(&write, &txn));
        assert!(site.commit(&write, &txn, Timestamp::from(4)));
        assert!(site.execute(&read, &txn));
    }
}
