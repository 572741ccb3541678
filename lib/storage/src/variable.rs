use crate::lock::LockState;
use common::{Timestamp, VariableId};
use getset::{CopyGetters, Getters};

/// One variable's storage at one site: the uncommitted current value plus the
/// append-only commit history that backs snapshot reads.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Variable {
    #[getset(get_copy = "pub")]
    id: VariableId,
    /// Current (possibly uncommitted) value.
    #[getset(get_copy = "pub")]
    value: i64,
    /// (timestamp, value) pairs in strictly increasing timestamp order.
    #[getset(get = "pub")]
    history: Vec<(Timestamp, i64)>,
    #[getset(get_copy = "pub")]
    lock_state: LockState,
    /// Set when the owning site recovers; cleared by the next committed write.
    #[getset(get_copy = "pub")]
    is_recovered: bool,
}

impl Variable {
    pub fn new(id: VariableId, initial: i64) -> Self {
        Self {
            id,
            value: initial,
            history: vec![(Timestamp::ORIGIN, initial)],
            lock_state: LockState::Free,
            is_recovered: false,
        }
    }

    pub fn set_value(&mut self, value: i64) {
        self.value = value;
    }

    pub fn set_lock_state(&mut self, state: LockState) {
        self.lock_state = state;
    }

    pub fn set_is_recovered(&mut self, recovered: bool) {
        self.is_recovered = recovered;
    }

    /// Append the current value to the history at `at`. A transaction commits
    /// all its writes at one timestamp, so entries may share `at`; the later
    /// entry wins for that instant.
    pub fn commit(&mut self, at: Timestamp) {
        debug_assert!(
            self.history.last().map(|(ts, _)| *ts <= at).unwrap_or(true),
            "commit timestamps never move backwards"
        );
        self.history.push((at, self.value));
    }

    /// The committed value with the greatest timestamp ≤ `at`. The origin entry
    /// guarantees an answer for every reachable timestamp.
    pub fn committed_value_at(&self, at: Timestamp) -> i64 {
        self.history
            .iter()
            .rev()
            .find(|(ts, _)| *ts <= at)
            .map(|(_, value)| *value)
            .unwrap_or_else(|| self.history[0].1)
    }

    /// The most recently committed value.
    pub fn latest_committed(&self) -> i64 {
        self.history
            .last()
            .map(|(_, value)| *value)
            .expect("history always holds the origin entry")
    }

    /// Drop the uncommitted current value, restoring the last committed one.
    pub fn undo(&mut self) {
        self.value = self.latest_committed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions_sorted::assert_eq;

    fn ts(t: u64) -> Timestamp {
        Timestamp::from(t)
    }

    #[test]
    fn starts_with_the_origin_commit() {
        let var = Variable::new(VariableId::new(3), 30);
        assert_eq!(var.value(), 30);
        assert_eq!(var.latest_committed(), 30);
        assert_eq!(var.committed_value_at(ts(0)), 30);
        assert_eq!(var.committed_value_at(ts(100)), 30);
    }

    #[test]
    fn snapshot_reads_pick_the_greatest_commit_at_or_before() {
        let mut var = Variable::new(VariableId::new(2), 20);
        var.set_value(21);
        var.commit(ts(5));
        var.set_value(22);
        var.commit(ts(9));

        assert_eq!(var.committed_value_at(ts(4)), 20);
        assert_eq!(var.committed_value_at(ts(5)), 21);
        assert_eq!(var.committed_value_at(ts(8)), 21);
        assert_eq!(var.committed_value_at(ts(9)), 22);
        assert_eq!(var.committed_value_at(ts(50)), 22);
    }

    #[test]
    fn undo_restores_the_last_commit_and_is_idempotent() {
        let mut var = Variable::new(VariableId::new(4), 40);
        var.set_value(99);
        var.commit(ts(2));
        var.set_value(123);

        var.undo();
        assert_eq!(var.value(), 99);
        var.undo();
        assert_eq!(var.value(), 99);
    }

    #[test]
    fn history_is_append_only() {
        let mut var = Variable::new(VariableId::new(6), 60);
        var.set_value(61);
        var.commit(ts(1));
        var.set_value(62);
        var.commit(ts(2));
        assert_eq!(
            var.history(),
            &vec![(ts(0), 60), (ts(1), 61), (ts(2), 62)]
        );
    }
}
