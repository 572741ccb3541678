use common::{LogicalClock, OpId, SiteId, SystemConfig, Timestamp, TxnId, VariableId};
use compile::Command;
use concurrency::{AbortReason, OpKind, Operation, Transaction, TxnKind, WaitForGraph};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use storage::{placement, Lock, LockKind, LockReply, ReleaseReply, Site};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown transaction {0}")]
    UnknownTransaction(TxnId),
    #[error("transaction {0} already exists")]
    DuplicateTransaction(TxnId),
    #[error("no site {0} in this topology")]
    UnknownSite(SiteId),
    #[error("no variable {0} in this topology")]
    UnknownVariable(VariableId),
    #[error("read-only transaction {0} cannot write")]
    ReadOnlyWrite(TxnId),
}

/// The coordinator for the whole system.
///
/// Owns the sites, the transactions and their operations, the FIFO wait list,
/// and the wait-for graph; every command in the serial stream flows through
/// [`TransactionManager::dispatch`]. Replicated writes follow the
/// available-copies rule (every available replica or none), reads need one
/// replica, and read-only transactions bypass locking entirely with snapshot
/// reads as of their begin timestamp.
#[derive(Debug)]
pub struct TransactionManager {
    config: SystemConfig,
    clock: LogicalClock,
    next_op_id: u64,
    sites: BTreeMap<SiteId, Site>,
    transactions: HashMap<TxnId, Transaction>,
    ops: HashMap<OpId, Operation>,
    /// Sites each transaction has successfully operated on; failing any of
    /// them dooms the transaction.
    txn_sites: HashMap<TxnId, HashSet<SiteId>>,
    /// Operations that could not get their locks, in arrival order.
    wait_list: Vec<OpId>,
    graph: WaitForGraph,
}

impl TransactionManager {
    pub fn new(config: SystemConfig) -> Self {
        let sites = (1..=config.num_sites)
            .map(SiteId::new)
            .map(|id| (id, Site::new(id, &config)))
            .collect();
        Self {
            config,
            clock: LogicalClock::new(),
            next_op_id: 0,
            sites,
            transactions: HashMap::new(),
            ops: HashMap::new(),
            txn_sites: HashMap::new(),
            wait_list: Vec::new(),
            graph: WaitForGraph::new(),
        }
    }

    /// Route one parsed command. Semantic errors (unknown ids, duplicate
    /// begins) leave the state untouched; the caller reports them.
    pub fn dispatch(&mut self, command: Command) -> Result<(), SessionError> {
        trace!(?command, "dispatching");
        match command {
            Command::Begin { txn } => self.begin(txn, TxnKind::ReadWrite),
            Command::BeginRo { txn } => self.begin(txn, TxnKind::ReadOnly),
            Command::Read { txn, var } => self.read(txn, var),
            Command::Write { txn, var, value } => self.write(txn, var, value),
            Command::End { txn } => self.end(txn),
            Command::Fail { site } => self.fail(site),
            Command::Recover { site } => self.recover(site),
            Command::Dump { sites } => {
                self.dump(&sites);
                Ok(())
            }
        }
    }

    pub fn begin(&mut self, txn_id: TxnId, kind: TxnKind) -> Result<(), SessionError> {
        if self.transactions.contains_key(&txn_id) {
            return Err(SessionError::DuplicateTransaction(txn_id));
        }
        let start_ts = self.clock.tick();
        info!(%txn_id, ?kind, ts = start_ts.as_u64(), "transaction starts");
        println!("Start {}", txn_id);
        self.transactions
            .insert(txn_id, Transaction::new(txn_id, kind, start_ts));
        self.txn_sites.insert(txn_id, HashSet::new());
        self.graph.insert_vertex(txn_id);
        Ok(())
    }

    pub fn read(&mut self, txn_id: TxnId, var: VariableId) -> Result<(), SessionError> {
        self.check_var(var)?;
        let kind = *self
            .transactions
            .get(&txn_id)
            .ok_or(SessionError::UnknownTransaction(txn_id))?
            .kind();

        let op_id = self.fresh_op_id();
        self.ops.insert(op_id, Operation::read(op_id, txn_id, var));
        if let Some(txn) = self.transactions.get_mut(&txn_id) {
            txn.add_op(op_id);
        }

        let executed = match kind {
            // snapshot read: any serving replica, no locks
            TxnKind::ReadOnly => self.execute_snapshot_read(op_id),
            TxnKind::ReadWrite => {
                if self.acquire_locks(op_id, false) && self.has_locked_sites(op_id) {
                    match self.execute_read_at_locked(op_id) {
                        Some(serving) => {
                            self.record_site_access(txn_id, &[serving]);
                            true
                        }
                        None => false,
                    }
                } else {
                    false
                }
            }
        };

        if executed {
            self.mark_executed(op_id);
        } else {
            self.enqueue_waiter(op_id);
        }
        Ok(())
    }

    pub fn write(&mut self, txn_id: TxnId, var: VariableId, value: i64) -> Result<(), SessionError> {
        self.check_var(var)?;
        let txn = self
            .transactions
            .get(&txn_id)
            .ok_or(SessionError::UnknownTransaction(txn_id))?;
        if txn.is_read_only() {
            return Err(SessionError::ReadOnlyWrite(txn_id));
        }

        let op_id = self.fresh_op_id();
        self.ops
            .insert(op_id, Operation::write(op_id, txn_id, var, value));
        if let Some(txn) = self.transactions.get_mut(&txn_id) {
            txn.add_op(op_id);
        }

        let mut executed = false;
        if self.acquire_locks(op_id, false) && self.has_locked_sites(op_id) {
            if self.execute_write_at_locked(op_id) {
                let locked = self.locked_sites(op_id);
                self.record_site_access(txn_id, &locked);
                executed = true;
            }
        }

        if executed {
            self.mark_executed(op_id);
        } else {
            self.enqueue_waiter(op_id);
        }
        Ok(())
    }

    /// Commit or abort `txn_id`, release everything it held, and let waiters
    /// at the touched variables try again.
    pub fn end(&mut self, txn_id: TxnId) -> Result<(), SessionError> {
        if !self.transactions.contains_key(&txn_id) {
            return Err(SessionError::UnknownTransaction(txn_id));
        }

        let mut abort_reason = *self.transactions[&txn_id].abort_reason();
        if abort_reason.is_none() {
            let waiting = {
                let ops = &self.ops;
                self.wait_list
                    .iter()
                    .any(|id| ops.get(id).map(|op| *op.txn() == txn_id).unwrap_or(false))
            };
            if waiting {
                abort_reason = Some(AbortReason::LocksUnavailable);
            }
        }

        if abort_reason.is_none() {
            abort_reason = self.commit_all(txn_id);
        }

        match abort_reason {
            None => {
                self.print_commit_summary(txn_id);
                println!("{} Committed", txn_id);
            }
            Some(reason) => {
                self.undo_executed_writes(txn_id);
                let ops = &self.ops;
                self.wait_list
                    .retain(|id| ops.get(id).map(|op| *op.txn() != txn_id).unwrap_or(false));
                println!("{} Aborted because {}", txn_id, reason);
            }
        }

        // release locks at the sites each operation recorded, then re-examine
        // every variable this transaction touched
        let touched = self.release_locks_at_recorded_sites(txn_id);
        self.forget_txn(txn_id);
        for var in touched {
            self.exec_waitlist(var);
        }
        Ok(())
    }

    /// Crash a site. Every transaction that operated on it is doomed; its
    /// lock queues vanish with it.
    pub fn fail(&mut self, site_id: SiteId) -> Result<(), SessionError> {
        if !self.sites.contains_key(&site_id) {
            return Err(SessionError::UnknownSite(site_id));
        }
        let doomed: Vec<TxnId> = self
            .txn_sites
            .iter()
            .filter(|(_, accessed)| accessed.contains(&site_id))
            .map(|(txn_id, _)| *txn_id)
            .collect();
        for txn_id in doomed {
            debug!(%txn_id, %site_id, "doomed by site failure");
            let op_ids = match self.transactions.get_mut(&txn_id) {
                Some(txn) => {
                    txn.mark_failed_site(site_id);
                    txn.ops().clone()
                }
                None => continue,
            };
            for op_id in op_ids {
                if let Some(op) = self.ops.get_mut(&op_id) {
                    op.forget_locked_site(site_id);
                }
            }
        }
        if let Some(site) = self.sites.get_mut(&site_id) {
            site.fail();
        }
        println!("Site {} failed.", site_id);
        Ok(())
    }

    /// Bring a failed site back. Its odd variables become readable again, so
    /// their waiters get another chance; even replicas stay blocked for reads
    /// until a committed write refreshes them.
    pub fn recover(&mut self, site_id: SiteId) -> Result<(), SessionError> {
        let site = self
            .sites
            .get_mut(&site_id)
            .ok_or(SessionError::UnknownSite(site_id))?;
        if site.is_available() {
            println!("Site does not fail.");
            return Ok(());
        }
        site.recover();
        println!("Site {} recovered.", site_id);
        for var in placement::odd_variables_homed_at(&self.config, site_id) {
            self.exec_waitlist(var);
        }
        Ok(())
    }

    /// Print the last committed values at the selected sites (all of them when
    /// the selection is empty), ascending by site and variable id.
    pub fn dump(&self, selected: &[SiteId]) {
        if selected.is_empty() {
            for site in self.sites.values() {
                site.dump(true);
            }
            return;
        }
        let mut ids = selected.to_vec();
        ids.sort();
        ids.dedup();
        for id in ids {
            match self.sites.get(&id) {
                Some(site) => site.dump(true),
                None => warn!(site = %id, "dump skipped unknown site"),
            }
        }
    }

    // ---- lock acquisition ------------------------------------------------

    /// Try to lock `op`'s variable at every hosting replica.
    ///
    /// Refusing replicas (failed, unhosted, recovered-blocked) are simply not
    /// used. An `Upgradable` answer is forced through unless another
    /// transaction is already waiting on the variable; upgrading past a
    /// waiter would starve it. Any `Conflict` abandons the attempt and rolls
    /// back the locks it just took.
    fn acquire_locks(&mut self, op_id: OpId, from_waitlist: bool) -> bool {
        let (txn_id, var, kind) = match self.ops.get(&op_id) {
            Some(op) => (*op.txn(), *op.var(), lock_kind_of(op)),
            None => return false,
        };
        let lock = Lock::new(txn_id, var, kind);
        let contested = !from_waitlist && self.has_other_waiter(var, txn_id);

        let mut recorded: Vec<SiteId> = Vec::new();
        let mut granted = true;
        for site_id in placement::sites_hosting(&self.config, var) {
            let Some(site) = self.sites.get_mut(&site_id) else {
                continue;
            };
            match site.apply_lock(lock, false) {
                LockReply::Granted => recorded.push(site_id),
                LockReply::Upgradable => {
                    if contested {
                        trace!(%lock, site = %site_id, "upgrade denied: another waiter is queued");
                        granted = false;
                    } else if site.apply_lock(lock, true) == LockReply::Granted {
                        recorded.push(site_id);
                    }
                }
                LockReply::Conflict => granted = false,
                LockReply::SiteFailed
                | LockReply::NoSuchVariable
                | LockReply::RecoveredReplicaBlocked => {}
            }
            if !granted {
                break;
            }
        }

        if !granted {
            for site_id in &recorded {
                if let Some(site) = self.sites.get_mut(site_id) {
                    site.release_lock(&lock);
                }
            }
            if let Some(op) = self.ops.get_mut(&op_id) {
                op.clear_locked_sites();
            }
            return false;
        }

        if let Some(op) = self.ops.get_mut(&op_id) {
            for site_id in recorded {
                op.record_locked_site(site_id);
            }
        }
        true
    }

    fn has_other_waiter(&self, var: VariableId, txn_id: TxnId) -> bool {
        self.wait_list.iter().any(|id| {
            self.ops
                .get(id)
                .map(|w| *w.var() == var && *w.txn() != txn_id)
                .unwrap_or(false)
        })
    }

    // ---- wait list -------------------------------------------------------

    /// Park `op` on the wait list, record who it waits for, and resolve any
    /// deadlock the new edge closed.
    fn enqueue_waiter(&mut self, op_id: OpId) {
        debug!(op = %self.ops[&op_id], "parked on the wait list");
        self.wait_list.push(op_id);
        self.link_waiter(op_id);
        self.resolve_deadlocks();
    }

    /// New waiters wait for the most recent earlier waiter on the same
    /// variable; with no such waiter they wait for every current lock holder.
    fn link_waiter(&mut self, op_id: OpId) {
        let (txn_id, var) = match self.ops.get(&op_id) {
            Some(op) => (*op.txn(), *op.var()),
            None => return,
        };
        let prior = self.wait_list.iter().rev().find_map(|id| {
            self.ops
                .get(id)
                .filter(|w| *w.var() == var && *w.txn() != txn_id)
                .map(|w| *w.txn())
        });
        match prior {
            Some(prior_txn) => self.graph.add_edge(txn_id, prior_txn),
            None => {
                for site_id in placement::sites_hosting(&self.config, var) {
                    let Some(site) = self.sites.get(&site_id) else {
                        continue;
                    };
                    if !site.is_available() {
                        continue;
                    }
                    for held in site.lock_holders(var) {
                        if held.txn != txn_id {
                            self.graph.add_edge(txn_id, held.txn);
                        }
                    }
                }
            }
        }
    }

    /// Abort youngest cycle members until the graph is acyclic again.
    fn resolve_deadlocks(&mut self) {
        loop {
            let cycle = self.graph.detect_cycle();
            if cycle.len() < 2 {
                break;
            }
            let victim = cycle
                .iter()
                .copied()
                .max_by_key(|id| {
                    self.transactions
                        .get(id)
                        .map(|txn| *txn.start_ts())
                        .unwrap_or(Timestamp::ORIGIN)
                })
                .expect("a cycle has members");
            info!(%victim, ?cycle, "deadlock: aborting the youngest");
            self.abort_victim(victim);
        }
    }

    /// Give the released lock on `var` to the first waiter that can use it,
    /// and keep going while compatible waiters line up behind it.
    fn exec_waitlist(&mut self, var: VariableId) {
        loop {
            let Some(pos) = self.wait_list.iter().position(|id| {
                self.ops
                    .get(id)
                    .map(|op| *op.var() == var)
                    .unwrap_or(false)
            }) else {
                break;
            };
            let op_id = self.wait_list[pos];
            let (txn_id, op_kind) = match self.ops.get(&op_id) {
                Some(op) => (*op.txn(), *op.kind()),
                None => break,
            };
            let Some(txn) = self.transactions.get(&txn_id) else {
                break;
            };

            if txn.is_read_only() {
                // the freed lock goes unused by a snapshot read, so the next
                // waiter still gets its chance
                if self.execute_snapshot_read(op_id) {
                    self.mark_executed(op_id);
                }
                self.wait_list.remove(pos);
                continue;
            }

            if !self.acquire_locks(op_id, true) || !self.has_locked_sites(op_id) {
                break;
            }

            let executed = match op_kind {
                OpKind::Read => self.execute_read_at_locked(op_id).is_some(),
                OpKind::Write => self.execute_write_at_locked(op_id),
            };
            if !executed {
                break;
            }

            debug!(op = %self.ops[&op_id], "resumed from the wait list");
            let locked = self.locked_sites(op_id);
            self.record_site_access(txn_id, &locked);
            self.mark_executed(op_id);
            self.wait_list.remove(pos);

            if op_kind == OpKind::Write {
                break;
            }
            // a granted read lets a following read, or more work of the same
            // transaction, through as well
            let continue_scan = self
                .wait_list
                .iter()
                .find_map(|id| self.ops.get(id).filter(|w| *w.var() == var))
                .map(|w| *w.kind() == OpKind::Read || *w.txn() == txn_id)
                .unwrap_or(false);
            if !continue_scan {
                break;
            }
        }
    }

    // ---- abort paths -----------------------------------------------------

    /// Deadlock-victim abort: drop its waiting ops, undo its writes, release
    /// everything it held, then hand the freed variables to the wait list.
    fn abort_victim(&mut self, txn_id: TxnId) {
        if let Some(txn) = self.transactions.get_mut(&txn_id) {
            txn.mark_aborted(AbortReason::Deadlock);
        }
        {
            let ops = &self.ops;
            self.wait_list
                .retain(|id| ops.get(id).map(|op| *op.txn() != txn_id).unwrap_or(false));
        }
        self.undo_executed_writes(txn_id);

        // release at every hosting site; the failed ones answer SiteFailed and
        // the rest tell us which variables actually freed up
        let mut released: BTreeSet<VariableId> = BTreeSet::new();
        let op_ids = self
            .transactions
            .get(&txn_id)
            .map(|txn| txn.ops().clone())
            .unwrap_or_default();
        for op_id in &op_ids {
            let (var, kind) = match self.ops.get(op_id) {
                Some(op) => (*op.var(), lock_kind_of(op)),
                None => continue,
            };
            let lock = Lock::new(txn_id, var, kind);
            for site_id in placement::sites_hosting(&self.config, var) {
                if let Some(site) = self.sites.get_mut(&site_id) {
                    if site.release_lock(&lock) == ReleaseReply::Released {
                        released.insert(var);
                    }
                }
            }
        }

        self.forget_txn(txn_id);
        println!("{} Aborted because {}", txn_id, AbortReason::Deadlock);
        for var in released {
            self.exec_waitlist(var);
        }
    }

    fn undo_executed_writes(&mut self, txn_id: TxnId) {
        let op_ids = self
            .transactions
            .get(&txn_id)
            .map(|txn| txn.ops().clone())
            .unwrap_or_default();
        for op_id in &op_ids {
            let (undoable, locked) = match self.ops.get(op_id) {
                Some(op) => (op.is_write() && op.is_executed(), op.locked_sites().clone()),
                None => continue,
            };
            if !undoable {
                continue;
            }
            for site_id in locked {
                let Some(op) = self.ops.get(op_id) else { break };
                if let Some(site) = self.sites.get_mut(&site_id) {
                    site.undo(op);
                }
            }
        }
    }

    // ---- commit ----------------------------------------------------------

    /// Commit every operation at the sites it recorded. All writes of the
    /// transaction land at one timestamp, the commit point.
    fn commit_all(&mut self, txn_id: TxnId) -> Option<AbortReason> {
        let commit_ts = self.clock.tick();
        let op_ids = self
            .transactions
            .get(&txn_id)
            .map(|txn| txn.ops().clone())
            .unwrap_or_default();
        for op_id in &op_ids {
            let locked = match self.ops.get(op_id) {
                Some(op) => op.locked_sites().clone(),
                None => continue,
            };
            for site_id in locked {
                let (Some(op), Some(txn)) = (self.ops.get(op_id), self.transactions.get(&txn_id))
                else {
                    continue;
                };
                let Some(site) = self.sites.get_mut(&site_id) else {
                    continue;
                };
                if !site.commit(op, txn, commit_ts) {
                    warn!(%txn_id, site = %site_id, "commit refused; aborting");
                    return Some(AbortReason::SiteFailed(site_id));
                }
            }
        }
        None
    }

    fn print_commit_summary(&self, txn_id: TxnId) {
        let Some(txn) = self.transactions.get(&txn_id) else {
            return;
        };
        for op_id in txn.ops() {
            let Some(op) = self.ops.get(op_id) else {
                continue;
            };
            if !op.is_write() || !op.is_executed() {
                continue;
            }
            if let Some(value) = op.value() {
                let sites = op
                    .locked_sites()
                    .iter()
                    .map(|site| site.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "{} wrote {} to variable {} to sites [{}].",
                    txn_id,
                    value,
                    op.var().as_u32(),
                    sites
                );
            }
        }
    }

    /// Release each operation's lock at the sites it recorded; returns the
    /// variables whose queues may now have room.
    fn release_locks_at_recorded_sites(&mut self, txn_id: TxnId) -> BTreeSet<VariableId> {
        let mut touched = BTreeSet::new();
        let op_ids = self
            .transactions
            .get(&txn_id)
            .map(|txn| txn.ops().clone())
            .unwrap_or_default();
        for op_id in &op_ids {
            let (var, kind, locked) = match self.ops.get(op_id) {
                Some(op) => (*op.var(), lock_kind_of(op), op.locked_sites().clone()),
                None => continue,
            };
            let lock = Lock::new(txn_id, var, kind);
            for site_id in locked {
                if let Some(site) = self.sites.get_mut(&site_id) {
                    site.release_lock(&lock);
                }
            }
            touched.insert(var);
        }
        touched
    }

    /// Drop the transaction record, its operations, its site-access set, and
    /// its graph vertex (edges go with it).
    fn forget_txn(&mut self, txn_id: TxnId) {
        if let Some(txn) = self.transactions.remove(&txn_id) {
            for op_id in txn.ops() {
                self.ops.remove(op_id);
            }
        }
        self.txn_sites.remove(&txn_id);
        self.graph.remove_vertex(txn_id);
    }

    // ---- execution helpers ----------------------------------------------

    /// Snapshot read at the first hosting replica that serves it.
    fn execute_snapshot_read(&mut self, op_id: OpId) -> bool {
        let var = match self.ops.get(&op_id) {
            Some(op) => *op.var(),
            None => return false,
        };
        for site_id in placement::sites_hosting(&self.config, var) {
            let Some(op) = self.ops.get(&op_id) else {
                return false;
            };
            let Some(txn) = self.transactions.get(op.txn()) else {
                return false;
            };
            if let Some(site) = self.sites.get_mut(&site_id) {
                if site.execute(op, txn) {
                    return true;
                }
            }
        }
        false
    }

    /// Read at the first locked replica that serves it.
    fn execute_read_at_locked(&mut self, op_id: OpId) -> Option<SiteId> {
        for site_id in self.locked_sites(op_id) {
            let Some(op) = self.ops.get(&op_id) else {
                return None;
            };
            let Some(txn) = self.transactions.get(op.txn()) else {
                return None;
            };
            if let Some(site) = self.sites.get_mut(&site_id) {
                if site.execute(op, txn) {
                    return Some(site_id);
                }
            }
        }
        None
    }

    /// A write must land on every replica it locked.
    fn execute_write_at_locked(&mut self, op_id: OpId) -> bool {
        let locked = self.locked_sites(op_id);
        if locked.is_empty() {
            return false;
        }
        for site_id in locked {
            let Some(op) = self.ops.get(&op_id) else {
                return false;
            };
            let Some(txn) = self.transactions.get(op.txn()) else {
                return false;
            };
            let Some(site) = self.sites.get_mut(&site_id) else {
                return false;
            };
            if !site.execute(op, txn) {
                return false;
            }
        }
        true
    }

    // ---- small accessors -------------------------------------------------

    /// (site, status) pairs for surfaces that render topology state.
    pub fn site_overview(&self) -> Vec<(SiteId, storage::SiteStatus)> {
        self.sites
            .iter()
            .map(|(id, site)| (*id, site.status()))
            .collect()
    }

    fn fresh_op_id(&mut self) -> OpId {
        self.next_op_id += 1;
        OpId::new(self.next_op_id)
    }

    fn check_var(&self, var: VariableId) -> Result<(), SessionError> {
        if var.as_u32() == 0 || var.as_u32() > self.config.num_variables {
            return Err(SessionError::UnknownVariable(var));
        }
        Ok(())
    }

    fn has_locked_sites(&self, op_id: OpId) -> bool {
        self.ops
            .get(&op_id)
            .map(|op| !op.locked_sites().is_empty())
            .unwrap_or(false)
    }

    fn locked_sites(&self, op_id: OpId) -> Vec<SiteId> {
        self.ops
            .get(&op_id)
            .map(|op| op.locked_sites().clone())
            .unwrap_or_default()
    }

    fn record_site_access(&mut self, txn_id: TxnId, sites: &[SiteId]) {
        if let Some(accessed) = self.txn_sites.get_mut(&txn_id) {
            accessed.extend(sites.iter().copied());
        }
    }

    fn mark_executed(&mut self, op_id: OpId) {
        if let Some(op) = self.ops.get_mut(&op_id) {
            op.mark_executed();
        }
    }

    #[cfg(test)]
    fn site(&self, id: u32) -> &Site {
        &self.sites[&SiteId::new(id)]
    }

    #[cfg(test)]
    fn committed_at(&self, site: u32, var: u32) -> i64 {
        self.site(site)
            .variables()
            .get(&VariableId::new(var))
            .expect("variable hosted at site")
            .latest_committed()
    }
}

fn lock_kind_of(op: &Operation) -> LockKind {
    match op.kind() {
        OpKind::Read => LockKind::Read,
        OpKind::Write => LockKind::Write,
    }
}


#[cfg(test)]
mod invariants {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn assert_quiescent_invariants(tm: &TransactionManager) {
        // failed sites hold no locks and every variable reads free
        for site in tm.sites.values() {
            if !site.is_available() {
                assert!(site.lock_table().values().all(Vec::is_empty));
                assert!(site
                    .variables()
                    .values()
                    .all(|v| v.lock_state() == storage::LockState::Free));
            }
        }
        // waiting ⇔ not executed
        for op in tm.ops.values() {
            let waiting = tm.wait_list.contains(op.id());
            assert_eq!(waiting, !op.is_executed(), "op {} waiting={}", op, waiting);
        }
        // no deadlock survives a command
        assert!(tm.graph.detect_cycle().len() < 2);
    }

    #[test]
    fn random_command_soup_preserves_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut tm = TransactionManager::new(SystemConfig::default());
        let mut next_txn = 0u32;
        let mut live: Vec<TxnId> = Vec::new();

        for _ in 0..400 {
            match rng.gen_range(0..10) {
                0 | 1 => {
                    next_txn += 1;
                    let id = TxnId::new(next_txn);
                    let kind = if rng.gen_bool(0.2) {
                        TxnKind::ReadOnly
                    } else {
                        TxnKind::ReadWrite
                    };
                    tm.begin(id, kind).unwrap();
                    live.push(id);
                }
                2 | 3 | 4 => {
                    if !live.is_empty() {
                        let txn = live[rng.gen_range(0..live.len())];
                        let var = VariableId::new(rng.gen_range(1..=20));
                        let _ = tm.read(txn, var);
                    }
                }
                5 | 6 => {
                    if !live.is_empty() {
                        let txn = live[rng.gen_range(0..live.len())];
                        let var = VariableId::new(rng.gen_range(1..=20));
                        let _ = tm.write(txn, var, rng.gen_range(-100..100));
                    }
                }
                7 => {
                    if !live.is_empty() {
                        let idx = rng.gen_range(0..live.len());
                        let txn = live.swap_remove(idx);
                        let _ = tm.end(txn);
                    }
                }
                8 => {
                    let _ = tm.fail(SiteId::new(rng.gen_range(1..=10)));
                }
                _ => {
                    let _ = tm.recover(SiteId::new(rng.gen_range(1..=10)));
                }
            }
            // deadlock resolution or site failure may have retired transactions
            live.retain(|txn| tm.transactions.contains_key(txn));
            assert_quiescent_invariants(&tm);
        }
    }
}
