#![allow(dead_code)]

pub mod manager;
pub mod shell;

pub use manager::{SessionError, TransactionManager};

use common::SystemConfig;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle to the manager, for surfaces that outlive a single command
/// (the interactive shell). The command stream is serial, so the mutex is
/// never contended.
pub type ManagerRef = Arc<Mutex<TransactionManager>>;

pub fn shared_manager(config: SystemConfig) -> ManagerRef {
    Arc::new(Mutex::new(TransactionManager::new(config)))
}
