#![allow(dead_code)]

pub mod graph;
pub mod operation;
pub mod transaction;

pub use graph::WaitForGraph;
pub use operation::{OpKind, Operation};
pub use transaction::{AbortReason, Transaction, TxnKind};
