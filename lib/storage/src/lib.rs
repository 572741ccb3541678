#![allow(dead_code)]

pub mod lock;
pub mod placement;
pub mod site;
pub mod variable;

pub use lock::{Lock, LockKind, LockReply, LockState, ReleaseReply};
pub use site::{Site, SiteStatus};
pub use variable::Variable;
