//! Routing of MAPI objects between the metadata store of system folders and
//! the pluggable backends serving mailbox content.

pub mod backend;
pub mod cli;
pub mod config;
pub mod logging;
pub mod mapi;
pub mod metadata;
pub mod object;
pub mod provision;
pub mod session;
pub mod table;

mod mutator;
mod resolver;
mod router;

pub use mutator::CommitOutcome;
pub use session::Identity;
pub use session::Session;
