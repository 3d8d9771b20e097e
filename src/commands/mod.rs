//! Commands module
//!
//! Operations exposed to the CLI (and any other front end). Each returns
//! plain serializable data; presentation is left to the caller.

pub mod config;
pub mod inventory;
pub mod session;

pub use config::*;
pub use inventory::*;
pub use session::*;
