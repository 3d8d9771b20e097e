//! SSH Module
//!
//! Connection target resolution and ssh client command lines.
//! The SSH protocol itself is left to the system `ssh` client.

mod command;
mod error;
mod probe;
mod resolver;
mod target;

pub use command::{probe_args, ssh_args, ssh_command_line};
pub use error::ResolveError;
pub use probe::{ConnectionProbe, SshProbe};
pub use resolver::{find_route, resolve};
pub use target::{HostKeyPolicy, ProxyJump, SshTarget};
