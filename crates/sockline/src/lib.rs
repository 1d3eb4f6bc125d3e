//! # sockline
//!
//! Daemon plumbing for CLIs whose control channel is a Unix socket carrying
//! one plain-text request line per connection.
//!
//! - [`DaemonPaths`]: where the socket and PID file live
//! - [`server`]: bind and serve, one handler call per connection
//! - [`client`]: send a line, read the reply to EOF
//! - [`Daemon`]: PID file, cleanup, background start/stop

pub mod paths;
pub mod server;
pub mod client;
pub mod daemon;
#[cfg(feature = "clap")]
pub mod clap;

pub use paths::DaemonPaths;
pub use client::{send_line, ClientError};
pub use daemon::{shutdown_signal, Daemon, DaemonError};
