//! # warden
//!
//! Process supervision engine.
//!
//! Spawn named services, watch them exit, restart them according to a
//! [`RestartPolicy`], and tell interested parties about it through the
//! [`Dispatcher`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use warden::{RestartPolicy, ServiceDefinition, Supervisor, SupervisorConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sup = Supervisor::new(SupervisorConfig {
//!     log_dir: "/tmp/myapp/logs".into(),
//!     max_log_size: 10 * 1024 * 1024,
//!     stop_timeout: Duration::from_secs(5),
//! });
//!
//! let def = ServiceDefinition {
//!     name: "web".into(),
//!     command: vec!["/usr/bin/python3".into(), "-m".into(), "http.server".into()],
//!     working_dir: None,
//!     env: vec!["PYTHONUNBUFFERED=1".into()],
//!     policy: RestartPolicy { max_retries: 3, delay: Duration::from_secs(1), restart_on_zero: false },
//! };
//!
//! let pid = sup.start(&def).await.unwrap();
//! println!("web running as {}", pid);
//! sup.stop("web").await.unwrap();
//! # }
//! ```

pub mod error;
pub mod events;
pub mod logs;
pub mod output;
pub mod registry;
pub mod supervisor;
pub mod types;

pub use error::{Error, Result};
pub use events::{Dispatcher, Event, EventHandler, EventKind, EventLog};
pub use output::OutputCapture;
pub use registry::Registry;
pub use supervisor::{Supervisor, SupervisorConfig};
pub use types::*;
