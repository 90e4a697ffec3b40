//! Collectable items.
//!
//! Each item knows how to gather one kind of diagnostic data into the run's
//! working tree:
//!
//! ```text
//! {label}-logs.{timestamp}/
//! ├── files/            mirrored source paths (directory and file items)
//! │   └── commands/     {prefix}.{timestamp}.{pid}.{returncode|stdout|stderr}.txt
//! ├── event_logs/       {Log}.json (Windows)
//! ├── environment.json
//! └── hostname.json
//! ```
//!
//! Directory collection runs behind the [`IsolatedExecutor`](crate::isolation::IsolatedExecutor)
//! so that a hung filesystem cannot stall the run. Commands are bounded by
//! their own wait time.
//!
//! ## Usage Example
//!
//! ```no_run
//! use logs_collector::collectors::{CollectContext, Collectable, Item};
//! use logs_collector::isolation::IsolatedExecutor;
//! use logs_collector::models::TimeWindow;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let executor = IsolatedExecutor::current_exe()?;
//! let window = TimeWindow::ending_now(chrono::Duration::days(1));
//! let ctx = CollectContext {
//!     target_dir: Path::new("/tmp/collection"),
//!     window: &window,
//!     executor: &executor,
//! };
//!
//! Item::directory("/var/log", "syslog").collect(&ctx).await?;
//! Item::command("uname", &["-a"]).collect(&ctx).await?;
//! # Ok(())
//! # }
//! ```

/// Collectable trait and the item enum
pub mod collector;

/// External commands and inline scripts
pub mod command;

/// Recent files from a directory, copied in an isolated worker
pub mod directory;

/// Windows event log export
pub mod event_log;

/// Environment and hostname snapshots
pub mod snapshot;

pub use collector::{CollectContext, Collectable, FileSpec, Item};
pub use command::{find_executable, Command, Script};
pub use directory::{Directory, DirectoryJob, DirectoryStats};
pub use event_log::EventLog;
pub use snapshot::{Environment, Hostname};
