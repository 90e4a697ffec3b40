//! Utilities applied to a finished working tree.
//!
//! ## Components
//!
//! - **Compression**: gzip-compressed tar archive of the working tree
//! - **Summary**: JSON report of the run, stored inside the archive
//!
//! ### Creating an Archive
//!
//! ```no_run
//! use logs_collector::utils::compress::{create_archive, resolve_archive_path};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let now = chrono::Local::now();
//! let archive_path = resolve_archive_path("diag", &now, None);
//! create_archive(Path::new("/tmp/diag-tree"), "diag-logs", &archive_path)?;
//! println!("Created archive: {}", archive_path.display());
//! # Ok(())
//! # }
//! ```

/// Collection summary generation and reporting
pub mod summary;

/// tar.gz archive creation
pub mod compress;
