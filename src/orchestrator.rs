//! Drives one collection run: working tree, items, summary, archive.

use std::fs;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use futures::future::FutureExt;
use log::{debug, error, info, warn};

use crate::collectors::snapshot::current_hostname;
use crate::collectors::{CollectContext, Collectable, Item};
use crate::constants::{FILES_DIR, STRFTIME_LONG, SUMMARY_FILENAME, TERMINATION_GRACE_MS};
use crate::error::{CollectError, CollectResult};
use crate::isolation::IsolatedExecutor;
use crate::logging::LogSink;
use crate::models::{CollectionReport, ItemReport, ItemStatus, TimeWindow};
use crate::utils::compress::{create_archive, resolve_archive_path};
use crate::utils::summary::create_collection_summary;

/// Runs item lists and packs the results.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    executor: IsolatedExecutor,
    log_sink: Option<LogSink>,
}

impl Orchestrator {
    pub fn new(executor: IsolatedExecutor) -> Self {
        Orchestrator { executor, log_sink: None }
    }

    /// Hand workers the derived sink and ship both logs in the archive.
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.executor = self.executor.with_log_sink(&sink);
        self.log_sink = Some(sink);
        self
    }

    pub fn executor(&self) -> &IsolatedExecutor {
        &self.executor
    }

    /// Blocking wrapper around [`Orchestrator::run_async`].
    pub fn run(
        &self,
        label: &str,
        items: &[Item],
        window: &TimeWindow,
        output_override: Option<&Path>,
    ) -> CollectResult<(CollectionReport, PathBuf)> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let result = runtime.block_on(self.run_async(label, items, window, output_override));
        // Stuck in-process tasks must not keep the caller waiting
        runtime.shutdown_timeout(Duration::from_millis(TERMINATION_GRACE_MS));
        result
    }

    /// Collect `items` one after another, then archive the working tree.
    ///
    /// Item failures are recorded in the returned report. Only a working
    /// tree that cannot be created or an archive that cannot be written
    /// fail the run.
    pub async fn run_async(
        &self,
        label: &str,
        items: &[Item],
        window: &TimeWindow,
        output_override: Option<&Path>,
    ) -> CollectResult<(CollectionReport, PathBuf)> {
        let started = Local::now();
        let tree_name = format!("{}-logs.{}", label, started.format(STRFTIME_LONG));

        let working_dir = tempfile::Builder::new()
            .prefix(&format!("{}-", label))
            .tempdir()
            .map_err(CollectError::WorkingTree)?;
        let target_dir = working_dir.path().join(&tree_name);
        fs::create_dir_all(target_dir.join(FILES_DIR)).map_err(CollectError::WorkingTree)?;

        info!(
            "Collecting {} items modified after {} into {}",
            items.len(),
            window.start(),
            target_dir.display()
        );

        let mut report = CollectionReport::new(label, &current_hostname(), started, window);
        let ctx = CollectContext {
            target_dir: &target_dir,
            window,
            executor: &self.executor,
        };
        for item in items {
            report.items.push(collect_item(item, &ctx).await);
        }

        write_summary(&report, &target_dir);
        self.copy_logs(&target_dir);

        let archive_path = resolve_archive_path(label, &started, output_override);
        create_archive(&target_dir, &tree_name, &archive_path)?;

        info!(
            "Collected {}/{} items into {}",
            report.succeeded(),
            report.items.len(),
            archive_path.display()
        );
        Ok((report, archive_path))
    }

    fn copy_logs(&self, target_dir: &Path) {
        let sink = match &self.log_sink {
            Some(sink) => sink,
            None => return,
        };
        for log_file in [sink.clone(), sink.for_worker()] {
            let source = log_file.path();
            if !source.is_file() {
                continue;
            }
            let name = match source.file_name() {
                Some(name) => name,
                None => continue,
            };
            match fs::copy(source, target_dir.join(name)) {
                Ok(_) => debug!("Copied {} into the working tree", source.display()),
                Err(e) => warn!("Failed to copy log {}: {}", source.display(), e),
            }
        }
    }
}

/// Collect one item, turning every failure (panics included) into a report entry.
pub async fn collect_item<C: Collectable + ?Sized>(item: &C, ctx: &CollectContext<'_>) -> ItemReport {
    let description = item.to_string();
    info!("Collecting {}", description);
    let start = Instant::now();

    let outcome = AssertUnwindSafe(item.collect(ctx)).catch_unwind().await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let (error, timed_out) = match outcome {
        Ok(Ok(())) => {
            debug!("Collected {} in {} ms", description, elapsed_ms);
            return ItemReport {
                item: description,
                status: ItemStatus::Collected,
                error: None,
                timed_out: false,
                elapsed_ms,
            };
        }
        Ok(Err(e)) => (e.to_string(), e.is_timeout()),
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            (format!("panicked: {}", panic_msg), false)
        }
    };

    error!("Failed to collect {}: {}", description, error);
    ItemReport {
        item: description,
        status: ItemStatus::Failed,
        error: Some(error),
        timed_out,
        elapsed_ms,
    }
}

fn write_summary(report: &CollectionReport, target_dir: &Path) {
    let written = create_collection_summary(report)
        .and_then(|summary| Ok(fs::write(target_dir.join(SUMMARY_FILENAME), summary)?));
    if let Err(e) = written {
        warn!("Failed to write collection summary: {:#}", e);
    }
}
