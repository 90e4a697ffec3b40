use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::collectors::collector::{CollectContext, Collectable};
use crate::constants::{DEFAULT_DIRECTORY_TIMEOUT_SECS, FILES_DIR};
use crate::error::{CollectError, CollectResult};
use crate::isolation::WorkerTask;

fn default_pattern() -> String {
    ".*".to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_DIRECTORY_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

/// Copies matching files out of a directory tree, mirroring their paths
/// under `files/`.
///
/// The walk runs inside an isolated worker with `timeout_in_seconds` as
/// its deadline, so a hung filesystem cannot hang the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub dirname: PathBuf,
    /// Matched against each basename from its first character
    #[serde(default = "default_pattern")]
    pub regex_basename: String,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default = "default_timeout")]
    pub timeout_in_seconds: u64,
    /// Only collect regular files modified inside the time window
    #[serde(default = "default_true")]
    pub timeframe_only: bool,
}

impl Directory {
    pub fn new(dirname: impl Into<PathBuf>, regex_basename: &str) -> Self {
        Directory {
            dirname: dirname.into(),
            regex_basename: regex_basename.to_string(),
            recursive: false,
            timeout_in_seconds: DEFAULT_DIRECTORY_TIMEOUT_SECS,
            timeframe_only: true,
        }
    }

    /// A single file, collected regardless of its age.
    pub fn file(filepath: impl AsRef<Path>) -> Self {
        let filepath = filepath.as_ref();
        let dirname = filepath.parent().map(Path::to_path_buf).unwrap_or_default();
        let basename = filepath
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        Directory {
            dirname,
            regex_basename: format!("{}$", regex::escape(&basename)),
            recursive: false,
            timeout_in_seconds: DEFAULT_DIRECTORY_TIMEOUT_SECS,
            timeframe_only: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn timeframe_only(mut self, timeframe_only: bool) -> Self {
        self.timeframe_only = timeframe_only;
        self
    }

    pub fn timeout_in_seconds(mut self, seconds: u64) -> Self {
        self.timeout_in_seconds = seconds;
        self
    }

    /// The worker job for collecting into `target_root`.
    pub fn job(&self, target_root: &Path, not_before: SystemTime) -> DirectoryJob {
        DirectoryJob {
            dirname: self.dirname.clone(),
            regex_basename: self.regex_basename.clone(),
            recursive: self.recursive,
            timeframe_only: self.timeframe_only,
            not_before,
            target_dir: target_root.join(FILES_DIR),
        }
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "files {:?} from {}", self.regex_basename, self.dirname.display())
    }
}

#[async_trait]
impl Collectable for Directory {
    async fn collect(&self, ctx: &CollectContext<'_>) -> CollectResult<()> {
        let task = WorkerTask::CollectDirectory(self.job(ctx.target_dir, ctx.window.start_system_time()));
        ctx.executor
            .run(&task, &self.to_string(), Duration::from_secs(self.timeout_in_seconds))
            .await
    }
}

/// Everything a worker needs to collect one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryJob {
    pub dirname: PathBuf,
    pub regex_basename: String,
    pub recursive: bool,
    pub timeframe_only: bool,
    /// Files must be modified strictly after this instant
    pub not_before: SystemTime,
    /// Root under which source paths are mirrored
    pub target_dir: PathBuf,
}

/// Counters for one directory job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Path relative to the filesystem root, with any drive or volume prefix
/// removed (`C:\Windows\Logs` -> `Windows\Logs`, `/var/log` -> `var/log`).
pub fn strip_os_prefix(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::Prefix(_) | Component::RootDir))
        .collect()
}

/// Walk `job.dirname` and copy every surviving file into the mirrored tree.
///
/// Copy failures are logged and counted; they never abort the walk.
pub fn collect_files(job: &DirectoryJob) -> CollectResult<DirectoryStats> {
    debug!("Collection of {} started", job.dirname.display());
    let pattern = Regex::new(&format!("^(?:{})", job.regex_basename))?;
    let mut stats = DirectoryStats::default();

    for entry in WalkDir::new(&job.dirname).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        // Subdirectories are still walked, just not collected from
        if entry.depth() > 0 && !job.recursive {
            continue;
        }

        let dirpath = entry.path();
        let dst_directory = job.target_dir.join(strip_os_prefix(dirpath));
        fs::create_dir_all(&dst_directory)?;

        let filenames = list_filenames(dirpath);
        let filenames = filter_matching_filenames(filenames, &pattern);
        let filenames = if job.timeframe_only {
            filter_old_files(dirpath, filenames, job.not_before, &mut stats)
        } else {
            filenames
        };

        debug!("Collecting {:?} from {}", filenames, dirpath.display());
        for filename in filenames {
            match collect_logfile(dirpath, &filename, &dst_directory) {
                Ok(()) => stats.copied += 1,
                Err(e) => {
                    warn!("{}", e);
                    stats.failed += 1;
                }
            }
        }
    }

    debug!("Collection of {} ended: {:?}", job.dirname.display(), stats);
    Ok(stats)
}

/// Names of the non-directory entries of `dirpath`
fn list_filenames(dirpath: &Path) -> Vec<String> {
    let entries = match fs::read_dir(dirpath) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Failed to list {}: {}", dirpath.display(), e);
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

pub fn filter_matching_filenames(filenames: Vec<String>, pattern: &Regex) -> Vec<String> {
    filenames.into_iter().filter(|name| pattern.is_match(name)).collect()
}

fn filter_old_files(
    dirpath: &Path,
    filenames: Vec<String>,
    not_before: SystemTime,
    stats: &mut DirectoryStats,
) -> Vec<String> {
    filenames
        .into_iter()
        .filter(|name| {
            let recent = was_modified_recently(&dirpath.join(name), not_before);
            if !recent {
                stats.skipped += 1;
            }
            recent
        })
        .collect()
}

/// True for regular files (not symlinks) modified strictly after `not_before`.
pub fn was_modified_recently(filepath: &Path, not_before: SystemTime) -> bool {
    let metadata = match fs::symlink_metadata(filepath) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Failed to stat {}: {}", filepath.display(), e);
            return false;
        }
    };
    if !metadata.file_type().is_file() {
        debug!("{} is not a file, skipping it", filepath.display());
        return false;
    }
    match metadata.modified() {
        Ok(mtime) => mtime > not_before,
        Err(e) => {
            debug!("No modification time for {}: {}", filepath.display(), e);
            false
        }
    }
}

fn collect_logfile(src_directory: &Path, filename: &str, dst_directory: &Path) -> CollectResult<()> {
    let src = src_directory.join(filename);
    let dst = dst_directory.join(filename);
    fs::copy(&src, &dst)
        .map(|_| ())
        .map_err(|source| CollectError::Copy { path: src, source })
}
