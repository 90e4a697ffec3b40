use std::env;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use tar::{Builder, Header};
use walkdir::WalkDir;

use crate::constants::{ARCHIVE_SUFFIX, STRFTIME_LONG};
use crate::error::{CollectError, CollectResult};

/// Default archive file name: `{label}-logs.{YYYY-MM-DD.HH-MM-SS}.tar.gz`.
pub fn archive_file_name(label: &str, timestamp: &DateTime<Local>) -> String {
    format!("{}-logs.{}{}", label, timestamp.format(STRFTIME_LONG), ARCHIVE_SUFFIX)
}

/// Decide where the archive goes.
///
/// Without an override the archive is placed in the temp directory. An
/// override naming an existing directory receives the default file name;
/// any other override is used as the exact archive path.
pub fn resolve_archive_path(
    label: &str,
    timestamp: &DateTime<Local>,
    output_override: Option<&Path>,
) -> PathBuf {
    match output_override {
        Some(path) if path.is_dir() => path.join(archive_file_name(label, timestamp)),
        Some(path) => path.to_path_buf(),
        None => env::temp_dir().join(archive_file_name(label, timestamp)),
    }
}

/// Pack `source_dir` into a gzip-compressed tar at `archive_path`.
///
/// Entries are stored under `root_name/`. A file that changes size while
/// being packed is truncated or zero-padded to the size recorded in its
/// header, so a growing log never corrupts the archive.
pub fn create_archive(source_dir: &Path, root_name: &str, archive_path: &Path) -> CollectResult<PathBuf> {
    let start = Instant::now();
    info!("Creating archive {}", archive_path.display());

    write_archive(source_dir, root_name, archive_path).map_err(|source| CollectError::Archive {
        path: archive_path.to_path_buf(),
        source,
    })?;

    info!("Created archive {} in {:?}", archive_path.display(), start.elapsed());
    Ok(archive_path.to_path_buf())
}

fn write_archive(source_dir: &Path, root_name: &str, archive_path: &Path) -> io::Result<()> {
    if let Some(parent) = archive_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let output = BufWriter::new(File::create(archive_path)?);
    let mut builder = Builder::new(GzEncoder::new(output, Compression::default()));
    builder.follow_symlinks(false);

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry.path().strip_prefix(source_dir).unwrap_or(entry.path());
        let name = Path::new(root_name).join(relative);

        if entry.file_type().is_dir() {
            builder.append_dir(&name, entry.path())?;
        } else if entry.file_type().is_file() {
            if let Err(e) = append_file(&mut builder, &name, entry.path()) {
                // Unreadable or vanished files are left out
                warn!("Skipping {} in archive: {}", entry.path().display(), e);
            }
        } else {
            debug!("Skipping special file {}", entry.path().display());
        }
    }

    let encoder = builder.into_inner()?;
    let mut output = encoder.finish()?;
    output.flush()?;
    Ok(())
}

/// Append one file, sized from the open handle.
pub fn append_file<W: Write>(builder: &mut Builder<W>, name: &Path, path: &Path) -> io::Result<()> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;
    let size = metadata.len();
    append_sized(builder, name, &metadata, file, size)
}

/// Append exactly `size` bytes read from `reader`, padding with zeros if
/// the reader runs short.
pub fn append_sized<W: Write, R: Read>(
    builder: &mut Builder<W>,
    name: &Path,
    metadata: &fs::Metadata,
    reader: R,
    size: u64,
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_metadata(metadata);
    header.set_size(size);

    let data = reader.take(size).chain(io::repeat(0)).take(size);
    builder.append_data(&mut header, name, data)
}
