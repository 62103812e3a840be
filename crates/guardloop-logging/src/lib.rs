//! # guardloop-logging
//!
//! Structured logging setup with `tracing`.
//!
//! [`init_logging`] installs a global subscriber filtered by the configured
//! level (overridable via `RUST_LOG`), writing to stderr and, when a log file
//! is configured, to that file as well. Before the file sink opens, the
//! previous file is rotated once it exceeds the configured size; numbered
//! backups beyond `backup_count` are removed.

#![deny(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use guardloop_settings::{expand_tilde, LoggingSettings};

/// Install the global tracing subscriber.
///
/// Safe to call once per process; a second call is a no-op because the
/// global default is already set.
pub fn init_logging(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));

    let writer = if settings.file.is_empty() {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        let path = expand_tilde(&settings.file);
        rotate_if_needed(&path, settings.max_size_mb, settings.backup_count);
        match open_log_file(&path) {
            Some(file) => BoxMakeWriter::new(move || {
                file.try_clone()
                    .map_or_else(|_| LogWriter::Stderr(std::io::stderr()), LogWriter::File)
            }),
            None => BoxMakeWriter::new(std::io::stderr),
        }
    };

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true)
        .try_init();

    if result.is_ok() {
        info!(level = %settings.level, file = %settings.file, "logging initialized");
    }
}

enum LogWriter {
    File(fs::File),
    Stderr(std::io::Stderr),
}

impl std::io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::File(f) => f.write(buf),
            Self::Stderr(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::File(f) => f.flush(),
            Self::Stderr(s) => s.flush(),
        }
    }
}

fn open_log_file(path: &Path) -> Option<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok()?;
    }
    fs::OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Rotate `guardloop.log` to `guardloop.log.1`, shifting older backups up,
/// once the current file exceeds `max_size_mb`.
pub fn rotate_if_needed(path: &Path, max_size_mb: u64, backup_count: u32) {
    let Ok(meta) = fs::metadata(path) else {
        return;
    };
    if meta.len() < max_size_mb.saturating_mul(1024 * 1024) {
        return;
    }

    // Drop the oldest, then shift N-1 → N.
    let _ = fs::remove_file(backup_path(path, backup_count));
    for n in (1..backup_count).rev() {
        let _ = fs::rename(backup_path(path, n), backup_path(path, n + 1));
    }
    let _ = fs::rename(path, backup_path(path, 1));
}

fn backup_path(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn rotation_shifts_backups() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("guardloop.log");

        // Over-threshold current file plus an existing .1 backup.
        fs::write(&log, vec![b'x'; 2 * 1024 * 1024]).unwrap();
        fs::write(backup_path(&log, 1), b"old-1").unwrap();

        rotate_if_needed(&log, 1, 3);

        assert!(!log.exists());
        assert!(backup_path(&log, 1).exists());
        assert_eq!(fs::read(backup_path(&log, 2)).unwrap(), b"old-1");
    }

    #[test]
    fn rotation_skips_small_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("guardloop.log");
        let mut file = fs::File::create(&log).unwrap();
        writeln!(file, "tiny").unwrap();

        rotate_if_needed(&log, 1, 3);
        assert!(log.exists());
        assert!(!backup_path(&log, 1).exists());
    }

    #[test]
    fn rotation_drops_oldest_backup() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("guardloop.log");
        fs::write(&log, vec![b'x'; 2 * 1024 * 1024]).unwrap();
        fs::write(backup_path(&log, 1), b"b1").unwrap();
        fs::write(backup_path(&log, 2), b"b2").unwrap();

        rotate_if_needed(&log, 1, 2);

        // b2 dropped, b1 became b2, current became b1.
        assert_eq!(fs::read(backup_path(&log, 2)).unwrap(), b"b1");
        assert!(backup_path(&log, 1).exists());
    }
}
