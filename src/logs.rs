//! Appends captured process output to per-process log files.

use std::{io, path::Path};

use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
};

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Append-only writer for one log file. Files are never rotated or
/// truncated; external log rotation is assumed.
#[derive(Debug)]
pub struct LogWriter {
    file: File,
    timestamps: bool,
}

impl LogWriter {
    /// Opens the log file in create+append mode, creating parent
    /// directories as needed. An existing file keeps its contents.
    pub async fn open(path: &Path, timestamps: bool) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(Self { file, timestamps })
    }

    /// Appends one line to the file, prefixed with the capture-time
    /// timestamp when timestamping is enabled.
    pub async fn append(&mut self, line: &str) -> io::Result<()> {
        let timestamp = self.timestamps.then(OffsetDateTime::now_utc);
        self.file
            .write_all(format_line(timestamp, line).as_bytes())
            .await?;

        // tokio's File buffers writes internally; flush so that the
        // line is on disk before the append is reported complete.
        self.file.flush().await
    }
}

fn format_line(timestamp: Option<OffsetDateTime>, line: &str) -> String {
    match timestamp.and_then(|ts| ts.format(TIMESTAMP_FORMAT).ok()) {
        Some(ts) => format!("{ts}: {line}\n"),
        None => format!("{line}\n"),
    }
}
