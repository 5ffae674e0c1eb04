//! Append-following line sources
//!
//! [`FileTailer`] follows a file the way `tail -F` does: it yields every
//! line already in the file, then waits for appended lines. When the file
//! shrinks, is replaced by a new inode, or disappears and comes back, it
//! re-opens and starts again from offset zero.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::{Error, Result};

/// Unbounded sequence of raw text lines
pub trait LineSource: Send {
    /// Next line without its terminator, or `None` once the source is exhausted
    fn next_line(&mut self) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// Device and inode of an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    // Without inode numbers only truncation is detected
    #[cfg(not(unix))]
    fn of(_metadata: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

/// Polling follower for a single file
#[derive(Debug)]
pub struct FileTailer {
    path: PathBuf,
    poll_interval: Duration,
    reader: Option<BufReader<File>>,
    identity: Option<FileIdentity>,
    offset: u64,
    partial: Vec<u8>,
}

impl FileTailer {
    /// Open `path` for following from its first line
    ///
    /// Fails with [`Error::LineSourceUnavailable`] when the path does not
    /// exist or is not a regular file.
    pub async fn open(path: impl Into<PathBuf>, poll_interval: Duration) -> Result<Self> {
        let path = path.into();

        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| Error::line_source_unavailable(&path, e))?;
        if !metadata.is_file() {
            return Err(Error::line_source_unavailable(
                &path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let mut tailer = Self {
            path,
            poll_interval,
            reader: None,
            identity: None,
            offset: 0,
            partial: Vec::new(),
        };
        tailer
            .reopen()
            .await
            .map_err(|e| Error::line_source_unavailable(&tailer.path, e))?;

        debug!("Tailing {}", tailer.path.display());
        Ok(tailer)
    }

    /// Bytes consumed from the current file incarnation
    pub fn offset(&self) -> u64 {
        self.offset
    }

    async fn reopen(&mut self) -> io::Result<()> {
        let file = File::open(&self.path).await?;
        let metadata = file.metadata().await?;

        self.identity = FileIdentity::of(&metadata);
        self.reader = Some(BufReader::new(file));
        self.offset = 0;
        self.partial.clear();
        Ok(())
    }

    /// Decide whether the file behind the path is still the one being read
    async fn check_rotation(&mut self) -> Result<()> {
        match fs::metadata(&self.path).await {
            Ok(metadata) => {
                if FileIdentity::of(&metadata) != self.identity {
                    info!(
                        "File {} was recreated; reading from the start",
                        self.path.display()
                    );
                    self.reader = None;
                } else if metadata.len() < self.offset {
                    info!(
                        "File {} was truncated ({} < {} bytes); reading from the start",
                        self.path.display(),
                        metadata.len(),
                        self.offset
                    );
                    self.reader = None;
                }
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.reader.is_some() {
                    info!(
                        "File {} was removed; waiting for it to reappear",
                        self.path.display()
                    );
                }
                self.reader = None;
                Ok(())
            }
            Err(e) => Err(Error::line_source_unavailable(&self.path, e)),
        }
    }

    async fn follow(&mut self) -> Result<String> {
        loop {
            if self.reader.is_none() {
                match self.reopen().await {
                    Ok(()) => debug!("Reopened {}", self.path.display()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        sleep(self.poll_interval).await;
                        continue;
                    }
                    Err(e) => return Err(Error::line_source_unavailable(&self.path, e)),
                }
            }

            let Some(reader) = self.reader.as_mut() else {
                continue;
            };

            let read = reader
                .read_until(b'\n', &mut self.partial)
                .await
                .map_err(|e| Error::line_source_unavailable(&self.path, e))?;
            self.offset += read as u64;

            if self.partial.ends_with(b"\n") {
                let line = decode_line(&self.partial);
                self.partial.clear();
                return Ok(line);
            }

            if read > 0 {
                // Incomplete last line; keep it until the rest is written
                continue;
            }

            self.check_rotation().await?;
            if self.reader.is_some() {
                sleep(self.poll_interval).await;
            }
        }
    }
}

impl LineSource for FileTailer {
    async fn next_line(&mut self) -> Result<Option<String>> {
        self.follow().await.map(Some)
    }
}

/// Strip the line terminator and decode lossily
fn decode_line(bytes: &[u8]) -> String {
    let mut end = bytes.len();
    while end > 0 && matches!(bytes[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Fixed set of lines, exhausted after the last one
#[derive(Debug, Clone, Default)]
pub struct MemoryLineSource {
    lines: VecDeque<String>,
}

impl MemoryLineSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl LineSource for MemoryLineSource {
    async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}
