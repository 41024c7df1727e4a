//! Per-run debug artifacts.
//!
//! The driver writes every raw agent output and intermediate value to a
//! [`LogSink`]. Sinks are owned by a single run; two runs pointed at the same
//! file path will interleave their entries.

use crate::error::Result;
use crate::utils::tail_chars;
use chrono::Utc;
use log::warn;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_TAIL_CHARS: usize = 5000;

pub trait LogSink: Send {
    fn append(&mut self, section: &str, content: &str);
}

fn entry(section: &str, content: &str) -> String {
    format!(
        "=== {} @ {} ===\n{}\n\n",
        section,
        Utc::now().to_rfc3339(),
        content.trim_end()
    )
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn append(&mut self, _section: &str, _content: &str) {}
}

/// Keeps entries in memory; handy for tests and for callers that want to
/// show the log themselves.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogSink {
    pub entries: Vec<(String, String)>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sections(&self) -> Vec<&str> {
        self.entries.iter().map(|(s, _)| s.as_str()).collect()
    }

    pub fn get(&self, section: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| s == section)
            .map(|(_, c)| c.as_str())
    }

    pub fn text(&self) -> String {
        self.entries
            .iter()
            .map(|(s, c)| entry(s, c))
            .collect::<String>()
    }
}

impl LogSink for MemoryLogSink {
    fn append(&mut self, section: &str, content: &str) {
        self.entries.push((section.to_string(), content.to_string()));
    }
}

/// Append-only UTF-8 log file, truncated when the sink is created.
#[derive(Debug, Clone)]
pub struct FileLogSink {
    path: PathBuf,
}

impl FileLogSink {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        File::create(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_append(&self, section: &str, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry(section, content).as_bytes())
    }
}

impl LogSink for FileLogSink {
    fn append(&mut self, section: &str, content: &str) {
        if let Err(e) = self.try_append(section, content) {
            warn!(
                "Could not write debug log entry '{}' to {}: {}",
                section,
                self.path.display(),
                e
            );
        }
    }
}

/// The last `max_chars` characters of the log at `path`. A missing file reads
/// as empty.
pub fn tail_log(path: impl AsRef<Path>, max_chars: usize) -> Result<String> {
    match std::fs::read_to_string(path.as_ref()) {
        Ok(text) => Ok(tail_chars(&text, max_chars).to_string()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}
