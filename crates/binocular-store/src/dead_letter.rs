//! Dead-letter file for events the store refused.
//!
//! One JSON event per line, appended. The file can be replayed with
//! `binocular replay`.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use binocular_common::error::{BinocularError, Result};
use binocular_core::event::TrafficEvent;

/// Append-only JSON-lines file of undeliverable events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterFile {
    path: PathBuf,
}

impl DeadLetterFile {
    /// Creates a handle; the file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created or written.
    pub fn write(&self, event: &TrafficEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BinocularError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        writeln!(file, "{line}").map_err(|e| self.io_err(e))
    }

    /// Reads every dead-lettered event. A missing file yields none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or holds a
    /// line that is not an event.
    pub fn read_all(&self) -> Result<Vec<TrafficEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path).map_err(|e| self.io_err(e))?;
        let mut events = Vec::new();
        for line in std::io::BufReader::new(file).lines() {
            let line = line.map_err(|e| self.io_err(e))?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }

    /// Empties the file after a successful replay. A missing file is left
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be truncated.
    pub fn clear(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        std::fs::File::create(&self.path)
            .map(drop)
            .map_err(|e| self.io_err(e))
    }

    fn io_err(&self, source: std::io::Error) -> BinocularError {
        BinocularError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
