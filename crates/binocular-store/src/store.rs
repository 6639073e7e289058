//! redb-backed event store.
//!
//! One table, `logs`, maps ULID keys to JSON-serialized [`TrafficEvent`]s.
//! redb serializes write transactions and gives every read transaction a
//! consistent snapshot, so the ingestion writer and the query readers share
//! a single [`EventStore`] handle without any extra locking.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use binocular_common::constants::EVENTS_TABLE;
use binocular_common::error::{BinocularError, Result};
use binocular_core::event::TrafficEvent;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, TableError};

use crate::key::{EventKey, KeyGenerator};

const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new(EVENTS_TABLE);

/// Destination for attributed events.
///
/// Implemented by [`EventStore`]; the seam lets the append policy be
/// exercised against failing sinks.
pub trait EventSink: Send + Sync {
    /// Persists one event and returns the key it was stored under.
    ///
    /// # Errors
    ///
    /// Returns an error if the event was not stored.
    fn append(&self, event: &TrafficEvent) -> Result<EventKey>;
}

/// Durable, append-only event log.
#[derive(Clone)]
pub struct EventStore {
    db: Arc<Database>,
    keys: Arc<KeyGenerator>,
    path: PathBuf,
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl EventStore {
    /// Opens the store file, creating it and its parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be opened as a redb database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BinocularError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let db = Database::create(path).map_err(|e| BinocularError::Store {
            message: format!("cannot open {}: {e}", path.display()),
        })?;
        tracing::info!(path = %path.display(), "event store opened");
        Ok(Self {
            db: Arc::new(db),
            keys: Arc::new(KeyGenerator::new()),
            path: path.to_path_buf(),
        })
    }

    /// Returns the path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one event in its own write transaction.
    ///
    /// The table is created on first use. If any step fails the transaction
    /// is dropped without committing, so nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, key generation, or the
    /// transaction fails.
    pub fn append(&self, event: &TrafficEvent) -> Result<EventKey> {
        let value = serde_json::to_vec(event)?;
        let key = self.keys.next_key()?;
        let text = key.to_string();

        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = txn.open_table(EVENTS).map_err(store_err)?;
            let _ = table
                .insert(text.as_str(), value.as_slice())
                .map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;

        tracing::debug!(key = %key, "event stored");
        Ok(key)
    }

    /// Returns every stored event in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails or a stored value
    /// cannot be deserialized.
    pub fn list_all(&self) -> Result<Vec<TrafficEvent>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|(_, event)| event)
            .collect())
    }

    /// Returns every stored event together with its key, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails, a key is not a ULID,
    /// or a value cannot be deserialized.
    pub fn entries(&self) -> Result<Vec<(EventKey, TrafficEvent)>> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let table = match txn.open_table(EVENTS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(store_err(e)),
        };

        let mut entries = Vec::new();
        for row in table.iter().map_err(store_err)? {
            let (key, value) = row.map_err(store_err)?;
            let key = EventKey::parse(key.value())?;
            let event: TrafficEvent = serde_json::from_slice(value.value())?;
            entries.push((key, event));
        }
        Ok(entries)
    }

    /// Returns the number of stored events.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn len(&self) -> Result<u64> {
        let txn = self.db.begin_read().map_err(store_err)?;
        match txn.open_table(EVENTS) {
            Ok(table) => table.len().map_err(store_err),
            Err(TableError::TableDoesNotExist(_)) => Ok(0),
            Err(e) => Err(store_err(e)),
        }
    }

    /// Returns whether no event has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the read transaction fails.
    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }
}

impl EventSink for EventStore {
    fn append(&self, event: &TrafficEvent) -> Result<EventKey> {
        Self::append(self, event)
    }
}

fn store_err(e: impl Into<redb::Error>) -> BinocularError {
    BinocularError::Store {
        message: e.into().to_string(),
    }
}
