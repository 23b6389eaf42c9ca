/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Document persistence using fjall (append-only log) + redb (snapshots) + rkyv (serialization).
//!
//! Architecture:
//! - Every document mutation is journaled to fjall as a rkyv-serialized LogEntry
//! - Periodic snapshots write the full document to redb via rkyv
//! - On startup: load latest snapshot, replay log entries after it

pub mod types;

use log::warn;
use redb::{ReadableDatabase, ReadableTable};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use types::{DocumentSnapshot, LogEntry, PersistedEdgeKind};

const SNAPSHOT_TABLE: redb::TableDefinition<&str, &[u8]> = redb::TableDefinition::new("snapshots");
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 300;
const NAMED_MAP_PREFIX: &str = "named:";
const ZSTD_LEVEL: i32 = 3;

impl Default for DocumentSnapshot {
    fn default() -> Self {
        Self {
            title: String::new(),
            default_edge_kind: PersistedEdgeKind::default(),
            background_color: None,
            dot_color: None,
            font: None,
            root_node_id: None,
            collapsed_node_ids: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            strokes: Vec::new(),
            timestamp_secs: 0,
        }
    }
}

/// Persistent document store backed by fjall (log) + redb (snapshots)
pub struct DocumentStore {
    /// Kept alive so the Keyspace borrow remains valid (fjall requires it).
    _db: fjall::Database,
    log_keyspace: fjall::Keyspace,
    snapshot_db: redb::Database,
    log_sequence: u64,
    last_snapshot: Instant,
    snapshot_interval: Duration,
}

impl DocumentStore {
    fn named_map_key(name: &str) -> Result<String, DocumentStoreError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DocumentStoreError::Io(
                "Map snapshot name must not be empty".to_string(),
            ));
        }
        if trimmed == "latest" {
            return Err(DocumentStoreError::Io(
                "Map snapshot name 'latest' is reserved".to_string(),
            ));
        }
        Ok(format!("{NAMED_MAP_PREFIX}{trimmed}"))
    }

    /// Open or create a document store at the given directory
    pub fn open(base_dir: PathBuf) -> Result<Self, DocumentStoreError> {
        std::fs::create_dir_all(&base_dir)
            .map_err(|e| DocumentStoreError::Io(format!("Failed to create dir: {e}")))?;

        let log_path = base_dir.join("log");
        let snapshot_path = base_dir.join("snapshots.redb");

        let db = fjall::Database::builder(&log_path)
            .open()
            .map_err(|e| DocumentStoreError::Fjall(format!("{e}")))?;

        let log_keyspace = db
            .keyspace("mutations", || fjall::KeyspaceCreateOptions::default())
            .map_err(|e| DocumentStoreError::Fjall(format!("{e}")))?;

        let snapshot_db = redb::Database::create(&snapshot_path)
            .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;

        // Find the next log sequence number
        let log_sequence = Self::find_max_sequence(&log_keyspace) + 1;

        Ok(Self {
            _db: db,
            log_keyspace,
            snapshot_db,
            log_sequence,
            last_snapshot: Instant::now(),
            snapshot_interval: Duration::from_secs(DEFAULT_SNAPSHOT_INTERVAL_SECS),
        })
    }

    fn encode_persisted_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, DocumentStoreError> {
        zstd::stream::encode_all(std::io::Cursor::new(plaintext), ZSTD_LEVEL)
            .map_err(|e| DocumentStoreError::Compression(format!("zstd encode failed: {e}")))
    }

    fn decode_persisted_bytes(&self, stored: &[u8]) -> Result<Vec<u8>, DocumentStoreError> {
        zstd::stream::decode_all(std::io::Cursor::new(stored))
            .map_err(|e| DocumentStoreError::Compression(format!("zstd decode failed: {e}")))
    }

    /// Append a mutation to the log
    pub fn log_mutation(&mut self, entry: &LogEntry) {
        let plaintext = match rkyv::to_bytes::<rkyv::rancor::Error>(entry) {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to serialize log entry: {e}");
                return;
            },
        };
        let bytes = match self.encode_persisted_bytes(plaintext.as_ref()) {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to compress log entry: {e}");
                return;
            },
        };

        let key = self.log_sequence.to_be_bytes();
        if let Err(e) = self.log_keyspace.insert(key, bytes.as_slice()) {
            warn!("Failed to write log entry: {e}");
        }
        self.log_sequence += 1;
    }

    /// Write a full document snapshot and compact the log
    pub fn take_snapshot(&mut self, snapshot: &DocumentSnapshot) {
        let plaintext = match rkyv::to_bytes::<rkyv::rancor::Error>(snapshot) {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to serialize snapshot: {e}");
                return;
            },
        };
        let bytes = match self.encode_persisted_bytes(plaintext.as_ref()) {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to compress snapshot: {e}");
                return;
            },
        };

        // Write snapshot to redb
        let write_result = (|| -> Result<(), DocumentStoreError> {
            let write_txn = self
                .snapshot_db
                .begin_write()
                .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
            {
                let mut table = write_txn
                    .open_table(SNAPSHOT_TABLE)
                    .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
                table
                    .insert("latest", bytes.as_slice())
                    .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
            }
            write_txn
                .commit()
                .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
            Ok(())
        })();

        if let Err(e) = write_result {
            warn!("Failed to write snapshot: {e}");
            return;
        }

        // Clear the log since we have a fresh snapshot
        self.clear_log();
        self.last_snapshot = Instant::now();
    }

    /// Recover document state from snapshot + log replay.
    ///
    /// Returns `None` when the store holds neither a snapshot nor any log
    /// entries, so callers can distinguish "fresh install" from "empty map".
    pub fn recover(&self) -> Option<DocumentSnapshot> {
        let loaded = self.load_snapshot();
        let had_snapshot = loaded.is_some();
        let mut snapshot = loaded.unwrap_or_default();

        let replayed = self.replay_log(&mut snapshot);

        if had_snapshot || replayed > 0 {
            Some(snapshot)
        } else {
            None
        }
    }

    /// Whether the periodic snapshot interval has elapsed.
    pub fn snapshot_due(&self) -> bool {
        self.last_snapshot.elapsed() >= self.snapshot_interval
    }

    /// Configure periodic snapshot interval (seconds).
    pub fn set_snapshot_interval_secs(&mut self, secs: u64) -> Result<(), DocumentStoreError> {
        if secs == 0 {
            return Err(DocumentStoreError::Io(
                "Snapshot interval must be greater than zero seconds".to_string(),
            ));
        }
        self.snapshot_interval = Duration::from_secs(secs);
        Ok(())
    }

    /// Current periodic snapshot interval in seconds.
    pub fn snapshot_interval_secs(&self) -> u64 {
        self.snapshot_interval.as_secs()
    }

    /// Clear all persisted document data (snapshot + mutation log).
    pub fn clear_all(&mut self) -> Result<(), DocumentStoreError> {
        let write_txn = self
            .snapshot_db
            .begin_write()
            .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(SNAPSHOT_TABLE)
                .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
            table
                .remove("latest")
                .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;

        self.clear_log();
        self.last_snapshot = Instant::now();
        Ok(())
    }

    /// Persist a named document snapshot (sub-maps reference these by id).
    pub fn save_named_map(
        &mut self,
        name: &str,
        snapshot: &DocumentSnapshot,
    ) -> Result<(), DocumentStoreError> {
        let key = Self::named_map_key(name)?;
        let plaintext = rkyv::to_bytes::<rkyv::rancor::Error>(snapshot).map_err(|e| {
            DocumentStoreError::Io(format!("Failed to serialize map snapshot: {e}"))
        })?;
        let bytes = self.encode_persisted_bytes(plaintext.as_ref())?;
        let write_txn = self
            .snapshot_db
            .begin_write()
            .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(SNAPSHOT_TABLE)
                .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
        Ok(())
    }

    /// Load a named document snapshot if present.
    pub fn load_named_map(&self, name: &str) -> Option<DocumentSnapshot> {
        let key = Self::named_map_key(name).ok()?;
        let read_txn = self.snapshot_db.begin_read().ok()?;
        let table = read_txn.open_table(SNAPSHOT_TABLE).ok()?;
        let entry = table.get(key.as_str()).ok()??;
        let bytes = self.decode_persisted_bytes(entry.value()).ok()?;
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(&bytes);
        rkyv::from_bytes::<DocumentSnapshot, rkyv::rancor::Error>(&aligned).ok()
    }

    /// List named map snapshots in stable order.
    pub fn list_named_map_names(&self) -> Vec<String> {
        let Ok(read_txn) = self.snapshot_db.begin_read() else {
            return Vec::new();
        };
        let Ok(table) = read_txn.open_table(SNAPSHOT_TABLE) else {
            return Vec::new();
        };
        let Ok(iter) = table.iter() else {
            return Vec::new();
        };
        let mut names = Vec::new();
        for entry in iter {
            if let Ok((key, _)) = entry {
                let key = key.value();
                if let Some(stripped) = key.strip_prefix(NAMED_MAP_PREFIX) {
                    names.push(stripped.to_string());
                }
            }
        }
        names.sort();
        names
    }

    /// Delete a named map snapshot.
    pub fn delete_named_map(&mut self, name: &str) -> Result<(), DocumentStoreError> {
        let key = Self::named_map_key(name)?;
        let write_txn = self
            .snapshot_db
            .begin_write()
            .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
        {
            let mut table = write_txn
                .open_table(SNAPSHOT_TABLE)
                .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
            let _ = table
                .remove(key.as_str())
                .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| DocumentStoreError::Redb(format!("{e}")))?;
        Ok(())
    }

    fn load_snapshot(&self) -> Option<DocumentSnapshot> {
        let read_txn = self.snapshot_db.begin_read().ok()?;
        let table = read_txn.open_table(SNAPSHOT_TABLE).ok()?;
        let entry = table.get("latest").ok()??;
        let bytes = self.decode_persisted_bytes(entry.value()).ok()?;

        // Copy to aligned buffer; redb bytes may not satisfy rkyv alignment
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(&bytes);

        rkyv::from_bytes::<DocumentSnapshot, rkyv::rancor::Error>(&aligned).ok()
    }

    /// Replay journaled mutations on top of a snapshot. Returns how many
    /// entries were applied; corrupt or stale entries are skipped.
    fn replay_log(&self, snapshot: &mut DocumentSnapshot) -> usize {
        let mut applied = 0usize;

        for guard in self.log_keyspace.iter() {
            let (_, value) = match guard.into_inner() {
                Ok(kv) => kv,
                Err(_) => continue,
            };
            let decoded = match self.decode_persisted_bytes(value.as_ref()) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let mut aligned = rkyv::util::AlignedVec::<16>::new();
            aligned.extend_from_slice(&decoded);

            let entry = match rkyv::from_bytes::<LogEntry, rkyv::rancor::Error>(&aligned) {
                Ok(e) => e,
                Err(_) => continue,
            };

            if Self::apply_log_entry(snapshot, entry) {
                applied += 1;
            }
        }

        applied
    }

    fn apply_log_entry(snapshot: &mut DocumentSnapshot, entry: LogEntry) -> bool {
        match entry {
            LogEntry::AddNode { node } => {
                if snapshot.nodes.iter().any(|n| n.node_id == node.node_id) {
                    return false;
                }
                snapshot.nodes.push(node);
            },
            LogEntry::MoveNode {
                node_id,
                position_x,
                position_y,
            } => {
                let Some(node) = snapshot.nodes.iter_mut().find(|n| n.node_id == node_id) else {
                    return false;
                };
                node.position_x = position_x;
                node.position_y = position_y;
            },
            LogEntry::ResizeNode {
                node_id,
                width,
                height,
            } => {
                let Some(node) = snapshot.nodes.iter_mut().find(|n| n.node_id == node_id) else {
                    return false;
                };
                node.width = Some(width);
                node.height = Some(height);
            },
            LogEntry::UpdateNode { node } => {
                let Some(existing) = snapshot
                    .nodes
                    .iter_mut()
                    .find(|n| n.node_id == node.node_id)
                else {
                    return false;
                };
                *existing = node;
            },
            LogEntry::RemoveNode { node_id } => {
                let before = snapshot.nodes.len();
                snapshot.nodes.retain(|n| n.node_id != node_id);
                if snapshot.nodes.len() == before {
                    return false;
                }
                snapshot
                    .edges
                    .retain(|e| e.source_node_id != node_id && e.target_node_id != node_id);
                snapshot.collapsed_node_ids.retain(|id| *id != node_id);
            },
            LogEntry::AddEdge { edge } => {
                if snapshot.edges.iter().any(|e| e.edge_id == edge.edge_id) {
                    return false;
                }
                let endpoints_present = snapshot
                    .nodes
                    .iter()
                    .any(|n| n.node_id == edge.source_node_id)
                    && snapshot
                        .nodes
                        .iter()
                        .any(|n| n.node_id == edge.target_node_id);
                if !endpoints_present {
                    return false;
                }
                snapshot.edges.push(edge);
            },
            LogEntry::RemoveEdge { edge_id } => {
                let before = snapshot.edges.len();
                snapshot.edges.retain(|e| e.edge_id != edge_id);
                if snapshot.edges.len() == before {
                    return false;
                }
            },
            LogEntry::UpdateEdgeKind { edge_id, kind } => {
                let Some(edge) = snapshot.edges.iter_mut().find(|e| e.edge_id == edge_id) else {
                    return false;
                };
                edge.kind = kind;
            },
            LogEntry::UpdateTitle { title } => snapshot.title = title,
            LogEntry::UpdateDefaultEdgeKind { kind } => snapshot.default_edge_kind = kind,
            LogEntry::UpdateBackgroundColor { color } => snapshot.background_color = color,
            LogEntry::UpdateDotColor { color } => snapshot.dot_color = color,
            LogEntry::UpdateFont { font } => snapshot.font = font,
            LogEntry::SetCollapsed { node_id, collapsed } => {
                if collapsed {
                    if !snapshot.collapsed_node_ids.contains(&node_id) {
                        snapshot.collapsed_node_ids.push(node_id);
                    }
                } else {
                    snapshot.collapsed_node_ids.retain(|id| *id != node_id);
                }
            },
            LogEntry::SetStrokes { strokes } => snapshot.strokes = strokes,
            LogEntry::ClearDocument => *snapshot = DocumentSnapshot::default(),
        }
        true
    }

    fn clear_log(&mut self) {
        let keys: Vec<Vec<u8>> = self
            .log_keyspace
            .iter()
            .filter_map(|guard| guard.key().ok().map(|k| k.to_vec()))
            .collect();
        for key in keys {
            let _ = self.log_keyspace.remove(key);
        }
        self.log_sequence = 0;
    }

    fn find_max_sequence(keyspace: &fjall::Keyspace) -> u64 {
        let mut max = 0u64;
        for guard in keyspace.iter() {
            if let Ok(key_bytes) = guard.key() {
                if key_bytes.len() == 8 {
                    let seq = u64::from_be_bytes(key_bytes.as_ref().try_into().unwrap_or([0u8; 8]));
                    max = max.max(seq);
                }
            }
        }
        max
    }

    /// Get the default storage directory for document data
    pub fn default_data_dir() -> PathBuf {
        let mut dir = dirs::config_dir().expect("No config directory available");
        dir.push("mindweave");
        dir.push("maps");
        dir
    }
}

/// Errors from the document store
#[derive(Debug)]
pub enum DocumentStoreError {
    Io(String),
    Fjall(String),
    Redb(String),
    Compression(String),
}

impl std::fmt::Display for DocumentStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStoreError::Io(e) => write!(f, "IO error: {e}"),
            DocumentStoreError::Fjall(e) => write!(f, "Fjall error: {e}"),
            DocumentStoreError::Redb(e) => write!(f, "Redb error: {e}"),
            DocumentStoreError::Compression(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for DocumentStoreError {}
