use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::quote::{Origin, Quote, RecordSet};

/// Persists the local record set. Last write wins.
pub trait Store: Send + Sync {
    fn load(&self) -> Result<RecordSet>;

    fn save(&self, set: &RecordSet) -> Result<()>;

    /// Append to the audit trail. Stores without one ignore events.
    fn record_event(&self, _event: &SyncEvent) -> Result<()> {
        Ok(())
    }
}

/// Audit trail entry ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl SyncEvent {
    pub fn new(event_type: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open quote database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("quote database lock poisoned"))
    }

    /// Most recent events first
    pub fn recent_events(&self, limit: usize) -> Result<Vec<SyncEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT event_id, timestamp, event_type, data, actor
             FROM sync_events
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(event_id, timestamp, event_type, data, actor)| {
                Ok(SyncEvent {
                    event_id,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .context("Invalid event timestamp")?
                        .with_timezone(&Utc),
                    event_type,
                    data: serde_json::from_str(&data).context("Invalid event payload")?,
                    actor,
                })
            })
            .collect()
    }

    fn stored_fingerprint(conn: &Connection) -> Result<Option<String>> {
        let mut stmt = conn.prepare("SELECT value FROM store_meta WHERE key = 'fingerprint'")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; in-memory databases report "memory" and that's fine
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quotes (
            position INTEGER NOT NULL,
            text TEXT PRIMARY KEY NOT NULL,
            category TEXT NOT NULL,
            origin TEXT NOT NULL,
            remote_id INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // Audit trail
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quotes_position ON quotes(position)",
        [],
    )?;

    Ok(())
}

impl Store for SqliteStore {
    fn load(&self) -> Result<RecordSet> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT text, category, origin, remote_id FROM quotes ORDER BY position",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut quotes = Vec::with_capacity(rows.len());
        for (text, category, origin, remote_id) in rows {
            let origin = Origin::parse(&origin)
                .ok_or_else(|| anyhow!("Unknown origin {:?} for quote {:?}", origin, text))?;
            let quote = Quote::build(&text, &category, origin, remote_id)
                .with_context(|| format!("Corrupt quote row {:?}", text))?;
            quotes.push(quote);
        }

        Ok(RecordSet::from_quotes(quotes))
    }

    fn save(&self, set: &RecordSet) -> Result<()> {
        let mut conn = self.conn()?;
        let fingerprint = set.fingerprint();

        if Self::stored_fingerprint(&conn)?.as_deref() == Some(fingerprint.as_str()) {
            debug!(quotes = set.len(), "quote set unchanged, skipping write");
            return Ok(());
        }

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM quotes", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO quotes (position, text, category, origin, remote_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, quote) in set.iter().enumerate() {
                insert.execute(params![
                    position as i64,
                    quote.text(),
                    quote.category(),
                    quote.origin().as_str(),
                    quote.id(),
                ])?;
            }
        }
        tx.execute(
            "INSERT INTO store_meta (key, value) VALUES ('fingerprint', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![fingerprint],
        )?;
        tx.commit()?;

        debug!(quotes = set.len(), "saved quote set");
        Ok(())
    }

    fn record_event(&self, event: &SyncEvent) -> Result<()> {
        let data_json = serde_json::to_string(&event.data)?;
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO sync_events (event_id, timestamp, event_type, data, actor)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.event_id,
                event.timestamp.to_rfc3339(),
                event.event_type,
                data_json,
                event.actor,
            ],
        )?;

        Ok(())
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// In-process store for hosts without persistence
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    quotes: RecordSet,
    events: Vec<SyncEvent>,
    saves: usize,
}

impl MemoryStore {
    pub fn new(initial: RecordSet) -> Self {
        MemoryStore {
            state: Mutex::new(MemoryState {
                quotes: initial,
                ..MemoryState::default()
            }),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> Result<usize> {
        Ok(self.state()?.saves)
    }

    pub fn events(&self) -> Result<Vec<SyncEvent>> {
        Ok(self.state()?.events.clone())
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<RecordSet> {
        Ok(self.state()?.quotes.clone())
    }

    fn save(&self, set: &RecordSet) -> Result<()> {
        let mut state = self.state()?;
        state.quotes = set.clone();
        state.saves += 1;
        Ok(())
    }

    fn record_event(&self, event: &SyncEvent) -> Result<()> {
        self.state()?.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> RecordSet {
        RecordSet::from_quotes(vec![
            Quote::local("Zebra first", "Life").unwrap(),
            Quote::remote("Alpha second", "Server", Some(42)).unwrap(),
            Quote::local("Middle third", "Work").unwrap(),
        ])
    }

    #[test]
    fn test_sqlite_round_trip_preserves_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load().unwrap().is_empty());

        let set = sample();
        store.save(&set).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, set);
        assert_eq!(loaded.get("Alpha second").unwrap().id(), Some(42));
        assert_eq!(loaded.get("Alpha second").unwrap().origin(), Origin::Remote);
    }

    #[test]
    fn test_sqlite_round_trip_keeps_imported_id() {
        // Imported quotes are Local but may carry the id they were exported with
        let imported = crate::quote::ingest(
            vec![crate::quote::QuoteRecord {
                text: "sunt aut facere".to_string(),
                category: "Server".to_string(),
                id: Some(1),
                origin: None,
            }],
            Origin::Local,
        )
        .quotes;

        let store = SqliteStore::open_in_memory().unwrap();
        store.save(&imported).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, imported);
        assert_eq!(loaded.get("sunt aut facere").unwrap().id(), Some(1));
        assert_eq!(loaded.get("sunt aut facere").unwrap().origin(), Origin::Local);
        let stored = SqliteStore::stored_fingerprint(&store.conn().unwrap()).unwrap();
        assert_eq!(stored, Some(loaded.fingerprint()));
    }

    #[test]
    fn test_sqlite_save_replaces_set() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save(&sample()).unwrap();

        let smaller = RecordSet::from_quotes(vec![Quote::local("Only", "One").unwrap()]);
        store.save(&smaller).unwrap();

        assert_eq!(store.load().unwrap(), smaller);
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quotes.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.save(&sample()).unwrap();
            store
                .record_event(&SyncEvent::new(
                    "sync_merged",
                    serde_json::json!({"additions": 1}),
                    "test",
                ))
                .unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.load().unwrap(), sample());

        let events = reopened.recent_events(10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "sync_merged");
        assert_eq!(events[0].data["additions"], 1);
    }

    #[test]
    fn test_recent_events_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        for kind in ["first", "second", "third"] {
            store
                .record_event(&SyncEvent::new(kind, serde_json::json!({}), "test"))
                .unwrap();
        }

        let events = store.recent_events(2).unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["third", "second"]);
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemoryStore::new(sample());
        assert_eq!(store.load().unwrap(), sample());

        store.save(&RecordSet::new()).unwrap();
        assert_eq!(store.save_count().unwrap(), 1);
        assert!(store.load().unwrap().is_empty());
    }
}
