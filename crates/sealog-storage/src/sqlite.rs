//! SQLite-backed event store.
//!
//! Five tables: `events` keyed by serial, `attributes` ordered by position
//! within an event, `error_events` with a surrogate key, `error_attributes`
//! ordered within an error event, and `errors` holding the one failure
//! message row per error event. All multi-row writes run in a single
//! transaction.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use sealog_core::{Attribute, ErrorEvent, Event, Level};

use crate::error::{StoreError, StoreResult};
use crate::store::EventStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id        INTEGER PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    received  INTEGER NOT NULL,
    level     TEXT NOT NULL,
    actor     TEXT NOT NULL,
    event     TEXT NOT NULL,
    signature BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS attributes (
    event    INTEGER NOT NULL REFERENCES events(id),
    position INTEGER NOT NULL,
    name     TEXT NOT NULL,
    value    TEXT NOT NULL,
    PRIMARY KEY (event, position)
);

CREATE TABLE IF NOT EXISTS error_events (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    serial    INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    received  INTEGER NOT NULL,
    level     TEXT NOT NULL,
    actor     TEXT NOT NULL,
    event     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS error_attributes (
    event    INTEGER NOT NULL REFERENCES error_events(id),
    position INTEGER NOT NULL,
    name     TEXT NOT NULL,
    value    TEXT NOT NULL,
    PRIMARY KEY (event, position)
);

CREATE TABLE IF NOT EXISTS errors (
    event     INTEGER NOT NULL REFERENCES error_events(id),
    timestamp INTEGER NOT NULL,
    message   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_error_events_serial ON error_events(serial);
";

/// A SQLite-backed [`EventStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the store at the given path.
    ///
    /// Enables WAL journalling and foreign keys, and bootstraps the schema
    /// idempotently.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::initialise(conn)
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialise(conn)
    }

    fn initialise(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        debug!("event store schema ready");
        Ok(Self { conn })
    }

    fn load_attributes(&self, serial: u64) -> StoreResult<Vec<Attribute>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, value FROM attributes WHERE event = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![serial], |row| {
            Ok(Attribute {
                name: row.get(0)?,
                value: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn load_error_attributes(&self, error_id: i64) -> StoreResult<Vec<Attribute>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, value FROM error_attributes WHERE event = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![error_id], |row| {
            Ok(Attribute {
                name: row.get(0)?,
                value: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        serial: row.get(0)?,
        when: row.get(1)?,
        received: row.get(2)?,
        level: Level::from_label(&row.get::<_, String>(3)?),
        actor: row.get(4)?,
        event: row.get(5)?,
        attributes: Vec::new(),
        signature: row.get(6)?,
    })
}

fn store_attributes(tx: &Transaction<'_>, table: Table, key: i64, attributes: &[Attribute]) -> StoreResult<()> {
    let sql = match table {
        Table::Events => "INSERT INTO attributes (event, position, name, value) VALUES (?1, ?2, ?3, ?4)",
        Table::ErrorEvents => {
            "INSERT INTO error_attributes (event, position, name, value) VALUES (?1, ?2, ?3, ?4)"
        },
    };
    let mut stmt = tx.prepare(sql)?;
    for (position, attribute) in attributes.iter().enumerate() {
        stmt.execute(params![key, position as i64, attribute.name, attribute.value])?;
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Table {
    Events,
    ErrorEvents,
}

impl EventStore for SqliteStore {
    fn count(&self) -> StoreResult<u64> {
        Ok(self
            .conn
            .query_row("SELECT count(*) FROM events", [], |row| row.get(0))?)
    }

    fn insert(&mut self, event: &Event) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO events (id, timestamp, received, level, actor, event, signature)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.serial,
                event.when,
                event.received,
                event.level.as_str(),
                event.actor,
                event.event,
                event.signature,
            ],
        )?;
        store_attributes(&tx, Table::Events, event.serial as i64, &event.attributes)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_error(&mut self, error: &ErrorEvent) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO error_events (serial, timestamp, received, level, actor, event)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                error.event.serial,
                error.event.when,
                error.event.received,
                error.event.level.as_str(),
                error.event.actor,
                error.event.event,
            ],
        )?;
        let error_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO errors (event, timestamp, message) VALUES (?1, ?2, ?3)",
            params![error_id, error.when, error.message],
        )?;
        store_attributes(&tx, Table::ErrorEvents, error_id, &error.event.attributes)?;
        tx.commit()?;
        Ok(())
    }

    fn load_event(&self, serial: u64) -> StoreResult<Event> {
        let mut event = self
            .conn
            .query_row(
                "SELECT id, timestamp, received, level, actor, event, signature
                 FROM events WHERE id = ?1",
                params![serial],
                event_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound { serial })?;
        event.attributes = self.load_attributes(serial)?;
        Ok(event)
    }

    fn load_range(&self, start: u64, end: u64) -> StoreResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, received, level, actor, event, signature
             FROM events WHERE id >= ?1 AND id <= ?2 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![start, end], event_from_row)?;
        let mut events = rows.collect::<Result<Vec<_>, _>>()?;
        for event in &mut events {
            event.attributes = self.load_attributes(event.serial)?;
        }
        Ok(events)
    }

    fn signature_at(&self, serial: u64) -> StoreResult<Vec<u8>> {
        self.conn
            .query_row(
                "SELECT signature FROM events WHERE id = ?1",
                params![serial],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound { serial })
    }

    fn load_errors_in_range(&self, start: u64, end: u64) -> StoreResult<Vec<ErrorEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, serial, timestamp, received, level, actor, event
             FROM error_events WHERE serial >= ?1 AND serial <= ?2 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![start, end], |row| {
            let id: i64 = row.get(0)?;
            let event = Event {
                serial: row.get(1)?,
                when: row.get(2)?,
                received: row.get(3)?,
                level: Level::from_label(&row.get::<_, String>(4)?),
                actor: row.get(5)?,
                event: row.get(6)?,
                attributes: Vec::new(),
                signature: Vec::new(),
            };
            Ok((id, event))
        })?;
        let skeletons = rows.collect::<Result<Vec<_>, _>>()?;

        let mut errors = Vec::with_capacity(skeletons.len());
        for (id, mut event) in skeletons {
            event.attributes = self.load_error_attributes(id)?;
            let (when, message) = self.conn.query_row(
                "SELECT timestamp, message FROM errors WHERE event = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            errors.push(ErrorEvent {
                when,
                message,
                event,
            });
        }
        Ok(errors)
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(serial: u64, attributes: Vec<Attribute>) -> Event {
        Event {
            serial,
            when: 1_000 + serial as i64,
            received: 2_000 + serial as i64,
            level: Level::Info,
            actor: format!("actor{serial}"),
            event: "ping".into(),
            attributes,
            signature: vec![serial as u8; 4],
        }
    }

    fn error_event(serial: u64) -> ErrorEvent {
        let mut event = event(serial, vec![Attribute::new("stage", "test")]);
        event.signature = Vec::new();
        ErrorEvent {
            when: 9_000,
            message: "signature: entropy source empty".into(),
            event,
        }
    }

    #[test]
    fn insert_and_load_roundtrip() {
        let mut store = SqliteStore::in_memory().unwrap();
        let stored = event(
            0,
            vec![Attribute::new("a", "1"), Attribute::new("b", "2")],
        );
        store.insert(&stored).unwrap();

        let loaded = store.load_event(0).unwrap();
        assert_eq!(loaded, stored);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn attribute_order_is_preserved() {
        let mut store = SqliteStore::in_memory().unwrap();
        let attributes: Vec<Attribute> = (0..8)
            .map(|i| Attribute::new(format!("k{i}"), format!("v{i}")))
            .collect();
        store.insert(&event(0, attributes.clone())).unwrap();

        let loaded = store.load_event(0).unwrap();
        assert_eq!(loaded.attributes, attributes);
    }

    #[test]
    fn duplicate_serial_insert_leaves_no_partial_state() {
        let mut store = SqliteStore::in_memory().unwrap();
        let first = event(0, vec![Attribute::new("a", "1"), Attribute::new("b", "2")]);
        store.insert(&first).unwrap();

        // Same serial, different attributes: the events row conflicts, and
        // the whole transaction must roll back.
        let conflicting = event(0, vec![Attribute::new("x", "9")]);
        assert!(store.insert(&conflicting).is_err());

        let loaded = store.load_event(0).unwrap();
        assert_eq!(loaded, first);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn load_range_is_inclusive_and_ordered() {
        let mut store = SqliteStore::in_memory().unwrap();
        for serial in 0..5 {
            store.insert(&event(serial, Vec::new())).unwrap();
        }

        let range = store.load_range(1, 3).unwrap();
        let serials: Vec<u64> = range.iter().map(|e| e.serial).collect();
        assert_eq!(serials, vec![1, 2, 3]);

        assert!(store.load_range(7, 9).unwrap().is_empty());
    }

    #[test]
    fn signature_lookup() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert(&event(4, Vec::new())).unwrap();

        assert_eq!(store.signature_at(4).unwrap(), vec![4u8; 4]);
        assert!(matches!(
            store.signature_at(5),
            Err(StoreError::NotFound { serial: 5 })
        ));
    }

    #[test]
    fn missing_event_reports_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(matches!(
            store.load_event(0),
            Err(StoreError::NotFound { serial: 0 })
        ));
    }

    #[test]
    fn error_events_do_not_occupy_serials() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert_error(&error_event(0)).unwrap();

        assert_eq!(store.count().unwrap(), 0);
        assert!(store.load_event(0).is_err());

        let errors = store.load_errors_in_range(0, 10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event.serial, 0);
        assert_eq!(errors[0].event.attributes.len(), 1);
        assert!(errors[0].message.starts_with("signature: "));
        assert!(errors[0].event.signature.is_empty());
    }

    #[test]
    fn error_range_filters_by_reserved_serial() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert_error(&error_event(1)).unwrap();
        store.insert_error(&error_event(5)).unwrap();
        store.insert_error(&error_event(9)).unwrap();

        let errors = store.load_errors_in_range(2, 8).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event.serial, 5);
    }

    #[test]
    fn reopening_a_file_store_preserves_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store
                .insert(&event(0, vec![Attribute::new("a", "1")]))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.load_event(0).unwrap().attributes.len(), 1);
    }
}
