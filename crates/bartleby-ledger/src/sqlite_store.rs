//! SQLite-backed storage for the Bartleby event log.
//!
//! One `bartleby.db` file in WAL mode holds the append-only `events` table
//! (the source of truth) next to the `cards`, `links` and `config` tables,
//! which are derived caches written only by the projector.

use std::path::Path;
use std::time::Duration;

use bartleby_core::{
    Card, CardFilter, CoreError, CoreResult, CreatedFrom, Event, Link, LinkChanges, LinkFilter,
    MetaMap, ProjectConfig,
};
use rusqlite::{params, Connection, OptionalExtension};

const SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    type TEXT NOT NULL,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(type);

CREATE TABLE IF NOT EXISTS cards (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    card_type TEXT NOT NULL,
    metadata TEXT NOT NULL,
    parent_id TEXT REFERENCES cards(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cards_parent ON cards(parent_id);
CREATE INDEX IF NOT EXISTS idx_cards_type ON cards(card_type);
CREATE INDEX IF NOT EXISTS idx_cards_position ON cards(parent_id, position);

CREATE TABLE IF NOT EXISTS links (
    id TEXT PRIMARY KEY,
    card_a_id TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
    card_b_id TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
    link_type TEXT NOT NULL,
    created_from TEXT NOT NULL,
    metadata TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_links_card_a ON links(card_a_id);
CREATE INDEX IF NOT EXISTS idx_links_card_b ON links(card_b_id);
CREATE INDEX IF NOT EXISTS idx_links_type ON links(link_type);

CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const CARD_COLUMNS: &str =
    "id, title, content, card_type, metadata, parent_id, position, created_at, modified_at";
const LINK_COLUMNS: &str =
    "id, card_a_id, card_b_id, link_type, created_from, metadata, created_at";

/// Every materialized view, ordered by id, for equality checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub cards: Vec<Card>,
    pub links: Vec<Link>,
    pub config: ProjectConfig,
}

/// SQLite-backed storage engine.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create `bartleby.db` with full schema.
    pub fn open_or_create(db_path: &Path, busy_timeout_ms: u32) -> CoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.apply_pragmas(busy_timeout_ms)?;
        store.apply_schema()?;
        Ok(store)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> CoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.apply_pragmas(0)?;
        store.apply_schema()?;
        Ok(store)
    }

    fn apply_pragmas(&self, busy_timeout_ms: u32) -> CoreResult<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )?;
        self.conn
            .busy_timeout(Duration::from_millis(u64::from(busy_timeout_ms)))?;
        Ok(())
    }

    fn apply_schema(&self) -> CoreResult<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    pub fn schema_version(&self) -> CoreResult<u32> {
        let version: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.and_then(|v| v.parse().ok()).unwrap_or(SCHEMA_VERSION))
    }

    /// Run `f` inside a transaction; nested calls join the open one.
    ///
    /// Any error rolls back everything done inside the outermost call.
    pub fn with_tx<T>(&self, f: impl FnOnce(&Self) -> CoreResult<T>) -> CoreResult<T> {
        if !self.conn.is_autocommit() {
            return f(self);
        }
        let tx = self.conn.unchecked_transaction()?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Append an event. Append-only: events are never updated or deleted.
    pub fn append_event(&self, event: &Event) -> CoreResult<()> {
        let payload = serde_json::to_string(&event.payload_json()?)?;
        self.conn.execute(
            "INSERT INTO events (id, timestamp, type, payload) VALUES (?1, ?2, ?3, ?4)",
            params![event.id, event.timestamp, event.event_type(), payload],
        )?;
        Ok(())
    }

    /// Timestamp of the newest event, or `None` if the log is empty.
    pub fn last_event_timestamp(&self) -> CoreResult<Option<i64>> {
        let ts: Option<i64> = self
            .conn
            .query_row("SELECT MAX(timestamp) FROM events", [], |row| row.get(0))?;
        Ok(ts)
    }

    pub fn event_count(&self) -> CoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Events strictly newer than `timestamp`, oldest first, at most `limit`.
    pub fn read_since(&self, timestamp: i64, limit: usize) -> CoreResult<Vec<Event>> {
        self.query_events(
            "SELECT id, timestamp, type, payload FROM events
             WHERE timestamp > ?1 ORDER BY timestamp ASC, rowid ASC LIMIT ?2",
            params![timestamp, to_sql_limit(limit)],
        )
    }

    /// The whole log in append order.
    pub fn read_all(&self) -> CoreResult<Vec<Event>> {
        self.query_events(
            "SELECT id, timestamp, type, payload FROM events ORDER BY timestamp ASC, rowid ASC",
            [],
        )
    }

    /// Events of one type, newest first.
    pub fn read_by_type(&self, event_type: &str, limit: usize) -> CoreResult<Vec<Event>> {
        self.query_events(
            "SELECT id, timestamp, type, payload FROM events
             WHERE type = ?1 ORDER BY timestamp DESC, rowid DESC LIMIT ?2",
            params![event_type, to_sql_limit(limit)],
        )
    }

    fn query_events(&self, sql: &str, args: impl rusqlite::Params) -> CoreResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(EventRow {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    event_type: row.get(2)?,
                    payload_str: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_event).collect()
    }

    // ── Cards ───────────────────────────────────────────────────────

    pub fn get_card(&self, id: &str) -> CoreResult<Option<Card>> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id], map_card_row)
            .optional()?;
        row.map(row_to_card).transpose()
    }

    /// Cards matching `filter`, grouped by parent and ordered by position.
    pub fn list_cards(&self, filter: &CardFilter) -> CoreResult<Vec<Card>> {
        let mut sql = format!("SELECT {CARD_COLUMNS} FROM cards");
        let mut conditions: Vec<&str> = Vec::new();
        let mut args: Vec<String> = Vec::new();

        if let Some(card_type) = &filter.card_type {
            args.push(card_type.clone());
            conditions.push("card_type = ?");
        }
        match &filter.parent_id {
            Some(Some(parent)) => {
                args.push(parent.clone());
                conditions.push("parent_id = ?");
            }
            Some(None) => conditions.push("parent_id IS NULL"),
            None => {}
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY parent_id, position, created_at, id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), map_card_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_card).collect()
    }

    pub fn all_cards(&self) -> CoreResult<Vec<Card>> {
        self.list_cards(&CardFilter::default())
    }

    /// Highest position among cards sharing `parent` (roots when `None`).
    pub fn max_sibling_position(&self, parent: Option<&str>) -> CoreResult<Option<i64>> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(position) FROM cards WHERE parent_id IS ?1",
            params![parent],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    pub(crate) fn insert_card(&self, card: &Card) -> CoreResult<()> {
        let metadata = serde_json::to_string(&card.metadata)?;
        self.conn.execute(
            "INSERT INTO cards (id, title, content, card_type, metadata, parent_id,
                                position, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                card.id,
                card.title,
                card.content,
                card.card_type,
                metadata,
                card.parent_id,
                card.position,
                card.created_at,
                card.modified_at,
            ],
        )?;
        Ok(())
    }

    /// Patch present fields; always bumps `modified_at`.
    pub(crate) fn patch_card(
        &self,
        id: &str,
        changes: &bartleby_core::CardChanges,
        modified_at: i64,
    ) -> CoreResult<()> {
        let metadata = changes
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "UPDATE cards SET
                title = COALESCE(?1, title),
                content = COALESCE(?2, content),
                card_type = COALESCE(?3, card_type),
                metadata = COALESCE(?4, metadata),
                modified_at = ?5
             WHERE id = ?6",
            params![
                changes.title,
                changes.content,
                changes.card_type,
                metadata,
                modified_at,
                id
            ],
        )?;
        Ok(())
    }

    pub(crate) fn move_card_row(
        &self,
        id: &str,
        parent_id: Option<&str>,
        position: i64,
        modified_at: i64,
    ) -> CoreResult<()> {
        self.conn.execute(
            "UPDATE cards SET parent_id = ?1, position = ?2, modified_at = ?3 WHERE id = ?4",
            params![parent_id, position, modified_at, id],
        )?;
        Ok(())
    }

    /// Remove a card; descendants and incident links go with it via FK cascade.
    pub(crate) fn delete_card_row(&self, id: &str) -> CoreResult<()> {
        self.conn
            .execute("DELETE FROM cards WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ── Links ───────────────────────────────────────────────────────

    pub fn get_link(&self, id: &str) -> CoreResult<Option<Link>> {
        let sql = format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id], map_link_row)
            .optional()?;
        row.map(row_to_link).transpose()
    }

    /// Links matching `filter`, newest first.
    pub fn list_links(&self, filter: &LinkFilter) -> CoreResult<Vec<Link>> {
        let mut sql = format!("SELECT {LINK_COLUMNS} FROM links");
        let mut conditions: Vec<&str> = Vec::new();
        let mut args: Vec<String> = Vec::new();

        if let Some(card_id) = &filter.card_id {
            args.push(card_id.clone());
            args.push(card_id.clone());
            conditions.push("(card_a_id = ? OR card_b_id = ?)");
        }
        if let Some(link_type) = &filter.link_type {
            args.push(link_type.clone());
            conditions.push("link_type = ?");
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), map_link_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(row_to_link).collect()
    }

    pub fn all_links(&self) -> CoreResult<Vec<Link>> {
        self.list_links(&LinkFilter::default())
    }

    /// The link between two cards, in either direction.
    pub fn find_link_between(&self, card_x: &str, card_y: &str) -> CoreResult<Option<Link>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM links
             WHERE (card_a_id = ?1 AND card_b_id = ?2) OR (card_a_id = ?2 AND card_b_id = ?1)
             LIMIT 1"
        );
        let row = self
            .conn
            .query_row(&sql, params![card_x, card_y], map_link_row)
            .optional()?;
        row.map(row_to_link).transpose()
    }

    pub(crate) fn insert_link(&self, link: &Link) -> CoreResult<()> {
        let metadata = serde_json::to_string(&link.metadata)?;
        self.conn.execute(
            "INSERT INTO links (id, card_a_id, card_b_id, link_type, created_from,
                                metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                link.id,
                link.card_a_id,
                link.card_b_id,
                link.link_type,
                link.created_from.as_str(),
                metadata,
                link.created_at,
            ],
        )?;
        Ok(())
    }

    pub(crate) fn patch_link(&self, id: &str, changes: &LinkChanges) -> CoreResult<()> {
        let metadata = changes
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "UPDATE links SET
                link_type = COALESCE(?1, link_type),
                metadata = COALESCE(?2, metadata)
             WHERE id = ?3",
            params![changes.link_type, metadata, id],
        )?;
        Ok(())
    }

    pub(crate) fn delete_link_row(&self, id: &str) -> CoreResult<()> {
        self.conn
            .execute("DELETE FROM links WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ── Config ──────────────────────────────────────────────────────

    /// Assemble the config singleton from its per-key rows.
    pub fn get_config(&self) -> CoreResult<ProjectConfig> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM config ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut map = serde_json::Map::new();
        for (key, value) in rows {
            map.insert(key, serde_json::from_str(&value)?);
        }
        Ok(serde_json::from_value(serde_json::Value::Object(map))?)
    }

    pub(crate) fn upsert_config_entry(&self, key: &str, value: &serde_json::Value) -> CoreResult<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, serde_json::to_string(value)?],
        )?;
        Ok(())
    }

    // ── Views as a whole ────────────────────────────────────────────

    /// Empty every materialized view. The event log is untouched.
    pub(crate) fn clear_views(&self) -> CoreResult<()> {
        self.conn.execute_batch(
            "DELETE FROM links;
             DELETE FROM cards;
             DELETE FROM config;",
        )?;
        Ok(())
    }

    pub fn view_snapshot(&self) -> CoreResult<ViewSnapshot> {
        let mut cards = self.all_cards()?;
        cards.sort_by(|a, b| a.id.cmp(&b.id));
        let mut links = self.all_links()?;
        links.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(ViewSnapshot {
            cards,
            links,
            config: self.get_config()?,
        })
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        // Fold the WAL into bartleby.db so a closed workspace is one file.
        let _ = self
            .conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
    }
}

fn to_sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ── Internal helpers ────────────────────────────────────────────────

/// Intermediate row structs for deserialization.
struct EventRow {
    id: String,
    timestamp: i64,
    event_type: String,
    payload_str: String,
}

struct CardRow {
    id: String,
    title: String,
    content: String,
    card_type: String,
    metadata_str: String,
    parent_id: Option<String>,
    position: i64,
    created_at: i64,
    modified_at: i64,
}

struct LinkRow {
    id: String,
    card_a_id: String,
    card_b_id: String,
    link_type: String,
    created_from: String,
    metadata_str: String,
    created_at: i64,
}

fn row_to_event(row: EventRow) -> CoreResult<Event> {
    let payload: serde_json::Value = serde_json::from_str(&row.payload_str)?;
    Event::from_parts(row.id, row.timestamp, &row.event_type, payload)
}

fn map_card_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CardRow> {
    Ok(CardRow {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        card_type: row.get(3)?,
        metadata_str: row.get(4)?,
        parent_id: row.get(5)?,
        position: row.get(6)?,
        created_at: row.get(7)?,
        modified_at: row.get(8)?,
    })
}

fn row_to_card(row: CardRow) -> CoreResult<Card> {
    let metadata: MetaMap = serde_json::from_str(&row.metadata_str)?;
    Ok(Card {
        id: row.id,
        title: row.title,
        content: row.content,
        card_type: row.card_type,
        metadata,
        parent_id: row.parent_id,
        position: row.position,
        created_at: row.created_at,
        modified_at: row.modified_at,
    })
}

fn map_link_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LinkRow> {
    Ok(LinkRow {
        id: row.get(0)?,
        card_a_id: row.get(1)?,
        card_b_id: row.get(2)?,
        link_type: row.get(3)?,
        created_from: row.get(4)?,
        metadata_str: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_link(row: LinkRow) -> CoreResult<Link> {
    let metadata: MetaMap = serde_json::from_str(&row.metadata_str)?;
    let created_from: CreatedFrom = row
        .created_from
        .parse()
        .map_err(|e: CoreError| CoreError::Storage(e.to_string()))?;
    Ok(Link {
        id: row.id,
        card_a_id: row.card_a_id,
        card_b_id: row.card_b_id,
        link_type: row.link_type,
        created_from,
        metadata,
        created_at: row.created_at,
    })
}
