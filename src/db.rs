use crate::entities::{Category, CategoryKind, NewStatistic, Statistic};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Event for the audit trail: every import and bulk clear is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; in-memory databases stay on "memory"
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Category tables (one per taxonomy, name is the natural key)
    // ==========================================================================
    for kind in CategoryKind::ALL {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT UNIQUE NOT NULL,
                    is_aggregate INTEGER NOT NULL DEFAULT 0
                )",
                kind.table()
            ),
            [],
        )
        .with_context(|| format!("Failed to create {} table", kind.table()))?;
    }

    // ==========================================================================
    // Fact table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS demographic_statistics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            year INTEGER NOT NULL CHECK (year > 0),
            age_group_id INTEGER NOT NULL REFERENCES age_groups(id) ON DELETE CASCADE,
            sex_id INTEGER NOT NULL REFERENCES sexes(id) ON DELETE CASCADE,
            hd_index_id INTEGER NOT NULL REFERENCES hd_indices(id) ON DELETE CASCADE,
            value INTEGER NOT NULL CHECK (value >= 0),
            CONSTRAINT unique_demographic_statistic
                UNIQUE (year, age_group_id, sex_id, hd_index_id)
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_stat_year ON demographic_statistics(year);
         CREATE INDEX IF NOT EXISTS idx_stat_year_age ON demographic_statistics(year, age_group_id);
         CREATE INDEX IF NOT EXISTS idx_stat_year_sex ON demographic_statistics(year, sex_id);
         CREATE INDEX IF NOT EXISTS idx_stat_year_hdi ON demographic_statistics(year, hd_index_id);
         CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
         CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);",
    )?;

    Ok(())
}

/// Open (or create) a database file and make sure the schema exists
pub fn open_database(path: &std::path::Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

// ============================================================================
// REPOSITORY
// ============================================================================

/// Whether an upsert inserted a new row or overwrote an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Storage seam used by the importer. Category get-or-create is one atomic
/// statement against the store, never a process-wide lookup table.
pub trait DemographicsRepository {
    /// Look up a category by name, creating it if missing. A new category is
    /// flagged aggregate only when its name is the taxonomy's total label.
    fn get_or_create_category(&self, kind: CategoryKind, name: &str) -> Result<Category>;

    fn find_category(&self, kind: CategoryKind, name: &str) -> Result<Option<Category>>;

    /// Insert or overwrite the value for the statistic's unique key
    fn upsert_statistic(&self, stat: &NewStatistic) -> Result<UpsertOutcome>;
}

/// SQLite implementation over any connection, transaction or savepoint
pub struct SqliteRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SqliteRepository { conn }
    }
}

impl DemographicsRepository for SqliteRepository<'_> {
    fn get_or_create_category(&self, kind: CategoryKind, name: &str) -> Result<Category> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (name, is_aggregate) VALUES (?1, ?2)
                     ON CONFLICT(name) DO NOTHING",
                    kind.table()
                ),
                params![name, kind.is_aggregate_label(name)],
            )
            .with_context(|| format!("Failed to create {} '{}'", kind, name))?;

        self.find_category(kind, name)?
            .with_context(|| format!("{} '{}' missing after insert", kind, name))
    }

    fn find_category(&self, kind: CategoryKind, name: &str) -> Result<Option<Category>> {
        find_category(self.conn, kind, name)
    }

    fn upsert_statistic(&self, stat: &NewStatistic) -> Result<UpsertOutcome> {
        let (year, age_group_id, sex_id, hd_index_id) = stat.key();

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM demographic_statistics
                 WHERE year = ?1 AND age_group_id = ?2 AND sex_id = ?3 AND hd_index_id = ?4",
                params![year, age_group_id, sex_id, hd_index_id],
                |row| row.get(0),
            )
            .optional()?;

        self.conn.execute(
            "INSERT INTO demographic_statistics (year, age_group_id, sex_id, hd_index_id, value)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(year, age_group_id, sex_id, hd_index_id)
             DO UPDATE SET value = excluded.value",
            params![year, age_group_id, sex_id, hd_index_id, stat.value()],
        )?;

        Ok(match existing {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        })
    }
}

// ============================================================================
// CATEGORY QUERIES
// ============================================================================

pub fn find_category(conn: &Connection, kind: CategoryKind, name: &str) -> Result<Option<Category>> {
    let category = conn
        .query_row(
            &format!("SELECT id, name, is_aggregate FROM {} WHERE name = ?1", kind.table()),
            [name],
            |row| Ok(Category::new(row.get(0)?, kind, row.get::<_, String>(1)?, row.get(2)?)),
        )
        .optional()
        .with_context(|| format!("Failed to look up {} '{}'", kind, name))?;

    Ok(category)
}

/// All categories of one taxonomy, by name
pub fn list_categories(conn: &Connection, kind: CategoryKind) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, is_aggregate FROM {} ORDER BY name",
        kind.table()
    ))?;

    let categories = stmt
        .query_map([], |row| {
            Ok(Category::new(row.get(0)?, kind, row.get::<_, String>(1)?, row.get(2)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}

pub fn count_categories(conn: &Connection, kind: CategoryKind) -> Result<i64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", kind.table()), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

// ============================================================================
// STATISTIC QUERIES
// ============================================================================

/// SELECT list + joins shared by every statistic read; pair with `statistic_from_row`
pub(crate) const STATISTIC_SELECT: &str = "SELECT s.id, s.year, s.value,
        a.id, a.name, a.is_aggregate,
        x.id, x.name, x.is_aggregate,
        h.id, h.name, h.is_aggregate
     FROM demographic_statistics s
     JOIN age_groups a ON a.id = s.age_group_id
     JOIN sexes x ON x.id = s.sex_id
     JOIN hd_indices h ON h.id = s.hd_index_id";

pub(crate) fn statistic_from_row(row: &Row<'_>) -> rusqlite::Result<Statistic> {
    Ok(Statistic {
        id: row.get(0)?,
        year: row.get(1)?,
        value: row.get(2)?,
        age_group: Category::new(row.get(3)?, CategoryKind::AgeGroup, row.get::<_, String>(4)?, row.get(5)?),
        sex: Category::new(row.get(6)?, CategoryKind::Sex, row.get::<_, String>(7)?, row.get(8)?),
        hd_index: Category::new(row.get(9)?, CategoryKind::HdIndex, row.get::<_, String>(10)?, row.get(11)?),
    })
}

pub fn count_statistics(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM demographic_statistics", [], |row| {
        row.get(0)
    })?;

    Ok(count)
}

/// Bulk clear: delete every statistic (categories are kept) and log the event
pub fn clear_statistics(conn: &Connection, actor: &str) -> Result<usize> {
    let removed = conn
        .execute("DELETE FROM demographic_statistics", [])
        .context("Failed to clear statistics")?;

    let event = Event::new(
        "statistics_cleared",
        "demographic_statistics",
        "all",
        serde_json::json!({ "removed": removed }),
        actor,
    );
    insert_event(conn, &event)?;

    log::info!("Cleared {} statistics", removed);
    Ok(removed)
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(event_id, timestamp, event_type, entity_type, entity_id, data, actor)| {
            Ok(Event {
                event_id,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .with_context(|| format!("Bad event timestamp: {}", timestamp))?
                    .with_timezone(&Utc),
                event_type,
                entity_type,
                entity_id,
                data: serde_json::from_str(&data).context("Bad event payload")?,
                actor,
            })
        })
        .collect()
}

/// Events of one type, newest first
pub fn get_events_by_type(conn: &Connection, event_type: &str) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT entity_type, entity_id FROM events WHERE event_type = ?1
         GROUP BY entity_type, entity_id",
    )?;
    let entities = stmt
        .query_map([event_type], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut events = Vec::new();
    for (entity_type, entity_id) in entities {
        events.extend(
            get_events_for_entity(conn, &entity_type, &entity_id)?
                .into_iter()
                .filter(|e| e.event_type == event_type),
        );
    }
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(events)
}
