//! SQLite persistence: operator denylist, message templates, settings, and
//! the last-fetched destination snapshot.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use herald_core::types::{Destination, DestinationId, DestinationKind};

use crate::error::{BroadcastError, Result};

/// A stored, reusable message template.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub body: String,
    pub created_at: String,
}

/// Persistent operator state.
///
/// Wraps one `Connection` behind a mutex so CLI handlers and the broadcast
/// wiring can share it. All schema migration is idempotent.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // --- denylist ----------------------------------------------------------

    pub fn load_denylist(&self) -> Result<HashSet<DestinationId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id FROM denylist")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    pub fn save_denylist(&self, ids: &HashSet<DestinationId>) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM denylist", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO denylist (id) VALUES (?1)")?;
            for id in ids {
                stmt.execute([id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // --- destination snapshot ---------------------------------------------

    /// Replace the persisted snapshot with the given list.
    ///
    /// Callers treat failure as log-and-continue.
    pub fn persist_destinations(&self, destinations: &[Destination]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM destinations", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO destinations (id, title, kind, declared_cooldown, eligible, refreshed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for dest in destinations {
                stmt.execute(rusqlite::params![
                    dest.id,
                    dest.title,
                    dest.kind.to_string(),
                    dest.declared_cooldown_secs,
                    dest.eligible,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// The last persisted snapshot; denylist state is merged by the caller.
    pub fn load_destinations(&self) -> Result<Vec<Destination>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, kind, declared_cooldown, eligible FROM destinations ORDER BY title",
        )?;
        let list = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, bool>(4)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(id, title, kind, declared, eligible)| {
                let kind = DestinationKind::from_str(&kind).ok()?;
                Some(Destination {
                    id,
                    title,
                    kind,
                    declared_cooldown_secs: declared,
                    cooldown_remaining_secs: 0,
                    eligible,
                    excluded: false,
                })
            })
            .collect();
        Ok(list)
    }

    // --- templates ---------------------------------------------------------

    pub fn add_template(&self, body: &str) -> Result<Template> {
        let conn = self.conn.lock().unwrap();
        let template = Template {
            id: Uuid::new_v4().to_string(),
            body: body.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        conn.execute(
            "INSERT INTO templates (id, body, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![template.id, template.body, template.created_at],
        )?;
        Ok(template)
    }

    pub fn list_templates(&self) -> Result<Vec<Template>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, body, created_at FROM templates ORDER BY created_at")?;
        let templates = stmt
            .query_map([], |row| {
                Ok(Template {
                    id: row.get(0)?,
                    body: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(templates)
    }

    pub fn remove_template(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM templates WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(BroadcastError::TemplateNotFound { id: id.to_string() });
        }
        Ok(())
    }

    // --- settings ----------------------------------------------------------

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        let mut rows = stmt.query_map([key], |row| row.get::<_, String>(0))?;
        Ok(rows.next().transpose()?)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }
}

/// Initialise the schema in `conn` (idempotent).
fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS denylist (
            id          INTEGER NOT NULL PRIMARY KEY
        ) STRICT;

        CREATE TABLE IF NOT EXISTS templates (
            id          TEXT    NOT NULL PRIMARY KEY,
            body        TEXT    NOT NULL,
            created_at  TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS settings (
            key         TEXT    NOT NULL PRIMARY KEY,
            value       TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS destinations (
            id                 INTEGER NOT NULL PRIMARY KEY,
            title              TEXT    NOT NULL,
            kind               TEXT    NOT NULL,
            declared_cooldown  INTEGER NOT NULL DEFAULT 0,
            eligible           INTEGER NOT NULL DEFAULT 1,
            refreshed_at       TEXT    NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylist_roundtrips() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_denylist().unwrap().is_empty());

        let ids: HashSet<DestinationId> = [-100123, 42].into_iter().collect();
        store.save_denylist(&ids).unwrap();
        assert_eq!(store.load_denylist().unwrap(), ids);

        store.save_denylist(&HashSet::new()).unwrap();
        assert!(store.load_denylist().unwrap().is_empty());
    }

    #[test]
    fn destination_snapshot_roundtrips() {
        let store = Store::open_in_memory().unwrap();
        let dest = Destination {
            id: -10042,
            title: "rustaceans".into(),
            kind: DestinationKind::Broadcast,
            declared_cooldown_secs: 30,
            cooldown_remaining_secs: 12,
            eligible: true,
            excluded: true,
        };
        store.persist_destinations(std::slice::from_ref(&dest)).unwrap();

        let loaded = store.load_destinations().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, dest.id);
        assert_eq!(loaded[0].kind, DestinationKind::Broadcast);
        assert_eq!(loaded[0].declared_cooldown_secs, 30);
        // Run-time state is not persisted.
        assert_eq!(loaded[0].cooldown_remaining_secs, 0);
        assert!(!loaded[0].excluded);
    }

    #[test]
    fn templates_crud() {
        let store = Store::open_in_memory().unwrap();
        let t = store.add_template("{Hi|Hello} all").unwrap();
        assert_eq!(store.list_templates().unwrap().len(), 1);

        store.remove_template(&t.id).unwrap();
        assert!(store.list_templates().unwrap().is_empty());
        assert!(matches!(
            store.remove_template(&t.id),
            Err(BroadcastError::TemplateNotFound { .. })
        ));
    }

    #[test]
    fn settings_upsert() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get_setting("identity").unwrap(), None);

        store.set_setting("identity", "alpha").unwrap();
        store.set_setting("identity", "beta").unwrap();
        assert_eq!(store.get_setting("identity").unwrap().as_deref(), Some("beta"));
    }
}
