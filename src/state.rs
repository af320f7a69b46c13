//! Per-user dialogue persistence. Keeps the current `(step, data)` pair in a
//! `user_state` table and appends completed calculations to a `log` table.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;
use tracing::info;

use crate::dialogue::{DialogueData, FIRST_STEP};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS user_state (
    tg_user_id INTEGER PRIMARY KEY,
    step       INTEGER NOT NULL,
    data       TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    tg_user_id   INTEGER NOT NULL,
    wrist_cm     REAL,
    wraps        INTEGER,
    pattern      TEXT,
    magnet_mm    REAL,
    tolerance_mm REAL,
    result_text  TEXT NOT NULL,
    created_at   TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("state encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Dialogue position of one user.
#[derive(Clone, Debug, PartialEq)]
pub struct UserState {
    pub step: u8,
    pub data: DialogueData,
}

/// SQLite-backed store. rusqlite connections are not `Sync`, so the connection
/// sits behind a mutex; contention is negligible at questionnaire pace.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!("state database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Starts the dialogue over: drops any previous state and records step 1 with
    /// empty data.
    pub fn init_state(&self, user_id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM user_state WHERE tg_user_id = ?1", [user_id])?;
        conn.execute(
            "INSERT INTO user_state (tg_user_id, step, data) VALUES (?1, ?2, ?3)",
            (user_id, FIRST_STEP, serde_json::to_string(&DialogueData::default())?),
        )?;
        Ok(())
    }

    /// Returns the user's dialogue position, or `None` when no dialogue is active.
    pub fn get_state(&self, user_id: i64) -> Result<Option<UserState>, StoreError> {
        let conn = self.conn.lock();
        let row: Option<(u8, String)> = conn
            .query_row(
                "SELECT step, data FROM user_state WHERE tg_user_id = ?1",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((step, data)) => Ok(Some(UserState {
                step,
                data: serde_json::from_str(&data)?,
            })),
        }
    }

    /// Records the step the user should answer next, with the data gathered so far.
    pub fn save_state(&self, user_id: i64, step: u8, data: &DialogueData) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE user_state SET step = ?1, data = ?2, updated_at = CURRENT_TIMESTAMP \
             WHERE tg_user_id = ?3",
            (step, serde_json::to_string(data)?, user_id),
        )?;
        Ok(())
    }

    /// Appends the finished calculation to the log and clears the dialogue state.
    pub fn save_result(
        &self,
        user_id: i64,
        data: &DialogueData,
        result_text: &str,
    ) -> Result<(), StoreError> {
        {
            let conn = self.conn.lock();
            let pattern = data
                .pattern
                .as_ref()
                .map(|pattern| serde_json::to_string(pattern))
                .transpose()?;
            conn.execute(
                "INSERT INTO log (tg_user_id, wrist_cm, wraps, pattern, magnet_mm, tolerance_mm, \
                 result_text) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    user_id,
                    data.wrist_cm,
                    data.wraps,
                    pattern,
                    data.magnet_mm,
                    data.tolerance_mm,
                    result_text,
                ),
            )?;
        }
        self.clear_state(user_id)
    }

    /// Drops the user's dialogue state without logging a result.
    pub fn clear_state(&self, user_id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM user_state WHERE tg_user_id = ?1", [user_id])?;
        Ok(())
    }

    #[cfg(test)]
    fn logged_results(&self, user_id: i64) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT result_text FROM log WHERE tg_user_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map([user_id], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: i64 = 42;

    #[test]
    fn absent_state() {
        let store = StateStore::in_memory().unwrap();
        assert_eq!(None, store.get_state(USER).unwrap());
    }

    #[test]
    fn init_resets_to_first_step() {
        let store = StateStore::in_memory().unwrap();
        store.init_state(USER).unwrap();
        let state = store.get_state(USER).unwrap().unwrap();
        assert_eq!(FIRST_STEP, state.step);
        assert_eq!(DialogueData::default(), state.data);

        // A second /start must discard accumulated data.
        let data = DialogueData {
            wrist_cm: Some(15.0),
            ..DialogueData::default()
        };
        store.save_state(USER, 2, &data).unwrap();
        store.init_state(USER).unwrap();
        let state = store.get_state(USER).unwrap().unwrap();
        assert_eq!(FIRST_STEP, state.step);
        assert_eq!(DialogueData::default(), state.data);
    }

    #[test]
    fn save_and_reload() {
        let store = StateStore::in_memory().unwrap();
        store.init_state(USER).unwrap();
        let data = DialogueData {
            wrist_cm: Some(15.5),
            wraps: Some(2),
            pattern: Some(vec![10.0, 8.0]),
            magnet_mm: None,
            tolerance_mm: None,
        };
        store.save_state(USER, 4, &data).unwrap();
        let state = store.get_state(USER).unwrap().unwrap();
        assert_eq!(4, state.step);
        assert_eq!(data, state.data);
    }

    #[test]
    fn result_logs_and_clears() {
        let store = StateStore::in_memory().unwrap();
        store.init_state(USER).unwrap();
        let data = DialogueData {
            wrist_cm: Some(15.0),
            wraps: Some(1),
            pattern: Some(vec![10.0, 8.0]),
            magnet_mm: Some(10.0),
            tolerance_mm: Some(5.0),
        };
        store.save_result(USER, &data, "result").unwrap();
        assert_eq!(None, store.get_state(USER).unwrap());
        assert_eq!(vec!["result".to_string()], store.logged_results(USER).unwrap());
    }

    #[test]
    fn states_are_per_user() {
        let store = StateStore::in_memory().unwrap();
        store.init_state(USER).unwrap();
        assert_eq!(None, store.get_state(USER + 1).unwrap());
        store.clear_state(USER + 1).unwrap();
        assert!(store.get_state(USER).unwrap().is_some());
    }
}
