use anyhow::Result;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::models::settings::AppSettings;
use crate::models::tracker::Tracker;

const KEY_TRACKERS: &str = "trackers";
const KEY_TITLE: &str = "title";
const KEY_SUBTITLE: &str = "subtitle";
const KEY_API_KEY: &str = "api_key";

/// Local key-value store. The tracker list is persisted as one whole-document
/// JSON entry; title, subtitle and the API credential each get their own row.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join("price_tracker.db");
        let conn = Connection::open(db_path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(())
    }

    fn put(&self, key: &str, data: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, data, updated_at) VALUES (?1, ?2, datetime('now'))",
            rusqlite::params![key, data],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT data FROM kv_store WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(data) => Ok(Some(data)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ====== Trackers ======

    pub fn save_trackers(&self, trackers: &[Tracker]) -> Result<()> {
        let data = serde_json::to_string(trackers)?;
        self.put(KEY_TRACKERS, &data)
    }

    pub fn load_trackers(&self) -> Result<Vec<Tracker>> {
        match self.get(KEY_TRACKERS)? {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Ok(vec![]),
        }
    }

    // ====== Settings ======

    pub fn load_settings(&self) -> Result<AppSettings> {
        let defaults = AppSettings::default();
        Ok(AppSettings {
            title: self.get(KEY_TITLE)?.unwrap_or(defaults.title),
            subtitle: self.get(KEY_SUBTITLE)?.unwrap_or(defaults.subtitle),
            api_key: self.get(KEY_API_KEY)?.unwrap_or(defaults.api_key),
        })
    }

    pub fn save_title(&self, title: &str) -> Result<()> {
        self.put(KEY_TITLE, title)
    }

    pub fn save_subtitle(&self, subtitle: &str) -> Result<()> {
        self.put(KEY_SUBTITLE, subtitle)
    }

    pub fn save_api_key(&self, api_key: &str) -> Result<()> {
        self.put(KEY_API_KEY, api_key)
    }

    pub fn load_api_key(&self) -> Result<String> {
        Ok(self.get(KEY_API_KEY)?.unwrap_or_default())
    }
}
