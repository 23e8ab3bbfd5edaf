use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::PersistenceError;
use crate::models::{Memo, Routine, SessionLog, Settings};
use crate::pomodoro::{LogStore, SettingsStore};

type Result<T> = std::result::Result<T, PersistenceError>;

/// 设置在 settings 表中的键
const SETTINGS_KEY: &str = "timer";

pub struct Database {
    conn: Connection,
}

impl Database {
    /// 打开或创建数据库
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// 初始化数据库schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS session_logs (
                id INTEGER PRIMARY KEY,
                task_label TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL,
                cycle INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS memos (
                id INTEGER PRIMARY KEY,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS routines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                weekday INTEGER NOT NULL CHECK (weekday BETWEEN 0 AND 6),
                text TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_session_logs_started_at ON session_logs(started_at);
            CREATE INDEX IF NOT EXISTS idx_routines_weekday ON routines(weekday);
            "#,
        )?;
        Ok(())
    }

    // ==================== Settings ====================

    /// 读取设置，缺失或损坏时返回默认值
    pub fn get_settings(&self) -> Result<Settings> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![SETTINGS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match raw {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Stored settings are corrupt, using defaults: {}", e);
                Settings::default()
            }),
            None => Settings::default(),
        })
    }

    pub fn put_settings(&self, settings: &Settings) -> Result<()> {
        let raw = serde_json::to_string(settings)?;
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![SETTINGS_KEY, raw],
        )?;
        Ok(())
    }

    // ==================== Session Logs ====================

    /// 按开始时间获取所有专注记录
    pub fn get_all_logs(&self) -> Result<Vec<SessionLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_label, started_at, ended_at, duration_seconds, cycle
             FROM session_logs
             ORDER BY id ASC",
        )?;

        let logs = stmt
            .query_map([], |row| {
                Ok(SessionLog {
                    id: row.get(0)?,
                    task_label: row.get(1)?,
                    started_at: row.get(2)?,
                    ended_at: row.get(3)?,
                    duration_seconds: row.get(4)?,
                    cycle: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(logs)
    }

    pub fn insert_log(&self, log: &SessionLog) -> Result<()> {
        self.conn.execute(
            "INSERT INTO session_logs (id, task_label, started_at, ended_at, duration_seconds, cycle)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                log.id,
                log.task_label,
                log.started_at,
                log.ended_at,
                log.duration_seconds,
                log.cycle,
            ],
        )?;
        Ok(())
    }

    /// 整体替换专注记录
    pub fn replace_all_logs(&self, logs: &[SessionLog]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM session_logs", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO session_logs (id, task_label, started_at, ended_at, duration_seconds, cycle)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for log in logs {
                stmt.execute(params![
                    log.id,
                    log.task_label,
                    log.started_at,
                    log.ended_at,
                    log.duration_seconds,
                    log.cycle,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ==================== Memos ====================

    /// 创建便签
    pub fn create_memo(&self, memo: &Memo) -> Result<()> {
        self.conn.execute(
            "INSERT INTO memos (id, text, created_at) VALUES (?1, ?2, ?3)",
            params![memo.id, memo.text, memo.created_at],
        )?;
        Ok(())
    }

    pub fn get_all_memos(&self) -> Result<Vec<Memo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, text, created_at FROM memos ORDER BY id ASC")?;

        let memos = stmt
            .query_map([], |row| {
                Ok(Memo {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(memos)
    }

    /// 删除便签，返回是否存在
    pub fn delete_memo(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM memos WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn clear_memos(&self) -> Result<()> {
        self.conn.execute("DELETE FROM memos", [])?;
        Ok(())
    }

    // ==================== Routines ====================

    pub fn create_routine(&self, routine: &Routine) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO routines (weekday, text) VALUES (?1, ?2)",
            params![routine.weekday, routine.text],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 获取例行任务，可按星期过滤
    pub fn get_routines(&self, weekday: Option<u8>) -> Result<Vec<Routine>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, weekday, text FROM routines
             WHERE ?1 IS NULL OR weekday = ?1
             ORDER BY weekday ASC, id ASC",
        )?;

        let routines = stmt
            .query_map(params![weekday], |row| {
                Ok(Routine {
                    id: Some(row.get(0)?),
                    weekday: row.get(1)?,
                    text: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(routines)
    }

    pub fn delete_routine(&self, id: i64) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM routines WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }
}

impl SettingsStore for Database {
    fn load_settings(&self) -> Result<Settings> {
        self.get_settings()
    }

    fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.put_settings(settings)
    }
}

impl LogStore for Database {
    fn load_logs(&self) -> Result<Vec<SessionLog>> {
        self.get_all_logs()
    }

    fn append_log(&self, log: &SessionLog) -> Result<()> {
        self.insert_log(log)
    }

    fn replace_logs(&self, logs: &[SessionLog]) -> Result<()> {
        self.replace_all_logs(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Theme;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("pomo.db")).unwrap();
        (dir, db)
    }

    fn log(id: i64, label: &str) -> SessionLog {
        let ended_at = Utc.with_ymd_and_hms(2024, 5, 6, 10, 25, 0).unwrap();
        SessionLog {
            id,
            task_label: label.to_string(),
            started_at: ended_at - Duration::minutes(25),
            ended_at,
            duration_seconds: 1500,
            cycle: 2,
        }
    }

    #[test]
    fn settings_default_until_saved() {
        let (_dir, db) = open_temp();
        assert_eq!(db.load_settings().unwrap(), Settings::default());

        let settings = Settings {
            focus_minutes: 50,
            theme: Theme::Forest,
            auto_start_next_cycle: true,
            ..Settings::default()
        };
        db.save_settings(&settings).unwrap();
        db.save_settings(&settings).unwrap();
        assert_eq!(db.load_settings().unwrap(), settings);
    }

    #[test]
    fn corrupt_settings_fall_back_to_defaults() {
        let (_dir, db) = open_temp();
        db.conn
            .execute(
                "INSERT INTO settings (key, value) VALUES (?1, 'not json')",
                params![SETTINGS_KEY],
            )
            .unwrap();
        assert_eq!(db.load_settings().unwrap(), Settings::default());
    }

    #[test]
    fn logs_round_trip_and_replace() {
        let (_dir, db) = open_temp();
        db.append_log(&log(2, "b")).unwrap();
        db.append_log(&log(1, "a")).unwrap();

        let logs = db.load_logs().unwrap();
        assert_eq!(logs, vec![log(1, "a"), log(2, "b")]);

        // 重复 id 被拒绝
        assert!(db.append_log(&log(1, "dup")).is_err());

        db.replace_logs(&[log(7, "kept")]).unwrap();
        assert_eq!(db.load_logs().unwrap(), vec![log(7, "kept")]);
        db.replace_logs(&[]).unwrap();
        assert!(db.load_logs().unwrap().is_empty());
    }

    #[test]
    fn memos_crud() {
        let (_dir, db) = open_temp();
        let first = Memo {
            id: 10,
            text: "call back Sam".into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
        };
        let second = Memo {
            id: 11,
            text: "buy milk".into(),
            ..first.clone()
        };
        db.create_memo(&first).unwrap();
        db.create_memo(&second).unwrap();
        assert_eq!(db.get_all_memos().unwrap(), vec![first.clone(), second]);

        assert!(db.delete_memo(11).unwrap());
        assert!(!db.delete_memo(11).unwrap());
        assert_eq!(db.get_all_memos().unwrap(), vec![first]);

        db.clear_memos().unwrap();
        assert!(db.get_all_memos().unwrap().is_empty());
    }

    #[test]
    fn routines_filter_by_weekday() {
        let (_dir, db) = open_temp();
        let gym = db.create_routine(&Routine::new(1, "gym".into())).unwrap();
        db.create_routine(&Routine::new(3, "piano".into())).unwrap();
        db.create_routine(&Routine::new(1, "laundry".into())).unwrap();

        let monday: Vec<String> = db
            .get_routines(Some(1))
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(monday, vec!["gym", "laundry"]);
        assert_eq!(db.get_routines(None).unwrap().len(), 3);

        assert!(db.delete_routine(gym).unwrap());
        assert_eq!(db.get_routines(Some(1)).unwrap().len(), 1);
        assert!(db.create_routine(&Routine::new(9, "bad".into())).is_err());
    }
}
