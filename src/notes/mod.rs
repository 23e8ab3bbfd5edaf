// 便签与每周例行任务
// 存储在 db 层，这里负责输入校验和查询辅助

use chrono::{Datelike, Local};

use crate::db::Database;
use crate::error::PersistenceError;
use crate::models::{Memo, Routine};

/// 星期名称，0 = 周日
pub const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// 便签管理器
pub struct MemoManager;

impl MemoManager {
    pub fn new() -> Self {
        Self
    }

    /// 添加便签，内容会去掉首尾空白
    pub fn add(&self, db: &Database, text: &str) -> Result<Memo, PersistenceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PersistenceError::Rejected("memo text is empty".into()));
        }
        let mut memo = Memo::new(text.to_string());
        // 同一毫秒内连续添加时避免 id 冲突
        if let Some(last) = db.get_all_memos()?.last() {
            memo.id = memo.id.max(last.id + 1);
        }
        db.create_memo(&memo)?;
        Ok(memo)
    }

    /// 搜索便签
    pub fn search(&self, memos: &[Memo], query: &str) -> Vec<Memo> {
        let query_lower = query.to_lowercase();
        memos
            .iter()
            .filter(|memo| memo.text.to_lowercase().contains(&query_lower))
            .cloned()
            .collect()
    }
}

impl Default for MemoManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 今天是星期几（本地时间）
pub fn today_weekday() -> u8 {
    Local::now().weekday().num_days_from_sunday() as u8
}

/// 解析 0-6 或 sun/mon/... 形式的星期
pub fn parse_weekday(s: &str) -> Option<u8> {
    let s = s.trim();
    if let Ok(n) = s.parse::<u8>() {
        return (n < 7).then_some(n);
    }
    let prefix = s.get(..3)?;
    WEEKDAYS
        .iter()
        .position(|name| name.eq_ignore_ascii_case(prefix))
        .map(|i| i as u8)
}

pub fn add_routine(db: &Database, weekday: u8, text: &str) -> Result<Routine, PersistenceError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PersistenceError::Rejected("routine text is empty".into()));
    }
    if weekday > 6 {
        return Err(PersistenceError::Rejected(format!("no such weekday: {}", weekday)));
    }
    let mut routine = Routine::new(weekday, text.to_string());
    routine.id = Some(db.create_routine(&routine)?);
    Ok(routine)
}

pub fn today_routines(db: &Database) -> Result<Vec<Routine>, PersistenceError> {
    db.get_routines(Some(today_weekday()))
}
