//! 引擎与外部协作者之间的接口

use serde::{Deserialize, Serialize};

use crate::error::{Error, PersistenceError};
use crate::models::{AlarmSound, SessionLog, Settings};

/// 设置的读写
pub trait SettingsStore {
    /// 没有保存过或内容损坏时返回默认设置
    fn load_settings(&self) -> Result<Settings, PersistenceError>;
    fn save_settings(&self, settings: &Settings) -> Result<(), PersistenceError>;
}

/// 专注记录的读写
pub trait LogStore {
    fn load_logs(&self) -> Result<Vec<SessionLog>, PersistenceError>;
    fn append_log(&self, log: &SessionLog) -> Result<(), PersistenceError>;
    fn replace_logs(&self, logs: &[SessionLog]) -> Result<(), PersistenceError>;
}

/// 引擎持有的存储，同时负责设置和日志
pub trait Storage: SettingsStore + LogStore + Send {}

impl<T: SettingsStore + LogStore + Send> Storage for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    FocusEnded,
    BreakEnded,
}

/// 桌面通知，失败时由引擎忽略
pub trait Notifier: Send {
    fn notify(&self, kind: NotificationKind) -> Result<(), Error>;
}

/// 提示音，失败时由引擎忽略
pub trait AlarmPlayer: Send {
    fn play(&self, sound: AlarmSound) -> Result<(), Error>;
}

/// 不做任何事的协作者，用于关闭通知或声音
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Notifier for Silent {
    fn notify(&self, _kind: NotificationKind) -> Result<(), Error> {
        Ok(())
    }
}

impl AlarmPlayer for Silent {
    fn play(&self, _sound: AlarmSound) -> Result<(), Error> {
        Ok(())
    }
}
