use thiserror::Error;

/// 计时器核心的错误分类，均不致命
#[derive(Debug, Error)]
pub enum Error {
    /// 设置、日志、便签或例行任务的读写失败
    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    /// 当前环境不支持通知或声音
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// 设置值越界，已被截断到合法范围
    #[error("invalid setting `{field}`: {value} is outside {min}..={max}, clamped to {clamped}")]
    InvalidSetting {
        field: &'static str,
        value: i64,
        min: u32,
        max: u32,
        clamped: u32,
    },
}

/// 持久化层错误
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Rejected(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
