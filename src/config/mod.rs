use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// 应用配置（config.toml），计时器设置保存在数据库中
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 数据库路径，默认在用户数据目录
    pub db_path: Option<PathBuf>,
    pub notifications: bool,
    pub alarm_enabled: bool,
    pub log_level: String,
    /// 守护进程监听的本地 socket 名称
    pub socket_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            notifications: true,
            alarm_enabled: true,
            log_level: "info".to_string(),
            socket_name: "pomo-cycle.sock".to_string(),
        }
    }
}

impl AppConfig {
    /// 读取配置文件，文件不存在时使用默认配置
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => project_dirs()?.config_dir().join("config.toml"),
        };
        if !path.exists() {
            tracing::debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    /// 确定数据库路径：命令行 > 配置文件 > 数据目录
    pub fn resolve_db_path(&self, cli: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = cli.or_else(|| self.db_path.clone()) {
            return Ok(path);
        }
        Ok(data_dir()?.join("pomo.db"))
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "pomo-cycle", "pomo").context("Failed to get project directories")
}

/// 用户数据目录，不存在时创建
pub fn data_dir() -> Result<PathBuf> {
    let dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory {:?}", dir))?;
    Ok(dir)
}

/// 日志过滤：`--debug` > `RUST_LOG` > 配置文件中的 `log_level`
pub fn log_filter(debug: bool, level: &str) -> EnvFilter {
    if debug {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// 以追加方式打开 TUI 的日志文件
pub fn open_log_file(dir: &Path) -> Result<File> {
    let path = dir.join("pomo.log");
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {:?}", path))
}
