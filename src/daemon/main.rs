use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;

// 引用主crate的模块（通过路径）
#[path = "../config/mod.rs"]
mod config;
#[path = "../db/mod.rs"]
mod db;
#[path = "../error.rs"]
mod error;
#[path = "../ipc/mod.rs"]
mod ipc;
#[path = "../models/mod.rs"]
mod models;
#[path = "../notify/mod.rs"]
mod notify;
#[path = "../pomodoro/mod.rs"]
mod pomodoro;

use config::AppConfig;
use db::Database;
use notify::{NotificationManager, TerminalBell};
use pomodoro::traits::Silent;
use pomodoro::{AlarmPlayer, Command, Driver, DriverHandle, Engine, Notifier, Phase, Snapshot};

// 守护进程结构
pub struct Daemon {
    handle: DriverHandle,
    driver: tokio::task::JoinHandle<Engine>,
    socket_name: String,
}

impl Daemon {
    pub fn new(config: &AppConfig, db_path: PathBuf) -> Result<Self> {
        let db = Database::open(&db_path)?;
        tracing::info!("Using database {:?}", db_path);

        let notifier: Box<dyn Notifier> = if config.notifications {
            Box::new(NotificationManager::new())
        } else {
            Box::new(Silent)
        };
        let alarm: Box<dyn AlarmPlayer> = if config.alarm_enabled {
            Box::new(TerminalBell)
        } else {
            Box::new(Silent)
        };

        let engine = Engine::new(Box::new(db), notifier, alarm);
        let (handle, driver) = Driver::spawn(engine);
        Ok(Self {
            handle,
            driver,
            socket_name: config.socket_name.clone(),
        })
    }

    pub fn handle(&self) -> &DriverHandle {
        &self.handle
    }

    /// 运行守护进程，直到收到 Ctrl-C 或监听失败
    pub async fn run(self) -> Result<()> {
        tracing::info!("Pomodoro daemon started");

        tokio::spawn(log_phase_changes(self.handle.subscribe()));
        let server = ipc::serve(&self.socket_name, self.handle.clone());

        let result = tokio::select! {
            res = server => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down");
                Ok(())
            }
        };

        self.handle.send(Command::Shutdown).await.ok();
        let engine = self.driver.await?;
        tracing::info!(
            sessions = engine.logs().len(),
            "Pomodoro daemon stopped"
        );
        result
    }
}

/// 阶段变化时写一条日志
async fn log_phase_changes(mut snapshots: watch::Receiver<Snapshot>) {
    let mut last: Phase = snapshots.borrow().phase;
    while snapshots.changed().await.is_ok() {
        let snap = snapshots.borrow_and_update().clone();
        if snap.phase != last {
            tracing::info!(
                from = last.label(),
                to = snap.phase.label(),
                cycle = snap.current_cycle,
                "phase changed"
            );
            last = snap.phase;
        }
    }
}

#[derive(Parser)]
#[command(name = "pomod")]
#[command(about = "Pomodoro timer daemon", long_about = None)]
struct Cli {
    /// Database path
    #[arg(short, long)]
    db_path: Option<PathBuf>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Label for the first focus session
    #[arg(short, long)]
    task: Option<String>,

    /// Start focusing right away
    #[arg(long)]
    start: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(config::log_filter(cli.debug, &config.log_level))
        .init();

    let db_path = config.resolve_db_path(cli.db_path)?;
    let daemon = Daemon::new(&config, db_path)?;

    if let Some(label) = cli.task {
        daemon.handle().send(Command::SetTask(label)).await?;
    }
    if cli.start {
        daemon.handle().send(Command::Start).await?;
    }

    daemon.run().await
}
