use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Mutex;

mod config;
mod db;
mod error;
mod ipc;
mod models;
mod notes;
mod notify;
mod pomodoro;
mod stats;
mod ui;

use config::AppConfig;
use db::Database;
use ipc::{Request, Response};
use models::{AlarmSound, Settings, Theme};
use notes::{MemoManager, WEEKDAYS};
use pomodoro::{AlarmPlayer, Driver, Engine, Notifier, Snapshot};

#[derive(Parser)]
#[command(name = "pomo")]
#[command(about = "Terminal pomodoro timer with session log, memos and routines", long_about = None)]
struct Cli {
    /// Database path (defaults to user data directory)
    #[arg(short, long)]
    db_path: Option<PathBuf>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the TUI interface
    Show,

    /// Start or resume the daemon's timer
    Start,

    /// Pause the daemon's timer
    Pause,

    /// Reset the daemon's timer to idle
    Reset,

    /// Skip the current break and start focusing
    Skip,

    /// Show the daemon's timer
    Status,

    /// Set the label of the current focus session
    Task {
        /// Task label (empty clears it)
        #[arg(default_value = "")]
        label: String,
    },

    /// Show or change timer settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Completed focus sessions
    Log {
        #[command(subcommand)]
        action: Option<LogAction>,
    },

    /// Focus time today and this week
    Stats,

    /// Quick memos
    Memo {
        #[command(subcommand)]
        action: MemoAction,
    },

    /// Weekday routines
    Routine {
        #[command(subcommand)]
        action: RoutineAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print current settings
    Show,
    /// Change one setting: focus, short, long, cycles, auto, alarm, theme
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum LogAction {
    /// List completed sessions
    List,
    /// Delete all sessions
    Clear,
}

#[derive(Subcommand)]
enum MemoAction {
    /// Add a memo
    Add { text: String },
    /// List memos
    List,
    /// Remove a memo
    Remove { id: i64 },
    /// Remove all memos
    Clear,
    /// Search memos
    Search { query: String },
}

#[derive(Subcommand)]
enum RoutineAction {
    /// Add a routine for a weekday (sun, mon, ... sat)
    Add { weekday: String, text: String },
    /// List routines
    List {
        /// Only this weekday
        weekday: Option<String>,
    },
    /// Remove a routine
    Remove { id: i64 },
    /// Routines for today
    Today,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    let filter = config::log_filter(cli.debug, &config.log_level);
    let db_path = config.resolve_db_path(cli.db_path.clone())?;

    match cli.command {
        Some(Commands::Show) | None => {
            // TUI 占用终端，日志写到文件
            let log_file = config::open_log_file(&config::data_dir()?)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(log_file))
                .with_ansi(false)
                .init();
            run_tui(&config, db_path).await?;
        }
        Some(command) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            run_command(command, &config, db_path).await?;
        }
    }

    Ok(())
}

/// 在进程内运行计时驱动并启动TUI
async fn run_tui(config: &AppConfig, db_path: PathBuf) -> Result<()> {
    let db = Database::open(&db_path)?;
    let notifier: Box<dyn Notifier> = if config.notifications {
        Box::new(notify::NotificationManager::new())
    } else {
        Box::new(pomodoro::traits::Silent)
    };
    let alarm: Box<dyn AlarmPlayer> = if config.alarm_enabled {
        Box::new(notify::TerminalBell)
    } else {
        Box::new(pomodoro::traits::Silent)
    };

    let engine = Engine::new(Box::new(db), notifier, alarm);
    let (handle, driver) = Driver::spawn(engine);

    let ui_handle = handle.clone();
    let result = tokio::task::spawn_blocking(move || ui::run_app(ui_handle, db_path)).await?;

    handle.send(pomodoro::Command::Shutdown).await.ok();
    let engine = driver.await?;
    tracing::info!(sessions = engine.logs().len(), "TUI closed");
    result
}

async fn run_command(command: Commands, config: &AppConfig, db_path: PathBuf) -> Result<()> {
    let db = Database::open(&db_path)?;

    match command {
        Commands::Show => run_tui(config, db_path).await?,
        Commands::Start => remote(config, Request::Start).await?,
        Commands::Pause => remote(config, Request::Pause).await?,
        Commands::Reset => remote(config, Request::Reset).await?,
        Commands::Skip => remote(config, Request::StartFocus).await?,
        Commands::Status => remote(config, Request::Status).await?,
        Commands::Task { label } => remote(config, Request::SetTask { label }).await?,

        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => print_settings(&db.get_settings()?),
            ConfigAction::Set { key, value } => {
                let settings = apply_setting(db.get_settings()?, &key, &value)?;
                db.put_settings(&settings)?;
                print_settings(&settings);
                // 守护进程未运行时忽略
                if let Err(e) = ipc::send_request(&config.socket_name, &Request::ReloadSettings).await
                {
                    tracing::debug!("Daemon not notified: {}", e);
                }
            }
        },

        Commands::Log { action } => match action.unwrap_or(LogAction::List) {
            LogAction::List => {
                let logs = db.get_all_logs()?;
                if logs.is_empty() {
                    println!("No sessions logged yet.");
                }
                for log in logs {
                    println!(
                        "{}  #{}  {:>4}  {}",
                        log.started_at
                            .with_timezone(&chrono::Local)
                            .format("%Y-%m-%d %H:%M"),
                        log.cycle,
                        stats::format_duration(log.duration_seconds as u64),
                        log.task_label
                    );
                }
            }
            LogAction::Clear => {
                db.replace_all_logs(&[])?;
                println!("🗑️  Session log cleared");
            }
        },

        Commands::Stats => {
            let logs = db.get_all_logs()?;
            let summary = stats::summarize(&logs, &chrono::Local::now());
            println!(
                "Today:     {} sessions, {}",
                summary.today.count,
                stats::format_duration(summary.today.seconds)
            );
            println!(
                "This week: {} sessions, {}",
                summary.week_count(),
                stats::format_duration(summary.week_seconds())
            );
            for day in &summary.week {
                println!(
                    "  {} {}  {:>2}  {}",
                    day.date.format("%a"),
                    day.date.format("%m-%d"),
                    day.count,
                    "▇".repeat(day.count.min(20))
                );
            }
        }

        Commands::Memo { action } => {
            let manager = MemoManager::new();
            match action {
                MemoAction::Add { text } => {
                    let memo = manager.add(&db, &text)?;
                    println!("✅ Memo saved with ID: {}", memo.id);
                }
                MemoAction::List => {
                    let memos = db.get_all_memos()?;
                    if memos.is_empty() {
                        println!("No memos found.");
                    }
                    for memo in memos {
                        println!("[{}] {}", memo.id, memo.text);
                    }
                }
                MemoAction::Remove { id } => {
                    if db.delete_memo(id)? {
                        println!("🗑️  Memo {} removed", id);
                    } else {
                        println!("❌ Memo {} not found", id);
                    }
                }
                MemoAction::Clear => {
                    db.clear_memos()?;
                    println!("🗑️  All memos removed");
                }
                MemoAction::Search { query } => {
                    for memo in manager.search(&db.get_all_memos()?, &query) {
                        println!("[{}] {}", memo.id, memo.text);
                    }
                }
            }
        }

        Commands::Routine { action } => match action {
            RoutineAction::Add { weekday, text } => {
                let day = parse_day(&weekday)?;
                let routine = notes::add_routine(&db, day, &text)?;
                println!(
                    "✅ Routine added for {} with ID: {}",
                    WEEKDAYS[day as usize],
                    routine.id.unwrap_or_default()
                );
            }
            RoutineAction::List { weekday } => {
                let day = weekday.as_deref().map(parse_day).transpose()?;
                let routines = db.get_routines(day)?;
                if routines.is_empty() {
                    println!("No routines found.");
                }
                for routine in routines {
                    println!(
                        "[{}] {}  {}",
                        routine.id.unwrap_or_default(),
                        WEEKDAYS[routine.weekday as usize],
                        routine.text
                    );
                }
            }
            RoutineAction::Remove { id } => {
                if db.delete_routine(id)? {
                    println!("🗑️  Routine {} removed", id);
                } else {
                    println!("❌ Routine {} not found", id);
                }
            }
            RoutineAction::Today => {
                let routines = notes::today_routines(&db)?;
                println!("{}:", WEEKDAYS[notes::today_weekday() as usize]);
                if routines.is_empty() {
                    println!("  nothing planned");
                }
                for routine in routines {
                    println!("  • {}", routine.text);
                }
            }
        },
    }

    Ok(())
}

/// 把请求发给守护进程并打印回复
async fn remote(config: &AppConfig, request: Request) -> Result<()> {
    match ipc::send_request(&config.socket_name, &request).await? {
        Response::Snapshot(snapshot) => {
            print_snapshot(&snapshot);
            Ok(())
        }
        Response::Error { message } => bail!("daemon: {}", message),
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    let task = if snapshot.current_task_label.is_empty() {
        "-"
    } else {
        snapshot.current_task_label.as_str()
    };
    println!(
        "{}  {}  cycle {}  task: {}",
        snapshot.phase.label(),
        snapshot.format_remaining(),
        snapshot.current_cycle,
        task
    );
}

fn print_settings(settings: &Settings) {
    println!("focus   = {} min", settings.focus_minutes);
    println!("short   = {} min", settings.short_break_minutes);
    println!("long    = {} min", settings.long_break_minutes);
    println!("cycles  = {}", settings.cycles_before_long_break);
    println!("auto    = {}", settings.auto_start_next_cycle);
    println!("alarm   = {}", settings.alarm.name());
    println!("theme   = {}", settings.theme.name());
}

/// 修改一个设置项，数值越界时截断并提示
fn apply_setting(mut settings: Settings, key: &str, value: &str) -> Result<Settings> {
    let number = || -> Result<i64> {
        value
            .parse::<i64>()
            .with_context(|| format!("`{}` expects a number, got `{}`", key, value))
    };
    let clamp = |range: (&'static str, u32, u32)| -> Result<u32> {
        let (clamped, warning) = models::clamp_setting(range, number()?);
        if let Some(warning) = warning {
            eprintln!("⚠️  {}", warning);
        }
        Ok(clamped)
    };

    match key {
        "focus" => settings.focus_minutes = clamp(models::FOCUS_RANGE)?,
        "short" => settings.short_break_minutes = clamp(models::SHORT_BREAK_RANGE)?,
        "long" => settings.long_break_minutes = clamp(models::LONG_BREAK_RANGE)?,
        "cycles" => settings.cycles_before_long_break = clamp(models::CYCLES_RANGE)?,
        "auto" => {
            settings.auto_start_next_cycle = match value {
                "on" | "true" | "yes" | "1" => true,
                "off" | "false" | "no" | "0" => false,
                _ => bail!("`auto` expects on/off, got `{}`", value),
            }
        }
        "alarm" => {
            settings.alarm = AlarmSound::parse(value).with_context(|| {
                let names: Vec<_> = AlarmSound::ALL.iter().map(|s| s.name()).collect();
                format!("Unknown alarm `{}` (one of: {})", value, names.join(", "))
            })?
        }
        "theme" => {
            settings.theme = Theme::parse(value).with_context(|| {
                let names: Vec<_> = Theme::ALL.iter().map(|t| t.name()).collect();
                format!("Unknown theme `{}` (one of: {})", value, names.join(", "))
            })?
        }
        _ => bail!("Unknown setting `{}`", key),
    }
    Ok(settings)
}

fn parse_day(s: &str) -> Result<u8> {
    notes::parse_weekday(s).with_context(|| format!("Unknown weekday `{}`", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_numbers_are_clamped() {
        let settings = apply_setting(Settings::default(), "focus", "500").unwrap();
        assert_eq!(settings.focus_minutes, 120);
        let settings = apply_setting(settings, "cycles", "0").unwrap();
        assert_eq!(settings.cycles_before_long_break, 1);
        let settings = apply_setting(settings, "short", "10").unwrap();
        assert_eq!(settings.short_break_minutes, 10);
    }

    #[test]
    fn setting_words_are_parsed() {
        let settings = apply_setting(Settings::default(), "auto", "on").unwrap();
        assert!(settings.auto_start_next_cycle);
        let settings = apply_setting(settings, "theme", "ocean").unwrap();
        assert_eq!(settings.theme, Theme::Ocean);
        assert!(apply_setting(settings.clone(), "alarm", "kazoo").is_err());
        assert!(apply_setting(settings.clone(), "focus", "soon").is_err());
        assert!(apply_setting(settings, "volume", "3").is_err());
    }
}
