use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::db::Database;
use crate::models::{self, AlarmSound, Memo, Routine, Settings, Theme};
use crate::notes::{self, MemoManager, WEEKDAYS};
use crate::notify::TerminalBell;
use crate::pomodoro::{AlarmPlayer, Command, DriverHandle, Phase, Snapshot};

/// 检查数据库中设置是否被外部修改的间隔
const SETTINGS_POLL: Duration = Duration::from_secs(2);

/// 设置对话框中的字段
const SETTING_FIELDS: [&str; 7] = [
    "Focus (min)",
    "Short break (min)",
    "Long break (min)",
    "Cycles before long break",
    "Auto-start next cycle",
    "Alarm",
    "Theme",
];

/// 应用状态
pub struct App {
    pub handle: DriverHandle,
    pub db: Database,
    pub snapshot: Snapshot,
    pub settings: Settings,
    pub memos: Vec<Memo>,
    pub routines: Vec<Routine>,
    pub memo_list_state: ListState,
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub input_buffer: String,
    pub show_dialog: DialogType,
    pub status_message: Option<String>,
    pub settings_draft: Settings,
    pub settings_field: usize,
    /// 最近一次在数据库中看到的设置
    stored_settings: Settings,
    last_settings_check: Instant,
}

/// 输入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Insert,
}

/// 对话框类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogType {
    None,
    EditTask,
    CreateMemo,
    ClearMemosConfirm,
    Settings,
    Help,
}

impl App {
    pub fn new<P: AsRef<Path>>(handle: DriverHandle, db_path: P) -> Result<Self> {
        let db = Database::open(db_path)?;
        let settings = db.get_settings()?;
        let mut app = Self {
            snapshot: handle.snapshot(),
            handle,
            db,
            settings: settings.clone(),
            memos: Vec::new(),
            routines: Vec::new(),
            memo_list_state: ListState::default(),
            should_quit: false,
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            show_dialog: DialogType::None,
            status_message: None,
            settings_draft: settings.clone(),
            settings_field: 0,
            stored_settings: settings,
            last_settings_check: Instant::now(),
        };
        app.reload_data()?;
        Ok(app)
    }

    /// 从数据库重新加载数据
    pub fn reload_data(&mut self) -> Result<()> {
        self.memos = self.db.get_all_memos()?;
        self.routines = notes::today_routines(&self.db)?;

        if self.memos.is_empty() {
            self.memo_list_state.select(None);
        } else if self.memo_list_state.selected().is_none() {
            self.memo_list_state.select(Some(0));
        }
        Ok(())
    }

    /// 同步驱动的最新状态，阶段变化时给出提示
    pub fn refresh(&mut self) {
        let next = self.handle.snapshot();
        if next.phase != self.snapshot.phase {
            self.status_message = match (self.snapshot.phase, next.phase) {
                (Phase::Focus, Phase::ShortBreak | Phase::LongBreak) => {
                    Some("Focus session logged. Time for a break!".to_string())
                }
                (Phase::ShortBreak | Phase::LongBreak, Phase::Focus) => {
                    Some("Break over, back to focus.".to_string())
                }
                (Phase::ShortBreak | Phase::LongBreak, Phase::Idle) => {
                    Some("Break over. Press s to start the next focus.".to_string())
                }
                _ => None,
            };
        }
        self.snapshot = next;
    }

    /// 数据库中的设置被外部修改（如 `pomo config set`）时让驱动重新读取
    pub fn sync_settings(&mut self) -> Result<()> {
        let stored = self.db.get_settings()?;
        if stored != self.stored_settings {
            tracing::info!("Settings changed in database, reloading");
            self.stored_settings = stored.clone();
            self.settings = stored;
            self.send(Command::ReloadSettings);
        }
        Ok(())
    }

    fn send(&mut self, command: Command) {
        if self.handle.blocking_send(command).is_err() {
            self.status_message = Some("Timer driver stopped".to_string());
            self.should_quit = true;
        }
    }

    /// 开始/暂停
    pub fn toggle_timer(&mut self) {
        if self.snapshot.phase.is_running() {
            self.send(Command::Pause);
        } else {
            self.send(Command::Start);
        }
    }

    pub fn next_memo(&mut self) {
        if self.memos.is_empty() {
            return;
        }
        let i = match self.memo_list_state.selected() {
            Some(i) if i + 1 < self.memos.len() => i + 1,
            _ => 0,
        };
        self.memo_list_state.select(Some(i));
    }

    pub fn previous_memo(&mut self) {
        if self.memos.is_empty() {
            return;
        }
        let i = match self.memo_list_state.selected() {
            Some(0) | None => self.memos.len() - 1,
            Some(i) => i - 1,
        };
        self.memo_list_state.select(Some(i));
    }

    fn open_dialog(&mut self, dialog: DialogType) {
        self.input_buffer.clear();
        if dialog == DialogType::EditTask {
            self.input_buffer = self.snapshot.current_task_label.clone();
        }
        if dialog == DialogType::Settings {
            self.settings_draft = self.settings.clone();
            self.settings_field = 0;
        }
        self.input_mode = if matches!(dialog, DialogType::EditTask | DialogType::CreateMemo) {
            InputMode::Insert
        } else {
            InputMode::Normal
        };
        self.show_dialog = dialog;
    }

    fn close_dialog(&mut self) {
        self.input_mode = InputMode::Normal;
        self.input_buffer.clear();
        self.show_dialog = DialogType::None;
    }

    fn confirm_input(&mut self) -> Result<()> {
        match self.show_dialog {
            DialogType::EditTask => {
                let label = self.input_buffer.trim().to_string();
                self.send(Command::SetTask(label));
            }
            DialogType::CreateMemo => {
                match MemoManager::new().add(&self.db, &self.input_buffer) {
                    Ok(_) => self.status_message = Some("Memo saved".to_string()),
                    Err(e) => self.status_message = Some(format!("Memo not saved: {}", e)),
                }
                self.reload_data()?;
            }
            _ => {}
        }
        self.close_dialog();
        Ok(())
    }

    /// 修改当前选中的设置字段
    pub fn adjust_setting(&mut self, forward: bool) {
        let draft = &mut self.settings_draft;
        match self.settings_field {
            0 => step(models::FOCUS_RANGE, &mut draft.focus_minutes, forward),
            1 => step(models::SHORT_BREAK_RANGE, &mut draft.short_break_minutes, forward),
            2 => step(models::LONG_BREAK_RANGE, &mut draft.long_break_minutes, forward),
            3 => step(models::CYCLES_RANGE, &mut draft.cycles_before_long_break, forward),
            4 => draft.auto_start_next_cycle = !draft.auto_start_next_cycle,
            5 => draft.alarm = rotate(AlarmSound::ALL, draft.alarm, forward),
            _ => draft.theme = rotate(Theme::ALL, draft.theme, forward),
        }
    }

    /// 保存设置并交给驱动，空闲时的专注时长立即更新
    pub fn save_settings(&mut self) {
        let settings = self.settings_draft.clone();
        self.settings = settings.clone();
        self.send(Command::UpdateSettings(settings));
        self.close_dialog();
        self.status_message = Some("Settings saved".to_string());
    }

    fn preview_alarm(&mut self) {
        if let Err(e) = TerminalBell.play(self.settings_draft.alarm) {
            self.status_message = Some(e.to_string());
        }
    }

    pub fn delete_selected_memo(&mut self) -> Result<()> {
        if let Some(memo) = self
            .memo_list_state
            .selected()
            .and_then(|i| self.memos.get(i))
        {
            self.db.delete_memo(memo.id)?;
            self.reload_data()?;
            if let Some(i) = self.memo_list_state.selected() {
                if i >= self.memos.len() {
                    self.memo_list_state
                        .select(self.memos.len().checked_sub(1));
                }
            }
        }
        Ok(())
    }
}

fn step(range: (&'static str, u32, u32), value: &mut u32, forward: bool) {
    let next = if forward {
        *value as i64 + 1
    } else {
        *value as i64 - 1
    };
    *value = models::clamp_setting(range, next).0;
}

fn rotate<T: Copy + PartialEq, const N: usize>(all: [T; N], current: T, forward: bool) -> T {
    let i = all.iter().position(|x| *x == current).unwrap_or(0);
    if forward {
        all[(i + 1) % N]
    } else {
        all[(i + N - 1) % N]
    }
}

/// 运行TUI应用
pub fn run_app<P: AsRef<Path>>(handle: DriverHandle, db_path: P) -> Result<()> {
    let mut app = App::new(handle, db_path)?;

    // 设置终端
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_ui_loop(&mut terminal, &mut app);

    // 恢复终端
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

/// UI主循环
fn run_ui_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    loop {
        app.refresh();
        if app.last_settings_check.elapsed() >= SETTINGS_POLL {
            app.last_settings_check = Instant::now();
            if let Err(e) = app.sync_settings() {
                tracing::warn!("Failed to check settings: {}", e);
            }
        }
        terminal.draw(|f| ui(f, app))?;

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key_event(app, key.code)?;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// 处理键盘事件
fn handle_key_event(app: &mut App, key: KeyCode) -> Result<()> {
    if app.input_mode == InputMode::Insert {
        match key {
            KeyCode::Esc => app.close_dialog(),
            KeyCode::Enter => app.confirm_input()?,
            KeyCode::Backspace => {
                app.input_buffer.pop();
            }
            KeyCode::Char(c) => app.input_buffer.push(c),
            _ => {}
        }
        return Ok(());
    }

    match app.show_dialog {
        DialogType::Help => {
            app.close_dialog();
            return Ok(());
        }
        DialogType::Settings => {
            match key {
                KeyCode::Esc | KeyCode::Char('q') => app.close_dialog(),
                KeyCode::Enter => app.save_settings(),
                KeyCode::Up | KeyCode::Char('k') => {
                    app.settings_field = app.settings_field.saturating_sub(1);
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    app.settings_field = (app.settings_field + 1).min(SETTING_FIELDS.len() - 1);
                }
                KeyCode::Left | KeyCode::Char('h') => app.adjust_setting(false),
                KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => {
                    app.adjust_setting(true)
                }
                KeyCode::Char('p') => app.preview_alarm(),
                _ => {}
            }
            return Ok(());
        }
        DialogType::ClearMemosConfirm => {
            if let KeyCode::Char('y') = key {
                app.db.clear_memos()?;
                app.reload_data()?;
                app.status_message = Some("Memos cleared".to_string());
            }
            app.close_dialog();
            return Ok(());
        }
        _ => {}
    }

    app.status_message = None;
    match key {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('s') | KeyCode::Char(' ') => app.toggle_timer(),
        KeyCode::Char('r') => app.send(Command::Reset),
        KeyCode::Char('f') => app.send(Command::StartFocus),
        KeyCode::Char('t') => app.open_dialog(DialogType::EditTask),
        KeyCode::Char('m') => app.open_dialog(DialogType::CreateMemo),
        KeyCode::Char('x') => app.open_dialog(DialogType::ClearMemosConfirm),
        KeyCode::Char('c') => app.open_dialog(DialogType::Settings),
        KeyCode::Char('d') => app.delete_selected_memo()?,
        KeyCode::Char('j') | KeyCode::Down => app.next_memo(),
        KeyCode::Char('k') | KeyCode::Up => app.previous_memo(),
        KeyCode::Char('?') => app.open_dialog(DialogType::Help),
        _ => {}
    }
    Ok(())
}

/// 主题色
fn accent(theme: Theme) -> Color {
    match theme {
        Theme::Default => Color::Red,
        Theme::Ocean => Color::Blue,
        Theme::Forest => Color::Green,
        Theme::Sunset => Color::Rgb(255, 140, 66),
        Theme::Lavender => Color::Magenta,
    }
}

fn phase_text(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "⏸️  Ready",
        Phase::Focus => "🔥 Focus",
        Phase::ShortBreak => "☕ Short break",
        Phase::LongBreak => "🌴 Long break",
        Phase::Paused => "⏸️  Paused",
    }
}

/// 渲染UI
fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(9), // 计时器
            Constraint::Length(3), // 进度
            Constraint::Min(0),    // 列表
            Constraint::Length(1), // 状态栏
        ])
        .split(f.area());

    render_timer(f, app, chunks[0]);
    render_progress(f, app, chunks[1]);

    let lists = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[2]);
    render_routines(f, app, lists[0]);
    render_memos(f, app, lists[1]);

    render_status_bar(f, app, chunks[3]);

    if app.show_dialog != DialogType::None {
        render_dialog(f, app);
    }
}

fn render_timer(f: &mut Frame, app: &App, area: Rect) {
    let color = accent(app.settings.theme);
    let snap = &app.snapshot;
    let task = if snap.current_task_label.is_empty() {
        "(press t to name your task)"
    } else {
        snap.current_task_label.as_str()
    };

    let content = vec![
        Line::from(""),
        Line::from(Span::styled(
            phase_text(snap.phase),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            snap.format_remaining(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!(
            "Cycle {}/{}  ·  {}",
            snap.current_cycle, app.settings.cycles_before_long_break, task
        )),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default().borders(Borders::ALL).title("🍅 Pomodoro"))
        .alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}

fn render_progress(f: &mut Frame, app: &App, area: Rect) {
    let ratio = app.snapshot.progress().clamp(0.0, 1.0);
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(accent(app.settings.theme)))
        .ratio(ratio)
        .label(format!("{:.0}%", ratio * 100.0));
    f.render_widget(gauge, area);
}

fn render_routines(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .routines
        .iter()
        .map(|routine| ListItem::new(format!("• {}", routine.text)))
        .collect();

    let title = format!("Today ({})", WEEKDAYS[notes::today_weekday() as usize]);
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(list, area);
}

fn render_memos(f: &mut Frame, app: &mut App, area: Rect) {
    let items: Vec<ListItem> = app
        .memos
        .iter()
        .map(|memo| ListItem::new(format!("💡 {}", memo.text)))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Memos ({})", app.memos.len()))
                .title_bottom("m:new | d:delete | x:clear"),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    f.render_stateful_widget(list, area, &mut app.memo_list_state);
}

/// 渲染状态栏
fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let status = match app.status_message {
        Some(ref msg) => msg.clone(),
        None => "s:start/pause | r:reset | f:skip break | t:task | c:settings | q:quit | ?:help".to_string(),
    };

    let status_bar = Paragraph::new(status)
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(status_bar, area);
}

/// 渲染对话框
fn render_dialog(f: &mut Frame, app: &App) {
    let area = if app.show_dialog == DialogType::Settings {
        centered_rect(60, 60, f.area())
    } else {
        centered_rect(60, 40, f.area())
    };
    let input = Line::from(Span::styled(
        app.input_buffer.as_str(),
        Style::default().fg(Color::Yellow),
    ));

    let (title, content) = match app.show_dialog {
        DialogType::EditTask => (
            "Current task",
            vec![
                Line::from(""),
                Line::from("What are you working on?"),
                Line::from(""),
                input,
                Line::from(""),
                Line::from("Enter:save | Esc:cancel"),
            ],
        ),
        DialogType::CreateMemo => (
            "New memo",
            vec![
                Line::from(""),
                Line::from("Jot it down and get back to focus:"),
                Line::from(""),
                input,
                Line::from(""),
                Line::from("Enter:save | Esc:cancel"),
            ],
        ),
        DialogType::ClearMemosConfirm => (
            "Clear memos",
            vec![
                Line::from(""),
                Line::from(format!("Delete all {} memos?", app.memos.len())),
                Line::from(""),
                Line::from("y - confirm"),
                Line::from("any other key - cancel"),
            ],
        ),
        DialogType::Settings => {
            let mut lines = vec![Line::from("")];
            for (i, name) in SETTING_FIELDS.iter().enumerate() {
                let text = format!("{:<26}{}", name, setting_value(&app.settings_draft, i));
                let style = if i == app.settings_field {
                    Style::default()
                        .fg(accent(app.settings_draft.theme))
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                lines.push(Line::from(Span::styled(text, style)));
            }
            lines.push(Line::from(""));
            lines.push(Line::from("↑↓:select | ←→:change | p:test alarm"));
            lines.push(Line::from("Enter:save | Esc:cancel"));
            ("Settings", lines)
        }
        DialogType::Help => (
            "Keys",
            vec![
                Line::from(""),
                Line::from(Span::styled("Timer", Style::default().add_modifier(Modifier::BOLD))),
                Line::from("  s/Space : start or pause"),
                Line::from("  r       : reset"),
                Line::from("  f       : skip break, start focus"),
                Line::from("  t       : set current task"),
                Line::from("  c       : settings"),
                Line::from(""),
                Line::from(Span::styled("Memos", Style::default().add_modifier(Modifier::BOLD))),
                Line::from("  m       : new memo"),
                Line::from("  j/k     : move"),
                Line::from("  d / x   : delete / clear all"),
                Line::from(""),
                Line::from("  q       : quit"),
                Line::from(""),
                Line::from("Press any key to close"),
            ],
        ),
        DialogType::None => ("", vec![]),
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::Black).fg(Color::White));

    let paragraph = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: true });

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

fn setting_value(settings: &Settings, field: usize) -> String {
    match field {
        0 => settings.focus_minutes.to_string(),
        1 => settings.short_break_minutes.to_string(),
        2 => settings.long_break_minutes.to_string(),
        3 => settings.cycles_before_long_break.to_string(),
        4 => (if settings.auto_start_next_cycle { "on" } else { "off" }).to_string(),
        5 => settings.alarm.name().to_string(),
        _ => settings.theme.name().to_string(),
    }
}

/// 居中矩形
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    #[test]
    fn centered_rect_stays_inside() {
        let outer = Rect::new(0, 0, 100, 50);
        let inner = centered_rect(60, 40, outer);
        assert_eq!(inner.width, 60);
        assert_eq!(inner.height, 20);
        assert!(inner.x >= outer.x && inner.right() <= outer.right());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn renders_timer_and_handles_keys() {
        use crate::pomodoro::engine::tests::{engine_with, MemoryStore, Recorder};
        use crate::pomodoro::Driver;

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("pomo.db");
        let engine = engine_with(MemoryStore::default(), Recorder::default());
        let (handle, task) = Driver::spawn(engine);

        let remote = handle.clone();
        tokio::task::spawn_blocking(move || {
            let mut app = App::new(handle, &db_path).unwrap();
            let mut terminal = Terminal::new(TestBackend::new(80, 30)).unwrap();
            terminal.draw(|f| ui(f, &mut app)).unwrap();
            let screen = format!("{:?}", terminal.backend().buffer());
            assert!(screen.contains("25:00"));

            handle_key_event(&mut app, KeyCode::Char('m')).unwrap();
            for c in "call Jo".chars() {
                handle_key_event(&mut app, KeyCode::Char(c)).unwrap();
            }
            handle_key_event(&mut app, KeyCode::Enter).unwrap();
            assert_eq!(app.memos.len(), 1);
            assert_eq!(app.memos[0].text, "call Jo");

            handle_key_event(&mut app, KeyCode::Char('s')).unwrap();
            handle_key_event(&mut app, KeyCode::Char('q')).unwrap();
            assert!(app.should_quit);
        })
        .await
        .unwrap();

        assert_eq!(remote.query().await.unwrap().phase, Phase::Focus);
        remote.send(Command::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn settings_dialog_updates_idle_timer() {
        use crate::pomodoro::engine::tests::{engine_with, MemoryStore, Recorder};
        use crate::pomodoro::Driver;

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("pomo.db");
        let store = MemoryStore::default();
        let engine = engine_with(store.clone(), Recorder::default());
        let (handle, task) = Driver::spawn(engine);

        let remote = handle.clone();
        tokio::task::spawn_blocking(move || {
            let mut app = App::new(handle, &db_path).unwrap();
            handle_key_event(&mut app, KeyCode::Char('c')).unwrap();
            assert_eq!(app.show_dialog, DialogType::Settings);
            for _ in 0..5 {
                handle_key_event(&mut app, KeyCode::Right).unwrap();
            }
            // 切到主题并轮换一次
            for _ in 0..6 {
                handle_key_event(&mut app, KeyCode::Down).unwrap();
            }
            handle_key_event(&mut app, KeyCode::Right).unwrap();
            handle_key_event(&mut app, KeyCode::Enter).unwrap();

            assert_eq!(app.show_dialog, DialogType::None);
            assert_eq!(app.settings.focus_minutes, 30);
            assert_eq!(app.settings.theme, Theme::Ocean);
        })
        .await
        .unwrap();

        let snap = remote.query().await.unwrap();
        assert_eq!(snap.phase, Phase::Idle);
        assert_eq!(snap.total_seconds, 1800);
        assert_eq!(snap.remaining_seconds, 1800);
        assert_eq!(store.settings.lock().unwrap().as_ref().unwrap().focus_minutes, 30);

        remote.send(Command::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn settings_written_elsewhere_reach_the_timer() {
        use crate::pomodoro::traits::Silent;
        use crate::pomodoro::{Driver, Engine};

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("pomo.db");
        let engine = Engine::new(
            Box::new(Database::open(&db_path).unwrap()),
            Box::new(Silent),
            Box::new(Silent),
        );
        let (handle, task) = Driver::spawn(engine);

        let remote = handle.clone();
        tokio::task::spawn_blocking(move || {
            let mut app = App::new(handle, &db_path).unwrap();
            app.sync_settings().unwrap();
            assert_eq!(app.settings.focus_minutes, 25);

            // 与 `pomo config set focus 50` 相同：另一个连接直接写数据库
            let other = Database::open(&db_path).unwrap();
            other
                .put_settings(&Settings {
                    focus_minutes: 50,
                    ..Settings::default()
                })
                .unwrap();

            app.sync_settings().unwrap();
            assert_eq!(app.settings.focus_minutes, 50);
        })
        .await
        .unwrap();

        let snap = remote.query().await.unwrap();
        assert_eq!(snap.phase, Phase::Idle);
        assert_eq!(snap.total_seconds, 3000);
        assert_eq!(snap.remaining_seconds, 3000);

        remote.send(Command::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[test]
    fn setting_steps_stay_in_range() {
        let mut value = 120;
        step(models::FOCUS_RANGE, &mut value, true);
        assert_eq!(value, 120);
        let mut value = 1;
        step(models::CYCLES_RANGE, &mut value, false);
        assert_eq!(value, 1);
        assert_eq!(rotate(Theme::ALL, Theme::Lavender, true), Theme::Default);
        assert_eq!(rotate(AlarmSound::ALL, AlarmSound::Bell, false), AlarmSound::Alert);
    }
}
