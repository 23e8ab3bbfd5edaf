//! 番茄钟状态机
//!
//! `transition` 是纯函数：给定当前状态、事件、设置和当前时间，算出下一个
//! 状态以及需要执行的副作用（写日志、通知、提示音）。副作用由 [`Engine`]
//! 执行，时间推进由 [`Driver`] 负责。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AlarmSound, SessionLog, Settings};

pub mod driver;
pub mod engine;
pub mod traits;

pub use driver::{Command, Driver, DriverHandle, Ticker};
pub use engine::Engine;
pub use traits::{AlarmPlayer, LogStore, NotificationKind, Notifier, SettingsStore, Storage};

/// 未填写任务名时写入日志的名称
pub const UNTITLED_TASK: &str = "Untitled task";

/// 番茄钟阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Focus,
    ShortBreak,
    LongBreak,
    Paused,
}

impl Phase {
    /// 是否正在倒计时
    pub fn is_running(self) -> bool {
        matches!(self, Phase::Focus | Phase::ShortBreak | Phase::LongBreak)
    }

    pub fn is_break(self) -> bool {
        matches!(self, Phase::ShortBreak | Phase::LongBreak)
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Focus => "focus",
            Phase::ShortBreak => "short break",
            Phase::LongBreak => "long break",
            Phase::Paused => "paused",
        }
    }
}

/// 计时器状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub phase: Phase,
    /// 仅在 `Paused` 时有值
    pub previous_phase: Option<Phase>,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub current_cycle: u32,
    pub current_task_label: String,
    pub session_started_at: Option<DateTime<Utc>>,
}

impl TimerState {
    /// 空闲状态，剩余时间为一个完整的专注时长
    pub fn idle(settings: &Settings) -> Self {
        Self {
            phase: Phase::Idle,
            previous_phase: None,
            remaining_seconds: settings.focus_seconds(),
            total_seconds: settings.focus_seconds(),
            current_cycle: 1,
            current_task_label: String::new(),
            session_started_at: None,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            remaining_seconds: self.remaining_seconds,
            total_seconds: self.total_seconds,
            current_cycle: self.current_cycle,
            current_task_label: self.current_task_label.clone(),
        }
    }
}

/// 供界面读取的只读快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub current_cycle: u32,
    pub current_task_label: String,
}

impl Snapshot {
    /// 当前阶段的进度，0.0 ..= 1.0
    pub fn progress(&self) -> f64 {
        if self.total_seconds == 0 {
            return 0.0;
        }
        1.0 - self.remaining_seconds as f64 / self.total_seconds as f64
    }

    pub fn format_remaining(&self) -> String {
        format_clock(self.remaining_seconds)
    }
}

/// 秒数格式化为 `MM:SS`
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// 状态机事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Pause,
    Reset,
    Tick,
    CompleteFocus,
    StartBreak,
    CompleteBreak,
    StartFocus,
    SetTask(String),
    /// 设置已更新，`transition` 收到的 settings 即新设置
    SettingsChanged,
}

/// 状态转换附带的副作用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AppendLog(SessionLog),
    Notify(NotificationKind),
    PlayAlarm(AlarmSound),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: TimerState,
    pub effects: Vec<Effect>,
}

/// 计算下一个状态。前置条件不满足的事件原样返回当前状态
pub fn transition(
    state: &TimerState,
    event: Event,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Transition {
    let mut next = state.clone();
    let mut effects = Vec::new();
    apply(&mut next, event, settings, now, &mut effects);
    Transition {
        state: next,
        effects,
    }
}

fn apply(
    state: &mut TimerState,
    event: Event,
    settings: &Settings,
    now: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    match event {
        Event::Start => {
            match state.phase {
                Phase::Paused => {
                    state.phase = state.previous_phase.take().unwrap_or(Phase::Focus);
                }
                Phase::Idle => state.phase = Phase::Focus,
                _ => return,
            }
            if state.session_started_at.is_none() {
                state.session_started_at = Some(now);
            }
        }
        Event::Pause => {
            if state.phase.is_running() {
                state.previous_phase = Some(state.phase);
                state.phase = Phase::Paused;
            }
        }
        Event::Reset => {
            state.phase = Phase::Idle;
            state.previous_phase = None;
            state.remaining_seconds = settings.focus_seconds();
            state.total_seconds = settings.focus_seconds();
            state.current_cycle = 1;
            state.session_started_at = None;
        }
        Event::Tick => {
            if state.phase.is_running() {
                state.remaining_seconds = state.remaining_seconds.saturating_sub(1);
            }
        }
        Event::CompleteFocus => {
            if state.phase != Phase::Focus || state.remaining_seconds != 0 {
                return;
            }
            let duration_seconds = settings.focus_seconds();
            let started_at = state
                .session_started_at
                .take()
                .unwrap_or_else(|| now - Duration::seconds(duration_seconds as i64));
            let task_label = match state.current_task_label.trim() {
                "" => UNTITLED_TASK.to_string(),
                label => label.to_string(),
            };
            effects.push(Effect::PlayAlarm(settings.alarm));
            effects.push(Effect::AppendLog(SessionLog {
                id: now.timestamp_millis(),
                task_label,
                started_at,
                ended_at: now,
                duration_seconds,
                cycle: state.current_cycle,
            }));
            effects.push(Effect::Notify(NotificationKind::FocusEnded));
            apply(state, Event::StartBreak, settings, now, effects);
        }
        Event::StartBreak => {
            if state.phase != Phase::Focus {
                return;
            }
            let is_long = state.current_cycle >= settings.cycles_before_long_break;
            let (phase, seconds) = if is_long {
                (Phase::LongBreak, settings.long_break_seconds())
            } else {
                (Phase::ShortBreak, settings.short_break_seconds())
            };
            state.phase = phase;
            state.remaining_seconds = seconds;
            state.total_seconds = seconds;
        }
        Event::CompleteBreak => {
            if !state.phase.is_break() || state.remaining_seconds != 0 {
                return;
            }
            effects.push(Effect::PlayAlarm(settings.alarm));
            effects.push(Effect::Notify(NotificationKind::BreakEnded));
            let follow_up = if settings.auto_start_next_cycle {
                Event::StartFocus
            } else {
                Event::Reset
            };
            apply(state, follow_up, settings, now, effects);
        }
        Event::StartFocus => {
            state.current_cycle = match state.phase {
                Phase::Idle => state.current_cycle,
                Phase::LongBreak => 1,
                Phase::ShortBreak => state.current_cycle + 1,
                Phase::Focus | Phase::Paused => return,
            };
            state.phase = Phase::Focus;
            state.remaining_seconds = settings.focus_seconds();
            state.total_seconds = settings.focus_seconds();
            state.session_started_at = Some(now);
        }
        Event::SetTask(label) => state.current_task_label = label,
        Event::SettingsChanged => {
            if state.phase == Phase::Idle {
                state.remaining_seconds = settings.focus_seconds();
                state.total_seconds = settings.focus_seconds();
            }
        }
    }
}
