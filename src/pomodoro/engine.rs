use chrono::Utc;
use tokio::sync::watch;

use super::traits::{AlarmPlayer, Notifier, Storage};
use super::{transition, Effect, Event, Snapshot, TimerState};
use crate::error::{Error, Result};
use crate::models::{SessionLog, Settings};

/// 计时器的唯一写入者
///
/// 持有状态、设置和已完成的专注记录，所有变更都经过 [`Engine::dispatch`]。
/// 每次状态变化后向订阅者推送新的 [`Snapshot`]。
pub struct Engine {
    state: TimerState,
    settings: Settings,
    logs: Vec<SessionLog>,
    storage: Box<dyn Storage>,
    notifier: Box<dyn Notifier>,
    alarm: Box<dyn AlarmPlayer>,
    snapshots: watch::Sender<Snapshot>,
}

impl Engine {
    /// 从存储加载设置和日志；加载失败时使用默认值
    pub fn new(
        storage: Box<dyn Storage>,
        notifier: Box<dyn Notifier>,
        alarm: Box<dyn AlarmPlayer>,
    ) -> Self {
        let settings = storage.load_settings().unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            Settings::default()
        });
        let settings = sanitize(settings);
        let logs = storage.load_logs().unwrap_or_else(|e| {
            tracing::warn!("Failed to load session logs: {}", e);
            Vec::new()
        });
        tracing::debug!(sessions = logs.len(), ?settings, "engine loaded");

        let state = TimerState::idle(&settings);
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            state,
            settings,
            logs,
            storage,
            notifier,
            alarm,
            snapshots,
        }
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn logs(&self) -> &[SessionLog] {
        &self.logs
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    /// 应用一个事件。状态总会前进，返回的错误只表示持久化失败
    pub fn dispatch(&mut self, event: Event) -> Result<()> {
        tracing::trace!(?event, phase = ?self.state.phase, "dispatch");
        let next = transition(&self.state, event, &self.settings, Utc::now());
        let changed = next.state != self.state;
        self.state = next.state;

        let mut failure = None;
        for effect in next.effects {
            if let Err(e) = self.run_effect(effect) {
                failure.get_or_insert(e);
            }
        }

        if changed {
            self.snapshots.send_replace(self.state.snapshot());
        }
        failure.map_or(Ok(()), Err)
    }

    pub fn start(&mut self) -> Result<()> {
        self.dispatch(Event::Start)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.dispatch(Event::Pause)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.dispatch(Event::Reset)
    }

    /// 跳过休息，直接开始下一轮专注
    pub fn start_focus(&mut self) -> Result<()> {
        self.dispatch(Event::StartFocus)
    }

    pub fn set_current_task(&mut self, label: impl Into<String>) -> Result<()> {
        self.dispatch(Event::SetTask(label.into()))
    }

    /// 更新并保存设置。正在进行的阶段不受影响
    pub fn update_settings(&mut self, settings: Settings) -> Result<()> {
        self.settings = sanitize(settings);
        let saved = self.storage.save_settings(&self.settings).map_err(|e| {
            tracing::warn!("Failed to save settings: {}", e);
            Error::from(e)
        });
        self.dispatch(Event::SettingsChanged)?;
        saved
    }

    /// 重新读取存储中的设置（例如被命令行修改过）
    pub fn reload_settings(&mut self) -> Result<()> {
        let settings = self.storage.load_settings()?;
        self.settings = sanitize(settings);
        self.dispatch(Event::SettingsChanged)
    }

    fn run_effect(&mut self, effect: Effect) -> Result<()> {
        match effect {
            Effect::AppendLog(mut log) => {
                // 时间戳 id 需保持单调递增
                if let Some(last) = self.logs.last() {
                    log.id = log.id.max(last.id + 1);
                }
                tracing::info!(
                    id = log.id,
                    task = %log.task_label,
                    cycle = log.cycle,
                    "focus session completed"
                );
                let appended = self.storage.append_log(&log);
                self.logs.push(log);
                appended.map_err(|e| {
                    tracing::warn!("Failed to persist session log: {}", e);
                    Error::from(e)
                })
            }
            Effect::Notify(kind) => {
                if let Err(e) = self.notifier.notify(kind) {
                    tracing::debug!("Notification skipped: {}", e);
                }
                Ok(())
            }
            Effect::PlayAlarm(sound) => {
                if let Err(e) = self.alarm.play(sound) {
                    tracing::debug!("Alarm skipped: {}", e);
                }
                Ok(())
            }
        }
    }
}

fn sanitize(settings: Settings) -> Settings {
    let (settings, clamped) = settings.sanitized();
    for e in clamped {
        tracing::warn!("{}", e);
    }
    settings
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::PersistenceError;
    use crate::models::AlarmSound;
    use crate::pomodoro::traits::{LogStore, NotificationKind, SettingsStore};
    use crate::pomodoro::Phase;

    /// 内存存储，可模拟写入失败
    #[derive(Clone, Default)]
    pub(crate) struct MemoryStore {
        pub settings: Arc<Mutex<Option<Settings>>>,
        pub logs: Arc<Mutex<Vec<SessionLog>>>,
        pub broken: bool,
    }

    impl MemoryStore {
        fn check(&self) -> Result<(), PersistenceError> {
            if self.broken {
                Err(PersistenceError::Rejected("storage offline".into()))
            } else {
                Ok(())
            }
        }
    }

    impl SettingsStore for MemoryStore {
        fn load_settings(&self) -> Result<Settings, PersistenceError> {
            self.check()?;
            Ok(self.settings.lock().unwrap().clone().unwrap_or_default())
        }

        fn save_settings(&self, settings: &Settings) -> Result<(), PersistenceError> {
            self.check()?;
            *self.settings.lock().unwrap() = Some(settings.clone());
            Ok(())
        }
    }

    impl LogStore for MemoryStore {
        fn load_logs(&self) -> Result<Vec<SessionLog>, PersistenceError> {
            self.check()?;
            Ok(self.logs.lock().unwrap().clone())
        }

        fn append_log(&self, log: &SessionLog) -> Result<(), PersistenceError> {
            self.check()?;
            self.logs.lock().unwrap().push(log.clone());
            Ok(())
        }

        fn replace_logs(&self, logs: &[SessionLog]) -> Result<(), PersistenceError> {
            self.check()?;
            *self.logs.lock().unwrap() = logs.to_vec();
            Ok(())
        }
    }

    /// 记录收到的通知和提示音
    #[derive(Clone, Default)]
    pub(crate) struct Recorder {
        pub notifications: Arc<Mutex<Vec<NotificationKind>>>,
        pub alarms: Arc<Mutex<Vec<AlarmSound>>>,
    }

    impl Notifier for Recorder {
        fn notify(&self, kind: NotificationKind) -> Result<(), Error> {
            self.notifications.lock().unwrap().push(kind);
            Err(Error::UnsupportedCapability("no notification daemon".into()))
        }
    }

    impl AlarmPlayer for Recorder {
        fn play(&self, sound: AlarmSound) -> Result<(), Error> {
            self.alarms.lock().unwrap().push(sound);
            Ok(())
        }
    }

    pub(crate) fn quick_settings() -> Settings {
        Settings {
            focus_minutes: 1,
            short_break_minutes: 1,
            long_break_minutes: 2,
            cycles_before_long_break: 2,
            auto_start_next_cycle: true,
            ..Settings::default()
        }
    }

    pub(crate) fn engine_with(store: MemoryStore, recorder: Recorder) -> Engine {
        Engine::new(
            Box::new(store),
            Box::new(recorder.clone()),
            Box::new(recorder),
        )
    }

    fn run_out(engine: &mut Engine) {
        while engine.state().remaining_seconds > 0 {
            engine.dispatch(Event::Tick).unwrap();
        }
    }

    #[test]
    fn loads_persisted_settings_and_logs() {
        let store = MemoryStore::default();
        *store.settings.lock().unwrap() = Some(Settings {
            focus_minutes: 45,
            ..Settings::default()
        });
        let engine = engine_with(store, Recorder::default());

        assert_eq!(engine.settings().focus_minutes, 45);
        assert_eq!(engine.snapshot().remaining_seconds, 2700);
        assert_eq!(engine.snapshot().phase, Phase::Idle);
    }

    #[test]
    fn broken_storage_falls_back_to_defaults() {
        let store = MemoryStore {
            broken: true,
            ..MemoryStore::default()
        };
        let engine = engine_with(store, Recorder::default());
        assert_eq!(engine.settings(), &Settings::default());
        assert!(engine.logs().is_empty());
    }

    #[test]
    fn focus_completion_persists_one_log_and_fires_side_effects() {
        let store = MemoryStore::default();
        *store.settings.lock().unwrap() = Some(quick_settings());
        let recorder = Recorder::default();
        let mut engine = engine_with(store.clone(), recorder.clone());

        engine.set_current_task("inbox zero").unwrap();
        engine.start().unwrap();
        run_out(&mut engine);
        engine.dispatch(Event::CompleteFocus).unwrap();
        engine.dispatch(Event::CompleteFocus).unwrap();

        let persisted = store.logs.lock().unwrap().clone();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].task_label, "inbox zero");
        assert_eq!(persisted[0].duration_seconds, 60);
        assert_eq!(engine.logs(), persisted.as_slice());
        assert_eq!(engine.snapshot().phase, Phase::ShortBreak);

        // 通知失败被忽略
        assert_eq!(
            *recorder.notifications.lock().unwrap(),
            vec![NotificationKind::FocusEnded]
        );
        assert_eq!(*recorder.alarms.lock().unwrap(), vec![AlarmSound::Bell]);
    }

    #[test]
    fn persistence_failure_is_reported_but_state_advances() {
        let store = MemoryStore {
            broken: true,
            ..MemoryStore::default()
        };
        let mut engine = engine_with(store, Recorder::default());
        engine.start().unwrap();
        run_out(&mut engine);

        let result = engine.dispatch(Event::CompleteFocus);
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(engine.snapshot().phase, Phase::ShortBreak);
        assert_eq!(engine.logs().len(), 1);
    }

    #[test]
    fn log_ids_stay_monotonic() {
        let store = MemoryStore::default();
        *store.settings.lock().unwrap() = Some(quick_settings());
        let mut engine = engine_with(store, Recorder::default());

        engine.start().unwrap();
        for _ in 0..3 {
            run_out(&mut engine);
            engine.dispatch(Event::CompleteFocus).unwrap();
            run_out(&mut engine);
            engine.dispatch(Event::CompleteBreak).unwrap();
        }

        let ids: Vec<i64> = engine.logs().iter().map(|log| log.id).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        let cycles: Vec<u32> = engine.logs().iter().map(|log| log.cycle).collect();
        assert_eq!(cycles, vec![1, 2, 1]);
    }

    #[test]
    fn subscribers_see_state_changes() {
        let mut engine = engine_with(MemoryStore::default(), Recorder::default());
        let mut rx = engine.subscribe();
        assert!(!rx.has_changed().unwrap());

        engine.pause().unwrap();
        assert!(!rx.has_changed().unwrap());

        engine.start().unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().phase, Phase::Focus);
    }

    #[test]
    fn update_settings_clamps_and_saves() {
        let store = MemoryStore::default();
        let mut engine = engine_with(store.clone(), Recorder::default());

        engine
            .update_settings(Settings {
                focus_minutes: 999,
                ..Settings::default()
            })
            .unwrap();

        assert_eq!(engine.settings().focus_minutes, 120);
        assert_eq!(engine.snapshot().total_seconds, 7200);
        assert_eq!(
            store.settings.lock().unwrap().as_ref().map(|s| s.focus_minutes),
            Some(120)
        );
    }

    #[test]
    fn reload_settings_picks_up_external_changes() {
        let store = MemoryStore::default();
        let mut engine = engine_with(store.clone(), Recorder::default());
        *store.settings.lock().unwrap() = Some(Settings {
            focus_minutes: 30,
            ..Settings::default()
        });

        engine.reload_settings().unwrap();
        assert_eq!(engine.snapshot().remaining_seconds, 1800);
    }
}
