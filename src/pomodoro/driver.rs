//! 计时驱动
//!
//! [`Ticker`] 只根据传入的状态快照做判断：是否需要每秒计时，以及剩余时间
//! 归零时发出一次完成事件。[`Driver`] 是独占 [`Engine`] 的异步任务，命令和
//! 计时事件都在同一个循环里串行处理。

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use super::{Engine, Event, Phase, Snapshot, TimerState};
use crate::models::Settings;

/// 驱动的命令
#[derive(Debug)]
pub enum Command {
    Start,
    Pause,
    Reset,
    StartFocus,
    SetTask(String),
    UpdateSettings(Settings),
    ReloadSettings,
    /// 在之前的命令处理完后回复最新快照
    Query(oneshot::Sender<Snapshot>),
    Shutdown,
}

/// 完成事件的判定，每个归零只触发一次
#[derive(Debug, Default)]
pub struct Ticker {
    fired: bool,
}

impl Ticker {
    /// 运行中的阶段需要计时
    pub fn is_armed(state: &TimerState) -> bool {
        state.phase.is_running()
    }

    /// 观察最新状态，刚归零时返回对应的完成事件
    pub fn observe(&mut self, state: &TimerState) -> Option<Event> {
        if !state.phase.is_running() || state.remaining_seconds > 0 {
            self.fired = false;
            return None;
        }
        if self.fired {
            return None;
        }
        self.fired = true;
        Some(if state.phase == Phase::Focus {
            Event::CompleteFocus
        } else {
            Event::CompleteBreak
        })
    }
}

/// 与驱动任务通信的句柄
#[derive(Clone)]
pub struct DriverHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl DriverHandle {
    pub async fn send(&self, command: Command) -> Result<(), mpsc::error::SendError<Command>> {
        self.commands.send(command).await
    }

    /// 在非异步线程（如 TUI 循环）中发送命令
    pub fn blocking_send(&self, command: Command) -> Result<(), mpsc::error::SendError<Command>> {
        self.commands.blocking_send(command)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// 驱动已停止时返回 `None`
    pub async fn query(&self) -> Option<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Query(tx)).await.ok()?;
        rx.await.ok()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }
}

pub struct Driver {
    engine: Engine,
    ticker: Ticker,
    commands: mpsc::Receiver<Command>,
    period: Duration,
}

impl Driver {
    pub fn new(engine: Engine, period: Duration) -> (Self, DriverHandle) {
        let (tx, rx) = mpsc::channel(32);
        let handle = DriverHandle {
            commands: tx,
            snapshots: engine.subscribe(),
        };
        let driver = Self {
            engine,
            ticker: Ticker::default(),
            commands: rx,
            period,
        };
        (driver, handle)
    }

    /// 以一秒的节拍在后台运行，结束时交还引擎
    pub fn spawn(engine: Engine) -> (DriverHandle, JoinHandle<Engine>) {
        let (driver, handle) = Self::new(engine, Duration::from_secs(1));
        (handle, tokio::spawn(driver.run()))
    }

    pub async fn run(mut self) -> Engine {
        tracing::info!("Timer driver started");
        let mut interval: Option<Interval> = None;

        loop {
            let armed = Ticker::is_armed(self.engine.state());
            if armed && interval.is_none() {
                interval = Some(arm(self.period));
                tracing::debug!("ticker armed");
            } else if !armed && interval.is_some() {
                interval = None;
                tracing::debug!("ticker disarmed");
            }

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                _ = next_tick(&mut interval) => self.step(Event::Tick),
            }
        }

        tracing::info!("Timer driver stopped");
        self.engine
    }

    fn handle(&mut self, command: Command) {
        tracing::debug!(?command, "command");
        let result = match command {
            Command::Start => self.engine.start(),
            Command::Pause => self.engine.pause(),
            Command::Reset => self.engine.reset(),
            Command::StartFocus => self.engine.start_focus(),
            Command::SetTask(label) => self.engine.set_current_task(label),
            Command::UpdateSettings(settings) => self.engine.update_settings(settings),
            Command::ReloadSettings => self.engine.reload_settings(),
            Command::Query(reply) => {
                let _ = reply.send(self.engine.snapshot());
                Ok(())
            }
            Command::Shutdown => Ok(()),
        };
        if let Err(e) = result {
            tracing::warn!("{}", e);
        }
        self.settle();
    }

    fn step(&mut self, event: Event) {
        if let Err(e) = self.engine.dispatch(event) {
            tracing::warn!("{}", e);
        }
        self.settle();
    }

    /// 归零时触发完成事件
    fn settle(&mut self) {
        if let Some(done) = self.ticker.observe(self.engine.state()) {
            tracing::debug!(event = ?done, "phase finished");
            if let Err(e) = self.engine.dispatch(done) {
                tracing::warn!("{}", e);
            }
        }
    }
}

fn arm(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pomodoro::engine::tests::{engine_with, quick_settings, MemoryStore, Recorder};

    fn running(phase: Phase, remaining_seconds: u32) -> TimerState {
        TimerState {
            phase,
            remaining_seconds,
            ..TimerState::idle(&Settings::default())
        }
    }

    #[test]
    fn ticker_fires_once_per_zero_crossing() {
        let mut ticker = Ticker::default();
        assert_eq!(ticker.observe(&running(Phase::Focus, 1)), None);
        assert_eq!(
            ticker.observe(&running(Phase::Focus, 0)),
            Some(Event::CompleteFocus)
        );
        assert_eq!(ticker.observe(&running(Phase::Focus, 0)), None);

        assert_eq!(ticker.observe(&running(Phase::ShortBreak, 300)), None);
        assert_eq!(
            ticker.observe(&running(Phase::ShortBreak, 0)),
            Some(Event::CompleteBreak)
        );
    }

    #[test]
    fn ticker_ignores_idle_and_paused() {
        let mut ticker = Ticker::default();
        assert_eq!(ticker.observe(&running(Phase::Paused, 0)), None);
        assert_eq!(ticker.observe(&running(Phase::Idle, 0)), None);
        assert!(!Ticker::is_armed(&running(Phase::Paused, 10)));
        assert!(Ticker::is_armed(&running(Phase::LongBreak, 10)));
    }

    fn spawn_quick() -> (DriverHandle, JoinHandle<Engine>, MemoryStore) {
        let store = MemoryStore::default();
        *store.settings.lock().unwrap() = Some(quick_settings());
        let engine = engine_with(store.clone(), Recorder::default());
        let (handle, task) = Driver::spawn(engine);
        (handle, task, store)
    }

    #[tokio::test(start_paused = true)]
    async fn focus_runs_down_and_moves_to_break() {
        let (handle, task, store) = spawn_quick();
        handle.send(Command::SetTask("review".into())).await.unwrap();
        handle.send(Command::Start).await.unwrap();

        time::sleep(Duration::from_millis(30_500)).await;
        assert_eq!(handle.snapshot().remaining_seconds, 30);

        time::sleep(Duration::from_secs(30)).await;
        let snap = handle.snapshot();
        assert_eq!(snap.phase, Phase::ShortBreak);
        assert_eq!(snap.remaining_seconds, 60);
        assert_eq!(snap.current_cycle, 1);

        handle.send(Command::Shutdown).await.unwrap();
        let engine = task.await.unwrap();
        assert_eq!(engine.logs().len(), 1);
        assert_eq!(store.logs.lock().unwrap()[0].task_label, "review");
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_the_clock_and_resume_rearms() {
        let (handle, task, _store) = spawn_quick();
        handle.send(Command::Start).await.unwrap();
        time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(handle.snapshot().remaining_seconds, 50);

        handle.send(Command::Pause).await.unwrap();
        time::sleep(Duration::from_secs(30)).await;
        let snap = handle.snapshot();
        assert_eq!(snap.phase, Phase::Paused);
        assert_eq!(snap.remaining_seconds, 50);

        handle.send(Command::Start).await.unwrap();
        time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(handle.snapshot().remaining_seconds, 45);
        assert_eq!(handle.snapshot().phase, Phase::Focus);

        drop(handle);
        let engine = task.await.unwrap();
        assert!(engine.logs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_continue_cycles_into_long_break_and_back() {
        let (handle, task, store) = spawn_quick();
        handle.send(Command::Start).await.unwrap();

        // 专注 60 + 短休 60 + 专注 60 + 长休 120，再进入新一轮专注
        time::sleep(Duration::from_millis(300_500)).await;
        let snap = handle.snapshot();
        assert_eq!(snap.phase, Phase::Focus);
        assert_eq!(snap.current_cycle, 1);
        assert_eq!(snap.remaining_seconds, 60);

        handle.send(Command::Reset).await.unwrap();
        assert_eq!(handle.query().await.unwrap().phase, Phase::Idle);
        handle.send(Command::Shutdown).await.unwrap();
        let engine = task.await.unwrap();
        assert_eq!(engine.snapshot().phase, Phase::Idle);

        let cycles: Vec<u32> = store.logs.lock().unwrap().iter().map(|l| l.cycle).collect();
        assert_eq!(cycles, vec![1, 2]);
    }
}
