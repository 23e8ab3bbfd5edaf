use notify_rust::{Notification, Timeout};
use std::io::Write;
use std::thread;
use std::time::Duration;

use crate::error::Error;
use crate::models::AlarmSound;
use crate::pomodoro::{AlarmPlayer, NotificationKind, Notifier};

/// 桌面通知
pub struct NotificationManager;

impl NotificationManager {
    pub fn new() -> Self {
        Self
    }

    /// 发送番茄钟阶段结束通知
    pub fn send_phase_end(&self, kind: NotificationKind) -> Result<(), Error> {
        phase_end_notification(kind)
            .show()
            .map_err(|e| Error::UnsupportedCapability(format!("desktop notifications: {}", e)))?;
        Ok(())
    }
}

/// 阶段结束通知，带系统提示音
fn phase_end_notification(kind: NotificationKind) -> Notification {
    let (summary, body, sound) = match kind {
        NotificationKind::FocusEnded => (
            "Focus session finished",
            "Nice work. Take a break.",
            "alarm-clock-elapsed",
        ),
        NotificationKind::BreakEnded => (
            "Break is over",
            "Ready for the next focus session?",
            "complete",
        ),
    };

    let mut notification = Notification::new();
    notification
        .summary(&format!("🍅 {}", summary))
        .body(body)
        .icon("alarm-clock")
        .sound_name(sound)
        .timeout(Timeout::Milliseconds(5000));
    notification
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for NotificationManager {
    fn notify(&self, kind: NotificationKind) -> Result<(), Error> {
        self.send_phase_end(kind)
    }
}

/// 用终端响铃播放提示音，每个音符响一次
pub struct TerminalBell;

impl AlarmPlayer for TerminalBell {
    fn play(&self, sound: AlarmSound) -> Result<(), Error> {
        let (notes, note_ms) = sound.pattern();
        let count = notes.len();
        // 不阻塞调用方
        thread::Builder::new()
            .name("alarm".into())
            .spawn(move || {
                let mut stdout = std::io::stdout();
                for _ in 0..count {
                    if stdout.write_all(b"\x07").and_then(|_| stdout.flush()).is_err() {
                        return;
                    }
                    thread::sleep(Duration::from_millis(note_ms));
                }
            })
            .map_err(|e| Error::UnsupportedCapability(format!("alarm thread: {}", e)))?;
        Ok(())
    }
}
