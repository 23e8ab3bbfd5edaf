use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// 提示音
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmSound {
    #[default]
    Bell,
    Chime,
    Gentle,
    Alert,
}

impl AlarmSound {
    pub const ALL: [AlarmSound; 4] = [
        AlarmSound::Bell,
        AlarmSound::Chime,
        AlarmSound::Gentle,
        AlarmSound::Alert,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AlarmSound::Bell => "bell",
            AlarmSound::Chime => "chime",
            AlarmSound::Gentle => "gentle",
            AlarmSound::Alert => "alert",
        }
    }

    /// 音高序列（Hz）与每个音的时长（毫秒）
    pub fn pattern(self) -> (&'static [f32], u64) {
        match self {
            AlarmSound::Bell => (&[523.25, 659.25, 783.99], 300),
            AlarmSound::Chime => (&[880.0, 1046.5, 1318.5], 400),
            AlarmSound::Gentle => (&[440.0, 554.37, 659.25], 500),
            AlarmSound::Alert => (&[1000.0, 800.0, 1000.0], 200),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|sound| sound.name().eq_ignore_ascii_case(s.trim()))
    }
}

/// 界面主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Default,
    Ocean,
    Forest,
    Sunset,
    Lavender,
}

impl Theme {
    pub const ALL: [Theme; 5] = [
        Theme::Default,
        Theme::Ocean,
        Theme::Forest,
        Theme::Sunset,
        Theme::Lavender,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Theme::Default => "default",
            Theme::Ocean => "ocean",
            Theme::Forest => "forest",
            Theme::Sunset => "sunset",
            Theme::Lavender => "lavender",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|theme| theme.name().eq_ignore_ascii_case(s.trim()))
    }
}

/// (字段名, 最小值, 最大值)
pub const FOCUS_RANGE: (&str, u32, u32) = ("focus_minutes", 1, 120);
pub const SHORT_BREAK_RANGE: (&str, u32, u32) = ("short_break_minutes", 1, 30);
pub const LONG_BREAK_RANGE: (&str, u32, u32) = ("long_break_minutes", 1, 60);
pub const CYCLES_RANGE: (&str, u32, u32) = ("cycles_before_long_break", 1, 10);

/// 把输入截断到合法范围，越界时附带一个 `InvalidSetting`
pub fn clamp_setting(range: (&'static str, u32, u32), value: i64) -> (u32, Option<Error>) {
    let (field, min, max) = range;
    let clamped = value.clamp(min as i64, max as i64) as u32;
    if clamped as i64 == value {
        (clamped, None)
    } else {
        (
            clamped,
            Some(Error::InvalidSetting {
                field,
                value,
                min,
                max,
                clamped,
            }),
        )
    }
}

/// 计时器设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub focus_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub cycles_before_long_break: u32,
    pub auto_start_next_cycle: bool,
    pub alarm: AlarmSound,
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            cycles_before_long_break: 4,
            auto_start_next_cycle: false,
            alarm: AlarmSound::Bell,
            theme: Theme::Default,
        }
    }
}

impl Settings {
    pub fn focus_seconds(&self) -> u32 {
        self.focus_minutes * 60
    }

    pub fn short_break_seconds(&self) -> u32 {
        self.short_break_minutes * 60
    }

    pub fn long_break_seconds(&self) -> u32 {
        self.long_break_minutes * 60
    }

    /// 截断所有越界字段，返回被截断的字段列表
    pub fn sanitized(mut self) -> (Self, Vec<Error>) {
        let mut clamped = Vec::new();
        for (range, slot) in [
            (FOCUS_RANGE, &mut self.focus_minutes),
            (SHORT_BREAK_RANGE, &mut self.short_break_minutes),
            (LONG_BREAK_RANGE, &mut self.long_break_minutes),
            (CYCLES_RANGE, &mut self.cycles_before_long_break),
        ] {
            let (value, err) = clamp_setting(range, *slot as i64);
            *slot = value;
            clamped.extend(err);
        }
        (self, clamped)
    }
}

/// 一次完成的专注记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLog {
    pub id: i64,
    pub task_label: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// 配置的专注时长，而非实际经过的墙钟时间
    pub duration_seconds: u32,
    pub cycle: u32,
}

/// 打断时随手记下的便签
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    pub id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Memo {
    pub fn new(text: String) -> Self {
        let now = Utc::now();
        Self {
            id: now.timestamp_millis(),
            text,
            created_at: now,
        }
    }
}

/// 每周固定某天要做的个人任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Routine {
    pub id: Option<i64>,
    /// 0 = 周日 … 6 = 周六
    pub weekday: u8,
    pub text: String,
}

impl Routine {
    pub fn new(weekday: u8, text: String) -> Self {
        Self {
            id: None,
            weekday,
            text,
        }
    }
}
