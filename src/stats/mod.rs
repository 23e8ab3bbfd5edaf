//! 专注记录统计（只读）

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone};

use crate::models::SessionLog;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayStats {
    pub date: NaiveDate,
    pub count: usize,
    pub seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub today: DayStats,
    /// 从周日开始的 7 天
    pub week: Vec<DayStats>,
}

impl Summary {
    pub fn week_count(&self) -> usize {
        self.week.iter().map(|d| d.count).sum()
    }

    pub fn week_seconds(&self) -> u64 {
        self.week.iter().map(|d| d.seconds).sum()
    }
}

/// 按 `now` 所在时区统计今天和本周
pub fn summarize<Tz: TimeZone>(logs: &[SessionLog], now: &DateTime<Tz>) -> Summary {
    let tz = now.timezone();
    let today = now.date_naive();
    let week_start = today - Days::new(today.weekday().num_days_from_sunday() as u64);

    let mut week: Vec<DayStats> = (0..7)
        .map(|offset| DayStats {
            date: week_start + Days::new(offset),
            count: 0,
            seconds: 0,
        })
        .collect();

    for log in logs {
        let date = log.started_at.with_timezone(&tz).date_naive();
        if let Some(day) = week.iter_mut().find(|d| d.date == date) {
            day.count += 1;
            day.seconds += log.duration_seconds as u64;
        }
    }

    let today = week
        .iter()
        .find(|d| d.date == today)
        .cloned()
        .unwrap_or(DayStats {
            date: today,
            count: 0,
            seconds: 0,
        });

    Summary { today, week }
}

/// 格式化为 `1h 05m` 或 `25m`
pub fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, Utc};

    fn log_at(tz: &FixedOffset, y: i32, m: u32, d: u32, h: u32) -> SessionLog {
        let started = tz.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().with_timezone(&Utc);
        SessionLog {
            id: started.timestamp_millis(),
            task_label: "t".into(),
            started_at: started,
            ended_at: started + Duration::minutes(25),
            duration_seconds: 1500,
            cycle: 1,
        }
    }

    #[test]
    fn groups_by_local_day_within_week() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        // 2024-05-08 是周三，本周从 05-05 周日开始
        let now = tz.with_ymd_and_hms(2024, 5, 8, 20, 0, 0).unwrap();
        let logs = vec![
            log_at(&tz, 2024, 5, 8, 9),
            log_at(&tz, 2024, 5, 8, 1), // UTC 仍是 05-07，但本地是 05-08
            log_at(&tz, 2024, 5, 5, 10),
            log_at(&tz, 2024, 5, 4, 23), // 上周六
        ];

        let summary = summarize(&logs, &now);
        assert_eq!(summary.today.count, 2);
        assert_eq!(summary.today.seconds, 3000);
        assert_eq!(summary.week.len(), 7);
        assert_eq!(summary.week[0].date, NaiveDate::from_ymd_opt(2024, 5, 5).unwrap());
        assert_eq!(summary.week[0].count, 1);
        assert_eq!(summary.week_count(), 3);
        assert_eq!(summary.week_seconds(), 4500);
    }

    #[test]
    fn durations_format() {
        assert_eq!(format_duration(0), "0m");
        assert_eq!(format_duration(1500), "25m");
        assert_eq!(format_duration(3900), "1h 05m");
    }
}
