//! 时间工具函数 — 业务时区转换与星期规整
//!
//! 所有日期→时间戳转换统一在这里完成，存储层只接收 `i64` Unix millis。
//!
//! 星期索引规整：上游工作时间记录可能使用两种约定 —
//! 0 起始 (Sun=0..Sat=6) 或 ISO 1-7 (Mon=1..Sun=7)。两种约定在 1..6
//! (Mon..Sat) 上一致，仅周日不同 (0 或 7)，因此规整规则为 7 → 0，
//! 0..6 保持不变，>7 为数据错误。

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use chrono_tz::Tz;

use super::{AppError, AppResult};

/// 解析日期字符串 (YYYY-MM-DD)
pub fn parse_date(date: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid date format: {}", date)))
}

/// 解析时间字符串 (HH:mm)
pub fn parse_hhmm(time: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| AppError::validation(format!("Invalid time format: {}", time)))
}

/// NaiveTime → "HH:mm"
pub fn format_hhmm(time: NaiveTime) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}

/// 规整星期索引到 0-6 (0 = Sunday)
///
/// 7 (ISO 周日) → 0；0..6 原样返回；其余为数据错误。
pub fn canonical_weekday(raw: u8) -> AppResult<u8> {
    match raw {
        0..=6 => Ok(raw),
        7 => Ok(0),
        other => Err(AppError::validation(format!(
            "Invalid day-of-week index: {}",
            other
        ))),
    }
}

/// 日期 → 规整星期索引 (0 = Sunday)
pub fn weekday_of(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// 日期 + 时间 → Unix millis (业务时区)
///
/// DST gap fallback: 如果本地时间不存在 (夏令时跳跃)，fallback 到 UTC。
pub fn date_time_to_millis(date: NaiveDate, time: NaiveTime, tz: Tz) -> i64 {
    let naive = date.and_time(time);
    naive
        .and_local_timezone(tz)
        .latest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis())
}

/// 当前业务时区的日期
pub fn today_in_tz(tz: Tz) -> NaiveDate {
    chrono::Utc::now().with_timezone(&tz).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_valid() {
        let date = parse_date("2025-03-10").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date("10/03/2025").is_err());
        assert!(parse_date("2025-13-01").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("09:00").unwrap().hour(), 9);
        assert_eq!(parse_hhmm("23:30").unwrap().minute(), 30);
        assert!(parse_hhmm("9am").is_err());
        assert!(parse_hhmm("25:00").is_err());
    }

    #[test]
    fn test_canonical_weekday() {
        // both conventions agree on Mon..Sat
        for d in 1..=6u8 {
            assert_eq!(canonical_weekday(d).unwrap(), d);
        }
        // Sunday: 0-based says 0, ISO says 7
        assert_eq!(canonical_weekday(0).unwrap(), 0);
        assert_eq!(canonical_weekday(7).unwrap(), 0);
        // anything else is malformed data
        assert!(canonical_weekday(8).is_err());
        assert!(canonical_weekday(255).is_err());
    }

    #[test]
    fn test_weekday_of() {
        // 2025-03-10 is a Monday
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(weekday_of(date), 1);
        // 2025-03-09 is a Sunday
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(weekday_of(date), 0);
    }

    #[test]
    fn test_date_time_to_millis_is_tz_aware() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let madrid = date_time_to_millis(date, time, chrono_tz::Europe::Madrid);
        let utc = date_time_to_millis(date, time, chrono_tz::UTC);
        // Madrid is UTC+2 in June, so 09:00 local is 07:00 UTC
        assert_eq!(utc - madrid, 2 * 3600 * 1000);
    }
}
