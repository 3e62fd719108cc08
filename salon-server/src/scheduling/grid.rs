//! Time grid - pure calendar and slot partition functions
//!
//! 7 天滚动日历：今天 + 后 6 天。小时槽划分：把 [开门, 关门) 切成
//! 整点 60 分钟槽，不足一小时的尾段丢弃。

use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::utils::{AppError, AppResult, time};
use shared::models::DayCell;

/// Slot granularity in minutes
pub const SLOT_MINUTES: i64 = 60;

const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Build the rolling 7-day calendar starting at `today`
pub fn rolling_week(today: NaiveDate) -> Vec<DayCell> {
    (0..7)
        .map(|offset| {
            let date = today + chrono::Duration::days(offset);
            let weekday = time::weekday_of(date);
            DayCell {
                date: date.format("%Y-%m-%d").to_string(),
                weekday,
                label: WEEKDAY_LABELS[weekday as usize].to_string(),
                day_of_month: date.day(),
                is_today: offset == 0,
            }
        })
        .collect()
}

/// Partition `[open, close)` into 60-minute slots.
///
/// Fails loudly when the range would produce zero or negative slot
/// durations; a silent empty grid here would mask malformed working-hour
/// data.
pub fn partition_slots(open: NaiveTime, close: NaiveTime) -> AppResult<Vec<(NaiveTime, NaiveTime)>> {
    if close <= open {
        return Err(AppError::validation(format!(
            "Working hours close ({}) must be after open ({})",
            time::format_hhmm(close),
            time::format_hhmm(open),
        )));
    }

    let mut slots = Vec::new();
    let mut start = open;
    loop {
        let end = match start.overflowing_add_signed(chrono::Duration::minutes(SLOT_MINUTES)) {
            (end, 0) => end,
            // wrapped past midnight
            _ => break,
        };
        if end > close {
            break;
        }
        slots.push((start, end));
        start = end;
    }
    Ok(slots)
}
