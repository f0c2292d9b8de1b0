use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;

use crate::dates;

/// Days in the activity series, ending today inclusive.
pub const DAILY_WINDOW_DAYS: i64 = 31;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCount {
    pub date: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStats {
    pub total_students: usize,
    pub total_comments: usize,
    pub comments_today: usize,
    /// Rounded to two decimals; zero when the roster is empty.
    pub average_comments_per_student: f64,
    pub daily: Vec<DailyCount>,
}

fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Aggregates over the whole roster. `comment_dates` are the stored display
/// dates (`DD/MM/YYYY`); values that fall outside the window or do not parse
/// still count toward the total.
pub fn roster_stats<'a, I>(student_count: usize, comment_dates: I, today: NaiveDate) -> RosterStats
where
    I: IntoIterator<Item = &'a str>,
{
    let window_start = today - Duration::days(DAILY_WINDOW_DAYS - 1);
    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    let mut total_comments = 0usize;

    for raw in comment_dates {
        total_comments += 1;
        if let Some(d) = dates::parse_display_date(raw) {
            if d >= window_start && d <= today {
                *per_day.entry(d).or_insert(0) += 1;
            }
        }
    }

    let daily: Vec<DailyCount> = (0..DAILY_WINDOW_DAYS)
        .map(|i| {
            let d = window_start + Duration::days(i);
            DailyCount {
                date: dates::format_display_date(d),
                count: per_day.get(&d).copied().unwrap_or(0),
            }
        })
        .collect();

    let average = if student_count > 0 {
        round_2(total_comments as f64 / student_count as f64)
    } else {
        0.0
    };

    RosterStats {
        total_students: student_count,
        total_comments,
        comments_today: per_day.get(&today).copied().unwrap_or(0),
        average_comments_per_student: average,
        daily,
    }
}
