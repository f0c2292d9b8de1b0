use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Day-first date used throughout the comment log, e.g. `09/08/2024`.
pub const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";
/// 12-hour clock with seconds, e.g. `01:05:09 PM`.
pub const DISPLAY_TIME_FORMAT: &str = "%I:%M:%S %p";
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_display_date(d: NaiveDate) -> String {
    d.format(DISPLAY_DATE_FORMAT).to_string()
}

pub fn format_display_time(t: NaiveTime) -> String {
    t.format(DISPLAY_TIME_FORMAT).to_string()
}

pub fn parse_display_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DISPLAY_DATE_FORMAT).ok()
}

/// Accepts the 12-hour display form as well as plain `HH:MM:SS`, since older
/// rows were written by whatever locale the browser had.
pub fn parse_display_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, DISPLAY_TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// Combined sort key for a stored (date, time) pair. A missing or garbled
/// time falls back to midnight; a garbled date yields `None`.
pub fn display_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let d = parse_display_date(date)?;
    let t = parse_display_time(time).unwrap_or(NaiveTime::MIN);
    Some(d.and_time(t))
}

/// Normalizes user input to the display date form. Accepts `YYYY-MM-DD`
/// (what a date picker sends) or an already day-first value.
pub fn normalize_input_date(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, ISO_DATE_FORMAT) {
        return Some(format_display_date(d));
    }
    parse_display_date(s).map(format_display_date)
}

pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), ISO_DATE_FORMAT).ok()
}
