use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

const LAST_MINUTE_OF_DAY: f64 = 23.0 + 59.0 / 60.0;
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// How an hour written without `am`/`pm` (and without a period to inherit)
/// is interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum UnmarkedHourPolicy {
    /// The hour is taken literally, so `14-15` is afternoon but `2-3` is 2 AM.
    #[default]
    TwentyFourHour,
    /// The hour is read as AM; a bare `12` becomes midnight.
    AssumeMorning,
}

pub fn parse_time(
    hour_digits: &str,
    minute_digits: Option<&str>,
    period: Option<&str>,
    policy: UnmarkedHourPolicy,
) -> Option<f64> {
    let mut hour = hour_digits.trim().parse::<u32>().ok()?;
    let minute = match minute_digits.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value.parse::<u32>().ok()?,
        None => 0,
    };

    let period = period
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_ascii_lowercase);
    match period.as_deref() {
        Some("pm") if hour != 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        Some(_) => {}
        None => {
            if policy == UnmarkedHourPolicy::AssumeMorning && hour == 12 {
                hour = 0;
            }
        }
    }

    Some(f64::from(hour) + f64::from(minute) / 60.0)
}

/// Reads a typed clock time such as `9`, `9:30`, `2pm` or `14:15`.
pub fn parse_clock_text(text: &str, policy: UnmarkedHourPolicy) -> Option<f64> {
    let lower = text.trim().to_ascii_lowercase();
    let (clock, period) = match lower.strip_suffix("am").or_else(|| lower.strip_suffix("pm")) {
        Some(clock) => (clock.trim_end(), Some(&lower[clock.len()..])),
        None => (lower.as_str(), None),
    };
    let (hour, minute) = match clock.split_once(':') {
        Some((hour, minute)) => (hour, Some(minute)),
        None => (clock, None),
    };
    if hour.is_empty() || !hour.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if minute.is_some_and(|minute| minute.parse::<u32>().map_or(true, |value| value >= 60)) {
        return None;
    }
    let decimal = parse_time(hour, minute, period, policy)?;
    (decimal <= 24.0).then_some(decimal)
}

fn split_decimal(decimal: f64) -> (u32, u32) {
    let clamped = if decimal.is_finite() {
        decimal.clamp(0.0, LAST_MINUTE_OF_DAY)
    } else {
        0.0
    };
    let mut hours = clamped.floor() as u32;
    let mut minutes = ((clamped - f64::from(hours)) * 60.0).round() as u32;
    if minutes >= 60 {
        if hours < 23 {
            hours += 1;
            minutes = 0;
        } else {
            minutes = 59;
        }
    }
    (hours, minutes)
}

pub fn decimal_to_time_string(decimal: f64) -> String {
    let (hours, minutes) = split_decimal(decimal);
    format_clock(hours, minutes)
}

pub fn format_clock(hour24: u32, minute: u32) -> String {
    let period = if hour24 >= 12 { "PM" } else { "AM" };
    let display_hour = match hour24 {
        0 => 12,
        hour if hour > 12 => hour - 12,
        hour => hour,
    };
    format!("{display_hour}:{minute:02} {period}")
}

pub fn format_time_range(start: f64, end: f64) -> String {
    format!(
        "{} - {}",
        decimal_to_time_string(start),
        decimal_to_time_string(end)
    )
}

pub fn format_hour_label(hour: u32) -> String {
    match hour {
        0 => "12 AM".to_string(),
        12 => "12 PM".to_string(),
        hour if hour < 12 => format!("{hour} AM"),
        hour => format!("{} PM", hour - 12),
    }
}

pub fn snap_to_quarter_hour(decimal: f64) -> f64 {
    (decimal * 4.0).round() / 4.0
}

/// Pulls a block end past `11:59 PM` back to the latest time markdown can hold.
pub fn clamp_to_last_minute(decimal: f64) -> f64 {
    if decimal > LAST_MINUTE_OF_DAY {
        LAST_MINUTE_OF_DAY
    } else {
        decimal
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start_hour: 6,
            end_hour: 22,
        }
    }
}

impl TimeWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self, String> {
        if end_hour > 24 {
            return Err(format!("end hour {end_hour} is past the end of the day"));
        }
        if end_hour <= start_hour {
            return Err(format!(
                "end hour {end_hour} must be after start hour {start_hour}"
            ));
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    pub fn total_hours(&self) -> u32 {
        self.end_hour - self.start_hour
    }

    pub fn contains(&self, decimal: f64) -> bool {
        decimal >= f64::from(self.start_hour) && decimal <= f64::from(self.end_hour)
    }

    /// Snaps a dragged start to the quarter hour and keeps `[start, start + duration]`
    /// inside the window.
    pub fn clamp_start(&self, start: f64, duration: f64) -> f64 {
        let lower = f64::from(self.start_hour);
        let upper = (f64::from(self.end_hour) - duration).max(lower);
        snap_to_quarter_hour(start).clamp(lower, upper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleDate {
    #[default]
    Today,
    Day(NaiveDate),
}

impl ScheduleDate {
    /// `today` stays symbolic so the remote API resolves it in its own timezone.
    pub fn for_date(date: NaiveDate, today: NaiveDate) -> Self {
        if date == today {
            Self::Today
        } else {
            Self::Day(date)
        }
    }

    pub fn api_param(&self) -> String {
        match self {
            Self::Today => "today".to_string(),
            Self::Day(date) => date.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Today => today,
            Self::Day(date) => *date,
        }
    }

    pub fn shift(&self, days: i64, today: NaiveDate) -> Self {
        let shifted = self.resolve(today) + Duration::days(days);
        Self::for_date(shifted, today)
    }
}

pub fn format_date_title(date: NaiveDate) -> String {
    let weekday = WEEKDAYS[date.weekday().num_days_from_monday() as usize];
    let month = MONTHS[date.month0() as usize];
    format!("{weekday}, {} {month}", date.day())
}
