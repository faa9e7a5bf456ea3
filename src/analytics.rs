use std::{cmp::Ordering, collections::BTreeMap};

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Weekday};
use serde::Serialize;

use crate::{
    classify::{DAY_IN_RANGE_MAX, DayBand, ReadingStatus, status_for},
    reading::{Reading, ReadingType},
    traits::{Clock, SystemClock},
    user::User,
};

// ==================== Summary Types ====================

/// Per-type statistics over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatSummary {
    pub reading_type: ReadingType,
    /// Unrounded arithmetic mean.
    pub average: f64,
    pub count: usize,
    pub min: i32,
    pub max: i32,
}

impl StatSummary {
    /// Average as shown on cards (nearest whole mg/dL).
    pub fn rounded_average(&self) -> i64 {
        self.average.round() as i64
    }
}

/// Readings that share one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayGroup {
    pub readings: Vec<Reading>,
    /// Mean across all reading types for the date.
    pub average: f64,
}

impl DayGroup {
    pub fn rounded_average(&self) -> i64 {
        self.average.round() as i64
    }
}

/// One cell of the calendar month view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub reading_count: usize,
    pub average: Option<i64>,
    pub band: DayBand,
}

/// One point of the per-type trend chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub reading_type: ReadingType,
    pub average: f64,
}

/// Figures behind the patient dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub window_days: i64,
    pub stats: BTreeMap<ReadingType, StatSummary>,
    /// `None` when the window holds no readings.
    pub in_range_percentage: Option<u8>,
    pub latest: Option<Reading>,
    pub recent: Vec<Reading>,
}

/// Per-user row in the admin overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserActivity {
    pub user_id: i32,
    pub name: String,
    pub email: String,
    pub reading_count: usize,
    pub latest: Option<Reading>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminOverview {
    pub total_users: usize,
    pub total_readings: usize,
    /// Users with at least one reading.
    pub active_users: usize,
    pub avg_readings_per_user: i64,
    pub users: Vec<UserActivity>,
}

/// Totals shown under the calendar for one month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonthSummary {
    pub total_readings: usize,
    /// Readings whose status is normal for their type.
    pub normal_readings: usize,
    /// Readings above the calendar's 140 mg/dL high band, any type.
    pub high_readings: usize,
    /// Distinct dates with at least one reading.
    pub days_with_readings: usize,
}

/// Admin drill-down for a single user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDetail {
    pub stats: BTreeMap<ReadingType, StatSummary>,
    pub total_readings: usize,
    pub readings_in_window: usize,
}

// ==================== Ordering ====================

fn latest_first(a: &Reading, b: &Reading) -> Ordering {
    (b.date, b.time).cmp(&(a.date, a.time))
}

/// Sort by (date desc, time desc). Stable, so equal timestamps keep input order.
pub fn sort_latest_first(readings: &mut [Reading]) {
    readings.sort_by(latest_first);
}

/// The first reading in (date desc, time desc) order.
///
/// On identical date and time the earliest one in the input wins, which is the
/// same element [`sort_latest_first`] would put first.
pub fn latest_reading(readings: &[Reading]) -> Option<&Reading> {
    readings.iter().fold(None, |best, r| match best {
        Some(b) if latest_first(r, b) != Ordering::Less => Some(b),
        _ => Some(r),
    })
}

// ==================== Window Filtering ====================

/// First date that falls inside a trailing window ending `today`.
///
/// Windows reaching past the earliest representable date start at
/// [`NaiveDate::MIN`].
pub fn window_start(today: NaiveDate, window_days: i64) -> NaiveDate {
    ChronoDuration::try_days(window_days)
        .and_then(|span| today.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
}

fn in_window(reading: &Reading, start: NaiveDate) -> bool {
    reading.date >= start
}

pub fn count_in_window(readings: &[Reading], window_days: i64, today: NaiveDate) -> usize {
    let start = window_start(today, window_days);
    readings.iter().filter(|r| in_window(r, start)).count()
}

// ==================== Aggregation ====================

/// Aggregate per reading type over a trailing window using the system clock.
pub fn aggregate_by_type(
    readings: &[Reading],
    window_days: i64,
) -> BTreeMap<ReadingType, StatSummary> {
    aggregate_by_type_with_clock(readings, window_days, &SystemClock)
}

/// Aggregate per reading type over a trailing window with a custom clock.
pub fn aggregate_by_type_with_clock<C: Clock>(
    readings: &[Reading],
    window_days: i64,
    clock: &C,
) -> BTreeMap<ReadingType, StatSummary> {
    aggregate_by_type_on(readings, window_days, clock.today())
}

/// Aggregate per reading type for readings dated on or after
/// `today - window_days`. Types without readings are absent from the map.
pub fn aggregate_by_type_on(
    readings: &[Reading],
    window_days: i64,
    today: NaiveDate,
) -> BTreeMap<ReadingType, StatSummary> {
    let start = window_start(today, window_days);

    // (sum, count, min, max)
    let mut acc: BTreeMap<ReadingType, (i64, usize, i32, i32)> = BTreeMap::new();
    for r in readings.iter().filter(|r| in_window(r, start)) {
        let entry = acc
            .entry(r.reading_type)
            .or_insert((0, 0, r.level, r.level));
        entry.0 += i64::from(r.level);
        entry.1 += 1;
        entry.2 = entry.2.min(r.level);
        entry.3 = entry.3.max(r.level);
    }

    acc.into_iter()
        .map(|(reading_type, (sum, count, min, max))| {
            (
                reading_type,
                StatSummary {
                    reading_type,
                    average: sum as f64 / count as f64,
                    count,
                    min,
                    max,
                },
            )
        })
        .collect()
}

/// Group readings by their exact calendar date. Within a date, readings keep
/// input order.
pub fn aggregate_by_date(readings: &[Reading]) -> BTreeMap<NaiveDate, DayGroup> {
    let mut groups: BTreeMap<NaiveDate, Vec<Reading>> = BTreeMap::new();
    for r in readings {
        groups.entry(r.date).or_default().push(r.clone());
    }

    groups
        .into_iter()
        .map(|(date, readings)| {
            let sum: i64 = readings.iter().map(|r| i64::from(r.level)).sum();
            let average = sum as f64 / readings.len() as f64;
            (date, DayGroup { readings, average })
        })
        .collect()
}

/// Share of readings whose status is normal for their type, as a whole percent.
pub fn in_range_percentage(readings: &[Reading]) -> Option<u8> {
    if readings.is_empty() {
        return None;
    }
    let in_range = readings
        .iter()
        .filter(|r| status_for(r.level, r.reading_type).is_in_range())
        .count();
    Some(((in_range as f64 / readings.len() as f64) * 100.0).round() as u8)
}

// ==================== History Filtering ====================

/// Filters applied to the history view and its exports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingFilter {
    pub reading_type: Option<ReadingType>,
    pub status: Option<ReadingStatus>,
    /// Matched against notes (case-insensitive), ISO date and level digits.
    pub search: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ReadingFilter {
    pub fn matches(&self, reading: &Reading) -> bool {
        if self.reading_type.is_some_and(|t| t != reading.reading_type) {
            return false;
        }
        if self
            .status
            .is_some_and(|s| s != status_for(reading.level, reading.reading_type))
        {
            return false;
        }
        if self.from.is_some_and(|from| reading.date < from) {
            return false;
        }
        if self.to.is_some_and(|to| reading.date > to) {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let needle = term.to_lowercase();
                reading
                    .notes
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(&needle))
                    || reading.date.format("%Y-%m-%d").to_string().contains(term)
                    || reading.level.to_string().contains(term)
            }
        }
    }

    /// Keep matching readings, preserving order.
    pub fn apply(&self, readings: &[Reading]) -> Vec<Reading> {
        readings.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

// ==================== Views ====================

pub fn dashboard_summary(
    readings: &[Reading],
    window_days: i64,
    recent_count: usize,
    today: NaiveDate,
) -> DashboardSummary {
    let start = window_start(today, window_days);
    let windowed: Vec<Reading> = readings
        .iter()
        .filter(|r| in_window(r, start))
        .cloned()
        .collect();

    let mut recent = readings.to_vec();
    sort_latest_first(&mut recent);
    recent.truncate(recent_count);

    DashboardSummary {
        window_days,
        stats: aggregate_by_type_on(readings, window_days, today),
        in_range_percentage: in_range_percentage(&windowed),
        latest: latest_reading(readings).cloned(),
        recent,
    }
}

/// One entry per day of the given month. Returns an empty list for an invalid
/// year/month.
pub fn month_calendar(year: i32, month: u32, readings: &[Reading]) -> Vec<CalendarDay> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };

    let groups = aggregate_by_date(readings);

    first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|date| {
            let group = groups.get(&date);
            let average = group.map(DayGroup::rounded_average);
            CalendarDay {
                date,
                reading_count: group.map_or(0, |g| g.readings.len()),
                average,
                band: DayBand::from_average(average),
            }
        })
        .collect()
}

/// Monthly totals for the calendar view. Readings outside the month are
/// ignored.
pub fn month_summary(year: i32, month: u32, readings: &[Reading]) -> MonthSummary {
    let in_month: Vec<&Reading> = readings
        .iter()
        .filter(|r| r.date.year() == year && r.date.month() == month)
        .collect();

    let mut dates: Vec<NaiveDate> = in_month.iter().map(|r| r.date).collect();
    dates.sort_unstable();
    dates.dedup();

    MonthSummary {
        total_readings: in_month.len(),
        normal_readings: in_month
            .iter()
            .filter(|r| status_for(r.level, r.reading_type) == ReadingStatus::Normal)
            .count(),
        high_readings: in_month
            .iter()
            .filter(|r| i64::from(r.level) > DAY_IN_RANGE_MAX)
            .count(),
        days_with_readings: dates.len(),
    }
}

/// Per-date, per-type averages over a trailing window, ordered by date then
/// type.
pub fn daily_type_averages(
    readings: &[Reading],
    window_days: i64,
    today: NaiveDate,
) -> Vec<ChartPoint> {
    let start = window_start(today, window_days);

    let mut acc: BTreeMap<(NaiveDate, ReadingType), (i64, usize)> = BTreeMap::new();
    for r in readings.iter().filter(|r| in_window(r, start)) {
        let entry = acc.entry((r.date, r.reading_type)).or_insert((0, 0));
        entry.0 += i64::from(r.level);
        entry.1 += 1;
    }

    acc.into_iter()
        .map(|((date, reading_type), (sum, count))| ChartPoint {
            date,
            reading_type,
            average: sum as f64 / count as f64,
        })
        .collect()
}

pub fn admin_overview(users: &[User], readings: &[Reading]) -> AdminOverview {
    let activity: Vec<UserActivity> = users
        .iter()
        .map(|user| {
            let own: Vec<Reading> = readings
                .iter()
                .filter(|r| r.user_id == user.id)
                .cloned()
                .collect();
            UserActivity {
                user_id: user.id,
                name: user.name.clone(),
                email: user.email.clone(),
                reading_count: own.len(),
                latest: latest_reading(&own).cloned(),
            }
        })
        .collect();

    let avg_readings_per_user = if users.is_empty() {
        0
    } else {
        (readings.len() as f64 / users.len() as f64).round() as i64
    };

    AdminOverview {
        total_users: users.len(),
        total_readings: readings.len(),
        active_users: activity.iter().filter(|a| a.reading_count > 0).count(),
        avg_readings_per_user,
        users: activity,
    }
}

pub fn user_detail(readings: &[Reading], window_days: i64, today: NaiveDate) -> UserDetail {
    UserDetail {
        stats: aggregate_by_type_on(readings, window_days, today),
        total_readings: readings.len(),
        readings_in_window: count_in_window(readings, window_days, today),
    }
}

// ==================== Utilities ====================

/// English weekday name for a date.
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
