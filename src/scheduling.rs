//! Availability and queue-ETA computation.
//!
//! Everything here is a pure function of its inputs: handlers fetch the
//! current rows, call in, and serialize the result. Nothing is cached or
//! written back, so two calls with the same snapshot produce the same answer.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};

/// Slot grid granularity in minutes. Fixed regardless of service duration:
/// slots sit on an even grid rather than packing back-to-back.
pub const STEP_MINUTES: i64 = 10;

/// Duration assumed when a service row is missing or carries no duration.
pub const FALLBACK_DURATION_MINUTES: i64 = 20;

/// A candidate bookable interval, derived per request and never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Summary counters for the admin dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub total_active: i64,
    pub queued: i64,
    pub arrived: i64,
    pub avg_eta_minutes: i64,
}

/// Strictly parses a `YYYY-MM-DD` calendar date. Anything else is a client
/// error at the handler boundary, never silently coerced.
pub fn parse_day(date: &str) -> Option<NaiveDate> {
    if date.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// `[midnight, next midnight)` for the date, interpreted at UTC.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

/// Weekday index with 0 = Sunday .. 6 = Saturday, matching shop_hours rows.
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// Accepts "09:00" or "09:00:00". Unparseable hours fall back to 9 and
/// minutes to 0, the same forgiving defaults the booking flow has always had.
pub fn parse_hhmm(time: &str) -> (i64, i64) {
    let mut parts = time.split(':');
    let hh = parts
        .next()
        .and_then(|p| p.trim().parse::<i64>().ok())
        .unwrap_or(9);
    let mm = parts
        .next()
        .and_then(|p| p.trim().parse::<i64>().ok())
        .unwrap_or(0);
    (hh, mm)
}

/// Enumerates candidate slots between the open and close times of `date`.
///
/// The cursor starts at open and advances by `step_minutes`; a candidate is
/// emitted while the full service duration still fits before close. A
/// non-positive duration or step yields nothing.
pub fn generate_slots(
    date: NaiveDate,
    open_time: &str,
    close_time: &str,
    duration_minutes: i64,
    step_minutes: i64,
) -> Vec<Slot> {
    if duration_minutes <= 0 || step_minutes <= 0 {
        return Vec::new();
    }

    let (day_start, _) = day_bounds(date);
    let (oh, om) = parse_hhmm(open_time);
    let (ch, cm) = parse_hhmm(close_time);

    let open_at = day_start + Duration::minutes(oh * 60 + om);
    let close_at = day_start + Duration::minutes(ch * 60 + cm);
    let duration = Duration::minutes(duration_minutes);

    let mut slots = Vec::new();
    let mut cursor = open_at;
    while cursor + duration <= close_at {
        slots.push(Slot {
            start: cursor,
            end: cursor + duration,
        });
        cursor += Duration::minutes(step_minutes);
    }
    slots
}

/// Half-open interval overlap: [s1, e1) and [s2, e2) share an instant
/// iff s1 < e2 && e1 > s2.
pub fn overlaps(
    s1: DateTime<Utc>,
    e1: DateTime<Utc>,
    s2: DateTime<Utc>,
    e2: DateTime<Utc>,
) -> bool {
    s1 < e2 && e1 > s2
}

/// Drops every slot that overlaps any existing booked interval, preserving
/// order. The caller restricts `booked` to the day window beforehand; this
/// does no date filtering of its own. Linear scan, fine at tens of each.
pub fn filter_available(slots: Vec<Slot>, booked: &[(DateTime<Utc>, DateTime<Utc>)]) -> Vec<Slot> {
    slots
        .into_iter()
        .filter(|slot| {
            !booked
                .iter()
                .any(|&(bs, be)| overlaps(slot.start, slot.end, bs, be))
        })
        .collect()
}

/// "HH:MM" display label for a slot start, UTC clock.
pub fn slot_label(at: DateTime<Utc>) -> String {
    format!("{:02}:{:02}", at.hour(), at.minute())
}

/// Projects the wait before each queue entry is served, in input order.
///
/// Single-server FIFO model: the entry at the front waits 0, every later
/// entry waits the sum of the durations ahead of it. Invalid durations count
/// as 0 so a bad row can never sink the whole snapshot.
pub fn project_etas(durations: &[i64]) -> Vec<i64> {
    let mut running = 0;
    durations
        .iter()
        .map(|&d| {
            let eta = running;
            running += d.max(0);
            eta
        })
        .collect()
}

/// Folds an active-queue snapshot of (status, eta_minutes) pairs into the
/// dashboard counters. An empty queue averages to 0, not a division by zero.
pub fn aggregate<'a, I>(entries: I) -> QueueStats
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut stats = QueueStats::default();
    let mut eta_sum: i64 = 0;
    for (status, eta) in entries {
        stats.total_active += 1;
        match status {
            "queued" => stats.queued += 1,
            "arrived" => stats.arrived += 1,
            _ => {}
        }
        eta_sum += eta;
    }
    if stats.total_active > 0 {
        stats.avg_eta_minutes = (eta_sum as f64 / stats.total_active as f64).round() as i64;
    }
    stats
}

/// TV layout split, percent of screen width given to the queue panel.
pub fn clamp_left_percent(value: i64) -> i64 {
    value.clamp(30, 90)
}

/// Ad rotation interval, seconds.
pub fn clamp_rotation_seconds(value: i64) -> i64 {
    value.clamp(3, 60)
}
