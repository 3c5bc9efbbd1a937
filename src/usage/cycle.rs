use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveTime, TimeZone};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// key: billing-cycle -> current window around a monthly anchor day
#[derive(Debug, Clone, PartialEq)]
pub struct BillingPeriod {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub now: DateTime<FixedOffset>,
    /// Never below 1 so per-day rates stay finite.
    pub days_elapsed: f64,
    pub total_days: f64,
    /// Never below 0.
    pub days_remaining: f64,
}

impl BillingPeriod {
    /// Derives the window containing `now`, computed in the offset `now` carries.
    ///
    /// The cycle starts at midnight on `anchor_day` of the current month once
    /// that day has been reached, otherwise on `anchor_day` of the previous
    /// month. It ends on the same day of the following month. `anchor_day` is
    /// clamped to `1..=28` so every month contains it.
    pub fn containing(now: DateTime<FixedOffset>, anchor_day: u32) -> Self {
        let anchor = anchor_day.clamp(1, 28);
        let today = now.date_naive();
        let anchored = today.with_day(anchor).unwrap_or(today);
        let start_date = if today.day() >= anchor {
            anchored
        } else {
            anchored
                .checked_sub_months(Months::new(1))
                .unwrap_or(anchored)
        };
        let end_date = start_date
            .checked_add_months(Months::new(1))
            .unwrap_or(start_date);

        let offset = *now.offset();
        let start = local_midnight(start_date, offset);
        let end = local_midnight(end_date, offset);

        Self {
            start,
            end,
            now,
            days_elapsed: fractional_days(start, now).max(1.0),
            total_days: fractional_days(start, end),
            days_remaining: fractional_days(now, end).max(0.0),
        }
    }
}

/// Signed number of days from `from` to `to`, with millisecond resolution.
pub fn fractional_days<Tz: TimeZone, Tz2: TimeZone>(from: DateTime<Tz>, to: DateTime<Tz2>) -> f64 {
    let millis = to.timestamp_millis() - from.timestamp_millis();
    millis as f64 / MILLIS_PER_DAY
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<FixedOffset> {
    let local = date.and_time(NaiveTime::MIN);
    offset.from_utc_datetime(&(local - Duration::seconds(i64::from(offset.local_minus_utc()))))
}
