use chrono::{Datelike, NaiveDate, Weekday};
use polars::prelude::*;
use std::collections::HashSet;

use crate::error::{ExplorerError, Result};
use crate::models::{IntervalReading, DayType, Season};

pub const SLOTS_PER_DAY: u32 = 48;

/// Monday-start week, matching the display order everywhere.
pub const WEEKDAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Numeric weather columns carried on the base table, with their quality
/// flags. Solar exposure has no quality series in the source data.
pub const WEATHER_VALUE_COLUMNS: [&str; 4] = ["rainfall_mm", "max_temp_c", "min_temp_c", "solar_mj"];
pub const WEATHER_QUALITY_COLUMNS: [&str; 3] =
    ["rainfall_quality", "max_temp_quality", "min_temp_quality"];

/// Half-hour slot index (1..=48) to time of day.
/// Slot 1 -> 00:00, slot 2 -> 00:30, slot 47 -> 23:00, slot 48 -> 23:30.
pub fn slot_time(slot: u32) -> (u32, u32) {
    debug_assert!((1..=SLOTS_PER_DAY).contains(&slot));
    let hour = (slot - 1) / 2;
    let minute = if slot % 2 == 0 { 30 } else { 0 };
    (hour, minute)
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    WEEKDAY_NAMES[weekday.num_days_from_monday() as usize]
}

pub fn month_name(month: u32) -> &'static str {
    MONTH_NAMES[(month - 1) as usize]
}

/// Jurisdiction public-holiday set for the years spanned by the data.
/// Classification is a pure function of the date and this set.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    dates: HashSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn new<I: IntoIterator<Item = NaiveDate>>(dates: I) -> HolidayCalendar {
        HolidayCalendar {
            dates: dates.into_iter().collect(),
        }
    }

    /// Weekends and public holidays both count as holidays.
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun) || self.dates.contains(&date)
    }

    pub fn day_type(&self, date: NaiveDate) -> DayType {
        if self.is_holiday(date) {
            DayType::Holiday
        } else {
            DayType::Work
        }
    }
}

/// Pure transform: interval readings to the enriched table with one row per
/// (date, slot) and derived calendar attribute columns. Enforces the
/// 48-slots-per-date invariant.
pub fn enrich(readings: &[IntervalReading], holidays: &HolidayCalendar) -> Result<DataFrame> {
    let mut rows: Vec<IntervalReading> = readings.to_vec();
    rows.sort_by_key(|r| (r.date, r.slot));

    validate_slot_coverage(&rows)?;

    let n = rows.len();
    let mut dates = Vec::with_capacity(n);
    let mut slots = Vec::with_capacity(n);
    let mut hours = Vec::with_capacity(n);
    let mut minutes = Vec::with_capacity(n);
    let mut kwh = Vec::with_capacity(n);
    let mut weekdays = Vec::with_capacity(n);
    let mut months = Vec::with_capacity(n);
    let mut years = Vec::with_capacity(n);
    let mut seasons = Vec::with_capacity(n);
    let mut day_types = Vec::with_capacity(n);

    for reading in &rows {
        let (hour, minute) = slot_time(reading.slot);
        dates.push(reading.date.format("%Y-%m-%d").to_string());
        slots.push(reading.slot);
        hours.push(hour);
        minutes.push(minute);
        kwh.push(reading.kwh);
        weekdays.push(weekday_name(reading.date.weekday()));
        months.push(month_name(reading.date.month()));
        years.push(reading.date.year());
        seasons.push(Season::from_month(reading.date.month()).label());
        day_types.push(holidays.day_type(reading.date).label());
    }

    let df = DataFrame::new(vec![
        Series::new("date", dates),
        Series::new("slot", slots),
        Series::new("hour", hours),
        Series::new("minute", minutes),
        Series::new("kwh", kwh),
        Series::new("weekday", weekdays),
        Series::new("month", months),
        Series::new("year", years),
        Series::new("season", seasons),
        Series::new("day_type", day_types),
    ])?;
    Ok(df)
}

fn validate_slot_coverage(sorted: &[IntervalReading]) -> Result<()> {
    let mut i = 0;
    while i < sorted.len() {
        let date = sorted[i].date;
        let mut expected = 1u32;
        while i < sorted.len() && sorted[i].date == date {
            let slot = sorted[i].slot;
            if !(1..=SLOTS_PER_DAY).contains(&slot) {
                return Err(ExplorerError::Config(format!(
                    "slot index {} out of range for {}",
                    slot, date
                )));
            }
            if slot != expected {
                return Err(ExplorerError::Config(format!(
                    "{} does not cover all 48 half-hour slots (expected slot {}, found {})",
                    date, expected, slot
                )));
            }
            expected += 1;
            i += 1;
        }
        if expected != SLOTS_PER_DAY + 1 {
            return Err(ExplorerError::Config(format!(
                "{} has {} readings, expected 48",
                date,
                expected - 1
            )));
        }
    }
    Ok(())
}

/// Left-joins daily weather onto the enriched table, broadcasting each date's
/// observation across its 48 intervals. Dates absent from the weather table
/// end up with null weather fields.
pub fn attach_weather(enriched: DataFrame, weather: &DataFrame) -> Result<DataFrame> {
    let dates = weather.column("date")?;
    if dates.n_unique()? != weather.height() {
        return Err(ExplorerError::Config(
            "weather table has more than one observation for the same date".to_string(),
        ));
    }

    let joined = enriched
        .lazy()
        .join(
            weather.clone().lazy(),
            [col("date")],
            [col("date")],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    Ok(joined)
}

/// Builds the immutable base table the session engines share: enriched
/// readings plus weather columns (all-null weather when no table is given).
pub fn build_base_table(
    readings: &[IntervalReading],
    holidays: &HolidayCalendar,
    weather: Option<&DataFrame>,
) -> Result<DataFrame> {
    let enriched = enrich(readings, holidays)?;
    match weather {
        Some(table) => attach_weather(enriched, table),
        None => {
            let mut df = enriched;
            let height = df.height();
            for name in WEATHER_VALUE_COLUMNS {
                df.with_column(Series::full_null(name, height, &DataType::Float64))?;
            }
            for name in WEATHER_QUALITY_COLUMNS {
                df.with_column(Series::full_null(name, height, &DataType::Utf8))?;
            }
            Ok(df)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_day(date: NaiveDate, kwh: f64) -> Vec<IntervalReading> {
        (1..=SLOTS_PER_DAY)
            .map(|slot| IntervalReading {
                date,
                slot,
                kwh: Some(kwh),
            })
            .collect()
    }

    #[test]
    fn slot_time_matches_boundary_table() {
        assert_eq!(slot_time(1), (0, 0));
        assert_eq!(slot_time(2), (0, 30));
        assert_eq!(slot_time(47), (23, 0));
        assert_eq!(slot_time(48), (23, 30));
    }

    #[test]
    fn slot_time_is_monotonic_and_pairs_share_hours() {
        let mut previous = (0, 0);
        for slot in 1..=SLOTS_PER_DAY {
            let current = slot_time(slot);
            assert!(current >= previous, "slot {} went backwards", slot);
            previous = current;
        }
        for k in 1..=24u32 {
            let odd = slot_time(2 * k - 1);
            let even = slot_time(2 * k);
            assert_eq!(odd.0, even.0);
            assert_eq!(odd.1, 0);
            assert_eq!(even.1, 30);
        }
    }

    #[test]
    fn holiday_is_weekend_or_listed_date_and_idempotent() {
        let anzac_day = NaiveDate::from_ymd_opt(2018, 4, 25).unwrap();
        let calendar = HolidayCalendar::new(vec![anzac_day]);

        // 2018-04-25 was a Wednesday.
        assert_eq!(calendar.day_type(anzac_day), DayType::Holiday);
        // Saturday.
        let saturday = NaiveDate::from_ymd_opt(2018, 4, 28).unwrap();
        assert_eq!(calendar.day_type(saturday), DayType::Holiday);
        // Ordinary Thursday.
        let thursday = NaiveDate::from_ymd_opt(2018, 4, 26).unwrap();
        assert_eq!(calendar.day_type(thursday), DayType::Work);

        // Pure function of the date: re-application never changes the answer.
        assert_eq!(calendar.day_type(anzac_day), calendar.day_type(anzac_day));
    }

    #[test]
    fn enrich_derives_calendar_attributes() {
        // 2018-01-01 was a Monday and a January (summer) date.
        let date = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let calendar = HolidayCalendar::new(vec![date]);
        let df = enrich(&full_day(date, 0.5), &calendar).unwrap();

        assert_eq!(df.height(), 48);
        let weekdays = df.column("weekday").unwrap().utf8().unwrap();
        assert_eq!(weekdays.get(0), Some("Mon"));
        let seasons = df.column("season").unwrap().utf8().unwrap();
        assert_eq!(seasons.get(0), Some("summer"));
        let day_types = df.column("day_type").unwrap().utf8().unwrap();
        assert_eq!(day_types.get(0), Some("holiday"));
        let years = df.column("year").unwrap().i32().unwrap();
        assert_eq!(years.get(0), Some(2018));
    }

    #[test]
    fn enrich_rejects_incomplete_days() {
        let date = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let mut readings = full_day(date, 1.0);
        readings.pop();
        let err = enrich(&readings, &HolidayCalendar::default()).unwrap_err();
        assert!(matches!(err, ExplorerError::Config(_)));
    }

    #[test]
    fn base_table_without_weather_has_null_weather_columns() {
        let date = NaiveDate::from_ymd_opt(2018, 6, 15).unwrap();
        let df = build_base_table(&full_day(date, 1.0), &HolidayCalendar::default(), None).unwrap();
        let rainfall = df.column("rainfall_mm").unwrap();
        assert_eq!(rainfall.null_count(), df.height());
        let seasons = df.column("season").unwrap().utf8().unwrap();
        assert_eq!(seasons.get(0), Some("winter"));
    }
}
