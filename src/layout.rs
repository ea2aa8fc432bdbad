use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::collections::HashMap;

use crate::aggregate::daily_aggregate;
use crate::error::{ExplorerError, Result};
use crate::models::ColorDim;

/// Calendar small-multiple columns per row block.
pub const DEFAULT_CALENDAR_COLUMNS: u32 = 4;

/// Projects each interval onto the month-grid page layout: one month per row
/// block, days wrapping left-to-right across `columns` cells. Each date keeps
/// its intraday trace (slot/hour/minute on the local x-axis, kwh on y) and
/// carries its daily total, over-threshold flag, and the selected colour
/// dimension. No drawing happens here; the output is a flat table for the
/// presentation layer.
pub fn calendar_layout(
    subset: &DataFrame,
    threshold_kwh: f64,
    color_by: ColorDim,
    columns: u32,
) -> Result<DataFrame> {
    if columns == 0 {
        return Err(ExplorerError::Config(
            "calendar layout needs at least one column".to_string(),
        ));
    }

    let daily = daily_aggregate(subset, threshold_kwh)?;
    let daily_dates = daily.column("date")?.utf8()?;
    let daily_totals = daily.column("daily_kwh")?.f64()?;
    let daily_flags = daily.column("over_threshold")?.bool()?;
    let mut per_date: HashMap<&str, (f64, bool)> = HashMap::new();
    for row in 0..daily.height() {
        if let (Some(date), Some(total), Some(flag)) = (
            daily_dates.get(row),
            daily_totals.get(row),
            daily_flags.get(row),
        ) {
            per_date.insert(date, (total, flag));
        }
    }

    let dates = subset.column("date")?.utf8()?;
    let slots = subset.column("slot")?.u32()?;
    let hours = subset.column("hour")?.u32()?;
    let minutes = subset.column("minute")?.u32()?;
    let kwh = subset.column("kwh")?.f64()?;
    let months = subset.column("month")?.utf8()?;
    let color = subset.column(color_by.column()).map_err(|_| {
        ExplorerError::Config(format!(
            "colour column '{}' missing from the joined table",
            color_by.column()
        ))
    })?;

    let n = subset.height();
    let mut out_dates = Vec::with_capacity(n);
    let mut out_slots = Vec::with_capacity(n);
    let mut out_hours = Vec::with_capacity(n);
    let mut out_minutes = Vec::with_capacity(n);
    let mut out_kwh: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut out_months = Vec::with_capacity(n);
    let mut grid_x = Vec::with_capacity(n);
    let mut grid_y = Vec::with_capacity(n);
    let mut out_daily = Vec::with_capacity(n);
    let mut out_flags = Vec::with_capacity(n);

    for row in 0..n {
        let date_str = dates.get(row).unwrap_or_default();
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
            ExplorerError::Parse("base table".to_string(), format!("bad date '{}': {}", date_str, e))
        })?;
        let day0 = date.day() - 1;
        let (total, flag) = per_date.get(date_str).copied().unwrap_or((0.0, false));

        out_dates.push(date_str.to_string());
        out_slots.push(slots.get(row).unwrap_or(0));
        out_hours.push(hours.get(row).unwrap_or(0));
        out_minutes.push(minutes.get(row).unwrap_or(0));
        out_kwh.push(kwh.get(row));
        out_months.push(months.get(row).unwrap_or_default().to_string());
        grid_x.push(day0 % columns);
        grid_y.push(day0 / columns);
        out_daily.push(total);
        out_flags.push(flag);
    }

    let df = DataFrame::new(vec![
        Series::new("date", out_dates),
        Series::new("slot", out_slots),
        Series::new("hour", out_hours),
        Series::new("minute", out_minutes),
        Series::new("kwh", out_kwh),
        Series::new("month", out_months),
        Series::new("grid_x", grid_x),
        Series::new("grid_y", grid_y),
        Series::new("daily_kwh", out_daily),
        Series::new("over_threshold", out_flags),
        color.clone(),
    ])?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{build_base_table, HolidayCalendar, SLOTS_PER_DAY};
    use crate::models::IntervalReading;

    fn base_for(dates: &[NaiveDate], kwh: f64) -> DataFrame {
        let readings: Vec<IntervalReading> = dates
            .iter()
            .flat_map(|date| {
                (1..=SLOTS_PER_DAY).map(move |slot| IntervalReading {
                    date: *date,
                    slot,
                    kwh: Some(kwh),
                })
            })
            .collect();
        build_base_table(&readings, &HolidayCalendar::default(), None).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn days_wrap_into_four_columns_per_month_block() {
        let dates = [
            date(2018, 1, 1),
            date(2018, 1, 4),
            date(2018, 1, 5),
            date(2018, 1, 9),
            date(2018, 2, 1),
        ];
        let base = base_for(&dates, 1.0);
        let layout =
            calendar_layout(&base, 20.0, ColorDim::DayType, DEFAULT_CALENDAR_COLUMNS).unwrap();

        let out_dates = layout.column("date").unwrap().utf8().unwrap();
        let xs = layout.column("grid_x").unwrap().u32().unwrap();
        let ys = layout.column("grid_y").unwrap().u32().unwrap();

        let coord_of = |wanted: &str| {
            for row in 0..layout.height() {
                if out_dates.get(row) == Some(wanted) {
                    return (xs.get(row).unwrap(), ys.get(row).unwrap());
                }
            }
            panic!("date {} not in layout", wanted);
        };

        assert_eq!(coord_of("2018-01-01"), (0, 0));
        assert_eq!(coord_of("2018-01-04"), (3, 0));
        assert_eq!(coord_of("2018-01-05"), (0, 1));
        assert_eq!(coord_of("2018-01-09"), (0, 2));
        // A new month starts its own block at the grid origin.
        assert_eq!(coord_of("2018-02-01"), (0, 0));
    }

    #[test]
    fn carries_daily_total_flag_and_colour_column() {
        let base = base_for(&[date(2018, 1, 1)], 1.0);
        let layout =
            calendar_layout(&base, 20.0, ColorDim::Rainfall, DEFAULT_CALENDAR_COLUMNS).unwrap();

        assert_eq!(layout.height(), 48);
        let totals = layout.column("daily_kwh").unwrap().f64().unwrap();
        assert_eq!(totals.get(0), Some(48.0));
        let flags = layout.column("over_threshold").unwrap().bool().unwrap();
        assert_eq!(flags.get(0), Some(true));
        // No weather joined, so the continuous colour column is all null but
        // still present for the presentation layer.
        let rainfall = layout.column("rainfall_mm").unwrap();
        assert_eq!(rainfall.null_count(), 48);
    }
}
