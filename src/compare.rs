use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;

use crate::aggregate;
use crate::error::{ExplorerError, Result};
use crate::models::{BenchmarkTable, DateRange, Season};

pub const PERIOD_BASELINE: &str = "baseline";
pub const PERIOD_COMPARISON: &str = "comparison";

#[derive(Debug, Clone, PartialEq)]
struct DayAttributes {
    weekday: String,
    month: String,
    year: i32,
    season: String,
    day_type: String,
    rainfall_mm: Option<f64>,
    max_temp_c: Option<f64>,
    min_temp_c: Option<f64>,
    solar_mj: Option<f64>,
}

#[derive(Debug)]
struct DaySummary {
    daily_kwh: f64,
    attributes: DayAttributes,
}

/// Collapses interval rows to one row per date, summing kwh (missing as 0)
/// and carrying the per-date attributes. Conflicting attribute values for the
/// same date are a configuration error, never silently resolved.
fn daily_rows(df: &DataFrame) -> Result<BTreeMap<NaiveDate, DaySummary>> {
    let dates = df.column("date")?.utf8()?;
    let kwh = df.column("kwh")?.f64()?;
    let weekdays = df.column("weekday")?.utf8()?;
    let months = df.column("month")?.utf8()?;
    let years = df.column("year")?.i32()?;
    let seasons = df.column("season")?.utf8()?;
    let day_types = df.column("day_type")?.utf8()?;
    let rainfall = df.column("rainfall_mm")?.f64()?;
    let max_temp = df.column("max_temp_c")?.f64()?;
    let min_temp = df.column("min_temp_c")?.f64()?;
    let solar = df.column("solar_mj")?.f64()?;

    let mut days: BTreeMap<NaiveDate, DaySummary> = BTreeMap::new();
    for row in 0..df.height() {
        let raw_date = dates.get(row).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|e| {
            ExplorerError::Parse("base table".to_string(), format!("bad date '{}': {}", raw_date, e))
        })?;
        let attributes = DayAttributes {
            weekday: weekdays.get(row).unwrap_or_default().to_string(),
            month: months.get(row).unwrap_or_default().to_string(),
            year: years.get(row).unwrap_or(0),
            season: seasons.get(row).unwrap_or_default().to_string(),
            day_type: day_types.get(row).unwrap_or_default().to_string(),
            rainfall_mm: rainfall.get(row),
            max_temp_c: max_temp.get(row),
            min_temp_c: min_temp.get(row),
            solar_mj: solar.get(row),
        };
        match days.get_mut(&date) {
            Some(existing) => {
                if existing.attributes != attributes {
                    return Err(ExplorerError::Config(format!(
                        "conflicting calendar/weather attributes for {}",
                        date
                    )));
                }
                existing.daily_kwh += kwh.get(row).unwrap_or(0.0);
            }
            None => {
                days.insert(
                    date,
                    DaySummary {
                        daily_kwh: kwh.get(row).unwrap_or(0.0),
                        attributes,
                    },
                );
            }
        }
    }
    Ok(days)
}

/// Builds the labelled two-period frame: one row per (period, date) with the
/// daily total, pass-through attributes, a within-period day index starting
/// at 1, and the benchmark daily kWh for the selected household size joined
/// by season. The benchmark "annual" row never participates in the join.
pub fn comparison_frame(
    base: &DataFrame,
    baseline: &DateRange,
    comparison: &DateRange,
    benchmarks: &BenchmarkTable,
    household_size: u8,
) -> Result<DataFrame> {
    BenchmarkTable::validate_size(household_size)?;

    let mut periods = Vec::new();
    let mut out_dates = Vec::new();
    let mut day_indices: Vec<u32> = Vec::new();
    let mut daily_kwh = Vec::new();
    let mut weekdays = Vec::new();
    let mut months = Vec::new();
    let mut years = Vec::new();
    let mut seasons = Vec::new();
    let mut day_types = Vec::new();
    let mut rainfall: Vec<Option<f64>> = Vec::new();
    let mut max_temp: Vec<Option<f64>> = Vec::new();
    let mut min_temp: Vec<Option<f64>> = Vec::new();
    let mut solar: Vec<Option<f64>> = Vec::new();
    let mut benchmark_kwh = Vec::new();

    for (label, range) in [(PERIOD_BASELINE, baseline), (PERIOD_COMPARISON, comparison)] {
        let rows = daily_rows(&aggregate::subset(base, range)?)?;
        for (index, (date, day)) in rows.into_iter().enumerate() {
            let season = Season::from_label(&day.attributes.season).ok_or_else(|| {
                ExplorerError::Config(format!("unknown season '{}'", day.attributes.season))
            })?;
            let benchmark = benchmarks.daily_kwh(household_size, season).ok_or_else(|| {
                ExplorerError::Config(format!(
                    "no benchmark for household size {} in {}",
                    household_size,
                    season.label()
                ))
            })?;

            periods.push(label);
            out_dates.push(date.format("%Y-%m-%d").to_string());
            day_indices.push(index as u32 + 1);
            daily_kwh.push(day.daily_kwh);
            weekdays.push(day.attributes.weekday);
            months.push(day.attributes.month);
            years.push(day.attributes.year);
            seasons.push(day.attributes.season);
            day_types.push(day.attributes.day_type);
            rainfall.push(day.attributes.rainfall_mm);
            max_temp.push(day.attributes.max_temp_c);
            min_temp.push(day.attributes.min_temp_c);
            solar.push(day.attributes.solar_mj);
            benchmark_kwh.push(benchmark);
        }
    }

    let df = DataFrame::new(vec![
        Series::new("period", periods),
        Series::new("date", out_dates),
        Series::new("day_index", day_indices),
        Series::new("daily_kwh", daily_kwh),
        Series::new("weekday", weekdays),
        Series::new("month", months),
        Series::new("year", years),
        Series::new("season", seasons),
        Series::new("day_type", day_types),
        Series::new("rainfall_mm", rainfall),
        Series::new("max_temp_c", max_temp),
        Series::new("min_temp_c", min_temp),
        Series::new("solar_mj", solar),
        Series::new("benchmark_kwh", benchmark_kwh),
    ])?;
    Ok(df)
}

/// Benchmark-relative summary per period: mean daily usage against the mean
/// joined benchmark and their difference.
pub fn benchmark_summary(comparison: &DataFrame) -> Result<DataFrame> {
    let periods = comparison.column("period")?.utf8()?;
    let daily = comparison.column("daily_kwh")?.f64()?;
    let benchmark = comparison.column("benchmark_kwh")?.f64()?;

    let mut out_periods = Vec::new();
    let mut out_days = Vec::new();
    let mut out_mean_daily = Vec::new();
    let mut out_mean_benchmark = Vec::new();
    let mut out_difference = Vec::new();

    for label in [PERIOD_BASELINE, PERIOD_COMPARISON] {
        let mut daily_sum = 0.0;
        let mut benchmark_sum = 0.0;
        let mut count = 0u32;
        for row in 0..comparison.height() {
            if periods.get(row) == Some(label) {
                daily_sum += daily.get(row).unwrap_or(0.0);
                benchmark_sum += benchmark.get(row).unwrap_or(0.0);
                count += 1;
            }
        }
        if count == 0 {
            continue;
        }
        let mean_daily = daily_sum / f64::from(count);
        let mean_benchmark = benchmark_sum / f64::from(count);
        out_periods.push(label);
        out_days.push(count);
        out_mean_daily.push(mean_daily);
        out_mean_benchmark.push(mean_benchmark);
        out_difference.push(mean_daily - mean_benchmark);
    }

    let df = DataFrame::new(vec![
        Series::new("period", out_periods),
        Series::new("days", out_days),
        Series::new("mean_daily_kwh", out_mean_daily),
        Series::new("mean_benchmark_kwh", out_mean_benchmark),
        Series::new("vs_benchmark_kwh", out_difference),
    ])?;
    Ok(df)
}
