use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use log::info;
use polars::prelude::*;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;

use crate::calendar::SLOTS_PER_DAY;
use crate::error::{ExplorerError, Result};
use crate::models::{BenchmarkTable, IntervalReading};

/// One daily observation row shared by all four weather series. The quality
/// column is absent in some exports (solar exposure has none).
#[derive(Debug, Deserialize)]
struct DailySeriesRecord {
    date: String,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    quality: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HolidayRecord {
    date: String,
}

#[derive(Debug, Deserialize)]
struct BenchmarkRecord {
    household_size: u8,
    season: String,
    daily_kwh: f64,
}

fn parse_date(raw: &str, context: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| ExplorerError::Parse(context.to_string(), format!("bad date '{}': {}", raw, e)))
}

/// Load the wide interval-meter export (`meter_id,date,1..48`), keeping only
/// the requested meter. Blank cells become missing readings; anything else
/// non-numeric, and any negative value, fails fast.
pub fn load_interval_readings(path: &Path, meter_id: &str) -> Result<Vec<IntervalReading>> {
    let context = path.display().to_string();
    let df = CsvReader::new(File::open(path)?).has_header(true).finish()?;

    let meters = df
        .column("meter_id")
        .map_err(|_| ExplorerError::Config(format!("{}: missing 'meter_id' column", context)))?
        .cast(&DataType::Utf8)?;
    let meters = meters.utf8()?;
    let dates = df
        .column("date")
        .map_err(|_| ExplorerError::Config(format!("{}: missing 'date' column", context)))?
        .utf8()
        .map_err(|_| ExplorerError::Parse(context.clone(), "date column is not text".to_string()))?;

    let mut slot_columns = Vec::with_capacity(SLOTS_PER_DAY as usize);
    for slot in 1..=SLOTS_PER_DAY {
        let name = slot.to_string();
        let series = df.column(&name).map_err(|_| {
            ExplorerError::Config(format!("{}: missing interval column '{}'", context, name))
        })?;
        slot_columns.push(numeric_values(series, &format!("{} column {}", context, name))?);
    }

    let mut readings = Vec::new();
    let mut seen_dates = HashSet::new();
    for row in 0..df.height() {
        if meters.get(row) != Some(meter_id) {
            continue;
        }
        let raw_date = dates.get(row).ok_or_else(|| {
            ExplorerError::Parse(context.clone(), format!("row {} has no date", row + 1))
        })?;
        let date = parse_date(raw_date, &context)?;
        if !seen_dates.insert(date) {
            return Err(ExplorerError::Config(format!(
                "{}: duplicate rows for meter {} on {}",
                context, meter_id, date
            )));
        }
        for slot in 1..=SLOTS_PER_DAY {
            let kwh = slot_columns[(slot - 1) as usize][row];
            if let Some(value) = kwh {
                if value < 0.0 {
                    return Err(ExplorerError::Parse(
                        context.clone(),
                        format!("negative kwh value {} on {} slot {}", value, date, slot),
                    ));
                }
            }
            readings.push(IntervalReading { date, slot, kwh });
        }
    }

    if readings.is_empty() {
        return Err(ExplorerError::Config(format!(
            "meter id '{}' not present in {}",
            meter_id, context
        )));
    }

    info!(
        "loaded {} interval readings for meter {} from {}",
        readings.len(),
        meter_id,
        context
    );
    Ok(readings)
}

fn numeric_values(series: &Series, what: &str) -> Result<Vec<Option<f64>>> {
    match series.dtype() {
        DataType::Float64 => Ok(series.f64()?.into_iter().collect()),
        DataType::Null => Ok(vec![None; series.len()]),
        DataType::Utf8 => {
            // A fully blank column infers as text with every value null.
            if series.null_count() == series.len() {
                Ok(vec![None; series.len()])
            } else {
                Err(ExplorerError::Parse(
                    what.to_string(),
                    "non-numeric kwh value".to_string(),
                ))
            }
        }
        dtype if dtype.is_numeric() => {
            Ok(series.cast(&DataType::Float64)?.f64()?.into_iter().collect())
        }
        other => Err(ExplorerError::Parse(
            what.to_string(),
            format!("unexpected column type {:?}", other),
        )),
    }
}

fn load_daily_series(path: &Path) -> Result<Vec<(NaiveDate, Option<f64>, Option<String>)>> {
    let context = path.display().to_string();
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| ExplorerError::Parse(context.clone(), e.to_string()))?;

    let mut rows = Vec::new();
    let mut seen = HashSet::new();
    for record in reader.deserialize() {
        let record: DailySeriesRecord =
            record.map_err(|e| ExplorerError::Parse(context.clone(), e.to_string()))?;
        let date = parse_date(&record.date, &context)?;
        if !seen.insert(date) {
            return Err(ExplorerError::Config(format!(
                "{}: duplicate observation for {}",
                context, date
            )));
        }
        rows.push((date, record.value, record.quality));
    }
    Ok(rows)
}

/// Load the four daily weather series and inner-join them by date into one
/// table, one row per date. Dates missing from any series are dropped.
pub fn load_weather(
    rainfall_path: &Path,
    max_temp_path: &Path,
    min_temp_path: &Path,
    solar_path: &Path,
) -> Result<DataFrame> {
    let rainfall = load_daily_series(rainfall_path)?;
    let max_temp = load_daily_series(max_temp_path)?;
    let min_temp = load_daily_series(min_temp_path)?;
    let solar = load_daily_series(solar_path)?;

    let to_map = |rows: Vec<(NaiveDate, Option<f64>, Option<String>)>| {
        rows.into_iter()
            .map(|(date, value, quality)| (date, (value, quality)))
            .collect::<HashMap<_, _>>()
    };
    let rainfall = to_map(rainfall);
    let max_temp = to_map(max_temp);
    let min_temp = to_map(min_temp);
    let solar = to_map(solar);

    let mut dates: Vec<NaiveDate> = rainfall
        .keys()
        .filter(|d| max_temp.contains_key(d) && min_temp.contains_key(d) && solar.contains_key(d))
        .copied()
        .collect();
    dates.sort();

    let mut date_strs = Vec::with_capacity(dates.len());
    let mut rain_values = Vec::with_capacity(dates.len());
    let mut rain_quality = Vec::with_capacity(dates.len());
    let mut tmax_values = Vec::with_capacity(dates.len());
    let mut tmax_quality = Vec::with_capacity(dates.len());
    let mut tmin_values = Vec::with_capacity(dates.len());
    let mut tmin_quality = Vec::with_capacity(dates.len());
    let mut solar_values = Vec::with_capacity(dates.len());

    for date in &dates {
        date_strs.push(date.format("%Y-%m-%d").to_string());
        let (value, quality) = &rainfall[date];
        rain_values.push(*value);
        rain_quality.push(quality.clone());
        let (value, quality) = &max_temp[date];
        tmax_values.push(*value);
        tmax_quality.push(quality.clone());
        let (value, quality) = &min_temp[date];
        tmin_values.push(*value);
        tmin_quality.push(quality.clone());
        let (value, _) = &solar[date];
        solar_values.push(*value);
    }

    info!("loaded weather observations for {} dates", dates.len());
    let df = DataFrame::new(vec![
        Series::new("date", date_strs),
        Series::new("rainfall_mm", rain_values),
        Series::new("rainfall_quality", rain_quality),
        Series::new("max_temp_c", tmax_values),
        Series::new("max_temp_quality", tmax_quality),
        Series::new("min_temp_c", tmin_values),
        Series::new("min_temp_quality", tmin_quality),
        Series::new("solar_mj", solar_values),
    ])?;
    Ok(df)
}

/// Load the jurisdiction public-holiday set (single `date` column).
pub fn load_holidays(path: &Path) -> Result<Vec<NaiveDate>> {
    let context = path.display().to_string();
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| ExplorerError::Parse(context.clone(), e.to_string()))?;

    let mut dates = Vec::new();
    for record in reader.deserialize() {
        let record: HolidayRecord =
            record.map_err(|e| ExplorerError::Parse(context.clone(), e.to_string()))?;
        dates.push(parse_date(&record.date, &context)?);
    }
    Ok(dates)
}

/// Load a benchmark override table (`household_size,season,daily_kwh`).
pub fn load_benchmarks(path: &Path) -> Result<BenchmarkTable> {
    let context = path.display().to_string();
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| ExplorerError::Parse(context.clone(), e.to_string()))?;

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let record: BenchmarkRecord =
            record.map_err(|e| ExplorerError::Parse(context.clone(), e.to_string()))?;
        rows.push((record.household_size, record.season, record.daily_kwh));
    }
    BenchmarkTable::from_rows(rows)
}
