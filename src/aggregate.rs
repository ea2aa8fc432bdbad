use polars::prelude::*;
use std::collections::HashMap;

use crate::calendar::{slot_time, MONTH_NAMES, SLOTS_PER_DAY, WEEKDAY_NAMES};
use crate::error::{ExplorerError, Result};
use crate::models::{DateRange, DayType, GroupDim, Season, Stat};

/// All interval rows with date in [start, end] inclusive. An empty result is
/// the recoverable "no data for this selection" state, not a crash.
pub fn subset(base: &DataFrame, range: &DateRange) -> Result<DataFrame> {
    let start = range.start.format("%Y-%m-%d").to_string();
    let end = range.end.format("%Y-%m-%d").to_string();
    let df = base
        .clone()
        .lazy()
        .filter(col("date").gt_eq(lit(start)).and(col("date").lt_eq(lit(end))))
        .collect()?;
    if df.height() == 0 {
        return Err(ExplorerError::EmptySelection);
    }
    Ok(df)
}

/// One row per date with summed kwh (missing readings count as 0) and the
/// derived over-threshold flag.
pub fn daily_aggregate(subset: &DataFrame, threshold_kwh: f64) -> Result<DataFrame> {
    let df = subset
        .clone()
        .lazy()
        .group_by([col("date")])
        .agg([col("kwh").fill_null(lit(0.0)).sum().alias("daily_kwh")])
        .with_column(col("daily_kwh").gt(lit(threshold_kwh)).alias("over_threshold"))
        .sort("date", Default::default())
        .collect()?;
    Ok(df)
}

fn dim_column<'a>(df: &'a DataFrame, dim: GroupDim) -> Result<&'a Series> {
    df.column(dim.column()).map_err(|_| {
        ExplorerError::Config(format!(
            "grouping column '{}' missing from the joined table",
            dim.column()
        ))
    })
}

fn dim_labels(df: &DataFrame, dim: GroupDim) -> Result<Vec<Option<String>>> {
    let series = dim_column(df, dim)?;
    match dim {
        GroupDim::Year => Ok(series
            .i32()?
            .into_iter()
            .map(|v| v.map(|y| y.to_string()))
            .collect()),
        _ => Ok(series
            .utf8()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()),
    }
}

/// The declared level order of a grouping dimension: Monday..Sunday,
/// Jan..Dec, the fixed season order, work day before holiday, years
/// ascending. Group output follows this order, never lexicographic.
fn natural_levels(dim: GroupDim, df: &DataFrame) -> Result<Vec<String>> {
    match dim {
        GroupDim::Weekday => Ok(WEEKDAY_NAMES.iter().map(|s| s.to_string()).collect()),
        GroupDim::Month => Ok(MONTH_NAMES.iter().map(|s| s.to_string()).collect()),
        GroupDim::Season => Ok(Season::ALL.iter().map(|s| s.label().to_string()).collect()),
        GroupDim::DayType => Ok(DayType::ALL.iter().map(|d| d.label().to_string()).collect()),
        GroupDim::Year => {
            let mut years: Vec<i32> = dim_column(df, dim)?.i32()?.into_iter().flatten().collect();
            years.sort_unstable();
            years.dedup();
            Ok(years.into_iter().map(|y| y.to_string()).collect())
        }
    }
}

/// Daily-usage summary: sums kwh per date, then aggregates the daily totals
/// per group value (total or mean as requested).
pub fn daily_by_group(subset: &DataFrame, dim: GroupDim, stat: Stat) -> Result<DataFrame> {
    let dates = subset.column("date")?.utf8()?;
    let kwh = subset.column("kwh")?.f64()?;
    let labels = dim_labels(subset, dim)?;

    // Group attributes are functions of the date, so the first label seen for
    // a date stands for the whole date.
    let mut per_date: HashMap<&str, (String, f64)> = HashMap::new();
    for row in 0..subset.height() {
        let date = dates.get(row).unwrap_or_default();
        let label = labels[row].clone().unwrap_or_default();
        let entry = per_date.entry(date).or_insert((label, 0.0));
        entry.1 += kwh.get(row).unwrap_or(0.0);
    }

    let mut per_group: HashMap<String, (f64, u32)> = HashMap::new();
    for (_, (label, daily)) in per_date {
        let entry = per_group.entry(label).or_insert((0.0, 0));
        entry.0 += daily;
        entry.1 += 1;
    }

    let mut groups = Vec::new();
    let mut values = Vec::new();
    for level in natural_levels(dim, subset)? {
        if let Some((total, days)) = per_group.get(&level) {
            groups.push(level);
            values.push(match stat {
                Stat::Total => *total,
                Stat::Mean => *total / f64::from(*days),
            });
        }
    }

    let df = DataFrame::new(vec![Series::new("group", groups), Series::new("kwh", values)])?;
    Ok(df)
}

/// Half-hourly profile: mean kwh per (group, time-of-day slot), optionally
/// faceted by a second dimension. Missing readings are excluded from means;
/// a slot whose readings are all missing gets a null mean.
pub fn halfhourly_profile(
    subset: &DataFrame,
    dim: GroupDim,
    facet: Option<GroupDim>,
) -> Result<DataFrame> {
    let slots = subset.column("slot")?.u32()?;
    let kwh = subset.column("kwh")?.f64()?;
    let labels = dim_labels(subset, dim)?;
    let facet_labels = match facet {
        Some(facet_dim) => Some(dim_labels(subset, facet_dim)?),
        None => None,
    };

    type Key = (String, Option<String>, u32);
    let mut cells: HashMap<Key, (f64, u32, u32)> = HashMap::new();
    for row in 0..subset.height() {
        let group = labels[row].clone().unwrap_or_default();
        let facet_value = facet_labels.as_ref().map(|f| f[row].clone().unwrap_or_default());
        let slot = slots.get(row).unwrap_or(0);
        let cell = cells.entry((group, facet_value, slot)).or_insert((0.0, 0, 0));
        cell.2 += 1;
        if let Some(value) = kwh.get(row) {
            cell.0 += value;
            cell.1 += 1;
        }
    }

    let group_levels = natural_levels(dim, subset)?;
    let facet_levels = match facet {
        Some(facet_dim) => natural_levels(facet_dim, subset)?
            .into_iter()
            .map(Some)
            .collect(),
        None => vec![None],
    };

    let mut out_groups = Vec::new();
    let mut out_facets = Vec::new();
    let mut out_slots = Vec::new();
    let mut out_hours = Vec::new();
    let mut out_minutes = Vec::new();
    let mut out_means: Vec<Option<f64>> = Vec::new();

    for group in &group_levels {
        for facet_value in &facet_levels {
            for slot in 1..=SLOTS_PER_DAY {
                let key = (group.clone(), facet_value.clone(), slot);
                if let Some((sum, with_value, _rows)) = cells.get(&key) {
                    let (hour, minute) = slot_time(slot);
                    out_groups.push(group.clone());
                    out_facets.push(facet_value.clone());
                    out_slots.push(slot);
                    out_hours.push(hour);
                    out_minutes.push(minute);
                    out_means.push(if *with_value > 0 {
                        Some(sum / f64::from(*with_value))
                    } else {
                        None
                    });
                }
            }
        }
    }

    let mut columns = vec![Series::new("group", out_groups)];
    if facet.is_some() {
        let facets: Vec<String> = out_facets.into_iter().map(|f| f.unwrap_or_default()).collect();
        columns.push(Series::new("facet", facets));
    }
    columns.push(Series::new("slot", out_slots));
    columns.push(Series::new("hour", out_hours));
    columns.push(Series::new("minute", out_minutes));
    columns.push(Series::new("mean_kwh", out_means));

    let df = DataFrame::new(columns)?;
    Ok(df)
}
