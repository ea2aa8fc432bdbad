use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ExplorerError, Result};

/// One 30-minute electricity-consumption measurement. A blank cell in the
/// meter export becomes `kwh: None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalReading {
    pub date: NaiveDate,
    /// Half-hour slot index, 1..=48.
    pub slot: u32,
    pub kwh: Option<f64>,
}

/// Southern-Hemisphere season. The declaration order (summer < autumn <
/// winter < spring) is the sort order everywhere seasons are displayed or
/// grouped; comparison logic relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Season {
    Summer,
    Autumn,
    Winter,
    Spring,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Summer, Season::Autumn, Season::Winter, Season::Spring];

    /// Dec-Feb summer, Mar-May autumn, Jun-Aug winter, Sep-Nov spring.
    pub fn from_month(month: u32) -> Season {
        match month {
            12 | 1 | 2 => Season::Summer,
            3..=5 => Season::Autumn,
            6..=8 => Season::Winter,
            9..=11 => Season::Spring,
            _ => unreachable!("month out of range: {}", month),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
            Season::Spring => "spring",
        }
    }

    pub fn from_label(label: &str) -> Option<Season> {
        Season::ALL.iter().copied().find(|s| s.label() == label)
    }
}

/// Work/holiday classification of a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DayType {
    Work,
    Holiday,
}

impl DayType {
    pub const ALL: [DayType; 2] = [DayType::Work, DayType::Holiday];

    pub fn label(self) -> &'static str {
        match self {
            DayType::Work => "work day",
            DayType::Holiday => "holiday",
        }
    }
}

/// Grouping dimensions selectable for summaries. Closed enumeration so an
/// unknown dimension is unrepresentable; each maps to one base-table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupDim {
    Weekday,
    Month,
    Year,
    Season,
    DayType,
}

impl GroupDim {
    pub fn column(self) -> &'static str {
        match self {
            GroupDim::Weekday => "weekday",
            GroupDim::Month => "month",
            GroupDim::Year => "year",
            GroupDim::Season => "season",
            GroupDim::DayType => "day_type",
        }
    }
}

/// Colour dimensions for the calendarized view. Day type and season are
/// categorical; the weather dimensions are continuous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorDim {
    DayType,
    Season,
    Rainfall,
    MinTemp,
    MaxTemp,
    Solar,
}

impl ColorDim {
    pub fn column(self) -> &'static str {
        match self {
            ColorDim::DayType => "day_type",
            ColorDim::Season => "season",
            ColorDim::Rainfall => "rainfall_mm",
            ColorDim::MinTemp => "min_temp_c",
            ColorDim::MaxTemp => "max_temp_c",
            ColorDim::Solar => "solar_mj",
        }
    }

    pub fn is_categorical(self) -> bool {
        matches!(self, ColorDim::DayType | ColorDim::Season)
    }
}

/// Chart geometry requested for the grouped summary. Consumed by the
/// presentation layer; the engines only use it to pick the summary statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Geometry {
    Line,
    Column,
    Point,
    Boxplot,
}

/// Summary statistic over daily totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stat {
    Total,
    Mean,
}

/// Selectable model predictors. The month x weekday interaction implies both
/// main effects at design-matrix time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Predictor {
    Weekday,
    Month,
    MonthWeekdayInteraction,
    MaxTemp,
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> DateRange {
        DateRange { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// The full set of user inputs. Created with defaults at session start,
/// mutated only through the session's setters, read by every engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionState {
    pub baseline: DateRange,
    pub comparison: DateRange,
    pub grouping: GroupDim,
    pub color_by: ColorDim,
    pub threshold_kwh: f64,
    pub household_size: u8,
    pub geometry: Geometry,
    pub facet: Option<GroupDim>,
    pub predictors: Vec<Predictor>,
}

impl SelectionState {
    pub fn new(baseline: DateRange, comparison: DateRange) -> SelectionState {
        SelectionState {
            baseline,
            comparison,
            grouping: GroupDim::Weekday,
            color_by: ColorDim::DayType,
            threshold_kwh: 25.0,
            household_size: 3,
            geometry: Geometry::Line,
            facet: None,
            predictors: vec![],
        }
    }
}

/// Static lookup of benchmark daily usage published for average households,
/// keyed by household size and season. The "annual" rows are held separately
/// and never take part in the season join.
#[derive(Debug, Clone)]
pub struct BenchmarkTable {
    seasonal: HashMap<(u8, Season), f64>,
    annual: HashMap<u8, f64>,
}

impl BenchmarkTable {
    pub const MIN_HOUSEHOLD_SIZE: u8 = 1;
    pub const MAX_HOUSEHOLD_SIZE: u8 = 5;

    pub fn from_rows<I>(rows: I) -> Result<BenchmarkTable>
    where
        I: IntoIterator<Item = (u8, String, f64)>,
    {
        let mut seasonal = HashMap::new();
        let mut annual = HashMap::new();
        for (household_size, season, daily_kwh) in rows {
            Self::validate_size(household_size)?;
            if season == "annual" {
                annual.insert(household_size, daily_kwh);
            } else if let Some(s) = Season::from_label(&season) {
                seasonal.insert((household_size, s), daily_kwh);
            } else {
                return Err(ExplorerError::Config(format!(
                    "unknown benchmark season '{}'",
                    season
                )));
            }
        }
        Ok(BenchmarkTable { seasonal, annual })
    }

    /// Published reference figures used when no benchmark file is supplied.
    pub fn with_defaults() -> BenchmarkTable {
        let defaults: [(u8, [f64; 5]); 5] = [
            (1, [8.0, 8.4, 10.1, 8.2, 8.7]),
            (2, [11.5, 12.1, 14.6, 11.8, 12.5]),
            (3, [13.8, 14.5, 17.4, 14.1, 15.0]),
            (4, [15.9, 16.7, 20.1, 16.3, 17.2]),
            (5, [18.4, 19.3, 23.2, 18.8, 19.9]),
        ];
        let mut seasonal = HashMap::new();
        let mut annual = HashMap::new();
        for (size, values) in defaults {
            for (season, value) in Season::ALL.into_iter().zip(values) {
                seasonal.insert((size, season), value);
            }
            annual.insert(size, values[4]);
        }
        BenchmarkTable { seasonal, annual }
    }

    pub fn validate_size(household_size: u8) -> Result<()> {
        if (Self::MIN_HOUSEHOLD_SIZE..=Self::MAX_HOUSEHOLD_SIZE).contains(&household_size) {
            Ok(())
        } else {
            Err(ExplorerError::Config(format!(
                "household size {} outside supported range {}-{}",
                household_size,
                Self::MIN_HOUSEHOLD_SIZE,
                Self::MAX_HOUSEHOLD_SIZE
            )))
        }
    }

    pub fn daily_kwh(&self, household_size: u8, season: Season) -> Option<f64> {
        self.seasonal.get(&(household_size, season)).copied()
    }

    pub fn annual_kwh(&self, household_size: u8) -> Option<f64> {
        self.annual.get(&household_size).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_partitions_months_in_fixed_order() {
        let mut by_season: HashMap<Season, Vec<u32>> = HashMap::new();
        for month in 1..=12 {
            by_season.entry(Season::from_month(month)).or_default().push(month);
        }
        assert_eq!(by_season.len(), 4);
        for season in Season::ALL {
            assert_eq!(by_season[&season].len(), 3, "{:?}", season);
        }
        assert!(Season::Summer < Season::Autumn);
        assert!(Season::Autumn < Season::Winter);
        assert!(Season::Winter < Season::Spring);
    }

    #[test]
    fn benchmark_defaults_cover_all_sizes_and_seasons() {
        let table = BenchmarkTable::with_defaults();
        for size in 1..=5 {
            for season in Season::ALL {
                assert!(table.daily_kwh(size, season).is_some());
            }
            assert!(table.annual_kwh(size).is_some());
        }
        assert!(table.daily_kwh(6, Season::Summer).is_none());
    }

    #[test]
    fn benchmark_rows_reject_bad_size_and_season() {
        let err = BenchmarkTable::from_rows(vec![(9, "summer".to_string(), 1.0)]);
        assert!(err.is_err());
        let err = BenchmarkTable::from_rows(vec![(2, "monsoon".to_string(), 1.0)]);
        assert!(err.is_err());
    }
}
