use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use log::info;
use polars::prelude::*;
use serde::Serialize;
use std::path::PathBuf;

use usage_explorer::{
    calendar::HolidayCalendar, data_loader, BenchmarkTable, ColorDim, DateRange, GroupDim,
    ModelSummary, Predictor, SelectionState, Session,
};

#[derive(Parser)]
#[command(name = "usage_explorer")]
#[command(about = "Explore household smart-meter usage against calendar, weather and benchmarks")]
struct Args {
    /// Wide interval-meter CSV (meter_id,date,1..48)
    #[arg(long)]
    meter_file: PathBuf,

    /// Meter id to analyse; other meters in the file are discarded
    #[arg(long)]
    meter_id: String,

    /// Public-holiday CSV (single `date` column)
    #[arg(long)]
    holidays_file: Option<PathBuf>,

    /// Daily rainfall CSV (date,value,quality)
    #[arg(long)]
    rainfall_file: Option<PathBuf>,

    /// Daily maximum-temperature CSV (date,value,quality)
    #[arg(long)]
    max_temp_file: Option<PathBuf>,

    /// Daily minimum-temperature CSV (date,value,quality)
    #[arg(long)]
    min_temp_file: Option<PathBuf>,

    /// Daily solar-exposure CSV (date,value)
    #[arg(long)]
    solar_file: Option<PathBuf>,

    /// Benchmark override CSV (household_size,season,daily_kwh)
    #[arg(long)]
    benchmarks_file: Option<PathBuf>,

    /// Baseline period start (YYYY-MM-DD)
    #[arg(long)]
    baseline_start: String,

    /// Baseline period end (YYYY-MM-DD)
    #[arg(long)]
    baseline_end: String,

    /// Comparison period start (YYYY-MM-DD)
    #[arg(long)]
    comparison_start: String,

    /// Comparison period end (YYYY-MM-DD)
    #[arg(long)]
    comparison_end: String,

    /// Daily-usage threshold in kWh
    #[arg(long, default_value = "25.0")]
    threshold: f64,

    /// Benchmark household size (1-5)
    #[arg(long, default_value = "3")]
    household_size: u8,

    /// Grouping dimension for summaries
    #[arg(long, value_enum, default_value = "weekday")]
    grouping: GroupingArg,

    /// Colour dimension for the calendar view
    #[arg(long, value_enum, default_value = "day-type")]
    color_by: ColorArg,

    /// Optional facet dimension for the half-hourly profile
    #[arg(long, value_enum)]
    facet: Option<GroupingArg>,

    /// Model predictors besides the period indicator
    #[arg(long, value_enum, value_delimiter = ',')]
    predictors: Vec<PredictorArg>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    output: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupingArg {
    Weekday,
    Month,
    Year,
    Season,
    DayType,
}

impl From<GroupingArg> for GroupDim {
    fn from(arg: GroupingArg) -> GroupDim {
        match arg {
            GroupingArg::Weekday => GroupDim::Weekday,
            GroupingArg::Month => GroupDim::Month,
            GroupingArg::Year => GroupDim::Year,
            GroupingArg::Season => GroupDim::Season,
            GroupingArg::DayType => GroupDim::DayType,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorArg {
    DayType,
    Season,
    Rainfall,
    MinTemp,
    MaxTemp,
    Solar,
}

impl From<ColorArg> for ColorDim {
    fn from(arg: ColorArg) -> ColorDim {
        match arg {
            ColorArg::DayType => ColorDim::DayType,
            ColorArg::Season => ColorDim::Season,
            ColorArg::Rainfall => ColorDim::Rainfall,
            ColorArg::MinTemp => ColorDim::MinTemp,
            ColorArg::MaxTemp => ColorDim::MaxTemp,
            ColorArg::Solar => ColorDim::Solar,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PredictorArg {
    Weekday,
    Month,
    MonthWeekday,
    MaxTemp,
}

impl From<PredictorArg> for Predictor {
    fn from(arg: PredictorArg) -> Predictor {
        match arg {
            PredictorArg::Weekday => Predictor::Weekday,
            PredictorArg::Month => Predictor::Month,
            PredictorArg::MonthWeekday => Predictor::MonthWeekdayInteraction,
            PredictorArg::MaxTemp => Predictor::MaxTemp,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
    Summary,
}

#[derive(Serialize)]
struct JsonReport {
    selection: SelectionState,
    model: Option<ModelSummary>,
    model_error: Option<String>,
}

fn parse_range(start: &str, end: &str) -> Result<DateRange> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")?;
    let end = NaiveDate::parse_from_str(end, "%Y-%m-%d")?;
    Ok(DateRange::new(start, end))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let baseline = parse_range(&args.baseline_start, &args.baseline_end)?;
    let comparison = parse_range(&args.comparison_start, &args.comparison_end)?;

    let readings = data_loader::load_interval_readings(&args.meter_file, &args.meter_id)?;

    let holidays = match &args.holidays_file {
        Some(path) => HolidayCalendar::new(data_loader::load_holidays(path)?),
        None => HolidayCalendar::default(),
    };

    let weather = match (
        &args.rainfall_file,
        &args.max_temp_file,
        &args.min_temp_file,
        &args.solar_file,
    ) {
        (Some(rain), Some(tmax), Some(tmin), Some(solar)) => {
            Some(data_loader::load_weather(rain, tmax, tmin, solar)?)
        }
        (None, None, None, None) => None,
        _ => anyhow::bail!(
            "weather files must be given together: rainfall, max temp, min temp, solar"
        ),
    };

    let benchmarks = match &args.benchmarks_file {
        Some(path) => data_loader::load_benchmarks(path)?,
        None => BenchmarkTable::with_defaults(),
    };

    let base = usage_explorer::build_base_table(&readings, &holidays, weather.as_ref())?;
    info!("base table has {} interval rows", base.height());

    let mut state = SelectionState::new(baseline, comparison);
    state.threshold_kwh = args.threshold;
    state.household_size = args.household_size;
    state.grouping = args.grouping.into();
    state.color_by = args.color_by.into();
    state.facet = args.facet.map(GroupDim::from);
    state.predictors = args.predictors.iter().map(|p| Predictor::from(*p)).collect();

    let mut session = Session::new(base, benchmarks, state);

    match args.output {
        OutputFormat::Json => {
            let (model, model_error) = match session.model() {
                Ok(fit) => (Some(fit.summary), None),
                Err(e) => (None, Some(e.to_string())),
            };
            let report = JsonReport {
                selection: session.state().clone(),
                model,
                model_error,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Csv => {
            let mut frame = match session.model() {
                Ok(fit) => fit.frame,
                // Fall back to the raw comparison frame when no model fits.
                Err(_) => session.comparison_frame()?,
            };
            CsvWriter::new(std::io::stdout()).finish(&mut frame)?;
        }
        OutputFormat::Summary => {
            let daily = session.daily_aggregate()?;
            let over: u32 = daily
                .column("over_threshold")?
                .bool()?
                .into_iter()
                .flatten()
                .map(u32::from)
                .sum();
            println!("Usage Explorer Summary");
            println!("======================");
            println!(
                "Baseline:   {} to {}",
                session.state().baseline.start,
                session.state().baseline.end
            );
            println!(
                "Comparison: {} to {}",
                session.state().comparison.start,
                session.state().comparison.end
            );
            println!(
                "Days in baseline: {} ({} over {:.1} kWh)",
                daily.height(),
                over,
                session.state().threshold_kwh
            );
            println!();
            println!("Grouped daily usage:");
            println!("{}", session.grouped_summary()?);
            println!();
            println!("Benchmark comparison:");
            println!("{}", session.benchmark_summary()?);
            println!();
            match session.model() {
                Ok(fit) => {
                    let s = &fit.summary;
                    println!("Model ({} observations):", s.n_observations);
                    println!("  baseline estimate:   {:.2} kWh/day", s.baseline_estimate);
                    println!("  comparison estimate: {:.2} kWh/day", s.comparison_estimate);
                    println!("  period effect:       {:+.2} kWh/day", s.period_effect);
                    println!(
                        "  R²: {:.3}  adjusted R²: {:.3}  RSS: {:.2}",
                        s.r_squared, s.adj_r_squared, s.residual_sum_of_squares
                    );
                }
                Err(e) => println!("Model: {}", e),
            }
        }
    }

    Ok(())
}
