use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use polars::prelude::DataFrame;

use usage_explorer::{
    aggregate, build_base_table, compare, layout, model, BenchmarkTable, ColorDim, DateRange,
    HolidayCalendar, IntervalReading,
};

fn year_base() -> DataFrame {
    let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
    let readings: Vec<IntervalReading> = (0..365)
        .flat_map(|day| {
            let date = start + Duration::days(day);
            (1..=48).map(move |slot| IntervalReading {
                date,
                slot,
                kwh: Some(0.3 + 0.01 * f64::from(slot % 7)),
            })
        })
        .collect();
    build_base_table(&readings, &HolidayCalendar::default(), None).unwrap()
}

fn benchmark_daily_aggregation(c: &mut Criterion) {
    let base = year_base();
    let range = DateRange::new(
        NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2018, 12, 31).unwrap(),
    );
    let subset = aggregate::subset(&base, &range).unwrap();

    c.bench_function("daily_aggregate_full_year", |b| {
        b.iter(|| black_box(aggregate::daily_aggregate(&subset, 25.0)));
    });
}

fn benchmark_calendar_layout(c: &mut Criterion) {
    let base = year_base();
    let range = DateRange::new(
        NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2018, 3, 31).unwrap(),
    );
    let subset = aggregate::subset(&base, &range).unwrap();

    c.bench_function("calendar_layout_quarter", |b| {
        b.iter(|| {
            black_box(layout::calendar_layout(
                &subset,
                25.0,
                ColorDim::DayType,
                layout::DEFAULT_CALENDAR_COLUMNS,
            ))
        });
    });
}

fn benchmark_model_fit(c: &mut Criterion) {
    let base = year_base();
    let baseline = DateRange::new(
        NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2018, 6, 30).unwrap(),
    );
    let comparison = DateRange::new(
        NaiveDate::from_ymd_opt(2018, 7, 1).unwrap(),
        NaiveDate::from_ymd_opt(2018, 12, 31).unwrap(),
    );
    let frame = compare::comparison_frame(
        &base,
        &baseline,
        &comparison,
        &BenchmarkTable::with_defaults(),
        3,
    )
    .unwrap();

    c.bench_function("fit_period_only_model", |b| {
        b.iter(|| black_box(model::fit_usage_model(&frame, &[])));
    });
}

criterion_group!(
    benches,
    benchmark_daily_aggregation,
    benchmark_calendar_layout,
    benchmark_model_fit
);
criterion_main!(benches);
