use polars::prelude::*;
use std::sync::Arc;

use crate::aggregate;
use crate::compare;
use crate::error::Result;
use crate::layout::{self, DEFAULT_CALENDAR_COLUMNS};
use crate::model::{self, ModelFit};
use crate::models::{
    BenchmarkTable, ColorDim, DateRange, Geometry, GroupDim, Predictor, SelectionState, Stat,
};

/// The mutable inputs a derived view can depend on. Each cached view declares
/// the subset it reads; a change to one input invalidates only the views that
/// declared it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Baseline,
    Comparison,
    Grouping,
    ColorBy,
    Threshold,
    HouseholdSize,
    Geometry,
    Facet,
    Predictors,
}

const INPUT_COUNT: usize = 9;

impl Input {
    fn index(self) -> usize {
        self as usize
    }
}

const DAILY_DEPS: &[Input] = &[Input::Baseline, Input::Threshold];
const LAYOUT_DEPS: &[Input] = &[Input::Baseline, Input::Threshold, Input::ColorBy];
const SUMMARY_DEPS: &[Input] = &[Input::Baseline, Input::Grouping, Input::Geometry];
const PROFILE_DEPS: &[Input] = &[Input::Baseline, Input::Grouping, Input::Facet];
const COMPARISON_DEPS: &[Input] = &[Input::Baseline, Input::Comparison, Input::HouseholdSize];
const MODEL_DEPS: &[Input] = &[
    Input::Baseline,
    Input::Comparison,
    Input::HouseholdSize,
    Input::Predictors,
];

/// Pull-based memo cell: holds the last computed value and the input
/// generations it saw. Recomputes only when a declared input has moved on.
/// Errors are never cached.
#[derive(Debug)]
struct DepCache<T> {
    deps: &'static [Input],
    value: Option<T>,
    seen: [u64; INPUT_COUNT],
    recomputes: u64,
}

impl<T: Clone> DepCache<T> {
    fn new(deps: &'static [Input]) -> DepCache<T> {
        DepCache {
            deps,
            value: None,
            seen: [0; INPUT_COUNT],
            recomputes: 0,
        }
    }

    fn is_stale(&self, generations: &[u64; INPUT_COUNT]) -> bool {
        self.value.is_none()
            || self
                .deps
                .iter()
                .any(|input| self.seen[input.index()] != generations[input.index()])
    }

    fn get<F>(&mut self, generations: &[u64; INPUT_COUNT], compute: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if self.is_stale(generations) {
            let value = compute()?;
            self.install(generations, value);
        }
        Ok(self.value.clone().expect("cache populated above"))
    }

    fn install(&mut self, generations: &[u64; INPUT_COUNT], value: T) {
        self.value = Some(value);
        self.seen = *generations;
        self.recomputes += 1;
    }
}

/// One interactive analysis session: the immutable base table, the current
/// Selection State, and the memoized derived views. All mutation goes through
/// the setters here; the engines only ever read.
pub struct Session {
    base: Arc<DataFrame>,
    benchmarks: BenchmarkTable,
    state: SelectionState,
    generations: [u64; INPUT_COUNT],
    daily: DepCache<DataFrame>,
    layout: DepCache<DataFrame>,
    summary: DepCache<DataFrame>,
    profile: DepCache<DataFrame>,
    comparison: DepCache<DataFrame>,
    model: DepCache<ModelFit>,
}

impl Session {
    pub fn new(base: DataFrame, benchmarks: BenchmarkTable, state: SelectionState) -> Session {
        Session {
            base: Arc::new(base),
            benchmarks,
            state,
            generations: [1; INPUT_COUNT],
            daily: DepCache::new(DAILY_DEPS),
            layout: DepCache::new(LAYOUT_DEPS),
            summary: DepCache::new(SUMMARY_DEPS),
            profile: DepCache::new(PROFILE_DEPS),
            comparison: DepCache::new(COMPARISON_DEPS),
            model: DepCache::new(MODEL_DEPS),
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn base(&self) -> &DataFrame {
        &self.base
    }

    fn bump(&mut self, input: Input) {
        self.generations[input.index()] += 1;
    }

    pub fn set_baseline(&mut self, range: DateRange) {
        if self.state.baseline != range {
            self.state.baseline = range;
            self.bump(Input::Baseline);
        }
    }

    pub fn set_comparison(&mut self, range: DateRange) {
        if self.state.comparison != range {
            self.state.comparison = range;
            self.bump(Input::Comparison);
        }
    }

    pub fn set_grouping(&mut self, grouping: GroupDim) {
        if self.state.grouping != grouping {
            self.state.grouping = grouping;
            self.bump(Input::Grouping);
        }
    }

    pub fn set_color_by(&mut self, color_by: ColorDim) {
        if self.state.color_by != color_by {
            self.state.color_by = color_by;
            self.bump(Input::ColorBy);
        }
    }

    pub fn set_threshold(&mut self, threshold_kwh: f64) {
        if self.state.threshold_kwh != threshold_kwh {
            self.state.threshold_kwh = threshold_kwh;
            self.bump(Input::Threshold);
        }
    }

    pub fn set_household_size(&mut self, household_size: u8) {
        if self.state.household_size != household_size {
            self.state.household_size = household_size;
            self.bump(Input::HouseholdSize);
        }
    }

    pub fn set_geometry(&mut self, geometry: Geometry) {
        if self.state.geometry != geometry {
            self.state.geometry = geometry;
            self.bump(Input::Geometry);
        }
    }

    pub fn set_facet(&mut self, facet: Option<GroupDim>) {
        if self.state.facet != facet {
            self.state.facet = facet;
            self.bump(Input::Facet);
        }
    }

    pub fn set_predictors(&mut self, predictors: Vec<Predictor>) {
        if self.state.predictors != predictors {
            self.state.predictors = predictors;
            self.bump(Input::Predictors);
        }
    }

    /// The baseline-range interval subset. Cheap enough to recompute on
    /// demand, so it is not cached.
    pub fn subset(&self) -> Result<DataFrame> {
        aggregate::subset(&self.base, &self.state.baseline)
    }

    pub fn daily_aggregate(&mut self) -> Result<DataFrame> {
        self.daily
            .get(&self.generations, || compute_daily(&self.base, &self.state))
    }

    pub fn calendar_layout(&mut self) -> Result<DataFrame> {
        self.layout
            .get(&self.generations, || compute_layout(&self.base, &self.state))
    }

    pub fn grouped_summary(&mut self) -> Result<DataFrame> {
        self.summary
            .get(&self.generations, || compute_summary(&self.base, &self.state))
    }

    pub fn halfhourly_profile(&mut self) -> Result<DataFrame> {
        self.profile
            .get(&self.generations, || compute_profile(&self.base, &self.state))
    }

    pub fn comparison_frame(&mut self) -> Result<DataFrame> {
        self.comparison.get(&self.generations, || {
            compute_comparison(&self.base, &self.state, &self.benchmarks)
        })
    }

    pub fn benchmark_summary(&mut self) -> Result<DataFrame> {
        let frame = self.comparison_frame()?;
        compare::benchmark_summary(&frame)
    }

    pub fn model(&mut self) -> Result<ModelFit> {
        self.model.get(&self.generations, || {
            let frame = compute_comparison(&self.base, &self.state, &self.benchmarks)?;
            model::fit_usage_model(&frame, &self.state.predictors)
        })
    }

    /// Recomputes every derived view from one consistent snapshot of the
    /// Selection State. The view families are independent of each other, so
    /// they run concurrently on the rayon pool.
    pub fn refresh_all(&mut self) -> Result<()> {
        let base = Arc::clone(&self.base);
        let state = self.state.clone();
        let benchmarks = self.benchmarks.clone();

        let (aggregation, (layout_frame, modeling)) = rayon::join(
            || -> Result<(DataFrame, DataFrame, DataFrame)> {
                Ok((
                    compute_daily(&base, &state)?,
                    compute_summary(&base, &state)?,
                    compute_profile(&base, &state)?,
                ))
            },
            || {
                rayon::join(
                    || compute_layout(&base, &state),
                    || -> Result<(DataFrame, ModelFit)> {
                        let frame = compute_comparison(&base, &state, &benchmarks)?;
                        let fit = model::fit_usage_model(&frame, &state.predictors)?;
                        Ok((frame, fit))
                    },
                )
            },
        );

        let (daily, summary, profile) = aggregation?;
        let layout_frame = layout_frame?;
        let (comparison, fit) = modeling?;

        let generations = self.generations;
        self.daily.install(&generations, daily);
        self.summary.install(&generations, summary);
        self.profile.install(&generations, profile);
        self.layout.install(&generations, layout_frame);
        self.comparison.install(&generations, comparison);
        self.model.install(&generations, fit);
        Ok(())
    }

    #[cfg(test)]
    fn daily_recomputes(&self) -> u64 {
        self.daily.recomputes
    }

    #[cfg(test)]
    fn model_recomputes(&self) -> u64 {
        self.model.recomputes
    }
}

fn compute_daily(base: &DataFrame, state: &SelectionState) -> Result<DataFrame> {
    let subset = aggregate::subset(base, &state.baseline)?;
    aggregate::daily_aggregate(&subset, state.threshold_kwh)
}

fn compute_layout(base: &DataFrame, state: &SelectionState) -> Result<DataFrame> {
    let subset = aggregate::subset(base, &state.baseline)?;
    layout::calendar_layout(
        &subset,
        state.threshold_kwh,
        state.color_by,
        DEFAULT_CALENDAR_COLUMNS,
    )
}

fn compute_summary(base: &DataFrame, state: &SelectionState) -> Result<DataFrame> {
    let subset = aggregate::subset(base, &state.baseline)?;
    // Column charts show totals; every other geometry reads mean daily usage.
    let stat = match state.geometry {
        Geometry::Column => Stat::Total,
        Geometry::Line | Geometry::Point | Geometry::Boxplot => Stat::Mean,
    };
    aggregate::daily_by_group(&subset, state.grouping, stat)
}

fn compute_profile(base: &DataFrame, state: &SelectionState) -> Result<DataFrame> {
    let subset = aggregate::subset(base, &state.baseline)?;
    aggregate::halfhourly_profile(&subset, state.grouping, state.facet)
}

fn compute_comparison(
    base: &DataFrame,
    state: &SelectionState,
    benchmarks: &BenchmarkTable,
) -> Result<DataFrame> {
    compare::comparison_frame(
        base,
        &state.baseline,
        &state.comparison,
        benchmarks,
        state.household_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{build_base_table, HolidayCalendar, SLOTS_PER_DAY};
    use crate::models::IntervalReading;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session_for(days: &[(NaiveDate, f64)], baseline: DateRange, comparison: DateRange) -> Session {
        let readings: Vec<IntervalReading> = days
            .iter()
            .flat_map(|(date, kwh)| {
                (1..=SLOTS_PER_DAY).map(move |slot| IntervalReading {
                    date: *date,
                    slot,
                    kwh: Some(*kwh),
                })
            })
            .collect();
        let base = build_base_table(&readings, &HolidayCalendar::default(), None).unwrap();
        let state = SelectionState::new(baseline, comparison);
        Session::new(base, BenchmarkTable::with_defaults(), state)
    }

    fn two_day_session() -> Session {
        session_for(
            &[(date(2018, 1, 1), 1.0), (date(2018, 1, 2), 1.0)],
            DateRange::new(date(2018, 1, 1), date(2018, 1, 2)),
            DateRange::new(date(2018, 1, 1), date(2018, 1, 2)),
        )
    }

    #[test]
    fn two_days_of_ones_exceed_a_threshold_of_twenty() {
        let mut session = two_day_session();
        session.set_threshold(20.0);

        let daily = session.daily_aggregate().unwrap();
        assert_eq!(daily.height(), 2);
        let totals = daily.column("daily_kwh").unwrap().f64().unwrap();
        assert_eq!(totals.get(0), Some(48.0));
        assert_eq!(totals.get(1), Some(48.0));
        let flags = daily.column("over_threshold").unwrap().bool().unwrap();
        assert_eq!(flags.get(0), Some(true));
        assert_eq!(flags.get(1), Some(true));
    }

    #[test]
    fn unrelated_input_changes_do_not_recompute_the_aggregate() {
        let mut session = two_day_session();

        session.daily_aggregate().unwrap();
        session.daily_aggregate().unwrap();
        assert_eq!(session.daily_recomputes(), 1);

        // Colour is not an input of the daily aggregate.
        session.set_color_by(ColorDim::Season);
        session.daily_aggregate().unwrap();
        assert_eq!(session.daily_recomputes(), 1);

        session.set_threshold(10.0);
        session.daily_aggregate().unwrap();
        assert_eq!(session.daily_recomputes(), 2);
    }

    #[test]
    fn setting_the_same_value_does_not_invalidate() {
        let mut session = two_day_session();
        session.daily_aggregate().unwrap();
        let threshold = session.state().threshold_kwh;
        session.set_threshold(threshold);
        session.daily_aggregate().unwrap();
        assert_eq!(session.daily_recomputes(), 1);
    }

    #[test]
    fn model_runs_through_the_session() {
        let mut session = session_for(
            &[
                (date(2018, 1, 1), 10.0 / 48.0),
                (date(2018, 1, 2), 10.0 / 48.0),
                (date(2018, 2, 1), 15.0 / 48.0),
                (date(2018, 2, 2), 15.0 / 48.0),
            ],
            DateRange::new(date(2018, 1, 1), date(2018, 1, 31)),
            DateRange::new(date(2018, 2, 1), date(2018, 2, 28)),
        );

        let fit = session.model().unwrap();
        assert!((fit.summary.period_effect - 5.0).abs() < 1e-9);
        assert_eq!(fit.summary.n_observations, 4);

        // A second read is served from cache.
        session.model().unwrap();
        assert_eq!(session.model_recomputes(), 1);
        // Four weekday levels over four observations cannot be fit; the error
        // is surfaced, not cached.
        session.set_predictors(vec![Predictor::Weekday]);
        assert!(session.model().is_err());
        assert_eq!(session.model_recomputes(), 1);
    }

    #[test]
    fn refresh_all_populates_every_view() {
        let mut session = two_day_session();
        session.refresh_all().unwrap();

        assert_eq!(session.daily_recomputes(), 1);
        assert_eq!(session.model_recomputes(), 1);
        // Subsequent pulls are all cache hits.
        session.daily_aggregate().unwrap();
        session.calendar_layout().unwrap();
        session.grouped_summary().unwrap();
        session.halfhourly_profile().unwrap();
        session.comparison_frame().unwrap();
        session.model().unwrap();
        assert_eq!(session.daily_recomputes(), 1);
        assert_eq!(session.model_recomputes(), 1);
    }
}
