use linfa::traits::{Fit, Predict};
use linfa::Dataset;
use linfa_linear::LinearRegression;
use log::debug;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::Serialize;

use crate::calendar::{MONTH_NAMES, WEEKDAY_NAMES};
use crate::compare::PERIOD_COMPARISON;
use crate::error::{ExplorerError, Result};
use crate::models::Predictor;

/// Coefficients and goodness of fit for one fitted usage model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    /// Predictors actually entered into the design, after interaction
    /// expansion.
    pub predictors: Vec<Predictor>,
    /// Design column names aligned with `coefficients`.
    pub terms: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub baseline_estimate: f64,
    pub comparison_estimate: f64,
    pub period_effect: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub residual_sum_of_squares: f64,
    pub n_observations: usize,
}

/// A fitted model: the summary plus the comparison frame extended with
/// fitted and residual columns (complete-case rows only).
#[derive(Debug, Clone)]
pub struct ModelFit {
    pub summary: ModelSummary,
    pub frame: DataFrame,
}

/// Expands the user's predictor checkboxes into the effective set: the
/// month x weekday interaction pulls in both main effects even when they were
/// not separately selected.
pub fn effective_predictors(selected: &[Predictor]) -> Vec<Predictor> {
    let interaction = selected.contains(&Predictor::MonthWeekdayInteraction);
    let mut effective = Vec::new();
    if selected.contains(&Predictor::Weekday) || interaction {
        effective.push(Predictor::Weekday);
    }
    if selected.contains(&Predictor::Month) || interaction {
        effective.push(Predictor::Month);
    }
    if selected.contains(&Predictor::MaxTemp) {
        effective.push(Predictor::MaxTemp);
    }
    if interaction {
        effective.push(Predictor::MonthWeekdayInteraction);
    }
    effective
}

/// The levels of a categorical predictor that occur in the data, in the
/// declared display order. This is the explicit ordered-to-unordered
/// coercion step: the order fixes nothing but the reference cell, and no
/// ordinal structure reaches the model.
fn present_levels(values: &[&str], natural: &[&str]) -> Vec<String> {
    natural
        .iter()
        .filter(|level| values.iter().any(|v| v == *level))
        .map(|level| level.to_string())
        .collect()
}

fn dummy_columns(
    predictor: &str,
    values: &[&str],
    levels: &[String],
    names: &mut Vec<String>,
    columns: &mut Vec<Vec<f64>>,
) -> Result<()> {
    if levels.len() < 2 {
        return Err(ExplorerError::Model(format!(
            "predictor '{}' has a single level across the selected periods",
            predictor
        )));
    }
    for level in &levels[1..] {
        names.push(format!("{}[{}]", predictor, level));
        columns.push(
            values
                .iter()
                .map(|v| if *v == level.as_str() { 1.0 } else { 0.0 })
                .collect(),
        );
    }
    Ok(())
}

/// Ordinary-least-squares fit of daily kwh on the selected predictors. The
/// baseline/comparison indicator is always the first design column; with no
/// other predictors the fit reduces to a two-group mean comparison.
pub fn fit_usage_model(comparison: &DataFrame, selected: &[Predictor]) -> Result<ModelFit> {
    let effective = effective_predictors(selected);

    let periods = comparison.column("period")?.utf8()?;
    let daily = comparison.column("daily_kwh")?.f64()?;
    let weekdays = comparison.column("weekday")?.utf8()?;
    let months = comparison.column("month")?.utf8()?;
    let max_temp = comparison.column("max_temp_c")?.f64()?;

    let need_temp = effective.contains(&Predictor::MaxTemp);
    let mut kept = Vec::with_capacity(comparison.height());
    let mut period_flags = Vec::new();
    let mut weekday_values = Vec::new();
    let mut month_values = Vec::new();
    let mut temp_values = Vec::new();
    let mut y_values = Vec::new();

    for row in 0..comparison.height() {
        let temp = max_temp.get(row);
        if need_temp && temp.is_none() {
            kept.push(false);
            continue;
        }
        kept.push(true);
        period_flags.push(if periods.get(row) == Some(PERIOD_COMPARISON) {
            1.0
        } else {
            0.0
        });
        weekday_values.push(weekdays.get(row).unwrap_or_default());
        month_values.push(months.get(row).unwrap_or_default());
        temp_values.push(temp.unwrap_or(0.0));
        y_values.push(daily.get(row).unwrap_or(0.0));
    }

    let dropped = kept.iter().filter(|k| !**k).count();
    if dropped > 0 {
        debug!("dropped {} observations with missing max temperature", dropped);
    }

    let n = y_values.len();
    let in_comparison = period_flags.iter().filter(|f| **f > 0.5).count();
    if n == 0 || in_comparison == 0 || in_comparison == n {
        return Err(ExplorerError::Model(
            "one of the periods has no observations".to_string(),
        ));
    }

    let mut names = vec![format!("period[{}]", PERIOD_COMPARISON)];
    let mut columns = vec![period_flags];

    for predictor in &effective {
        match predictor {
            Predictor::Weekday => {
                let levels = present_levels(&weekday_values, &WEEKDAY_NAMES);
                dummy_columns("weekday", &weekday_values, &levels, &mut names, &mut columns)?;
            }
            Predictor::Month => {
                let levels = present_levels(&month_values, &MONTH_NAMES);
                dummy_columns("month", &month_values, &levels, &mut names, &mut columns)?;
            }
            Predictor::MaxTemp => {
                names.push("max_temp_c".to_string());
                columns.push(temp_values.clone());
            }
            Predictor::MonthWeekdayInteraction => {
                let weekday_levels = present_levels(&weekday_values, &WEEKDAY_NAMES);
                let month_levels = present_levels(&month_values, &MONTH_NAMES);
                for month in &month_levels[1..] {
                    for weekday in &weekday_levels[1..] {
                        names.push(format!("month[{}]:weekday[{}]", month, weekday));
                        columns.push(
                            month_values
                                .iter()
                                .zip(&weekday_values)
                                .map(|(m, w)| {
                                    if *m == month.as_str() && *w == weekday.as_str() {
                                        1.0
                                    } else {
                                        0.0
                                    }
                                })
                                .collect(),
                        );
                    }
                }
            }
        }
    }

    let p = columns.len();
    if n <= p + 1 {
        return Err(ExplorerError::Model(format!(
            "{} observations cannot support {} coefficients",
            n,
            p + 1
        )));
    }
    for (name, column) in names.iter().zip(&columns) {
        let first = column[0];
        if column.iter().all(|v| (*v - first).abs() < f64::EPSILON) {
            return Err(ExplorerError::Model(format!(
                "design column '{}' is constant across the selected periods",
                name
            )));
        }
    }

    let mut x = Array2::<f64>::zeros((n, p));
    for (j, column) in columns.iter().enumerate() {
        for (i, value) in column.iter().enumerate() {
            x[[i, j]] = *value;
        }
    }
    let y = Array1::from_vec(y_values);

    let dataset = Dataset::new(x.clone(), y.clone());
    let fitted_model = LinearRegression::new()
        .fit(&dataset)
        .map_err(|e| ExplorerError::Model(e.to_string()))?;

    let fitted = fitted_model.predict(&x);
    let residuals = &y - &fitted;
    let rss = residuals.mapv(|r| r * r).sum();
    let mean = y.mean().unwrap_or(0.0);
    let tss = y.mapv(|v| (v - mean) * (v - mean)).sum();
    let r_squared = if tss > 0.0 {
        1.0 - rss / tss
    } else if rss < 1e-12 {
        1.0
    } else {
        0.0
    };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / (n as f64 - p as f64 - 1.0);

    let intercept = fitted_model.intercept();
    let coefficients = fitted_model.params().to_vec();
    let period_effect = coefficients[0];

    let summary = ModelSummary {
        predictors: effective,
        terms: names,
        coefficients,
        intercept,
        baseline_estimate: intercept,
        comparison_estimate: intercept + period_effect,
        period_effect,
        r_squared,
        adj_r_squared,
        residual_sum_of_squares: rss,
        n_observations: n,
    };

    let mask = BooleanChunked::from_slice("kept", &kept);
    let mut frame = comparison.filter(&mask)?;
    frame.with_column(Series::new("fitted", fitted.to_vec()))?;
    frame.with_column(Series::new("residual", residuals.to_vec()))?;

    Ok(ModelFit { summary, frame })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comparison_df(rows: &[(&str, f64, &str, &str, Option<f64>)]) -> DataFrame {
        DataFrame::new(vec![
            Series::new("period", rows.iter().map(|r| r.0).collect::<Vec<_>>()),
            Series::new("daily_kwh", rows.iter().map(|r| r.1).collect::<Vec<_>>()),
            Series::new("weekday", rows.iter().map(|r| r.2).collect::<Vec<_>>()),
            Series::new("month", rows.iter().map(|r| r.3).collect::<Vec<_>>()),
            Series::new("max_temp_c", rows.iter().map(|r| r.4).collect::<Vec<_>>()),
        ])
        .unwrap()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn constant_periods_recover_exact_group_means() {
        let df = comparison_df(&[
            ("baseline", 10.0, "Mon", "Jan", None),
            ("baseline", 10.0, "Tue", "Jan", None),
            ("baseline", 10.0, "Wed", "Jan", None),
            ("comparison", 15.0, "Mon", "Feb", None),
            ("comparison", 15.0, "Tue", "Feb", None),
            ("comparison", 15.0, "Wed", "Feb", None),
        ]);

        let fit = fit_usage_model(&df, &[]).unwrap();
        assert_close(fit.summary.intercept, 10.0);
        assert_close(fit.summary.period_effect, 5.0);
        assert_close(fit.summary.baseline_estimate, 10.0);
        assert_close(fit.summary.comparison_estimate, 15.0);
        assert_close(fit.summary.r_squared, 1.0);
        assert_close(fit.summary.residual_sum_of_squares, 0.0);
    }

    #[test]
    fn period_only_model_still_produces_diagnostics() {
        let df = comparison_df(&[
            ("baseline", 8.0, "Mon", "Jan", None),
            ("baseline", 12.0, "Tue", "Jan", None),
            ("comparison", 14.0, "Wed", "Feb", None),
            ("comparison", 18.0, "Thu", "Feb", None),
        ]);

        let fit = fit_usage_model(&df, &[]).unwrap();
        assert_eq!(fit.summary.n_observations, 4);
        assert_eq!(fit.frame.height(), 4);
        assert!(fit.frame.column("fitted").is_ok());
        assert!(fit.frame.column("residual").is_ok());
        // Two-group mean comparison: fitted values are the group means.
        assert_close(fit.summary.baseline_estimate, 10.0);
        assert_close(fit.summary.comparison_estimate, 16.0);

        let residuals = fit.frame.column("residual").unwrap().f64().unwrap();
        let rss: f64 = residuals.into_iter().flatten().map(|r| r * r).sum();
        assert_close(rss, fit.summary.residual_sum_of_squares);
    }

    #[test]
    fn interaction_pulls_in_both_main_effects() {
        let effective = effective_predictors(&[Predictor::MonthWeekdayInteraction]);
        assert_eq!(
            effective,
            vec![
                Predictor::Weekday,
                Predictor::Month,
                Predictor::MonthWeekdayInteraction
            ]
        );
    }

    #[test]
    fn single_level_predictor_cannot_be_fit() {
        let df = comparison_df(&[
            ("baseline", 10.0, "Mon", "Jan", None),
            ("baseline", 11.0, "Mon", "Jan", None),
            ("baseline", 12.0, "Mon", "Jan", None),
            ("comparison", 15.0, "Mon", "Jan", None),
            ("comparison", 16.0, "Mon", "Jan", None),
        ]);
        let err = fit_usage_model(&df, &[Predictor::Weekday]).unwrap_err();
        assert!(matches!(err, ExplorerError::Model(_)));
    }

    #[test]
    fn empty_period_cannot_be_fit() {
        let df = comparison_df(&[
            ("baseline", 10.0, "Mon", "Jan", None),
            ("baseline", 11.0, "Tue", "Jan", None),
        ]);
        let err = fit_usage_model(&df, &[]).unwrap_err();
        assert!(matches!(err, ExplorerError::Model(_)));
    }

    #[test]
    fn rows_without_max_temp_are_dropped_when_temperature_is_selected() {
        let df = comparison_df(&[
            ("baseline", 10.0, "Mon", "Jan", Some(30.0)),
            ("baseline", 12.0, "Tue", "Jan", Some(32.0)),
            ("baseline", 11.0, "Wed", "Jan", None),
            ("comparison", 15.0, "Mon", "Feb", Some(28.0)),
            ("comparison", 17.0, "Tue", "Feb", Some(31.0)),
            ("comparison", 16.0, "Wed", "Feb", Some(29.0)),
        ]);

        let fit = fit_usage_model(&df, &[Predictor::MaxTemp]).unwrap();
        assert_eq!(fit.summary.n_observations, 5);
        assert_eq!(fit.frame.height(), 5);
        assert_eq!(fit.summary.terms[1], "max_temp_c");
    }
}
