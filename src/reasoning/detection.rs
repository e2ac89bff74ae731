//! Detection primitives: per-metric temporal framing, trend classification,
//! risk progression, and significance tests. Pure functions over the
//! reference table so the engine stays trivially testable.

use chrono::{DateTime, Utc};

use crate::models::{ChangeDirection, PatientDocument};

use super::reference::ClinicalReferenceData;
use super::types::{
    OverallTrend, RiskProgression, RiskProgressionDetail, RiskProgressionSummary, Significance,
    SignificantChange, TemporalMetric, TrendClass,
};

/// Value changes below this are noise.
const CHANGE_EPSILON: f64 = 0.01;

/// Trend dominance factor: one direction must outnumber the other by this
/// much before the trend is called.
const TREND_DOMINANCE: f64 = 1.5;

/// Frame one metric's current value against its prior observations.
/// `history` must be ascending by sort key and exclude the current document.
/// Returns `None` when the current value does not coerce to a number.
pub(crate) fn build_temporal_metric(
    name: &str,
    document: &PatientDocument,
    history: &[&PatientDocument],
    reference: &ClinicalReferenceData,
) -> Option<TemporalMetric> {
    let current_value = document.numeric_metric(name)?;

    let mut observations: Vec<(DateTime<Utc>, f64)> = Vec::new();
    for prior in history {
        if let Some(value) = prior.numeric_metric(name) {
            observations.push((prior.timestamp, value));
        }
    }

    let first_observed = observations
        .first()
        .map(|(ts, _)| *ts)
        .unwrap_or(document.timestamp);
    let previous = observations.last().copied();
    let (previous_value, previous_timestamp) = match previous {
        Some((ts, value)) => (Some(value), Some(ts)),
        None => (None, None),
    };

    let change = previous_value.map(|prior| current_value - prior);
    let percent_change = match (change, previous_value) {
        (Some(delta), Some(prior)) if prior != 0.0 => Some(delta / prior * 100.0),
        _ => None,
    };

    let direction = match change {
        None => ChangeDirection::New,
        Some(delta) if delta.abs() < CHANGE_EPSILON => ChangeDirection::Stable,
        Some(delta) if delta > 0.0 => ChangeDirection::Increased,
        Some(_) => ChangeDirection::Decreased,
    };

    let worse_is_higher = reference.worse_is_higher(name);
    let mut values: Vec<f64> = observations.iter().map(|(_, v)| *v).collect();
    values.push(current_value);
    let trend = determine_trend(&values, worse_is_higher);

    let risk_level_current = reference.risk_level(name, current_value);
    let risk_level_previous = previous_value.map(|v| reference.risk_level(name, v));
    let risk_progression = determine_risk_progression(
        name,
        risk_level_previous.as_deref(),
        &risk_level_current,
        reference,
    );

    Some(TemporalMetric {
        metric: name.to_string(),
        current_value,
        current_timestamp: document.timestamp,
        first_observed,
        previous_value,
        previous_timestamp,
        change,
        percent_change,
        direction,
        trend,
        observation_count: values.len(),
        risk_level_current,
        risk_level_previous,
        risk_progression,
    })
}

/// Classify a series of chronological values. Counts pairwise movements and
/// requires 1.5x dominance of one direction before calling a trend.
pub(crate) fn determine_trend(values: &[f64], worse_is_higher: bool) -> TrendClass {
    if values.len() < 2 {
        return TrendClass::InsufficientData;
    }

    let mut increases = 0usize;
    let mut decreases = 0usize;
    for pair in values.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > CHANGE_EPSILON {
            increases += 1;
        } else if delta < -CHANGE_EPSILON {
            decreases += 1;
        }
    }

    if increases as f64 > decreases as f64 * TREND_DOMINANCE {
        if worse_is_higher {
            TrendClass::Worsening
        } else {
            TrendClass::Improving
        }
    } else if decreases as f64 > increases as f64 * TREND_DOMINANCE {
        if worse_is_higher {
            TrendClass::Improving
        } else {
            TrendClass::Worsening
        }
    } else {
        TrendClass::Stable
    }
}

/// Compare risk levels across the two most recent observations. A first
/// observation counts as `NewRisk` only when it lands outside the healthy
/// band; unknown levels rank as healthy rather than guessing.
pub(crate) fn determine_risk_progression(
    metric: &str,
    previous_level: Option<&str>,
    current_level: &str,
    reference: &ClinicalReferenceData,
) -> RiskProgression {
    let current_rank = reference.severity_rank(metric, current_level);

    let Some(previous_level) = previous_level else {
        return match current_rank {
            Some(rank) if rank > 0 => RiskProgression::NewRisk,
            _ => RiskProgression::Stable,
        };
    };

    let previous_rank = reference.severity_rank(metric, previous_level).unwrap_or(0);
    let current_rank = current_rank.unwrap_or(0);

    if current_rank > previous_rank {
        RiskProgression::Worsened
    } else if current_rank < previous_rank {
        RiskProgression::Improved
    } else {
        RiskProgression::Stable
    }
}

/// Keep the metrics whose between-report change crossed the clinical
/// significance threshold. Twice the threshold upgrades to `High`.
pub(crate) fn detect_significant_changes(
    metrics: &[TemporalMetric],
    reference: &ClinicalReferenceData,
) -> Vec<SignificantChange> {
    let mut changes = Vec::new();
    for metric in metrics {
        let (Some(change), Some(previous_value)) = (metric.change, metric.previous_value) else {
            continue;
        };
        let threshold = reference.significance_threshold(&metric.metric);
        if change.abs() < threshold {
            continue;
        }
        let significance = if change.abs() >= threshold * 2.0 {
            Significance::High
        } else {
            Significance::Moderate
        };
        changes.push(SignificantChange {
            metric: metric.metric.clone(),
            previous_value,
            current_value: metric.current_value,
            change,
            percent_change: metric.percent_change,
            direction: metric.direction,
            significance,
            threshold,
            risk_progression: metric.risk_progression,
        });
    }
    changes
}

/// Aggregate per-metric progressions into counts and an overall trend.
pub(crate) fn assess_risk_progressions(metrics: &[TemporalMetric]) -> RiskProgressionSummary {
    let mut summary = RiskProgressionSummary::default();

    for metric in metrics {
        match metric.risk_progression {
            RiskProgression::Improved => summary.improved_count += 1,
            RiskProgression::Worsened => summary.worsened_count += 1,
            RiskProgression::Stable => summary.stable_count += 1,
            RiskProgression::NewRisk => summary.new_risk_count += 1,
            RiskProgression::ResolvedRisk => summary.resolved_risk_count += 1,
        }
        if metric.risk_progression != RiskProgression::Stable {
            summary.details.push(RiskProgressionDetail {
                metric: metric.metric.clone(),
                previous_level: metric.risk_level_previous.clone(),
                current_level: metric.risk_level_current.clone(),
                progression: metric.risk_progression,
            });
        }
    }

    // Only level transitions drive the trajectory; first observations are
    // counted separately and stay out of the comparison.
    summary.overall_trend = if summary.worsened_count > summary.improved_count {
        OverallTrend::Worsening
    } else if summary.improved_count > summary.worsened_count {
        OverallTrend::Improving
    } else {
        OverallTrend::Stable
    };

    summary
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone};

    use crate::models::MetricValue;

    use super::*;

    fn doc(offset_days: i64, metric: &str, value: MetricValue) -> PatientDocument {
        let mut metrics = BTreeMap::new();
        metrics.insert(metric.to_string(), value);
        let mut doc = PatientDocument::new(1, "lab_report", "", metrics);
        doc.timestamp =
            Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap() + Duration::days(offset_days);
        doc
    }

    #[test]
    fn first_observation_is_new() {
        let reference = ClinicalReferenceData::built_in();
        let current = doc(0, "glucose_fasting", MetricValue::Number(95.0));

        let metric = build_temporal_metric("glucose_fasting", &current, &[], &reference).unwrap();
        assert_eq!(metric.direction, ChangeDirection::New);
        assert_eq!(metric.change, None);
        assert_eq!(metric.percent_change, None);
        assert_eq!(metric.trend, TrendClass::InsufficientData);
        assert_eq!(metric.risk_progression, RiskProgression::Stable);
    }

    #[test]
    fn first_observation_outside_healthy_band_is_new_risk() {
        let reference = ClinicalReferenceData::built_in();
        let current = doc(0, "glucose_fasting", MetricValue::Number(130.0));

        let metric = build_temporal_metric("glucose_fasting", &current, &[], &reference).unwrap();
        assert_eq!(metric.risk_level_current, "diabetic");
        assert_eq!(metric.risk_progression, RiskProgression::NewRisk);
    }

    #[test]
    fn change_against_most_recent_prior() {
        let reference = ClinicalReferenceData::built_in();
        let older = doc(0, "glucose_fasting", MetricValue::Number(90.0));
        let prior = doc(30, "glucose_fasting", MetricValue::from("95 mg/dL"));
        let current = doc(60, "glucose_fasting", MetricValue::Number(130.0));

        let metric =
            build_temporal_metric("glucose_fasting", &current, &[&older, &prior], &reference)
                .unwrap();
        assert_eq!(metric.previous_value, Some(95.0));
        assert_eq!(metric.change, Some(35.0));
        assert_eq!(metric.direction, ChangeDirection::Increased);
        assert_eq!(metric.risk_progression, RiskProgression::Worsened);
        assert_eq!(metric.observation_count, 3);
        assert_eq!(metric.first_observed, older.timestamp);
        assert_eq!(metric.previous_timestamp, Some(prior.timestamp));
    }

    #[test]
    fn first_observation_dates_itself() {
        let reference = ClinicalReferenceData::built_in();
        let current = doc(0, "glucose_fasting", MetricValue::Number(95.0));
        let metric = build_temporal_metric("glucose_fasting", &current, &[], &reference).unwrap();
        assert_eq!(metric.first_observed, current.timestamp);
    }

    #[test]
    fn zero_previous_value_omits_percent() {
        let reference = ClinicalReferenceData::built_in();
        let prior = doc(0, "count", MetricValue::Number(0.0));
        let current = doc(30, "count", MetricValue::Number(4.0));

        let metric = build_temporal_metric("count", &current, &[&prior], &reference).unwrap();
        assert_eq!(metric.change, Some(4.0));
        assert_eq!(metric.percent_change, None);
    }

    #[test]
    fn textual_current_value_is_skipped() {
        let reference = ClinicalReferenceData::built_in();
        let current = doc(0, "culture", MetricValue::from("negative"));
        assert!(build_temporal_metric("culture", &current, &[], &reference).is_none());
    }

    #[test]
    fn trend_requires_dominance() {
        // Two rises, two falls: neither side dominates.
        assert_eq!(
            determine_trend(&[100.0, 110.0, 105.0, 112.0, 108.0], true),
            TrendClass::Stable
        );
        // Two rises against one fall: 2 > 1 * 1.5 holds.
        assert_eq!(
            determine_trend(&[100.0, 110.0, 105.0, 112.0], true),
            TrendClass::Worsening
        );
        // Three straight rises.
        assert_eq!(
            determine_trend(&[100.0, 110.0, 118.0, 130.0], true),
            TrendClass::Worsening
        );
        assert_eq!(
            determine_trend(&[130.0, 118.0, 110.0, 100.0], true),
            TrendClass::Improving
        );
        assert_eq!(determine_trend(&[100.0], true), TrendClass::InsufficientData);
    }

    #[test]
    fn rising_hdl_is_improving() {
        assert_eq!(
            determine_trend(&[38.0, 45.0, 52.0], false),
            TrendClass::Improving
        );
        assert_eq!(
            determine_trend(&[52.0, 45.0, 38.0], false),
            TrendClass::Worsening
        );
    }

    #[test]
    fn risk_progression_compares_severity_ranks() {
        let reference = ClinicalReferenceData::built_in();
        assert_eq!(
            determine_risk_progression("glucose_fasting", Some("normal"), "prediabetic", &reference),
            RiskProgression::Worsened
        );
        assert_eq!(
            determine_risk_progression("glucose_fasting", Some("diabetic"), "prediabetic", &reference),
            RiskProgression::Improved
        );
        assert_eq!(
            determine_risk_progression("glucose_fasting", Some("normal"), "normal", &reference),
            RiskProgression::Stable
        );
        // Unknown levels rank as healthy.
        assert_eq!(
            determine_risk_progression("glucose_fasting", Some("unknown"), "prediabetic", &reference),
            RiskProgression::Worsened
        );
        assert_eq!(
            determine_risk_progression("ferritin", None, "unknown", &reference),
            RiskProgression::Stable
        );
    }

    #[test]
    fn significance_tiers_against_threshold() {
        let reference = ClinicalReferenceData::built_in();
        // glucose_fasting threshold is 10.
        let cases = [(8.0, None), (15.0, Some(Significance::Moderate)), (25.0, Some(Significance::High))];
        for (delta, expected) in cases {
            let prior = doc(0, "glucose_fasting", MetricValue::Number(95.0));
            let current = doc(30, "glucose_fasting", MetricValue::Number(95.0 + delta));
            let metric =
                build_temporal_metric("glucose_fasting", &current, &[&prior], &reference).unwrap();
            let changes = detect_significant_changes(&[metric], &reference);
            match expected {
                None => assert!(changes.is_empty(), "delta {delta} should be insignificant"),
                Some(significance) => {
                    assert_eq!(changes.len(), 1);
                    assert_eq!(changes[0].significance, significance);
                    assert_eq!(changes[0].threshold, 10.0);
                }
            }
        }
    }

    #[test]
    fn progression_summary_counts_and_overall_trend() {
        let reference = ClinicalReferenceData::built_in();

        let prior_glucose = doc(0, "glucose_fasting", MetricValue::Number(95.0));
        let worsened = build_temporal_metric(
            "glucose_fasting",
            &doc(30, "glucose_fasting", MetricValue::Number(110.0)),
            &[&prior_glucose],
            &reference,
        )
        .unwrap();

        let prior_tg = doc(0, "triglycerides", MetricValue::Number(160.0));
        let stable = build_temporal_metric(
            "triglycerides",
            &doc(30, "triglycerides", MetricValue::Number(165.0)),
            &[&prior_tg],
            &reference,
        )
        .unwrap();

        let summary = assess_risk_progressions(&[worsened, stable]);
        assert_eq!(summary.worsened_count, 1);
        assert_eq!(summary.stable_count, 1);
        assert_eq!(summary.details.len(), 1);
        assert_eq!(summary.overall_trend, OverallTrend::Worsening);
    }

    #[test]
    fn new_risk_does_not_drive_overall_trend() {
        let reference = ClinicalReferenceData::built_in();
        let first_seen = build_temporal_metric(
            "hba1c",
            &doc(30, "hba1c", MetricValue::Number(7.0)),
            &[],
            &reference,
        )
        .unwrap();
        assert_eq!(first_seen.risk_progression, RiskProgression::NewRisk);

        let summary = assess_risk_progressions(&[first_seen]);
        assert_eq!(summary.new_risk_count, 1);
        assert_eq!(summary.worsened_count, 0);
        assert_eq!(summary.overall_trend, OverallTrend::Stable);
        assert_eq!(summary.details.len(), 1);
    }
}
