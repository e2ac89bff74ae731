//! The temporal reasoning engine. Pure and synchronous: all inputs arrive as
//! arguments, nothing is read from storage here.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::memory::MetricTrend;
use crate::models::PatientDocument;

use super::detection;
use super::insights;
use super::reference::ClinicalReferenceData;
use super::types::TemporalAnalysis;

pub struct TemporalReasoningEngine {
    reference: ClinicalReferenceData,
}

impl TemporalReasoningEngine {
    pub fn new(reference: ClinicalReferenceData) -> Self {
        Self { reference }
    }

    /// Analyze one report against its history. `historical` may arrive in
    /// any order and must not contain the current document; `trends` are the
    /// window-level trends from the memory index.
    pub fn analyze(
        &self,
        current: &PatientDocument,
        historical: &[PatientDocument],
        trends: &BTreeMap<String, MetricTrend>,
    ) -> TemporalAnalysis {
        let now = Utc::now();

        let mut history: Vec<&PatientDocument> = historical.iter().collect();
        history.sort_by_key(|doc| doc.sort_key());

        let mut temporal_metrics = Vec::new();
        for name in current.metrics.keys() {
            if let Some(metric) =
                detection::build_temporal_metric(name, current, &history, &self.reference)
            {
                temporal_metrics.push(metric);
            }
        }

        let detected_changes =
            detection::detect_significant_changes(&temporal_metrics, &self.reference);
        let risk_progressions = detection::assess_risk_progressions(&temporal_metrics);
        let temporal_insights = insights::generate_insights(
            &temporal_metrics,
            &detected_changes,
            &risk_progressions,
            trends,
            now,
        );
        let temporal_summary = insights::build_summary(
            &temporal_metrics,
            &detected_changes,
            &risk_progressions,
            &temporal_insights,
        );

        tracing::debug!(
            patient_id = current.patient_id,
            document_id = %current.document_id,
            metrics = temporal_metrics.len(),
            significant_changes = detected_changes.len(),
            insights = temporal_insights.len(),
            "Temporal analysis complete"
        );

        TemporalAnalysis {
            temporal_metrics,
            detected_changes,
            risk_progressions,
            temporal_insights,
            temporal_summary,
            analysis_timestamp: now,
        }
    }
}

impl Default for TemporalReasoningEngine {
    fn default() -> Self {
        Self::new(ClinicalReferenceData::built_in())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use crate::models::{ChangeDirection, MetricValue};
    use crate::reasoning::types::{InsightKind, OverallTrend, RiskProgression, Significance};

    use super::*;

    fn doc(offset_days: i64, metrics: &[(&str, f64)]) -> PatientDocument {
        let map = metrics
            .iter()
            .map(|(k, v)| (k.to_string(), MetricValue::Number(*v)))
            .collect();
        let mut doc = PatientDocument::new(1, "lab_report", "", map);
        doc.timestamp =
            Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap() + Duration::days(offset_days);
        doc
    }

    #[test]
    fn worsening_glucose_end_to_end() {
        let engine = TemporalReasoningEngine::default();
        let history = vec![doc(0, &[("glucose_fasting", 95.0)])];
        let current = doc(30, &[("glucose_fasting", 130.0)]);

        let analysis = engine.analyze(&current, &history, &BTreeMap::new());

        assert_eq!(analysis.temporal_metrics.len(), 1);
        let metric = &analysis.temporal_metrics[0];
        assert_eq!(metric.change, Some(35.0));
        assert_eq!(metric.direction, ChangeDirection::Increased);
        assert_eq!(metric.risk_progression, RiskProgression::Worsened);

        assert_eq!(analysis.detected_changes.len(), 1);
        assert_eq!(analysis.detected_changes[0].significance, Significance::High);

        assert_eq!(
            analysis.risk_progressions.overall_trend,
            OverallTrend::Worsening
        );

        assert_eq!(
            analysis.temporal_insights[0].insight_type,
            InsightKind::RiskIncrease
        );
        assert_eq!(analysis.temporal_insights[0].priority, 900);
        assert!(analysis.temporal_summary.contains("worsening"));
    }

    #[test]
    fn history_order_does_not_matter() {
        let engine = TemporalReasoningEngine::default();
        // Reverse chronological on purpose.
        let history = vec![
            doc(30, &[("glucose_fasting", 100.0)]),
            doc(0, &[("glucose_fasting", 95.0)]),
        ];
        let current = doc(60, &[("glucose_fasting", 110.0)]);

        let analysis = engine.analyze(&current, &history, &BTreeMap::new());
        // Previous must be the day-30 value, not the day-0 one.
        assert_eq!(analysis.temporal_metrics[0].previous_value, Some(100.0));
    }

    #[test]
    fn empty_metrics_yield_empty_analysis() {
        let engine = TemporalReasoningEngine::default();
        let current = doc(0, &[]);

        let analysis = engine.analyze(&current, &[], &BTreeMap::new());
        assert!(analysis.temporal_metrics.is_empty());
        assert!(analysis.detected_changes.is_empty());
        assert!(analysis.temporal_insights.is_empty());
        assert!(analysis.temporal_summary.contains("No trackable metrics"));
    }

    #[test]
    fn no_history_means_all_new() {
        let engine = TemporalReasoningEngine::default();
        let current = doc(0, &[("glucose_fasting", 130.0), ("hdl", 65.0)]);

        let analysis = engine.analyze(&current, &[], &BTreeMap::new());
        assert_eq!(analysis.temporal_metrics.len(), 2);
        for metric in &analysis.temporal_metrics {
            assert_eq!(metric.direction, ChangeDirection::New);
        }
        assert!(analysis.detected_changes.is_empty());
        assert_eq!(analysis.risk_progressions.new_risk_count, 1);
        assert_eq!(analysis.risk_progressions.worsened_count, 0);
        assert_eq!(
            analysis.risk_progressions.overall_trend,
            OverallTrend::Stable
        );
    }

    #[test]
    fn first_seen_risk_does_not_worsen_trajectory() {
        let engine = TemporalReasoningEngine::default();
        // Glucose holds steady; hba1c appears for the first time at a
        // diabetic level.
        let history = vec![doc(0, &[("glucose_fasting", 95.0)])];
        let current = doc(30, &[("glucose_fasting", 95.0), ("hba1c", 7.0)]);

        let analysis = engine.analyze(&current, &history, &BTreeMap::new());
        assert_eq!(analysis.risk_progressions.new_risk_count, 1);
        assert_eq!(analysis.risk_progressions.worsened_count, 0);
        assert_eq!(
            analysis.risk_progressions.overall_trend,
            OverallTrend::Stable
        );
        assert!(analysis
            .temporal_insights
            .iter()
            .all(|i| i.insight_type != InsightKind::RiskIncrease));
    }
}
