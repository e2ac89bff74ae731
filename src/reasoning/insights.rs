//! Insight generation: turn detection results into prioritized, evidenced
//! conclusions plus a plain-text summary for the narrative layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::memory::MetricTrend;

use super::types::{
    InsightKind, OverallTrend, RiskProgressionSummary, Significance, SignificantChange,
    TemporalInsight, TemporalMetric, TrendClass,
};

const SUMMARY_TOP_ITEMS: usize = 3;
const SUMMARY_DESCRIPTION_CHARS: usize = 100;

/// Minimum observations before a per-metric trend insight is raised.
const TREND_INSIGHT_MIN_OBSERVATIONS: usize = 3;

fn format_change(change: f64, percent: Option<f64>) -> String {
    match percent {
        Some(percent) => format!("{change:+.1} ({percent:+.1}%)"),
        None => format!("{change:+.1}"),
    }
}

pub(crate) fn generate_insights(
    metrics: &[TemporalMetric],
    changes: &[SignificantChange],
    summary: &RiskProgressionSummary,
    trends: &BTreeMap<String, MetricTrend>,
    now: DateTime<Utc>,
) -> Vec<TemporalInsight> {
    let mut insights = Vec::new();

    // One insight per highly significant change.
    for change in changes {
        if change.significance != Significance::High {
            continue;
        }
        insights.push(TemporalInsight {
            insight_type: InsightKind::SignificantChange,
            priority: 800,
            title: format!("{} {}", change.metric, change.direction.as_str()),
            description: format!(
                "from {:.1} to {:.1} ({})",
                change.previous_value,
                change.current_value,
                format_change(change.change, change.percent_change)
            ),
            evidence: vec![
                format!("previous value: {:.1}", change.previous_value),
                format!("current value: {:.1}", change.current_value),
                format!("significance threshold: {:.1}", change.threshold),
                format!("risk progression: {}", change.risk_progression.as_str()),
            ],
            temporal_context: "between the two most recent reports".to_string(),
            recommendation: Some(format!(
                "Review {} with the treating clinician",
                change.metric
            )),
            confidence: 0.85,
            timestamp: now,
        });
    }

    // One aggregate insight when any metric crossed into a higher risk
    // level. First observations are not level transitions and never fire it.
    let worsened: Vec<&TemporalMetric> = metrics
        .iter()
        .filter(|m| m.risk_progression == super::types::RiskProgression::Worsened)
        .collect();
    if summary.worsened_count > 0 {
        let evidence = worsened
            .iter()
            .map(|m| {
                format!(
                    "{}: {} -> {}",
                    m.metric,
                    m.risk_level_previous.as_deref().unwrap_or("unknown"),
                    m.risk_level_current
                )
            })
            .collect();
        insights.push(TemporalInsight {
            insight_type: InsightKind::RiskIncrease,
            priority: 900,
            title: "Risk level increased".to_string(),
            description: format!(
                "{} metric(s) moved to a higher risk category",
                worsened.len()
            ),
            evidence,
            temporal_context: "compared with the previous report".to_string(),
            recommendation: Some("Clinical follow-up is advisable".to_string()),
            confidence: 0.9,
            timestamp: now,
        });
    }

    // One aggregate insight when any metric improved.
    let improved: Vec<&TemporalMetric> = metrics
        .iter()
        .filter(|m| m.risk_progression == super::types::RiskProgression::Improved)
        .collect();
    if !improved.is_empty() {
        let evidence = improved
            .iter()
            .map(|m| {
                format!(
                    "{}: {} -> {}",
                    m.metric,
                    m.risk_level_previous.as_deref().unwrap_or("unknown"),
                    m.risk_level_current
                )
            })
            .collect();
        insights.push(TemporalInsight {
            insight_type: InsightKind::Improvement,
            priority: 600,
            title: "Improvement detected".to_string(),
            description: format!(
                "{} metric(s) moved to a lower risk category",
                improved.len()
            ),
            evidence,
            temporal_context: "compared with the previous report".to_string(),
            recommendation: None,
            confidence: 0.85,
            timestamp: now,
        });
    }

    // Per-metric trend insights for sustained movements.
    for metric in metrics {
        if metric.observation_count < TREND_INSIGHT_MIN_OBSERVATIONS {
            continue;
        }
        let descriptor = match metric.trend {
            TrendClass::Worsening => "worsening",
            TrendClass::Improving => "improving",
            _ => continue,
        };
        let mut evidence = vec![format!(
            "{} measurements in the lookback window",
            metric.observation_count
        )];
        if let Some(MetricTrend::Computed(data)) = trends.get(&metric.metric) {
            evidence.push(format!(
                "window change: {}",
                format_change(data.change, Some(data.percent_change))
            ));
        }
        insights.push(TemporalInsight {
            insight_type: InsightKind::TrendDetected,
            priority: 700,
            title: format!("{} trend is {descriptor}", metric.metric),
            description: format!(
                "consistent movement across {} measurements",
                metric.observation_count
            ),
            evidence,
            temporal_context: format!(
                "tracked since {}",
                metric.first_observed.format("%Y-%m-%d")
            ),
            recommendation: None,
            confidence: 0.8,
            timestamp: now,
        });
    }

    // Stable sort keeps generation order within a priority tier.
    insights.sort_by(|a, b| b.priority.cmp(&a.priority));
    insights
}

pub(crate) fn build_summary(
    metrics: &[TemporalMetric],
    changes: &[SignificantChange],
    progressions: &RiskProgressionSummary,
    insights: &[TemporalInsight],
) -> String {
    if metrics.is_empty() {
        return "No trackable metrics found in the current report.".to_string();
    }

    let mut lines = Vec::new();

    lines.push(match progressions.overall_trend {
        OverallTrend::Worsening => format!(
            "Overall trajectory is worsening: {} metric(s) at higher risk, {} improved.",
            progressions.worsened_count, progressions.improved_count
        ),
        OverallTrend::Improving => format!(
            "Overall trajectory is improving: {} metric(s) at lower risk, {} worsened.",
            progressions.improved_count, progressions.worsened_count
        ),
        OverallTrend::Stable => format!(
            "Overall trajectory is stable across {} tracked metric(s).",
            metrics.len()
        ),
    });

    if !changes.is_empty() {
        lines.push(format!("Significant changes detected: {}", changes.len()));
        for change in changes.iter().take(SUMMARY_TOP_ITEMS) {
            lines.push(format!(
                "- {}: {} by {:.1} ({})",
                change.metric,
                change.direction.as_str(),
                change.change.abs(),
                format_change(change.change, change.percent_change)
            ));
        }
    }

    if !insights.is_empty() {
        lines.push("Key temporal insights:".to_string());
        for insight in insights.iter().take(SUMMARY_TOP_ITEMS) {
            let description: String = insight
                .description
                .chars()
                .take(SUMMARY_DESCRIPTION_CHARS)
                .collect();
            lines.push(format!("- {}: {}", insight.title, description));
        }
    }

    lines.push(format!(
        "Analysis period: {} metric(s) tracked over time.",
        metrics.len()
    ));

    lines.join("\n")
}
