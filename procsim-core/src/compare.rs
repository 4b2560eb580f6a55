//! Baseline vs. optimized comparison, joined by metric name.

use serde::Serialize;

use crate::types::{MetricCategory, SimulationResult};

/// Direction of change relative to what is good for the metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improved,
    Regressed,
    Unchanged,
}

/// One row of the comparison table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricComparison {
    pub name: String,
    pub unit: String,
    pub category: MetricCategory,
    pub baseline: Option<f64>,
    pub optimized: Option<f64>,
    /// Percent change; `None` unless both runs report the metric
    pub delta_percent: Option<f64>,
    pub trend: Option<Trend>,
}

/// Percent change from `baseline` to `optimized`; 0 when the baseline is 0.
pub fn delta_percent(baseline: f64, optimized: f64) -> f64 {
    if baseline == 0.0 {
        0.0
    } else {
        (optimized - baseline) / baseline.abs() * 100.0
    }
}

/// Trend implied by a delta; a zero delta (including a zero baseline) is
/// unchanged.
fn trend(category: MetricCategory, delta_percent: f64) -> Trend {
    if delta_percent == 0.0 {
        Trend::Unchanged
    } else if (delta_percent > 0.0) != category.lower_is_better() {
        Trend::Improved
    } else {
        Trend::Regressed
    }
}

/// Compare two runs metric by metric.
///
/// Rows follow the baseline's order; metrics only the optimized run reports
/// come after, in their own order.
pub fn compare(baseline: &SimulationResult, optimized: &SimulationResult) -> Vec<MetricComparison> {
    let mut rows: Vec<MetricComparison> = baseline
        .metrics
        .iter()
        .map(|b| {
            let delta = optimized
                .metric(&b.name)
                .map(|o| (o.value, delta_percent(b.value, o.value)));
            MetricComparison {
                name: b.name.clone(),
                unit: b.unit.clone(),
                category: b.category,
                baseline: Some(b.value),
                optimized: delta.map(|(value, _)| value),
                delta_percent: delta.map(|(_, d)| d),
                trend: delta.map(|(_, d)| trend(b.category, d)),
            }
        })
        .collect();

    rows.extend(
        optimized
            .metrics
            .iter()
            .filter(|o| baseline.metric(&o.name).is_none())
            .map(|o| MetricComparison {
                name: o.name.clone(),
                unit: o.unit.clone(),
                category: o.category,
                baseline: None,
                optimized: Some(o.value),
                delta_percent: None,
                trend: None,
            }),
    );

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunType, SimulationMetric};

    fn run(run_type: RunType, metrics: &[(&str, f64, MetricCategory)]) -> SimulationResult {
        SimulationResult {
            id: "id".to_string(),
            timestamp: chrono::Utc::now(),
            run_type,
            metrics: metrics
                .iter()
                .map(|(name, value, category)| SimulationMetric {
                    name: name.to_string(),
                    value: *value,
                    unit: "u".to_string(),
                    category: *category,
                })
                .collect(),
            logs: vec![],
            summary: String::new(),
            assumptions: vec![],
        }
    }

    #[test]
    fn test_zero_baseline_delta_is_zero() {
        assert_eq!(delta_percent(0.0, 12.0), 0.0);
        assert_eq!(delta_percent(50.0, 75.0), 50.0);
        assert_eq!(delta_percent(-10.0, -5.0), 50.0);
    }

    #[test]
    fn test_compare_joins_by_name() {
        let baseline = run(
            RunType::Baseline,
            &[
                ("Yield", 80.0, MetricCategory::Yield),
                ("Scrap", 10.0, MetricCategory::Waste),
                ("Downtime", 0.0, MetricCategory::Other),
                ("Energy", 5.0, MetricCategory::Efficiency),
            ],
        );
        let optimized = run(
            RunType::Optimized,
            &[
                ("Scrap", 5.0, MetricCategory::Waste),
                ("Yield", 90.0, MetricCategory::Yield),
                ("Downtime", 3.0, MetricCategory::Other),
                ("OEE", 70.0, MetricCategory::Efficiency),
            ],
        );

        let rows = compare(&baseline, &optimized);
        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Yield", "Scrap", "Downtime", "Energy", "OEE"]);

        assert_eq!(rows[0].delta_percent, Some(12.5));
        assert_eq!(rows[0].trend, Some(Trend::Improved));

        // Less waste is an improvement
        assert_eq!(rows[1].delta_percent, Some(-50.0));
        assert_eq!(rows[1].trend, Some(Trend::Improved));

        // Zero baseline: no percent change, so no trend either
        assert_eq!(rows[2].delta_percent, Some(0.0));
        assert_eq!(rows[2].trend, Some(Trend::Unchanged));

        assert_eq!(rows[3].optimized, None);
        assert_eq!(rows[3].delta_percent, None);

        assert_eq!(rows[4].baseline, None);
        assert_eq!(rows[4].optimized, Some(70.0));
    }

    #[test]
    fn test_unchanged_trend() {
        assert_eq!(trend(MetricCategory::Yield, 0.0), Trend::Unchanged);
        assert_eq!(trend(MetricCategory::Throughput, -33.3), Trend::Regressed);
        assert_eq!(trend(MetricCategory::Waste, 33.3), Trend::Regressed);
        assert_eq!(trend(MetricCategory::Waste, -10.0), Trend::Improved);
    }
}
