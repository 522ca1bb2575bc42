//! Which period statistic picks the winning candidate.

use serde::{Deserialize, Serialize};

use crate::performance::PeriodPerformance;

/// Statistic a fold maximizes over its training dates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMetric {
    #[default]
    MeanExcess,
    MeanReturn,
    InformationRatio,
    HitRate,
}

impl SelectionMetric {
    /// Extract the metric from a period summary. `None` when the period had
    /// nothing to measure.
    pub fn extract(&self, perf: &PeriodPerformance) -> Option<f64> {
        match self {
            Self::MeanExcess => perf.mean_excess,
            Self::MeanReturn => perf.mean_return,
            Self::InformationRatio => perf.information_ratio,
            Self::HitRate => perf.hit_rate,
        }
    }

    /// Returns true if `a` is better than `b`. Higher is better for every metric.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        a > b
    }

    /// Index of the best scored candidate. Earlier candidates win ties;
    /// candidates without a score never win.
    pub fn best_index(&self, scores: &[Option<f64>]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, score) in scores.iter().enumerate() {
            let Some(s) = score.filter(|s| s.is_finite()) else {
                continue;
            };
            match best {
                Some((_, b)) if !self.is_better(s, b) => {}
                _ => best = Some((i, s)),
            }
        }
        best.map(|(i, _)| i)
    }
}
