//! Candidate parameter generation: full grid or a seeded random sample of it.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::strategy::ValueScreenParams;

/// Parameter grid for the value screen.
///
/// An empty cap list means "no cap" and contributes a single `None` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub max_per: Vec<f64>,
    pub max_pbr: Vec<f64>,
    pub top_n: Vec<usize>,
    pub use_forward_per: Vec<bool>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            max_per: vec![10.0, 15.0, 20.0],
            max_pbr: vec![1.0, 1.5],
            top_n: vec![10, 20],
            use_forward_per: vec![false, true],
        }
    }
}

fn caps(values: &[f64]) -> Vec<Option<f64>> {
    if values.is_empty() {
        vec![None]
    } else {
        values.iter().copied().map(Some).collect()
    }
}

impl ParamGrid {
    /// Returns the total number of parameter sets in this grid.
    pub fn size(&self) -> usize {
        caps(&self.max_per).len()
            * caps(&self.max_pbr).len()
            * self.top_n.len()
            * self.use_forward_per.len().max(1)
    }

    /// Every combination, in a fixed order.
    pub fn generate(&self) -> Vec<ValueScreenParams> {
        let forward = if self.use_forward_per.is_empty() {
            vec![false]
        } else {
            self.use_forward_per.clone()
        };
        let mut out = Vec::with_capacity(self.size());
        for max_per in caps(&self.max_per) {
            for max_pbr in caps(&self.max_pbr) {
                for &top_n in &self.top_n {
                    for &use_forward_per in &forward {
                        out.push(ValueScreenParams {
                            max_per,
                            max_pbr,
                            top_n,
                            use_forward_per,
                        });
                    }
                }
            }
        }
        out
    }

    /// `samples` distinct parameter sets drawn from the grid with a fixed seed.
    /// Returns the whole grid when it is not larger than `samples`.
    pub fn sample(&self, samples: usize, seed: u64) -> Vec<ValueScreenParams> {
        let all = self.generate();
        if all.len() <= samples {
            return all;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        all.choose_multiple(&mut rng, samples).cloned().collect()
    }
}

/// How candidates are drawn from the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Grid,
    Random { samples: usize, seed: u64 },
}

impl SearchMode {
    pub fn candidates(&self, grid: &ParamGrid) -> Vec<ValueScreenParams> {
        match self {
            Self::Grid => grid.generate(),
            Self::Random { samples, seed } => grid.sample(*samples, *seed),
        }
    }
}
