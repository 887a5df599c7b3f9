//! Equal-width histograms of per-group losses.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// `bins + 1` ascending bin edges.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Bin `values` into `bins` equal-width bins spanning their range. The last
    /// bin is closed on the right. A constant sample gets a unit-wide range.
    pub fn new(values: &[f64], bins: usize) -> Result<Self> {
        ensure!(bins > 0, "a histogram needs at least one bin");
        ensure!(
            values.iter().all(|v| v.is_finite()),
            "histogram values must be finite"
        );

        let (mut lo, mut hi) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if values.is_empty() {
            (lo, hi) = (0.0, 1.0);
        } else if lo == hi {
            (lo, hi) = (lo - 0.5, hi + 0.5);
        }

        let width = (hi - lo) / bins as f64;
        let edges = (0..=bins).map(|i| lo + width * i as f64).collect();
        let mut counts = vec![0; bins];
        for &value in values {
            let bin = (((value - lo) / width) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        Ok(Self { edges, counts })
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}
