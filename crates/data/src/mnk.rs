//! Kernel-shape keys, algorithm classes and performance types.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Matrix dimensions identifying a kernel-shape group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mnk {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl Mnk {
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self { m, n, k }
    }

    /// `m * n * k`, the x-axis of the train/test partition summary.
    pub fn product(&self) -> u64 {
        self.m as u64 * self.n as u64 * self.k as u64
    }

    pub fn flops(&self) -> f64 {
        2.0 * self.m as f64 * self.n as f64 * self.k as f64
    }
}

impl fmt::Display for Mnk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.m, self.n, self.k)
    }
}

impl FromStr for Mnk {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut dims = s.trim().split('x').map(|part| {
            part.parse::<usize>()
                .map_err(|_| anyhow!("invalid mnk string {s:?}"))
        });
        let (Some(m), Some(n), Some(k), None) = (dims.next(), dims.next(), dims.next(), dims.next())
        else {
            bail!("invalid mnk string {s:?}, expected <m>x<n>x<k>");
        };
        Ok(Self::new(m?, n?, k?))
    }
}

// JSON reference files key their maps by "mxnxk" strings.
impl Serialize for Mnk {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Mnk {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Kernel algorithm family a model is trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlgorithmClass {
    #[serde(rename = "tiny")]
    Tiny,
    #[serde(rename = "small")]
    Small,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "largeDB1")]
    LargeDb1,
    #[serde(rename = "largeDB2")]
    LargeDb2,
}

impl AlgorithmClass {
    pub const ALL: [AlgorithmClass; 5] = [
        AlgorithmClass::Tiny,
        AlgorithmClass::Small,
        AlgorithmClass::Medium,
        AlgorithmClass::LargeDb1,
        AlgorithmClass::LargeDb2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmClass::Tiny => "tiny",
            AlgorithmClass::Small => "small",
            AlgorithmClass::Medium => "medium",
            AlgorithmClass::LargeDb1 => "largeDB1",
            AlgorithmClass::LargeDb2 => "largeDB2",
        }
    }

    /// Raw-data columns that carry no information for this class.
    pub fn unused_raw_columns(&self) -> &'static [&'static str] {
        match self {
            AlgorithmClass::Tiny => &["w", "v", "tile_m", "tile_n"],
            AlgorithmClass::Small | AlgorithmClass::Medium => &["w", "v"],
            AlgorithmClass::LargeDb1 | AlgorithmClass::LargeDb2 => &[],
        }
    }
}

impl fmt::Display for AlgorithmClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|algo| algo.as_str() == s)
            .ok_or_else(|| anyhow!("unknown algorithm {s:?}, expected one of tiny, small, medium, largeDB1, largeDB2"))
    }
}

/// Which performance column is the regression target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerfType {
    /// Raw measured Gflop/s.
    Perf,
    PerfSquared,
    /// Gflop/s divided by the best measurement of the mnk over all algorithms.
    PerfScaled,
    /// Gflop/s divided by the best measurement of the mnk within the algorithm.
    PerfScaledByAlgo,
}

impl PerfType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerfType::Perf => "perf",
            PerfType::PerfSquared => "perf_squared",
            PerfType::PerfScaled => "perf_scaled",
            PerfType::PerfScaledByAlgo => "perf_scaled_by_algo",
        }
    }

    /// Scaled targets lie in [0, 1] relative to a per-mnk maximum.
    pub fn is_scaled(&self) -> bool {
        matches!(self, PerfType::PerfScaled | PerfType::PerfScaledByAlgo)
    }
}

impl fmt::Display for PerfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PerfType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "perf" => Ok(PerfType::Perf),
            "perf_squared" => Ok(PerfType::PerfSquared),
            "perf_scaled" => Ok(PerfType::PerfScaled),
            "perf_scaled_by_algo" => Ok(PerfType::PerfScaledByAlgo),
            other => bail!(
                "unknown perf type {other:?}, expected perf, perf_squared, perf_scaled or perf_scaled_by_algo"
            ),
        }
    }
}
