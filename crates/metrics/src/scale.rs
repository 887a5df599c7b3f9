//! Conversion of scaled performances back to Gflop/s.

use anyhow::{anyhow, ensure, Result};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Multiply every value by the maximum performance of its group.
pub fn scale_back<G: Ord + Display>(
    values: &[f64],
    groups: &[G],
    max_performances: &BTreeMap<G, f64>,
) -> Result<Vec<f64>> {
    ensure!(
        values.len() == groups.len(),
        "{} values but {} group labels",
        values.len(),
        groups.len()
    );
    values
        .iter()
        .zip(groups)
        .map(|(value, group)| {
            max_performances
                .get(group)
                .map(|max| value * max)
                .ok_or_else(|| anyhow!("no maximum performance recorded for {group}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_back_multiplies_by_group_max() {
        let max: BTreeMap<&str, f64> = [("a", 100.0), ("b", 10.0)].into_iter().collect();
        let scaled = scale_back(&[0.5, 1.0, 0.25], &["a", "b", "a"], &max).unwrap();
        assert_eq!(scaled, vec![50.0, 10.0, 25.0]);
    }

    #[test]
    fn test_scale_back_requires_every_group() {
        let max: BTreeMap<&str, f64> = [("a", 100.0)].into_iter().collect();
        let err = scale_back(&[0.5], &["z"], &max).unwrap_err();
        assert!(err.to_string().contains('z'));
    }
}
