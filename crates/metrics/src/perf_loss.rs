//! Relative performance loss of top-k predicted kernel parameters.
//!
//! For every group (one kernel shape), the `top_k` configurations with the
//! highest predicted performance are assumed to be benchmarked and the best
//! of them kept. The loss is the gap between that delivered performance and
//! the true optimum of the group, in percent of the optimum.

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Per-group loss in percent, one entry per distinct group in ascending
/// group-key order.
///
/// With `scaled`, values are fractions of a known per-group maximum, so the
/// loss is `100 * (1 - delivered)`. Otherwise the maximum is taken from the
/// group's own true values and must be strictly positive.
pub fn perf_loss<G: Ord>(
    y_true: &[f64],
    y_pred: &[f64],
    top_k: usize,
    groups: &[G],
    scaled: bool,
) -> Result<Vec<f64>> {
    ensure!(
        y_true.len() == y_pred.len(),
        "y_true has {} values but y_pred has {}",
        y_true.len(),
        y_pred.len()
    );
    ensure!(
        y_true.len() == groups.len(),
        "y_true has {} values but there are {} group labels",
        y_true.len(),
        groups.len()
    );
    ensure!(top_k > 0, "top_k must be positive");

    let mut members: BTreeMap<&G, Vec<usize>> = BTreeMap::new();
    for (row, group) in groups.iter().enumerate() {
        members.entry(group).or_default().push(row);
    }

    members
        .values()
        .map(|rows| group_loss(y_true, y_pred, rows, top_k, scaled))
        .collect()
}

fn group_loss(
    y_true: &[f64],
    y_pred: &[f64],
    rows: &[usize],
    top_k: usize,
    scaled: bool,
) -> Result<f64> {
    ensure!(!rows.is_empty(), "group has no observations");

    let delivered = top_k_rows(y_pred, rows, top_k)
        .iter()
        .map(|&row| y_true[row])
        .fold(f64::NEG_INFINITY, f64::max);

    let loss = if scaled {
        1.0 - delivered
    } else {
        let max_perf = rows
            .iter()
            .map(|&row| y_true[row])
            .fold(f64::NEG_INFINITY, f64::max);
        if !(max_perf > 0.0) {
            bail!("found non-positive maximum performance {max_perf} in group");
        }
        (max_perf - delivered) / max_perf
    };
    Ok(100.0 * loss)
}

/// Rows of the `top_k` highest predictions. A single arg-max (first maximum)
/// for `top_k == 1`, an unordered partial selection otherwise. Asking for at
/// least as many rows as the group has selects the whole group.
fn top_k_rows(y_pred: &[f64], rows: &[usize], top_k: usize) -> Vec<usize> {
    if top_k == 1 {
        return rows
            .iter()
            .copied()
            .reduce(|best, row| {
                if y_pred[row].total_cmp(&y_pred[best]) == Ordering::Greater {
                    row
                } else {
                    best
                }
            })
            .into_iter()
            .collect();
    }

    let mut candidates = rows.to_vec();
    if top_k < candidates.len() {
        candidates.select_nth_unstable_by(top_k - 1, |&a, &b| y_pred[b].total_cmp(&y_pred[a]));
        candidates.truncate(top_k);
    }
    candidates
}

/// Worst-case loss over all groups.
pub fn worst_loss<G: Ord>(
    y_true: &[f64],
    y_pred: &[f64],
    top_k: usize,
    groups: &[G],
    scaled: bool,
) -> Result<f64> {
    let losses = perf_loss(y_true, y_pred, top_k, groups, scaled)?;
    ensure!(!losses.is_empty(), "cannot aggregate losses of zero groups");
    Ok(losses.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

/// Mean loss over all groups.
pub fn mean_loss<G: Ord>(
    y_true: &[f64],
    y_pred: &[f64],
    top_k: usize,
    groups: &[G],
    scaled: bool,
) -> Result<f64> {
    let losses = perf_loss(y_true, y_pred, top_k, groups, scaled)?;
    ensure!(!losses.is_empty(), "cannot aggregate losses of zero groups");
    Ok(losses.iter().sum::<f64>() / losses.len() as f64)
}

/// Worst and mean top-k loss of one prediction set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossSummary {
    pub top_k: usize,
    pub worst: f64,
    pub mean: f64,
    pub n_groups: usize,
}

impl LossSummary {
    pub fn compute<G: Ord>(
        y_true: &[f64],
        y_pred: &[f64],
        top_k: usize,
        groups: &[G],
        scaled: bool,
    ) -> Result<Self> {
        let losses = perf_loss(y_true, y_pred, top_k, groups, scaled)?;
        ensure!(!losses.is_empty(), "cannot summarise losses of zero groups");
        Ok(Self {
            top_k,
            worst: losses.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: losses.iter().sum::<f64>() / losses.len() as f64,
            n_groups: losses.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scaled_top1_example() {
        let losses = perf_loss(
            &[0.5, 0.9, 0.3],
            &[0.2, 0.8, 0.1],
            1,
            &["2x2x2", "2x2x2", "2x2x2"],
            true,
        )
        .unwrap();
        assert_eq!(losses.len(), 1);
        assert_relative_eq!(losses[0], 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unscaled_top1_example() {
        let losses = perf_loss(
            &[50.0, 90.0, 30.0],
            &[20.0, 80.0, 10.0],
            1,
            &["2x2x2"; 3],
            false,
        )
        .unwrap();
        assert_eq!(losses, vec![0.0]);
    }

    #[test]
    fn test_unscaled_wrong_choice() {
        // Predicted best is row 0 (50 Gflop/s) while the optimum is 100.
        let losses = perf_loss(&[50.0, 100.0], &[9.0, 1.0], 1, &[1, 1], false).unwrap();
        assert_relative_eq!(losses[0], 50.0);
    }

    #[test]
    fn test_one_entry_per_group_in_key_order() {
        let y_true = [1.0, 0.5, 0.8, 0.2, 1.0, 0.9];
        let y_pred = [0.1, 0.9, 0.7, 0.6, 0.2, 0.3];
        let groups = ["b", "b", "a", "a", "c", "c"];
        let losses = perf_loss(&y_true, &y_pred, 1, &groups, true).unwrap();
        assert_eq!(losses.len(), 3);
        // a: picks 0.8, b: picks 0.5, c: picks 0.9
        assert_relative_eq!(losses[0], 20.0, epsilon = 1e-9);
        assert_relative_eq!(losses[1], 50.0, epsilon = 1e-9);
        assert_relative_eq!(losses[2], 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_top_k_covering_true_max_has_zero_loss() {
        let y_true = [0.2, 1.0, 0.4, 0.3];
        let y_pred = [0.9, 0.6, 0.8, 0.1];
        let groups = [7; 4];
        assert!(perf_loss(&y_true, &y_pred, 2, &groups, true).unwrap()[0] > 0.0);
        assert_eq!(perf_loss(&y_true, &y_pred, 3, &groups, true).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_increasing_k_never_increases_loss() {
        let y_true = [40.0, 10.0, 75.0, 60.0, 100.0, 20.0];
        let y_pred = [0.9, 0.95, 0.3, 0.5, 0.1, 0.7];
        let groups = [0; 6];
        let mut previous = f64::INFINITY;
        for k in 1..=8 {
            let loss = perf_loss(&y_true, &y_pred, k, &groups, false).unwrap()[0];
            assert!(loss <= previous, "k={k}: {loss} > {previous}");
            previous = loss;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn test_scaled_loss_invariant_to_monotonic_rescaling() {
        let y_true = [0.3, 0.7, 1.0, 0.6, 0.2, 0.9];
        let y_pred = [0.2, 0.5, 0.4, 0.8, 0.1, 0.3];
        let groups = [1, 1, 1, 2, 2, 2];
        let rescaled: Vec<f64> = y_pred.iter().map(|p| (3.0 * p + 1.0_f64).ln()).collect();
        for k in 1..=3 {
            assert_eq!(
                perf_loss(&y_true, &y_pred, k, &groups, true).unwrap(),
                perf_loss(&y_true, &rescaled, k, &groups, true).unwrap()
            );
        }
    }

    #[test]
    fn test_worst_dominates_mean() {
        let y_true = [0.5, 1.0, 0.9, 1.0, 0.7, 1.0];
        let y_pred = [0.9, 0.1, 0.9, 0.1, 0.1, 0.9];
        let groups = [1, 1, 2, 2, 3, 3];
        let worst = worst_loss(&y_true, &y_pred, 1, &groups, true).unwrap();
        let mean = mean_loss(&y_true, &y_pred, 1, &groups, true).unwrap();
        assert_relative_eq!(worst, 50.0, epsilon = 1e-9);
        assert_relative_eq!(mean, 20.0, epsilon = 1e-9);
        assert!(worst >= mean);
    }

    #[test]
    fn test_single_group_worst_equals_mean() {
        let y_true = [0.5, 0.9];
        let y_pred = [0.9, 0.1];
        let summary = LossSummary::compute(&y_true, &y_pred, 1, &["x"; 2], true).unwrap();
        assert_eq!(summary.n_groups, 1);
        assert_eq!(summary.worst, summary.mean);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        assert!(perf_loss(&[1.0, 2.0], &[1.0], 1, &[0, 0], false).is_err());
        assert!(perf_loss(&[1.0, 2.0], &[1.0, 2.0], 1, &[0], false).is_err());
    }

    #[test]
    fn test_zero_top_k_is_rejected() {
        assert!(perf_loss(&[1.0], &[1.0], 0, &[0], true).is_err());
    }

    #[test]
    fn test_non_positive_unscaled_maximum_is_rejected() {
        let err = perf_loss(&[0.0, 0.0], &[0.5, 0.1], 1, &[0, 0], false).unwrap_err();
        assert!(err.to_string().contains("non-positive"));
        // The scaled path does not need a positive maximum.
        assert_eq!(perf_loss(&[0.0, 0.0], &[0.5, 0.1], 1, &[0, 0], true).unwrap(), vec![100.0]);
    }

    #[test]
    fn test_empty_input_has_no_groups() {
        let losses = perf_loss::<u8>(&[], &[], 1, &[], true).unwrap();
        assert!(losses.is_empty());
        assert!(worst_loss::<u8>(&[], &[], 1, &[], true).is_err());
    }
}
