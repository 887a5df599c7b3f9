//! Pointwise regression errors.

use anyhow::{ensure, Result};

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let sum: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    Ok(sum / y_true.len() as f64)
}

pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let sum: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();
    Ok(sum / y_true.len() as f64)
}

fn check_lengths(y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    ensure!(
        y_true.len() == y_pred.len(),
        "y_true has {} values but y_pred has {}",
        y_true.len(),
        y_pred.len()
    );
    ensure!(!y_true.is_empty(), "cannot compute an error over zero samples");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mse_and_mae() {
        let y_true = [1.0, 2.0, 3.0, 4.0];
        let y_pred = [1.0, 3.0, 1.0, 4.0];
        assert_relative_eq!(mean_squared_error(&y_true, &y_pred).unwrap(), 1.25);
        assert_relative_eq!(mean_absolute_error(&y_true, &y_pred).unwrap(), 0.75);
    }

    #[test]
    fn test_errors_reject_bad_input() {
        assert!(mean_squared_error(&[1.0], &[1.0, 2.0]).is_err());
        assert!(mean_absolute_error(&[], &[]).is_err());
    }
}
