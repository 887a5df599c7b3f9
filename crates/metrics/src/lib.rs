//! Accuracy metrics for kernel performance predictors.
//!
//! The central metric is [`perf_loss`]: how much performance is lost, per
//! kernel shape, when the parameters are picked by the model instead of by
//! exhaustive autotuning.

pub mod histogram;
pub mod perf_loss;
pub mod regression;
pub mod scale;

pub use histogram::Histogram;
pub use perf_loss::{mean_loss, perf_loss, worst_loss, LossSummary};
pub use regression::{mean_absolute_error, mean_squared_error};
pub use scale::scale_back;
