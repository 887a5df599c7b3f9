//! Training and evaluation driver for kernel parameter performance models.

pub mod artifacts;
#[cfg(feature = "cli")]
pub mod cli;
pub mod eval;
pub mod pipeline;
pub mod session;

pub use artifacts::*;
#[cfg(feature = "cli")]
pub use cli::*;
pub use eval::*;
pub use pipeline::*;
pub use session::*;
