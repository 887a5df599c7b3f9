//! Measurement data for small-matrix-multiplication kernel performance models.

pub mod dataset;
pub mod mnk;
pub mod reference;
pub mod table;

pub use dataset::*;
pub use mnk::*;
pub use reference::*;
pub use table::*;
