//! Numeric algorithms used by the analyzers.

pub mod forest;
pub mod hdbscan;
pub mod linalg;

pub use forest::{ForestConfig, RandomForestRegressor};
pub use hdbscan::{Hdbscan, NOISE};
