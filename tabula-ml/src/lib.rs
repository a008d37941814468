//! # Tabula ML
//!
//! Turns a messy tabular dataset into an analytics bundle: refined columns,
//! correlations, anomalies, data quality, feature importance, a causal graph,
//! segments, a monthly forecast, and an LLM narrative on top.
//!
//! Every stage can run locally or on the remote offload platform; remote
//! failures always fall back to the local computation.

// Foundation
pub mod error;

// Data model and refinement
pub mod data;

// Numeric building blocks
pub mod algorithms;
pub mod stats;

// Analyzers
pub mod causal;
pub mod cleaning;
pub mod compare;
pub mod finance;
pub mod forecast;
pub mod segment;

// Narrative
pub mod insights;

// Execution
pub mod offload;
pub mod pipeline;

// Re-exports
pub use causal::{CausalNetwork, build_causal_network};
pub use cleaning::{CleaningIssue, CleaningReport, cleaning_report};
pub use compare::{ComparisonReport, compare};
pub use data::{DatasetSource, DirectorySource, RawDataset, RefinedDataset, refine};
pub use error::MlError;
pub use finance::{ProfitLoss, SummaryStats};
pub use forecast::{ForecastReport, ForecastRequest, Forecaster};
pub use offload::{Engines, LocalEngine, OffloadFallback, RemoteEngine};
pub use pipeline::{Pipeline, PipelineResult};
