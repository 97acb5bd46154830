//! RFM customer segmentation
//!
//! Builds Recency, Frequency and Monetary features from retail transactions,
//! clusters customers with K-Means, labels each cluster with a persona and
//! simulates the revenue impact of more engagement in one segment.

pub mod cli;
pub mod data;
pub mod error;
pub mod model;
pub mod persona;
pub mod pipeline;
pub mod report;
pub mod strategy;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{build_rfm, load_and_prepare_data, CustomerRfm, RfmSet};
pub use error::{ErrorKind, SegmentError};
pub use model::{cluster_stability_score, fit_kmeans, perform_clustering, ClusteringParams, KMeansModel};
pub use persona::{assign_personas, cluster_summary, ClusterSummary, Persona};
pub use pipeline::{PipelineOptions, SegmentationReport};
pub use strategy::{simulate_strategy, SimulationRow};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, SegmentError>;
