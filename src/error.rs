//! Error types for the segmentation pipeline.
//!
//! Every stage either succeeds completely or returns a `SegmentError`.
//! Variants are grouped by [`ErrorKind`] so the presentation layer can tell
//! bad input apart from an invalid parameter or an unknown cluster.

use linfa_clustering::KMeansError;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Broad category of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The transaction source is unusable.
    Input,
    /// A parameter is outside the domain the data allows.
    Domain,
    /// A requested cluster label does not exist.
    Lookup,
    /// A numeric primitive failed.
    Internal,
}

/// Errors raised by the pipeline stages.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// A required column is absent from the source.
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// An invoice timestamp could not be parsed.
    #[error("Unparseable invoice timestamp: '{0}'")]
    InvalidTimestamp(String),

    /// A retained row has an empty value in a required column.
    #[error("Column {0} has empty values in retained rows")]
    NullValue(String),

    /// Nothing survived the customer/quantity/price filters.
    #[error("No valid transactions found after filtering")]
    NoValidRows,

    /// The CSV could not be read.
    #[error("Failed to read transactions: {0}")]
    Read(#[from] PolarsError),

    /// Cluster count is below 2 or above the number of customers.
    #[error("Invalid cluster count {requested}: must be between 2 and the number of customers ({customers})")]
    InvalidClusterCount { requested: usize, customers: usize },

    /// Fewer distinct feature vectors than requested clusters
    #[error("Cannot form {requested} clusters from {distinct} distinct customer profiles")]
    TooFewDistinctPoints { requested: usize, distinct: usize },

    /// Engagement multiplier must be strictly positive.
    #[error("Invalid engagement multiplier {0}: must be a positive finite number")]
    InvalidMultiplier(f64),

    /// A stage that needs cluster labels received an unclustered record.
    #[error("Customer {0} has no cluster label; run clustering first")]
    Unclustered(String),

    /// Target cluster label not present in the current segmentation.
    #[error("Cluster {0} does not exist in the current segmentation")]
    UnknownCluster(usize),

    #[error("K-Means failed: {0}")]
    KMeans(#[from] KMeansError),
}

impl SegmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SegmentError::MissingColumn(_)
            | SegmentError::InvalidTimestamp(_)
            | SegmentError::NullValue(_)
            | SegmentError::NoValidRows
            | SegmentError::Read(_) => ErrorKind::Input,
            SegmentError::InvalidClusterCount { .. }
            | SegmentError::TooFewDistinctPoints { .. }
            | SegmentError::InvalidMultiplier(_)
            | SegmentError::Unclustered(_) => ErrorKind::Domain,
            SegmentError::UnknownCluster(_) => ErrorKind::Lookup,
            SegmentError::KMeans(_) => ErrorKind::Internal,
        }
    }
}
