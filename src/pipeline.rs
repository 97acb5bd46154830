//! End-to-end run of the four segmentation stages

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use log::info;
use serde::Serialize;

use crate::data::{load_and_prepare_data, CustomerRfm};
use crate::model::{cluster_stability_score, perform_clustering, DEFAULT_CLUSTERS};
use crate::persona::{assign_personas, cluster_summary, ClusterSummary, Persona};
use crate::strategy::{multiplier_from_percent, simulate_strategy, SimulationRow};

/// User-adjustable inputs of a run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub n_clusters: usize,
    /// Segment receiving the simulated uplift; lowest label when `None`
    pub target_cluster: Option<usize>,
    /// Assumed engagement increase in percent
    pub increase_pct: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            n_clusters: DEFAULT_CLUSTERS,
            target_cluster: None,
            increase_pct: 20.0,
        }
    }
}

/// Everything the presentation layer renders for one run
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationReport {
    pub snapshot: NaiveDateTime,
    pub n_clusters: usize,
    pub stability_score: f64,
    pub summary: Vec<ClusterSummary>,
    pub personas: BTreeMap<usize, Persona>,
    pub target_cluster: usize,
    pub increase_pct: f64,
    pub simulation: Vec<SimulationRow>,
    pub customers: Vec<CustomerRfm>,
}

/// Load, cluster, profile and simulate in one pass
pub fn run(file_path: impl AsRef<Path>, options: &PipelineOptions) -> crate::Result<SegmentationReport> {
    let rfm = load_and_prepare_data(file_path)?;
    info!("Loaded {} customers (snapshot {})", rfm.len(), rfm.snapshot);

    let (rfm, standardized) = perform_clustering(rfm, options.n_clusters)?;
    let stability_score = cluster_stability_score(&standardized, options.n_clusters)?;
    info!("Cluster stability (ARI): {:.3}", stability_score);

    let (rfm, personas) = assign_personas(rfm)?;
    let summary = cluster_summary(&rfm)?;

    let target_cluster = resolve_target(options.target_cluster, &summary);
    let simulation = simulate_strategy(
        &rfm,
        target_cluster,
        multiplier_from_percent(options.increase_pct),
    )?;

    Ok(SegmentationReport {
        snapshot: rfm.snapshot,
        n_clusters: options.n_clusters,
        stability_score,
        summary,
        personas,
        target_cluster,
        increase_pct: options.increase_pct,
        simulation,
        customers: rfm.customers,
    })
}

/// Requested target, or the lowest cluster label in the summary.
///
/// An empty summary falls back to label 0, which the simulator then reports
/// as an unknown cluster.
fn resolve_target(requested: Option<usize>, summary: &[ClusterSummary]) -> usize {
    requested.unwrap_or_else(|| summary.first().map_or(0, |s| s.cluster))
}
