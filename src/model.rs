//! K-Means segmentation and clustering stability

use std::collections::{HashMap, HashSet};

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use log::debug;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::{RfmSet, StandardScaler};
use crate::error::SegmentError;

pub const DEFAULT_CLUSTERS: usize = 4;
/// Seed for the labels handed to the rest of the pipeline
pub const PRIMARY_SEED: u64 = 42;
/// Seed for the second run of the stability check
pub const STABILITY_SEED: u64 = 99;

/// K-Means configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringParams {
    pub n_clusters: usize,
    /// Seed for centroid initialization
    pub seed: u64,
    /// Independent restarts; the one with the lowest inertia wins
    pub n_runs: usize,
    pub max_iters: u64,
    pub tolerance: f64,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            n_clusters: DEFAULT_CLUSTERS,
            seed: PRIMARY_SEED,
            n_runs: 10,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }
}

impl ClusteringParams {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Result of one K-Means fit
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignment per row of the fitted matrix
    pub labels: Vec<usize>,
    /// Cluster centroids in standardized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl KMeansModel {
    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in &self.labels {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }
}

/// Standardize RFM features and attach a cluster label to every customer
///
/// # Arguments
/// * `rfm` - Customer RFM records
/// * `n_clusters` - Number of clusters, between 2 and the number of customers
///
/// # Returns
/// * The records with `cluster` set, and the standardized feature matrix
pub fn perform_clustering(rfm: RfmSet, n_clusters: usize) -> crate::Result<(RfmSet, Array2<f64>)> {
    perform_clustering_with(rfm, &ClusteringParams::new(n_clusters))
}

pub fn perform_clustering_with(
    mut rfm: RfmSet,
    params: &ClusteringParams,
) -> crate::Result<(RfmSet, Array2<f64>)> {
    validate_cluster_count(params.n_clusters, rfm.len())?;

    let raw = rfm.raw_features();
    let standardized = StandardScaler::fit(&raw).transform(&raw);

    let model = fit_kmeans(&standardized, params)?;
    debug!(
        "K-Means with k={} seed={} inertia={:.4} sizes={:?}",
        params.n_clusters,
        params.seed,
        model.inertia,
        model.cluster_sizes()
    );

    for (customer, &label) in rfm.customers.iter_mut().zip(&model.labels) {
        customer.cluster = Some(label);
        customer.persona = None;
    }

    Ok((rfm, standardized))
}

/// Fit K-Means on an already standardized matrix.
///
/// Centroids are seeded with k-means++ from a `StdRng` built from
/// `params.seed`, so identical input and parameters give identical labels.
pub fn fit_kmeans(features: &Array2<f64>, params: &ClusteringParams) -> crate::Result<KMeansModel> {
    validate_cluster_count(params.n_clusters, features.nrows())?;

    let distinct = distinct_rows(features);
    if distinct < params.n_clusters {
        return Err(SegmentError::TooFewDistinctPoints {
            requested: params.n_clusters,
            distinct,
        });
    }

    // Create dataset for linfa
    let n_samples = features.nrows();
    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(features.clone(), targets);

    let rng = StdRng::seed_from_u64(params.seed);
    let model = KMeans::params_with(params.n_clusters, rng, L2Dist)
        .n_runs(params.n_runs)
        .max_n_iterations(params.max_iters)
        .tolerance(params.tolerance)
        .fit(&dataset)?;

    let labels: Array1<usize> = model.predict(&dataset);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(features, &labels, &centroids);

    Ok(KMeansModel {
        n_clusters: params.n_clusters,
        labels: labels.to_vec(),
        centroids,
        inertia,
    })
}

/// Agreement between two K-Means runs with different seeds (42 and 99)
///
/// 1.0 means both runs found the same partition up to relabeling; values
/// near 0.0 mean the partition depends on initialization.
pub fn cluster_stability_score(features: &Array2<f64>, n_clusters: usize) -> crate::Result<f64> {
    cluster_stability_score_with(features, n_clusters, PRIMARY_SEED, STABILITY_SEED)
}

pub fn cluster_stability_score_with(
    features: &Array2<f64>,
    n_clusters: usize,
    seed_a: u64,
    seed_b: u64,
) -> crate::Result<f64> {
    let params = ClusteringParams::new(n_clusters);
    let first = fit_kmeans(features, &params.clone().with_seed(seed_a))?;
    let second = fit_kmeans(features, &params.with_seed(seed_b))?;

    let score = adjusted_rand_score(&first.labels, &second.labels);
    debug!("Stability (ARI) between seeds {} and {}: {:.4}", seed_a, seed_b, score);
    Ok(score)
}

/// Adjusted Rand index between two labelings of the same items
///
/// Symmetric in its arguments and invariant to label permutation. Pairs are
/// counted over the common prefix if the slices differ in length.
pub fn adjusted_rand_score(labels_a: &[usize], labels_b: &[usize]) -> f64 {
    let n = labels_a.len().min(labels_b.len());
    if n < 2 {
        return 1.0;
    }

    let mut contingency: HashMap<(usize, usize), u64> = HashMap::new();
    let mut sizes_a: HashMap<usize, u64> = HashMap::new();
    let mut sizes_b: HashMap<usize, u64> = HashMap::new();
    for (&a, &b) in labels_a.iter().zip(labels_b) {
        *contingency.entry((a, b)).or_insert(0) += 1;
        *sizes_a.entry(a).or_insert(0) += 1;
        *sizes_b.entry(b).or_insert(0) += 1;
    }

    let index: f64 = contingency.values().map(|&c| pairs(c)).sum();
    let sum_a: f64 = sizes_a.values().map(|&c| pairs(c)).sum();
    let sum_b: f64 = sizes_b.values().map(|&c| pairs(c)).sum();

    let expected = sum_a * sum_b / pairs(n as u64);
    let max_index = (sum_a + sum_b) / 2.0;

    // Both labelings trivial (all singletons or one cluster each)
    if max_index == expected {
        return 1.0;
    }

    (index - expected) / (max_index - expected)
}

fn pairs(count: u64) -> f64 {
    let count = count as f64;
    count * (count - 1.0) / 2.0
}

fn validate_cluster_count(n_clusters: usize, customers: usize) -> crate::Result<()> {
    if n_clusters < 2 || n_clusters > customers {
        return Err(SegmentError::InvalidClusterCount {
            requested: n_clusters,
            customers,
        });
    }
    Ok(())
}

fn distinct_rows(features: &Array2<f64>) -> usize {
    features
        .outer_iter()
        .map(|row| row.iter().map(|v| v.to_bits()).collect::<Vec<u64>>())
        .collect::<HashSet<_>>()
        .len()
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    let mut inertia = 0.0;

    for (i, &cluster) in labels.iter().enumerate() {
        if cluster < centroids.nrows() {
            let point = features.row(i);
            let centroid = centroids.row(cluster);
            let distance_sq = point
                .iter()
                .zip(centroid.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();
            inertia += distance_sq;
        }
    }

    inertia
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CustomerRfm;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    /// Three well separated groups in standardized space
    fn create_test_features() -> Array2<f64> {
        Array2::from_shape_vec(
            (9, 3),
            vec![
                -2.0, -2.0, -2.0, //
                -2.1, -1.9, -2.0, //
                -1.9, -2.0, -2.1, //
                0.0, 0.0, 0.0, //
                0.1, 0.0, -0.1, //
                0.0, 0.1, 0.1, //
                2.0, 2.0, 2.0, //
                2.1, 1.9, 2.0, //
                1.9, 2.1, 2.0, //
            ],
        )
        .unwrap()
    }

    fn create_test_rfm() -> RfmSet {
        RfmSet {
            customers: vec![
                CustomerRfm::new("A", 10, 5, 500.0),
                CustomerRfm::new("B", 200, 1, 50.0),
            ],
            snapshot: NaiveDate::from_ymd_opt(2011, 12, 10)
                .unwrap()
                .and_hms_opt(12, 50, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_fit_kmeans() {
        let features = create_test_features();
        let model = fit_kmeans(&features, &ClusteringParams::new(3)).unwrap();

        assert_eq!(model.n_clusters, 3);
        assert_eq!(model.labels.len(), 9);
        assert_eq!(model.centroids.shape(), &[3, 3]);
        assert!(model.inertia >= 0.0 && model.inertia.is_finite());

        // Each group lands in its own cluster
        assert!(model.labels[0..3].iter().all(|&l| l == model.labels[0]));
        assert!(model.labels[3..6].iter().all(|&l| l == model.labels[3]));
        assert!(model.labels[6..9].iter().all(|&l| l == model.labels[6]));
    }

    #[test]
    fn test_labels_are_contiguous_and_non_empty() {
        let features = create_test_features();
        let model = fit_kmeans(&features, &ClusteringParams::new(3)).unwrap();

        let labels: BTreeSet<usize> = model.labels.iter().copied().collect();
        assert_eq!(labels, (0..3).collect());
        assert!(model.cluster_sizes().iter().all(|&size| size > 0));
        assert_eq!(model.cluster_sizes().iter().sum::<usize>(), 9);
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let features = create_test_features();
        let params = ClusteringParams::new(3);
        let first = fit_kmeans(&features, &params).unwrap();
        let second = fit_kmeans(&features, &params).unwrap();
        assert_eq!(first.labels, second.labels);
    }

    #[test]
    fn test_invalid_cluster_count() {
        let features = create_test_features();

        // Too few clusters
        let result = fit_kmeans(&features, &ClusteringParams::new(1));
        assert!(matches!(result, Err(SegmentError::InvalidClusterCount { .. })));

        // More clusters than customers
        let result = fit_kmeans(&features, &ClusteringParams::new(10));
        assert!(matches!(
            result,
            Err(SegmentError::InvalidClusterCount {
                requested: 10,
                customers: 9
            })
        ));
    }

    #[test]
    fn test_too_few_distinct_points() {
        let features = Array2::from_shape_vec((3, 3), vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0]).unwrap();
        let result = fit_kmeans(&features, &ClusteringParams::new(3));
        assert!(matches!(
            result,
            Err(SegmentError::TooFewDistinctPoints {
                requested: 3,
                distinct: 2
            })
        ));
    }

    #[test]
    fn test_perform_clustering_two_customers() {
        let (rfm, standardized) = perform_clustering(create_test_rfm(), 2).unwrap();

        assert_eq!(standardized.shape(), &[2, 3]);
        let a = rfm.customers[0].cluster.unwrap();
        let b = rfm.customers[1].cluster.unwrap();
        assert_ne!(a, b);
        assert_eq!(rfm.cluster_labels().unwrap(), BTreeSet::from([0, 1]));
    }

    #[test]
    fn test_perform_clustering_rejects_too_many_clusters() {
        let result = perform_clustering(create_test_rfm(), DEFAULT_CLUSTERS);
        assert!(matches!(result, Err(SegmentError::InvalidClusterCount { .. })));
    }

    #[test]
    fn test_stability_same_seed_is_one() {
        let features = create_test_features();
        let score = cluster_stability_score_with(&features, 3, 7, 7).unwrap();
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_stability_is_symmetric() {
        let features = create_test_features();
        let forward = cluster_stability_score_with(&features, 3, 42, 99).unwrap();
        let backward = cluster_stability_score_with(&features, 3, 99, 42).unwrap();
        assert_eq!(forward, backward);
        assert!((-1.0..=1.0).contains(&forward));
    }

    #[test]
    fn test_stability_on_clear_structure() {
        let features = create_test_features();
        let score = cluster_stability_score(&features, 3).unwrap();
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_adjusted_rand_score() {
        assert_eq!(adjusted_rand_score(&[0, 0, 1, 1], &[0, 0, 1, 1]), 1.0);
        // Relabeling does not matter
        assert_eq!(adjusted_rand_score(&[0, 0, 1, 1], &[1, 1, 0, 0]), 1.0);
        assert!((adjusted_rand_score(&[0, 0, 1, 1], &[0, 0, 1, 2]) - 4.0 / 7.0).abs() < 1e-12);
        // Worse than chance
        assert!((adjusted_rand_score(&[0, 0, 1, 1], &[0, 1, 0, 1]) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_adjusted_rand_score_trivial_partitions() {
        assert_eq!(adjusted_rand_score(&[0, 0, 0], &[1, 1, 1]), 1.0);
        assert_eq!(adjusted_rand_score(&[0, 1, 2], &[2, 0, 1]), 1.0);
        assert_eq!(adjusted_rand_score(&[0, 0, 0, 0], &[0, 1, 2, 3]), 0.0);
    }
}
