//! What-if revenue simulation for an engagement increase on one segment

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::data::RfmSet;
use crate::error::SegmentError;

/// Projected revenue for one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRow {
    pub cluster: usize,
    pub before: f64,
    pub after: f64,
    pub change_pct: f64,
}

/// Convert an engagement increase in percent into a multiplier
pub fn multiplier_from_percent(percent: f64) -> f64 {
    1.0 + percent / 100.0
}

/// Diminishing-returns efficiency: 1.0 at m = 1, tending to 0.6 as m grows
pub fn efficiency(multiplier: f64) -> f64 {
    0.6 + 0.4 / multiplier
}

/// Factor applied to each target customer's monetary value
pub fn uplift_factor(multiplier: f64) -> f64 {
    1.0 + (multiplier - 1.0) * efficiency(multiplier)
}

/// Project per-cluster revenue before and after boosting `target_cluster`
///
/// # Arguments
/// * `rfm` - Clustered customer records
/// * `target_cluster` - Cluster whose customers receive the uplift
/// * `multiplier` - Engagement multiplier, `1 + increase / 100`
///
/// # Returns
/// * One row per cluster, ordered by label, with values rounded to 2 decimals
pub fn simulate_strategy(
    rfm: &RfmSet,
    target_cluster: usize,
    multiplier: f64,
) -> crate::Result<Vec<SimulationRow>> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(SegmentError::InvalidMultiplier(multiplier));
    }

    let factor = uplift_factor(multiplier);
    let mut totals: BTreeMap<usize, (f64, f64)> = BTreeMap::new();
    for customer in &rfm.customers {
        let cluster = customer.cluster_label()?;
        let after = if cluster == target_cluster {
            customer.monetary * factor
        } else {
            customer.monetary
        };
        let entry = totals.entry(cluster).or_insert((0.0, 0.0));
        entry.0 += customer.monetary;
        entry.1 += after;
    }

    if !totals.contains_key(&target_cluster) {
        return Err(SegmentError::UnknownCluster(target_cluster));
    }

    debug!(
        "Simulating cluster {} with multiplier {:.2} (uplift factor {:.4})",
        target_cluster, multiplier, factor
    );

    Ok(totals
        .into_iter()
        .map(|(cluster, (before, after))| {
            let change_pct = if before != 0.0 {
                (after - before) / before * 100.0
            } else {
                f64::NAN
            };
            SimulationRow {
                cluster,
                before: round2(before),
                after: round2(after),
                change_pct: round2(change_pct),
            }
        })
        .collect())
}

/// Round to 2 decimals, halves to even
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CustomerRfm;
    use chrono::NaiveDate;

    fn clustered_set() -> RfmSet {
        let members = [("a", 600.0, 0), ("b", 400.0, 0), ("c", 250.0, 1), ("d", 125.5, 2)];
        RfmSet {
            customers: members
                .iter()
                .map(|&(id, monetary, cluster)| {
                    let mut c = CustomerRfm::new(id, 10, 2, monetary);
                    c.cluster = Some(cluster);
                    c
                })
                .collect(),
            snapshot: NaiveDate::from_ymd_opt(2011, 12, 10)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_efficiency_curve() {
        assert_eq!(efficiency(1.0), 1.0);
        assert!((efficiency(1.2) - 0.933_333_333).abs() < 1e-9);
        assert!(efficiency(100.0) < 0.61);
        assert_eq!(uplift_factor(1.0), 1.0);
    }

    #[test]
    fn test_multiplier_from_percent() {
        assert_eq!(multiplier_from_percent(0.0), 1.0);
        assert!((multiplier_from_percent(20.0) - 1.2).abs() < 1e-12);
        assert!((multiplier_from_percent(50.0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_simulate_worked_example() {
        let rows = simulate_strategy(&clustered_set(), 0, 1.2).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].cluster, 0);
        assert_eq!(rows[0].before, 1000.0);
        assert_eq!(rows[0].after, 1186.67);
        assert_eq!(rows[0].change_pct, 18.67);
    }

    #[test]
    fn test_other_clusters_untouched() {
        let rows = simulate_strategy(&clustered_set(), 1, 1.5).unwrap();

        assert!(rows[1].after > rows[1].before);
        for row in rows.iter().filter(|r| r.cluster != 1) {
            assert_eq!(row.before, row.after);
            assert_eq!(row.change_pct, 0.0);
        }
        assert_eq!(rows[2].before, 125.5);
    }

    #[test]
    fn test_unit_multiplier_changes_nothing() {
        let rows = simulate_strategy(&clustered_set(), 2, 1.0).unwrap();
        for row in rows {
            assert_eq!(row.before, row.after);
            assert_eq!(row.change_pct, 0.0);
        }
    }

    #[test]
    fn test_invalid_multiplier() {
        let rfm = clustered_set();
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                simulate_strategy(&rfm, 0, bad),
                Err(SegmentError::InvalidMultiplier(_))
            ));
        }
    }

    #[test]
    fn test_unknown_target_cluster() {
        let result = simulate_strategy(&clustered_set(), 7, 1.2);
        assert!(matches!(result, Err(SegmentError::UnknownCluster(7))));
    }

    #[test]
    fn test_round2_ties_to_even() {
        assert_eq!(round2(18.666_666), 18.67);
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(-3.004), -3.0);
    }
}
