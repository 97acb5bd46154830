//! Cluster profiling and persona assignment

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use serde::Serialize;

use crate::data::RfmSet;

/// Behavioral label attached to a whole cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Persona {
    #[serde(rename = "VIP Customers")]
    Vip,
    #[serde(rename = "Loyal High-Value Customers")]
    LoyalHighValue,
    #[serde(rename = "Dormant Customers")]
    Dormant,
    #[serde(rename = "Low-Value Lost Customers")]
    LowValueLost,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Vip => "VIP Customers",
            Persona::LoyalHighValue => "Loyal High-Value Customers",
            Persona::Dormant => "Dormant Customers",
            Persona::LowValueLost => "Low-Value Lost Customers",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mean RFM profile of one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub customers: usize,
    pub mean_recency: f64,
    pub mean_frequency: f64,
    pub mean_monetary: f64,
}

/// Position of a cluster along each dimension, highest mean first (rank 1)
///
/// For recency rank 1 is the cluster that has gone longest without buying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClusterRanks {
    pub cluster: usize,
    pub recency: usize,
    pub frequency: usize,
    pub monetary: usize,
}

type PersonaRule = (fn(&ClusterRanks) -> bool, Persona);

fn top_monetary(ranks: &ClusterRanks) -> bool {
    ranks.monetary == 1
}

fn top_frequency(ranks: &ClusterRanks) -> bool {
    ranks.frequency == 1
}

fn top_recency(ranks: &ClusterRanks) -> bool {
    ranks.recency == 1
}

/// Evaluated in order; the first matching rule names the cluster
const PERSONA_RULES: [PersonaRule; 3] = [
    (top_monetary, Persona::Vip),
    (top_frequency, Persona::LoyalHighValue),
    (top_recency, Persona::Dormant),
];

const FALLBACK_PERSONA: Persona = Persona::LowValueLost;

/// Mean recency, frequency and monetary value per cluster, ordered by label
pub fn cluster_summary(rfm: &RfmSet) -> crate::Result<Vec<ClusterSummary>> {
    #[derive(Default)]
    struct Totals {
        count: usize,
        recency: f64,
        frequency: f64,
        monetary: f64,
    }

    let mut totals: BTreeMap<usize, Totals> = BTreeMap::new();
    for customer in &rfm.customers {
        let entry = totals.entry(customer.cluster_label()?).or_default();
        entry.count += 1;
        entry.recency += customer.recency as f64;
        entry.frequency += customer.frequency as f64;
        entry.monetary += customer.monetary;
    }

    Ok(totals
        .into_iter()
        .map(|(cluster, t)| {
            let n = t.count as f64;
            ClusterSummary {
                cluster,
                customers: t.count,
                mean_recency: t.recency / n,
                mean_frequency: t.frequency / n,
                mean_monetary: t.monetary / n,
            }
        })
        .collect())
}

/// Rank clusters along each dimension.
///
/// Ranking is ordinal: equal means are ordered by cluster label, so exactly
/// one cluster holds rank 1 per dimension and the lowest label wins a tie.
pub fn rank_clusters(summaries: &[ClusterSummary]) -> Vec<ClusterRanks> {
    let recency = descending_ranks(summaries, |s| s.mean_recency);
    let frequency = descending_ranks(summaries, |s| s.mean_frequency);
    let monetary = descending_ranks(summaries, |s| s.mean_monetary);

    summaries
        .iter()
        .enumerate()
        .map(|(i, s)| ClusterRanks {
            cluster: s.cluster,
            recency: recency[i],
            frequency: frequency[i],
            monetary: monetary[i],
        })
        .collect()
}

fn descending_ranks(summaries: &[ClusterSummary], value: impl Fn(&ClusterSummary) -> f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..summaries.len()).collect();
    order.sort_by(|&a, &b| {
        let (sa, sb) = (&summaries[a], &summaries[b]);
        match value(sb).total_cmp(&value(sa)) {
            Ordering::Equal => sa.cluster.cmp(&sb.cluster),
            other => other,
        }
    });

    let mut ranks = vec![0; summaries.len()];
    for (position, index) in order.into_iter().enumerate() {
        ranks[index] = position + 1;
    }
    ranks
}

/// Pick the persona for one cluster from its ranks
pub fn persona_for(ranks: &ClusterRanks) -> Persona {
    PERSONA_RULES
        .iter()
        .find(|(rule, _)| rule(ranks))
        .map(|&(_, persona)| persona)
        .unwrap_or(FALLBACK_PERSONA)
}

/// Label every cluster with a persona and copy it onto its customers
///
/// # Returns
/// * The records with `persona` set, and the cluster → persona mapping
pub fn assign_personas(mut rfm: RfmSet) -> crate::Result<(RfmSet, BTreeMap<usize, Persona>)> {
    let summaries = cluster_summary(&rfm)?;
    let personas: BTreeMap<usize, Persona> = rank_clusters(&summaries)
        .iter()
        .map(|ranks| (ranks.cluster, persona_for(ranks)))
        .collect();

    for customer in &mut rfm.customers {
        let cluster = customer.cluster_label()?;
        customer.persona = personas.get(&cluster).copied();
    }

    debug!("Personas: {:?}", personas);
    Ok((rfm, personas))
}
