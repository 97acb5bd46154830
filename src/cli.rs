//! Command-line interface definitions and argument parsing

use clap::Parser;

use crate::model::DEFAULT_CLUSTERS;
use crate::pipeline::PipelineOptions;

/// Customer segmentation and strategy simulation on RFM features
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the transactions CSV file
    #[arg(short, long, default_value = "data/online_retail.csv")]
    pub input: String,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value_t = DEFAULT_CLUSTERS)]
    pub clusters: usize,

    /// Segment to simulate the engagement increase on (defaults to the lowest cluster label)
    #[arg(short, long)]
    pub target_cluster: Option<usize>,

    /// Assumed increase in engagement for the selected segment, in percent
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u8).range(0..=50))]
    pub increase: u8,

    /// Also write the full report as JSON to this path
    #[arg(long)]
    pub json: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            n_clusters: self.clusters,
            target_cluster: self.target_cluster,
            increase_pct: f64::from(self.increase),
        }
    }

    /// Default log filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["rfm-segment"]).unwrap();
        assert_eq!(args.input, "data/online_retail.csv");
        assert_eq!(args.clusters, 4);
        assert_eq!(args.target_cluster, None);
        assert_eq!(args.increase, 20);
        assert_eq!(args.pipeline_options(), PipelineOptions::default());
        assert_eq!(args.log_filter(), "warn");
    }

    #[test]
    fn test_pipeline_options() {
        let args = Args::try_parse_from([
            "rfm-segment",
            "--input",
            "sales.csv",
            "-k",
            "3",
            "--target-cluster",
            "2",
            "--increase",
            "35",
            "--verbose",
        ])
        .unwrap();

        let options = args.pipeline_options();
        assert_eq!(options.n_clusters, 3);
        assert_eq!(options.target_cluster, Some(2));
        assert_eq!(options.increase_pct, 35.0);
        assert_eq!(args.log_filter(), "debug");
    }

    #[test]
    fn test_increase_is_bounded() {
        assert!(Args::try_parse_from(["rfm-segment", "--increase", "50"]).is_ok());
        assert!(Args::try_parse_from(["rfm-segment", "--increase", "51"]).is_err());
        assert!(Args::try_parse_from(["rfm-segment", "--increase", "-5"]).is_err());
    }
}
