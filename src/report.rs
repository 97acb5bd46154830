//! Terminal and JSON rendering of a segmentation report

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};

use crate::persona::ClusterSummary;
use crate::pipeline::SegmentationReport;
use crate::strategy::SimulationRow;

const CURRENCY_SYMBOL: &str = "₹";

fn header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(label).add_attribute(Attribute::Bold))
        .collect()
}

fn numeric(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

/// Historical RFM averages per cluster
pub fn summary_table(summary: &[ClusterSummary]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(header(&["Cluster", "Customers", "Recency", "Frequency", "Monetary"]));

    for row in summary {
        table.add_row(vec![
            Cell::new(row.cluster),
            numeric(row.customers.to_string()),
            numeric(format!("{:.2}", row.mean_recency)),
            numeric(format!("{:.2}", row.mean_frequency)),
            numeric(format!("{:.2}", row.mean_monetary)),
        ]);
    }
    table
}

/// Projected revenue before and after the simulated uplift
pub fn simulation_table(rows: &[SimulationRow], target_cluster: usize) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(header(&["Cluster", "Before", "After", "Change (%)"]));

    for row in rows {
        let change = numeric(format!("{:.2}%", row.change_pct));
        let change = if row.cluster == target_cluster && row.change_pct > 0.0 {
            change.fg(Color::Green)
        } else {
            change
        };
        table.add_row(vec![
            Cell::new(row.cluster),
            numeric(format_currency(row.before)),
            numeric(format_currency(row.after)),
            change,
        ]);
    }
    table
}

/// Whole-unit amount with thousands separators, e.g. `₹1,187`
pub fn format_currency(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{}{}{}", sign, CURRENCY_SYMBOL, grouped)
}

/// Print every section of the report to stdout
pub fn print_report(report: &SegmentationReport) {
    println!("=== Customer Segment Overview (Historical RFM Averages) ===");
    println!("Snapshot date: {}", report.snapshot);
    println!("{}", summary_table(&report.summary));

    println!("\n=== Cluster Personas ===");
    for (cluster, persona) in &report.personas {
        println!("Cluster {}: {}", cluster, persona);
    }

    println!(
        "\n=== Projected Revenue Impact (What-If Analysis) ===\nTarget cluster {} with {:.0}% more engagement",
        report.target_cluster, report.increase_pct
    );
    println!("{}", simulation_table(&report.simulation, report.target_cluster));

    println!(
        "\nCluster Stability (ARI Score): {:.3} (Higher values indicate more stable and reliable segmentation)",
        report.stability_score
    );
    println!(
        "\nThis tool is designed to support business decision-making. All simulated results are \
         indicative and should be reviewed with human judgment, domain knowledge, and ethical considerations."
    );
}

/// Write the report as pretty-printed JSON
pub fn write_json(report: &SegmentationReport, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(())
}
