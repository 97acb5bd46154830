//! Transaction loading and RFM feature computation using Polars

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::Serialize;

use crate::error::SegmentError;
use crate::persona::Persona;

pub const CUSTOMER_ID: &str = "CustomerID";
pub const INVOICE_NO: &str = "InvoiceNo";
pub const INVOICE_DATE: &str = "InvoiceDate";
pub const QUANTITY: &str = "Quantity";
pub const UNIT_PRICE: &str = "UnitPrice";

/// Columns every transaction source must provide
pub const REQUIRED_COLUMNS: [&str; 5] = [CUSTOMER_ID, INVOICE_NO, INVOICE_DATE, QUANTITY, UNIT_PRICE];

/// Epoch milliseconds of the parsed `InvoiceDate`, added after loading
pub const INVOICE_TS: &str = "InvoiceTs";

const TOTAL_AMOUNT: &str = "TotalAmount";
const LAST_PURCHASE: &str = "LastPurchase";
const FREQUENCY: &str = "Frequency";
const MONETARY: &str = "Monetary";

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Timestamp layouts accepted after RFC 3339 has been tried.
/// `%m/%d/%Y %H:%M` is the layout of the public Online Retail data set.
const DATE_TIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// One customer's Recency, Frequency and Monetary values, plus the labels
/// attached by the later pipeline stages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerRfm {
    pub customer_id: String,
    /// Whole days between the snapshot and the customer's last purchase
    pub recency: i64,
    /// Number of retained transaction rows
    pub frequency: u64,
    /// Sum of quantity × unit price over retained rows
    pub monetary: f64,
    pub cluster: Option<usize>,
    pub persona: Option<Persona>,
}

impl CustomerRfm {
    pub fn new(customer_id: impl Into<String>, recency: i64, frequency: u64, monetary: f64) -> Self {
        Self {
            customer_id: customer_id.into(),
            recency,
            frequency,
            monetary,
            cluster: None,
            persona: None,
        }
    }

    /// Cluster label, or an error if clustering has not run yet
    pub fn cluster_label(&self) -> crate::Result<usize> {
        self.cluster
            .ok_or_else(|| SegmentError::Unclustered(self.customer_id.clone()))
    }
}

/// The per-customer RFM table for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct RfmSet {
    /// Customers ordered by customer id
    pub customers: Vec<CustomerRfm>,
    /// Reference instant for recency: one day after the latest retained transaction
    pub snapshot: NaiveDateTime,
}

impl RfmSet {
    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }

    /// Raw feature matrix with columns Recency, Frequency, Monetary
    pub fn raw_features(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.customers.len(), 3), |(i, j)| {
            let customer = &self.customers[i];
            match j {
                0 => customer.recency as f64,
                1 => customer.frequency as f64,
                _ => customer.monetary,
            }
        })
    }

    /// Cluster label of every customer, in row order
    pub fn labels(&self) -> crate::Result<Vec<usize>> {
        self.customers.iter().map(CustomerRfm::cluster_label).collect()
    }

    /// Distinct cluster labels present in the set
    pub fn cluster_labels(&self) -> crate::Result<BTreeSet<usize>> {
        Ok(self.labels()?.into_iter().collect())
    }
}

/// Column-wise standardization to zero mean and unit variance
#[derive(Debug, Clone)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Population standard deviation; 1.0 for constant columns
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(features: &Array2<f64>) -> Self {
        let mean = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(features.ncols()));
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.is_finite() && s > 0.0 { s } else { 1.0 });
        Self { mean, scale }
    }

    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        (features - &self.mean) / &self.scale
    }
}

/// Load a transaction CSV and compute RFM features
///
/// # Arguments
/// * `file_path` - Path to a CSV with `CustomerID`, `InvoiceNo`, `InvoiceDate`,
///   `Quantity` and `UnitPrice` columns
///
/// # Returns
/// * `RfmSet` with one record per customer
pub fn load_and_prepare_data(file_path: impl AsRef<Path>) -> crate::Result<RfmSet> {
    let transactions = read_transactions(file_path.as_ref())?;
    build_rfm(transactions)
}

/// Dtypes pinned for the required columns, whatever the first rows look like.
/// Cancellation invoices (`C536379`) can appear deep into an otherwise numeric
/// `InvoiceNo` column.
fn transaction_dtypes() -> Schema {
    Schema::from_iter([
        Field::new(CUSTOMER_ID.into(), DataType::String),
        Field::new(INVOICE_NO.into(), DataType::String),
        Field::new(INVOICE_DATE.into(), DataType::String),
        Field::new(QUANTITY.into(), DataType::Int64),
        Field::new(UNIT_PRICE.into(), DataType::Float64),
    ])
}

/// Rows without a customer, or with non-positive quantity or price, never
/// reach aggregation
fn retained_rows() -> Expr {
    col(CUSTOMER_ID)
        .is_not_null()
        .and(col(QUANTITY).gt(lit(0)))
        .and(col(UNIT_PRICE).gt(lit(0.0)))
}

/// Read the retained transactions from a CSV file.
///
/// The returned frame holds the five required columns plus `InvoiceTs`.
/// Filtering happens in the lazy plan, so only surviving rows have their
/// timestamps parsed.
pub fn read_transactions(file_path: &Path) -> crate::Result<DataFrame> {
    let header = LazyCsvReader::new(file_path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()?
        .collect_schema()?;
    if let Some(missing) = REQUIRED_COLUMNS.iter().find(|name| !header.contains(name)) {
        return Err(SegmentError::MissingColumn(missing.to_string()));
    }

    // Unused columns stay strings and are never parsed
    let mut df = LazyCsvReader::new(file_path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_dtype_overwrite(Some(Arc::new(transaction_dtypes())))
        .finish()?
        .filter(retained_rows())
        .select(REQUIRED_COLUMNS.map(col))
        .collect()?;

    debug!("{} transaction rows retained from {}", df.height(), file_path.display());

    for name in [INVOICE_NO, INVOICE_DATE] {
        if df.column(name)?.null_count() > 0 {
            return Err(SegmentError::NullValue(name.to_string()));
        }
    }

    let timestamps = df
        .column(INVOICE_DATE)?
        .str()?
        .into_no_null_iter()
        .map(|raw| parse_invoice_date(raw).map(|dt| dt.and_utc().timestamp_millis()))
        .collect::<crate::Result<Vec<i64>>>()?;
    df.with_column(Series::new(INVOICE_TS.into(), timestamps))?;

    Ok(df)
}

/// Parse an invoice timestamp in any of the supported layouts
pub fn parse_invoice_date(raw: &str) -> crate::Result<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc());
    }
    if let Some(dt) = DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| SegmentError::InvalidTimestamp(raw.to_string()))
}

/// Aggregate transactions into one RFM record per customer.
///
/// Expects `CustomerID`, `InvoiceTs`, `Quantity` and `UnitPrice` columns and
/// applies the retention filter itself. Recency is measured against a single
/// snapshot taken one day after the latest retained transaction, so the
/// maximum is computed before the per-customer group-by.
pub fn build_rfm(transactions: DataFrame) -> crate::Result<RfmSet> {
    let retained = transactions.lazy().filter(retained_rows()).collect()?;

    let latest = retained
        .column(INVOICE_TS)?
        .i64()?
        .max()
        .ok_or(SegmentError::NoValidRows)?;
    let snapshot_ms = latest + MILLIS_PER_DAY;
    let snapshot = DateTime::from_timestamp_millis(snapshot_ms)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| SegmentError::InvalidTimestamp(snapshot_ms.to_string()))?;

    let rfm_df = retained
        .lazy()
        .with_column((col(QUANTITY).cast(DataType::Float64) * col(UNIT_PRICE)).alias(TOTAL_AMOUNT))
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(INVOICE_TS).max().alias(LAST_PURCHASE),
            // Every retained line counts, not distinct invoices
            len().cast(DataType::UInt64).alias(FREQUENCY),
            col(TOTAL_AMOUNT).sum().alias(MONETARY),
        ])
        .sort([CUSTOMER_ID], SortMultipleOptions::default())
        .collect()?;

    let ids = rfm_df.column(CUSTOMER_ID)?.str()?;
    let last_purchase = rfm_df.column(LAST_PURCHASE)?.i64()?;
    let frequency = rfm_df.column(FREQUENCY)?.u64()?;
    let monetary = rfm_df.column(MONETARY)?.f64()?;

    // Whole days, truncated: the snapshot is never earlier than a purchase
    let customers: Vec<CustomerRfm> = ids
        .into_no_null_iter()
        .zip(last_purchase.into_no_null_iter())
        .zip(frequency.into_no_null_iter())
        .zip(monetary.into_no_null_iter())
        .map(|(((id, last), rows), spend)| {
            CustomerRfm::new(id, (snapshot_ms - last) / MILLIS_PER_DAY, rows, spend)
        })
        .collect();

    debug!("Snapshot {} with {} customers", snapshot, customers.len());

    Ok(RfmSet { customers, snapshot })
}
