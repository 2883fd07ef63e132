//! CSV loading for the snapshot tables.
//!
//! Sales history and current inventory are required; supplier profiles and
//! pricing signals are optional and degrade to empty tables.

use super::{InventoryRecord, PricingSignal, SalesRecord, Snapshot, SupplierProfile};
use crate::config::DataConfig;
use crate::error::{AgentError, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Load every table named by the data configuration into a snapshot
pub fn load_snapshot(config: &DataConfig) -> Result<Snapshot> {
    let as_of = config
        .as_of
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let sales = read_sales(open_required(&config.sales_path())?, &config.sales_path())?;
    let inventory = read_inventory(open_required(&config.inventory_path())?, &config.inventory_path())?;

    let suppliers = match open_optional(&config.suppliers_path())? {
        Some(file) => read_suppliers(file, &config.suppliers_path())?,
        None => Vec::new(),
    };
    let signals = match open_optional(&config.pricing_path())? {
        Some(file) => read_pricing_signals(file, &config.pricing_path())?,
        None => Vec::new(),
    };

    info!(
        "Loaded snapshot as of {}: {} sales rows, {} inventory rows, {} suppliers, {} pricing signals",
        as_of,
        sales.len(),
        inventory.len(),
        suppliers.len(),
        signals.len()
    );

    Ok(Snapshot::new(as_of, sales, inventory)
        .with_suppliers(suppliers)
        .with_pricing_signals(signals))
}

pub fn read_sales<R: Read>(reader: R, origin: &Path) -> Result<Vec<SalesRecord>> {
    read_table(reader, origin)
}

pub fn read_inventory<R: Read>(reader: R, origin: &Path) -> Result<Vec<InventoryRecord>> {
    read_table(reader, origin)
}

pub fn read_suppliers<R: Read>(reader: R, origin: &Path) -> Result<Vec<SupplierProfile>> {
    read_table(reader, origin)
}

pub fn read_pricing_signals<R: Read>(reader: R, origin: &Path) -> Result<Vec<PricingSignal>> {
    read_table(reader, origin)
}

fn read_table<T: DeserializeOwned, R: Read>(reader: R, origin: &Path) -> Result<Vec<T>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (line_num, result) in csv_reader.deserialize().enumerate() {
        let record: T = result.map_err(|e| AgentError::Csv {
            path: origin.display().to_string(),
            line: line_num + 2,
            message: e.to_string(),
        })?;
        records.push(record);
    }

    Ok(records)
}

fn open_required(path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AgentError::MissingDataFile {
            path: path.display().to_string(),
        },
        _ => AgentError::Io(e),
    })
}

fn open_optional(path: &Path) -> Result<Option<std::fs::File>> {
    match std::fs::File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Optional data file {} not found, continuing without it", path.display());
            Ok(None)
        }
        Err(e) => Err(AgentError::Io(e)),
    }
}

/// Flexible bool deserializer: handles "true"/"false", "1"/"0", "yes"/"no"
/// in any case, as written by spreadsheet and dataframe exports.
pub(crate) fn deserialize_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.to_lowercase().trim() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected bool value, got '{}'",
            other
        ))),
    }
}

/// Date deserializer accepting `YYYY-MM-DD` with or without a time suffix
pub(crate) fn deserialize_date<'de, D>(deserializer: D) -> std::result::Result<NaiveDate, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_date(&s).ok_or_else(|| serde::de::Error::custom(format!("expected YYYY-MM-DD date, got '{}'", s)))
}

/// Parse an ISO date, ignoring any trailing time component
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
