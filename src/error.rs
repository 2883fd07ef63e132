//! Error types for the pharmacy agents.
//!
//! Calculators return `Result<T>` with a named variant for every failure a
//! caller can act on. Application edges wrap these in `anyhow`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Insufficient history for {sku}: need {required} daily observations, have {available}")]
    InsufficientHistory {
        sku: String,
        required: usize,
        available: usize,
    },

    #[error("SKU not found: {0}")]
    SkuNotFound(String),

    #[error("No supplier carries SKU {0}")]
    NoSuppliers(String),

    #[error("All {attempts} credential/model combinations failed")]
    ServiceExhausted {
        attempts: usize,
        failures: Vec<String>,
    },

    #[error("Missing data file '{path}'. Place the CSV exports under the data directory (see DATA_DIR)")]
    MissingDataFile { path: String },

    #[error("CSV parse error in '{path}' at line {line}: {message}")]
    Csv {
        path: String,
        line: usize,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
