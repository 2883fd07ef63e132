//! Configuration module for the pharmacy agents
//!
//! Loaded from environment variables (optionally seeded from a `.env` file),
//! or built programmatically for tests.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Highest numbered alternate credential that is probed (`<PREFIX>_2` .. `<PREFIX>_9`).
const MAX_ALTERNATE_KEYS: usize = 9;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Text-completion service configuration
    pub llm: LlmConfig,

    /// Input data locations
    pub data: DataConfig,

    /// Inventory and pricing policy knobs
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Working capital parameters
    #[serde(default)]
    pub capital: CapitalConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which text-completion API the credentials belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Gemini,
    OpenAi,
}

impl LlmProvider {
    fn key_prefix(self) -> &'static str {
        match self {
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
        }
    }

    fn default_models(self) -> Vec<String> {
        let models: &[&str] = match self {
            LlmProvider::Gemini => &["gemini-2.0-flash", "gemini-1.5-flash", "gemini-2.5-flash"],
            LlmProvider::OpenAi => &["gpt-4o-mini", "gpt-4o"],
        };
        models.iter().map(|m| m.to_string()).collect()
    }
}

/// Text-completion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,

    /// Credentials in rotation order: primary first, then numbered alternates
    pub api_keys: Vec<String>,

    /// Candidate models, tried in order for each credential
    pub models: Vec<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Input data locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub data_dir: PathBuf,

    #[serde(default = "default_sales_file")]
    pub sales_file: String,

    #[serde(default = "default_inventory_file")]
    pub inventory_file: String,

    #[serde(default = "default_suppliers_file")]
    pub suppliers_file: String,

    #[serde(default = "default_pricing_file")]
    pub pricing_file: String,

    /// Evaluation date; `None` means today
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

/// Inventory and pricing policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_lead_time")]
    pub lead_time_days: f64,

    /// Service-level z-score (1.65 for 95%)
    #[serde(default = "default_z")]
    pub service_z: f64,

    #[serde(default = "default_dead_stock_days")]
    pub dead_stock_days: i64,

    #[serde(default = "default_dead_stock_min_value")]
    pub dead_stock_min_value: f64,

    #[serde(default = "default_expiry_threshold")]
    pub expiry_threshold_days: i64,

    /// Days to expiry at or under which stock gets clearance pricing
    #[serde(default = "default_clearance_threshold")]
    pub clearance_threshold_days: i64,

    /// Days of supply above which a store is a transfer source
    #[serde(default = "default_overstock_days")]
    pub overstock_days: f64,

    #[serde(default = "default_min_margin")]
    pub min_margin_pct: f64,

    /// Unit cost as a fraction of shelf price
    #[serde(default = "default_cost_ratio")]
    pub cost_ratio: f64,
}

/// Working capital parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalConfig {
    pub total_working_capital: f64,
    pub allocated_to_inventory: f64,
    pub available_budget: f64,
    pub target_dio: f64,
    pub cost_of_capital_annual: f64,
    pub payment_terms_days: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output JSON format
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 2048 }
fn default_timeout() -> u64 { 60 }
fn default_sales_file() -> String { "sales_history.csv".to_string() }
fn default_inventory_file() -> String { "current_inventory.csv".to_string() }
fn default_suppliers_file() -> String { "suppliers.csv".to_string() }
fn default_pricing_file() -> String { "pricing_signals.csv".to_string() }
fn default_lead_time() -> f64 { 7.0 }
fn default_z() -> f64 { 1.65 }
fn default_dead_stock_days() -> i64 { 90 }
fn default_dead_stock_min_value() -> f64 { 100.0 }
fn default_expiry_threshold() -> i64 { 90 }
fn default_clearance_threshold() -> i64 { 30 }
fn default_overstock_days() -> f64 { 60.0 }
fn default_min_margin() -> f64 { 15.0 }
fn default_cost_ratio() -> f64 { 0.70 }
fn default_log_level() -> String { "info".to_string() }

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            lead_time_days: default_lead_time(),
            service_z: default_z(),
            dead_stock_days: default_dead_stock_days(),
            dead_stock_min_value: default_dead_stock_min_value(),
            expiry_threshold_days: default_expiry_threshold(),
            clearance_threshold_days: default_clearance_threshold(),
            overstock_days: default_overstock_days(),
            min_margin_pct: default_min_margin(),
            cost_ratio: default_cost_ratio(),
        }
    }
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            total_working_capital: 5_000_000.0,
            allocated_to_inventory: 3_500_000.0,
            available_budget: 1_500_000.0,
            target_dio: 45.0,
            cost_of_capital_annual: 0.12,
            payment_terms_days: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            sales_file: default_sales_file(),
            inventory_file: default_inventory_file(),
            suppliers_file: default_suppliers_file(),
            pricing_file: default_pricing_file(),
            as_of: None,
        }
    }
}

impl DataConfig {
    pub fn sales_path(&self) -> PathBuf {
        self.data_dir.join(&self.sales_file)
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.data_dir.join(&self.inventory_file)
    }

    pub fn suppliers_path(&self) -> PathBuf {
        self.data_dir.join(&self.suppliers_file)
    }

    pub fn pricing_path(&self) -> PathBuf {
        self.data_dir.join(&self.pricing_file)
    }
}

impl LlmConfig {
    /// Build an LLM config with provider defaults for the given credentials
    pub fn with_keys(provider: LlmProvider, api_keys: Vec<String>) -> Self {
        Self {
            provider,
            api_keys,
            models: provider.default_models(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
        }
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AgentConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let provider = match std::env::var("LLM_PROVIDER").ok().as_deref() {
            None | Some("gemini") => LlmProvider::Gemini,
            Some("openai") => LlmProvider::OpenAi,
            Some(other) => anyhow::bail!("Unsupported LLM_PROVIDER '{}' (expected gemini or openai)", other),
        };

        let api_keys = collect_api_keys(provider.key_prefix(), |name| std::env::var(name).ok());
        if api_keys.is_empty() {
            anyhow::bail!(
                "No API credentials found: set {} (and optionally {}_2 .. {}_{})",
                provider.key_prefix(),
                provider.key_prefix(),
                provider.key_prefix(),
                MAX_ALTERNATE_KEYS
            );
        }

        let models = std::env::var("LLM_MODELS")
            .ok()
            .map(|v| parse_list(&v))
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| provider.default_models());

        let as_of = match std::env::var("PHARMACY_AS_OF") {
            Ok(raw) => Some(
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                    .map_err(|e| anyhow::anyhow!("PHARMACY_AS_OF must be YYYY-MM-DD: {}", e))?,
            ),
            Err(_) => None,
        };

        let defaults = PolicyConfig::default();
        let capital = CapitalConfig::default();

        Ok(Self {
            llm: LlmConfig {
                provider,
                api_keys,
                models,
                temperature: env_parse("LLM_TEMPERATURE").unwrap_or_else(default_temperature),
                max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or_else(default_max_tokens),
                timeout_secs: env_parse("LLM_TIMEOUT_SECS").unwrap_or_else(default_timeout),
            },
            data: DataConfig {
                data_dir: std::env::var("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("data")),
                sales_file: std::env::var("SALES_FILE").unwrap_or_else(|_| default_sales_file()),
                inventory_file: std::env::var("INVENTORY_FILE")
                    .unwrap_or_else(|_| default_inventory_file()),
                suppliers_file: std::env::var("SUPPLIERS_FILE")
                    .unwrap_or_else(|_| default_suppliers_file()),
                pricing_file: std::env::var("PRICING_FILE").unwrap_or_else(|_| default_pricing_file()),
                as_of,
            },
            policy: PolicyConfig {
                lead_time_days: env_parse("LEAD_TIME_DAYS").unwrap_or(defaults.lead_time_days),
                service_z: env_parse("SERVICE_LEVEL_Z").unwrap_or(defaults.service_z),
                dead_stock_days: env_parse("DEAD_STOCK_DAYS").unwrap_or(defaults.dead_stock_days),
                dead_stock_min_value: env_parse("DEAD_STOCK_MIN_VALUE")
                    .unwrap_or(defaults.dead_stock_min_value),
                expiry_threshold_days: env_parse("EXPIRY_THRESHOLD_DAYS")
                    .unwrap_or(defaults.expiry_threshold_days),
                clearance_threshold_days: env_parse("CLEARANCE_THRESHOLD_DAYS")
                    .unwrap_or(defaults.clearance_threshold_days),
                overstock_days: env_parse("OVERSTOCK_DAYS").unwrap_or(defaults.overstock_days),
                min_margin_pct: env_parse("MIN_MARGIN_PCT").unwrap_or(defaults.min_margin_pct),
                cost_ratio: env_parse("COST_RATIO").unwrap_or(defaults.cost_ratio),
            },
            capital: CapitalConfig {
                available_budget: env_parse("AVAILABLE_BUDGET").unwrap_or(capital.available_budget),
                target_dio: env_parse("TARGET_DIO").unwrap_or(capital.target_dio),
                ..capital
            },
            logging: LoggingConfig {
                level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level()),
                json: std::env::var("LOG_JSON").map(|v| v == "true").unwrap_or(false),
            },
        })
    }
}

/// Collect the primary credential and its numbered alternates, skipping blanks
/// and duplicates while keeping rotation order.
fn collect_api_keys<F>(prefix: &str, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut keys: Vec<String> = Vec::new();
    for i in 1..=MAX_ALTERNATE_KEYS {
        let name = if i == 1 {
            prefix.to_string()
        } else {
            format!("{}_{}", prefix, i)
        };
        if let Some(key) = lookup(&name) {
            let key = key.trim().to_string();
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_collect_keys_in_rotation_order() {
        let env: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", "primary"),
            ("GEMINI_API_KEY_3", "third"),
            ("GEMINI_API_KEY_2", "second"),
            ("GEMINI_API_KEY_4", "  "),
            ("GEMINI_API_KEY_5", "second"),
        ]
        .into_iter()
        .collect();

        let keys = collect_api_keys("GEMINI_API_KEY", |name| env.get(name).map(|v| v.to_string()));
        assert_eq!(keys, vec!["primary", "second", "third"]);
    }

    #[test]
    fn test_alternates_without_primary() {
        let keys = collect_api_keys("OPENAI_API_KEY", |name| {
            (name == "OPENAI_API_KEY_2").then(|| "alt".to_string())
        });
        assert_eq!(keys, vec!["alt"]);
    }

    #[test]
    fn test_parse_model_list() {
        assert_eq!(
            parse_list(" gemini-2.0-flash, ,gemini-1.5-flash "),
            vec!["gemini-2.0-flash", "gemini-1.5-flash"]
        );
    }

    #[test]
    fn test_policy_defaults() {
        let policy = PolicyConfig::default();
        assert_eq!(policy.lead_time_days, 7.0);
        assert_eq!(policy.service_z, 1.65);
        assert_eq!(policy.min_margin_pct, 15.0);
        assert_eq!(policy.dead_stock_days, 90);
        assert_eq!(policy.expiry_threshold_days, 90);
        assert_eq!(policy.clearance_threshold_days, 30);
    }

    #[test]
    fn test_data_paths_join_dir() {
        let data = DataConfig {
            data_dir: PathBuf::from("/srv/pharmacy"),
            ..Default::default()
        };
        assert_eq!(data.sales_path(), PathBuf::from("/srv/pharmacy/sales_history.csv"));
        assert_eq!(data.inventory_path(), PathBuf::from("/srv/pharmacy/current_inventory.csv"));
    }
}
