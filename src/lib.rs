//! Pharmacy Agents - Decision Support for Pharmacy Operations
//!
//! Calculators over CSV snapshots of sales and inventory, with an LLM on top
//! that routes questions and turns the numbers into recommendations.
//!
//! # Features
//!
//! - **Demand Forecasting**: Holt-Winters forecasts with seasonal adjustments and surge alerts
//! - **Inventory Policy**: Safety stock, reorder points, dead stock and expiry tracking
//! - **Store Transfers**: Balancing and expiry-driven stock movements between stores
//! - **Pricing**: Discount recommendations, clearance pricing and margin simulation
//! - **Supplier Scoring**: Weighted scores, risk alerts and split ordering
//! - **Working Capital**: DIO, purchase validation and optimization opportunities
//! - **Master Agent**: LLM routing with keyword fallback, synthesis and conversation history
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pharmacy_agents::{load_snapshot, AgentConfig, LlmService, MasterAgent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AgentConfig::from_env()?;
//!     let snapshot = load_snapshot(&config.data)?;
//!     let llm = LlmService::from_config(&config.llm)?;
//!
//!     let mut master = MasterAgent::new(snapshot, llm)
//!         .with_policy(config.policy.clone())
//!         .with_capital(config.capital.clone());
//!
//!     let answer = master.ask("Which products are expiring soon?").await;
//!     println!("{}", answer);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Master Agent                           │
//! │        (Routing, Synthesis, Conversation History)           │
//! └──────┬───────────────────────┬──────────────────────┬───────┘
//!        │                       │                      │
//!        ▼                       ▼                      ▼
//! ┌─────────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ LLM Service │   │       Calculators        │   │ Snapshot │
//! │ (key/model  │   │ forecast · inventory ·   │◄──│  (CSV)   │
//! │  rotation)  │   │ transfer · pricing ·     │   └──────────┘
//! └─────────────┘   │ supplier · capital       │
//!                   └──────────────────────────┘
//! ```

pub mod agents;
pub mod config;
pub mod data;
pub mod error;
pub mod services;

// Re-exports for convenience
pub use agents::{AgentKind, AgentReport, MasterAgent, MasterAnswer, RoutingPlan};
pub use config::{AgentConfig, CapitalConfig, LlmConfig, LlmProvider, PolicyConfig};
pub use data::{load_snapshot, Snapshot};
pub use error::{AgentError, Result};
pub use services::{CompletionBackend, CompletionError, LlmService, RotationCursor};

/// Version of the pharmacy-agents library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
