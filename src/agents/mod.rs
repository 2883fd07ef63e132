//! Decision-support agents for pharmacy operations
//!
//! Each calculator is a set of pure functions over a [`Snapshot`](crate::data::Snapshot).
//! The [`MasterAgent`] routes free-text questions to them and asks the LLM to
//! synthesize the results.

pub mod base;
pub mod capital;
pub mod forecast;
pub mod inventory;
pub mod master;
pub mod pricing;
pub mod router;
pub mod supplier;
pub mod transfer;

pub use base::{parse_llm_json, AgentKind, AgentReport};
pub use master::{Consultation, ConversationTurn, MasterAgent, MasterAnswer};
pub use router::{keyword_route, RouteKind, RouteSource, RoutingPlan};
