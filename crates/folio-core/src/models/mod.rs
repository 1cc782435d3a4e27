//! Wire models for the dashboard API.
//!
//! These mirror the JSON payloads of the portfolio, market-data, agent and
//! account endpoints. Field names follow the backend's camelCase.

pub mod account;
pub mod agent;
pub mod market;
pub mod portfolio;

pub use account::{CurrentUser, MessageResponse};
pub use agent::{AgentReply, AgentSource};
pub use market::{SearchSuggestion, StockQuote};
pub use portfolio::{Holding, Portfolio, PortfolioItem};
