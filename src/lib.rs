pub mod auth;
pub mod cache;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod evaluation;
pub mod fallback;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod store;
pub mod validation;

pub use config::Config;
pub use error::{Result, SummarizerError};
pub use pipeline::Orchestrator;
pub use response::SummarizeResponse;
pub use server::create_app;
