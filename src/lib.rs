pub mod auth;
pub mod configuration;
pub mod error;
pub mod middleware;
pub mod rate_limiter;
pub mod request_context;
pub mod routes;
pub mod startup;
pub mod store;
pub mod telemetry;
pub mod validators;
