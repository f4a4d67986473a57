pub mod axum_http;
pub mod config;
pub mod metrics;
pub mod services;
pub mod usecases;
