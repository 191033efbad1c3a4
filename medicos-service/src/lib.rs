pub mod config;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod service;
pub mod telemetry;

pub use config::{ConfigError, ServiceConfig};
pub use service::{AppState, RouterOptions, build_router, create_app, create_app_state};
pub use models::*;
