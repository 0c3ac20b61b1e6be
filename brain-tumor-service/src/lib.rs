pub mod collaborators;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod service;

pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use models::*;
pub use service::{AppState, RequestLimits, build_router, create_app};
