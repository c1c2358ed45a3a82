//! Image Dispatch Gateway
//!
//! Validates generic image generation requests against a capability registry
//! and dispatches them to interchangeable remote backends (Cloudflare Workers
//! AI, ModelScope, Aliyun DashScope) behind one provider interface.

pub mod api;
pub mod backend;
pub mod capability;
pub mod config;
pub mod error;
pub mod gateway;

pub use error::{AppError, ErrorOrigin, Result};

use std::sync::Arc;

use gateway::Dispatcher;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub dispatcher: Arc<Dispatcher>,
}
