//! Gateway core - request dispatch

pub mod dispatcher;

pub use dispatcher::{Dispatcher, GenerationRequest};
