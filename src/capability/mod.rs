//! Capability registry and request validation

pub mod registry;

pub use registry::{CapabilityRegistry, ProviderCapabilities, Task, WILDCARD};
