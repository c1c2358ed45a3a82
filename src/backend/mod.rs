//! Backend module - provider trait, adapters, factories and polling

pub mod aliyun;
pub mod cloudflare;
pub mod http;
pub mod modelscope;
pub mod poller;
pub mod registry;
pub mod traits;

pub use poller::{await_completion, JobHandle, JobState, PollSettings};
pub use registry::{FactoryRegistry, ProviderKind};
pub use traits::{GenerationOptions, ImageProvider, ProviderFactory};
