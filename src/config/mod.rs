//! Configuration: settings file, environment overrides and credentials

pub mod credentials;
pub mod settings;

pub use credentials::{CloudflareCredentials, ProviderCredentials};
pub use settings::{
    CapabilitiesConfig, DispatchConfig, LoggingConfig, PollerConfig, ProviderEndpointConfig,
    ProvidersConfig, ServerConfig, Settings,
};
