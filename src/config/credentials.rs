//! Backend credentials resolved once at startup

use secrecy::SecretString;

pub const CLOUDFLARE_ACCOUNT_ID_ENV: &str = "CLOUDFLARE_ACCOUNT_ID";
pub const CLOUDFLARE_API_TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";
pub const MODELSCOPE_API_TOKEN_ENV: &str = "MODELSCOPE_API_TOKEN";
pub const DASHSCOPE_API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

#[derive(Debug)]
pub struct CloudflareCredentials {
    pub account_id: SecretString,
    pub api_token: SecretString,
}

/// One credential bundle per backend family; `None` when not configured
#[derive(Debug, Default)]
pub struct ProviderCredentials {
    pub cloudflare: Option<CloudflareCredentials>,
    pub modelscope: Option<SecretString>,
    pub aliyun: Option<SecretString>,
}

impl ProviderCredentials {
    /// Read credentials from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve credentials through `lookup`; empty values count as missing
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map(SecretString::from)
        };

        let cloudflare = match (
            secret(CLOUDFLARE_ACCOUNT_ID_ENV),
            secret(CLOUDFLARE_API_TOKEN_ENV),
        ) {
            (Some(account_id), Some(api_token)) => Some(CloudflareCredentials {
                account_id,
                api_token,
            }),
            _ => None,
        };

        Self {
            cloudflare,
            modelscope: secret(MODELSCOPE_API_TOKEN_ENV),
            aliyun: secret(DASHSCOPE_API_KEY_ENV),
        }
    }
}
