//! Connection options shared by every command.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use audit_chat::ClientConfig;

/// Options for reaching the audit chat API.
///
/// Every option can also be set from the environment or a `.env` file.
#[derive(Args, Debug, Clone)]
pub struct ClientOpts {
    /// API base URL (env: AUDIT_CHAT_BASE_URL)
    #[arg(long, global = true, env = "AUDIT_CHAT_BASE_URL")]
    pub base_url: Option<String>,

    /// Bearer access token (env: AUDIT_CHAT_ACCESS_TOKEN)
    #[arg(long, global = true, env = "AUDIT_CHAT_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Refresh token used when the access token expires (env: AUDIT_CHAT_REFRESH_TOKEN)
    #[arg(long, global = true, env = "AUDIT_CHAT_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    /// Similarity cutoff for retrieved passages (env: AUDIT_CHAT_MATCH_THRESHOLD)
    #[arg(long, global = true, env = "AUDIT_CHAT_MATCH_THRESHOLD")]
    pub match_threshold: Option<f64>,

    /// Maximum passages retrieved per question (env: AUDIT_CHAT_MATCH_COUNT)
    #[arg(long, global = true, env = "AUDIT_CHAT_MATCH_COUNT")]
    pub match_count: Option<u32>,

    /// Give up connecting after this many seconds (env: AUDIT_CHAT_CONNECT_TIMEOUT_SECS)
    #[arg(long, global = true, env = "AUDIT_CHAT_CONNECT_TIMEOUT_SECS")]
    pub connect_timeout_secs: Option<u64>,

    /// Give up on a silent stream after this many seconds (env: AUDIT_CHAT_STREAM_READ_TIMEOUT_SECS)
    #[arg(long, global = true, env = "AUDIT_CHAT_STREAM_READ_TIMEOUT_SECS")]
    pub stream_timeout_secs: Option<u64>,
}

impl ClientOpts {
    pub fn client_config(&self) -> Result<ClientConfig> {
        let base_url = self
            .base_url
            .as_deref()
            .context("missing API base URL (set --base-url or AUDIT_CHAT_BASE_URL)")?;
        let mut config = ClientConfig::new(base_url).context("invalid base URL")?;
        config.access_token = self.access_token.clone();
        config.refresh_token = self.refresh_token.clone();
        if let Some(threshold) = self.match_threshold {
            config.match_threshold = threshold;
        }
        if let Some(count) = self.match_count {
            config.match_count = count;
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.timeout.connect = Duration::from_secs(secs);
        }
        if let Some(secs) = self.stream_timeout_secs {
            config.timeout.stream_read = Some(Duration::from_secs(secs));
        }
        config.validate().context("invalid client configuration")?;
        Ok(config)
    }
}
