//! Client configuration: API location, credentials, query tuning and timeouts.

use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;
pub const DEFAULT_MATCH_COUNT: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Transport-level timeouts.
///
/// Only connection establishment is bounded by default; an open stream is
/// read until the server or the socket gives up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransportTimeout {
    pub connect: Duration,
    pub stream_read: Option<Duration>,
}

impl Default for TransportTimeout {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            stream_read: None,
        }
    }
}

/// Client configuration shared by the transport, credential provider and backend.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: Url,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Similarity cutoff sent as `match_threshold`.
    pub match_threshold: f64,
    /// Result cap sent as `match_count`.
    pub match_count: u32,
    pub timeout: TransportTimeout,
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            access_token: None,
            refresh_token: None,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            match_count: DEFAULT_MATCH_COUNT,
            timeout: TransportTimeout::default(),
        })
    }

    /// Build configuration from `AUDIT_CHAT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from `AUDIT_CHAT_*` settings resolved by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url =
            lookup("AUDIT_CHAT_BASE_URL").ok_or(ConfigError::Missing("AUDIT_CHAT_BASE_URL"))?;
        let mut config = Self::new(&base_url)?;
        config.access_token = lookup("AUDIT_CHAT_ACCESS_TOKEN");
        config.refresh_token = lookup("AUDIT_CHAT_REFRESH_TOKEN");
        if let Some(threshold) = parsed::<f64, _>(&lookup, "AUDIT_CHAT_MATCH_THRESHOLD")? {
            config.match_threshold = threshold;
        }
        if let Some(count) = parsed::<u32, _>(&lookup, "AUDIT_CHAT_MATCH_COUNT")? {
            config.match_count = count;
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "AUDIT_CHAT_CONNECT_TIMEOUT_SECS")? {
            config.timeout.connect = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed::<u64, _>(&lookup, "AUDIT_CHAT_STREAM_READ_TIMEOUT_SECS")? {
            config.timeout.stream_read = Some(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigError::Invalid {
                name: "match_threshold",
                message: format!("{} is outside 0.0..=1.0", self.match_threshold),
            });
        }
        if self.match_count == 0 {
            return Err(ConfigError::Invalid {
                name: "match_count",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn stream_url(&self) -> String {
        self.endpoint(&["chat", "stream"])
    }

    pub fn refresh_url(&self) -> String {
        self.endpoint(&["auth", "refresh"])
    }

    pub fn audit_session_url(&self, session_id: &str) -> Result<String, ConfigError> {
        let session_id = path_id("session_id", session_id)?;
        Ok(self.endpoint(&["audit-sessions", session_id]))
    }

    pub fn session_documents_url(&self, session_id: &str) -> Result<String, ConfigError> {
        let session_id = path_id("session_id", session_id)?;
        Ok(self.endpoint(&["audit-sessions", session_id, "documents"]))
    }

    pub fn chat_history_url(&self, conversation_id: &str) -> Result<String, ConfigError> {
        let conversation_id = path_id("conversation_id", conversation_id)?;
        Ok(self.endpoint(&["chat", "history", conversation_id]))
    }

    /// Append `segments` to the base path. Each segment is percent-encoded,
    /// so `/`, `?` and `#` inside an id stay within that segment.
    fn endpoint(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        // http(s) URLs always have a hierarchical path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.into()
    }
}

/// Ids become single path segments; dot segments would be dropped or resolved.
fn path_id<'a>(name: &'static str, id: &'a str) -> Result<&'a str, ConfigError> {
    if id.is_empty() || id == "." || id == ".." {
        return Err(ConfigError::Invalid {
            name,
            message: format!("{id:?} is not a usable path segment"),
        });
    }
    Ok(id)
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|error| ConfigError::Invalid {
        name: "base_url",
        message: error.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            name: "base_url",
            message: format!("unsupported scheme {}", url.scheme()),
        });
    }
    Ok(url)
}

fn parsed<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|error| ConfigError::Invalid {
                name,
                message: error.to_string(),
            }),
        None => Ok(None),
    }
}
