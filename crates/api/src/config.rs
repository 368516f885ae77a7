use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use folio_relay::gemini::{DEFAULT_API_BASE, DEFAULT_MODEL};
use folio_relay::GeminiConfig;

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_PROFILE_OWNER: &str = "Jordan Example";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    pub gemini: GeminiConfig,
    pub profile_path: Option<PathBuf>,
    pub profile_owner: String,
    pub greeting: Option<String>,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    /// Key rate limits on `x-forwarded-for` instead of the peer address.
    pub trust_forwarded_for: bool,
    pub session_purge_interval: Duration,
}

impl ApiConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let Some(api_key) = non_empty("GEMINI_API_KEY") else {
            bail!("GEMINI_API_KEY is not set; add it to the environment or a .env file");
        };

        let gemini = GeminiConfig {
            api_key,
            model: non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: non_empty("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            timeout: Duration::from_secs(
                non_empty("FOLIO_UPSTREAM_TIMEOUT_SECONDS")
                    .and_then(|value| value.parse::<u64>().ok())
                    .map(|value| value.clamp(1, 300))
                    .unwrap_or(20),
            ),
        };

        Ok(Self {
            bind: non_empty("FOLIO_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            gemini,
            profile_path: non_empty("FOLIO_PROFILE_PATH").map(PathBuf::from),
            profile_owner: non_empty("FOLIO_PROFILE_OWNER")
                .unwrap_or_else(|| DEFAULT_PROFILE_OWNER.to_string()),
            greeting: non_empty("FOLIO_GREETING"),
            rate_limit_window: Duration::from_secs(
                non_empty("FOLIO_RATE_LIMIT_WINDOW_SECONDS")
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(60),
            ),
            rate_limit_max: non_empty("FOLIO_RATE_LIMIT_MAX")
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(30),
            trust_forwarded_for: non_empty("FOLIO_TRUST_FORWARDED_FOR")
                .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            session_purge_interval: Duration::from_secs(
                non_empty("FOLIO_SESSION_PURGE_SECONDS")
                    .and_then(|value| value.parse::<u64>().ok())
                    .map(|value| value.max(10))
                    .unwrap_or(300),
            ),
        })
    }
}
