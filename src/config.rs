use serde::Deserialize;
use std::str::FromStr;

/// Which implementation of the KYC provider capability to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// Call the AI chat-completions API, falling back to canned data on failure.
    Live,
    /// Never leave the process; canned responses only.
    Simulated,
}

impl FromStr for ProviderMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(ProviderMode::Live),
            "simulated" | "simulation" | "demo" => Ok(ProviderMode::Simulated),
            other => anyhow::bail!("KYC_PROVIDER must be 'live' or 'simulated', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub ai_api_key: Option<String>,
    pub ai_base_url: String,
    pub ai_timeout_secs: u64,
    pub provider_mode: ProviderMode,
    /// Fail the workflow when personal-info validation reports errors.
    pub reject_invalid_applications: bool,
    pub max_upload_bytes: usize,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let ai_api_key =
            first_non_blank(["AI_API_KEY", "SAPTIVA_API_KEY"].map(|name| std::env::var(name).ok()));

        let provider_mode = match std::env::var("KYC_PROVIDER") {
            Ok(mode) => mode.parse()?,
            Err(_) if ai_api_key.is_some() => ProviderMode::Live,
            Err(_) => ProviderMode::Simulated,
        };

        if provider_mode == ProviderMode::Live && ai_api_key.is_none() {
            anyhow::bail!("KYC_PROVIDER=live requires AI_API_KEY or SAPTIVA_API_KEY");
        }

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            ai_api_key,
            ai_base_url: std::env::var("AI_BASE_URL")
                .unwrap_or_else(|_| "https://api.saptiva.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            ai_timeout_secs: std::env::var("AI_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("AI_TIMEOUT_SECS must be a whole number of seconds"))?,
            provider_mode,
            reject_invalid_applications: std::env::var("KYC_REJECT_INVALID")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| (10 * 1024 * 1024).to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_UPLOAD_BYTES must be a number of bytes"))?,
            rate_limit_per_second: std::env::var("RATE_LIMIT_PER_SECOND")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_PER_SECOND must be a number"))?,
            rate_limit_burst: std::env::var("RATE_LIMIT_BURST")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_BURST must be a number"))?,
        };

        if !config.ai_base_url.starts_with("http://") && !config.ai_base_url.starts_with("https://")
        {
            anyhow::bail!("AI_BASE_URL must start with http:// or https://");
        }
        if config.ai_timeout_secs == 0 {
            anyhow::bail!("AI_TIMEOUT_SECS cannot be zero");
        }

        // Never log the key itself
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("AI Base URL: {}", config.ai_base_url);
        tracing::debug!("AI API key configured: {}", config.ai_api_key.is_some());
        tracing::debug!("Provider mode: {:?}", config.provider_mode);
        if config.reject_invalid_applications {
            tracing::info!("Applications failing validation will be rejected");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// First candidate that is set and not blank.
fn first_non_blank(candidates: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
}
