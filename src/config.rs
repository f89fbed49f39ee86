use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::services::scoring::ScoringConfig;

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_file_size: usize,
    pub session_ttl: Duration,
    pub max_sessions: u64,
    pub scoring_seed: u64,
    pub openai_key: Option<String>,
    pub report_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_file_size: default_max_file_size(),
            session_ttl: Duration::from_secs(3600),
            max_sessions: 1000,
            scoring_seed: 42,
            openai_key: None,
            report_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let defaults = Config::default();
        let openai_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        if openai_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set, report generation is disabled");
        }

        Ok(Config {
            bind_addr: env_or("SUPPLIER_BIND_ADDR", defaults.bind_addr)?,
            max_file_size: env_or("SUPPLIER_MAX_UPLOAD_BYTES", defaults.max_file_size)?,
            session_ttl: Duration::from_secs(env_or(
                "SUPPLIER_SESSION_TTL_SECS",
                defaults.session_ttl.as_secs(),
            )?),
            max_sessions: env_or("SUPPLIER_MAX_SESSIONS", defaults.max_sessions)?,
            scoring_seed: env_or("SUPPLIER_SCORING_SEED", defaults.scoring_seed)?,
            openai_key,
            report_model: std::env::var("SUPPLIER_REPORT_MODEL").unwrap_or(defaults.report_model),
        })
    }

    pub fn scoring(&self) -> ScoringConfig {
        ScoringConfig {
            seed: self.scoring_seed,
            ..ScoringConfig::default()
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {}={}", key, raw)),
        Err(_) => Ok(default),
    }
}
