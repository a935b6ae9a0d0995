//! Environment-driven configuration

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::baseline::SyncConfig;
use crate::core::poller::PollerConfig;
use crate::correlation::{EngineConfig, GateConfig};
use crate::models::{PoolKind, SyncScope};
use crate::services::brain::DEFAULT_BASE_URL;
use crate::submission::CheckerConfig;

/// Deployment environment: `production`/`prod` or anything else (sandbox)
pub fn get_environment() -> String {
    env::var("ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string())
}

pub fn get_brain_api_url() -> String {
    env::var("BRAIN_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

/// Session cookie sent with every platform request, if any
pub fn get_session_cookie() -> Option<String> {
    env::var("BRAIN_SESSION_COOKIE").ok().filter(|c| !c.is_empty())
}

/// Cache root: `ALPHAGATE_CACHE_DIR`, else `~/.alphagate/alpha_cache`
pub fn get_cache_dir() -> PathBuf {
    if let Ok(dir) = env::var("ALPHAGATE_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".alphagate")
        .join("alpha_cache")
}

pub fn get_port() -> u16 {
    env_parse("PORT").unwrap_or(8080)
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Scopes kept warm by the baseline-sync worker, from `SYNC_REGIONS` x `SYNC_POOLS`
pub fn get_sync_scopes() -> Result<Vec<SyncScope>, String> {
    let mut regions = env_list("SYNC_REGIONS");
    if regions.is_empty() {
        regions.push("USA".to_string());
    }

    let pools = match env::var("SYNC_POOLS") {
        Ok(raw) if !raw.trim().is_empty() => PoolKind::parse_selection(&raw)?,
        _ => vec![PoolKind::SelfPool, PoolKind::PowerPool],
    };

    let mut scopes = Vec::new();
    for region in &regions {
        for pool in pools.iter().filter(|p| p.supports_local()) {
            scopes.push(SyncScope::new(region.clone(), *pool));
        }
    }
    Ok(scopes)
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub cache_dir: PathBuf,
    pub gate: GateConfig,
    pub poller: PollerConfig,
    pub engine: EngineConfig,
    pub sync: SyncConfig,
    pub checker: CheckerConfig,
}

impl AppConfig {
    /// Defaults overridden by whatever is set in the environment
    pub fn from_env() -> Self {
        let mut poller = PollerConfig::default();
        if let Some(attempts) = env_parse("POLL_MAX_ATTEMPTS") {
            poller.max_attempts = attempts;
        }
        if let Some(ms) = env_parse::<u64>("POLL_DEFAULT_DELAY_MS") {
            poller.default_delay = Duration::from_millis(ms);
        }

        let mut engine = EngineConfig::default();
        if let Some(days) = env_parse("MIN_OVERLAP_DAYS") {
            engine.min_overlap = days;
        }
        if let Some(years) = env_parse::<u32>("LOOKBACK_YEARS") {
            engine.lookback_years = (years > 0).then_some(years);
        }

        let mut sync = SyncConfig::default();
        if let Some(secs) = env_parse::<u64>("SYNC_ALPHA_TIMEOUT_SECONDS") {
            sync.alpha_timeout = Duration::from_secs(secs);
        }

        let checker = CheckerConfig {
            sync_before_local: env_parse("SYNC_BEFORE_LOCAL").unwrap_or(false),
        };

        Self {
            api_url: get_brain_api_url(),
            cache_dir: get_cache_dir(),
            gate: GateConfig::default(),
            poller,
            engine,
            sync,
            checker,
        }
    }
}
