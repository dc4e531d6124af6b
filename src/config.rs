//! Configuration types, built from environment variables.

use std::time::Duration;

use crate::mail::retrieval::Account;
use crate::oracle::batch::Batcher;
use crate::oracle::retry::RetryPolicy;

/// Default provider search query: unarchived inbox mail.
const DEFAULT_QUERY: &str = "in:inbox";

/// Default per-account search limit.
const DEFAULT_LIMIT: usize = 50;

/// Triage run configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Mail accounts to pull from. Empty is allowed; the run completes
    /// with an empty digest.
    pub accounts: Vec<Account>,
    /// Provider search query.
    pub query: String,
    /// Per-account search limit.
    pub limit: usize,
    /// Oracle retry policy.
    pub retry: RetryPolicy,
    /// Oracle batching (per-conversation mode).
    pub batcher: Batcher,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            query: DEFAULT_QUERY.to_string(),
            limit: DEFAULT_LIMIT,
            retry: RetryPolicy::default(),
            batcher: Batcher::default(),
        }
    }
}

impl TriageConfig {
    /// Build config from environment variables.
    ///
    /// - `TRIAGE_ACCOUNTS`: comma-separated `name=token` pairs; missing or
    ///   empty means no accounts (empty digest, not an error)
    /// - `TRIAGE_QUERY`, `TRIAGE_LIMIT`
    /// - `TRIAGE_MAX_RETRIES`, `TRIAGE_BASE_DELAY_MS`
    /// - `TRIAGE_BATCH_SIZE`, `TRIAGE_STAGGER_MS`
    pub fn from_env() -> Self {
        let accounts = std::env::var("TRIAGE_ACCOUNTS")
            .unwrap_or_default()
            .split(',')
            .filter_map(|entry| {
                let entry = entry.trim();
                let (name, token) = entry.split_once('=')?;
                (!name.is_empty() && !token.is_empty()).then(|| Account {
                    name: name.to_string(),
                    token: token.to_string(),
                })
            })
            .collect();

        let query =
            std::env::var("TRIAGE_QUERY").unwrap_or_else(|_| DEFAULT_QUERY.to_string());

        let limit = env_parse("TRIAGE_LIMIT", DEFAULT_LIMIT);

        let retry = RetryPolicy {
            max_retries: env_parse("TRIAGE_MAX_RETRIES", RetryPolicy::default().max_retries),
            base_delay: Duration::from_millis(env_parse(
                "TRIAGE_BASE_DELAY_MS",
                RetryPolicy::default().base_delay.as_millis() as u64,
            )),
        };

        let batcher = Batcher {
            batch_size: env_parse("TRIAGE_BATCH_SIZE", Batcher::default().batch_size),
            stagger: Duration::from_millis(env_parse(
                "TRIAGE_STAGGER_MS",
                Batcher::default().stagger.as_millis() as u64,
            )),
        };

        Self {
            accounts,
            query,
            limit,
            retry,
            batcher,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_tuning() {
        let config = TriageConfig::default();
        assert!(config.accounts.is_empty());
        assert_eq!(config.query, "in:inbox");
        assert_eq!(config.limit, 50);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(config.batcher.batch_size, 20);
        assert_eq!(config.batcher.stagger, Duration::from_millis(30));
    }
}
