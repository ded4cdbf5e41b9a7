//! Run-time settings for [`crate::pipeline::IngestionPipeline`].

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::fetcher::FetchPolicy;
use crate::keywords::DEFAULT_TOP_N;
use crate::retry::Backoff;
use std::time::Duration;

/// Everything the pipeline needs besides the site adapter and the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Concurrent article workers, each with its own rendering session.
    pub workers: usize,
    /// Articles persisted between two sink checkpoints.
    pub batch_size: usize,
    pub backoff: Backoff,
    /// Shared budget for every page request, listing or article.
    pub requests_per_minute: u32,
    /// Re-scrape URLs the sink already holds.
    pub refresh_existing: bool,
    pub fetch: FetchPolicy,
    pub top_keywords: usize,
    /// Replaces the adapter's "load more" budget when set.
    pub max_load_more: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            batch_size: 5,
            backoff: Backoff::default(),
            requests_per_minute: 30,
            refresh_existing: false,
            fetch: FetchPolicy::default(),
            top_keywords: DEFAULT_TOP_N,
            max_load_more: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let config = Self {
            workers: cli.workers,
            batch_size: cli.batch_size,
            backoff: Backoff::new(cli.retries, Duration::from_millis(cli.retry_delay_ms)),
            requests_per_minute: cli.requests_per_minute,
            refresh_existing: cli.refresh,
            fetch: FetchPolicy {
                page_timeout: Duration::from_secs(cli.timeout_secs),
                ..FetchPolicy::default()
            },
            top_keywords: cli.top_keywords,
            max_load_more: cli.max_load_more,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("workers", self.workers as u64),
            ("batch size", self.batch_size as u64),
            ("requests per minute", self.requests_per_minute as u64),
            ("top keywords", self.top_keywords as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        if self.fetch.page_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_from_cli_defaults_match_default() {
        let cli = Cli::parse_from(["publication_crawler"]);
        assert_eq!(PipelineConfig::from_cli(&cli).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_from_cli_overrides() {
        let cli = Cli::parse_from([
            "publication_crawler",
            "--retries",
            "5",
            "--timeout-secs",
            "10",
            "--retry-delay-ms",
            "50",
            "--max-load-more",
            "4",
        ]);
        let config = PipelineConfig::from_cli(&cli).unwrap();
        assert_eq!(config.backoff.max_retries, 5);
        assert_eq!(config.backoff.base_delay, Duration::from_millis(50));
        assert_eq!(config.fetch.page_timeout, Duration::from_secs(10));
        assert_eq!(config.max_load_more, Some(4));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cli = Cli::parse_from(["publication_crawler", "--workers", "0"]);
        let err = PipelineConfig::from_cli(&cli).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("workers")));
    }

    #[test]
    fn test_sub_second_timeout_is_valid() {
        let config = PipelineConfig {
            fetch: FetchPolicy {
                page_timeout: Duration::from_millis(500),
                ..FetchPolicy::default()
            },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let cli = Cli::parse_from(["publication_crawler", "--timeout-secs", "0"]);
        let err = PipelineConfig::from_cli(&cli).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("timeout")));
    }
}
