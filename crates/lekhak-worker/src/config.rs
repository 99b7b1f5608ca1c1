//! Environment-driven worker configuration.
//!
//! All validation happens up front and collects every problem before
//! failing, so a misconfigured deployment reports the full list instead of
//! dying on the first missing key. Invalid numeric values fall back to
//! their defaults with a warning; missing required keys are fatal.

use std::path::PathBuf;
use std::time::Duration;

use lekhak_core::recovery::RetryBudgets;
use lekhak_kv::RetryPolicy;
use lekhak_quality::ocr::{GuardThresholds, OcrWeights};
use thiserror::Error;
use tracing::warn;

/// Error aggregating every configuration problem found at startup.
#[derive(Debug, Error)]
#[error("startup environment invalid: {}", .issues.join("; "))]
pub struct ConfigError {
    /// One message per problem.
    pub issues: Vec<String>,
}

/// Queue topology the worker pops from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueMode {
    /// One queue, one dead-letter list.
    Single {
        /// Queue to pop from.
        queue: String,
        /// Dead-letter list.
        dlq: String,
    },
    /// Local queue takes priority over the cloud queue.
    Both {
        /// Local submission queue.
        local_queue: String,
        /// Dead-letter list for local jobs.
        local_dlq: String,
        /// Cloud submission queue.
        cloud_queue: String,
        /// Dead-letter list for cloud jobs.
        cloud_dlq: String,
    },
    /// One queue per job type.
    Partitioned {
        /// OCR submission queue.
        ocr_queue: String,
        /// Dead-letter list for OCR jobs.
        ocr_dlq: String,
        /// Transcription submission queue.
        transcription_queue: String,
        /// Dead-letter list for transcription jobs.
        transcription_dlq: String,
    },
}

/// Fully resolved worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// KV store URL (`redis://` or `rediss://`).
    pub redis_url: String,
    /// Cloud project used by the external model client.
    pub gcp_project_id: String,
    /// Bucket outputs are written to.
    pub gcs_bucket: String,
    /// Path to the prompts file.
    pub prompt_file: PathBuf,
    /// Name of the OCR prompt section.
    pub prompt_name: String,
    /// Queue topology.
    pub queue_mode: QueueMode,
    /// Global in-flight cap for OCR jobs.
    pub max_inflight_ocr: u32,
    /// Global in-flight cap for transcription jobs.
    pub max_inflight_transcription: u32,
    /// Retry budgets per recovery reason.
    pub budgets: RetryBudgets,
    /// Rasterization resolution.
    pub ocr_dpi: u32,
    /// Pages rasterized per batch; 0 loads everything at once.
    pub ocr_page_batch_size: usize,
    /// Retries for empty per-page model output.
    pub ocr_page_retries: u32,
    /// Substitute empty text when a page stays empty after retries.
    pub ocr_allow_empty_page_fallback: bool,
    /// Audio chunk duration.
    pub chunk_duration: Duration,
    /// Blocking-pop timeout.
    pub brpop_timeout: Duration,
    /// Idle span after which the KV connection is rebuilt.
    pub max_idle_before_reconnect: Duration,
    /// Retry policy for short KV operations.
    pub kv_retry: RetryPolicy,
    /// Retry policy for blob transfers.
    pub blob_retry: RetryPolicy,
    /// Quality score weights.
    pub quality_weights: OcrWeights,
    /// Quality guard thresholds.
    pub quality_guards: GuardThresholds,
    /// Log level for the tracing subscriber.
    pub log_level: String,
}

impl WorkerConfig {
    /// Resolve the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] listing every missing or invalid required
    /// setting.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the configuration from an arbitrary lookup, for tests.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] listing every missing or invalid required
    /// setting.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut issues = Vec::new();

        let redis_url = require(&lookup, "REDIS_URL", &mut issues);
        if let Some(url) = &redis_url
            && !(url.starts_with("redis://") || url.starts_with("rediss://"))
        {
            issues.push("REDIS_URL must start with redis:// or rediss://".to_string());
        }
        let gcp_project_id = require(&lookup, "GCP_PROJECT_ID", &mut issues);
        let gcs_bucket = require(&lookup, "GCS_BUCKET_NAME", &mut issues);
        let prompt_file = require(&lookup, "PROMPT_FILE", &mut issues);
        let prompt_name = require(&lookup, "PROMPT_NAME", &mut issues);

        let queue_mode = resolve_queue_mode(&lookup, &mut issues);

        let max_inflight_ocr = env_u32(&lookup, "WORKER_MAX_INFLIGHT_OCR", 1, 0, 100);
        let max_inflight_transcription =
            env_u32(&lookup, "WORKER_MAX_INFLIGHT_TRANSCRIPTION", 1, 0, 100);

        let budgets = RetryBudgets {
            transient: env_u32(&lookup, "RETRY_BUDGET_TRANSIENT", 2, 0, 10),
            media: env_u32(&lookup, "RETRY_BUDGET_MEDIA", 0, 0, 10),
            default: env_u32(&lookup, "RETRY_BUDGET_DEFAULT", 0, 0, 10),
        };

        let ocr_dpi = env_u32(&lookup, "OCR_DPI", 200, 72, 1200);
        let ocr_page_batch_size = env_u32(&lookup, "OCR_PAGE_BATCH_SIZE", 4, 0, 1000) as usize;
        let ocr_page_retries = env_u32(&lookup, "OCR_PAGE_RETRIES", 2, 0, 10);
        let ocr_allow_empty_page_fallback =
            env_bool(&lookup, "OCR_ALLOW_EMPTY_PAGE_FALLBACK", true);
        let chunk_duration = Duration::from_secs(u64::from(env_u32(
            &lookup,
            "TRANSCRIBE_CHUNK_DURATION_SEC",
            300,
            30,
            3600,
        )));

        let brpop_timeout =
            Duration::from_secs(u64::from(env_u32(&lookup, "BRPOP_TIMEOUT", 10, 1, 60)));
        let max_idle_before_reconnect = Duration::from_secs(u64::from(env_u32(
            &lookup,
            "MAX_IDLE_BEFORE_RECONNECT",
            60,
            10,
            86_400,
        )));

        let kv_retry = RetryPolicy {
            max_retries: env_u32(&lookup, "WORKER_REDIS_RETRIES", 2, 0, 10),
            base_delay: env_secs(&lookup, "WORKER_REDIS_BACKOFF_SEC", 0.15),
            max_delay: env_secs(&lookup, "WORKER_REDIS_MAX_BACKOFF_SEC", 2.0),
            ..RetryPolicy::kv()
        };
        let blob_retry = RetryPolicy {
            max_retries: env_u32(&lookup, "GCS_RETRIES", 3, 0, 10),
            base_delay: env_secs(&lookup, "GCS_BACKOFF_SEC", 0.5),
            max_delay: env_secs(&lookup, "GCS_MAX_BACKOFF_SEC", 5.0),
            ..RetryPolicy::blob()
        };

        let quality_weights = lookup("OCR_QUALITY_WEIGHTS_JSON")
            .map_or_else(OcrWeights::default, |raw| OcrWeights::from_json(&raw));
        let quality_guards = GuardThresholds::from_lookup(&lookup);

        let log_level = lookup("LOG_LEVEL")
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        if !issues.is_empty() {
            return Err(ConfigError { issues });
        }

        Ok(Self {
            redis_url: redis_url.unwrap_or_default(),
            gcp_project_id: gcp_project_id.unwrap_or_default(),
            gcs_bucket: gcs_bucket.unwrap_or_default(),
            prompt_file: PathBuf::from(prompt_file.unwrap_or_default()),
            prompt_name: prompt_name.unwrap_or_default(),
            queue_mode: queue_mode.unwrap_or(QueueMode::Single {
                queue: String::new(),
                dlq: String::new(),
            }),
            max_inflight_ocr,
            max_inflight_transcription,
            budgets,
            ocr_dpi,
            ocr_page_batch_size,
            ocr_page_retries,
            ocr_allow_empty_page_fallback,
            chunk_duration,
            brpop_timeout,
            max_idle_before_reconnect,
            kv_retry,
            blob_retry,
            quality_weights,
            quality_guards,
            log_level,
        })
    }
}

fn require<F>(lookup: &F, name: &str, issues: &mut Vec<String>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(value) => Some(value),
        None => {
            issues.push(format!("{name} is required"));
            None
        }
    }
}

fn resolve_queue_mode<F>(lookup: &F, issues: &mut Vec<String>) -> Option<QueueMode>
where
    F: Fn(&str) -> Option<String>,
{
    let mode = lookup("QUEUE_MODE")
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "single".to_string());

    match mode.as_str() {
        "single" => {
            let queue = require(lookup, "QUEUE_NAME", issues);
            let dlq = require(lookup, "DLQ_NAME", issues);
            Some(QueueMode::Single {
                queue: queue.unwrap_or_default(),
                dlq: dlq.unwrap_or_default(),
            })
        }
        "both" => {
            let local_queue = require(lookup, "LOCAL_QUEUE_NAME", issues);
            let local_dlq = require(lookup, "LOCAL_DLQ_NAME", issues);
            let cloud_queue = require(lookup, "CLOUD_QUEUE_NAME", issues);
            let cloud_dlq = require(lookup, "CLOUD_DLQ_NAME", issues);
            Some(QueueMode::Both {
                local_queue: local_queue.unwrap_or_default(),
                local_dlq: local_dlq.unwrap_or_default(),
                cloud_queue: cloud_queue.unwrap_or_default(),
                cloud_dlq: cloud_dlq.unwrap_or_default(),
            })
        }
        "partitioned" => {
            let ocr_queue = require(lookup, "OCR_QUEUE_NAME", issues);
            let ocr_dlq = require(lookup, "OCR_DLQ_NAME", issues);
            let transcription_queue = require(lookup, "TRANSCRIPTION_QUEUE_NAME", issues);
            let transcription_dlq = require(lookup, "TRANSCRIPTION_DLQ_NAME", issues);
            Some(QueueMode::Partitioned {
                ocr_queue: ocr_queue.unwrap_or_default(),
                ocr_dlq: ocr_dlq.unwrap_or_default(),
                transcription_queue: transcription_queue.unwrap_or_default(),
                transcription_dlq: transcription_dlq.unwrap_or_default(),
            })
        }
        other => {
            issues.push(format!(
                "QUEUE_MODE must be 'single', 'both', or 'partitioned' (got '{other}')"
            ));
            None
        }
    }
}

fn env_u32<F>(lookup: &F, name: &str, default: u32, min: u32, max: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name).filter(|v| !v.trim().is_empty()) else {
        return default;
    };
    match raw.trim().parse::<u32>() {
        Ok(value) => value.clamp(min, max),
        Err(_) => {
            warn!(name, raw = raw.as_str(), default, "invalid_env_value");
            default
        }
    }
}

fn env_secs<F>(lookup: &F, name: &str, default: f64) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name).filter(|v| !v.trim().is_empty()) else {
        return Duration::from_secs_f64(default);
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value >= 0.0 => Duration::from_secs_f64(value),
        _ => {
            warn!(name, raw = raw.as_str(), default, "invalid_env_value");
            Duration::from_secs_f64(default)
        }
    }
}

fn env_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name).filter(|v| !v.trim().is_empty()) else {
        return default;
    };
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("REDIS_URL", "redis://localhost:6379/0"),
            ("GCP_PROJECT_ID", "demo-project"),
            ("GCS_BUCKET_NAME", "demo-bucket"),
            ("PROMPT_FILE", "/etc/lekhak/prompts.txt"),
            ("PROMPT_NAME", "JAIN_OCR"),
            ("QUEUE_NAME", "jobs"),
            ("DLQ_NAME", "jobs:dlq"),
        ])
    }

    fn config_from(env: &HashMap<&'static str, &'static str>) -> Result<WorkerConfig, ConfigError> {
        WorkerConfig::from_lookup(|name| env.get(name).map(ToString::to_string))
    }

    #[test]
    fn minimal_single_mode_resolves_with_defaults() {
        let config = config_from(&base_env()).unwrap();
        assert_eq!(
            config.queue_mode,
            QueueMode::Single {
                queue: "jobs".to_string(),
                dlq: "jobs:dlq".to_string(),
            }
        );
        assert_eq!(config.max_inflight_ocr, 1);
        assert_eq!(config.budgets.transient, 2);
        assert_eq!(config.budgets.media, 0);
        assert_eq!(config.chunk_duration, Duration::from_secs(300));
        assert_eq!(config.brpop_timeout, Duration::from_secs(10));
        assert!(config.ocr_allow_empty_page_fallback);
        assert_eq!(config.kv_retry.max_retries, 2);
        assert_eq!(config.blob_retry.max_retries, 3);
    }

    #[test]
    fn missing_required_keys_are_all_reported() {
        let err = config_from(&HashMap::new()).unwrap_err();
        let text = err.to_string();
        for key in [
            "REDIS_URL",
            "GCP_PROJECT_ID",
            "GCS_BUCKET_NAME",
            "PROMPT_FILE",
            "PROMPT_NAME",
            "QUEUE_NAME",
            "DLQ_NAME",
        ] {
            assert!(text.contains(key), "missing {key} in: {text}");
        }
    }

    #[test]
    fn bad_redis_scheme_is_rejected() {
        let mut env = base_env();
        env.insert("REDIS_URL", "http://localhost");
        let err = config_from(&env).unwrap_err();
        assert!(err.to_string().contains("redis://"));
    }

    #[test]
    fn both_mode_requires_all_four_names() {
        let mut env = base_env();
        env.remove("QUEUE_NAME");
        env.remove("DLQ_NAME");
        env.insert("QUEUE_MODE", "both");
        env.insert("LOCAL_QUEUE_NAME", "local_jobs");
        env.insert("LOCAL_DLQ_NAME", "local_jobs:dlq");
        let err = config_from(&env).unwrap_err();
        assert!(err.to_string().contains("CLOUD_QUEUE_NAME"));
        assert!(err.to_string().contains("CLOUD_DLQ_NAME"));

        env.insert("CLOUD_QUEUE_NAME", "cloud_jobs");
        env.insert("CLOUD_DLQ_NAME", "cloud_jobs:dlq");
        let config = config_from(&env).unwrap();
        assert!(matches!(config.queue_mode, QueueMode::Both { .. }));
    }

    #[test]
    fn partitioned_mode_resolves() {
        let mut env = base_env();
        env.remove("QUEUE_NAME");
        env.remove("DLQ_NAME");
        env.insert("QUEUE_MODE", "partitioned");
        env.insert("OCR_QUEUE_NAME", "ocr_jobs");
        env.insert("OCR_DLQ_NAME", "ocr_jobs:dlq");
        env.insert("TRANSCRIPTION_QUEUE_NAME", "tr_jobs");
        env.insert("TRANSCRIPTION_DLQ_NAME", "tr_jobs:dlq");
        let config = config_from(&env).unwrap();
        assert!(matches!(config.queue_mode, QueueMode::Partitioned { .. }));
    }

    #[test]
    fn unknown_queue_mode_is_an_error() {
        let mut env = base_env();
        env.insert("QUEUE_MODE", "striped");
        let err = config_from(&env).unwrap_err();
        assert!(err.to_string().contains("QUEUE_MODE"));
    }

    #[test]
    fn numeric_values_clamp_and_fall_back() {
        let mut env = base_env();
        env.insert("WORKER_MAX_INFLIGHT_OCR", "500");
        env.insert("RETRY_BUDGET_TRANSIENT", "99");
        env.insert("OCR_DPI", "10");
        env.insert("TRANSCRIBE_CHUNK_DURATION_SEC", "5");
        env.insert("OCR_PAGE_RETRIES", "not-a-number");
        let config = config_from(&env).unwrap();
        assert_eq!(config.max_inflight_ocr, 100);
        assert_eq!(config.budgets.transient, 10);
        assert_eq!(config.ocr_dpi, 72);
        assert_eq!(config.chunk_duration, Duration::from_secs(30));
        assert_eq!(config.ocr_page_retries, 2);
    }

    #[test]
    fn bool_parsing_accepts_common_forms() {
        let mut env = base_env();
        env.insert("OCR_ALLOW_EMPTY_PAGE_FALLBACK", "0");
        assert!(!config_from(&env).unwrap().ocr_allow_empty_page_fallback);
        env.insert("OCR_ALLOW_EMPTY_PAGE_FALLBACK", "TRUE");
        assert!(config_from(&env).unwrap().ocr_allow_empty_page_fallback);
    }

    #[test]
    fn retry_policies_honor_overrides() {
        let mut env = base_env();
        env.insert("WORKER_REDIS_RETRIES", "5");
        env.insert("WORKER_REDIS_BACKOFF_SEC", "0.3");
        env.insert("GCS_MAX_BACKOFF_SEC", "9");
        let config = config_from(&env).unwrap();
        assert_eq!(config.kv_retry.max_retries, 5);
        assert_eq!(config.kv_retry.base_delay, Duration::from_secs_f64(0.3));
        assert_eq!(config.blob_retry.max_delay, Duration::from_secs(9));
    }
}
