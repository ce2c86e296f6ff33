//! Process-wide job configuration, read once from the environment.

use crate::JobError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_JOB_DURATION: &str = "48h";

/// What a recurring job does when its previous run is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConcurrencyPolicy {
    #[default]
    Allow,
    Forbid,
    Replace,
}

impl ConcurrencyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcurrencyPolicy::Allow => "Allow",
            ConcurrencyPolicy::Forbid => "Forbid",
            ConcurrencyPolicy::Replace => "Replace",
        }
    }

    /// Exact, case-sensitive match on the backend's spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Allow" => Some(ConcurrencyPolicy::Allow),
            "Forbid" => Some(ConcurrencyPolicy::Forbid),
            "Replace" => Some(ConcurrencyPolicy::Replace),
            _ => None,
        }
    }
}

/// Image pull policy for job containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullPolicy {
    Always,
    IfNotPresent,
    Never,
}

impl PullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullPolicy::Always => "Always",
            PullPolicy::IfNotPresent => "IfNotPresent",
            PullPolicy::Never => "Never",
        }
    }
}

/// Configuration shared by the backends and the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    /// Raw `MAX_JOB_DURATION`; parsed lazily so a bad value fails the task, not startup.
    pub max_job_duration: String,
    pub namespace: String,
    pub backoff_limit: i32,
    pub ttl_seconds_after_finished: i32,
    pub debug: bool,
    pub image_pull_secret: String,
    pub service_account: String,
    pub successful_jobs_history_limit: i32,
    pub failed_jobs_history_limit: i32,
    pub concurrency_policy: ConcurrencyPolicy,
    pub step_poll_interval: Duration,
    pub log_poll_interval: Duration,
    pub source_poll_interval: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_job_duration: DEFAULT_MAX_JOB_DURATION.to_string(),
            namespace: "default".to_string(),
            backoff_limit: 0,
            ttl_seconds_after_finished: 60,
            debug: false,
            image_pull_secret: "regcred".to_string(),
            service_account: "ff-coordinator-sa".to_string(),
            successful_jobs_history_limit: 2,
            failed_jobs_history_limit: 1,
            concurrency_policy: ConcurrencyPolicy::Allow,
            step_poll_interval: Duration::from_secs(30),
            log_poll_interval: Duration::from_secs(2),
            source_poll_interval: Duration::from_secs(1),
        }
    }
}

impl JobConfig {
    /// Read every setting from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let int = |key: &str, default: i32| match lookup(key) {
            None => default,
            Some(raw) => raw.trim().parse::<i32>().unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, default, "invalid integer in environment, using default");
                default
            }),
        };
        // Poll intervals must be positive; a zero interval would busy-loop.
        let interval = |key: &str, default: Duration| match lookup(key) {
            None => default,
            Some(raw) => match parse_duration(&raw) {
                Ok(d) if !d.is_zero() => d,
                Ok(_) => {
                    tracing::warn!(key, value = %raw, "poll interval must be positive, using default");
                    default
                }
                Err(e) => {
                    tracing::warn!(key, value = %raw, error = %e, "invalid duration in environment, using default");
                    default
                }
            },
        };
        let concurrency_policy = match lookup("JOBS_CONCURRENCY_POLICY") {
            None => defaults.concurrency_policy,
            Some(raw) => ConcurrencyPolicy::parse(raw.trim()).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "invalid concurrency policy, defaulting to Allow");
                ConcurrencyPolicy::Allow
            }),
        };
        Self {
            max_job_duration: lookup("MAX_JOB_DURATION").unwrap_or(defaults.max_job_duration),
            namespace: lookup("K8S_NAMESPACE").unwrap_or(defaults.namespace),
            backoff_limit: int("K8S_JOB_BACKOFF_LIMIT", defaults.backoff_limit),
            ttl_seconds_after_finished: int(
                "K8S_JOB_TTL_LIMIT_SECONDS",
                defaults.ttl_seconds_after_finished,
            ),
            debug: lookup("DEBUG")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
                .unwrap_or(defaults.debug),
            image_pull_secret: lookup("K8S_IMAGE_PULL_SECRET").unwrap_or(defaults.image_pull_secret),
            service_account: lookup("K8S_SERVICE_ACCOUNT_NAME").unwrap_or(defaults.service_account),
            successful_jobs_history_limit: int(
                "SUCCESSFUL_JOBS_HISTORY_LIMIT",
                defaults.successful_jobs_history_limit,
            ),
            failed_jobs_history_limit: int(
                "FAILED_JOBS_HISTORY_LIMIT",
                defaults.failed_jobs_history_limit,
            ),
            concurrency_policy,
            step_poll_interval: interval("EMR_STEP_POLL_INTERVAL", defaults.step_poll_interval),
            log_poll_interval: interval("EMR_LOG_POLL_INTERVAL", defaults.log_poll_interval),
            source_poll_interval: interval("SOURCE_POLL_INTERVAL", defaults.source_poll_interval),
        }
    }

    /// Parsed `MAX_JOB_DURATION`.
    pub fn max_job_duration(&self) -> Result<Duration, JobError> {
        parse_duration(&self.max_job_duration).map_err(|e| {
            JobError::internal(format!("could not parse MAX_JOB_DURATION: {}", e))
                .with_detail("max_job_duration", self.max_job_duration.clone())
        })
    }

    /// `Always` in debug mode so freshly pushed images are picked up.
    pub fn pull_policy(&self) -> PullPolicy {
        if self.debug {
            PullPolicy::Always
        } else {
            PullPolicy::IfNotPresent
        }
    }
}

/// Parse a duration such as `48h`, `1h30m`, `1.5s` or `250ms`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.starts_with('-') {
        return Err(format!("negative duration {:?}", input));
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration {:?}", input))?;
        if num_len == 0 {
            return Err(format!("invalid duration {:?}", input));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| format!("invalid duration {:?}", input))?;
        rest = &rest[num_len..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_secs = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, input)),
        };
        total += value * unit_secs;
        if !total.is_finite() {
            return Err(format!("duration {:?} is out of range", input));
        }
        rest = &rest[unit_len..];
    }
    Duration::try_from_secs_f64(total).map_err(|_| format!("duration {:?} is out of range", input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_backend_contract() {
        let cfg = JobConfig::default();
        assert_eq!(cfg.backoff_limit, 0);
        assert_eq!(cfg.ttl_seconds_after_finished, 60);
        assert_eq!(cfg.successful_jobs_history_limit, 2);
        assert_eq!(cfg.failed_jobs_history_limit, 1);
        assert_eq!(cfg.concurrency_policy, ConcurrencyPolicy::Allow);
        assert_eq!(cfg.pull_policy(), PullPolicy::IfNotPresent);
        assert_eq!(
            cfg.max_job_duration().unwrap(),
            Duration::from_secs(48 * 3600)
        );
    }

    #[test]
    fn lookup_overrides_and_falls_back() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("K8S_JOB_BACKOFF_LIMIT", "3"),
            ("K8S_JOB_TTL_LIMIT_SECONDS", "not-a-number"),
            ("JOBS_CONCURRENCY_POLICY", "Forbid"),
            ("DEBUG", "true"),
            ("EMR_LOG_POLL_INTERVAL", "500ms"),
        ]);
        let cfg = JobConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.backoff_limit, 3);
        assert_eq!(cfg.ttl_seconds_after_finished, 60);
        assert_eq!(cfg.concurrency_policy, ConcurrencyPolicy::Forbid);
        assert_eq!(cfg.pull_policy(), PullPolicy::Always);
        assert_eq!(cfg.log_poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn unknown_concurrency_policy_defaults_to_allow() {
        let cfg = JobConfig::from_lookup(|k| {
            (k == "JOBS_CONCURRENCY_POLICY").then(|| "Sometimes".to_string())
        });
        assert_eq!(cfg.concurrency_policy, ConcurrencyPolicy::Allow);
    }

    #[test]
    fn parse_duration_accepts_compound_values() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("2 days").is_err());
        assert!(parse_duration("-5m").is_err());
        assert!(parse_duration("5x").is_err());
    }

    #[test]
    fn overflowing_duration_is_rejected() {
        assert!(parse_duration("99999999999999999999999h").is_err());
        let cfg = JobConfig {
            max_job_duration: "99999999999999999999999h".into(),
            ..JobConfig::default()
        };
        assert_eq!(cfg.max_job_duration().unwrap_err().kind(), crate::ErrorKind::Internal);
    }

    #[test]
    fn zero_or_overflowing_poll_intervals_keep_defaults() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("EMR_LOG_POLL_INTERVAL", "0"),
            ("EMR_STEP_POLL_INTERVAL", "0s"),
            ("SOURCE_POLL_INTERVAL", "99999999999999999999999h"),
        ]);
        let cfg = JobConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        let defaults = JobConfig::default();
        assert_eq!(cfg.log_poll_interval, defaults.log_poll_interval);
        assert_eq!(cfg.step_poll_interval, defaults.step_poll_interval);
        assert_eq!(cfg.source_poll_interval, defaults.source_poll_interval);
    }

    #[test]
    fn bad_max_job_duration_is_internal_error() {
        let cfg = JobConfig {
            max_job_duration: "forever".into(),
            ..JobConfig::default()
        };
        let err = cfg.max_job_duration().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Internal);
        assert_eq!(err.detail("max_job_duration"), Some("forever"));
    }
}
