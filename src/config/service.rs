//! Service configuration: tiers, costs, worker and reaper settings.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;
use crate::core::scheduler::PriorityOrder;
use crate::util::serde::{Credits, GenerationType, Tier};

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "CREDIT_QUEUE_CONFIG";

/// Scheduling attributes of a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// Priority weight; lower is served first.
    pub priority: u8,
    /// Average processing time, used only for ETA display.
    pub avg_processing_secs: u64,
}

/// Tier to policy table.
pub type TierTable = BTreeMap<Tier, TierPolicy>;

/// Generation type to credit cost table.
pub type CostTable = BTreeMap<GenerationType, Credits>;

/// What the reaper does with a stale `processing` job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimPolicy {
    /// Refund and mark failed.
    #[default]
    Fail,
    /// Return to `pending` while attempts remain, then fail.
    Requeue,
}

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Jobs claimed per processing pass.
    pub batch_size: usize,
    /// Deadline for one generation call.
    pub generation_timeout_secs: u64,
    /// Refund write attempts before leaving the job to the reaper.
    pub refund_retry_attempts: u32,
    /// Linear backoff between refund attempts.
    pub refund_retry_backoff_ms: u64,
    /// Period of the background processing trigger.
    pub poll_interval_secs: u64,
    /// Start a processing pass after each accepted submission.
    pub kick_on_submit: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            generation_timeout_secs: 120,
            refund_retry_attempts: 3,
            refund_retry_backoff_ms: 200,
            poll_interval_secs: 10,
            kick_on_submit: true,
        }
    }
}

/// Stale job reaper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// A claim older than this is considered orphaned.
    pub max_age_secs: u64,
    /// Period of the background reaper.
    pub interval_secs: u64,
    /// Reclaim behaviour.
    pub policy: ReclaimPolicy,
    /// Claims allowed before a requeued job is failed for good.
    pub max_attempts: u32,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 600,
            interval_secs: 60,
            policy: ReclaimPolicy::Fail,
            max_attempts: 3,
        }
    }
}

/// Queue ordering settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Waiting time that earns one priority level; `None` keeps strict priority.
    pub aging_step_secs: Option<u64>,
}

impl SchedulerConfig {
    /// Ordering policy described by this config.
    pub fn order(&self) -> PriorityOrder {
        self.aging_step_secs
            .map_or_else(PriorityOrder::strict, |s| PriorityOrder::with_aging(Duration::from_secs(s)))
    }
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Opening balance for users the account store does not know.
    pub default_balance: Credits,
    /// Per-tier scheduling attributes.
    pub tiers: TierTable,
    /// Per-type credit costs.
    pub costs: CostTable,
    /// Worker settings.
    pub worker: WorkerConfig,
    /// Reaper settings.
    pub reaper: ReaperConfig,
    /// Ordering settings.
    pub scheduler: SchedulerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let tiers = [
            (Tier::PaidHigh, 1, 20),
            (Tier::PaidMid, 2, 30),
            (Tier::PaidLow, 3, 45),
            (Tier::Free, 4, 60),
        ]
        .into_iter()
        .map(|(tier, priority, avg_processing_secs)| {
            (
                tier,
                TierPolicy {
                    priority,
                    avg_processing_secs,
                },
            )
        })
        .collect();
        let costs = [
            (GenerationType::Text, 1),
            (GenerationType::Image, 3),
            (GenerationType::Video, 10),
        ]
        .into_iter()
        .collect();
        Self {
            default_balance: 0,
            tiers,
            costs,
            worker: WorkerConfig::default(),
            reaper: ReaperConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Validate config values.
    pub fn validate(&self) -> Result<(), String> {
        for tier in Tier::ALL {
            if !self.tiers.contains_key(&tier) {
                return Err(format!("tier `{tier}` has no policy"));
            }
        }
        if self.costs.is_empty() {
            return Err("at least one generation cost must be defined".into());
        }
        for (kind, cost) in &self.costs {
            if *cost <= 0 {
                return Err(format!("cost for `{kind}` must be greater than 0"));
            }
        }
        if self.worker.batch_size == 0 {
            return Err("batch_size must be greater than 0".into());
        }
        if self.worker.generation_timeout_secs == 0 {
            return Err("generation_timeout_secs must be greater than 0".into());
        }
        if self.worker.refund_retry_attempts == 0 {
            return Err("refund_retry_attempts must be greater than 0".into());
        }
        if self.worker.poll_interval_secs == 0 || self.reaper.interval_secs == 0 {
            return Err("background intervals must be greater than 0".into());
        }
        if self.reaper.max_age_secs <= self.worker.generation_timeout_secs {
            return Err("reaper max_age_secs must exceed generation_timeout_secs".into());
        }
        if self.reaper.max_attempts == 0 {
            return Err("reaper max_attempts must be greater than 0".into());
        }
        if self.scheduler.aging_step_secs == Some(0) {
            return Err("aging_step_secs must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the environment.
    ///
    /// Reads `.env` if present, then the JSON file named by
    /// `CREDIT_QUEUE_CONFIG` (defaults otherwise), then the
    /// `CREDIT_QUEUE_*` overrides.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading config file {}", path.display()))
    }

    /// Apply `CREDIT_QUEUE_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CREDIT_QUEUE_BATCH_SIZE") {
            self.worker.batch_size = v.parse().context("CREDIT_QUEUE_BATCH_SIZE")?;
        }
        if let Some(v) = lookup("CREDIT_QUEUE_DEFAULT_BALANCE") {
            self.default_balance = v.parse().context("CREDIT_QUEUE_DEFAULT_BALANCE")?;
        }
        if let Some(v) = lookup("CREDIT_QUEUE_GENERATION_TIMEOUT_SECS") {
            self.worker.generation_timeout_secs =
                v.parse().context("CREDIT_QUEUE_GENERATION_TIMEOUT_SECS")?;
        }
        if let Some(v) = lookup("CREDIT_QUEUE_STALE_AFTER_SECS") {
            self.reaper.max_age_secs = v.parse().context("CREDIT_QUEUE_STALE_AFTER_SECS")?;
        }
        Ok(())
    }

    /// Credit cost of a generation type, if configured.
    pub fn cost_of(&self, kind: GenerationType) -> Option<Credits> {
        self.costs.get(&kind).copied()
    }

    /// Generation call deadline.
    pub const fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.generation_timeout_secs)
    }

    /// Staleness horizon of the reaper.
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.reaper.max_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ServiceConfig::default().validate().is_ok());
    }

    #[test]
    fn reaper_horizon_must_exceed_generation_timeout() {
        let mut cfg = ServiceConfig::default();
        cfg.reaper.max_age_secs = cfg.worker.generation_timeout_secs;
        assert!(cfg.validate().unwrap_err().contains("max_age_secs"));
    }

    #[test]
    fn missing_tier_policy_is_rejected() {
        let mut cfg = ServiceConfig::default();
        cfg.tiers.remove(&Tier::Free);
        assert_eq!(cfg.validate().unwrap_err(), "tier `free` has no policy");
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = ServiceConfig::default();
        cfg.apply_env_overrides(|key| match key {
            "CREDIT_QUEUE_BATCH_SIZE" => Some("12".into()),
            "CREDIT_QUEUE_DEFAULT_BALANCE" => Some("25".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.worker.batch_size, 12);
        assert_eq!(cfg.default_balance, 25);
    }

    #[test]
    fn bad_env_override_is_an_error() {
        let mut cfg = ServiceConfig::default();
        let err = cfg
            .apply_env_overrides(|key| (key == "CREDIT_QUEUE_BATCH_SIZE").then(|| "lots".into()))
            .unwrap_err();
        assert!(err.to_string().contains("CREDIT_QUEUE_BATCH_SIZE"));
    }
}
