//! Configuration models for tiers, costs, workers and the reaper.

pub mod service;

pub use service::{
    CostTable, ReaperConfig, ReclaimPolicy, SchedulerConfig, ServiceConfig, TierPolicy, TierTable,
    WorkerConfig,
};
