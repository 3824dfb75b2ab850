//! Tests for configuration loading and validation

use std::time::Duration;

use prometheus_credit_queue::config::{ReclaimPolicy, ServiceConfig};
use prometheus_credit_queue::util::{GenerationType, Tier};

#[test]
fn test_default_tables() {
    let cfg = ServiceConfig::default();
    assert_eq!(cfg.cost_of(GenerationType::Text), Some(1));
    assert_eq!(cfg.cost_of(GenerationType::Image), Some(3));
    assert_eq!(cfg.cost_of(GenerationType::Video), Some(10));
    assert!(cfg.tiers[&Tier::PaidHigh].priority < cfg.tiers[&Tier::Free].priority);
    assert_eq!(cfg.reaper.policy, ReclaimPolicy::Fail);
    assert!(cfg.scheduler.order().is_strict());
}

#[test]
fn test_partial_json_keeps_defaults() {
    let cfg = ServiceConfig::from_json_str(
        r#"{
            "default_balance": 15,
            "worker": { "batch_size": 8 },
            "reaper": { "policy": "requeue", "max_attempts": 4 },
            "scheduler": { "aging_step_secs": 90 }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.default_balance, 15);
    assert_eq!(cfg.worker.batch_size, 8);
    assert_eq!(cfg.worker.generation_timeout_secs, 120);
    assert_eq!(cfg.reaper.policy, ReclaimPolicy::Requeue);
    assert_eq!(cfg.reaper.max_attempts, 4);
    assert!(!cfg.scheduler.order().is_strict());
    assert_eq!(cfg.generation_timeout(), Duration::from_secs(120));
    assert_eq!(cfg.stale_after(), Duration::from_secs(600));
}

#[test]
fn test_json_costs_replace_table() {
    let cfg = ServiceConfig::from_json_str(r#"{ "costs": { "text": 2 } }"#).unwrap();
    assert_eq!(cfg.cost_of(GenerationType::Text), Some(2));
    assert_eq!(cfg.cost_of(GenerationType::Video), None);
}

#[test]
fn test_invalid_json_is_reported() {
    let err = ServiceConfig::from_json_str("{ not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_zero_cost_is_rejected() {
    let err = ServiceConfig::from_json_str(r#"{ "costs": { "image": 0 } }"#).unwrap_err();
    assert!(err.contains("image"));
}

#[test]
fn test_zero_aging_step_is_rejected() {
    let err = ServiceConfig::from_json_str(r#"{ "scheduler": { "aging_step_secs": 0 } }"#)
        .unwrap_err();
    assert!(err.contains("aging_step_secs"));
}

#[test]
fn test_from_file() {
    let path = std::env::temp_dir().join(format!("credit-queue-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, r#"{ "default_balance": 42 }"#).unwrap();
    let cfg = ServiceConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(cfg.default_balance, 42);
}

#[test]
fn test_missing_file_names_the_path() {
    let err = ServiceConfig::from_file(std::path::Path::new("/nonexistent/credit-queue.json"))
        .unwrap_err();
    assert!(format!("{err:#}").contains("credit-queue.json"));
}
