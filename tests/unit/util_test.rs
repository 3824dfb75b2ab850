//! Tests for utility types

use prometheus_credit_queue::util::{Clock, GenerationType, ManualClock, SystemClock, Tier};

#[test]
fn test_generation_type_parsing() {
    assert_eq!("image".parse::<GenerationType>().unwrap(), GenerationType::Image);
    assert_eq!(" Video ".parse::<GenerationType>().unwrap(), GenerationType::Video);
    let err = "gif".parse::<GenerationType>().unwrap_err();
    assert_eq!(err.to_string(), "unknown generation type `gif`");
    let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
    assert!(boxed.source().is_none());
}

#[test]
fn test_tier_wire_names() {
    assert_eq!(serde_json::to_string(&Tier::PaidHigh).unwrap(), "\"paid_high\"");
    let tier: Tier = serde_json::from_str("\"free\"").unwrap();
    assert_eq!(tier, Tier::Free);
    assert_eq!(Tier::PaidLow.to_string(), "paid_low");
}

#[test]
fn test_tier_list_starts_with_highest() {
    assert_eq!(Tier::ALL[0], Tier::PaidHigh);
    assert_eq!(Tier::ALL.len(), 4);
}

#[test]
fn test_manual_clock_advances() {
    let clock = ManualClock::new(5_000);
    clock.advance_ms(250);
    assert_eq!(clock.now_ms(), 5_250);
    clock.advance_secs(1);
    assert_eq!(clock.now_ms(), 6_250);
}

#[test]
fn test_system_clock_is_epoch_millis() {
    // 2020-01-01T00:00:00Z
    assert!(SystemClock.now_ms() > 1_577_836_800_000);
}

#[test]
fn test_init_tracing_is_idempotent() {
    prometheus_credit_queue::util::init_tracing("prometheus_credit_queue=debug");
    prometheus_credit_queue::util::init_tracing("prometheus_credit_queue=info");
    tracing::info!("tracing initialised twice without panicking");
}
