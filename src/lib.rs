//! # Prometheus Credit Queue
//!
//! Credit-ledger admission control and priority scheduling for AI generation
//! jobs (text, images, video).
//!
//! The crate sits between users requesting generated content and the
//! generation backends. It decides whether a request may run (the user's
//! prepaid balance covers it), in what order it runs (tier priority, FIFO
//! within a tier, optional aging) and guarantees that nobody pays for work
//! that was not performed.
//!
//! ## Components
//!
//! - **Credit Ledger**: append-only balance history; the balance is always the
//!   newest entry's `balance_after`.
//! - **Admission Controller**: prices a request, debits it and enqueues it as
//!   one unit, or rejects it with no side effects.
//! - **Priority Scheduler**: dequeue order and user-visible position/ETA.
//! - **Worker Pool**: claims a batch with compare-and-swap, calls the
//!   generation backend under a timeout, completes or refunds.
//! - **Stale Job Reaper**: settles jobs whose worker vanished mid-run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_credit_queue::builders::ServiceBuilder;
//! use prometheus_credit_queue::infra::{InMemoryAccountStore, InMemoryStore};
//! use prometheus_credit_queue::runtime::SubmissionRequest;
//! use prometheus_credit_queue::util::Tier;
//!
//! let accounts = InMemoryAccountStore::new().with_account("alice", Tier::PaidMid, 50);
//! let service = ServiceBuilder::new(Arc::new(InMemoryStore::new()), Arc::new(my_backend))
//!     .accounts(Arc::new(accounts))
//!     .build()?;
//!
//! let admitted = service.submit(SubmissionRequest {
//!     user_id: "alice".into(),
//!     user_tier: None,
//!     generation_type: "image".into(),
//!     prompt: "a lighthouse at dusk".into(),
//!     input_params: serde_json::json!({ "size": "1024x1024" }),
//!     project_context: None,
//! })?;
//! println!("queued at position {}", admitted.position);
//!
//! // Timer-driven or external trigger; safe to overlap.
//! let report = service.trigger_processing(None).await?;
//! ```
//!
//! For complete scenarios, see `tests/service_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Ledger, admission, scheduling, processing and reaping.
pub mod core;
/// Configuration models for tiers, costs, workers and the reaper.
pub mod config;
/// Builders to construct the service from configuration.
pub mod builders;
/// Infrastructure adapters for storage and accounts.
pub mod infra;
/// Service facade, background loops and the tokio spawner.
pub mod runtime;
/// Shared utilities.
pub mod util;
