//! Shared fixtures for the integration tests.

#![allow(dead_code, missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use prometheus_credit_queue::builders::ServiceBuilder;
use prometheus_credit_queue::config::ServiceConfig;
use prometheus_credit_queue::core::{
    AuditAction, GenerationError, GenerationOutput, GenerationRequest, GenerationService,
    InMemoryAuditSink,
};
use prometheus_credit_queue::infra::{InMemoryAccountStore, InMemoryStore};
use prometheus_credit_queue::runtime::{QueueService, SubmissionRequest};
use prometheus_credit_queue::util::{ManualClock, Tier};

/// Epoch the manual clock starts at.
pub const START_MS: u64 = 1_700_000_000_000;

// ============================================================================
// GENERATION BACKEND DOUBLE
// ============================================================================

/// Backend driven by the prompt: `fail...` errors, `hang...` never answers,
/// anything else succeeds with `memory://<job id>`.
#[derive(Default)]
pub struct PromptBackend {
    calls: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl PromptBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering so concurrent passes overlap.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            delay: Some(delay),
        }
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl GenerationService for PromptBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, GenerationError> {
        self.calls.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if request.prompt.starts_with("hang") {
            std::future::pending::<()>().await;
        }
        if request.prompt.starts_with("fail") {
            return Err(GenerationError::Backend("model overloaded".into()));
        }
        Ok(GenerationOutput {
            result_ref: format!("memory://{}", request.job_id),
        })
    }
}

// ============================================================================
// HARNESS
// ============================================================================

pub struct Harness {
    pub service: QueueService<InMemoryStore, PromptBackend>,
    pub store: Arc<InMemoryStore>,
    pub backend: Arc<PromptBackend>,
    pub clock: ManualClock,
    pub audit: Arc<Mutex<InMemoryAuditSink>>,
}

impl Harness {
    pub fn audit_actions(&self) -> Vec<AuditAction> {
        self.audit.lock().events().iter().map(|e| e.action).collect()
    }
}

/// Defaults with the submission kick off and a short refund backoff.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.worker.kick_on_submit = false;
    config.worker.refund_retry_backoff_ms = 1;
    config
}

pub fn harness(config: ServiceConfig, accounts: InMemoryAccountStore) -> Harness {
    harness_with_backend(config, accounts, PromptBackend::new())
}

pub fn harness_with_backend(
    config: ServiceConfig,
    accounts: InMemoryAccountStore,
    backend: PromptBackend,
) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let backend = Arc::new(backend);
    let clock = ManualClock::new(START_MS);
    let audit = Arc::new(Mutex::new(InMemoryAuditSink::new(1_000)));
    let service = ServiceBuilder::new(Arc::clone(&store), Arc::clone(&backend))
        .config(config)
        .accounts(Arc::new(accounts))
        .clock(Arc::new(clock.clone()))
        .audit(Box::new(Arc::clone(&audit)))
        .build()
        .expect("valid test config");
    Harness {
        service,
        store,
        backend,
        clock,
        audit,
    }
}

pub fn request(user: &str, kind: &str, prompt: &str) -> SubmissionRequest {
    SubmissionRequest {
        user_id: user.into(),
        user_tier: None,
        generation_type: kind.into(),
        prompt: prompt.into(),
        input_params: serde_json::json!({ "quality": "standard" }),
        project_context: None,
    }
}

pub fn request_as(user: &str, tier: Tier, kind: &str, prompt: &str) -> SubmissionRequest {
    SubmissionRequest {
        user_tier: Some(tier),
        ..request(user, kind, prompt)
    }
}
