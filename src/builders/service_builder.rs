//! Builder wiring a [`QueueService`] from configuration and adapters.

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::core::accounts::AccountStore;
use crate::core::audit::{AuditSink, AuditTrail};
use crate::core::error::QueueError;
use crate::core::executor::GenerationService;
use crate::core::store::QueueStore;
use crate::infra::accounts::InMemoryAccountStore;
use crate::runtime::api::QueueService;
use crate::runtime::tokio_spawner::TokioSpawner;
use crate::util::clock::{Clock, SystemClock};

/// Collects the adapters of a [`QueueService`].
///
/// Defaults: [`ServiceConfig::default`], an empty account store, the system
/// clock, no audit sink and the spawner of the current tokio runtime.
pub struct ServiceBuilder<S: ?Sized, G: ?Sized> {
    store: Arc<S>,
    generator: Arc<G>,
    config: ServiceConfig,
    accounts: Option<Arc<dyn AccountStore>>,
    clock: Option<Arc<dyn Clock>>,
    audit: AuditTrail,
    spawner: Option<TokioSpawner>,
}

impl<S, G> ServiceBuilder<S, G>
where
    S: QueueStore + ?Sized + 'static,
    G: GenerationService + ?Sized,
{
    /// Start from a store and a generation backend.
    pub fn new(store: Arc<S>, generator: Arc<G>) -> Self {
        Self {
            store,
            generator,
            config: ServiceConfig::default(),
            accounts: None,
            clock: None,
            audit: AuditTrail::disabled(),
            spawner: None,
        }
    }

    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Source of tiers and opening balances.
    #[must_use]
    pub fn accounts(mut self, accounts: Arc<dyn AccountStore>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Time source for every timestamp.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Record audit events to `sink`.
    #[must_use]
    pub fn audit(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.audit = AuditTrail::new(sink);
        self
    }

    /// Record audit events through an existing trail.
    #[must_use]
    pub fn audit_trail(mut self, trail: AuditTrail) -> Self {
        self.audit = trail;
        self
    }

    /// Runtime for the processing kick after each submission.
    #[must_use]
    pub fn spawner(mut self, spawner: TokioSpawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Validate the config and assemble the service.
    pub fn build(self) -> Result<QueueService<S, G>, QueueError> {
        self.config
            .validate()
            .map_err(|e| QueueError::InvalidConfig(format!("config invalid: {e}")))?;
        let accounts = self
            .accounts
            .unwrap_or_else(|| Arc::new(InMemoryAccountStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let spawner = self.spawner.or_else(TokioSpawner::current);
        Ok(QueueService::assemble(
            self.config,
            self.store,
            accounts,
            self.generator,
            clock,
            self.audit,
            spawner,
        ))
    }
}
