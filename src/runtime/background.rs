//! Timer-driven processing and reaper loops.
//!
//! These tickers are what keeps the queue moving; the kick after each
//! submission only shortens the wait.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::executor::GenerationService;
use crate::core::store::QueueStore;
use crate::runtime::api::QueueService;
use crate::runtime::tokio_spawner::TokioSpawner;

/// Running background loops.
pub struct BackgroundHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundHandle {
    /// Signal both loops to stop and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "background loop ended abnormally");
            }
        }
        info!("background loops stopped");
    }
}

/// Start the processing ticker and the reaper ticker on `spawner`.
pub fn start_background<S, G>(service: &QueueService<S, G>, spawner: &TokioSpawner) -> BackgroundHandle
where
    S: QueueStore + ?Sized + 'static,
    G: GenerationService + ?Sized,
{
    let (shutdown, _) = watch::channel(false);
    let poll = Duration::from_secs(service.config().worker.poll_interval_secs);
    let reap = Duration::from_secs(service.config().reaper.interval_secs);

    let processing = {
        let service = service.clone();
        let stop = shutdown.subscribe();
        spawner.spawn(tick_until_stopped(poll, stop, move || {
            let service = service.clone();
            async move {
                match service.trigger_processing(None).await {
                    Ok(report) => debug!(processed = report.processed, "scheduled processing pass"),
                    Err(err) => warn!(error = %err, "scheduled processing pass failed"),
                }
            }
        }))
    };
    let reaper = {
        let service = service.clone();
        let stop = shutdown.subscribe();
        spawner.spawn(tick_until_stopped(reap, stop, move || {
            let service = service.clone();
            async move {
                if let Err(err) = service.cleanup_stale() {
                    warn!(error = %err, "scheduled reaper pass failed");
                }
            }
        }))
    };
    info!(poll_secs = poll.as_secs(), reap_secs = reap.as_secs(), "background loops started");

    BackgroundHandle {
        shutdown,
        tasks: vec![processing, reaper],
    }
}

async fn tick_until_stopped<F, Fut>(period: Duration, mut stop: watch::Receiver<bool>, mut pass: F)
where
    F: FnMut() -> Fut + Send,
    Fut: std::future::Future<Output = ()> + Send,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    while !*stop.borrow() {
        tokio::select! {
            _ = ticker.tick() => pass().await,
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
