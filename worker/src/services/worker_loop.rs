use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::usecases::sale_discovery::{CycleSummary, SaleDiscoveryUseCase};

/// Polling loop around [`SaleDiscoveryUseCase::run_cycle`]: one cycle right away, then one
/// per interval. `stop` cancels the timer and waits for an in-flight cycle to finish.
pub struct SaleDiscoveryWorker {
    usecase: Arc<SaleDiscoveryUseCase>,
    interval: Duration,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SaleDiscoveryWorker {
    pub fn new(usecase: Arc<SaleDiscoveryUseCase>, interval: Duration) -> Self {
        Self {
            usecase,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            warn!("worker_loop: start called twice, ignoring");
            return;
        }

        let usecase = Arc::clone(&self.usecase);
        let running = Arc::clone(&self.running);
        let cancel = self.cancel.clone();
        let interval = self.interval;

        info!(interval_secs = interval.as_secs(), "worker_loop: started");
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        run_guarded(&usecase, &running).await;
                    }
                }
            }

            info!("worker_loop: stopped");
        }));
    }

    /// Safe to call at any time, including before `start` and more than once.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "worker_loop: task ended abnormally");
            }
        }
    }

    /// Runs a cycle now unless one is already in flight.
    pub async fn run_once(&self) -> Option<CycleSummary> {
        run_guarded(&self.usecase, &self.running).await
    }

    pub fn is_running_cycle(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Clears the in-flight flag when dropped, including when the cycle panics.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn run_guarded(
    usecase: &SaleDiscoveryUseCase,
    running: &AtomicBool,
) -> Option<CycleSummary> {
    if running
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        warn!("worker_loop: previous cycle still running, skipping");
        return None;
    }
    let _guard = RunningGuard(running);

    match usecase.run_cycle(Utc::now()).await {
        Ok(summary) => Some(summary),
        Err(err) => {
            error!(error = %err, "worker_loop: cycle failed");
            None
        }
    }
}
