use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{SyncEngine, SyncError, SyncOutcome};

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Delay before the startup run, so the rest of the service can settle.
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// Owns the background sync task. Dropping the handle stops the timer.
pub struct SchedulerHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signals the loop and waits for it to exit. A run already under way finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let SchedulerHandle { shutdown, task } = self;
        drop(shutdown);
        if let Err(e) = task.await {
            warn!("Sync scheduler task ended abnormally: {e}");
        }
    }
}

pub fn spawn(engine: Arc<SyncEngine>, config: SchedulerConfig) -> SchedulerHandle {
    let (shutdown, rx) = broadcast::channel(1);
    let task = tokio::spawn(run_loop(engine, config, rx));
    SchedulerHandle { shutdown, task }
}

async fn run_loop(
    engine: Arc<SyncEngine>,
    config: SchedulerConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let started = Instant::now();
    info!(
        "Sync scheduler started (first run in {:?}, then every {:?})",
        config.initial_delay, config.interval
    );

    tokio::select! {
        _ = shutdown.recv() => {
            info!("Sync scheduler stopped");
            return;
        }
        _ = tokio::time::sleep(config.initial_delay) => tick(&engine, "startup").await,
    }

    let mut ticker = interval_at(started + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => tick(&engine, "periodic").await,
        }
    }
    info!("Sync scheduler stopped");
}

async fn tick(engine: &SyncEngine, source: &str) {
    if !engine.is_enabled() {
        debug!("Auto-sync disabled, skipping {source} run");
        return;
    }
    if engine.is_running() {
        debug!("Sync already running, skipping {source} run");
        return;
    }
    match engine.run_sync().await {
        Ok(SyncOutcome::Synced(report)) => {
            debug!("{source} sync finished: {} uploaded", report.uploaded)
        }
        Ok(SyncOutcome::Offline) => debug!("{source} sync skipped: offline"),
        Err(SyncError::AlreadyRunning) => debug!("{source} sync lost the race to another run"),
        Err(e) => warn!("{source} sync failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LocalStore, MemoryStore, USERNAME_KEY};
    use crate::sync::engine::tests::FakeBackend;

    fn engine(backend: Arc<FakeBackend>) -> Arc<SyncEngine> {
        let store = Arc::new(MemoryStore::new());
        store.set(USERNAME_KEY, "hanako").unwrap();
        Arc::new(SyncEngine::new(Some(backend), store, None))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_after_initial_delay_then_every_interval() {
        let backend = Arc::new(FakeBackend::new());
        let engine = engine(backend.clone());
        let handle = spawn(engine.clone(), SchedulerConfig::default());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(engine.status().runs, 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(engine.status().runs, 1);

        // t = 4s; periodic ticks land at 300s and 600s
        tokio::time::sleep(Duration::from_secs(295)).await;
        assert_eq!(engine.status().runs, 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(engine.status().runs, 2);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(engine.status().runs, 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_engine_is_not_run() {
        let backend = Arc::new(FakeBackend::new());
        let engine = engine(backend.clone());
        engine.set_enabled(false).unwrap();
        let handle = spawn(engine.clone(), SchedulerConfig::default());

        tokio::time::sleep(Duration::from_secs(11 * 60)).await;
        assert_eq!(engine.status().runs, 0);

        engine.set_enabled(true).unwrap();
        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(engine.status().runs, 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_the_timer() {
        let backend = Arc::new(FakeBackend::new());
        let engine = engine(backend.clone());
        let handle = spawn(engine.clone(), SchedulerConfig::default());

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert_eq!(engine.status().runs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_the_timer() {
        let backend = Arc::new(FakeBackend::new());
        let engine = engine(backend.clone());
        drop(spawn(engine.clone(), SchedulerConfig::default()));

        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert_eq!(engine.status().runs, 0);
    }
}
