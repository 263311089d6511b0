//! Uniform `Worker` abstraction (§9 redesign: "background goroutines with
//! ad-hoc stop channels" become one `Start`/`Stop` shape with a bounded
//! shutdown handshake). Every artifact lifecycle job (§4.6) is one `Worker`.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// A named, ticker-driven background task: runs its tick function once at
/// startup, then on every tick, until told to stop. `Stop` blocks until the
/// task has observed the shutdown signal and exited.
pub struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl Worker {
    /// Spawn a worker that calls `tick` immediately, then every `interval`,
    /// until `Stop` is called or the sender is dropped.
    pub fn spawn<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            tick().await;
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // the interval's first tick fires immediately; skip it, already ran above.
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        info!(worker = name, "worker shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        tick().await;
                    }
                }
            }
        });
        Self { name, handle, shutdown_tx }
    }

    /// Signal shutdown and wait for the task to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(err) = self.handle.await {
            tracing::warn!(worker = self.name, %err, "worker task panicked during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn runs_once_at_startup_before_first_tick() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let worker = Worker::spawn("test-worker", Duration::from_secs(3600), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        worker.stop().await;
    }

    #[tokio::test]
    async fn stop_waits_for_task_exit() {
        let worker = Worker::spawn("test-worker", Duration::from_secs(3600), || async {});
        worker.stop().await;
    }
}
