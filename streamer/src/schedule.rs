use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

/// Single-flight trailing debouncer.
///
/// The first event of a burst arms a timer; later events while armed are
/// dropped. When the window elapses the task runs once, so it observes the
/// state at execution time rather than at the first event.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    armed: Arc<AtomicBool>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            armed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Returns `true` when this call armed a new timer.
    pub fn schedule<F, Fut>(&self, task: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.armed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("debounced task dropped: no async runtime");
            self.armed.store(false, Ordering::Release);
            return false;
        };

        let armed = Arc::clone(&self.armed);
        let window = self.window;
        runtime.spawn(async move {
            tokio::time::sleep(window).await;
            armed.store(false, Ordering::Release);
            task().await;
        });
        true
    }
}

/// Waits for every task in the set, successful or not.
pub async fn settle_all<T: 'static>(mut tasks: JoinSet<T>) -> Vec<T> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => tracing::error!("tile task aborted: {err}"),
        }
    }
    outcomes
}
