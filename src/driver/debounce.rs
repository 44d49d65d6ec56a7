//! Trailing-edge debouncing of evaluation requests.

use std::{future::Future, time::Duration};

use tokio::task::JoinHandle;
use tracing::trace;

/// Coalesces bursts of requests: only the last one scheduled within `delay` fires.
///
/// Once a timer has fired its task runs detached, so a later `schedule` never
/// cancels a cycle that is already running.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn schedule<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!("debounce timer fired");
            tokio::spawn(task);
        }));
    }

    /// Drop the pending request, if its timer has not fired yet.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test(start_paused = true)]
    async fn test_only_latest_request_fires() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut debouncer = Debouncer::new(Duration::from_millis(300));

        for i in 0..3 {
            let fired = fired.clone();
            debouncer.schedule(async move {
                fired.lock().unwrap().push(i);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(debouncer.is_pending());
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*fired.lock().unwrap(), vec![2]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_requests_each_fire() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut debouncer = Debouncer::new(Duration::from_millis(50));

        for i in 0..2 {
            let fired = fired.clone();
            debouncer.schedule(async move {
                fired.lock().unwrap().push(i);
            });
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert_eq!(*fired.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_does_not_cancel_running_task() {
        let done = Arc::new(Mutex::new(false));
        let mut debouncer = Debouncer::new(Duration::from_millis(10));

        let flag = done.clone();
        debouncer.schedule(async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            *flag.lock().unwrap() = true;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        debouncer.schedule(async {});
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(*done.lock().unwrap());
    }
}
