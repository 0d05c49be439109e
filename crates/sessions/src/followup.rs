//! Deferred per-session tasks that die with their session.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use {tokio_util::sync::CancellationToken, tracing::debug};

/// Tracks delayed follow-up replies keyed by session id.
///
/// A session must be armed before it can schedule anything. Each armed
/// session gets a parent token and every scheduled task runs under a child
/// of it. Cancelling a session keeps its cancelled parent in place, so
/// nothing can be scheduled for it until it is armed again.
#[derive(Clone, Default)]
pub struct FollowUps {
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl FollowUps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept follow-ups for `session_id`, replacing any cancelled parent.
    pub fn arm(&self, session_id: &str) {
        let previous = self
            .tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id.to_string(), CancellationToken::new());
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Run `task` after `delay` unless the session is cancelled first.
    ///
    /// Returns `false` and drops `task` when the session is not armed.
    pub fn schedule<F>(&self, session_id: &str, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self
            .tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .filter(|parent| !parent.is_cancelled())
            .map(CancellationToken::child_token);
        let Some(token) = token else {
            debug!(session_id, "session not armed, follow-up dropped");
            return false;
        };
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(session_id = %session_id, "follow-up cancelled");
                },
                _ = tokio::time::sleep(delay) => task.await,
            }
        });
        true
    }

    /// Cancel everything pending for `session_id`.
    pub fn cancel(&self, session_id: &str) {
        if let Some(token) = self
            .tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
        {
            token.cancel();
        }
    }

    pub fn cancel_all(&self) {
        for token in self
            .tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
        {
            token.cancel();
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    fn counter_task(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let follow_ups = FollowUps::new();
        let fired = Arc::new(AtomicUsize::new(0));
        follow_ups.arm("s1");
        assert!(follow_ups.schedule("s1", Duration::from_secs(10), counter_task(&fired)));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_only_affects_one_session() {
        let follow_ups = FollowUps::new();
        let fired = Arc::new(AtomicUsize::new(0));
        follow_ups.arm("s1");
        follow_ups.arm("s2");
        follow_ups.schedule("s1", Duration::from_secs(10), counter_task(&fired));
        follow_ups.schedule("s2", Duration::from_secs(10), counter_task(&fired));
        tokio::task::yield_now().await;

        follow_ups.cancel("s1");
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unarmed_session_cannot_schedule() {
        let follow_ups = FollowUps::new();
        let fired = Arc::new(AtomicUsize::new(0));
        assert!(!follow_ups.schedule("s1", Duration::from_secs(1), counter_task(&fired)));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_after_cancel_is_refused() {
        let follow_ups = FollowUps::new();
        let fired = Arc::new(AtomicUsize::new(0));
        follow_ups.arm("s1");
        follow_ups.arm("s2");
        follow_ups.cancel("s1");
        follow_ups.cancel_all();

        assert!(!follow_ups.schedule("s1", Duration::from_secs(1), counter_task(&fired)));
        assert!(!follow_ups.schedule("s2", Duration::from_secs(1), counter_task(&fired)));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearmed_session_schedules_again() {
        let follow_ups = FollowUps::new();
        let fired = Arc::new(AtomicUsize::new(0));
        follow_ups.arm("s1");
        follow_ups.schedule("s1", Duration::from_secs(10), counter_task(&fired));
        follow_ups.cancel_all();
        follow_ups.arm("s1");
        assert!(follow_ups.schedule("s1", Duration::from_secs(10), counter_task(&fired)));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
