//! The session map and the read-only lookup handlers use.

use std::sync::Arc;

use {async_trait::async_trait, tokio::sync::RwLock};

use crate::{session::SessionBot, status::SessionStatus};

/// Read-only view of running sessions.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn session(&self, session_id: &str) -> Option<Arc<SessionBot>>;

    /// Status of every running session, in startup order.
    async fn statuses(&self) -> Vec<SessionStatus>;
}

/// Running sessions keyed by id, kept in insertion (startup) order.
#[derive(Clone, Default)]
pub struct SessionMap {
    inner: Arc<RwLock<Vec<(String, Arc<SessionBot>)>>>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced session keeps its position.
    pub async fn insert(&self, session_id: &str, bot: Arc<SessionBot>) {
        let mut inner = self.inner.write().await;
        match inner.iter_mut().find(|(id, _)| id == session_id) {
            Some(slot) => slot.1 = bot,
            None => inner.push((session_id.to_string(), bot)),
        }
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<SessionBot>> {
        let mut inner = self.inner.write().await;
        let index = inner.iter().position(|(id, _)| id == session_id)?;
        Some(inner.remove(index).1)
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionBot>> {
        self.inner
            .read()
            .await
            .iter()
            .find(|(id, _)| id == session_id)
            .map(|(_, bot)| Arc::clone(bot))
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.read().await.iter().any(|(id, _)| id == session_id)
    }

    /// Empty the map, returning the sessions in startup order.
    pub async fn drain(&self) -> Vec<(String, Arc<SessionBot>)> {
        std::mem::take(&mut *self.inner.write().await)
    }

    pub async fn ids(&self) -> Vec<String> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl SessionDirectory for SessionMap {
    async fn session(&self, session_id: &str) -> Option<Arc<SessionBot>> {
        self.get(session_id).await
    }

    async fn statuses(&self) -> Vec<SessionStatus> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(_, bot)| bot.status())
            .collect()
    }
}
