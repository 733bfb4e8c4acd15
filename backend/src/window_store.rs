use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use market::feed::FeedTick;
use market::rolling_window::RollingWindow;
use market::{EntityId, Statistics};

/// Rolling price history per instrument, shared by the feed pump (writer)
/// and the statistics worker (reader).
#[derive(Clone)]
pub struct WindowStore {
    inner: Arc<RwLock<HashMap<EntityId, RollingWindow>>>,
    max_age_ms: u64,
}

impl WindowStore {
    pub fn new(max_age_ms: u64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            max_age_ms,
        }
    }

    /// Appends one tick to its instrument's window, creating the window on first use.
    pub async fn push(&self, tick: &FeedTick) {
        let mut g = self.inner.write().await;
        g.entry(tick.entity.clone())
            .or_insert_with(|| RollingWindow::new(self.max_age_ms))
            .push(tick.ts_ms, tick.snapshot);
    }

    pub async fn statistics(&self, id: &EntityId) -> Option<Statistics> {
        let g = self.inner.read().await;
        g.get(id).and_then(RollingWindow::statistics)
    }

    /// Log returns of the instrument's window, oldest first.
    pub async fn returns(&self, id: &EntityId) -> Vec<f64> {
        let g = self.inner.read().await;
        g.get(id).map(RollingWindow::returns).unwrap_or_default()
    }

    pub async fn len(&self, id: &EntityId) -> usize {
        let g = self.inner.read().await;
        g.get(id).map_or(0, RollingWindow::len)
    }
}
