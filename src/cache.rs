use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::models::Snapshot;

/// True once `fetched_at` is at least `freshness` old. Clock skew that puts
/// `fetched_at` in the future also counts as stale.
pub fn is_stale(fetched_at: DateTime<Utc>, now: DateTime<Utc>, freshness: Duration) -> bool {
    let age = now - fetched_at;
    age < Duration::zero() || age >= freshness
}

/// Single-slot cache holding the last fetched snapshot.
#[derive(Debug)]
pub struct SnapshotCache {
    freshness: Duration,
    slot: Option<Arc<Snapshot>>,
}

impl SnapshotCache {
    pub fn new(freshness: Duration) -> Self {
        Self {
            freshness,
            slot: None,
        }
    }

    pub fn cached(&self, now: DateTime<Utc>) -> Option<Arc<Snapshot>> {
        self.slot
            .as_ref()
            .filter(|snapshot| !is_stale(snapshot.fetched_at, now, self.freshness))
            .cloned()
    }

    /// Returns the cached snapshot while fresh, otherwise awaits `fetch` and
    /// stores its result. A failed fetch is returned as-is and never replaced
    /// by older data.
    pub async fn get_or_fetch<F, Fut, E>(
        &mut self,
        now: DateTime<Utc>,
        fetch: F,
    ) -> Result<Arc<Snapshot>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Snapshot, E>>,
    {
        if let Some(snapshot) = self.cached(now) {
            tracing::debug!(snapshot = %snapshot.id, "reusing cached snapshot");
            return Ok(snapshot);
        }

        let snapshot = Arc::new(fetch().await?);
        tracing::info!(
            snapshot = %snapshot.id,
            population = snapshot.population.len(),
            events = snapshot.events.len(),
            "fetched fresh snapshot"
        );
        self.slot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn invalidate(&mut self) {
        if self.slot.take().is_some() {
            tracing::info!("snapshot cache invalidated");
        }
    }
}
