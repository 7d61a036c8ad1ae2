//! Timestamped page captures per monitored URL.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{CaptureRole, HtmlSnapshot, NewSnapshot, UrlId};
use crate::normalize::normalize;
use crate::pipeline::hash_body;
use crate::storage::Store;

pub struct SnapshotCatalog<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> SnapshotCatalog<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Stores a new immutable capture. The body is normalized before storage.
    pub fn record(
        &self,
        url_id: UrlId,
        role: CaptureRole,
        text: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<HtmlSnapshot> {
        if text.is_empty() {
            return Err(Error::validation("snapshot text is empty"));
        }
        let body = normalize(text).into_owned();
        let snapshot = NewSnapshot {
            url_id,
            role,
            body_hash: hash_body(&body),
            body,
            captured_at,
        };
        let stored = self.store.persist_snapshot(&snapshot)?;
        tracing::debug!(
            url_id = %url_id,
            snapshot_id = %stored.id,
            role = %role,
            "recorded snapshot"
        );
        Ok(stored)
    }

    /// Like [`record`](Self::record) with the role given as text.
    pub fn record_str(
        &self,
        url_id: UrlId,
        role: &str,
        text: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<HtmlSnapshot> {
        let role: CaptureRole = role.parse()?;
        self.record(url_id, role, text, captured_at)
    }

    pub fn find_latest(&self, url_id: UrlId, role: CaptureRole) -> Result<Option<HtmlSnapshot>> {
        self.store.latest_snapshot(url_id, role)
    }

    pub fn find_all(&self, url_id: UrlId) -> Result<Vec<HtmlSnapshot>> {
        let mut snapshots = self.store.list_snapshots(url_id)?;
        snapshots.sort_by_key(|s| (s.captured_at, s.id));
        Ok(snapshots)
    }
}

/// In-memory counterpart of [`Store::latest_snapshot`]: greatest capture
/// time for `role`, ties go to the higher id.
pub fn select_latest(snapshots: &[HtmlSnapshot], role: CaptureRole) -> Option<&HtmlSnapshot> {
    snapshots
        .iter()
        .filter(|s| s.role == role)
        .max_by_key(|s| (s.captured_at, s.id))
}
