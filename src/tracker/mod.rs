use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::catalog::SnapshotCatalog;
use crate::error::{Error, Result};
use crate::models::{
    CaptureRole, DiffPatch, DiffResult, HtmlSnapshot, MonitoredUrl, PatchStats, ResultId, UrlId,
};
use crate::pipeline::{self, DiffEngine};
use crate::storage::Store;
use crate::util;

/// Entry point for scheduler and notification collaborators.
pub struct DiffTracker<S> {
    store: S,
    engine: DiffEngine,
}

/// Outcome of one URL in a [`compare_active`] sweep.
#[derive(Debug, Clone, Serialize)]
pub struct CompareOutcome {
    pub url_id: UrlId,
    pub url: String,
    pub result_id: Option<ResultId>,
    pub stats: Option<PatchStats>,
    pub error: Option<String>,
}

impl<S: Store> DiffTracker<S> {
    pub fn new(store: S, engine: DiffEngine) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &DiffEngine {
        &self.engine
    }

    pub fn catalog(&self) -> SnapshotCatalog<'_, S> {
        SnapshotCatalog::new(&self.store)
    }

    pub fn add_url(&self, raw: &str) -> Result<MonitoredUrl> {
        let parsed = Url::parse(raw.trim())
            .map_err(|err| Error::validation(format!("invalid url {raw:?}: {err}")))?;
        let url = self.store.save_url(parsed.as_str(), util::now_utc())?;
        tracing::info!(url_id = %url.id, url = %url.url, "monitoring url");
        Ok(url)
    }

    pub fn require_url(&self, id: UrlId) -> Result<MonitoredUrl> {
        self.store
            .find_url(id)?
            .ok_or_else(|| Error::not_found(format!("url {id}")))
    }

    pub fn record_snapshot(
        &self,
        url_id: UrlId,
        role: CaptureRole,
        text: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<HtmlSnapshot> {
        self.catalog().record(url_id, role, text, captured_at)
    }

    pub fn get_latest_snapshot(
        &self,
        url_id: UrlId,
        role: CaptureRole,
    ) -> Result<Option<HtmlSnapshot>> {
        self.catalog().find_latest(url_id, role)
    }

    /// Pure diff of two texts; touches no storage.
    pub fn compute_diff(&self, pre_text: &str, post_text: &str) -> Result<DiffPatch> {
        pipeline::compute_diff(&self.engine, pre_text, post_text, util::now_utc())
    }

    pub fn build_and_persist_diff_result(
        &self,
        url: &MonitoredUrl,
        pre: Option<&HtmlSnapshot>,
        post: Option<&HtmlSnapshot>,
    ) -> Result<DiffResult> {
        let mut result =
            pipeline::build_diff_result(&self.engine, url, pre, post, util::now_utc())?;
        let id = self.store.persist_diff_result(&result)?;
        result.id = Some(id);
        tracing::info!(
            url_id = %url.id,
            result_id = %id,
            deltas = result.delta_count(),
            lines_affected = result.total_lines_affected(),
            "stored diff result"
        );
        Ok(result)
    }

    /// Compares the latest pre-event capture of a URL with its latest
    /// post-event capture.
    pub fn compare_latest(&self, url_id: UrlId) -> Result<DiffResult> {
        let url = self.require_url(url_id)?;
        let pre = self.store.latest_snapshot(url_id, CaptureRole::PreEvent)?;
        let post = self.store.latest_snapshot(url_id, CaptureRole::PostEvent)?;
        self.build_and_persist_diff_result(&url, pre.as_ref(), post.as_ref())
    }
}

/// Compares every active URL, one blocking task per URL, then records a
/// polling time whose success flag is false if any comparison failed.
pub async fn compare_active<S>(tracker: Arc<DiffTracker<S>>) -> Result<Vec<CompareOutcome>>
where
    S: Store + 'static,
{
    let urls: Vec<MonitoredUrl> = tracker
        .store()
        .list_urls()?
        .into_iter()
        .filter(|u| u.active)
        .collect();

    let mut handles = Vec::with_capacity(urls.len());
    for url in urls {
        let tracker = Arc::clone(&tracker);
        let url_id = url.id;
        let handle = tokio::task::spawn_blocking(move || tracker.compare_latest(url_id));
        handles.push((url, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (url, handle) in handles {
        let outcome = handle.await.unwrap_or_else(|err| {
            Err(Error::Computation(format!("comparison task failed: {err}")))
        });
        outcomes.push(outcome_for(url, outcome));
    }

    let success = outcomes.iter().all(|o| o.error.is_none());
    tracker.store().record_poll(util::now_utc(), success)?;
    tracing::info!(urls = outcomes.len(), success, "comparison sweep finished");
    Ok(outcomes)
}

fn outcome_for(url: MonitoredUrl, outcome: Result<DiffResult>) -> CompareOutcome {
    match outcome {
        Ok(result) => CompareOutcome {
            url_id: url.id,
            url: url.url,
            result_id: result.id,
            stats: Some(result.patch.stats()),
            error: None,
        },
        Err(err) => {
            tracing::warn!(url_id = %url.id, error = %err, "comparison failed");
            CompareOutcome {
                url_id: url.id,
                url: url.url,
                result_id: None,
                stats: None,
                error: Some(err.to_string()),
            }
        }
    }
}
