mod engine;
pub use engine::{classify, DiffEngine, DiffLimits, EditOp, DEFAULT_MAX_LINES};

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{CaptureRole, DiffDelta, DiffPatch, DiffResult, HtmlSnapshot, MonitoredUrl};
use crate::normalize::normalize;

/// Splits a capture into comparison lines on `\n`. A `\r` stays part of the
/// line and a trailing newline does not add an empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_terminator('\n').collect()
}

/// Normalizes both texts and diffs them line by line. Pure.
pub fn compute_diff(
    engine: &DiffEngine,
    pre_text: &str,
    post_text: &str,
    now: DateTime<Utc>,
) -> Result<DiffPatch> {
    let pre = normalize(pre_text);
    let post = normalize(post_text);
    let source = split_lines(&pre);
    let target = split_lines(&post);
    let deltas = engine.deltas(&source, &target)?;
    Ok(DiffPatch::new(deltas, now))
}

/// Assembles a result from an already-selected snapshot pair.
///
/// Either a complete result comes back or an error does; nothing is
/// persisted here.
pub fn build_diff_result(
    engine: &DiffEngine,
    url: &MonitoredUrl,
    pre: Option<&HtmlSnapshot>,
    post: Option<&HtmlSnapshot>,
    now: DateTime<Utc>,
) -> Result<DiffResult> {
    let pre = pre.ok_or_else(|| Error::validation("pre-event snapshot is required"))?;
    let post = post.ok_or_else(|| Error::validation("post-event snapshot is required"))?;
    check_snapshot(url, pre, CaptureRole::PreEvent)?;
    check_snapshot(url, post, CaptureRole::PostEvent)?;

    let patch = compute_diff(engine, &pre.body, &post.body, now)?;
    Ok(DiffResult {
        id: None,
        url_id: url.id,
        captured_at: now,
        patch,
        snapshots: vec![pre.clone(), post.clone()],
    })
}

fn check_snapshot(url: &MonitoredUrl, snapshot: &HtmlSnapshot, role: CaptureRole) -> Result<()> {
    if snapshot.url_id != url.id {
        return Err(Error::validation(format!(
            "snapshot {} belongs to url {}, not {}",
            snapshot.id, snapshot.url_id, url.id
        )));
    }
    if snapshot.role != role {
        return Err(Error::validation(format!(
            "snapshot {} has role {}, expected {}",
            snapshot.id, snapshot.role, role
        )));
    }
    Ok(())
}

/// Content hash of a normalized body.
pub fn hash_body(body: &str) -> String {
    hex::encode(blake3::hash(body.as_bytes()).as_bytes())
}

/// Unified-style text rendering of a patch, one hunk per delta.
pub fn render_patch(patch: &DiffPatch) -> String {
    let mut out = String::new();
    for delta in &patch.deltas {
        let _ = writeln!(out, "{}", hunk_header(delta));
        for line in delta.source_lines() {
            let _ = writeln!(out, "-{line}");
        }
        for line in delta.target_lines() {
            let _ = writeln!(out, "+{line}");
        }
    }
    out
}

/// `@@ -start,count +start,count @@ kind` with 1-based starts.
pub fn hunk_header(delta: &DiffDelta) -> String {
    format!(
        "@@ -{},{} +{},{} @@ {}",
        delta.source_position() + 1,
        delta.source_line_count(),
        delta.target_position() + 1,
        delta.target_line_count(),
        delta.kind().as_str()
    )
}
