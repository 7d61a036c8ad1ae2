use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(UrlId);
id_type!(SnapshotId);
id_type!(ResultId);
id_type!(PatchId);
id_type!(PollId);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitoredUrl {
    pub id: UrlId,
    pub url: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CaptureRole {
    PreEvent,
    PostEvent,
}

impl CaptureRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureRole::PreEvent => "pre_event",
            CaptureRole::PostEvent => "post_event",
        }
    }
}

impl fmt::Display for CaptureRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pre" | "pre_event" | "pre-event" => Ok(CaptureRole::PreEvent),
            "post" | "post_event" | "post-event" => Ok(CaptureRole::PostEvent),
            other => Err(Error::validation(format!("unrecognized capture role: {other:?}"))),
        }
    }
}

/// Snapshot input before the store assigns it an id.
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub url_id: UrlId,
    pub role: CaptureRole,
    pub body: String,
    pub body_hash: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HtmlSnapshot {
    pub id: SnapshotId,
    pub url_id: UrlId,
    pub role: CaptureRole,
    pub body: String,
    pub body_hash: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Insert,
    Delete,
    Change,
}

impl DeltaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaKind::Insert => "insert",
            DeltaKind::Delete => "delete",
            DeltaKind::Change => "change",
        }
    }
}

impl FromStr for DeltaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(DeltaKind::Insert),
            "delete" => Ok(DeltaKind::Delete),
            "change" => Ok(DeltaKind::Change),
            other => Err(Error::validation(format!("unknown delta kind: {other:?}"))),
        }
    }
}

/// One classified difference. Positions are 0-based line indexes into the
/// source and target documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffDelta {
    Insert {
        source_position: usize,
        target_position: usize,
        lines: Vec<String>,
    },
    Delete {
        source_position: usize,
        target_position: usize,
        lines: Vec<String>,
    },
    Change {
        source_position: usize,
        target_position: usize,
        source_lines: Vec<String>,
        target_lines: Vec<String>,
    },
}

impl DiffDelta {
    pub fn kind(&self) -> DeltaKind {
        match self {
            DiffDelta::Insert { .. } => DeltaKind::Insert,
            DiffDelta::Delete { .. } => DeltaKind::Delete,
            DiffDelta::Change { .. } => DeltaKind::Change,
        }
    }

    pub fn source_position(&self) -> usize {
        match self {
            DiffDelta::Insert { source_position, .. }
            | DiffDelta::Delete { source_position, .. }
            | DiffDelta::Change { source_position, .. } => *source_position,
        }
    }

    pub fn target_position(&self) -> usize {
        match self {
            DiffDelta::Insert { target_position, .. }
            | DiffDelta::Delete { target_position, .. }
            | DiffDelta::Change { target_position, .. } => *target_position,
        }
    }

    pub fn source_lines(&self) -> &[String] {
        match self {
            DiffDelta::Insert { .. } => &[],
            DiffDelta::Delete { lines, .. } => lines,
            DiffDelta::Change { source_lines, .. } => source_lines,
        }
    }

    pub fn target_lines(&self) -> &[String] {
        match self {
            DiffDelta::Insert { lines, .. } => lines,
            DiffDelta::Delete { .. } => &[],
            DiffDelta::Change { target_lines, .. } => target_lines,
        }
    }

    pub fn source_line_count(&self) -> usize {
        self.source_lines().len()
    }

    pub fn target_line_count(&self) -> usize {
        self.target_lines().len()
    }

    /// Lines credited to this delta: a change counts its larger side once.
    pub fn lines_affected(&self) -> usize {
        self.source_line_count().max(self.target_line_count())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatchStats {
    pub deltas: usize,
    pub inserts: usize,
    pub deletes: usize,
    pub changes: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub lines_affected: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PatchId>,
    pub deltas: Vec<DiffDelta>,
    pub created_at: DateTime<Utc>,
}

impl DiffPatch {
    pub fn new(deltas: Vec<DiffDelta>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            deltas,
            created_at,
        }
    }

    pub fn delta_count(&self) -> usize {
        self.deltas.len()
    }

    pub fn has_deltas(&self) -> bool {
        !self.deltas.is_empty()
    }

    pub fn deltas_of(&self, kind: DeltaKind) -> Vec<&DiffDelta> {
        self.deltas.iter().filter(|d| d.kind() == kind).collect()
    }

    pub fn insert_deltas(&self) -> Vec<&DiffDelta> {
        self.deltas_of(DeltaKind::Insert)
    }

    pub fn delete_deltas(&self) -> Vec<&DiffDelta> {
        self.deltas_of(DeltaKind::Delete)
    }

    pub fn change_deltas(&self) -> Vec<&DiffDelta> {
        self.deltas_of(DeltaKind::Change)
    }

    pub fn total_lines_affected(&self) -> usize {
        self.deltas.iter().map(DiffDelta::lines_affected).sum()
    }

    pub fn stats(&self) -> PatchStats {
        let mut stats = PatchStats {
            deltas: self.deltas.len(),
            ..PatchStats::default()
        };
        for delta in &self.deltas {
            match delta.kind() {
                DeltaKind::Insert => stats.inserts += 1,
                DeltaKind::Delete => stats.deletes += 1,
                DeltaKind::Change => stats.changes += 1,
            }
            stats.lines_added += delta.target_line_count();
            stats.lines_removed += delta.source_line_count();
            stats.lines_affected += delta.lines_affected();
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ResultId>,
    pub url_id: UrlId,
    pub captured_at: DateTime<Utc>,
    pub patch: DiffPatch,
    pub snapshots: Vec<HtmlSnapshot>,
}

impl DiffResult {
    pub fn snapshot_by_role(&self, role: CaptureRole) -> Option<&HtmlSnapshot> {
        self.snapshots.iter().find(|s| s.role == role)
    }

    pub fn pre_event_snapshot(&self) -> Option<&HtmlSnapshot> {
        self.snapshot_by_role(CaptureRole::PreEvent)
    }

    pub fn post_event_snapshot(&self) -> Option<&HtmlSnapshot> {
        self.snapshot_by_role(CaptureRole::PostEvent)
    }

    pub fn insert_deltas(&self) -> Vec<&DiffDelta> {
        self.patch.insert_deltas()
    }

    pub fn delete_deltas(&self) -> Vec<&DiffDelta> {
        self.patch.delete_deltas()
    }

    pub fn change_deltas(&self) -> Vec<&DiffDelta> {
        self.patch.change_deltas()
    }

    pub fn delta_count(&self) -> usize {
        self.patch.delta_count()
    }

    pub fn has_deltas(&self) -> bool {
        self.patch.has_deltas()
    }

    pub fn total_lines_affected(&self) -> usize {
        self.patch.total_lines_affected()
    }
}

/// Compact listing row for a stored result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    pub id: ResultId,
    pub url_id: UrlId,
    pub captured_at: DateTime<Utc>,
    pub stats: PatchStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingTime {
    pub id: PollId,
    pub polled_at: DateTime<Utc>,
    pub success: bool,
}
