use std::ops::Range;

use similar::{capture_diff_slices, Algorithm, DiffTag};

use crate::error::{Error, Result};
use crate::models::DiffDelta;

pub const DEFAULT_MAX_LINES: usize = 200_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffLimits {
    /// Upper bound on the line count of either side of a comparison.
    pub max_lines: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
        }
    }
}

/// A single edit anchored to a source range and a target range. At most one
/// of the two ranges is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOp {
    pub source: Range<usize>,
    pub target: Range<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine {
    limits: DiffLimits,
}

impl DiffEngine {
    pub fn new(limits: DiffLimits) -> Self {
        Self { limits }
    }

    /// Minimal line-level edit script from `source` to `target`.
    ///
    /// Uses Myers without a deadline so the result stays minimal. Runs of
    /// deletes and inserts with no equal line between them are coalesced into
    /// a single op.
    pub fn edit_ops(&self, source: &[&str], target: &[&str]) -> Result<Vec<EditOp>> {
        let longest = source.len().max(target.len());
        if longest > self.limits.max_lines {
            return Err(Error::Computation(format!(
                "document has {longest} lines, limit is {}",
                self.limits.max_lines
            )));
        }

        let mut ops: Vec<EditOp> = Vec::new();
        let mut pending: Option<EditOp> = None;
        for op in capture_diff_slices(Algorithm::Myers, source, target) {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            if tag == DiffTag::Equal {
                ops.extend(pending.take());
                continue;
            }
            let adjacent = matches!(
                &pending,
                Some(cur) if cur.source.end == old_range.start && cur.target.end == new_range.start
            );
            if adjacent {
                if let Some(cur) = pending.as_mut() {
                    cur.source.end = old_range.end;
                    cur.target.end = new_range.end;
                }
            } else {
                ops.extend(pending.take());
                pending = Some(EditOp {
                    source: old_range,
                    target: new_range,
                });
            }
        }
        ops.extend(pending);
        Ok(ops)
    }

    /// Runs the engine and classifies every edit into a delta.
    pub fn deltas(&self, source: &[&str], target: &[&str]) -> Result<Vec<DiffDelta>> {
        let ops = self.edit_ops(source, target)?;
        Ok(ops
            .into_iter()
            .filter_map(|op| classify(&op, source, target))
            .collect())
    }
}

/// Labels an edit by which of its ranges are non-empty. An edit with two
/// empty ranges carries no change and yields `None`.
pub fn classify(op: &EditOp, source: &[&str], target: &[&str]) -> Option<DiffDelta> {
    let take = |lines: &[&str], range: &Range<usize>| -> Vec<String> {
        lines[range.clone()].iter().map(|l| l.to_string()).collect()
    };
    let source_position = op.source.start;
    let target_position = op.target.start;
    match (op.source.is_empty(), op.target.is_empty()) {
        (true, false) => Some(DiffDelta::Insert {
            source_position,
            target_position,
            lines: take(target, &op.target),
        }),
        (false, true) => Some(DiffDelta::Delete {
            source_position,
            target_position,
            lines: take(source, &op.source),
        }),
        (false, false) => Some(DiffDelta::Change {
            source_position,
            target_position,
            source_lines: take(source, &op.source),
            target_lines: take(target, &op.target),
        }),
        (true, true) => None,
    }
}
