//! Windows into task log files.

use serde::{Deserialize, Serialize};

use crate::ids::TaskId;

/// First line served when a client asks for a log without a range: the tail.
pub const DEFAULT_LOG_START_LINE: i64 = -10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSlice {
    pub task_id: TaskId,
    pub total_lines: usize,
    pub from: i64,
    pub to: Option<i64>,
    pub data: Vec<String>,
}

impl LogSlice {
    /// Slice `lines` with `[from:to]` semantics and wrap the result.
    #[must_use]
    pub fn from_lines(task_id: TaskId, lines: &[String], from: i64, to: Option<i64>) -> Self {
        Self {
            task_id,
            total_lines: lines.len(),
            from,
            to,
            data: slice_lines(lines, from, to).to_vec(),
        }
    }
}

/// Resolve one slice bound: negatives count back from `len`, then clamp.
fn resolve_bound(index: i64, len: usize) -> usize {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if index < 0 { len_i + index } else { index };
    resolved.clamp(0, len_i) as usize
}

/// Half-open slice with negative indices counted from the end.
///
/// Out-of-range bounds clamp to the ends, and `end <= start` is empty.
#[must_use]
pub fn slice_lines<T>(lines: &[T], start: i64, end: Option<i64>) -> &[T] {
    let len = lines.len();
    let start = resolve_bound(start, len);
    let end = end.map_or(len, |end| resolve_bound(end, len));
    if end <= start {
        return &[];
    }
    &lines[start..end]
}
