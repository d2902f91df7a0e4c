//! Rendering command results as text tables or raw JSON.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde_json::{Value, json};
use unicode_width::UnicodeWidthStr;

/// Columns shown for each kind of listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Deployments,
    Tasks,
    Verifications,
    Runs,
}

impl Collection {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Deployments => &["uuid", "name", "status", "created_at"],
            Self::Tasks => &["uuid", "tag", "status", "created_at"],
            Self::Verifications => &[
                "uuid",
                "set_name",
                "status",
                "tests",
                "errors",
                "failures",
                "created_at",
            ],
            Self::Runs => &["id", "state", "task_ids", "created_at"],
        }
    }

    /// Key of the list inside the response envelope.
    pub fn key(self) -> &'static str {
        match self {
            Self::Deployments => "deployments",
            Self::Tasks => "tasks",
            Self::Verifications => "verifications",
            Self::Runs => "runs",
        }
    }
}

/// What a command produced.
#[derive(Debug)]
pub enum Output {
    /// `{"msg": ...}` style responses.
    Message(Value),
    /// A list envelope such as `{"tasks": [...]}`.
    Collection(Collection, Value),
    /// One resource, shown as a Property/Value table.
    Resource(Value),
    /// Plain text, e.g. log lines.
    Text { json: Value, text: String },
    Downloaded(Vec<PathBuf>),
    Nothing { msg: String },
}

impl Output {
    pub fn render(&self, as_json: bool) -> String {
        if as_json {
            return self.to_json().to_string();
        }
        match self {
            Self::Message(value) => value
                .get("msg")
                .and_then(Value::as_str)
                .map_or_else(|| value.to_string(), ToString::to_string),
            Self::Collection(kind, envelope) => {
                let items = envelope
                    .get(kind.key())
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                collection_table(kind.columns(), items)
            }
            Self::Resource(value) => resource_table(value),
            Self::Text { text, .. } => text.trim_end_matches('\n').to_string(),
            Self::Downloaded(paths) => paths
                .iter()
                .map(|p| format!("Downloaded: {}", p.display()))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Nothing { msg } => msg.clone(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Message(value)
            | Self::Collection(_, value)
            | Self::Resource(value)
            | Self::Text { json: value, .. } => value.clone(),
            Self::Downloaded(paths) => json!({
                "downloaded": paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>()
            }),
            Self::Nothing { msg } => json!({ "msg": msg }),
        }
    }
}

/// Cell text for a JSON value: strings unquoted, lists comma-joined, null empty.
pub fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| cell(Some(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

pub fn collection_table(columns: &[&str], items: &[Value]) -> String {
    let rows: Vec<Vec<String>> = items
        .iter()
        .map(|item| columns.iter().map(|c| cell(item.get(*c))).collect())
        .collect();
    render_table(columns, &rows)
}

pub fn resource_table(value: &Value) -> String {
    let rows: Vec<Vec<String>> = match value.as_object() {
        Some(map) => map
            .iter()
            .map(|(key, v)| vec![key.clone(), cell(Some(v))])
            .collect(),
        None => vec![vec![String::new(), cell(Some(value))]],
    };
    render_table(&["Property", "Value"], &rows)
}

/// ASCII box table, left aligned, widths measured in terminal columns.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.width()).collect();
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(value.width());
            }
        }
    }

    let separator = {
        let mut line = String::from("+");
        for w in &widths {
            line.push_str(&"-".repeat(w + 2));
            line.push('+');
        }
        line
    };

    let mut out = Vec::with_capacity(rows.len() + 4);
    out.push(separator.clone());
    out.push(format_row(headers.iter().copied(), &widths));
    out.push(separator.clone());
    for row in rows {
        out.push(format_row(row.iter().map(String::as_str), &widths));
    }
    out.push(separator);
    out.join("\n")
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let mut line = String::from("|");
    for (value, w) in cells.zip(widths) {
        let pad = w.saturating_sub(value.width());
        let _ = write!(line, " {value}{} |", " ".repeat(pad));
    }
    line
}
