//! Parser for the ASCII tables the toolkit prints for listings.
//!
//! ```text
//! +--------------------------------------+----------+------------------+
//! | uuid                                 | name     | status           |
//! +--------------------------------------+----------+------------------+
//! | 0b4bbc1f-2a8e-4a3f-9f8b-4f3b0f2c1d11 | existing | deploy->finished |
//! +--------------------------------------+----------+------------------+
//! ```
//!
//! Headers are normalized to `snake_case` so callers look columns up by the
//! names the toolkit uses in its JSON output. Rows whose first cell is empty
//! continue the previous row (the toolkit wraps long cells).

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Parse the first table found in `text`. Text outside the table is ignored.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut headers: Option<Vec<String>> = None;
        let mut rows: Vec<Vec<String>> = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if !line.starts_with('|') {
                // A blank line or prose after the table ends it.
                if headers.is_some() && !line.starts_with('+') {
                    break;
                }
                continue;
            }

            let cells = split_row(line);
            let Some(header) = headers.as_ref() else {
                headers = Some(cells.iter().map(|c| normalize_header(c)).collect());
                continue;
            };

            if cells.iter().all(String::is_empty) {
                continue;
            }
            let is_continuation = cells.first().is_some_and(String::is_empty);
            if is_continuation && let Some(prev) = rows.last_mut() {
                for (slot, extra) in prev.iter_mut().zip(cells) {
                    if !extra.is_empty() {
                        if !slot.is_empty() {
                            slot.push(' ');
                        }
                        slot.push_str(&extra);
                    }
                }
                continue;
            }

            let mut row = cells;
            row.resize(header.len(), String::new());
            rows.push(row);
        }

        headers.map(|headers| Self { headers, rows })
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as column-name maps. Empty cells are omitted.
    #[must_use]
    pub fn records(&self) -> Vec<HashMap<String, String>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .zip(row)
                    .filter(|(_, cell)| !cell.is_empty())
                    .map(|(h, cell)| (h.clone(), cell.clone()))
                    .collect()
            })
            .collect()
    }
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.trim_start_matches('|').trim_end_matches('|');
    inner.split('|').map(|c| c.trim().to_string()).collect()
}

/// `Deployment UUID` -> `deployment_uuid`.
fn normalize_header(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
