use std::path::PathBuf;

use serde_json::Value;

/// Largest error body kept from a failed response.
pub const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid rallyd endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Request to rallyd failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("rallyd returned {status}: {}", server_message(body))]
    Status { status: u16, body: String },
    #[error("Unexpected response from rallyd: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ClientError {
    /// HTTP status of a rejected request.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The `error.code` field of a structured error body.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        let Self::Status { body, .. } = self else {
            return None;
        };
        let value: Value = serde_json::from_str(body).ok()?;
        value["error"]["code"].as_str().map(ToString::to_string)
    }
}

/// The `error.message` of a structured body, or the raw body.
fn server_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(ToString::to_string))
        .unwrap_or_else(|| body.to_string())
}

pub(crate) async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_body_shows_message() {
        let err = ClientError::Status {
            status: 404,
            body: r#"{"error":{"code":"not_found","message":"task x not found"}}"#.into(),
        };
        assert_eq!(err.to_string(), "rallyd returned 404: task x not found");
        assert_eq!(err.code().as_deref(), Some("not_found"));
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn plain_body_is_shown_raw() {
        let err = ClientError::Status {
            status: 502,
            body: "Bad Gateway".into(),
        };
        assert_eq!(err.to_string(), "rallyd returned 502: Bad Gateway");
        assert!(err.code().is_none());
    }
}
