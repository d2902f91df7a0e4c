pub(crate) mod deployments;
pub(crate) mod files;
pub(crate) mod runs;
pub(crate) mod tasks;
pub(crate) mod verifications;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use rallyd_types::{ApiMap, Message};

use crate::{AppState, ApiError};

pub(crate) type ApiResult<T> = Result<T, ApiError>;

/// Query flags like `?force` or `?detailed=1`: present means on unless
/// spelled as an explicit false.
pub(crate) fn flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        )
    })
}

pub(crate) async fn api_map() -> Json<ApiMap> {
    Json(ApiMap {
        map: crate::api_map(),
    })
}

pub(crate) async fn recreate_db(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    state.backend.recreate_db().await?;
    tracing::info!("Database recreated");
    Ok((StatusCode::CREATED, Json(Message::new("Db recreated"))))
}

#[cfg(test)]
mod tests {
    use super::flag;

    #[test]
    fn flags_default_on_when_present() {
        assert!(!flag(None));
        assert!(flag(Some("")));
        assert!(flag(Some("true")));
        assert!(flag(Some("1")));
        assert!(!flag(Some("false")));
        assert!(!flag(Some("0")));
        assert!(!flag(Some(" Off ")));
    }
}
