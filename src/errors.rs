use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors the HTTP surface reports to callers. "Nothing found" is not
/// in here: empty matches are ordinary empty results, and generation
/// failures are absorbed by the answer synthesizer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A request field is missing, malformed, or inconsistent with the
    /// filter hierarchy. The field is always named.
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    /// A snapshot reload failed; the previous snapshot keeps serving.
    #[error("reload failed: {0}")]
    Reload(#[source] anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Reload(_) => "RELOAD_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Reload(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Self::Validation { field, .. } = &self {
            error["field"] = json!(field);
        }
        (self.status(), Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;

    #[test]
    fn validation_error_names_the_field() {
        let err = ApiError::validation("district", "`Mehsana` is not a district of `Punjab`");
        assert_eq!(
            err.to_string(),
            "district: `Mehsana` is not a district of `Punjab`"
        );
    }
}
