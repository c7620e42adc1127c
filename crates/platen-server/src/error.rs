use std::collections::BTreeMap;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use platen_core::Error;
use platen_core::error::AuthError;
use serde::Serialize;

/// Wire shape for every error reply: a human-readable message plus optional
/// per-field reasons for validation failures.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

pub fn json_error(code: StatusCode, message: impl Into<String>) -> Response {
    (
        code,
        Json(ErrorBody {
            message: message.into(),
            errors: None,
        }),
    )
        .into_response()
}

/// HTTP adapter for the core taxonomy. Handlers return
/// `Result<_, ApiError>` and bubble core errors with `?`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        ApiError(crate::repo::map_db_err(err))
    }
}

pub fn map_db_err_api(err: sea_orm::DbErr) -> ApiError {
    ApiError(crate::repo::map_db_err(err))
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            Error::UniqueConstraint { .. } => StatusCode::CONFLICT,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::FileSystem(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Analyzer(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error");
        }

        let body = match self.0 {
            Error::InvalidParameter { errors } => ErrorBody {
                message: "invalid parameter".to_string(),
                errors: Some(errors),
            },
            Error::UniqueConstraint { entity, field } => ErrorBody {
                message: format!("{entity} with this {field} already exists"),
                errors: None,
            },
            Error::Auth(AuthError::MissingIdentity) => ErrorBody {
                message: "authentication required".to_string(),
                errors: None,
            },
            // Repository and file-system details stay in the log.
            Error::Repository(_) | Error::FileSystem(_) => ErrorBody {
                message: "internal server error".to_string(),
                errors: None,
            },
            other => ErrorBody {
                message: other.to_string(),
                errors: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use platen_core::states::JobState;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            ApiError(Error::invalid_parameter("state", "unknown state")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(Error::unique("job", "name")).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(Error::InvalidTransition {
                from: JobState::Done,
                to: JobState::Printing
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(Error::NotFound("job".to_string())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(Error::Auth(AuthError::AuthenticationFailed)).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError(Error::Repository("boom".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn field_errors_serialize_under_errors_key() {
        let err = ApiError(Error::invalid_parameter("name", "must not be empty"));
        let Error::InvalidParameter { errors } = err.0 else {
            panic!("wrong variant");
        };
        let body = ErrorBody {
            message: "invalid parameter".to_string(),
            errors: Some(errors),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["errors"]["name"][0], "must not be empty");
    }
}
