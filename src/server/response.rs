use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};

use crate::api::{ErrorBody, MessageBody};
use crate::record::ValidationError;

/// Failures surfaced by the card API, each with a fixed status and message.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    PhotoRequired,
    NotAnImage,
    TooLarge { limit: u64 },
    Malformed(String),
    InvalidData(Value),
    Internal(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::PhotoRequired
            | ApiError::NotAnImage
            | ApiError::Malformed(_)
            | ApiError::InvalidData(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::InvalidData(details(&err))
    }
}

/// `{ field: [message] }` for every field the error refers to.
pub fn details(err: &ValidationError) -> Value {
    let message = Value::String(err.to_string());
    let map: Map<String, Value> = err
        .fields()
        .into_iter()
        .map(|field| (field.to_string(), Value::Array(vec![message.clone()])))
        .collect();
    Value::Object(map)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, details) = match self {
            ApiError::NotFound => ("Student card not found".to_string(), None),
            ApiError::PhotoRequired => ("Photo is required".to_string(), None),
            ApiError::NotAnImage => ("Only image files are allowed".to_string(), None),
            ApiError::TooLarge { limit } => {
                (format!("Photo exceeds the {limit} byte limit"), None)
            }
            ApiError::Malformed(reason) => (reason, None),
            ApiError::InvalidData(details) => ("Invalid card data".to_string(), Some(details)),
            ApiError::Internal(message) => (message.to_string(), None),
        };
        (status, Json(ErrorBody { error, details })).into_response()
    }
}

pub fn message(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(MessageBody {
            message: message.into(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn validation_details_keyed_by_field() {
        let err = ValidationError::MissingInfo(vec!["name", "busRoute"]);
        let msg = err.to_string();
        assert_eq!(details(&err), json!({ "name": [msg], "busRoute": [msg] }));
    }

    #[test]
    fn statuses_match_failure_kind() {
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::TooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(ApiError::NotAnImage.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Internal("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
