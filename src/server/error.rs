use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::Error;

/// HTTP face of [`Error`]: `{ "error": message }` with a status derived from
/// the variant.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::MissingParameter(_) | Error::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Error::UnknownMetric(_) => StatusCode::NOT_FOUND,
            Error::DataUnavailable(_)
            | Error::Migration(_)
            | Error::Config(_)
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{status}: {}", self.0);
        } else {
            log::debug!("{status}: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(Error::MissingParameter("siteId".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(Error::InvalidParameter("startDate".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(Error::UnknownMetric("revenue".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(Error::DataUnavailable("locked".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
