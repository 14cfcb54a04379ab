//! HTTP mapping for [`Error`]

use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

/// Wraps a crate error so handlers can return it with `?`
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::AuthenticationMissing => StatusCode::UNAUTHORIZED,
            Error::CrawlInProgress => StatusCode::CONFLICT,
            Error::ConfigurationMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Text shown to the browser
    ///
    /// Missing configuration is logged in full but only reported generically.
    fn public_message(&self) -> String {
        match &self.0 {
            Error::ConfigurationMissing(_) => {
                "This feature is not configured on the server.".to_string()
            }
            Error::AuthenticationMissing => {
                "Please add your OpenAI API key to continue.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, "{}", self.0);
        } else {
            warn!(%status, "{}", self.0);
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
