//! HTTP mapping for core errors.
//!
//! [`ApiError`] wraps [`hashd::Error`] so handlers can use `?` and still
//! produce a plain-text response with the right status code:
//!
//! | Core error        | Status |
//! |-------------------|--------|
//! | `InvalidInput`    | 400    |
//! | `InvalidId`       | 400    |
//! | `NotFound`        | 404    |
//! | `ServiceDraining` | 503    |
//! | anything else     | 500    |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(Debug)]
pub struct ApiError(pub hashd::Error);

impl From<hashd::Error> for ApiError {
    fn from(err: hashd::Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            hashd::Error::InvalidInput { .. } | hashd::Error::InvalidId { .. } => {
                StatusCode::BAD_REQUEST
            }
            hashd::Error::NotFound { .. } => StatusCode::NOT_FOUND,
            hashd::Error::ServiceDraining => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.0 {
            hashd::Error::InvalidInput { reason } => reason,
            hashd::Error::ServiceDraining => "Server Shutting Down".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            #[cfg(feature = "tracing")]
            tracing::error!("Request failed: {body}");
        }

        (status, body).into_response()
    }
}
