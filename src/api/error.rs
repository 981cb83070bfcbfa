//! HTTP error mapping

use crate::error::AgentError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

/// Agent error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub AgentError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AgentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AgentError::UnknownTool(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            AgentError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.0 {
            AgentError::InvalidRequest(_) => "invalid_request",
            AgentError::UnknownTool(_) => "unknown_tool",
            AgentError::ProviderUnavailable(_) => "provider_unavailable",
            AgentError::Cancelled => "cancelled",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.0.to_string(),
            kind: self.kind(),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
