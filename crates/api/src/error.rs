use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use perpdata_core::{ExchangeErrorKind, MarketDataError};
use perpdata_engine::ToolError;
use serde::Serialize;

/// A failed tool call as returned over HTTP.
#[derive(Debug)]
pub struct ApiError(pub ToolError);

impl From<ToolError> for ApiError {
    fn from(err: ToolError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    exchange: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<i64>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ToolError::UnknownTool(_) => StatusCode::NOT_FOUND,
            ToolError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ToolError::Market(MarketDataError::Validation(_)) => StatusCode::BAD_REQUEST,
            ToolError::Market(MarketDataError::Exchange(err)) => match err.kind {
                ExchangeErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
                ExchangeErrorKind::SymbolNotFound => StatusCode::NOT_FOUND,
                ExchangeErrorKind::Api => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let exchange_error = match &self.0 {
            ToolError::Market(err) => err.exchange_error(),
            _ => None,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            exchange: exchange_error.map(|e| e.exchange.to_string()),
            code: exchange_error.and_then(|e| e.code),
        };
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(status = status.as_u16(), error = %body.error, "Tool call failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %body.error, "Tool call rejected");
        }
        (status, Json(body)).into_response()
    }
}
