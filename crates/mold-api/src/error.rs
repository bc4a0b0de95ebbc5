// Archivo: error.rs
// Propósito: traducir errores del motor a respuestas HTTP
// `{"error": <código>, "message": <texto>}`.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flow::FlowError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Flow(#[from] FlowError),
    /// Falta la identidad del actor.
    #[error("falta la cabecera {0}")]
    Unauthenticated(&'static str),
    #[error("petición inválida: {0}")]
    BadRequest(String),
    #[error("error interno: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Flow(FlowError::Validation(_)) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Flow(FlowError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Flow(FlowError::StateConflict(_)) => StatusCode::CONFLICT,
            ApiError::Flow(FlowError::Unauthorized(_)) => StatusCode::FORBIDDEN,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Flow(FlowError::Storage(_)) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Flow(e) => e.code(),
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::BadRequest(_) => "validation_error",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Los fallos de almacenamiento se registran completos y se devuelven sin detalle.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "fallo interno");
            "error interno; la operación no se aplicó".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error: self.code(), message })).into_response()
    }
}
