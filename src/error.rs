#[cfg(feature = "web")]
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors surfaced by the gene dashboard.
///
/// Every variant is caught at a component boundary and shown to the user; none
/// of them is fatal to the process and none is retried automatically.
#[derive(Error, Debug)]
pub enum AppError {
    /// Symbol absent both locally and in the external gene service
    #[error("No data found for gene symbol: {0}")]
    GeneNotFound(String),

    #[error("{0} not found")]
    RecordNotFound(String),

    /// Network or upstream failure, the user may retry
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Batch-level validation failure carrying one message per bad row
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A single row failed after validation passed
    #[error("Row {row}: {message}")]
    Persist { row: usize, message: String },

    #[error("You must be signed in to modify clones")]
    AuthenticationRequired,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Row-indexed messages for validation failures, the display string otherwise.
    pub fn messages(&self) -> Vec<String> {
        match self {
            AppError::Validation(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

#[cfg(feature = "web")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::GeneNotFound(_) | AppError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("{self}");
        }

        let body = match &self {
            AppError::Validation(errors) => serde_json::json!({
                "error": "Validation failed",
                "details": errors,
            }),
            other => serde_json::json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
