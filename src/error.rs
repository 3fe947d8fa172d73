use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    /// Missing entity, or an entity outside the caller's active library.
    /// The two cases are deliberately indistinguishable.
    #[error("Unknown item")]
    UnknownItem,

    #[error("Unsupported action")]
    Unsupported,

    #[error("permission denied")]
    PermissionDenied,

    #[error("no user identity on request")]
    Unauthenticated,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("malformed body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("mail error: {0}")]
    Mail(String),

    #[error("search worker failed: {0}")]
    Task(String),

    #[error("Other error: {0}")]
    Other(String),
}

pub type PlannerResult<T> = Result<T, PlannerError>;

impl From<tokio::task::JoinError> for PlannerError {
    fn from(err: tokio::task::JoinError) -> Self {
        PlannerError::Task(err.to_string())
    }
}

impl IntoResponse for PlannerError {
    fn into_response(self) -> Response {
        let status = match self {
            PlannerError::UnknownItem => StatusCode::NOT_FOUND,
            PlannerError::Unsupported => StatusCode::METHOD_NOT_ALLOWED,
            PlannerError::PermissionDenied => StatusCode::FORBIDDEN,
            PlannerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            PlannerError::InvalidKey(_) | PlannerError::MalformedBody(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }

        (status, self.to_string()).into_response()
    }
}
