use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hireai_core::approval::WorkflowError;
use hireai_core::avatar::AvatarError;
use hireai_core::identity::IdentityError;
use hireai_core::policy::Denial;
use hireai_core::registration::ValidationError;
use serde_json::json;

/// Every failure a handler can report, rendered as `{success:false, message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest {
        message: String,
        errors: Vec<String>,
    },
    #[error("Unauthorized")]
    Unauthenticated,
    #[error("Forbidden: {0}")]
    Forbidden(Denial),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::BadRequest { message, errors } if !errors.is_empty() => {
                json!({ "success": false, "message": message, "errors": errors })
            }
            ApiError::Forbidden(denial) => json!({
                "success": false,
                "message": self.to_string(),
                "reason": denial.reason,
                "redirect": denial.redirect,
            }),
            ApiError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                json!({ "success": false, "message": "Internal server error" })
            }
            _ => json!({ "success": false, "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::BadRequest {
            message: "Validation failed".to_string(),
            errors: e.errors,
        }
    }
}

impl From<Denial> for ApiError {
    fn from(denial: Denial) -> Self {
        Self::Forbidden(denial)
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Unauthenticated => Self::Unauthenticated,
            IdentityError::NotFound(what) => Self::NotFound(what),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        let message = e.to_string();
        match e {
            WorkflowError::Validation(v) => v.into(),
            WorkflowError::DuplicateEmail | WorkflowError::InvalidState(_) => {
                Self::bad_request(message)
            }
            WorkflowError::NotFound(what) => Self::NotFound(what),
            WorkflowError::Identity(inner) => inner.into(),
            WorkflowError::Store(inner) => Self::Internal(inner.into()),
        }
    }
}

impl From<AvatarError> for ApiError {
    fn from(e: AvatarError) -> Self {
        Self::Internal(anyhow::Error::new(e).context("Failed to generate video"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}
