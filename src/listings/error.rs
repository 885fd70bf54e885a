use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use super::commit::CommitError;
use super::delegation::DelegationError;
use super::domain::ListingId;
use super::identity::IdentityError;
use super::media::MediaError;
use super::moderation::ModerationError;
use super::normalizer::ValidationError;
use super::quota::QuotaExceeded;
use super::repository::RepositoryError;

/// Every failure a listing request can end in.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Delegation(#[from] DelegationError),
    #[error("listing payload is invalid: {0}")]
    Validation(#[from] ValidationError),
    #[error("request body could not be read: {0}")]
    MalformedBody(String),
    #[error(transparent)]
    Quota(#[from] QuotaExceeded),
    #[error("image {index} could not be stored: {reason}")]
    MediaUploadFailed { index: usize, reason: String },
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Moderation(#[from] ModerationError),
    #[error("listing {0} not found")]
    ListingNotFound(ListingId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<MediaError> for SubmissionError {
    fn from(value: MediaError) -> Self {
        match value {
            MediaError::UploadFailed { index, reason } => Self::MediaUploadFailed { index, reason },
            MediaError::Validation(err) => Self::Validation(err),
        }
    }
}

impl SubmissionError {
    /// Stable machine-readable category for clients.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmissionError::Identity(IdentityError::Repository(err))
            | SubmissionError::Moderation(ModerationError::Repository(err))
            | SubmissionError::Repository(err) => repository_kind(err),
            SubmissionError::Identity(_) => "authentication_error",
            SubmissionError::Delegation(DelegationError::TargetNotFound(_))
            | SubmissionError::Moderation(ModerationError::ListingNotFound(_))
            | SubmissionError::ListingNotFound(_) => "not_found",
            SubmissionError::Delegation(DelegationError::TerritoryViolation { .. })
            | SubmissionError::Moderation(
                ModerationError::InsufficientRole(_) | ModerationError::TerritoryViolation { .. },
            ) => "authorization_error",
            SubmissionError::Validation(_)
            | SubmissionError::MalformedBody(_)
            | SubmissionError::Moderation(ModerationError::MissingReason) => "validation_error",
            SubmissionError::Quota(_) => "quota_exceeded",
            SubmissionError::MediaUploadFailed { .. } => "media_upload_failed",
            SubmissionError::Commit(_) => "commit_failed",
            SubmissionError::Moderation(
                ModerationError::InvalidTransition { .. } | ModerationError::MissingMedia(_),
            ) => "invalid_transition",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            "authentication_error" => StatusCode::UNAUTHORIZED,
            "authorization_error" | "quota_exceeded" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" => StatusCode::BAD_REQUEST,
            "media_upload_failed" => StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_transition" | "conflict" => StatusCode::CONFLICT,
            "commit_failed" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// JSON error body: `error` and `kind`, plus the details for the failure class.
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(self.to_string()));
        body.insert("kind".to_string(), Value::String(self.kind().to_string()));

        match self {
            SubmissionError::Validation(err) => {
                body.insert("missing_fields".to_string(), json!(err.missing_fields));
                body.insert("invalid_fields".to_string(), json!(err.invalid_fields));
            }
            SubmissionError::Quota(err) => {
                body.insert(
                    "quota".to_string(),
                    json!({
                        "current": err.current,
                        "max": err.max,
                        "tier": err.tier,
                    }),
                );
            }
            SubmissionError::MediaUploadFailed { index, .. } => {
                body.insert("image_index".to_string(), json!(index));
            }
            SubmissionError::Commit(err) => {
                body.insert("step".to_string(), json!(err.step));
                body.insert("rolled_back".to_string(), json!(err.rolled_back));
            }
            _ => {}
        }

        Value::Object(body)
    }
}

fn repository_kind(err: &RepositoryError) -> &'static str {
    match err {
        RepositoryError::NotFound => "not_found",
        RepositoryError::Conflict => "conflict",
        RepositoryError::Unavailable(_) => "unavailable",
    }
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}
