use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{ListingId, ListingStatus};
use super::error::SubmissionError;
use super::normalizer::RawSubmission;
use super::repository::RepositoryError;
use super::service::{ListingSubmissionService, SubmissionRequest};

const DEFAULT_QUEUE_LIMIT: usize = 50;

/// Router exposing submission, lookup and moderation endpoints.
pub fn listing_router(service: Arc<ListingSubmissionService>) -> Router {
    Router::new()
        .route("/api/v1/listings", post(submit_handler))
        .route(
            "/api/v1/listings/:listing_id",
            get(fetch_handler).delete(remove_handler),
        )
        .route(
            "/api/v1/listings/:listing_id/status",
            patch(status_handler),
        )
        .route("/api/v1/moderation/queue", get(queue_handler))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChange {
    pub status: ListingStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct QueueParams {
    pub limit: Option<usize>,
}

/// Submission holds the owner's lock across storage calls, so it runs on the
/// blocking pool. The credential is checked before a body rejection is reported.
pub(crate) async fn submit_handler(
    State(service): State<Arc<ListingSubmissionService>>,
    headers: HeaderMap,
    payload: Result<Json<RawSubmission>, JsonRejection>,
) -> Response {
    let credential = bearer_token(&headers);
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            let err = match service.authenticate(credential.as_deref()) {
                Ok(_) => SubmissionError::MalformedBody(rejection.body_text()),
                Err(err) => err,
            };
            return err.into_response();
        }
    };

    let request = SubmissionRequest {
        credential,
        client_ip: forwarded_ip(&headers),
        payload,
    };

    match tokio::task::spawn_blocking(move || service.submit(request)).await {
        Ok(Ok(receipt)) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Ok(Err(err)) => err.into_response(),
        Err(join) => {
            error!(error = %join, "listing submission task did not complete");
            SubmissionError::Repository(RepositoryError::Unavailable(
                "submission worker failed".to_string(),
            ))
            .into_response()
        }
    }
}

pub(crate) async fn fetch_handler(
    State(service): State<Arc<ListingSubmissionService>>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> Response {
    let listing_id = ListingId(listing_id);
    let result = service
        .authenticate(bearer_token(&headers).as_deref())
        .and_then(|principal| service.get(&principal, &listing_id));

    match result {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn status_handler(
    State(service): State<Arc<ListingSubmissionService>>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
    Json(change): Json<StatusChange>,
) -> Response {
    let listing_id = ListingId(listing_id);
    let result = service
        .authenticate(bearer_token(&headers).as_deref())
        .and_then(|moderator| {
            service
                .moderation()
                .update_status(&moderator, &listing_id, change.status, change.reason.as_deref())
                .map_err(Into::into)
        });

    match result {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn remove_handler(
    State(service): State<Arc<ListingSubmissionService>>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> Response {
    let listing_id = ListingId(listing_id);
    let result = service
        .authenticate(bearer_token(&headers).as_deref())
        .and_then(|moderator| {
            service
                .moderation()
                .remove(&moderator, &listing_id)
                .map_err(Into::into)
        });

    match result {
        Ok(listing) => {
            let payload = json!({
                "listing_id": listing.id,
                "removed": true,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn queue_handler(
    State(service): State<Arc<ListingSubmissionService>>,
    headers: HeaderMap,
    Query(params): Query<QueueParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_QUEUE_LIMIT);
    let result = service
        .authenticate(bearer_token(&headers).as_deref())
        .and_then(|moderator| {
            service
                .moderation()
                .queue(&moderator, limit)
                .map_err(Into::into)
        });

    match result {
        Ok(listings) => {
            let payload = json!({
                "count": listings.len(),
                "listings": listings,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// First hop of `X-Forwarded-For`, the original client address.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_bearer_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  tok-1 "));
        assert_eq!(bearer_token(&headers).as_deref(), Some("tok-1"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn forwarded_ip_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(forwarded_ip(&headers), "203.0.113.7".parse().ok());
    }
}
