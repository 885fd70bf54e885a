use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::listings::domain::ListingStatus;

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.2");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request builds")
}

fn sale_body() -> Value {
    serde_json::to_value(sale_payload()).expect("serializes")
}

#[tokio::test]
async fn post_creates_listing_and_records_forwarded_ip() {
    let harness = harness();

    let response = harness
        .router()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/listings",
            Some(OWNER_TOKEN),
            sale_body(),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["media"]["linked"], 2);
    assert_eq!(body["quota"]["tier"], "free");

    let listing_id = body["listing_id"].as_str().expect("listing id");
    let stored = harness
        .listings
        .all()
        .into_iter()
        .find(|listing| listing.id.0 == listing_id)
        .expect("listing stored");
    assert_eq!(
        stored.attestation.attested_ip,
        "203.0.113.9".parse().ok()
    );
}

#[tokio::test]
async fn post_without_credentials_is_unauthorized() {
    let harness = harness();

    let response = harness
        .router()
        .oneshot(json_request(Method::POST, "/api/v1/listings", None, sale_body()))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "authentication_error");
    assert_eq!(harness.listings.len(), 0);
}

#[tokio::test]
async fn quota_rejection_reports_counts() {
    let harness = harness();
    seed_listing(&harness, "lst-held", "owner-1", "us", ListingStatus::Pending, 1);

    let response = harness
        .router()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/listings",
            Some(OWNER_TOKEN),
            sale_body(),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "quota_exceeded");
    assert_eq!(body["quota"], json!({ "current": 1, "max": 1, "tier": "free" }));
}

#[tokio::test]
async fn validation_failure_is_bad_request() {
    let harness = harness();

    let response = harness
        .router()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/listings",
            Some(AGENT_TOKEN),
            json!({ "title": "Only a title" }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert!(body["missing_fields"]
        .as_array()
        .expect("missing fields")
        .iter()
        .any(|field| field == "city"));
}

#[tokio::test]
async fn get_returns_listing_with_media_or_not_found() {
    let harness = harness();
    let id = seed_listing(&harness, "lst-view", "owner-1", "us", ListingStatus::Active, 2);

    let response = harness
        .router()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/listings/{}", id.0),
            Some(AGENT_TOKEN),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["listing"]["id"], "lst-view");
    assert_eq!(body["media"].as_array().map(Vec::len), Some(2));

    let response = harness
        .router()
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/listings/lst-nope",
            Some(AGENT_TOKEN),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn patch_status_approves_and_rejects() {
    let harness = harness();
    let approve = seed_listing(&harness, "lst-ok", "owner-1", "us", ListingStatus::Pending, 1);
    let reject = seed_listing(&harness, "lst-no", "owner-2", "us", ListingStatus::Pending, 1);

    let response = harness
        .router()
        .oneshot(json_request(
            Method::PATCH,
            &format!("/api/v1/listings/{}/status", approve.0),
            Some(ADMIN_US_TOKEN),
            json!({ "status": "active" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["previous_status"], "pending");
    assert_eq!(body["status"], "active");
    assert_eq!(body["changed"], true);

    let response = harness
        .router()
        .oneshot(json_request(
            Method::PATCH,
            &format!("/api/v1/listings/{}/status", reject.0),
            Some(ADMIN_US_TOKEN),
            json!({ "status": "rejected" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = harness
        .router()
        .oneshot(json_request(
            Method::PATCH,
            &format!("/api/v1/listings/{}/status", reject.0),
            Some(ADMIN_UK_TOKEN),
            json!({ "status": "rejected", "reason": "spam" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn patch_invalid_transition_conflicts() {
    let harness = harness();
    let id = seed_listing(&harness, "lst-sold", "owner-1", "us", ListingStatus::Sold, 1);

    let response = harness
        .router()
        .oneshot(json_request(
            Method::PATCH,
            &format!("/api/v1/listings/{}/status", id.0),
            Some(SUPER_TOKEN),
            json!({ "status": "active" }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "invalid_transition");
}

#[tokio::test]
async fn delete_removes_listing_for_moderators_only() {
    let harness = harness();
    let id = seed_listing(&harness, "lst-del", "owner-1", "us", ListingStatus::Active, 2);
    let uri = format!("/api/v1/listings/{}", id.0);

    let response = harness
        .router()
        .oneshot(empty_request(Method::DELETE, &uri, Some(OWNER_TOKEN)))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = harness
        .router()
        .oneshot(empty_request(Method::DELETE, &uri, Some(ADMIN_US_TOKEN)))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body, json!({ "listing_id": "lst-del", "removed": true }));
    assert_eq!(harness.listings.len(), 0);
    assert_eq!(harness.media.len(), 0);
}

#[tokio::test]
async fn queue_honours_limit_and_site() {
    let harness = harness();
    seed_listing(&harness, "lst-1", "owner-1", "us", ListingStatus::Pending, 1);
    seed_listing(&harness, "lst-2", "owner-2", "us", ListingStatus::Pending, 1);
    seed_listing(&harness, "lst-3", "owner-uk", "uk", ListingStatus::Pending, 1);

    let response = harness
        .router()
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/moderation/queue?limit=1",
            Some(ADMIN_US_TOKEN),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["listings"][0]["id"], "lst-1");

    let response = harness
        .router()
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/moderation/queue",
            Some(ADMIN_UK_TOKEN),
        ))
        .await
        .expect("router responds");
    let body = read_json_body(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["listings"][0]["id"], "lst-3");
}

fn raw_request(token: Option<&str>, body: &'static str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/listings")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).expect("request builds")
}

#[tokio::test]
async fn malformed_body_without_credentials_is_unauthorized() {
    let harness = harness();

    let response = harness
        .router()
        .oneshot(raw_request(None, "{ not json"))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "authentication_error");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn malformed_body_from_a_known_caller_is_a_validation_error() {
    let harness = harness();

    let response = harness
        .router()
        .oneshot(raw_request(Some(OWNER_TOKEN), "{ not json"))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "validation_error");
    assert_eq!(harness.listings.len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_posts_for_one_owner_respect_the_quota() {
    let harness = harness();
    let router = harness.router();

    let first = router.clone().oneshot(json_request(
        Method::POST,
        "/api/v1/listings",
        Some(OWNER_TOKEN),
        sale_body(),
    ));
    let second = router.oneshot(json_request(
        Method::POST,
        "/api/v1/listings",
        Some(OWNER_TOKEN),
        sale_body(),
    ));
    let (first, second) = tokio::join!(first, second);

    let mut statuses = vec![
        first.expect("router responds").status(),
        second.expect("router responds").status(),
    ];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::FORBIDDEN]);
    assert_eq!(harness.listings.len(), 1);
}
