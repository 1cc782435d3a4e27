//! Integration tests for the authorized request pipeline

use std::sync::Arc;

use folio_core::{ApiError, ApiRequest, AuthorizedHttpClient, Config, Outcome, SessionState, SessionStore};
use mockito::{Matcher, Server, ServerGuard};
use reqwest::header::{self, HeaderValue};
use tokio_util::sync::CancellationToken;

fn session_for(server: &ServerGuard) -> Arc<SessionStore> {
    let config = Config {
        api_base_url: server.url(),
        ..Config::default()
    };
    Arc::new(SessionStore::new(&config).expect("session store"))
}

/// Sign in as U1 holding credential T1.
async fn signed_in(server: &mut ServerGuard) -> (Arc<SessionStore>, AuthorizedHttpClient) {
    server
        .mock("POST", "/auth/login")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"Login successful","accessToken":"T1"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/auth/me")
        .match_header("authorization", "Bearer T1")
        .with_status(200)
        .with_body(r#"{"id":"U1","email":"u1@example.test"}"#)
        .create_async()
        .await;

    let session = session_for(server);
    session
        .login("u1@example.test", "hunter2")
        .await
        .expect("login");
    let client = AuthorizedHttpClient::new(session.clone());
    (session, client)
}

#[tokio::test]
async fn empty_session_refreshes_before_first_request() {
    //* Given
    let mut server = Server::new_async().await;
    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(r#"{"accessToken":"T1"}"#)
        .expect(1)
        .create_async()
        .await;
    let me_mock = server
        .mock("GET", "/auth/me")
        .match_header("authorization", "Bearer T1")
        .with_status(200)
        .with_body(r#"{"id":"U1"}"#)
        .expect(1)
        .create_async()
        .await;
    let portfolio_mock = server
        .mock("GET", "/portfolio/123")
        .match_header("authorization", "Bearer T1")
        .with_status(200)
        .with_body(r#"{"holdings":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let session = session_for(&server);
    let client = AuthorizedHttpClient::new(session.clone());
    assert_eq!(session.state().await, SessionState::Empty);

    //* When
    let outcome = client
        .authorized_request(ApiRequest::get("/portfolio/123"))
        .await
        .expect("request");

    //* Then
    refresh_mock.assert_async().await;
    me_mock.assert_async().await;
    portfolio_mock.assert_async().await;
    assert!(matches!(outcome, Outcome::Response(_)));
    assert_eq!(outcome.status(), 200);
    assert_eq!(session.identity().await.map(|i| i.id).as_deref(), Some("U1"));
}

#[tokio::test]
async fn unauthorized_response_refreshes_and_retries_once() {
    //* Given
    let mut server = Server::new_async().await;
    let (session, client) = signed_in(&mut server).await;

    let primary_mock = server
        .mock("GET", "/portfolio/U1")
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(r#"{"accessToken":"T2"}"#)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/auth/me")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_body(r#"{"id":"U1"}"#)
        .create_async()
        .await;
    let retry_mock = server
        .mock("GET", "/portfolio/U1")
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_body(r#"{"holdings":[{"symbol":"AAPL","quantity":1,"averagePrice":100}]}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let outcome = client
        .authorized_request(ApiRequest::get("/portfolio/U1"))
        .await
        .expect("request");

    //* Then
    primary_mock.assert_async().await;
    refresh_mock.assert_async().await;
    retry_mock.assert_async().await;
    assert!(!outcome.is_unauthorized());
    let body = outcome.into_response().text().await.expect("body");
    assert!(body.contains("AAPL"));
    assert!(session.is_authenticated().await);
}

#[tokio::test]
async fn failed_refresh_returns_original_unauthorized_response() {
    //* Given
    let mut server = Server::new_async().await;
    let (session, client) = signed_in(&mut server).await;

    // Path-only matcher: counts every attempt, whatever its headers
    let resource_mock = server
        .mock("GET", "/portfolio/U1")
        .with_status(401)
        .with_body("token expired")
        .expect(1)
        .create_async()
        .await;
    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .with_status(401)
        .with_body("Invalid refresh token")
        .expect(1)
        .create_async()
        .await;

    //* When
    let outcome = client
        .authorized_request(ApiRequest::get("/portfolio/U1"))
        .await
        .expect("request");

    //* Then
    resource_mock.assert_async().await;
    refresh_mock.assert_async().await;
    match outcome {
        Outcome::Unauthorized { response, retried } => {
            assert!(!retried);
            assert_eq!(response.status(), 401);
            assert_eq!(response.text().await.expect("body"), "token expired");
        }
        other => panic!("expected unauthorized outcome, got {:?}", other),
    }
    assert_eq!(session.state().await, SessionState::Empty);
    assert!(session.identity().await.is_none());
}

#[tokio::test]
async fn retry_is_not_repeated_when_still_unauthorized() {
    //* Given
    let mut server = Server::new_async().await;
    let (_session, client) = signed_in(&mut server).await;

    let resource_mock = server
        .mock("GET", "/settings")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(r#"{"accessToken":"T2"}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let outcome = client
        .authorized_request(ApiRequest::get("/settings"))
        .await
        .expect("request");

    //* Then
    resource_mock.assert_async().await;
    refresh_mock.assert_async().await;
    assert!(matches!(outcome, Outcome::Unauthorized { retried: true, .. }));
    assert_eq!(outcome.status(), 401);
}

#[tokio::test]
async fn missing_credential_proceeds_without_authorization() {
    //* Given
    let mut server = Server::new_async().await;
    // Once before the request, once after the 401
    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let resource_mock = server
        .mock("GET", "/search")
        .match_query(Matcher::Any)
        .match_header("authorization", Matcher::Missing)
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let session = session_for(&server);
    let client = AuthorizedHttpClient::new(session.clone());

    //* When
    let outcome = client
        .authorized_request(ApiRequest::get("/search?query=aapl"))
        .await
        .expect("request");

    //* Then
    refresh_mock.assert_async().await;
    resource_mock.assert_async().await;
    assert!(matches!(outcome, Outcome::Unauthorized { retried: false, .. }));
}

#[tokio::test]
async fn other_error_statuses_are_returned_untouched() {
    //* Given
    let mut server = Server::new_async().await;
    let (_session, client) = signed_in(&mut server).await;

    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .expect(0)
        .create_async()
        .await;
    let resource_mock = server
        .mock("GET", "/stocks/ZZZZ")
        .with_status(404)
        .with_body(r#"{"detail":"Ticker not found or API limit reached"}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let outcome = client
        .authorized_request(ApiRequest::get("/stocks/ZZZZ"))
        .await
        .expect("request");

    //* Then
    refresh_mock.assert_async().await;
    resource_mock.assert_async().await;
    assert!(matches!(outcome, Outcome::Response(_)));
    assert_eq!(outcome.status(), 404);
}

#[tokio::test]
async fn caller_headers_merge_but_authorization_is_client_owned() {
    //* Given
    let mut server = Server::new_async().await;
    let (_session, client) = signed_in(&mut server).await;

    let resource_mock = server
        .mock("POST", "/agent/query")
        .match_header("authorization", "Bearer T1")
        .match_header("content-type", "text/plain")
        .match_header("x-client", "dashboard")
        .match_body("hello")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    //* When
    let request = ApiRequest::post("/agent/query")
        .body("hello")
        .header(header::AUTHORIZATION, HeaderValue::from_static("Bearer forged"))
        .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
        .header(
            header::HeaderName::from_static("x-client"),
            HeaderValue::from_static("dashboard"),
        );
    let outcome = client.authorized_request(request).await.expect("request");

    //* Then
    resource_mock.assert_async().await;
    assert_eq!(outcome.status(), 200);
}

#[tokio::test]
async fn retried_request_resends_the_same_body() {
    //* Given
    let mut server = Server::new_async().await;
    let (_session, client) = signed_in(&mut server).await;

    let body = serde_json::json!({ "symbol": "AAPL", "quantity": 2.0, "buyPrice": 180.0 });
    let primary_mock = server
        .mock("POST", "/portfolio/U1/holdings")
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(r#"{"accessToken":"T2"}"#)
        .create_async()
        .await;
    let retry_mock = server
        .mock("POST", "/portfolio/U1/holdings")
        .match_header("authorization", "Bearer T2")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(body.clone()))
        .with_status(200)
        .with_body(r#"{"symbol":"AAPL","quantity":2,"averagePrice":180}"#)
        .expect(1)
        .create_async()
        .await;

    //* When
    let request = ApiRequest::post("/portfolio/U1/holdings")
        .json(&body)
        .expect("json body");
    let outcome = client.authorized_request(request).await.expect("request");

    //* Then
    primary_mock.assert_async().await;
    retry_mock.assert_async().await;
    assert_eq!(outcome.status(), 200);
}

#[tokio::test]
async fn transport_failure_is_an_error() {
    //* Given
    let mut server = Server::new_async().await;
    let (_session, client) = signed_in(&mut server).await;
    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .expect(0)
        .create_async()
        .await;

    //* When
    let result = client
        .authorized_request(ApiRequest::get("http://127.0.0.1:1/portfolio/U1"))
        .await;

    //* Then
    refresh_mock.assert_async().await;
    let err = result.expect_err("connection should be refused");
    assert!(err.is_transport(), "unexpected error: {:?}", err);
}

#[tokio::test]
async fn cancelled_request_sends_nothing() {
    //* Given
    let mut server = Server::new_async().await;
    let (_session, client) = signed_in(&mut server).await;
    let resource_mock = server
        .mock("GET", "/portfolio/U1")
        .expect(0)
        .create_async()
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    //* When
    let result = client
        .authorized_request_with_cancel(ApiRequest::get("/portfolio/U1"), &cancel)
        .await;

    //* Then
    resource_mock.assert_async().await;
    assert!(matches!(result, Err(ApiError::Cancelled)));
}

#[tokio::test]
async fn uncancelled_request_completes_normally() {
    //* Given
    let mut server = Server::new_async().await;
    let (_session, client) = signed_in(&mut server).await;
    let resource_mock = server
        .mock("GET", "/portfolio/U1")
        .match_header("authorization", "Bearer T1")
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    //* When
    let outcome = client
        .authorized_request_with_cancel(ApiRequest::get("/portfolio/U1"), &CancellationToken::new())
        .await
        .expect("request");

    //* Then
    resource_mock.assert_async().await;
    assert_eq!(outcome.status(), 200);
}

#[tokio::test]
async fn concurrent_unauthorized_requests_both_retry_with_fresh_credential() {
    //* Given
    let mut server = Server::new_async().await;
    let (session, client) = signed_in(&mut server).await;

    let primary_mock = server
        .mock("GET", Matcher::Regex(r"^/stocks/".to_string()))
        .match_header("authorization", "Bearer T1")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    // Overlapping refreshes coalesce; a late second 401 may still refresh again
    let refresh_mock = server
        .mock("POST", "/auth/refresh")
        .with_status(200)
        .with_body(r#"{"accessToken":"T2"}"#)
        .expect_at_least(1)
        .expect_at_most(2)
        .create_async()
        .await;
    let retry_mock = server
        .mock("GET", Matcher::Regex(r"^/stocks/".to_string()))
        .match_header("authorization", "Bearer T2")
        .with_status(200)
        .with_body(r#"{"symbol":"X","current":1,"change":0,"percent":0}"#)
        .expect(2)
        .create_async()
        .await;

    //* When
    let (a, b) = tokio::join!(
        client.authorized_request(ApiRequest::get("/stocks/AAPL")),
        client.authorized_request(ApiRequest::get("/stocks/MSFT")),
    );

    //* Then
    primary_mock.assert_async().await;
    refresh_mock.assert_async().await;
    retry_mock.assert_async().await;
    assert_eq!(a.expect("a").status(), 200);
    assert_eq!(b.expect("b").status(), 200);
    assert!(session.is_authenticated().await);
}
