//! Downstream GraphQL transport against a real local HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use cinema_core::Error;
use cinema_ticketing::gateway::{
    Catalog, MOVIE_SERVICE, RemoteCatalog, RemoteService, RemoteUserDirectory, Role,
    USER_SERVICE, UserDirectory,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;

async fn movies() -> Json<Value> {
    Json(json!({
        "data": {
            "movies": [
                { "id": 1, "title": "Arrival", "genre": "Sci-Fi", "duration": 116 },
                { "id": "2", "title": "Heat", "releaseDate": "1995-12-15" }
            ]
        }
    }))
}

async fn me(headers: HeaderMap) -> Json<Value> {
    let me = match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some("Bearer root") => json!({ "id": "1", "username": "root", "email": "root@x", "role": "ADMIN" }),
        Some("Bearer ann") => json!({ "id": 5, "username": "ann", "email": "ann@x", "role": "USER" }),
        _ => Value::Null,
    };
    Json(json!({ "data": { "me": me } }))
}

async fn graphql_error() -> Json<Value> {
    Json(json!({
        "data": null,
        "errors": [{ "message": "movie 9 not found", "extensions": { "code": "NOT_FOUND" } }]
    }))
}

async fn rejected() -> impl IntoResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "errors": [{ "message": "title is required" }] })),
    )
}

async fn unauthorized() -> StatusCode {
    StatusCode::UNAUTHORIZED
}

async fn overloaded() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn html() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html")], "<h1>maintenance</h1>")
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({ "data": { "movies": [] } }))
}

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/movies", post(movies))
        .route("/me", post(me))
        .route("/error", post(graphql_error))
        .route("/rejected", post(rejected))
        .route("/unauthorized", post(unauthorized))
        .route("/overloaded", post(overloaded))
        .route("/html", post(html))
        .route("/slow", post(slow));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn service(addr: SocketAddr, path: &str) -> RemoteService {
    RemoteService::new(
        MOVIE_SERVICE,
        format!("http://{addr}{path}"),
        Duration::from_millis(300),
    )
    .unwrap()
}

async fn fetch(service: &RemoteService) -> cinema_core::Result<Value> {
    service.query("query { movies { id } }", json!({}), None).await
}

#[tokio::test]
async fn catalog_decodes_mixed_id_types() {
    let addr = spawn_server().await;
    let catalog = RemoteCatalog::new(service(addr, "/movies"), service(addr, "/html"));

    let movies = catalog.movies(None).await.unwrap();
    assert_eq!(movies.len(), 2);
    assert_eq!(movies[0].id, "1");
    assert_eq!(movies[0].duration, Some(116));
    assert_eq!(movies[1].id, "2");
    assert_eq!(movies[1].release_date.as_deref(), Some("1995-12-15"));

    let err = catalog.cinemas(None).await.unwrap_err();
    assert!(err.is_availability());
}

#[tokio::test]
async fn user_directory_forwards_the_header() {
    let addr = spawn_server().await;
    let users = RemoteUserDirectory::new(
        RemoteService::new(USER_SERVICE, format!("http://{addr}/me"), Duration::from_secs(1))
            .unwrap(),
    );

    let root = users.verify("Bearer root").await.unwrap();
    assert_eq!(root.role, Role::Admin);
    let ann = users.verify("Bearer ann").await.unwrap();
    assert_eq!(ann.user_id.get(), 5);
    assert_eq!(ann.role, Role::User);

    let err = users.verify("Bearer nobody").await.unwrap_err();
    assert!(matches!(err, Error::InvalidToken));
}

#[tokio::test]
async fn graphql_errors_keep_their_code() {
    let addr = spawn_server().await;

    let err = fetch(&service(addr, "/error")).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    let err = fetch(&service(addr, "/rejected")).await.unwrap_err();
    assert_eq!(err.code(), "BAD_INPUT");
    assert_eq!(err.public_message(), "title is required");

    let err = fetch(&service(addr, "/unauthorized")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidToken));
}

#[tokio::test]
async fn broken_services_are_unavailable() {
    let addr = spawn_server().await;

    for path in ["/overloaded", "/html"] {
        let err = fetch(&service(addr, path)).await.unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE", "{path}");
        assert_eq!(err.to_string(), "movie service unavailable");
    }

    let err = fetch(&service(addr, "/slow")).await.unwrap_err();
    assert_eq!(err.code(), "TIMEOUT");
}

#[tokio::test]
async fn refused_connections_are_unavailable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = fetch(&service(addr, "/movies")).await.unwrap_err();
    assert!(matches!(err, Error::UpstreamUnavailable { .. }));
}
