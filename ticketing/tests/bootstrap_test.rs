//! Application assembly: builder steps, serving, graceful shutdown.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use cinema_ticketing::ApplicationBuilder;
use cinema_ticketing::config::{
    Config, LoyaltyConfig, PostgresConfig, ServerConfig, ServiceUrls, StorageBackend,
    WorkflowConfig,
};
use common::{ScriptedCatalog, ScriptedDirectory, bearer};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

fn memory_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            metrics_host: "127.0.0.1".into(),
            metrics_port: 0,
            shutdown_timeout: 5,
        },
        storage: StorageBackend::Memory,
        postgres: PostgresConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
            connect_timeout: 1,
        },
        services: ServiceUrls {
            user: "http://127.0.0.1:1/graphql".into(),
            movie: "http://127.0.0.1:1/graphql".into(),
            cinema: "http://127.0.0.1:1/graphql".into(),
            booking: String::new(),
            payment: String::new(),
            coupon: String::new(),
            timeout_secs: 1,
        },
        workflow: WorkflowConfig {
            sweep_interval_secs: 1,
            ..WorkflowConfig::default()
        },
        loyalty: LoyaltyConfig::default(),
    }
}

#[tokio::test]
async fn build_requires_config_and_resources() {
    let err = ApplicationBuilder::new().build().await.err().unwrap();
    assert!(err.to_string().contains("Config"));

    let err = ApplicationBuilder::new()
        .with_config(memory_config())
        .build()
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("Resources"));

    let err = ApplicationBuilder::new()
        .with_resources()
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("Config"));
}

#[tokio::test]
async fn serves_graphql_until_shutdown() {
    let app = ApplicationBuilder::new()
        .with_config(memory_config())
        .with_resources()
        .await
        .unwrap()
        .with_user_directory(Arc::new(ScriptedDirectory::default()))
        .with_catalog(Arc::new(ScriptedCatalog::default()))
        .with_collaborators()
        .unwrap()
        .build()
        .await
        .unwrap();
    let addr = app.local_addr().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = app.run_until(async move {
        let _ = stop_rx.await;
    });

    let requests = async move {
        let client = reqwest::Client::new();
        let health = client
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .unwrap();
        assert!(health.status().is_success());

        let body: Value = client
            .post(format!("http://{addr}/graphql"))
            .header("Authorization", bearer(8))
            .json(&json!({ "query": "{ me { id } myLoyalty { nextMilestone } }" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        stop_tx.send(()).unwrap();
        body
    };

    let (result, body) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(server, requests)
    })
    .await
    .expect("shutdown finished");
    assert!(result.is_ok());
    assert_eq!(body["data"]["me"]["id"], json!("8"));
    assert_eq!(body["data"]["myLoyalty"]["nextMilestone"], json!(3));
}

#[tokio::test]
async fn unreachable_collaborators_do_not_block_startup() {
    let app = ApplicationBuilder::new()
        .with_config(memory_config())
        .with_resources()
        .await
        .unwrap()
        .with_collaborators()
        .unwrap()
        .build()
        .await
        .unwrap();
    let addr = app.local_addr().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = app.run_until(async move {
        let _ = stop_rx.await;
    });

    let requests = async move {
        let body: Value = reqwest::Client::new()
            .post(format!("http://{addr}/graphql"))
            .json(&json!({ "query": "{ movies { success error } showtimes { success data { id } } }" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        stop_tx.send(()).unwrap();
        body
    };

    let (result, body) = tokio::join!(server, requests);
    assert!(result.is_ok());
    assert_eq!(body["data"]["movies"]["success"], json!(false));
    assert_eq!(body["data"]["movies"]["error"], json!("movie service unavailable"));
    assert_eq!(body["data"]["showtimes"]["success"], json!(true));
}
