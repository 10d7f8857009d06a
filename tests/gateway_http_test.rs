use std::sync::Arc;

use pcm_dialog::agent::embedding::HashingEmbedder;
use pcm_dialog::agent::providers::MockProvider;
use pcm_dialog::config::DialogConfig;
use pcm_dialog::gateway::{AppState, server::GENERIC_FAILURE};
use pcm_dialog::memory::document::InMemoryDocumentStore;
use pcm_dialog::pipeline::Pipeline;
use tokio::time::{Duration, sleep};

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral")
        .local_addr()
        .expect("local addr")
        .port()
}

async fn wait_for_health(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port}/health");

    for _ in 0..80 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        sleep(Duration::from_millis(50)).await;
    }

    panic!("gateway did not become healthy at {url}");
}

/// Start a gateway backed by a scripted mock model; returns its port.
async fn spawn_gateway(
    responses: Vec<&str>,
    token: Option<&str>,
) -> (u16, tokio::task::JoinHandle<()>) {
    let pipeline = Pipeline::new(
        Arc::new(MockProvider::scripted(responses)),
        Arc::new(HashingEmbedder::new(64)),
        Arc::new(InMemoryDocumentStore::new()),
        &DialogConfig::default(),
    )
    .await
    .expect("pipeline");
    let state = Arc::new(AppState::new(pipeline, token.map(String::from)));

    let port = free_port();
    let addr = format!("127.0.0.1:{port}");
    let gateway = tokio::spawn(async move {
        let _ = pcm_dialog::gateway::server::serve(&addr, state).await;
    });
    wait_for_health(port).await;
    (port, gateway)
}

#[tokio::test]
async fn run_rejects_non_loopback_without_token() {
    let mut config = DialogConfig::default();
    config.gateway.bind = "0.0.0.0".to_string();
    config.gateway.port = free_port();

    let err = pcm_dialog::gateway::run(config, None)
        .await
        .expect_err("non-loopback run without token must fail");
    assert!(err.to_string().contains("Auth token required"));
}

#[tokio::test]
async fn run_serves_health_with_default_config() {
    let mut config = DialogConfig::default();
    config.model.provider = "mock".into();
    let port = free_port();
    config.gateway.port = port;

    let gateway = tokio::spawn(async move {
        let _ = pcm_dialog::gateway::run(config, None).await;
    });
    wait_for_health(port).await;

    let body = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .expect("health response")
        .text()
        .await
        .expect("health body");
    assert_eq!(body, "ok");

    gateway.abort();
    let _ = gateway.await;
}

#[tokio::test]
async fn post_root_returns_task_result() {
    let (port, gateway) = spawn_gateway(
        vec!["Inner speech: weighing it\nOutput: The blue one"],
        None,
    )
    .await;

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/"))
        .body("QA#Alice#Bob#Answer as Bob.#None#Which cup?")
        .send()
        .await
        .expect("response");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "The blue one");

    gateway.abort();
    let _ = gateway.await;
}

#[tokio::test]
async fn undecodable_line_is_bad_request() {
    let (port, gateway) = spawn_gateway(vec![], None).await;

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/"))
        .body("XY#Alice#Bob#None#None#hi")
        .send()
        .await
        .expect("response");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(response.text().await.unwrap().contains("task is not identified"));

    gateway.abort();
    let _ = gateway.await;
}

#[tokio::test]
async fn start_returns_empty_ok_and_rejects_blank_session() {
    let (port, gateway) = spawn_gateway(vec![], None).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://127.0.0.1:{port}/start"))
        .body("runs\\sim2")
        .send()
        .await
        .expect("response");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "");

    let response = client
        .post(format!("http://127.0.0.1:{port}/start"))
        .body("   ")
        .send()
        .await
        .expect("response");
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.text().await.unwrap(), GENERIC_FAILURE);

    gateway.abort();
    let _ = gateway.await;
}

#[tokio::test]
async fn token_is_required_when_configured() {
    let (port, gateway) = spawn_gateway(vec![], Some("secret")).await;
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port}/");

    let denied = client
        .post(&url)
        .body("QA#Alice#Bob#None#None#hi")
        .send()
        .await
        .expect("response");
    assert_eq!(denied.status(), reqwest::StatusCode::UNAUTHORIZED);

    let allowed = client
        .post(&url)
        .bearer_auth("secret")
        .body("QA#Alice#Bob#None#None#hi")
        .send()
        .await
        .expect("response");
    assert_eq!(allowed.status(), reqwest::StatusCode::OK);
    assert_eq!(allowed.text().await.unwrap(), "Mock response");

    gateway.abort();
    let _ = gateway.await;
}
