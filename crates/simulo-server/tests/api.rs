// crates/simulo-server/tests/api.rs
mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{reply, Harness, BROKEN};
use http_body_util::BodyExt;
use simulo_core::memory::MemoryObjectStore;
use simulo_core::GenerationError;
use simulo_server::server::router;
use tower::ServiceExt;

const BOUNDARY: &str = "simulo-test-boundary";
const SCENE: &str = r#"[{"type":"machine","id":1}]"#;

async fn harness(script: Vec<Result<String, GenerationError>>) -> (Harness, Router) {
    let h = Harness::new(MemoryObjectStore::new(), script);
    h.projects.insert_project("p1", "alice", SCENE).await;
    let app = router(h.state.clone());
    (h, app)
}

fn multipart(fields: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    body
}

fn agent_request(project: &str, token: Option<&str>, fields: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/projects/{}/agent", project))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(multipart(fields))).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

#[tokio::test]
async fn health_is_ok() {
    let (_h, app) = harness(vec![]).await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn agent_deploys_generated_program() {
    let (h, app) = harness(vec![reply("fn update() {}")]).await;

    let (status, body) = send(app, agent_request("p1", Some("alice-token"), &[("prompt", "spin")])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");

    let deployments = h.projects.deployments("p1").await;
    assert_eq!(deployments.len(), 1);
    assert!(h.objects.get(&deployments[0].artifact_key).await.is_some());
    assert_eq!(h.sandbox_count(), 0);
}

#[tokio::test]
async fn agent_requires_a_valid_token() {
    let (h, app) = harness(vec![reply("fn update() {}")]).await;

    let (status, _) = send(app.clone(), agent_request("p1", None, &[("prompt", "spin")])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(app, agent_request("p1", Some("forged"), &[("prompt", "spin")])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn agent_validates_the_prompt() {
    let (h, app) = harness(vec![]).await;

    let (status, body) = send(app.clone(), agent_request("p1", Some("alice-token"), &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "No prompt provided");

    let (status, body) = send(app.clone(), agent_request("p1", Some("alice-token"), &[("prompt", "")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "No prompt provided");

    let long = "x".repeat(2001);
    let (status, body) = send(app, agent_request("p1", Some("alice-token"), &[("prompt", &long)])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Prompt too long");

    assert_eq!(h.generator.calls(), 0);
}

#[tokio::test]
async fn agent_checks_project_and_owner() {
    let (h, app) = harness(vec![reply("fn update() {}")]).await;

    let (status, _) = send(app.clone(), agent_request("missing", Some("alice-token"), &[("prompt", "spin")])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app, agent_request("p1", Some("bob-token"), &[("prompt", "spin")])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(h.generator.calls(), 0);
    assert!(h.projects.deployments("p1").await.is_empty());
}

#[tokio::test]
async fn agent_reports_exhausted_attempts_as_server_error() {
    let (h, app) = harness(vec![reply(BROKEN), reply(BROKEN)]).await;

    let (status, body) = send(app, agent_request("p1", Some("alice-token"), &[("prompt", "spin")])).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Internal server error");
    assert!(h.projects.deployments("p1").await.is_empty());
    assert_eq!(h.sandbox_count(), 0);
}

#[tokio::test]
async fn objects_route_is_absent_without_a_file_store() {
    let (_h, app) = harness(vec![]).await;
    let request = Request::builder()
        .uri("/objects/prog?expires=1&signature=00")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
