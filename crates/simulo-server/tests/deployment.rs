// crates/simulo-server/tests/deployment.rs
mod common;

use common::{reply, Harness, BROKEN, SETUP_FAIL};
use simulo_core::memory::MemoryObjectStore;
use simulo_core::{GenerationError, ProjectStore, Role, Scene};
use simulo_server::deploy::{DeployError, MAX_ATTEMPTS};

const SCENE: &str = r#"[{"type":"machine","id":1,"promptImages":[]}]"#;

async fn harness(script: Vec<Result<String, GenerationError>>) -> Harness {
    let h = Harness::new(MemoryObjectStore::new(), script);
    h.projects.insert_project("p1", "alice", SCENE).await;
    h
}

#[tokio::test]
async fn compile_error_is_fed_back_and_second_attempt_deploys() {
    let h = harness(vec![
        reply(&format!("fn update() {{ {} }}", BROKEN)),
        reply("fn update() {}"),
    ])
    .await;

    let outcome = h.state.deployer.deploy("p1", "spin the squares", true).await.unwrap();
    assert_eq!(outcome.attempts, 2);
    assert_eq!(h.generator.calls(), 2);
    assert_eq!(h.toolchain.builds().len(), 2);

    // Second generation saw its own failed reply and the compiler output.
    let second = &h.generator.conversations()[1];
    assert_eq!(second.len(), 4);
    assert_eq!(second[2].role, Role::Assistant);
    assert_eq!(second[3].role, Role::User);
    assert!(second[3].content.contains("E0425"));

    let deployments = h.projects.deployments("p1").await;
    assert_eq!(deployments.len(), 1);
    assert_eq!(deployments[0].source.trim(), "fn update() {}");
    assert_eq!(deployments[0].artifact_key, outcome.artifact_key);

    let stored = h.objects.get(&outcome.artifact_key).await.unwrap();
    assert!(stored.starts_with(b"wasm:"));
    assert_eq!(h.sandbox_count(), 0);
}

#[tokio::test]
async fn gives_up_after_two_broken_programs() {
    let h = harness(vec![
        reply(BROKEN),
        reply(BROKEN),
        reply("fn never_reached() {}"),
    ])
    .await;

    let err = h.state.deployer.deploy("p1", "draw", true).await.unwrap_err();
    assert!(matches!(err, DeployError::Exhausted { attempts } if attempts == MAX_ATTEMPTS));
    assert_eq!(h.generator.calls(), MAX_ATTEMPTS);
    assert!(h.projects.deployments("p1").await.is_empty());
    assert!(h.objects.is_empty().await);
    assert_eq!(h.sandbox_count(), 0);
}

#[tokio::test]
async fn generator_failures_consume_attempts() {
    let h = harness(vec![
        Err(GenerationError::Transport("connection reset".into())),
        reply("fn update() {}"),
    ])
    .await;

    let outcome = h.state.deployer.deploy("p1", "draw", true).await.unwrap();
    assert_eq!(outcome.attempts, 2);
    assert_eq!(h.toolchain.builds().len(), 1);
}

#[tokio::test]
async fn reply_without_code_block_consumes_an_attempt() {
    let h = harness(vec![
        Ok("I cannot help with that.".to_string()),
        Ok("still no code".to_string()),
    ])
    .await;

    let err = h.state.deployer.deploy("p1", "draw", true).await.unwrap_err();
    assert!(matches!(err, DeployError::Exhausted { .. }));
    assert!(h.toolchain.builds().is_empty());
}

#[tokio::test]
async fn internal_compile_failure_aborts_without_retry() {
    let h = harness(vec![reply(SETUP_FAIL), reply("fn update() {}")]).await;

    let err = h.state.deployer.deploy("p1", "draw", true).await.unwrap_err();
    assert!(matches!(err, DeployError::Internal(_)));
    assert_eq!(h.generator.calls(), 1);
    assert!(h.projects.deployments("p1").await.is_empty());
    assert_eq!(h.sandbox_count(), 0);
}

#[tokio::test]
async fn rewrite_includes_latest_source() {
    let h = harness(vec![reply("fn update() {}"), reply("fn update() {}")]).await;
    h.projects
        .append_deployment("p1", "fn old_program() {}", "a00")
        .await
        .unwrap();

    h.state.deployer.deploy("p1", "make it red", true).await.unwrap();
    h.state.deployer.deploy("p1", "start over", false).await.unwrap();

    let conversations = h.generator.conversations();
    assert!(conversations[0][1].content.contains("fn old_program() {}"));
    assert!(conversations[0][1].content.ends_with("Query: make it red"));
    assert_eq!(conversations[1][1].content, "start over");
}

#[tokio::test]
async fn prompt_is_recorded_in_scene_even_when_generation_fails() {
    let h = harness(vec![]).await;

    let err = h.state.deployer.deploy("p1", "bouncing balls", true).await.unwrap_err();
    assert!(matches!(err, DeployError::Exhausted { .. }));

    let scene = Scene::parse(&h.projects.scene("p1").await.unwrap()).unwrap();
    assert_eq!(scene.objects[0].prompt.as_deref(), Some("bouncing balls"));
    assert_eq!(scene.machine_ids().len(), 1);
}

#[tokio::test]
async fn unknown_project_is_reported() {
    let h = harness(vec![reply("fn update() {}")]).await;

    let err = h.state.deployer.deploy("nope", "draw", true).await.unwrap_err();
    assert!(matches!(err, DeployError::ProjectNotFound(id) if id == "nope"));
    assert_eq!(h.generator.calls(), 0);
}
