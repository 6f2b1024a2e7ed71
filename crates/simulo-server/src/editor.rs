//! Handlers for frames from an authenticated editor.
//!
//! Every mutation re-reads the project's scene, patches it and writes the
//! whole document back.

use simulo_core::{EditorMessage, EditorPush, Project, Scene};
use simulo_protocol::{decode_editor, CloseCode, ProtocolError};
use tracing::{debug, info, warn};

use crate::connection::{send_push, PRESIGN_TTL};
use crate::server::AppState;
use crate::types::OutboundTx;

/// Dispatch one binary frame. An `Err` closes the connection.
pub async fn handle_editor_frame(
    state: &AppState,
    project_id: &str,
    frame: &[u8],
    out: &OutboundTx,
) -> Result<(), CloseCode> {
    if frame.is_empty() {
        return Err(CloseCode::EmptyMessage);
    }

    let msg = decode_editor(frame).map_err(|e| {
        warn!(project_id = %project_id, error = %e, "bad editor frame");
        match e {
            ProtocolError::UnknownOpcode(_) => CloseCode::UnknownMessageType,
            _ => CloseCode::MalformedPayload,
        }
    })?;

    match msg {
        EditorMessage::AddImages(add) => add_images(state, project_id, add.uploads, out).await,
        EditorMessage::DeleteImage(del) => delete_image(state, project_id, del.index, out).await,
    }
}

async fn add_images(
    state: &AppState,
    project_id: &str,
    uploads: Vec<Vec<u8>>,
    out: &OutboundTx,
) -> Result<(), CloseCode> {
    for blob in uploads {
        let project = load_project(state, project_id).await?;
        let Some(mut scene) = parse_scene(project_id, &project) else {
            return Ok(());
        };

        let key = new_image_key();
        if !scene.push_prompt_image(key.as_str()) {
            warn!(project_id = %project_id, "scene has no objects, dropping image");
            continue;
        }

        if let Err(e) = state.objects.put(&key, blob).await {
            warn!(project_id = %project_id, object = %key, error = %e, "image upload failed");
            continue;
        }

        if let Err(e) = state.projects.update_scene(project_id, &scene.to_text()).await {
            warn!(project_id = %project_id, error = %e, "failed to save scene");
            if let Err(e) = state.objects.delete(&key).await {
                debug!(object = %key, error = %e, "failed to remove orphaned image");
            }
            continue;
        }
        info!(project_id = %project_id, object = %key, "prompt image added");

        match state.objects.presign_get(&key, PRESIGN_TTL).await {
            Ok(url) => send_push(out, &EditorPush::AddPromptImage { url }),
            Err(e) => warn!(object = %key, error = %e, "failed to presign new image"),
        }
    }
    Ok(())
}

async fn delete_image(
    state: &AppState,
    project_id: &str,
    index: u8,
    out: &OutboundTx,
) -> Result<(), CloseCode> {
    let project = load_project(state, project_id).await?;
    let Some(mut scene) = parse_scene(project_id, &project) else {
        return Ok(());
    };

    let Some(key) = scene.remove_prompt_image(index as usize) else {
        debug!(project_id = %project_id, index, "prompt image index out of range");
        return Ok(());
    };

    if let Err(e) = state.objects.delete(&key).await {
        warn!(object = %key, error = %e, "failed to delete image object");
    }

    if let Err(e) = state.projects.update_scene(project_id, &scene.to_text()).await {
        warn!(project_id = %project_id, error = %e, "failed to save scene");
        return Ok(());
    }
    info!(project_id = %project_id, object = %key, index, "prompt image removed");

    send_push(out, &EditorPush::DeletePromptImage { index });
    Ok(())
}

async fn load_project(state: &AppState, project_id: &str) -> Result<Project, CloseCode> {
    state.projects.get_project(project_id).await.map_err(|e| {
        if e.is_not_found() {
            warn!(project_id = %project_id, "project disappeared during session");
            CloseCode::ProjectGone
        } else {
            warn!(project_id = %project_id, error = %e, "project lookup failed");
            CloseCode::Internal
        }
    })
}

fn parse_scene(project_id: &str, project: &Project) -> Option<Scene> {
    match Scene::parse(&project.scene) {
        Ok(scene) => Some(scene),
        Err(e) => {
            warn!(project_id = %project_id, error = %e, "scene is not valid JSON, leaving it untouched");
            None
        }
    }
}

/// Object key for an uploaded prompt image.
fn new_image_key() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}
