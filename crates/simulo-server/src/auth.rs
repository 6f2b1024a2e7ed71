//! First-frame authentication.
//!
//! A binary first frame is a machine proving its identity with an
//! Ed25519 signature over its ID; a text first frame is an editor
//! presenting a bearer token and the project it wants to open. Either
//! way the outcome is a [`Session`] or the close code to reject with.

use ed25519_dalek::pkcs8::DecodePublicKey;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use simulo_core::{AssetRef, AuthError, EditorPush, InitAssets, MachineId, MachineMessage, Scene};
use simulo_protocol::wire_types::SIGNATURE_LEN;
use simulo_protocol::{
    decode_machine_auth, encode_machine, parse_user_auth, CloseCode, Frame, MachineAuthError,
};
use tracing::{debug, info, warn};

use crate::connection::{send_push, Session, PRESIGN_TTL};
use crate::server::AppState;
use crate::types::{ConnectionId, Inbound, Outbound, OutboundTx};

/// Classify a connection by its first frame.
pub async fn authenticate(
    state: &AppState,
    conn: ConnectionId,
    first: Inbound,
    out: &OutboundTx,
) -> Result<Session, CloseCode> {
    match first {
        Inbound::Binary(frame) => authenticate_machine(state, conn, &frame, out).await,
        Inbound::Text(line) => authenticate_user(state, &line, out).await,
        Inbound::Closed => Err(CloseCode::UnsupportedFrame),
    }
}

async fn authenticate_machine(
    state: &AppState,
    conn: ConnectionId,
    frame: &[u8],
    out: &OutboundTx,
) -> Result<Session, CloseCode> {
    let auth = decode_machine_auth(frame).map_err(|e| {
        warn!(error = %e, "rejecting machine auth frame");
        match e {
            MachineAuthError::InvalidLength(_) => CloseCode::InvalidAuthLength,
            MachineAuthError::LengthMismatch { .. } => CloseCode::AuthLengthMismatch,
            MachineAuthError::InvalidMachineId => CloseCode::InvalidMachineId,
        }
    })?;
    let machine_id = auth.machine_id;

    let public_key = state
        .projects
        .device_public_key(machine_id)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                warn!(machine_id = %machine_id, "unknown machine");
                CloseCode::UnknownMachine
            } else {
                warn!(machine_id = %machine_id, error = %e, "device key lookup failed");
                CloseCode::Internal
            }
        })?;

    if !verify_machine_signature(&public_key, auth.id_text.as_bytes(), &auth.signature) {
        warn!(machine_id = %machine_id, "machine signature rejected");
        return Err(CloseCode::BadSignature);
    }

    // A reconnecting machine takes over presence from its stale socket.
    state.presence.claim(machine_id, conn.0).await;
    info!(machine_id = %machine_id, connection = conn.0, "machine authenticated");

    send_init_assets(state, machine_id, out).await;
    Ok(Session::Machine { machine_id })
}

/// Check an Ed25519 signature against a PEM (SPKI) public key.
///
/// An unparsable key verifies nothing.
pub fn verify_machine_signature(
    public_key_pem: &str,
    message: &[u8],
    signature: &[u8; SIGNATURE_LEN],
) -> bool {
    let key = match VerifyingKey::from_public_key_pem(public_key_pem) {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, "stored device key is not an Ed25519 SPKI PEM");
            return false;
        }
    };
    let signature = Signature::from_bytes(signature);
    key.verify(message, &signature).is_ok()
}

/// Push the program and auxiliary assets a machine should run.
///
/// Nothing is sent when no program has been deployed or an asset cannot
/// be resolved; the machine keeps whatever it already has.
async fn send_init_assets(state: &AppState, machine_id: MachineId, out: &OutboundTx) {
    let assets = match state.projects.machine_assets(machine_id).await {
        Ok(assets) => assets,
        Err(e) => {
            warn!(machine_id = %machine_id, error = %e, "failed to load machine assets");
            return;
        }
    };

    let Some(program_key) = assets.program else {
        info!(machine_id = %machine_id, "no program deployed, skipping asset push");
        return;
    };

    let program = match resolve_asset(state, &program_key).await {
        Some(asset) => asset,
        None => return,
    };

    let mut extras = Vec::with_capacity(assets.extras.len());
    for key in &assets.extras {
        match resolve_asset(state, key).await {
            Some(asset) => extras.push(asset),
            None => return,
        }
    }

    let msg = MachineMessage::InitAssets(InitAssets { program, extras });
    let mut buf = Vec::with_capacity(256);
    if let Err(e) = encode_machine(&msg, &mut buf) {
        warn!(machine_id = %machine_id, error = %e, "failed to encode asset push");
        return;
    }
    let _ = out.send(Outbound::Frame(Frame::Binary(buf)));
}

async fn resolve_asset(state: &AppState, key: &str) -> Option<AssetRef> {
    let url = match state.objects.presign_get(key, PRESIGN_TTL).await {
        Ok(url) => url,
        Err(e) => {
            warn!(object = %key, error = %e, "failed to presign asset");
            return None;
        }
    };
    match state.objects.content_hash(key).await {
        Ok(hash) => Some(AssetRef { url, hash }),
        Err(e) => {
            warn!(object = %key, error = %e, "failed to hash asset");
            None
        }
    }
}

async fn authenticate_user(
    state: &AppState,
    line: &str,
    out: &OutboundTx,
) -> Result<Session, CloseCode> {
    let auth = parse_user_auth(line).ok_or(CloseCode::InvalidAuthFormat)?;

    let user = state
        .identity
        .resolve_user(&auth.token)
        .await
        .map_err(|e| match e {
            AuthError::InvalidToken => CloseCode::Unauthorized,
            AuthError::Unavailable(cause) => {
                warn!(cause = %cause, "identity provider unavailable");
                CloseCode::Internal
            }
        })?;

    let project = state
        .projects
        .get_project(&auth.project_id)
        .await
        .map_err(|e| {
            if e.is_not_found() {
                CloseCode::ProjectNotFound
            } else {
                warn!(project_id = %auth.project_id, error = %e, "project lookup failed");
                CloseCode::Internal
            }
        })?;

    if project.owner != user.id {
        warn!(user = %user.id, project_id = %auth.project_id, "user does not own project");
        return Err(CloseCode::NotProjectOwner);
    }

    info!(user = %user.id, project_id = %auth.project_id, "user authenticated");
    send_push(out, &EditorPush::Scene(project.scene.clone()));

    match Scene::parse(&project.scene) {
        Ok(scene) => {
            for machine_id in scene.machine_ids() {
                let online = state.presence.has(machine_id).await;
                send_push(out, &EditorPush::MachineOnline { machine_id, online });
            }
            for key in scene.prompt_images() {
                match state.objects.presign_get(key, PRESIGN_TTL).await {
                    Ok(url) => send_push(out, &EditorPush::AddPromptImage { url }),
                    Err(e) => debug!(object = %key, error = %e, "skipping prompt image"),
                }
            }
        }
        Err(e) => warn!(project_id = %auth.project_id, error = %e, "scene is not valid JSON"),
    }

    Ok(Session::User {
        user_id: user.id,
        project_id: auth.project_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
    use ed25519_dalek::pkcs8::EncodePublicKey;
    use ed25519_dalek::{Signer, SigningKey};

    #[test]
    fn signature_checks() {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let pem = signing
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let signature = signing.sign(b"42").to_bytes();

        assert!(verify_machine_signature(&pem, b"42", &signature));
        assert!(!verify_machine_signature(&pem, b"43", &signature));
        assert!(!verify_machine_signature("not a key", b"42", &signature));

        let other = SigningKey::from_bytes(&[8u8; 32])
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        assert!(!verify_machine_signature(&other, b"42", &signature));
    }
}
