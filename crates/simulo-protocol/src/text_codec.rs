//! Text frames.
//!
//! Pipe-separated lines, one per WebSocket text message:
//!
//! ```text
//! scene|<json>                      server → editor
//! machineonline|<id>|<true|false>   server → editor
//! <bearer token>|<project id>       editor → server (first frame only)
//! ```

use simulo_core::{EditorPush, MachineId};

use crate::binary_codec::ProtocolError;

const SCENE_TAG: &str = "scene";
const MACHINE_ONLINE_TAG: &str = "machineonline";

/// Credentials carried by an editor's first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAuth {
    pub token: String,
    pub project_id: String,
}

/// Parse `<token>|<project id>`.
///
/// Returns `None` unless the line splits into exactly two parts.
pub fn parse_user_auth(line: &str) -> Option<UserAuth> {
    let mut parts = line.split('|');
    let token = parts.next()?;
    let project_id = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    Some(UserAuth {
        token: token.to_string(),
        project_id: project_id.to_string(),
    })
}

/// Format a text push; `None` for pushes carried as binary.
pub fn format_push(push: &EditorPush) -> Option<String> {
    match push {
        EditorPush::Scene(json) => Some(format!("{}|{}", SCENE_TAG, json)),
        EditorPush::MachineOnline { machine_id, online } => Some(format!(
            "{}|{}|{}",
            MACHINE_ONLINE_TAG, machine_id, online
        )),
        EditorPush::AddPromptImage { .. } | EditorPush::DeletePromptImage { .. } => None,
    }
}

/// Parse a text push (editor side).
pub fn parse_push(line: &str) -> Result<EditorPush, ProtocolError> {
    let (tag, rest) = line
        .split_once('|')
        .ok_or(ProtocolError::MalformedText("missing tag"))?;

    match tag {
        SCENE_TAG => Ok(EditorPush::Scene(rest.to_string())),
        MACHINE_ONLINE_TAG => {
            let (id, online) = rest
                .split_once('|')
                .ok_or(ProtocolError::MalformedText("missing status"))?;
            let machine_id = id
                .parse::<i64>()
                .map_err(|_| ProtocolError::MalformedText("machine id"))?;
            let online = match online {
                "true" => true,
                "false" => false,
                _ => return Err(ProtocolError::MalformedText("status")),
            };
            Ok(EditorPush::MachineOnline {
                machine_id: MachineId(machine_id),
                online,
            })
        }
        _ => Err(ProtocolError::MalformedText("unknown tag")),
    }
}
