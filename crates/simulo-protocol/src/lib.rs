//! simulo-protocol
//!
//! Wire-level encoding/decoding for the Simulo session channel.
//!
//! This crate turns logical session messages (`simulo_core::EditorMessage`,
//! `EditorPush`, `MachineMessage`) into frames and back again.
//!
//! - [`binary_codec`] : binary frames and the machine auth frame
//! - [`text_codec`]   : pipe-separated text frames
//! - [`wire_types`]   : opcodes, limits, close codes

pub mod wire_types;
pub mod binary_codec;
pub mod text_codec;

use simulo_core::EditorPush;

pub use binary_codec::{
    MachineAuth,
    MachineAuthError,
    ProtocolError,
    decode_editor,
    encode_editor,
    decode_editor_push,
    encode_editor_push,
    decode_machine,
    encode_machine,
    decode_machine_auth,
    encode_machine_auth,
};
pub use text_codec::{UserAuth, format_push, parse_push, parse_user_auth};
pub use wire_types::CloseCode;

/// One outgoing message, tagged with its frame type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Encode an editor push into the frame type it travels in.
pub fn encode_push(push: &EditorPush) -> Result<Frame, ProtocolError> {
    if let Some(line) = format_push(push) {
        return Ok(Frame::Text(line));
    }
    let mut buf = Vec::with_capacity(32);
    encode_editor_push(push, &mut buf)?;
    Ok(Frame::Binary(buf))
}
