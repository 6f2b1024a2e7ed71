//! Low-level wire types and constants.
//!
//! This module defines:
//! - Opcodes for each protocol direction. The three tables overlap
//!   numerically on purpose; a frame is only ever decoded with the table
//!   of the direction it travels in.
//! - Size limits for variable-length fields.
//! - Close codes sent when a session is rejected.
//!
//! The actual encode/decode logic lives in `binary_codec`.

/// Editor → server opcodes.
///
/// These IDs are used in the first byte of each binary frame.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EditorOpcode {
    /// Upload prompt images.
    AddImages = 0,

    /// Remove a prompt image by index.
    DeleteImage = 1,
}

impl EditorOpcode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(EditorOpcode::AddImages),
            1 => Some(EditorOpcode::DeleteImage),
            _ => None,
        }
    }
}

/// Server → editor opcodes (binary frames only).
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EditorPushOpcode {
    AddPromptImage = 1,
    DeletePromptImage = 2,
}

impl EditorPushOpcode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(EditorPushOpcode::AddPromptImage),
            2 => Some(EditorPushOpcode::DeletePromptImage),
            _ => None,
        }
    }
}

/// Server → machine opcodes.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MachineOpcode {
    InitAssets = 0,
}

impl MachineOpcode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(MachineOpcode::InitAssets),
            _ => None,
        }
    }
}

/// Largest prompt image accepted in one `AddImages` entry.
pub const MAX_UPLOAD_LEN: u32 = 10 * 1024 * 1024;

/// Longest valid editor frame: opcode, count, then `u8::MAX` blobs of
/// `MAX_UPLOAD_LEN` behind their 4-byte length prefixes.
pub const MAX_EDITOR_FRAME_LEN: usize = 2 + u8::MAX as usize * (4 + MAX_UPLOAD_LEN as usize);

/// Ed25519 signature length in the machine auth frame.
pub const SIGNATURE_LEN: usize = 64;

/// SHA-256 digest length in `InitAssets`.
pub const HASH_LEN: usize = 32;

/// Longest machine ID text accepted in the auth frame.
pub const MAX_MACHINE_ID_LEN: usize = 64;

/// Smallest valid machine auth frame: length byte, one digit, signature.
pub const MIN_MACHINE_AUTH_LEN: usize = 1 + 1 + SIGNATURE_LEN;

/// Largest valid machine auth frame.
pub const MAX_MACHINE_AUTH_LEN: usize = 1 + MAX_MACHINE_ID_LEN + SIGNATURE_LEN;

/// Reason codes carried in close frames.
///
/// Each rejection branch has its own code so clients can react to it
/// deterministically.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CloseCode {
    /// Collaborator backend failure (standard "internal error").
    Internal = 1011,

    /// Bearer token rejected.
    Unauthorized = 4000,

    /// Machine auth frame too short or too long.
    InvalidAuthLength = 4001,

    /// Declared machine ID length does not match the frame.
    AuthLengthMismatch = 4002,

    /// Machine ID is not a decimal integer.
    InvalidMachineId = 4003,

    /// No such machine.
    UnknownMachine = 4004,

    /// Signature does not verify (or the stored key is unusable).
    BadSignature = 4005,

    /// Frame type not accepted in the current state.
    UnsupportedFrame = 4006,

    /// User auth line is not `token|project`.
    InvalidAuthFormat = 4007,

    NotProjectOwner = 4008,

    /// Project missing at authentication time.
    ProjectNotFound = 4009,

    /// Zero-length editor frame.
    EmptyMessage = 4011,

    /// Opcode not in the editor table.
    UnknownMessageType = 4013,

    /// Editor payload failed to decode.
    MalformedPayload = 4014,

    /// Project disappeared while a user session was open.
    ProjectGone = 4016,
}

impl CloseCode {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Short human-readable reason sent alongside the code.
    pub fn reason(self) -> &'static str {
        match self {
            CloseCode::Internal => "internal error",
            CloseCode::Unauthorized => "unauthorized",
            CloseCode::InvalidAuthLength => "invalid message length",
            CloseCode::AuthLengthMismatch => "message length mismatch",
            CloseCode::InvalidMachineId => "invalid machine ID",
            CloseCode::UnknownMachine => "unknown machine",
            CloseCode::BadSignature => "not authorized",
            CloseCode::UnsupportedFrame => "unsupported frame",
            CloseCode::InvalidAuthFormat => "invalid auth format",
            CloseCode::NotProjectOwner => "not project owner",
            CloseCode::ProjectNotFound => "project not found",
            CloseCode::EmptyMessage => "empty message",
            CloseCode::UnknownMessageType => "unknown message type",
            CloseCode::MalformedPayload => "protocol error",
            CloseCode::ProjectGone => "project not found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_length_bounds() {
        assert_eq!(MIN_MACHINE_AUTH_LEN, 66);
        assert_eq!(MAX_MACHINE_AUTH_LEN, 129);
    }

    #[test]
    fn opcode_tables_are_distinct_per_direction() {
        assert_eq!(EditorOpcode::from_u8(1), Some(EditorOpcode::DeleteImage));
        assert_eq!(EditorPushOpcode::from_u8(1), Some(EditorPushOpcode::AddPromptImage));
        assert_eq!(MachineOpcode::from_u8(1), None);
        assert_eq!(EditorPushOpcode::from_u8(0), None);
    }
}
