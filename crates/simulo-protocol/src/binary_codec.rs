//! Binary encoding/decoding for session messages.
//!
//! This module converts between:
//! - raw binary frames (`&[u8]`)
//! - `simulo_core` messages for each protocol direction
//!
//! Primitives (all multi-byte fields big-endian):
//!
//! ```text
//! U8         : 1 byte
//! String     : u16 byte length + UTF-8 bytes
//! Bytes      : u32 byte length + raw bytes
//! FixedBytes : raw bytes, length implied by position
//! ```
//!
//! Frames (the opcode is the first byte):
//!
//! ```text
//! Editor → server
//! ---------------
//! AddImages (0):
//!   U8 count
//!   count × Bytes (each ≤ MAX_UPLOAD_LEN)
//!
//! DeleteImage (1):
//!   U8 index
//!
//! Server → editor (binary part; text frames live in `text_codec`)
//! ---------------
//! AddPromptImage (1):
//!   String url
//!
//! DeletePromptImage (2):
//!   U8 index
//!
//! Server → machine
//! ----------------
//! InitAssets (0):
//!   String     program url
//!   FixedBytes program hash (32)
//!   U8         extra count
//!   count × (String url, FixedBytes hash (32))
//!
//! Machine auth (first binary frame from a machine, no opcode)
//! ------------
//!   U8         id_len
//!   id_len     ASCII decimal machine id
//!   FixedBytes signature (64), Ed25519 over the id text
//! ```
//!
//! NOTE: each WebSocket message carries exactly one frame, so no extra
//! length prefix is needed around these encodings.

use std::convert::TryFrom;
use std::fmt;

use simulo_core::{
    AddImages, AssetRef, DeleteImage, EditorMessage, EditorPush, InitAssets, MachineId,
    MachineMessage,
};

use crate::wire_types::{
    EditorOpcode, EditorPushOpcode, MachineOpcode, HASH_LEN, MAX_MACHINE_AUTH_LEN,
    MAX_MACHINE_ID_LEN, MAX_UPLOAD_LEN, MIN_MACHINE_AUTH_LEN, SIGNATURE_LEN,
};

/// Errors that can arise when encoding/decoding a binary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer too short for the expected fields.
    Truncated,
    /// A length prefix declared more than the field allows.
    LengthExceeded { declared: u64, limit: u64 },
    /// Unknown opcode for this direction.
    UnknownOpcode(u8),
    /// String field is not valid UTF-8.
    InvalidUtf8,
    /// Value too long for its length prefix.
    FieldTooLong(&'static str),
    /// More items than a U8 count can express.
    TooManyItems(&'static str),
    /// The message is carried as text, not binary.
    NotBinary,
    /// A text frame does not match its expected shape.
    MalformedText(&'static str),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Truncated => write!(f, "Buffer truncated"),
            ProtocolError::LengthExceeded { declared, limit } => {
                write!(f, "Declared length {} exceeds limit {}", declared, limit)
            }
            ProtocolError::UnknownOpcode(op) => write!(f, "Unknown opcode: {}", op),
            ProtocolError::InvalidUtf8 => write!(f, "Invalid UTF-8 string"),
            ProtocolError::FieldTooLong(field) => write!(f, "Field too long: {}", field),
            ProtocolError::TooManyItems(field) => write!(f, "Too many items: {}", field),
            ProtocolError::NotBinary => write!(f, "Message is sent as text"),
            ProtocolError::MalformedText(what) => write!(f, "Malformed text frame: {}", what),
        }
    }
}

impl std::error::Error for ProtocolError {}

// ============================================================================
// Primitives
// ============================================================================

/// Append-only frame builder.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    /// u16 length prefix + UTF-8 bytes.
    pub fn string(&mut self, value: &str) -> Result<&mut Self, ProtocolError> {
        let len = u16::try_from(value.len()).map_err(|_| ProtocolError::FieldTooLong("string"))?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(value.as_bytes());
        Ok(self)
    }

    /// u32 length prefix + raw bytes.
    pub fn bytes(&mut self, data: &[u8]) -> Result<&mut Self, ProtocolError> {
        let len = u32::try_from(data.len()).map_err(|_| ProtocolError::FieldTooLong("bytes"))?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(data);
        Ok(self)
    }

    pub fn fixed_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over one received frame.
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        PacketReader { data, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        let value = *self.data.get(self.offset).ok_or(ProtocolError::Truncated)?;
        self.offset += 1;
        Ok(value)
    }

    /// u32 length prefix + raw bytes, rejecting lengths above `limit`.
    ///
    /// The limit is checked before the buffer length, so a hostile
    /// prefix never causes an allocation.
    pub fn dyn_bytes(&mut self, limit: u32) -> Result<&'a [u8], ProtocolError> {
        let len = read_u32_be(self.fixed_bytes(4)?);
        if len > limit {
            return Err(ProtocolError::LengthExceeded {
                declared: len as u64,
                limit: limit as u64,
            });
        }
        self.fixed_bytes(len as usize)
    }

    /// u16 length prefix + UTF-8 bytes.
    pub fn string(&mut self) -> Result<&'a str, ProtocolError> {
        let raw = self.fixed_bytes(2)?;
        let len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
        let bytes = self.fixed_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
    }

    pub fn fixed_bytes(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < len {
            return Err(ProtocolError::Truncated);
        }
        let value = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(value)
    }

    fn hash(&mut self) -> Result<[u8; HASH_LEN], ProtocolError> {
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(self.fixed_bytes(HASH_LEN)?);
        Ok(out)
    }
}

// ============================================================================
// EDITOR → SERVER
// ============================================================================

/// Decode a single editor frame.
pub fn decode_editor(buf: &[u8]) -> Result<EditorMessage, ProtocolError> {
    let mut reader = PacketReader::new(buf);
    let opcode = reader.u8()?;
    let op = EditorOpcode::from_u8(opcode).ok_or(ProtocolError::UnknownOpcode(opcode))?;

    match op {
        EditorOpcode::AddImages => {
            let count = reader.u8()?;
            let mut uploads = Vec::with_capacity(count as usize);
            for _ in 0..count {
                uploads.push(reader.dyn_bytes(MAX_UPLOAD_LEN)?.to_vec());
            }
            Ok(EditorMessage::AddImages(AddImages { uploads }))
        }
        EditorOpcode::DeleteImage => {
            let index = reader.u8()?;
            Ok(EditorMessage::DeleteImage(DeleteImage { index }))
        }
    }
}

/// Encode a single editor frame (editor side).
///
/// The encoded bytes are appended to `out`.
pub fn encode_editor(msg: &EditorMessage, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    let mut w = PacketWriter::new();
    match msg {
        EditorMessage::AddImages(a) => {
            let count =
                u8::try_from(a.uploads.len()).map_err(|_| ProtocolError::TooManyItems("uploads"))?;
            w.u8(EditorOpcode::AddImages as u8).u8(count);
            for blob in &a.uploads {
                if blob.len() as u64 > MAX_UPLOAD_LEN as u64 {
                    return Err(ProtocolError::LengthExceeded {
                        declared: blob.len() as u64,
                        limit: MAX_UPLOAD_LEN as u64,
                    });
                }
                w.bytes(blob)?;
            }
        }
        EditorMessage::DeleteImage(d) => {
            w.u8(EditorOpcode::DeleteImage as u8).u8(d.index);
        }
    }
    out.extend_from_slice(&w.into_bytes());
    Ok(())
}

// ============================================================================
// SERVER → EDITOR (binary pushes)
// ============================================================================

/// Encode a binary editor push.
///
/// Text pushes (`Scene`, `MachineOnline`) are rejected with
/// [`ProtocolError::NotBinary`]; see `text_codec`.
pub fn encode_editor_push(push: &EditorPush, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    let mut w = PacketWriter::new();
    match push {
        EditorPush::AddPromptImage { url } => {
            w.u8(EditorPushOpcode::AddPromptImage as u8).string(url)?;
        }
        EditorPush::DeletePromptImage { index } => {
            w.u8(EditorPushOpcode::DeletePromptImage as u8).u8(*index);
        }
        EditorPush::Scene(_) | EditorPush::MachineOnline { .. } => {
            return Err(ProtocolError::NotBinary);
        }
    }
    out.extend_from_slice(&w.into_bytes());
    Ok(())
}

/// Decode a binary editor push (editor side).
pub fn decode_editor_push(buf: &[u8]) -> Result<EditorPush, ProtocolError> {
    let mut reader = PacketReader::new(buf);
    let opcode = reader.u8()?;
    let op = EditorPushOpcode::from_u8(opcode).ok_or(ProtocolError::UnknownOpcode(opcode))?;

    match op {
        EditorPushOpcode::AddPromptImage => Ok(EditorPush::AddPromptImage {
            url: reader.string()?.to_string(),
        }),
        EditorPushOpcode::DeletePromptImage => Ok(EditorPush::DeletePromptImage {
            index: reader.u8()?,
        }),
    }
}

// ============================================================================
// SERVER → MACHINE
// ============================================================================

/// Encode a single machine frame.
pub fn encode_machine(msg: &MachineMessage, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    let mut w = PacketWriter::new();
    match msg {
        MachineMessage::InitAssets(init) => {
            let count =
                u8::try_from(init.extras.len()).map_err(|_| ProtocolError::TooManyItems("extras"))?;
            w.u8(MachineOpcode::InitAssets as u8)
                .string(&init.program.url)?
                .fixed_bytes(&init.program.hash)
                .u8(count);
            for asset in &init.extras {
                w.string(&asset.url)?.fixed_bytes(&asset.hash);
            }
        }
    }
    out.extend_from_slice(&w.into_bytes());
    Ok(())
}

/// Decode a single machine frame (machine side).
pub fn decode_machine(buf: &[u8]) -> Result<MachineMessage, ProtocolError> {
    let mut reader = PacketReader::new(buf);
    let opcode = reader.u8()?;
    let op = MachineOpcode::from_u8(opcode).ok_or(ProtocolError::UnknownOpcode(opcode))?;

    match op {
        MachineOpcode::InitAssets => {
            let program = AssetRef {
                url: reader.string()?.to_string(),
                hash: reader.hash()?,
            };
            let count = reader.u8()?;
            let mut extras = Vec::with_capacity(count as usize);
            for _ in 0..count {
                extras.push(AssetRef {
                    url: reader.string()?.to_string(),
                    hash: reader.hash()?,
                });
            }
            Ok(MachineMessage::InitAssets(InitAssets { program, extras }))
        }
    }
}

// ============================================================================
// MACHINE AUTH
// ============================================================================

/// A parsed (not yet verified) machine auth frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineAuth {
    pub machine_id: MachineId,

    /// The ID exactly as sent; this is what the signature covers.
    pub id_text: String,

    pub signature: [u8; SIGNATURE_LEN],
}

/// Structural problems with a machine auth frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineAuthError {
    /// Frame length outside the accepted range.
    InvalidLength(usize),
    /// `1 + id_len + 64` does not equal the frame length.
    LengthMismatch { id_len: usize, frame_len: usize },
    /// ID text is not a decimal integer.
    InvalidMachineId,
}

impl fmt::Display for MachineAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineAuthError::InvalidLength(len) => write!(f, "Invalid auth frame length: {}", len),
            MachineAuthError::LengthMismatch { id_len, frame_len } => write!(
                f,
                "Auth frame length mismatch: id_len {} in {} bytes",
                id_len, frame_len
            ),
            MachineAuthError::InvalidMachineId => write!(f, "Invalid machine ID"),
        }
    }
}

impl std::error::Error for MachineAuthError {}

/// Parse a machine auth frame.
pub fn decode_machine_auth(buf: &[u8]) -> Result<MachineAuth, MachineAuthError> {
    if buf.len() < MIN_MACHINE_AUTH_LEN || buf.len() > MAX_MACHINE_AUTH_LEN {
        return Err(MachineAuthError::InvalidLength(buf.len()));
    }

    let id_len = buf[0] as usize;
    if 1 + id_len + SIGNATURE_LEN != buf.len() {
        return Err(MachineAuthError::LengthMismatch {
            id_len,
            frame_len: buf.len(),
        });
    }

    let id_bytes = &buf[1..1 + id_len];
    // Only plain ASCII digits (optionally signed); `parse` alone would
    // also accept a leading '+'.
    let id_text = std::str::from_utf8(id_bytes).map_err(|_| MachineAuthError::InvalidMachineId)?;
    let digits = id_text.strip_prefix('-').unwrap_or(id_text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MachineAuthError::InvalidMachineId);
    }
    let machine_id = id_text
        .parse::<i64>()
        .map_err(|_| MachineAuthError::InvalidMachineId)?;

    let mut signature = [0u8; SIGNATURE_LEN];
    signature.copy_from_slice(&buf[1 + id_len..]);

    Ok(MachineAuth {
        machine_id: MachineId(machine_id),
        id_text: id_text.to_string(),
        signature,
    })
}

/// Build a machine auth frame (machine side).
pub fn encode_machine_auth(
    id_text: &str,
    signature: &[u8; SIGNATURE_LEN],
) -> Result<Vec<u8>, ProtocolError> {
    if id_text.len() > MAX_MACHINE_ID_LEN {
        return Err(ProtocolError::FieldTooLong("machine id"));
    }
    let mut w = PacketWriter::new();
    w.u8(id_text.len() as u8)
        .fixed_bytes(id_text.as_bytes())
        .fixed_bytes(signature);
    Ok(w.into_bytes())
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn read_u32_be(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[0..4]);
    u32::from_be_bytes(arr)
}
