//! Message types exchanged on the session channel.
//!
//! These are **transport-agnostic** logical messages, one enum per
//! direction so an opcode can never be read in the wrong table:
//! - [`EditorMessage`]: editor → server.
//! - [`EditorPush`]: server → editor.
//! - [`MachineMessage`]: server → machine.
//!
//! Note: binary / text encoders live in the `simulo-protocol` crate;
//! this module is purely logical.

use std::fmt;

/// Identifier of a physical projection machine.
///
/// Machines authenticate with this number as ASCII decimal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachineId(pub i64);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A binary request from an authenticated editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorMessage {
    /// Upload one or more prompt images.
    AddImages(AddImages),

    /// Remove the prompt image at `index`.
    DeleteImage(DeleteImage),
}

/// Prompt image upload (input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddImages {
    /// Raw image blobs, each at most 10 MiB on the wire.
    pub uploads: Vec<Vec<u8>>,
}

/// Prompt image removal (input).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteImage {
    pub index: u8,
}

/// Anything the server pushes to an editor.
///
/// The first two variants travel as text frames, the rest as binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorPush {
    /// Full scene document, as stored.
    Scene(String),

    /// Presence status for one machine referenced by the scene.
    MachineOnline { machine_id: MachineId, online: bool },

    /// A prompt image was added; `url` is presigned and short-lived.
    AddPromptImage { url: String },

    /// The prompt image at `index` was removed.
    DeletePromptImage { index: u8 },
}

/// Anything the server pushes to a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineMessage {
    InitAssets(InitAssets),
}

/// Asset bootstrap for a freshly authenticated machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitAssets {
    /// The compiled program to run.
    pub program: AssetRef,

    /// Auxiliary assets (images) the program may load.
    pub extras: Vec<AssetRef>,
}

/// A downloadable asset: presigned URL plus the SHA-256 of its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub url: String,
    pub hash: [u8; 32],
}
