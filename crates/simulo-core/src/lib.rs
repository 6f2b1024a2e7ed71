//! simulo-core
//!
//! Domain logic for the Simulo hub, free of networking:
//! - messages exchanged with editors and machines
//! - the scene document
//! - the machine presence registry
//! - the code-generation conversation
//! - contracts (and in-memory versions) of external collaborators

pub mod messages;
pub mod scene;
pub mod presence;
pub mod conversation;
pub mod external;
pub mod memory;
pub mod error;

pub use messages::{
    AddImages,
    AssetRef,
    DeleteImage,
    EditorMessage,
    EditorPush,
    InitAssets,
    MachineId,
    MachineMessage,
};

pub use scene::{Scene, SceneObject};
pub use presence::PresenceRegistry;
pub use conversation::{ChatMessage, Conversation, Role, extract_code_block};
pub use external::{
    CodeGenerator,
    IdentityProvider,
    MachineAssets,
    ObjectStore,
    Project,
    ProjectStore,
    UserIdentity,
};
pub use error::{AuthError, GenerationError, StoreError};
