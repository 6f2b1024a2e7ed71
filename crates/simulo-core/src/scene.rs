//! Structured view of the editor's scene document.
//!
//! The project store keeps the scene as JSON text: an ordered array of
//! objects, each with a `"type"` discriminator. Object 0 carries the
//! project-level fields (`promptImages`, `prompt`). Everything the hub
//! does not understand is kept verbatim in [`SceneObject::extra`] so a
//! read-patch-write cycle never drops editor data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::messages::MachineId;

/// Scene object type tag for machine placements.
pub const MACHINE_KIND: &str = "machine";

/// One placed object in a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    /// Discriminator, e.g. `"machine"`. Empty when the editor omitted it.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// Object-store keys of prompt images, in display order.
    #[serde(
        rename = "promptImages",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub prompt_images: Option<Vec<String>>,

    /// Latest natural-language request for this project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Fields owned by the editor.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SceneObject {
    /// The referenced machine, if this object is a machine placement with
    /// an integral `id`.
    pub fn machine_id(&self) -> Option<MachineId> {
        if self.kind != MACHINE_KIND {
            return None;
        }

        match self.extra.get("id")? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(MachineId),
            _ => None,
        }
    }
}

/// An ordered scene document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
}

impl Scene {
    /// Parse the store's text representation.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize back to the store's text representation.
    pub fn to_text(&self) -> String {
        // A `Scene` only contains strings, maps and arrays; serialization
        // cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "[]".to_string())
    }

    /// Machines referenced by the scene, in document order.
    pub fn machine_ids(&self) -> Vec<MachineId> {
        self.objects.iter().filter_map(SceneObject::machine_id).collect()
    }

    /// Prompt image keys of the first object; empty if absent.
    pub fn prompt_images(&self) -> &[String] {
        self.objects
            .first()
            .and_then(|o| o.prompt_images.as_deref())
            .unwrap_or(&[])
    }

    /// Append a prompt image key to the first object.
    ///
    /// Returns `false` if the scene has no objects to attach it to.
    pub fn push_prompt_image(&mut self, key: impl Into<String>) -> bool {
        match self.objects.first_mut() {
            Some(first) => {
                first
                    .prompt_images
                    .get_or_insert_with(Vec::new)
                    .push(key.into());
                true
            }
            None => false,
        }
    }

    /// Remove and return the prompt image key at `index`.
    ///
    /// Out-of-range indices leave the scene untouched.
    pub fn remove_prompt_image(&mut self, index: usize) -> Option<String> {
        let images = self.objects.first_mut()?.prompt_images.as_mut()?;
        if index < images.len() {
            Some(images.remove(index))
        } else {
            None
        }
    }

    /// Record the latest prompt on the first object.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) -> bool {
        match self.objects.first_mut() {
            Some(first) => {
                first.prompt = Some(prompt.into());
                true
            }
            None => false,
        }
    }
}
