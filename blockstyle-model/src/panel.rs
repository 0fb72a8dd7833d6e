use blockstyle_types::PanelId;
use serde::{Deserialize, Serialize};
use std::hash::{DefaultHasher, Hash, Hasher};

/// A visible panel as reported by the host state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelDescriptor {
    pub id: PanelId,
    /// View kind, e.g. `block` or `journal`.
    pub view: String,
    #[serde(default)]
    pub view_args: serde_json::Value,
}

impl PanelDescriptor {
    pub fn new(id: impl Into<PanelId>, view: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            view: view.into(),
            view_args: serde_json::Value::Null,
        }
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.view_args = args;
        self
    }
}

/// Structural hash over panel ids, view kinds and view arguments.
///
/// Two panel lists hash equal iff they describe the same layout in the same
/// order. `serde_json` maps serialize with sorted keys, so argument objects
/// hash independently of insertion order.
#[must_use]
pub fn topology_hash(panels: &[PanelDescriptor]) -> u64 {
    let mut hasher = DefaultHasher::new();
    panels.len().hash(&mut hasher);
    for panel in panels {
        panel.id.hash(&mut hasher);
        panel.view.hash(&mut hasher);
        panel.view_args.to_string().hash(&mut hasher);
    }
    hasher.finish()
}
