//! Host state-store abstraction.

use crate::{read, write};
use blockstyle_model::PanelDescriptor;
use std::sync::RwLock;

/// Read access to the host's panel layout.
pub trait HostState: Send + Sync {
    /// Currently visible panels, in layout order.
    fn panels(&self) -> Vec<PanelDescriptor>;
}

/// A host whose panel layout is set explicitly.
#[derive(Debug, Default)]
pub struct StaticHost {
    panels: RwLock<Vec<PanelDescriptor>>,
}

impl StaticHost {
    pub fn new(panels: Vec<PanelDescriptor>) -> Self {
        Self {
            panels: RwLock::new(panels),
        }
    }

    /// Replaces the layout.
    pub fn set_panels(&self, panels: Vec<PanelDescriptor>) {
        *write(&self.panels) = panels;
    }
}

impl HostState for StaticHost {
    fn panels(&self) -> Vec<PanelDescriptor> {
        read(&self.panels).clone()
    }
}
