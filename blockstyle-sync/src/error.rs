//! Error types for the style engine.

use blockstyle_types::NodeId;
use thiserror::Error;

/// Result type for engine operations.
pub type StyleResult<T> = Result<T, StyleError>;

/// Errors that can occur while synchronizing styles.
///
/// None of these is fatal to the host: the engine logs them, counts them in
/// its reports, and retries on the next trigger.
#[derive(Debug, Error)]
pub enum StyleError {
    /// The backend call failed or rejected.
    #[error("backend error: {0}")]
    Backend(String),

    /// Backend data had the wrong shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// No panel roots appeared within the allowed attempts.
    #[error("no panel roots after {attempts} attempts")]
    NoPanelRoots { attempts: u32 },

    /// A node handle no longer belongs to the tree.
    #[error("node {0} is detached")]
    Detached(NodeId),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The engine was disposed.
    #[error("engine disposed")]
    Disposed,
}

impl From<blockstyle_model::ModelError> for StyleError {
    fn from(err: blockstyle_model::ModelError) -> Self {
        match err {
            blockstyle_model::ModelError::Decode(e) => StyleError::Decode(e),
        }
    }
}
