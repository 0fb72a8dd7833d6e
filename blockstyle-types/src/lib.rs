//! Core type definitions for blockstyle.
//!
//! This crate defines the small value types shared by the model and the
//! style synchronization engine:
//! - Entity, panel and render-node identifiers
//! - [`Color`], with the color math the style writer relies on
//!   (hex parsing, `rgba()` rendering, lightening toward white)
//!
//! Nothing here knows about the render tree or the backend.

mod color;
mod ids;

pub use color::{Color, format_decimal};
pub use ids::{EntityId, NodeId, PanelId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid color: {0:?}")]
    InvalidColor(String),

    #[error("invalid entity id: {0:?}")]
    InvalidEntityId(String),
}
