//! Entity and style model for blockstyle.
//!
//! Defines the types the style engine reasons about:
//! - [`Entity`]: a block as decoded from the host, with its recognized
//!   [`Property`] values and ordered [`TagReference`]s
//! - [`RawEntity`]: the backend's JSON shape, decoded once at the fetch
//!   boundary and never passed further in
//! - [`ResolvedStyle`]: the derived color/icon for one entity in one pass
//! - [`PanelDescriptor`]: what the host reports about each visible panel,
//!   plus the structural hash used to detect topology changes

mod entity;
mod panel;
mod style;

pub use entity::{
    Entity, PROPERTY_TYPE_ACTIVE, PROPERTY_TYPE_INACTIVE, Property, PropertyName, RawEntity,
    RawProperty, RawReference, TAG_REFERENCE_KIND, TagReference,
};
pub use panel::{PanelDescriptor, topology_hash};
pub use style::{IconSpec, ResolvedStyle, StyleSource};

/// Errors produced while decoding backend data.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("malformed entity payload: {0}")]
    Decode(#[from] serde_json::Error),
}
