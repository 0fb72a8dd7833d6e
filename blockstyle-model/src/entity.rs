use blockstyle_types::{Color, EntityId};
use serde::{Deserialize, Serialize};

/// Raw property `type` value that marks a property as active.
///
/// The host stores several property encodings; only this one means the
/// property is switched on. Everything else decodes as disabled.
pub const PROPERTY_TYPE_ACTIVE: i64 = 1;

/// Raw property `type` written when a property is switched off.
pub const PROPERTY_TYPE_INACTIVE: i64 = 0;

/// Raw reference `type` for tag references.
pub const TAG_REFERENCE_KIND: i64 = 2;

/// Property names the engine recognizes. Anything else is dropped while
/// decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyName {
    #[serde(rename = "_color")]
    Color,
    #[serde(rename = "_icon")]
    Icon,
}

impl PropertyName {
    /// The name as stored by the host.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PropertyName::Color => "_color",
            PropertyName::Icon => "_icon",
        }
    }

    /// Looks up a recognized name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "_color" => Some(PropertyName::Color),
            "_icon" => Some(PropertyName::Icon),
            _ => None,
        }
    }
}

/// A recognized, decoded property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: PropertyName,
    pub enabled: bool,
    pub value: Option<String>,
}

impl Property {
    /// An enabled property with a value.
    pub fn enabled(name: PropertyName, value: impl Into<String>) -> Self {
        Self {
            name,
            enabled: true,
            value: Some(value.into()),
        }
    }

    /// A switched-off property, as written when a user clears it.
    pub fn disabled(name: PropertyName) -> Self {
        Self {
            name,
            enabled: false,
            value: None,
        }
    }

    /// The value, if the property is active and non-empty.
    ///
    /// A disabled or valueless property is absent; it never resolves to an
    /// empty string.
    #[must_use]
    pub fn active_value(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Encodes the property in the backend's write shape.
    #[must_use]
    pub fn to_raw(&self) -> RawProperty {
        RawProperty {
            name: self.name.as_str().to_string(),
            kind: if self.enabled {
                PROPERTY_TYPE_ACTIVE
            } else {
                PROPERTY_TYPE_INACTIVE
            },
            value: match (&self.value, self.enabled) {
                (Some(v), true) => serde_json::Value::String(v.clone()),
                _ => serde_json::Value::Null,
            },
        }
    }
}

/// A tag reference from an entity to a tag entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagReference {
    pub to: EntityId,
    /// The alias the reference was made through, when the host reports it.
    pub alias: Option<String>,
}

/// A block as the style engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub text: String,
    pub properties: Vec<Property>,
    /// Tag references in discovery order.
    pub tags: Vec<TagReference>,
    pub aliases: Vec<String>,
    /// Explicit tag order (alias names), overriding discovery order.
    pub tag_order: Option<Vec<String>>,
}

impl Entity {
    /// An entity with no properties or references.
    pub fn empty(id: EntityId) -> Self {
        Self {
            id,
            text: String::new(),
            properties: Vec::new(),
            tags: Vec::new(),
            aliases: Vec::new(),
            tag_order: None,
        }
    }

    /// Returns the first property with the given name.
    pub fn property(&self, name: PropertyName) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// The active value of a property, see [`Property::active_value`].
    pub fn active_value(&self, name: PropertyName) -> Option<&str> {
        self.property(name).and_then(Property::active_value)
    }

    /// The entity's own enabled color. Unparseable values count as absent.
    pub fn color(&self) -> Option<Color> {
        self.active_value(PropertyName::Color)
            .and_then(|v| Color::parse_hex(v).ok())
    }

    /// The entity's own enabled icon.
    pub fn icon(&self) -> Option<&str> {
        self.active_value(PropertyName::Icon)
    }

    /// Whether the entity has an enabled color or icon of its own.
    pub fn has_style(&self) -> bool {
        self.color().is_some() || self.icon().is_some()
    }

    /// Decodes the backend's JSON payload.
    ///
    /// Only a payload that is not an entity object at all is an error.
    /// Malformed items inside it are skipped one by one.
    pub fn decode(value: serde_json::Value) -> Result<Self, crate::ModelError> {
        let raw: RawEntity = serde_json::from_value(value)?;
        Ok(Self::from_raw(raw))
    }

    /// Converts an already-parsed raw payload.
    pub fn from_raw(raw: RawEntity) -> Self {
        let mut properties: Vec<Property> = Vec::new();
        for value in raw.properties {
            let Ok(prop) = serde_json::from_value::<RawProperty>(value) else {
                continue;
            };
            let Some(name) = PropertyName::from_name(&prop.name) else {
                continue;
            };
            // First occurrence wins; hosts occasionally duplicate entries.
            if properties.iter().any(|p| p.name == name) {
                continue;
            }
            properties.push(Property {
                name,
                enabled: prop.kind == PROPERTY_TYPE_ACTIVE,
                value: prop.value.as_str().map(str::to_string),
            });
        }

        let mut tags: Vec<TagReference> = Vec::new();
        for value in raw.refs {
            let Ok(reference) = serde_json::from_value::<RawReference>(value) else {
                continue;
            };
            if reference.kind != TAG_REFERENCE_KIND || tags.iter().any(|t| t.to == reference.to) {
                continue;
            }
            tags.push(TagReference {
                to: reference.to,
                alias: reference.alias,
            });
        }

        Self {
            id: raw.id,
            text: raw.text.unwrap_or_default(),
            properties,
            tags,
            aliases: raw.aliases,
            tag_order: raw.tag_order,
        }
    }
}

/// Entity payload as returned by the backend.
///
/// List items stay untyped here so that one malformed entry does not make
/// the whole entity unreadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntity {
    pub id: EntityId,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub properties: Vec<serde_json::Value>,
    #[serde(default)]
    pub refs: Vec<serde_json::Value>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub tag_order: Option<Vec<String>>,
}

/// One property entry in the backend shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProperty {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// One reference entry in the backend shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawReference {
    #[serde(rename = "type")]
    pub kind: i64,
    pub to: EntityId,
    #[serde(default)]
    pub alias: Option<String>,
}
