use blockstyle_types::Color;
use serde::{Deserialize, Serialize};

/// Where a resolved style came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StyleSource {
    /// The entity's own color property.
    #[serde(rename = "self")]
    Own,
    /// One or more of the entity's tags.
    #[serde(rename = "tag")]
    Tag,
    /// Nothing applies; any previously written style must be cleared.
    #[serde(rename = "none")]
    Unstyled,
}

impl StyleSource {
    /// The value written to the `data-style-source` attribute.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StyleSource::Own => "self",
            StyleSource::Tag => "tag",
            StyleSource::Unstyled => "none",
        }
    }
}

/// The derived color and icon for one entity in one sync pass.
///
/// `tag_colors.len() > 1` only happens with [`StyleSource::Tag`] and selects
/// the gradient rendering path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStyle {
    pub display_color: Option<Color>,
    pub background_base: Option<Color>,
    pub icon: Option<String>,
    pub source: StyleSource,
    pub tag_colors: Vec<Color>,
}

impl ResolvedStyle {
    /// The "nothing applies" style.
    #[must_use]
    pub fn none() -> Self {
        Self {
            display_color: None,
            background_base: None,
            icon: None,
            source: StyleSource::Unstyled,
            tag_colors: Vec::new(),
        }
    }

    /// Whether the writer should clear rather than apply.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.source == StyleSource::Unstyled
    }

    /// Whether the multi-tag (gradient) rendering path applies.
    #[must_use]
    pub fn is_multi_tag(&self) -> bool {
        self.tag_colors.len() > 1
    }
}

impl Default for ResolvedStyle {
    fn default() -> Self {
        Self::none()
    }
}

/// How an icon value is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSpec {
    /// Icon-font classes such as `ti ti-star`.
    Classes(Vec<String>),
    /// A literal glyph, usually an emoji.
    Glyph(String),
}

impl IconSpec {
    /// Prefix shared by icon-font class names.
    pub const CLASS_PREFIX: &'static str = "ti";

    /// Classifies an icon value. Blank values have no icon.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let is_class = |t: &str| t == Self::CLASS_PREFIX || t.starts_with("ti-");
        let tokens: Vec<&str> = value.split_whitespace().collect();
        if tokens.iter().all(|t| is_class(t)) {
            Some(IconSpec::Classes(tokens.into_iter().map(str::to_string).collect()))
        } else {
            Some(IconSpec::Glyph(value.to_string()))
        }
    }
}
