//! Engine configuration.
//!
//! Hosts usually hand over a partial JSON settings object; every field has a
//! default, and durations are written as integer milliseconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of tags considered per entity for style purposes.
pub const MAX_TAGS: usize = 4;

/// Configuration for the style engine and its scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// How long a fetched entity is served from the property cache.
    #[serde(with = "duration_ms")]
    pub property_ttl: Duration,
    /// How long a failed fetch is remembered as "no properties".
    #[serde(with = "duration_ms")]
    pub negative_ttl: Duration,
    /// Tags considered per entity.
    pub max_tags: usize,
    /// Consecutive matching observations before a node is stable.
    pub stability_threshold: u32,
    /// How long observation ticks on a stable node are ignored.
    #[serde(with = "duration_ms")]
    pub stable_window: Duration,
    /// Time box for merging observed change batches.
    #[serde(with = "duration_ms")]
    pub coalesce_window: Duration,
    /// Quiet period before a state-change notification runs a pass.
    #[serde(with = "duration_ms")]
    pub debounce: Duration,
    /// Full-pass attempts on initial load before giving up.
    pub initial_retries: u32,
    #[serde(with = "duration_ms")]
    pub initial_retry_delay: Duration,
    /// Attempts to find panel roots when attaching the observer.
    pub attach_attempts: u32,
    /// First attach retry delay, doubled on every further attempt.
    #[serde(with = "duration_ms")]
    pub attach_backoff: Duration,
    #[serde(with = "duration_ms")]
    pub gc_interval: Duration,
    pub style: StyleSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            property_ttl: Duration::from_secs(5),
            negative_ttl: Duration::from_secs(2),
            max_tags: MAX_TAGS,
            stability_threshold: 3,
            stable_window: Duration::from_millis(500),
            coalesce_window: Duration::from_millis(30),
            debounce: Duration::from_millis(100),
            initial_retries: 10,
            initial_retry_delay: Duration::from_millis(300),
            attach_attempts: 5,
            attach_backoff: Duration::from_millis(100),
            gc_interval: Duration::from_secs(60),
            style: StyleSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a host settings object, filling in defaults.
    pub fn from_json(value: serde_json::Value) -> crate::StyleResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// How the collapsed-state background is derived from the base color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackgroundMode {
    /// `rgba()` of the base color at `collapsed_alpha`.
    Alpha,
    /// The base color lightened toward white by `lighten_amount`.
    Lighten,
}

/// Read-only toggles consumed by the style writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StyleSettings {
    /// Color panel and block titles.
    pub color_titles: bool,
    /// Color inline references to styled entities.
    pub color_inline_refs: bool,
    /// Paint the linear gradient behind block content for multi-tag styles.
    pub gradient_content: bool,
    pub collapsed_background: BackgroundMode,
    pub collapsed_alpha: f64,
    pub lighten_amount: f64,
    /// Stop alpha of the conic gradient on block handles.
    pub handle_gradient_alpha: f64,
    /// Stop alpha of the linear gradient behind block content.
    pub content_gradient_alpha: f64,
}

impl Default for StyleSettings {
    fn default() -> Self {
        Self {
            color_titles: true,
            color_inline_refs: true,
            gradient_content: true,
            collapsed_background: BackgroundMode::Alpha,
            collapsed_alpha: 0.45,
            lighten_amount: 0.55,
            handle_gradient_alpha: 0.75,
            content_gradient_alpha: 0.45,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
