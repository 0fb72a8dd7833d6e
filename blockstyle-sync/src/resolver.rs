//! Style resolution.
//!
//! [`resolve`] is the pure priority function; [`StyleResolver`] gathers its
//! inputs (the entity and its first tags, in corrected order) through the
//! property cache and the backend.
//!
//! Priority, evaluated once per entity per pass:
//! 1. own color: the entity's color, its icon or else the first tag icon
//! 2. own icon without color: the icon, colored by the first tag color
//! 3. otherwise the considered tags: every tag color in order, first tag icon
//! 4. nothing found: [`StyleSource::Unstyled`]

use crate::backend::EntityBackend;
use crate::cache::{CachedLookup, PropertyCache, TtlCache};
use crate::config::MAX_TAGS;
use blockstyle_model::{Entity, ResolvedStyle, StyleSource};
use blockstyle_types::{Color, EntityId};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Aliases are renamed far less often than properties are edited.
const ALIAS_TTL: Duration = Duration::from_secs(30);

/// Computes the style of `entity` given its tags in corrected order.
///
/// Only the first [`MAX_TAGS`] tags are considered. Ties between tags are
/// broken by their position in `tags`.
pub fn resolve(entity: &Entity, tags: &[&Entity]) -> ResolvedStyle {
    let tags = &tags[..tags.len().min(MAX_TAGS)];
    let tag_icon = tags.iter().find_map(|t| t.icon());

    if let Some(color) = entity.color() {
        return ResolvedStyle {
            display_color: Some(color),
            background_base: Some(color),
            icon: entity.icon().or(tag_icon).map(str::to_string),
            source: StyleSource::Own,
            tag_colors: Vec::new(),
        };
    }

    if let Some(icon) = entity.icon() {
        let tag_color = tags.iter().find_map(|t| t.color());
        return ResolvedStyle {
            display_color: tag_color,
            background_base: tag_color,
            icon: Some(icon.to_string()),
            source: StyleSource::Tag,
            tag_colors: tag_color.into_iter().collect(),
        };
    }

    let tag_colors: Vec<Color> = tags.iter().filter_map(|t| t.color()).collect();
    if tag_colors.is_empty() && tag_icon.is_none() {
        return ResolvedStyle::none();
    }

    ResolvedStyle {
        display_color: tag_colors.first().copied(),
        background_base: tag_colors.first().copied(),
        icon: tag_icon.map(str::to_string),
        source: StyleSource::Tag,
        tag_colors,
    }
}

/// Orders an entity's tag ids: explicitly ordered tags first, in that
/// order, then the rest in discovery order.
///
/// `resolved_aliases` maps order-list names that did not match any
/// reference alias to entity ids.
pub fn corrected_tag_order(
    entity: &Entity,
    resolved_aliases: &HashMap<String, EntityId>,
) -> Vec<EntityId> {
    let discovered: Vec<EntityId> = entity.tags.iter().map(|t| t.to).collect();
    let Some(order) = &entity.tag_order else {
        return discovered;
    };

    let mut ordered: Vec<EntityId> = Vec::with_capacity(discovered.len());
    for name in order {
        let by_alias = entity
            .tags
            .iter()
            .find(|t| t.alias.as_deref() == Some(name.as_str()))
            .map(|t| t.to);
        let id = by_alias.or_else(|| {
            resolved_aliases
                .get(name)
                .copied()
                .filter(|id| discovered.contains(id))
        });
        if let Some(id) = id {
            if !ordered.contains(&id) {
                ordered.push(id);
            }
        }
    }
    for id in discovered {
        if !ordered.contains(&id) {
            ordered.push(id);
        }
    }
    ordered
}

/// Order-list names that no tag reference carries as its alias.
fn unmatched_order_names(entity: &Entity) -> Vec<String> {
    let Some(order) = &entity.tag_order else {
        return Vec::new();
    };
    order
        .iter()
        .filter(|name| {
            !entity
                .tags
                .iter()
                .any(|t| t.alias.as_deref() == Some(name.as_str()))
        })
        .cloned()
        .collect()
}

/// Resolves entity styles through the property cache and the backend.
pub struct StyleResolver {
    backend: Arc<dyn EntityBackend>,
    cache: Arc<PropertyCache>,
    aliases: TtlCache<String, Option<EntityId>>,
    max_tags: usize,
}

impl StyleResolver {
    pub fn new(
        backend: Arc<dyn EntityBackend>,
        cache: Arc<PropertyCache>,
        max_tags: usize,
    ) -> Self {
        Self {
            backend,
            cache,
            aliases: TtlCache::new(ALIAS_TTL),
            max_tags: max_tags.min(MAX_TAGS),
        }
    }

    /// The shared property cache.
    pub fn cache(&self) -> &Arc<PropertyCache> {
        &self.cache
    }

    /// Whether the last fetch of `id` failed and is still remembered.
    pub fn has_failed(&self, id: EntityId) -> bool {
        matches!(self.cache.get(id), Some(CachedLookup::Failed))
    }

    /// Drops cached alias resolutions.
    pub fn clear_aliases(&self) {
        self.aliases.clear();
    }

    /// Fetches an entity, serving from the cache when fresh.
    ///
    /// A failed or malformed fetch is remembered briefly and yields `None`.
    pub async fn fetch(&self, id: EntityId) -> Option<Arc<Entity>> {
        if let Some(hit) = self.cache.get(id) {
            return match hit {
                CachedLookup::Found(entity) => Some(entity),
                CachedLookup::Failed => None,
            };
        }

        let decoded = match self.backend.get_entity(id).await {
            Ok(payload) => Entity::decode(payload).map_err(crate::StyleError::from),
            Err(e) => Err(e),
        };
        match decoded {
            Ok(entity) => {
                let entity = Arc::new(entity);
                self.cache.set(id, Arc::clone(&entity));
                Some(entity)
            }
            Err(e) => {
                warn!("Failed to fetch properties of entity {}: {}", id, e);
                self.cache.set_failed(id);
                None
            }
        }
    }

    async fn resolve_alias(&self, name: &str) -> Option<EntityId> {
        let key = name.to_string();
        if let Some(hit) = self.aliases.get(&key) {
            return hit;
        }
        match self.backend.resolve_alias(name).await {
            Ok(id) => {
                self.aliases.insert(key, id);
                id
            }
            Err(e) => {
                debug!("Alias {:?} did not resolve: {}", name, e);
                None
            }
        }
    }

    /// Resolves the style of one entity.
    ///
    /// Never fails: anything that goes wrong resolves to "no style".
    pub async fn resolve_entity(&self, id: EntityId) -> ResolvedStyle {
        let Some(entity) = self.fetch(id).await else {
            return ResolvedStyle::none();
        };
        // color and icon of its own: tags cannot change the outcome
        if entity.color().is_some() && entity.icon().is_some() {
            return resolve(&entity, &[]);
        }

        let mut resolved_aliases = HashMap::new();
        for name in unmatched_order_names(&entity) {
            if let Some(tag_id) = self.resolve_alias(&name).await {
                resolved_aliases.insert(name, tag_id);
            }
        }

        let tag_ids: Vec<EntityId> = corrected_tag_order(&entity, &resolved_aliases)
            .into_iter()
            .take(self.max_tags)
            .collect();
        let fetched = join_all(tag_ids.iter().map(|tag| self.fetch(*tag))).await;
        let tags: Vec<Arc<Entity>> = tag_ids
            .iter()
            .zip(fetched)
            .map(|(tag, entity)| entity.unwrap_or_else(|| Arc::new(Entity::empty(*tag))))
            .collect();
        let tag_refs: Vec<&Entity> = tags.iter().map(|t| t.as_ref()).collect();

        resolve(&entity, &tag_refs)
    }
}
