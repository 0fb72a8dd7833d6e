//! Backend abstraction.
//!
//! The host document store owns entities and their properties. The engine
//! only reads them through [`EntityBackend`]; writes are used by the editing
//! affordances, never by a sync pass.

use crate::error::StyleResult;
use async_trait::async_trait;
use blockstyle_model::RawProperty;
use blockstyle_types::EntityId;

/// Access to the host document store.
#[async_trait]
pub trait EntityBackend: Send + Sync {
    /// Fetches an entity in the backend's raw JSON shape.
    ///
    /// Failures are treated by callers as "no properties".
    async fn get_entity(&self, id: EntityId) -> StyleResult<serde_json::Value>;

    /// Resolves an alias (tag name) to an entity id.
    async fn resolve_alias(&self, name: &str) -> StyleResult<Option<EntityId>>;

    /// Writes properties of an entity, replacing same-named ones.
    async fn write_entity_properties(
        &self,
        id: EntityId,
        properties: Vec<RawProperty>,
    ) -> StyleResult<()>;
}

/// An in-memory backend for tests and embedders.
pub mod mock {
    use super::*;
    use crate::error::StyleError;
    use crate::lock;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory backend with injectable failures and call counters.
    #[derive(Debug, Default)]
    pub struct MockBackend {
        entities: Mutex<HashMap<EntityId, serde_json::Value>>,
        aliases: Mutex<HashMap<String, EntityId>>,
        failing: Mutex<HashSet<EntityId>>,
        fetches: Mutex<HashMap<EntityId, usize>>,
        alias_lookups: Mutex<Vec<String>>,
        writes: Mutex<Vec<(EntityId, Vec<RawProperty>)>>,
        latency: Mutex<Option<Duration>>,
    }

    impl MockBackend {
        /// Creates an empty backend.
        pub fn new() -> Self {
            Self::default()
        }

        /// Stores a raw entity payload.
        pub fn insert(&self, id: EntityId, payload: serde_json::Value) {
            lock(&self.entities).insert(id, payload);
        }

        /// Stores an entity with optional color and icon and tag references.
        ///
        /// Tags are referenced in the given order, each through an alias
        /// `tag-<id>`.
        pub fn insert_styled(
            &self,
            id: i64,
            color: Option<&str>,
            icon: Option<&str>,
            tags: &[i64],
        ) {
            let mut properties = Vec::new();
            if let Some(c) = color {
                properties.push(json!({"name": "_color", "type": 1, "value": c}));
            }
            if let Some(i) = icon {
                properties.push(json!({"name": "_icon", "type": 1, "value": i}));
            }
            let refs: Vec<_> = tags
                .iter()
                .map(|t| json!({"type": 2, "to": t, "alias": format!("tag-{t}")}))
                .collect();
            self.insert(
                EntityId::new(id),
                json!({"id": id, "properties": properties, "refs": refs}),
            );
        }

        /// Removes an entity; later fetches fail.
        pub fn remove(&self, id: EntityId) {
            lock(&self.entities).remove(&id);
        }

        /// Registers an alias.
        pub fn set_alias(&self, name: impl Into<String>, id: EntityId) {
            lock(&self.aliases).insert(name.into(), id);
        }

        /// Makes fetches of `id` fail until [`recover`](Self::recover).
        pub fn fail(&self, id: EntityId) {
            lock(&self.failing).insert(id);
        }

        /// Undoes [`fail`](Self::fail).
        pub fn recover(&self, id: EntityId) {
            lock(&self.failing).remove(&id);
        }

        /// Delays every fetch by `latency`.
        pub fn set_latency(&self, latency: Option<Duration>) {
            *lock(&self.latency) = latency;
        }

        /// Total number of entity fetches.
        pub fn fetch_count(&self) -> usize {
            lock(&self.fetches).values().sum()
        }

        /// Number of fetches of one entity.
        pub fn fetch_count_for(&self, id: EntityId) -> usize {
            lock(&self.fetches).get(&id).copied().unwrap_or(0)
        }

        /// Alias names looked up so far.
        pub fn alias_lookups(&self) -> Vec<String> {
            lock(&self.alias_lookups).clone()
        }

        /// Property writes received so far.
        pub fn writes(&self) -> Vec<(EntityId, Vec<RawProperty>)> {
            lock(&self.writes).clone()
        }
    }

    #[async_trait]
    impl EntityBackend for MockBackend {
        async fn get_entity(&self, id: EntityId) -> StyleResult<serde_json::Value> {
            *lock(&self.fetches).entry(id).or_insert(0) += 1;
            let latency = *lock(&self.latency);
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            if lock(&self.failing).contains(&id) {
                return Err(StyleError::Backend(format!("fetch of {id} failed")));
            }
            lock(&self.entities)
                .get(&id)
                .cloned()
                .ok_or_else(|| StyleError::Backend(format!("entity {id} not found")))
        }

        async fn resolve_alias(&self, name: &str) -> StyleResult<Option<EntityId>> {
            lock(&self.alias_lookups).push(name.to_string());
            Ok(lock(&self.aliases).get(name).copied())
        }

        async fn write_entity_properties(
            &self,
            id: EntityId,
            properties: Vec<RawProperty>,
        ) -> StyleResult<()> {
            lock(&self.writes).push((id, properties.clone()));

            let mut entities = lock(&self.entities);
            let payload = entities
                .entry(id)
                .or_insert_with(|| json!({"id": id, "properties": []}));
            let Some(list) = payload
                .as_object_mut()
                .map(|obj| obj.entry("properties").or_insert_with(|| json!([])))
                .and_then(|p| p.as_array_mut())
            else {
                return Err(StyleError::Backend(format!("entity {id} has no property list")));
            };
            for prop in properties {
                list.retain(|existing| {
                    existing.get("name").and_then(|n| n.as_str()) != Some(prop.name.as_str())
                });
                list.push(serde_json::to_value(&prop)?);
            }
            Ok(())
        }
    }
}
