use ahash::AHashMap;
use std::collections::BTreeSet;

use crate::entity::Entity;
use crate::table::ResultTable;
use crate::{Error, Result};

/// Read-only, ordered collection of entities with id lookup
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    entities: Vec<Entity>,
    by_id: AHashMap<String, usize>,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store, rejecting duplicate ids
    pub fn from_entities(entities: Vec<Entity>) -> Result<Self> {
        let mut store = Self {
            entities: Vec::with_capacity(entities.len()),
            by_id: AHashMap::with_capacity(entities.len()),
        };
        for entity in entities {
            store.insert(entity)?;
        }
        Ok(store)
    }

    /// Append an entity. Only used while loading; the store is read-only afterwards.
    pub fn insert(&mut self, entity: Entity) -> Result<()> {
        if self.by_id.contains_key(&entity.id) {
            return Err(Error::EntityExists(entity.id));
        }
        self.by_id.insert(entity.id.clone(), self.entities.len());
        self.entities.push(entity);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.by_id.get(id).map(|&i| &self.entities[i])
    }

    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Seed a result table with the given entities, in the given order
    pub fn select<S: AsRef<str>>(&self, ids: &[S]) -> Result<ResultTable> {
        let rows = ids
            .iter()
            .map(|id| {
                self.get(id.as_ref())
                    .cloned()
                    .ok_or_else(|| Error::EntityNotFound(id.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ResultTable::new(rows))
    }

    /// Sorted distinct values of a label field
    pub fn label_values(&self, field: &str) -> Vec<String> {
        self.entities
            .iter()
            .filter_map(|e| e.label(field))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
