use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::distance::Distance;
use crate::entity::{Entity, LabelCondition};
use crate::index::{ConditionalKnn, ConditionalKnnModel, MatchIndex};
use crate::model::{Estimator, Model};
use crate::orchestrator::{MissingEmbeddingPolicy, QueryOrchestrator};
use crate::store::FeatureStore;
use crate::table::ResultTable;
use crate::Result;

/// Settings shared by every match pass in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub metric: Distance,
    pub k: usize,
    pub missing_embedding: MissingEmbeddingPolicy,
    /// Auxiliary field reported with each match
    pub values_field: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            metric: Distance::Euclidean,
            k: 1,
            missing_embedding: MissingEmbeddingPolicy::Empty,
            values_field: None,
        }
    }
}

/// Explicit execution context: owns the feature store and the indexes built
/// over it. Create one per run and [`close`](Session::close) it at the end.
pub struct Session {
    id: Uuid,
    config: SessionConfig,
    store: Arc<FeatureStore>,
    indexes: RwLock<AHashMap<String, Arc<ConditionalKnnModel>>>,
    queries: AtomicU64,
}

impl Session {
    pub fn new(store: FeatureStore, config: SessionConfig) -> Self {
        let id = Uuid::new_v4();
        info!(session = %id, entities = store.len(), k = config.k, "session started");
        Self {
            id,
            config,
            store: Arc::new(store),
            indexes: RwLock::new(AHashMap::new()),
            queries: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    /// Number of indexes built so far
    pub fn index_count(&self) -> usize {
        self.indexes.read().len()
    }

    /// Index conditioned on `field`, built on first use and cached
    pub fn index_for(&self, field: &str) -> Result<Arc<ConditionalKnnModel>> {
        if let Some(index) = self.indexes.read().get(field) {
            return Ok(index.clone());
        }

        let mut indexes = self.indexes.write();
        // another caller may have built it between the locks
        if let Some(index) = indexes.get(field) {
            return Ok(index.clone());
        }

        let mut estimator = ConditionalKnn::new(field).with_metric(self.config.metric);
        if let Some(values) = &self.config.values_field {
            estimator = estimator.with_values_field(values.clone());
        }
        let index = match self.config.missing_embedding {
            MissingEmbeddingPolicy::Fail => estimator.fit(self.store.entities())?,
            MissingEmbeddingPolicy::Empty => {
                let usable = indexable(self.store.entities(), field);
                let skipped = self.store.len() - usable.len();
                if skipped > 0 {
                    warn!(session = %self.id, field, skipped, "entities left out of index");
                }
                estimator.fit(&usable)?
            }
        };
        let index = Arc::new(index);
        info!(session = %self.id, field, partitions = index.conditions().len(), "index built");
        indexes.insert(field.to_string(), index.clone());
        Ok(index)
    }

    /// Match each query entity against every value of `field` in `values`.
    /// An empty `values` means every value present in the store.
    pub fn match_conditions<S: AsRef<str>>(
        &self,
        query_ids: &[S],
        field: &str,
        values: &[String],
    ) -> Result<ResultTable> {
        let values = if values.is_empty() {
            self.store.label_values(field)
        } else {
            values.to_vec()
        };
        let conditions = LabelCondition::for_values(field, values);

        let table = self.store.select(query_ids)?;
        let index = self.index_for(field)?;
        let result = QueryOrchestrator::new(index.as_ref(), conditions.clone())
            .with_k(self.config.k)
            .with_missing_embedding(self.config.missing_embedding)
            .transform(table)?;

        self.queries
            .fetch_add((result.num_rows() * conditions.len()) as u64, Ordering::Relaxed);
        Ok(result)
    }

    /// Dispose of the session and its indexes
    pub fn close(self) {
        info!(
            session = %self.id,
            indexes = self.indexes.read().len(),
            queries = self.queries.load(Ordering::Relaxed),
            "session closed"
        );
    }
}

/// Entities with a finite embedding of the leading dimension that carry `field`
fn indexable(entities: &[Entity], field: &str) -> Vec<Entity> {
    let usable = |e: &&Entity| {
        e.label(field).is_some()
            && e.embedding.as_ref().is_some_and(|v| !v.is_empty() && v.is_finite())
    };
    let Some(dim) = entities
        .iter()
        .find(usable)
        .and_then(|e| e.embedding.as_ref().map(|v| v.dim()))
    else {
        return Vec::new();
    };
    entities
        .iter()
        .filter(usable)
        .filter(|e| e.embedding.as_ref().is_some_and(|v| v.dim() == dim))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::Vector;
    use crate::Error;

    fn session() -> Session {
        let entities = vec![
            Entity::new("a", Some(Vector::new(vec![0.0, 0.0])))
                .with_label("culture", "dutch")
                .with_label("medium", "paintings")
                .with_aux("thumb", "a.png"),
            Entity::new("b", Some(Vector::new(vec![1.0, 0.0])))
                .with_label("culture", "french")
                .with_label("medium", "glass")
                .with_aux("thumb", "b.png"),
            Entity::new("c", Some(Vector::new(vec![0.0, 1.0])))
                .with_label("culture", "dutch")
                .with_label("medium", "glass")
                .with_aux("thumb", "c.png"),
        ];
        let config = SessionConfig {
            values_field: Some("thumb".into()),
            ..SessionConfig::default()
        };
        Session::new(FeatureStore::from_entities(entities).unwrap(), config)
    }

    #[test]
    fn test_index_built_once_per_field() {
        let session = session();
        let first = session.index_for("culture").unwrap();
        let second = session.index_for("culture").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        session.index_for("medium").unwrap();
        assert_eq!(session.index_count(), 2);
    }

    #[test]
    fn test_match_all_values_when_none_given() {
        let session = session();
        let table = session.match_conditions(&["a"], "culture", &[]).unwrap();
        let names: Vec<_> = table.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["dutch", "french"]);
        assert_eq!(table.cell(0, "french").unwrap().best().unwrap().value.as_deref(), Some("b.png"));
    }

    fn session_with_broken(policy: MissingEmbeddingPolicy) -> Session {
        let entities = vec![
            Entity::new("a", Some(Vector::new(vec![0.0, 0.0]))).with_label("medium", "glass"),
            Entity::new("b", Some(Vector::new(vec![1.0, 0.0]))).with_label("medium", "paintings"),
            Entity::new("broken", None).with_label("medium", "glass"),
        ];
        let config = SessionConfig {
            missing_embedding: policy,
            ..SessionConfig::default()
        };
        Session::new(FeatureStore::from_entities(entities).unwrap(), config)
    }

    #[test]
    fn test_empty_policy_skips_unindexable_entities() {
        let session = session_with_broken(MissingEmbeddingPolicy::Empty);
        let table = session
            .match_conditions(&["a", "broken"], "medium", &[])
            .unwrap();

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.cell(0, "glass").unwrap().best().unwrap().entity_id, "a");
        assert_eq!(table.cell(0, "paintings").unwrap().best().unwrap().entity_id, "b");
        assert!(table.cell(1, "glass").unwrap().is_empty());
        assert!(table.cell(1, "paintings").unwrap().is_empty());
        assert_eq!(session.index_for("medium").unwrap().len(), 2);
    }

    #[test]
    fn test_fail_policy_rejects_unindexable_entities() {
        let session = session_with_broken(MissingEmbeddingPolicy::Fail);
        let err = session.match_conditions(&["a"], "medium", &[]).unwrap_err();
        assert!(matches!(err, Error::MissingEmbedding(id) if id == "broken"));
        assert_eq!(session.index_count(), 0);
    }

    #[test]
    fn test_indexable_keeps_leading_dimension() {
        let entities = vec![
            Entity::new("x", Some(Vector::new(vec![f32::NAN, 0.0]))).with_label("medium", "glass"),
            Entity::new("y", Some(Vector::new(vec![1.0, 0.0, 0.0]))).with_label("medium", "glass"),
            Entity::new("z", Some(Vector::new(vec![1.0, 0.0]))).with_label("medium", "glass"),
            Entity::new("w", Some(Vector::new(vec![0.0, 1.0, 0.0]))),
        ];
        let ids: Vec<_> = indexable(&entities, "medium").into_iter().map(|e| e.id).collect();
        assert_eq!(ids, ["y"]);
    }

    #[test]
    fn test_unknown_query_id() {
        let session = session();
        let err = session.match_conditions(&["nope"], "culture", &[]).unwrap_err();
        assert!(matches!(err, Error::EntityNotFound(_)));
        session.close();
    }
}
