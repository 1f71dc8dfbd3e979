//! Conditional nearest-neighbor index.
//!
//! Entities are partitioned by the value of one label field. A query names the
//! partition (the condition value) and scans only that partition exactly,
//! keeping the best `k` in a bounded max-heap. Partitions store their vectors
//! contiguously so the scan walks memory linearly; big partitions are split
//! into chunks scanned on the rayon pool and merged.
//!
//! Ties in distance are broken by entity position in the build input, so
//! identical inputs always produce identical results.

use ahash::AHashMap;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use std::collections::BinaryHeap;
use tracing::debug;

use crate::distance::Distance;
use crate::entity::Entity;
use crate::model::Estimator;
use crate::table::{Match, MatchResult};
use crate::vector::Vector;
use crate::{Error, Result};

/// Partitions at least this large are scanned in parallel
const PARALLEL_SCAN_THRESHOLD: usize = 8192;
/// Vectors per parallel scan chunk
const SCAN_CHUNK: usize = 2048;

/// Label-filtered k-nearest-neighbor lookup over a fixed entity set
pub trait MatchIndex: Send + Sync {
    /// Label field the index is conditioned on
    fn label_field(&self) -> &str;

    /// Embedding dimension
    fn dim(&self) -> usize;

    /// Number of indexed entities
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Condition values with at least one entity, sorted
    fn conditions(&self) -> Vec<String>;

    /// Up to `k` entities labelled `condition`, closest first.
    ///
    /// An unknown condition yields an empty result.
    fn query(&self, query: &Vector, condition: &str, k: usize) -> Result<MatchResult>;
}

/// Estimator that builds a [`ConditionalKnnModel`]
#[derive(Debug, Clone)]
pub struct ConditionalKnn {
    label_field: String,
    values_field: Option<String>,
    metric: Distance,
}

impl ConditionalKnn {
    pub fn new(label_field: impl Into<String>) -> Self {
        Self {
            label_field: label_field.into(),
            values_field: None,
            metric: Distance::default(),
        }
    }

    /// Auxiliary field copied into each [`Match::value`]
    #[must_use]
    pub fn with_values_field(mut self, field: impl Into<String>) -> Self {
        self.values_field = Some(field.into());
        self
    }

    #[must_use]
    pub fn with_metric(mut self, metric: Distance) -> Self {
        self.metric = metric;
        self
    }

    pub fn label_field(&self) -> &str {
        &self.label_field
    }
}

impl Estimator for ConditionalKnn {
    type Input = [Entity];
    type Model = ConditionalKnnModel;

    fn fit(&self, entities: &[Entity]) -> Result<ConditionalKnnModel> {
        if self.label_field.is_empty() {
            return Err(Error::InvalidConfig("label field must not be empty".into()));
        }
        let first = entities
            .first()
            .ok_or_else(|| Error::InvalidConfig("cannot build an index over zero entities".into()))?;
        let dim = first
            .embedding
            .as_ref()
            .map(Vector::dim)
            .ok_or_else(|| Error::MissingEmbedding(first.id.clone()))?;
        if dim == 0 {
            return Err(Error::MissingEmbedding(first.id.clone()));
        }

        let mut partitions: AHashMap<String, Partition> = AHashMap::new();
        for entity in entities {
            let embedding = entity
                .embedding
                .as_ref()
                .filter(|v| v.is_finite())
                .ok_or_else(|| Error::MissingEmbedding(entity.id.clone()))?;
            if embedding.dim() != dim {
                return Err(Error::InvalidDimension {
                    expected: dim,
                    actual: embedding.dim(),
                });
            }
            let label = entity.label(&self.label_field).ok_or_else(|| Error::MissingLabel {
                id: entity.id.clone(),
                field: self.label_field.clone(),
            })?;

            let value = self
                .values_field
                .as_deref()
                .and_then(|f| entity.aux_value(f))
                .map(str::to_string);

            partitions
                .entry(label.to_string())
                .or_default()
                .push(&entity.id, value, embedding.as_slice());
        }

        debug!(
            field = %self.label_field,
            entities = entities.len(),
            partitions = partitions.len(),
            "built conditional match index"
        );

        Ok(ConditionalKnnModel {
            label_field: self.label_field.clone(),
            metric: self.metric,
            dim,
            len: entities.len(),
            partitions,
        })
    }
}

/// Entities sharing one label value
#[derive(Debug, Default)]
struct Partition {
    ids: Vec<String>,
    values: Vec<Option<String>>,
    vectors: Vec<f32>,
}

impl Partition {
    fn push(&mut self, id: &str, value: Option<String>, vector: &[f32]) {
        self.ids.push(id.to_string());
        self.values.push(value);
        self.vectors.extend_from_slice(vector);
    }

    #[inline]
    fn len(&self) -> usize {
        self.ids.len()
    }
}

type Candidate = (OrderedFloat<f32>, usize);

/// Best `k` of `vectors` (flattened, `dim` wide), offsetting positions by `base`.
/// Returned ascending by `(distance, position)`.
fn scan(vectors: &[f32], dim: usize, base: usize, query: &[f32], metric: Distance, k: usize) -> Vec<Candidate> {
    let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
    for (i, v) in vectors.chunks_exact(dim).enumerate() {
        let candidate = (OrderedFloat(metric.eval(query, v)), base + i);
        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(worst) = heap.peek() {
            if candidate < *worst {
                heap.pop();
                heap.push(candidate);
            }
        }
    }
    heap.into_sorted_vec()
}

/// Per-label partitioned exact index
#[derive(Debug)]
pub struct ConditionalKnnModel {
    label_field: String,
    metric: Distance,
    dim: usize,
    len: usize,
    partitions: AHashMap<String, Partition>,
}

impl ConditionalKnnModel {
    pub fn metric(&self) -> Distance {
        self.metric
    }

    /// Number of entities carrying `condition`
    pub fn partition_len(&self, condition: &str) -> usize {
        self.partitions.get(condition).map_or(0, Partition::len)
    }
}

impl MatchIndex for ConditionalKnnModel {
    fn label_field(&self) -> &str {
        &self.label_field
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn len(&self) -> usize {
        self.len
    }

    fn conditions(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.partitions.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn query(&self, query: &Vector, condition: &str, k: usize) -> Result<MatchResult> {
        if query.dim() != self.dim {
            return Err(Error::InvalidDimension {
                expected: self.dim,
                actual: query.dim(),
            });
        }
        let Some(partition) = self.partitions.get(condition) else {
            return Ok(MatchResult::empty());
        };
        if k == 0 {
            return Ok(MatchResult::empty());
        }

        let q = query.as_slice();
        let best = if partition.len() >= PARALLEL_SCAN_THRESHOLD {
            let mut merged: Vec<Candidate> = partition
                .vectors
                .par_chunks(self.dim * SCAN_CHUNK)
                .enumerate()
                .flat_map_iter(|(chunk, vectors)| {
                    scan(vectors, self.dim, chunk * SCAN_CHUNK, q, self.metric, k)
                })
                .collect();
            merged.sort_unstable();
            merged.truncate(k);
            merged
        } else {
            scan(&partition.vectors, self.dim, 0, q, self.metric, k)
        };

        let matches = best
            .into_iter()
            .map(|(distance, i)| Match {
                entity_id: partition.ids[i].clone(),
                label: condition.to_string(),
                value: partition.values[i].clone(),
                distance: distance.into_inner(),
            })
            .collect();
        Ok(MatchResult::new(matches))
    }
}
