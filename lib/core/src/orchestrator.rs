use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::entity::{Entity, LabelCondition};
use crate::index::MatchIndex;
use crate::model::Model;
use crate::table::{MatchResult, ResultTable};
use crate::vector::Vector;
use crate::{Error, Result};

/// What to do with a query row whose embedding is absent or unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingEmbeddingPolicy {
    /// Record an empty match result for the row and keep going
    #[default]
    Empty,
    /// Abort the whole pass with a data error
    Fail,
}

/// Fills one match column per label condition into a result table
pub struct QueryOrchestrator<'a> {
    index: &'a dyn MatchIndex,
    conditions: Vec<LabelCondition>,
    k: usize,
    missing_embedding: MissingEmbeddingPolicy,
}

impl<'a> QueryOrchestrator<'a> {
    pub fn new(index: &'a dyn MatchIndex, conditions: Vec<LabelCondition>) -> Self {
        Self {
            index,
            conditions,
            k: 1,
            missing_embedding: MissingEmbeddingPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    #[must_use]
    pub fn with_missing_embedding(mut self, policy: MissingEmbeddingPolicy) -> Self {
        self.missing_embedding = policy;
        self
    }

    pub fn conditions(&self) -> &[LabelCondition] {
        &self.conditions
    }

    fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::InvalidConfig("k must be at least 1".into()));
        }
        let field = self.index.label_field();
        if let Some(c) = self.conditions.iter().find(|c| c.field != field) {
            return Err(Error::InvalidConfig(format!(
                "condition {c} does not match index field '{field}'"
            )));
        }
        Ok(())
    }

    /// Usable query vector for a row, or the reason it has none
    fn query_vector<'e>(&self, row: &'e Entity) -> Result<&'e Vector> {
        let embedding = row
            .embedding
            .as_ref()
            .filter(|v| v.is_finite())
            .ok_or_else(|| Error::MissingEmbedding(row.id.clone()))?;
        if embedding.dim() != self.index.dim() {
            return Err(Error::InvalidDimension {
                expected: self.index.dim(),
                actual: embedding.dim(),
            });
        }
        Ok(embedding)
    }

    fn match_row(&self, row: &Entity, condition: &LabelCondition) -> Result<MatchResult> {
        match self.query_vector(row) {
            Ok(query) => self.index.query(query, &condition.value, self.k),
            Err(err) => match self.missing_embedding {
                MissingEmbeddingPolicy::Fail => Err(err),
                MissingEmbeddingPolicy::Empty => {
                    warn!(row = %row.id, condition = %condition, error = %err, "query row skipped");
                    Ok(MatchResult::empty())
                }
            },
        }
    }
}

impl Model for QueryOrchestrator<'_> {
    type Input = ResultTable;
    type Output = ResultTable;

    fn transform(&self, mut table: ResultTable) -> Result<ResultTable> {
        self.validate()?;

        for condition in &self.conditions {
            let results = table
                .rows()
                .iter()
                .map(|row| self.match_row(row, condition))
                .collect::<Result<Vec<_>>>()?;

            debug!(
                condition = %condition,
                rows = results.len(),
                matched = results.iter().filter(|r| !r.is_empty()).count(),
                "match column filled"
            );
            table.push_column(condition.value.clone(), results)?;
        }

        Ok(table)
    }
}
