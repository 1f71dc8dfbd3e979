use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::{Error, Result};

/// A single neighbor returned by a match query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub entity_id: String,
    /// Condition value the neighbor was matched under
    pub label: String,
    /// Configured auxiliary field of the neighbor, if it has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub distance: f32,
}

/// Neighbors for one query, closest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchResult(Vec<Match>);

impl MatchResult {
    #[inline]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Wrap already-ranked matches
    #[inline]
    pub fn new(matches: Vec<Match>) -> Self {
        debug_assert!(matches.windows(2).all(|w| w[0].distance <= w[1].distance));
        Self(matches)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Highest-ranked match
    #[inline]
    pub fn best(&self) -> Option<&Match> {
        self.0.first()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Match> {
        self.0.iter()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Match] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a MatchResult {
    type Item = &'a Match;
    type IntoIter = std::slice::Iter<'a, Match>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A named column holding one match result per row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchColumn {
    pub name: String,
    pub results: Vec<MatchResult>,
}

/// Query entities on the rows, one match column per label condition.
///
/// Every column has exactly one cell per row; queries without matches hold
/// an empty [`MatchResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    rows: Vec<Entity>,
    columns: Vec<MatchColumn>,
}

impl ResultTable {
    /// Seed a table with query rows and no match columns
    pub fn new(rows: Vec<Entity>) -> Self {
        Self {
            rows,
            columns: Vec::new(),
        }
    }

    #[inline]
    pub fn rows(&self) -> &[Entity] {
        &self.rows
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn columns(&self) -> &[MatchColumn] {
        &self.columns
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// First column with the given name
    pub fn column(&self, name: &str) -> Option<&MatchColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Cell at `(row, column name)`
    pub fn cell(&self, row: usize, column: &str) -> Option<&MatchResult> {
        self.column(column).and_then(|c| c.results.get(row))
    }

    /// Append a column; it must have exactly one result per row
    pub fn push_column(&mut self, name: impl Into<String>, results: Vec<MatchResult>) -> Result<()> {
        if results.len() != self.rows.len() {
            return Err(Error::InvalidConfig(format!(
                "column has {} cells but table has {} rows",
                results.len(),
                self.rows.len()
            )));
        }
        self.columns.push(MatchColumn {
            name: name.into(),
            results,
        });
        Ok(())
    }
}
