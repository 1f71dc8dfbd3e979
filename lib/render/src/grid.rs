use artmatch_core::ResultTable;
use serde::Serialize;
use tracing::warn;

pub const ORIGINAL_ROW_TITLE: &str = "original";

/// Comparison grid: one column per query, the original on the first row and
/// one row per condition below it. A `None` cell has nothing to show.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridLayout {
    pub row_titles: Vec<String>,
    pub column_titles: Vec<String>,
    /// Row-major cell references
    pub cells: Vec<Vec<Option<String>>>,
}

impl GridLayout {
    /// Lay out a result table.
    ///
    /// `original_field` is the aux field holding each query's own reference;
    /// `conditions` picks match columns by name, all columns when empty.
    pub fn from_table(table: &ResultTable, original_field: &str, conditions: &[String]) -> Self {
        let conditions: Vec<String> = if conditions.is_empty() {
            table.columns().iter().map(|c| c.name.clone()).collect()
        } else {
            conditions.to_vec()
        };

        let column_titles = table.rows().iter().map(|e| e.id.clone()).collect();

        let mut row_titles = Vec::with_capacity(conditions.len() + 1);
        let mut cells = Vec::with_capacity(conditions.len() + 1);

        row_titles.push(ORIGINAL_ROW_TITLE.to_string());
        cells.push(
            table
                .rows()
                .iter()
                .map(|e| e.aux_value(original_field).map(str::to_string))
                .collect(),
        );

        for name in conditions {
            let row = match table.column(&name) {
                Some(column) => column
                    .results
                    .iter()
                    .map(|r| r.best().and_then(|m| m.value.clone()))
                    .collect(),
                None => {
                    warn!(condition = %name, "no such match column, rendering placeholders");
                    vec![None; table.num_rows()]
                }
            };
            row_titles.push(name);
            cells.push(row);
        }

        Self {
            row_titles,
            column_titles,
            cells,
        }
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.row_titles.len()
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.column_titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0 || self.num_columns() == 0
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.cells.get(row)?.get(column)?.as_deref()
    }
}
