use anyhow::Result;
use artmatch_core::{MatchResult, ResultTable};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::download::write_atomic;

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    id: &'a str,
    labels: &'a BTreeMap<String, String>,
    aux: &'a BTreeMap<String, String>,
    /// Column order is kept; duplicate condition names stay separate entries
    matches: Vec<(&'a str, &'a MatchResult)>,
}

/// Serialize a result table as JSON lines, one line per query row
pub fn table_to_jsonl(table: &ResultTable) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (i, row) in table.rows().iter().enumerate() {
        let export = ExportRow {
            id: &row.id,
            labels: &row.labels,
            aux: &row.aux,
            matches: table
                .columns()
                .iter()
                .map(|c| (c.name.as_str(), &c.results[i]))
                .collect(),
        };
        serde_json::to_writer(&mut out, &export)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Write a result table to `path` atomically
pub fn export_table<P: AsRef<Path>>(table: &ResultTable, path: P) -> Result<()> {
    let path = path.as_ref();
    let data = table_to_jsonl(table)?;
    write_atomic(path, &data)?;
    info!(path = %path.display(), rows = table.num_rows(), columns = table.num_columns(), "result table exported");
    Ok(())
}
