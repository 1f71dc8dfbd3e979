// Feature-store loading from JSON / JSON-lines files, optionally gzip-compressed
use anyhow::{anyhow, bail, Context, Result};
use artmatch_core::{Entity, FeatureStore, Vector};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Maps flat source records onto [`Entity`] fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSchema {
    pub id_field: String,
    pub embedding_field: String,
    /// Label fields to keep. Empty means every scalar field that is not the
    /// id, the embedding or an aux field.
    pub label_fields: Vec<String>,
    pub aux_fields: Vec<String>,
    /// L2-normalize embeddings on load
    pub normalize: bool,
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            embedding_field: "embedding".to_string(),
            label_fields: Vec::new(),
            aux_fields: Vec::new(),
            normalize: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    JsonArray,
    JsonLines,
}

/// Detect format and compression from the file name
fn detect_format(path: &Path) -> Result<(Format, bool)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("invalid store path: {}", path.display()))?
        .to_ascii_lowercase();
    let (stem, gzip) = match name.strip_suffix(".gz") {
        Some(stem) => (stem.to_string(), true),
        None => (name, false),
    };

    let format = if stem.ends_with(".jsonl") || stem.ends_with(".ndjson") {
        Format::JsonLines
    } else if stem.ends_with(".json") {
        Format::JsonArray
    } else {
        bail!("unsupported store format: {}", path.display());
    };
    Ok((format, gzip))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_embedding(value: &Value) -> Option<Vector> {
    let items = value.as_array()?;
    let data = items
        .iter()
        .map(|x| x.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()?;
    if data.is_empty() {
        return None;
    }
    Some(Vector::new(data))
}

/// Turn one flat JSON record into an entity.
///
/// A missing or non-scalar id is an error. A missing or malformed embedding
/// leaves `embedding` as `None`.
pub fn parse_record(record: &Value, schema: &StoreSchema) -> Result<Entity> {
    let object = record
        .as_object()
        .ok_or_else(|| anyhow!("record is not a JSON object"))?;

    let id = match object.get(&schema.id_field) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => n.to_string(),
        Some(_) => bail!("field '{}' is not a string or integer id", schema.id_field),
        None => bail!("record has no '{}' field", schema.id_field),
    };

    let embedding = match object.get(&schema.embedding_field) {
        None | Some(Value::Null) => None,
        Some(raw) => {
            let parsed = parse_embedding(raw);
            if parsed.is_none() {
                warn!(entity = %id, field = %schema.embedding_field, "malformed embedding ignored");
            }
            parsed
        }
    };
    let embedding = match embedding {
        Some(v) if schema.normalize => Some(v.normalized()),
        other => other,
    };

    let mut entity = Entity::new(id, embedding);

    for field in &schema.aux_fields {
        if let Some(v) = object.get(field).and_then(scalar_to_string) {
            entity.aux.insert(field.clone(), v);
        }
    }

    if schema.label_fields.is_empty() {
        for (field, raw) in object {
            if *field == schema.id_field
                || *field == schema.embedding_field
                || schema.aux_fields.contains(field)
            {
                continue;
            }
            if let Some(v) = scalar_to_string(raw) {
                entity.labels.insert(field.clone(), v);
            }
        }
    } else {
        for field in &schema.label_fields {
            if let Some(v) = object.get(field).and_then(scalar_to_string) {
                entity.labels.insert(field.clone(), v);
            }
        }
    }

    Ok(entity)
}

/// Load a feature store from `.json`, `.jsonl` or `.ndjson`, each optionally `.gz`
pub fn load_store<P: AsRef<Path>>(path: P, schema: &StoreSchema) -> Result<FeatureStore> {
    let path = path.as_ref();
    let (format, gzip) = detect_format(path)?;
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader: Box<dyn BufRead> = if gzip {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut store = FeatureStore::new();
    let mut missing_embeddings = 0usize;
    let mut push = |record: &Value, position: usize| -> Result<()> {
        let entity = parse_record(record, schema)
            .with_context(|| format!("{}: bad record at {}", path.display(), position))?;
        if entity.embedding.is_none() {
            missing_embeddings += 1;
        }
        store.insert(entity).map_err(|e| anyhow!("{}: {}", path.display(), e))
    };

    match format {
        Format::JsonArray => {
            let records: Vec<Value> = serde_json::from_reader(reader)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            for (i, record) in records.iter().enumerate() {
                push(record, i)?;
            }
        }
        Format::JsonLines => {
            for (i, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: Value = serde_json::from_str(&line)
                    .with_context(|| format!("{}: invalid JSON on line {}", path.display(), i + 1))?;
                push(&record, i + 1)?;
            }
        }
    }

    info!(
        path = %path.display(),
        entities = store.len(),
        missing_embeddings,
        "feature store loaded"
    );
    Ok(store)
}
