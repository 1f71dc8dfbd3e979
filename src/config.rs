use anyhow::{bail, Context, Result};
use artmatch_core::SessionConfig;
use artmatch_render::PresenterConfig;
use artmatch_store::{DatasetFetcher, StoreSchema};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the feature store comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSource {
    /// Local store file; takes precedence over `url`
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    /// Expected SHA-256 of the downloaded file
    pub sha256: Option<String>,
    pub cache_dir: PathBuf,
    pub schema: StoreSchema,
}

impl Default for StoreSource {
    fn default() -> Self {
        Self {
            path: None,
            url: None,
            sha256: None,
            cache_dir: PathBuf::from("./data"),
            schema: StoreSchema::default(),
        }
    }
}

impl StoreSource {
    /// Local path of the store, downloading it first if needed
    pub async fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        match &self.url {
            Some(url) => DatasetFetcher::new(&self.cache_dir)?
                .fetch(url, self.sha256.as_deref())
                .await
                .with_context(|| format!("failed to fetch dataset from {url}")),
            None => bail!("store needs either a path or a url"),
        }
    }
}

/// Label field to condition on, and which of its values become columns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionConfig {
    pub field: String,
    /// Empty means every value present in the store
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub enabled: bool,
    pub output: PathBuf,
    /// Aux field with each query's own image; defaults to the matching values field
    pub original_field: Option<String>,
    pub presenter: PresenterConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output: PathBuf::from("matches.png"),
            original_field: None,
            presenter: PresenterConfig::default(),
        }
    }
}

/// Everything one matching run needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub store: StoreSource,
    pub queries: Vec<String>,
    pub condition: ConditionConfig,
    pub matching: SessionConfig,
    pub render: RenderConfig,
    /// Optional JSON-lines dump of the result table
    pub export: Option<PathBuf>,
}

impl RunConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.queries.is_empty() {
            bail!("no query ids given");
        }
        if self.condition.field.is_empty() {
            bail!("no condition field given");
        }
        if self.matching.k == 0 {
            bail!("k must be at least 1");
        }
        if self.store.path.is_none() && self.store.url.is_none() {
            bail!("store needs either a path or a url");
        }
        if self.render.enabled && self.original_field().is_none() {
            bail!("rendering needs render.original_field or matching.values_field");
        }
        Ok(())
    }

    /// Aux field holding the query originals in the grid
    pub fn original_field(&self) -> Option<&str> {
        self.render
            .original_field
            .as_deref()
            .or(self.matching.values_field.as_deref())
    }
}
