//! # artmatch
//!
//! Conditional nearest-neighbor matching over embedded catalogs.
//!
//! Given a catalog of items with embeddings and categorical labels (say,
//! museum artworks labelled by culture and medium), artmatch answers "what is
//! the closest item from each of these cultures?" for a set of query items,
//! and renders the answers as a comparison grid.
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! artmatch --config run.json --output matches.png
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use artmatch::prelude::*;
//!
//! let store = load_store("art.jsonl", &StoreSchema::default()).unwrap();
//! let session = Session::new(store, SessionConfig::default());
//! let table = session
//!     .match_conditions(&["1234"], "culture", &["dutch".to_string()])
//!     .unwrap();
//! session.close();
//! ```
//!
//! ## Crate Structure
//!
//! - `artmatch-core` - Entities, the conditional match index, orchestration, sessions
//! - `artmatch-store` - Loading, dataset download, result export
//! - `artmatch-render` - Comparison-grid rendering

pub mod config;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

pub use artmatch_core::{
    ConditionalKnn, ConditionalKnnModel, Distance, Entity, Error, Estimator, FeatureStore,
    LabelCondition, Match, MatchIndex, MatchResult, MissingEmbeddingPolicy, Model,
    QueryOrchestrator, ResultTable, Session, SessionConfig, Vector,
};
pub use artmatch_render::{GridLayout, HttpFetcher, Presenter, PresenterConfig, RenderReport};
pub use artmatch_store::{export_table, load_store, DatasetFetcher, StoreSchema};
pub use config::RunConfig;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        load_store, ConditionalKnn, Distance, Entity, Estimator, FeatureStore, GridLayout,
        LabelCondition, MatchIndex, Model, Presenter, QueryOrchestrator, ResultTable, RunConfig,
        Session, SessionConfig, StoreSchema, Vector,
    };
}

/// What a run produced
#[derive(Debug)]
pub struct RunSummary {
    pub table: ResultTable,
    pub exported: Option<PathBuf>,
    pub render: Option<RenderReport>,
}

/// Load the store, match, export and render as configured
pub async fn run(config: &RunConfig) -> Result<RunSummary> {
    config.validate()?;

    let store_path = config.store.resolve().await?;
    let store = load_store(&store_path, &config.store.schema)?;

    let session = Session::new(store, config.matching.clone());
    let table = session
        .match_conditions(&config.queries, &config.condition.field, &config.condition.values)
        .context("matching failed")?;
    info!(rows = table.num_rows(), columns = table.num_columns(), "matching done");
    session.close();

    let exported = match &config.export {
        Some(path) => {
            export_table(&table, path)?;
            Some(path.clone())
        }
        None => None,
    };

    let render = match config.original_field() {
        Some(original_field) if config.render.enabled => {
            let layout = GridLayout::from_table(&table, original_field, &[]);
            let presenter = Presenter::new(config.render.presenter.clone());
            let fetcher = HttpFetcher::new(presenter.config().timeout)?;
            Some(presenter.render(&layout, &fetcher, &config.render.output).await?)
        }
        _ => None,
    };

    Ok(RunSummary {
        table,
        exported,
        render,
    })
}
