//! # artmatch Core
//!
//! Core library for artmatch: conditional nearest-neighbor matching over
//! embedded catalogs.
//!
//! This crate provides the data model and the matching pipeline:
//!
//! - [`Entity`] - An embedded item with labels and display fields
//! - [`FeatureStore`] - Read-only ordered entity collection
//! - [`ConditionalKnn`] / [`ConditionalKnnModel`] - Label-partitioned exact k-NN index
//! - [`QueryOrchestrator`] - Fills one match column per label condition
//! - [`Session`] - Explicit execution context that owns the store and its indexes
//!
//! ## Example
//!
//! ```rust
//! use artmatch_core::{Entity, FeatureStore, Session, SessionConfig, Vector};
//!
//! let store = FeatureStore::from_entities(vec![
//!     Entity::new("a", Some(Vector::new(vec![1.0, 0.0]))).with_label("medium", "glass"),
//!     Entity::new("b", Some(Vector::new(vec![0.0, 1.0]))).with_label("medium", "ceramics"),
//! ])
//! .unwrap();
//!
//! let session = Session::new(store, SessionConfig::default());
//! let table = session
//!     .match_conditions(&["a"], "medium", &["glass".to_string(), "ceramics".to_string()])
//!     .unwrap();
//! assert_eq!(table.num_columns(), 2);
//! session.close();
//! ```

pub mod distance;
pub mod entity;
pub mod error;
pub mod index;
pub mod model;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod table;
pub mod vector;

pub use distance::Distance;
pub use entity::{Entity, LabelCondition};
pub use error::{Error, Result};
pub use index::{ConditionalKnn, ConditionalKnnModel, MatchIndex};
pub use model::{Estimator, Model};
pub use orchestrator::{MissingEmbeddingPolicy, QueryOrchestrator};
pub use session::{Session, SessionConfig};
pub use store::FeatureStore;
pub use table::{Match, MatchColumn, MatchResult, ResultTable};
pub use vector::Vector;
