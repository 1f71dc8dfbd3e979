//! # artmatch Render
//!
//! Turns a result table into a comparison grid: the query items on top, the
//! best match per condition beneath each one.
//!
//! ```text
//!             q1        q2        q3
//! original   [img]     [img]     [img]
//! dutch      [img]     [img]     [ - ]
//! french     [img]     [ x ]     [img]
//! ```
//!
//! `[ - ]` is an empty match, `[ x ]` a resource that could not be fetched or
//! decoded. Row and column titles go into a JSON manifest written next to the
//! image.

pub mod error;
pub mod fetch;
pub mod grid;
pub mod presenter;

pub use error::RenderError;
pub use fetch::{HttpFetcher, ResourceFetcher};
pub use grid::{GridLayout, ORIGINAL_ROW_TITLE};
pub use presenter::{Presenter, PresenterConfig, RenderReport};
