//! # scrape-sync core
//!
//! Runtime-agnostic pieces of the sync pipeline: the record model,
//! normalization, reconcile, offset paging with stop policies, typed
//! field paths for relational mapping, and the store/source traits with
//! in-memory implementations.
//!
//! This crate has no tokio, sqlx, or HTTP dependencies.

pub mod counters;
pub mod error;
pub mod field_path;
pub mod mapping;
pub mod models;
pub mod normalize;
pub mod paging;
pub mod reconcile;
pub mod source;
pub mod store;
