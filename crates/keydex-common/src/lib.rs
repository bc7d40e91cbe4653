//! Keydex common types, errors, and configuration.
//!
//! This crate provides shared definitions used by the storage and export crates.

pub mod config;
pub mod error;
pub mod page;
pub mod types;

pub use config::KeydexConfig;
pub use error::{KeydexError, Result};
pub use page::{NodeHeader, PAGE_SIZE, PageType};
pub use types::{IndexEntry, RecordPointer, StoreTag, display_key};
