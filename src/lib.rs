//! Purpose: Library crate behind the `shelfstore` CLI and HTTP server.
//! Exports: `core` (byte stores, catalog and product formats, errors) and
//! `api` (record service, request envelope, remote client).
//! Role: Everything the binary does goes through `api::RecordService`.
//! Invariants: Core modules are pure transformers; only the service touches
//! a `ByteStore`.
pub mod api;
pub mod core;
mod store_paths;

pub use store_paths::{CATALOG_KEY, PRODUCTS_KEY, default_data_dir};
