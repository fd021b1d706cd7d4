//! Purpose: Shared data-directory and blob-key naming for the two stores.
//! Exports: `default_data_dir`, `CATALOG_KEY`, `PRODUCTS_KEY`.
//! Role: Keep CLI, server, and library defaults aligned from one source.
//! Invariants: Default data directory remains `~/.shelfstore/memory`.
//! Invariants: Keys are plain file names so any `ByteStore` can address them.

use std::path::PathBuf;

pub const CATALOG_KEY: &str = "catalog.txt";
pub const PRODUCTS_KEY: &str = "products.json";

pub fn default_data_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".shelfstore").join("memory")
}
