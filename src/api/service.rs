//! Purpose: Run validated create/update/delete/list requests against a `ByteStore`.
//! Exports: `RecordService`, `ServiceOptions`, `DuplicatePolicy`, `Outcome`, `FailureKind`.
//! Role: Owns the read-modify-write cycle for one request; the formats in
//! `core::catalog` and `core::products` stay pure.
//! Invariants: Nothing is written unless validation, decode, and the mutation
//! all succeed.
//! Invariants: Each store has its own gate, so catalog and products requests
//! never wait on each other; requests on the same store are serialized.
//! Invariants: Failures are returned, never panicked past this boundary.
#![allow(clippy::result_large_err)]

use serde::Serialize;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use super::request::{Action, CrudRequest, Target};
use super::validation::{catalog_entry, render_text, validate_payload};
use crate::core::catalog::{self, CatalogEntry, MatchMode};
use crate::core::error::{Error, ErrorKind};
use crate::core::products::{ProductList, Record, display_name};
use crate::core::store::ByteStore;
use crate::store_paths::{CATALOG_KEY, PRODUCTS_KEY};

pub type ApiResult<T> = Result<T, Error>;

/// Whether create may add a second entry under an existing key.
///
/// For the catalog the check uses the active `MatchMode`, so under prefix
/// matching `Reject` also refuses "Alpha" while only "AlphaBeta" exists.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DuplicatePolicy {
    #[default]
    Allow,
    Reject,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ServiceOptions {
    pub match_mode: MatchMode,
    pub duplicates: DuplicatePolicy,
}

impl ServiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_match_mode(mut self, match_mode: MatchMode) -> Self {
        self.match_mode = match_mode;
        self
    }

    pub fn with_duplicates(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum FailureKind {
    ValidationError,
    NotFound,
    Conflict,
    StorageError,
}

impl FailureKind {
    pub fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Usage | ErrorKind::Validation => FailureKind::ValidationError,
            ErrorKind::NotFound => FailureKind::NotFound,
            ErrorKind::AlreadyExists => FailureKind::Conflict,
            ErrorKind::Internal
            | ErrorKind::Busy
            | ErrorKind::Permission
            | ErrorKind::Corrupt
            | ErrorKind::Io => FailureKind::StorageError,
        }
    }
}

/// Uniform result of a mutating request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Ok,
    Failure { kind: FailureKind, message: String },
}

impl Outcome {
    pub fn from_error(err: &Error) -> Self {
        let message = err
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        Outcome::Failure {
            kind: FailureKind::from_error_kind(err.kind()),
            message,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

impl From<ApiResult<()>> for Outcome {
    fn from(result: ApiResult<()>) -> Self {
        match result {
            Ok(()) => Outcome::Ok,
            Err(err) => Outcome::from_error(&err),
        }
    }
}

enum CatalogChange {
    Create(CatalogEntry),
    Update(CatalogEntry),
    Delete(String),
}

enum ProductChange {
    Create(Record),
    Update(Record),
    Delete(Value),
}

pub struct RecordService<S> {
    store: S,
    options: ServiceOptions,
    catalog_gate: Mutex<()>,
    products_gate: Mutex<()>,
}

impl<S: ByteStore> RecordService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            options: ServiceOptions::default(),
            catalog_gate: Mutex::new(()),
            products_gate: Mutex::new(()),
        }
    }

    pub fn with_options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ServiceOptions {
        self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the catalog text, creating an empty catalog if none exists.
    pub fn read_catalog(&self) -> ApiResult<String> {
        let _gate = enter(&self.catalog_gate);
        let _lock = self.store.lock(CATALOG_KEY)?;
        match self.load_catalog()? {
            Some(text) => {
                debug!(bytes = text.len(), "serving catalog");
                Ok(text)
            }
            None => {
                warn!(key = CATALOG_KEY, "catalog not found, creating empty catalog");
                self.store.write(CATALOG_KEY, b"")?;
                Ok(String::new())
            }
        }
    }

    /// Returns all product records, creating an empty list if none exists.
    pub fn list_products(&self) -> ApiResult<Vec<Record>> {
        let _gate = enter(&self.products_gate);
        let _lock = self.store.lock(PRODUCTS_KEY)?;
        match self.load_products()? {
            Some(list) => {
                debug!(count = list.len(), "serving products");
                Ok(list.into_records())
            }
            None => {
                warn!(key = PRODUCTS_KEY, "products not found, creating empty list");
                let empty = ProductList::default();
                self.store.write(PRODUCTS_KEY, &empty.encode()?)?;
                Ok(Vec::new())
            }
        }
    }

    pub fn execute(&self, request: &CrudRequest) -> ApiResult<()> {
        let result = match request.target {
            Target::Catalog => self.mutate_catalog(request.action, &request.data),
            Target::Products => self.mutate_products(request.action, &request.data),
        };
        if let Err(err) = &result {
            if err.is_storage() {
                error!(store = %request.target, action = %request.action, error = %err, "request failed");
            } else {
                debug!(store = %request.target, action = %request.action, error = %err, "request rejected");
            }
        }
        result
    }

    pub fn handle(&self, request: &CrudRequest) -> Outcome {
        Outcome::from(self.execute(request))
    }

    fn mutate_catalog(&self, action: Action, data: &Value) -> ApiResult<()> {
        let payload = validate_payload(Target::Catalog, action, data)?;
        let change = match action {
            Action::Create => CatalogChange::Create(catalog_entry(payload)?),
            Action::Update => CatalogChange::Update(catalog_entry(payload)?),
            Action::Delete => {
                CatalogChange::Delete(payload.get("productName").map(render_text).unwrap_or_default())
            }
        };
        if let CatalogChange::Create(entry) | CatalogChange::Update(entry) = &change {
            if entry.contains_marker() {
                warn!(product = %entry.product_name, "entry text contains the section marker and will split on reload");
            }
        }

        let _gate = enter(&self.catalog_gate);
        let _lock = self.store.lock(CATALOG_KEY)?;
        let text = self.load_catalog()?.unwrap_or_default();
        let mode = self.options.match_mode;
        let (updated, product) = match change {
            CatalogChange::Create(entry) => {
                if self.options.duplicates == DuplicatePolicy::Reject
                    && catalog::contains(&text, &entry.product_name, mode)
                {
                    return Err(already_exists(&entry.product_name));
                }
                (catalog::create(&text, &entry), entry.product_name)
            }
            CatalogChange::Update(entry) => {
                (catalog::update(&text, &entry, mode)?, entry.product_name)
            }
            CatalogChange::Delete(name) => (catalog::delete(&text, &name, mode)?, name),
        };
        self.store.write(CATALOG_KEY, updated.as_bytes())?;
        info!(%action, product = %product, key = CATALOG_KEY, "catalog written");
        Ok(())
    }

    fn mutate_products(&self, action: Action, data: &Value) -> ApiResult<()> {
        let payload = validate_payload(Target::Products, action, data)?;
        let change = match action {
            Action::Create => ProductChange::Create(payload.clone()),
            Action::Update => ProductChange::Update(payload.clone()),
            Action::Delete => {
                ProductChange::Delete(payload.get("productName").cloned().unwrap_or(Value::Null))
            }
        };

        let _gate = enter(&self.products_gate);
        let _lock = self.store.lock(PRODUCTS_KEY)?;
        let mut list = self.load_products()?.unwrap_or_default();
        let product = match change {
            ProductChange::Create(record) => {
                let name = record.get("name").cloned().unwrap_or(Value::Null);
                if self.options.duplicates == DuplicatePolicy::Reject
                    && list.position(&name).is_some()
                {
                    return Err(already_exists(&display_name(&name)));
                }
                list.create(record);
                name
            }
            ProductChange::Update(record) => {
                let name = record.get("name").cloned().unwrap_or(Value::Null);
                list.update(record)?;
                name
            }
            ProductChange::Delete(name) => {
                list.delete(&name)?;
                name
            }
        };
        self.store.write(PRODUCTS_KEY, &list.encode()?)?;
        info!(%action, product = %display_name(&product), count = list.len(), key = PRODUCTS_KEY, "products written");
        Ok(())
    }

    fn load_catalog(&self) -> ApiResult<Option<String>> {
        let Some(bytes) = self.store.read(CATALOG_KEY)? else {
            return Ok(None);
        };
        String::from_utf8(bytes).map(Some).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("catalog is not valid UTF-8")
                .with_key(CATALOG_KEY)
                .with_source(err)
        })
    }

    fn load_products(&self) -> ApiResult<Option<ProductList>> {
        let Some(bytes) = self.store.read(PRODUCTS_KEY)? else {
            return Ok(None);
        };
        ProductList::decode(&bytes)
            .map(Some)
            .map_err(|err| err.with_key(PRODUCTS_KEY))
    }
}

// A panic mid-cycle leaves nothing half-applied in memory, so a poisoned gate
// is still usable.
fn enter(gate: &Mutex<()>) -> MutexGuard<'_, ()> {
    gate.lock().unwrap_or_else(|poison| poison.into_inner())
}

fn already_exists(name: &str) -> Error {
    Error::new(ErrorKind::AlreadyExists)
        .with_message(format!("Product '{name}' already exists"))
        .with_hint("Use update to change an existing product.")
}

#[cfg(test)]
mod tests {
    use super::{DuplicatePolicy, FailureKind, Outcome, RecordService, ServiceOptions};
    use crate::api::request::{Action, CrudRequest, Target};
    use crate::core::catalog::MatchMode;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::store::{ByteStore, FileStore, MemoryStore};
    use crate::store_paths::{CATALOG_KEY, PRODUCTS_KEY};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::thread;

    fn request(action: Action, target: Target, data: Value) -> CrudRequest {
        CrudRequest::new(action, target, data)
    }

    fn catalog_payload(name: &str, description: &str) -> Value {
        json!({
            "productName": name,
            "description": description,
            "features": ["f1"],
            "specs": ["s1"],
        })
    }

    struct ReadOnlyStore(MemoryStore);

    impl ByteStore for ReadOnlyStore {
        fn read(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
            self.0.read(key)
        }

        fn write(&self, key: &str, _bytes: &[u8]) -> Result<(), Error> {
            Err(Error::new(ErrorKind::Permission)
                .with_message("store is read-only")
                .with_key(key))
        }
    }

    #[test]
    fn catalog_create_on_empty_store_writes_fixed_format() {
        let service = RecordService::new(MemoryStore::new());
        let outcome = service.handle(&request(
            Action::Create,
            Target::Catalog,
            json!({"productName": "Widget", "description": "d", "features": ["f1"], "specs": ["s1"]}),
        ));
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(
            service.read_catalog().expect("read"),
            "## Widget - Description\nDescription: d\nKey Features:\n- f1\nTechnical Specifications:\n- s1\n"
        );
    }

    #[test]
    fn products_create_then_update_merges() {
        let service = RecordService::new(MemoryStore::new().with_blob(PRODUCTS_KEY, "[]"));
        service
            .execute(&request(
                Action::Create,
                Target::Products,
                json!({"name": "X", "subtitle": "s", "price": 1, "specs": []}),
            ))
            .expect("create");
        service
            .execute(&request(
                Action::Update,
                Target::Products,
                json!({"name": "X", "subtitle": "t", "price": 1, "specs": []}),
            ))
            .expect("update");
        let records = service.list_products().expect("list");
        assert_eq!(
            Value::Array(records.into_iter().map(Value::Object).collect()),
            json!([{"name": "X", "subtitle": "t", "price": 1, "specs": []}])
        );
    }

    #[test]
    fn catalog_update_prefers_first_prefix_match() {
        let service = RecordService::new(MemoryStore::new());
        for name in ["Alpha", "AlphaBeta"] {
            service
                .execute(&request(Action::Create, Target::Catalog, catalog_payload(name, "old")))
                .expect("create");
        }
        service
            .execute(&request(Action::Update, Target::Catalog, catalog_payload("Alpha", "new")))
            .expect("update");
        let text = service.read_catalog().expect("read");
        assert!(text.starts_with("## Alpha - Description\nDescription: new\n"));
        assert!(text.contains("## AlphaBeta - Description\nDescription: old\n"));
    }

    #[test]
    fn exact_mode_is_configurable() {
        let options = ServiceOptions::new().with_match_mode(MatchMode::Exact);
        let service = RecordService::new(MemoryStore::new()).with_options(options);
        service
            .execute(&request(Action::Create, Target::Catalog, catalog_payload("AlphaBeta", "ab")))
            .expect("create");
        let err = service
            .execute(&request(Action::Delete, Target::Catalog, json!({"productName": "Alpha"})))
            .expect_err("exact miss");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn not_found_leaves_store_byte_for_byte_unchanged() {
        let seeded = "## Alpha - Description\nDescription: a\n";
        let products = "[\n  {\n    \"name\": \"X\"\n  }\n]";
        let service = RecordService::new(
            MemoryStore::new()
                .with_blob(CATALOG_KEY, seeded)
                .with_blob(PRODUCTS_KEY, products),
        );

        let outcome = service.handle(&request(
            Action::Update,
            Target::Catalog,
            catalog_payload("Ghost", "g"),
        ));
        assert_eq!(
            outcome,
            Outcome::Failure {
                kind: FailureKind::NotFound,
                message: "Product 'Ghost' not found".to_string(),
            }
        );
        let outcome = service.handle(&request(
            Action::Delete,
            Target::Products,
            json!({"productName": "Ghost"}),
        ));
        assert!(matches!(outcome, Outcome::Failure { kind: FailureKind::NotFound, .. }));

        assert_eq!(service.store().get(CATALOG_KEY), Some(seeded.as_bytes().to_vec()));
        assert_eq!(service.store().get(PRODUCTS_KEY), Some(products.as_bytes().to_vec()));
    }

    #[test]
    fn delete_reduces_count_by_one() {
        let service = RecordService::new(MemoryStore::new());
        for name in ["A", "B", "C"] {
            service
                .execute(&request(
                    Action::Create,
                    Target::Products,
                    json!({"name": name, "subtitle": "s", "price": 1, "specs": []}),
                ))
                .expect("create");
        }
        service
            .execute(&request(Action::Delete, Target::Products, json!({"productName": "B"})))
            .expect("delete");
        let names: Vec<_> = service
            .list_products()
            .expect("list")
            .iter()
            .map(|record| record["name"].clone())
            .collect();
        assert_eq!(names, [json!("A"), json!("C")]);
    }

    #[test]
    fn missing_fields_fail_validation_without_touching_store() {
        let service = RecordService::new(MemoryStore::new());
        let outcome = service.handle(&request(
            Action::Create,
            Target::Catalog,
            json!({"productName": "Widget"}),
        ));
        assert_eq!(
            outcome,
            Outcome::Failure {
                kind: FailureKind::ValidationError,
                message: "Missing required fields: description, features, specs".to_string(),
            }
        );
        assert_eq!(service.store().get(CATALOG_KEY), None);
    }

    #[test]
    fn corrupt_products_surface_as_storage_error() {
        let service =
            RecordService::new(MemoryStore::new().with_blob(PRODUCTS_KEY, "{\"name\": \"X\"}"));
        let outcome = service.handle(&request(
            Action::Create,
            Target::Products,
            json!({"name": "Y", "subtitle": "s", "price": 1, "specs": []}),
        ));
        assert!(matches!(outcome, Outcome::Failure { kind: FailureKind::StorageError, .. }));
        assert_eq!(
            service.store().get(PRODUCTS_KEY),
            Some(b"{\"name\": \"X\"}".to_vec())
        );
        let err = service.list_products().expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.key(), Some(PRODUCTS_KEY));
    }

    #[test]
    fn broken_file_store_surfaces_as_storage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("memory");
        let service = RecordService::new(FileStore::open(&root).expect("open"));
        std::fs::remove_dir_all(&root).expect("remove root");

        let outcome = service.handle(&request(
            Action::Create,
            Target::Products,
            json!({"name": "X", "subtitle": "s", "price": 1, "specs": []}),
        ));
        assert!(matches!(outcome, Outcome::Failure { kind: FailureKind::StorageError, .. }));
        let outcome = service.handle(&request(
            Action::Delete,
            Target::Catalog,
            json!({"productName": "Widget"}),
        ));
        assert!(matches!(outcome, Outcome::Failure { kind: FailureKind::StorageError, .. }));
    }

    #[test]
    fn blank_catalog_delete_leaves_sections_alone() {
        let seeded = "## Alpha - Description\nDescription: a\n";
        let service = RecordService::new(MemoryStore::new().with_blob(CATALOG_KEY, seeded));
        let outcome = service.handle(&request(Action::Delete, Target::Catalog, json!({"productName": ""})));
        assert!(matches!(outcome, Outcome::Failure { kind: FailureKind::ValidationError, .. }));
        assert_eq!(service.store().get(CATALOG_KEY), Some(seeded.as_bytes().to_vec()));
    }

    #[test]
    fn invalid_utf8_catalog_is_corrupt() {
        let service = RecordService::new(MemoryStore::new().with_blob(CATALOG_KEY, vec![0xff, 0xfe]));
        let err = service.read_catalog().expect_err("corrupt");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn write_failures_surface_as_storage_error() {
        let service = RecordService::new(ReadOnlyStore(MemoryStore::new()));
        let outcome = service.handle(&request(
            Action::Create,
            Target::Catalog,
            catalog_payload("Widget", "d"),
        ));
        assert_eq!(
            outcome,
            Outcome::Failure {
                kind: FailureKind::StorageError,
                message: "store is read-only".to_string(),
            }
        );
    }

    #[test]
    fn reads_create_empty_blobs() {
        let service = RecordService::new(MemoryStore::new());
        assert_eq!(service.read_catalog().expect("catalog"), "");
        assert!(service.list_products().expect("products").is_empty());
        assert_eq!(service.store().get(CATALOG_KEY), Some(Vec::new()));
        assert_eq!(service.store().get(PRODUCTS_KEY), Some(b"[]".to_vec()));
    }

    #[test]
    fn duplicates_allowed_by_default() {
        let service = RecordService::new(MemoryStore::new());
        let payload = json!({"name": "X", "subtitle": "s", "price": 1, "specs": []});
        for _ in 0..2 {
            service
                .execute(&request(Action::Create, Target::Products, payload.clone()))
                .expect("create");
        }
        assert_eq!(service.list_products().expect("list").len(), 2);
    }

    #[test]
    fn reject_policy_blocks_duplicate_creates() {
        let options = ServiceOptions::new().with_duplicates(DuplicatePolicy::Reject);
        let service = RecordService::new(MemoryStore::new()).with_options(options);
        let payload = json!({"name": "X", "subtitle": "s", "price": 1, "specs": []});
        service
            .execute(&request(Action::Create, Target::Products, payload.clone()))
            .expect("create");
        let outcome = service.handle(&request(Action::Create, Target::Products, payload));
        assert!(matches!(outcome, Outcome::Failure { kind: FailureKind::Conflict, .. }));

        service
            .execute(&request(Action::Create, Target::Catalog, catalog_payload("Widget", "d")))
            .expect("create");
        let err = service
            .execute(&request(Action::Create, Target::Catalog, catalog_payload("Widget", "e")))
            .expect_err("duplicate");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn reject_policy_follows_match_mode_for_catalog() {
        let prefix = RecordService::new(MemoryStore::new())
            .with_options(ServiceOptions::new().with_duplicates(DuplicatePolicy::Reject));
        prefix
            .execute(&request(Action::Create, Target::Catalog, catalog_payload("AlphaBeta", "d")))
            .expect("create");
        let err = prefix
            .execute(&request(Action::Create, Target::Catalog, catalog_payload("Alpha", "d")))
            .expect_err("prefix duplicate");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let exact = RecordService::new(MemoryStore::new()).with_options(
            ServiceOptions::new()
                .with_duplicates(DuplicatePolicy::Reject)
                .with_match_mode(MatchMode::Exact),
        );
        exact
            .execute(&request(Action::Create, Target::Catalog, catalog_payload("AlphaBeta", "d")))
            .expect("create");
        exact
            .execute(&request(Action::Create, Target::Catalog, catalog_payload("Alpha", "d")))
            .expect("distinct name under exact matching");
    }

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let service = Arc::new(RecordService::new(MemoryStore::new()));
        let mut handles = Vec::new();
        for worker in 0..4 {
            let service = Arc::clone(&service);
            handles.push(thread::spawn(move || {
                for i in 0..25 {
                    let name = format!("p{worker}-{i}");
                    service
                        .execute(&CrudRequest::new(
                            Action::Create,
                            Target::Products,
                            json!({"name": name, "subtitle": "s", "price": i, "specs": []}),
                        ))
                        .expect("product");
                    service
                        .execute(&CrudRequest::new(
                            Action::Create,
                            Target::Catalog,
                            catalog_payload(&name, "d"),
                        ))
                        .expect("catalog");
                }
            }));
        }
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(service.list_products().expect("list").len(), 100);
        let text = service.read_catalog().expect("read");
        assert_eq!(text.matches("## ").count(), 100);
    }
}
