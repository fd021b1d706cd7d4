//! Purpose: Required-field checks and typed extraction of request payloads.
//! Exports: `required_fields`, `key_field`, `validate_payload`, `catalog_entry`.
//! Role: The only place payload shape is enforced before a store is touched.
//! Invariants: Validation failures are `ErrorKind::Validation` and never reach
//! the byte store.
//! Invariants: Presence is checked by key; values are not schema-validated
//! beyond what is needed to render a catalog section.

use serde_json::{Map, Value};

use super::request::{Action, Target};
use crate::core::catalog::CatalogEntry;
use crate::core::error::{Error, ErrorKind};

const CATALOG_FIELDS: &[&str] = &["productName", "description", "features", "specs"];
const PRODUCT_FIELDS: &[&str] = &["name", "subtitle", "price", "specs"];
const DELETE_FIELDS: &[&str] = &["productName"];

pub fn required_fields(target: Target, action: Action) -> &'static [&'static str] {
    match (target, action) {
        (_, Action::Delete) => DELETE_FIELDS,
        (Target::Catalog, Action::Create | Action::Update) => CATALOG_FIELDS,
        (Target::Products, Action::Create | Action::Update) => PRODUCT_FIELDS,
    }
}

pub fn validate_payload(
    target: Target,
    action: Action,
    data: &Value,
) -> Result<&Map<String, Value>, Error> {
    let Value::Object(payload) = data else {
        return Err(Error::new(ErrorKind::Validation).with_message("data must be a JSON object"));
    };
    let missing: Vec<&str> = required_fields(target, action)
        .iter()
        .copied()
        .filter(|field| !payload.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(Error::new(ErrorKind::Validation)
            .with_message(format!("Missing required fields: {}", missing.join(", "))));
    }
    // A blank name is a prefix of every catalog section.
    let key = key_field(target, action);
    if payload
        .get(key)
        .and_then(Value::as_str)
        .is_some_and(|name| name.trim().is_empty())
    {
        return Err(Error::new(ErrorKind::Validation)
            .with_message(format!("Field '{key}' must not be empty")));
    }
    Ok(payload)
}

/// The field a request is matched on.
pub fn key_field(target: Target, action: Action) -> &'static str {
    match (target, action) {
        (Target::Products, Action::Create | Action::Update) => "name",
        _ => "productName",
    }
}

pub fn catalog_entry(payload: &Map<String, Value>) -> Result<CatalogEntry, Error> {
    Ok(CatalogEntry {
        product_name: text_field(payload, "productName"),
        description: text_field(payload, "description"),
        features: list_field(payload, "features")?,
        specs: list_field(payload, "specs")?,
    })
}

/// Renders a value as it appears in catalog text: strings verbatim, anything
/// else as compact JSON.
pub(crate) fn render_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn text_field(payload: &Map<String, Value>, field: &str) -> String {
    payload.get(field).map(render_text).unwrap_or_default()
}

fn list_field(payload: &Map<String, Value>, field: &str) -> Result<Vec<String>, Error> {
    match payload.get(field) {
        Some(Value::Array(items)) => Ok(items.iter().map(render_text).collect()),
        Some(_) => Err(Error::new(ErrorKind::Validation)
            .with_message(format!("Field '{field}' must be a list"))),
        None => Ok(Vec::new()),
    }
}
