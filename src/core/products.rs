//! Purpose: Decode, mutate, and encode the JSON product list.
//! Exports: `ProductList`, `Record`.
//! Role: Pure transformer over the products blob; owns no storage.
//! Invariants: Records keep their order and field order across rewrites.
//! Invariants: Update and delete act on the first record whose `name` equals
//! the requested value; records without a `name` never match.

use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};

pub type Record = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductList {
    records: Vec<Record>,
}

impl ProductList {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Decodes a persisted blob. Empty or whitespace-only input is an empty
    /// list; anything that is not an array of objects is `Corrupt`.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_slice(bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message(format!("Invalid JSON in products file: {err}"))
                .with_source(err)
        })?;
        let Value::Array(items) = value else {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("products file must hold a JSON array"));
        };
        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(record) => records.push(record),
                _ => {
                    return Err(Error::new(ErrorKind::Corrupt)
                        .with_message(format!("product at index {index} is not an object")));
                }
            }
        }
        Ok(Self { records })
    }

    /// Pretty-printed with two-space indentation.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec_pretty(&self.records).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode products")
                .with_source(err)
        })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn position(&self, name: &Value) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.get("name") == Some(name))
    }

    pub fn create(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Merges `patch` into the first record with the same `name`; fields the
    /// patch does not carry are left as they were.
    pub fn update(&mut self, patch: Record) -> Result<(), Error> {
        let name = patch.get("name").cloned().unwrap_or(Value::Null);
        let index = self.position(&name).ok_or_else(|| not_found(&name))?;
        self.records[index].extend(patch);
        Ok(())
    }

    pub fn delete(&mut self, name: &Value) -> Result<Record, Error> {
        let index = self.position(name).ok_or_else(|| not_found(name))?;
        Ok(self.records.remove(index))
    }
}

fn not_found(name: &Value) -> Error {
    Error::new(ErrorKind::NotFound).with_message(format!("Product '{}' not found", display_name(name)))
}

pub(crate) fn display_name(name: &Value) -> String {
    match name {
        Value::String(name) => name.clone(),
        other => other.to_string(),
    }
}
