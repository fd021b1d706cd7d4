//! Purpose: Define the `(action, target, data)` request envelope.
//! Exports: `Action`, `Target`, `CrudRequest`.
//! Role: Shared by the HTTP dispatcher, the CLI, and the remote client.
//! Invariants: Envelope errors are `Usage` and carry the wire messages clients
//! already match on ("Missing action, target, or data", "Invalid action or target").

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "create" => Some(Action::Create),
            "update" => Some(Action::Update),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Catalog,
    Products,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Target::Catalog => "catalog",
            Target::Products => "products",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "catalog" => Some(Target::Catalog),
            "products" => Some(Target::Products),
            _ => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CrudRequest {
    pub action: Action,
    pub target: Target,
    pub data: Value,
}

impl CrudRequest {
    pub fn new(action: Action, target: Target, data: Value) -> Self {
        Self {
            action,
            target,
            data,
        }
    }

    /// Decodes a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, Error> {
        let value: Value = serde_json::from_slice(body).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("No JSON data provided")
                .with_source(err)
        })?;
        match value {
            Value::Object(envelope) => Self::from_envelope(&envelope),
            _ => Err(Error::new(ErrorKind::Usage).with_message("No JSON data provided")),
        }
    }

    pub fn from_envelope(envelope: &Map<String, Value>) -> Result<Self, Error> {
        let field = |name: &str| envelope.get(name).filter(|value| is_present(value));
        let (Some(action), Some(target), Some(data)) =
            (field("action"), field("target"), field("data"))
        else {
            return Err(
                Error::new(ErrorKind::Usage).with_message("Missing action, target, or data")
            );
        };
        let action = action.as_str().and_then(Action::parse);
        let target = target.as_str().and_then(Target::parse);
        match (action, target) {
            (Some(action), Some(target)) => Ok(Self::new(action, target, data.clone())),
            _ => Err(Error::new(ErrorKind::Usage).with_message("Invalid action or target")),
        }
    }
}

// Null, false, zero, and empty strings/arrays/objects count as absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
