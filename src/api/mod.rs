//! Purpose: Define the public Rust API boundary for shelfstore.
//! Exports: The record service, request envelope, remote client, and the
//! core types callers need to drive them.
//! Role: Public, additive-only surface used by the CLI, the HTTP server, and tests.
//! Invariants: Validation lives behind `RecordService`; callers cannot write a
//! store without going through it.

mod remote;
mod request;
mod service;
mod validation;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::catalog::MatchMode;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::products::Record;
pub use crate::core::store::{ByteStore, FileStore, MemoryStore};
pub use remote::RemoteClient;
pub use request::{Action, CrudRequest, Target};
pub use service::{ApiResult, DuplicatePolicy, FailureKind, Outcome, RecordService, ServiceOptions};
pub use validation::{key_field, required_fields, validate_payload};
