//! clinic-core: domain layer for the clinic records backend.
//!
//! Holds the per-entity descriptors, the generic persistence/serialization
//! algorithms they drive, and the tabular reshaping helpers used by the
//! reporting endpoint. No I/O lives here; SQL and HTTP wiring belong to the
//! server crate.

pub mod descriptor;
pub mod error;
pub mod record;
pub mod schema;
pub mod stats;

pub use descriptor::EntityDescriptor;
pub use error::CoreError;
pub use record::{apply_update, encode_json_fields, serialize_row, TIMESTAMP_FORMAT};
