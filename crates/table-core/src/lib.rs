//! Core types shared across the table engine workspace: the status
//! taxonomy every operation returns, and schema compatibility helpers.

pub mod error;
pub mod schema;

pub use error::{Result, TableError};
pub use schema::{is_supported_type, schemas_compatible, validate_supported};
