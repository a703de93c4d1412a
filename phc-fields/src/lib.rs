//! Custom field registry and validation for PHC entities
//!
//! `phc-fields` owns the schema side of the custom-field engine: it reads the
//! administrator-maintained definition rows of an entity kind, decides where
//! each field's values live, and validates submitted values into canonical
//! typed form. It never writes values; that is `phc-entity`'s job.
//!
//! # Architecture
//!
//! - **Metadata-driven**: definitions come from a table per entity kind, only active rows count
//! - **Closed target set**: external tables and columns are validated identifiers, never free text
//! - **Typed hand-off**: validation yields [`ValidatedField`]s that bind directly as SQL parameters

pub mod error;
pub mod ident;
pub mod registry;
pub mod types;
pub mod validation;
pub mod value;

pub use error::{FieldsError, Result, ValidationError};
pub use ident::{Identifier, InvalidIdentifier};
pub use registry::{FieldCatalog, FieldRegistry};
pub use types::{DataType, ExternalTarget, FieldDef, FieldStorage, JoinKey, ValueKind};
pub use validation::{ValidatedField, ValidationEngine};
pub use value::{FieldValue, TypedValue};
