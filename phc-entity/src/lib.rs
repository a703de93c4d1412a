//! Entity writes and custom field persistence for PHC
//!
//! `phc-entity` orchestrates reads and writes of customers, orders and stock
//! articles together with their custom fields. Field definitions come from
//! `phc-fields`; this crate decides nothing about them beyond routing each
//! validated value to its store.
//!
//! # Architecture
//!
//! - **One engine, three kinds**: an [`EntitySchema`] per kind parameterizes a single [`EntityService`]
//! - **Two stores**: external fields go to a named host column, the rest to the kind's values table
//! - **All or nothing**: a write is one IMMEDIATE transaction, rolled back on any failure
//! - **Injected handle**: the [`Database`] is passed in, never opened behind the caller's back

pub mod database;
pub mod error;
pub mod external;
pub mod generic;
pub mod identity;
pub mod key;
pub mod logging;
pub mod record;
pub mod schema;
pub mod service;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use database::{Database, DEFAULT_BUSY_TIMEOUT_MS};
pub use error::{EntityError, Result, WriteOp};
pub use external::{ExternalResolver, TargetPolicy, WriteOutcome};
pub use generic::GenericStore;
pub use identity::{IdentityAllocator, PhcSequence, STAMP_LEN};
pub use key::{EntityKey, KeyValue};
pub use logging::Pretty;
pub use record::{
    BaseValues, Created, EntityRecord, EntitySummary, FieldSource, ListQuery, Page, ResolvedField,
};
pub use schema::{EntityKind, EntitySchema, IdSource};
pub use service::{EngineSettings, EntityService, ErpContext, DEFAULT_ACTOR};
