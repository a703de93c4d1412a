//! Identity allocation for new entities.

use rusqlite::Connection;
use uuid::Uuid;

use crate::error::Result;
use crate::key::KeyValue;
use crate::schema::EntitySchema;

/// Length of an entity stamp
pub const STAMP_LEN: usize = 25;

/// Hands out ids and stamps for new entities.
///
/// Called inside the create transaction, so a sequence read here cannot race
/// another writer.
pub trait IdentityAllocator: Send + Sync {
    /// Next primary id for a sequence-numbered entity kind.
    fn next_id(&self, conn: &Connection, schema: &EntitySchema) -> Result<KeyValue>;

    /// A fresh opaque stamp.
    fn new_stamp(&self) -> String;
}

/// The host's own numbering: `MAX(id) + 1`, stamps cut from a random UUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhcSequence;

impl IdentityAllocator for PhcSequence {
    fn next_id(&self, conn: &Connection, schema: &EntitySchema) -> Result<KeyValue> {
        let next: i64 = conn.query_row(
            &format!(
                "SELECT COALESCE(MAX({}), 0) + 1 FROM {}",
                schema.id_column.quoted(),
                schema.table.quoted()
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(KeyValue::Int(next))
    }

    fn new_stamp(&self) -> String {
        let mut stamp = Uuid::new_v4().simple().to_string();
        stamp.truncate(STAMP_LEN);
        stamp
    }
}
