//! External-Field Resolver: values living in a named column of a host table.
//!
//! The table, column and key column come from the field's definition. They
//! are identifiers validated when the registry loaded the row, and they are
//! checked against a [`TargetPolicy`] before any statement is built.

use std::collections::HashSet;

use phc_fields::{ExternalTarget, FieldDef, FieldsError, TypedValue};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{EntityError, Result};
use crate::key::EntityKey;

/// Which host tables external fields may touch.
#[derive(Debug, Clone, Default)]
pub struct TargetPolicy {
    /// Lowercased table names; empty allows any table
    allowed_tables: HashSet<String>,
}

impl TargetPolicy {
    /// Allow external fields to target any existing table.
    pub fn allow_any() -> Self {
        Self::default()
    }

    /// Restrict external fields to `tables`. An empty list allows any table.
    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_tables: tables
                .into_iter()
                .map(|t| t.as_ref().trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn allows_table(&self, table: &str) -> bool {
        self.allowed_tables.is_empty() || self.allowed_tables.contains(&table.to_ascii_lowercase())
    }

    /// Check the target against the allow-list and the live schema.
    pub fn check(&self, conn: &Connection, code: &str, target: &ExternalTarget) -> Result<()> {
        let reject = |column: &str, reason: &str| {
            EntityError::target_rejected(code, target.table.as_str(), column, reason)
        };

        if !self.allows_table(target.table.as_str()) {
            return Err(reject(target.column.as_str(), "table is not allowed"));
        }

        let columns = table_columns(conn, target.table.as_str())?;
        if columns.is_empty() {
            return Err(reject(target.column.as_str(), "table does not exist"));
        }
        if !columns.contains(&target.column.as_str().to_ascii_lowercase()) {
            return Err(reject(target.column.as_str(), "column does not exist"));
        }
        if !columns.contains(&target.key_column.as_str().to_ascii_lowercase()) {
            return Err(reject(target.key_column.as_str(), "key column does not exist"));
        }
        Ok(())
    }
}

/// Lowercased column names of `table`, empty when the table does not exist.
fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare_cached("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .map(|name| name.map(|n| n.to_ascii_lowercase()))
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(names)
}

/// What an external write did to the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
}

/// Reads and writes external field values.
#[derive(Debug, Clone, Copy)]
pub struct ExternalResolver<'a> {
    policy: &'a TargetPolicy,
}

impl<'a> ExternalResolver<'a> {
    pub fn new(policy: &'a TargetPolicy) -> Self {
        Self { policy }
    }

    /// The field's value for `key`, or null when no row matches.
    ///
    /// An entity without the join value cannot own a row and reads null.
    pub fn read(&self, conn: &Connection, key: &EntityKey, def: &FieldDef) -> Result<TypedValue> {
        let target = target_of(def)?;
        self.policy.check(conn, &def.code, target)?;
        let Some(join_value) = key.join_value(target.join_key) else {
            return Ok(TypedValue::Null);
        };

        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 LIMIT 1",
            target.column.quoted(),
            target.table.quoted(),
            target.key_column.quoted()
        );
        let stored: Option<SqlValue> = conn
            .prepare_cached(&sql)?
            .query_row([&join_value], |row| row.get(0))
            .optional()?;

        Ok(stored
            .map(|v| TypedValue::from_stored(def.data_type, v))
            .unwrap_or(TypedValue::Null))
    }

    /// Update the row matching `key`, or insert one when none exists.
    ///
    /// The existence check and the branch are only race-free inside a write
    /// transaction that already holds the database lock.
    pub fn write(
        &self,
        conn: &Connection,
        key: &EntityKey,
        def: &FieldDef,
        value: &TypedValue,
    ) -> Result<WriteOutcome> {
        let target = target_of(def)?;
        self.policy.check(conn, &def.code, target)?;
        let join_value =
            key.join_value(target.join_key)
                .ok_or_else(|| EntityError::MissingStamp {
                    code: def.code.clone(),
                    table: target.table.to_string(),
                    key_column: target.key_column.to_string(),
                })?;

        let exists = conn
            .prepare_cached(&format!(
                "SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1",
                target.table.quoted(),
                target.key_column.quoted()
            ))?
            .exists([&join_value])?;

        let outcome = if exists {
            conn.prepare_cached(&format!(
                "UPDATE {} SET {} = ?1 WHERE {} = ?2",
                target.table.quoted(),
                target.column.quoted(),
                target.key_column.quoted()
            ))?
            .execute(rusqlite::params![value, join_value])?;
            WriteOutcome::Updated
        } else {
            conn.prepare_cached(&format!(
                "INSERT INTO {} ({}, {}) VALUES (?1, ?2)",
                target.table.quoted(),
                target.key_column.quoted(),
                target.column.quoted()
            ))?
            .execute(rusqlite::params![join_value, value])?;
            WriteOutcome::Inserted
        };

        debug!(
            code = %def.code,
            table = %target.table,
            column = %target.column,
            ?outcome,
            "external custom field written"
        );
        Ok(outcome)
    }
}

fn target_of(def: &FieldDef) -> Result<&ExternalTarget> {
    def.external_target().ok_or_else(|| {
        FieldsError::invalid_definition(def.code.as_str(), "field has no target table").into()
    })
}
