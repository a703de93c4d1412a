//! Generic-Store Resolver: the shared key/value table of an entity kind.
//!
//! One row per `(entity, code)` with a typed column per value kind. Only the
//! column matching the field's data type is populated. Writes replace the
//! row outright: delete, then insert.

use std::collections::HashMap;

use chrono::Local;
use phc_fields::{FieldCatalog, FieldDef, TypedValue, ValueKind};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::Result;
use crate::key::KeyValue;
use crate::record::ResolvedField;
use crate::schema::{EntitySchema, IdSource};

/// Typed value columns in coalescing order
const VALUE_COLUMNS: [&str; 6] = [
    "valor_texto",
    "valor_numero",
    "valor_data",
    "valor_datetime",
    "valor_boolean",
    "valor_json",
];

fn value_column(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Text => "valor_texto",
        ValueKind::Number => "valor_numero",
        ValueKind::Date => "valor_data",
        ValueKind::DateTime => "valor_datetime",
        ValueKind::Boolean => "valor_boolean",
        ValueKind::Json => "valor_json",
    }
}

/// Reads and writes the values table of one entity kind.
#[derive(Debug, Clone, Copy)]
pub struct GenericStore<'a> {
    schema: &'a EntitySchema,
}

impl<'a> GenericStore<'a> {
    pub fn new(schema: &'a EntitySchema) -> Self {
        Self { schema }
    }

    /// Every generic field of `catalog` with its value for `entity_id`.
    ///
    /// Fields without a stored record resolve to null.
    pub fn read_all(
        &self,
        conn: &Connection,
        entity_id: &KeyValue,
        catalog: &FieldCatalog,
    ) -> Result<Vec<ResolvedField>> {
        let sql = format!(
            "SELECT codigo_campo, {} FROM {} WHERE {} = ?1",
            VALUE_COLUMNS.join(", "),
            self.schema.values_table.quoted(),
            self.schema.values_key_column.quoted()
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([entity_id], |row| {
            let code: String = row.get(0)?;
            let mut values = Vec::with_capacity(VALUE_COLUMNS.len());
            for i in 0..VALUE_COLUMNS.len() {
                values.push(row.get::<_, SqlValue>(i + 1)?);
            }
            Ok((code, values))
        })?;

        let mut stored: HashMap<String, Vec<SqlValue>> = HashMap::new();
        for row in rows {
            let (code, values) = row?;
            stored.entry(code).or_insert(values);
        }

        Ok(catalog
            .generic()
            .map(|def| {
                let value = stored
                    .remove(&def.code)
                    .map(|values| pick_value(def, values))
                    .unwrap_or(TypedValue::Null);
                ResolvedField::new(def, value)
            })
            .collect())
    }

    /// Replace the record of `def` for `entity_id` with `value`.
    pub fn write(
        &self,
        conn: &Connection,
        entity_id: &KeyValue,
        def: &FieldDef,
        value: &TypedValue,
    ) -> Result<()> {
        let table = self.schema.values_table.quoted();
        let key_column = self.schema.values_key_column.quoted();
        let now = Local::now().naive_local().format("%Y-%m-%d %H:%M:%S").to_string();

        let created: Option<String> = conn
            .prepare_cached(&format!(
                "SELECT criado_em FROM {table} WHERE {key_column} = ?1 AND codigo_campo = ?2"
            ))?
            .query_row(params![entity_id, def.code], |row| row.get(0))
            .optional()?;

        conn.prepare_cached(&format!(
            "DELETE FROM {table} WHERE {key_column} = ?1 AND codigo_campo = ?2"
        ))?
        .execute(params![entity_id, def.code])?;

        let column = value_column(def.data_type.value_kind());
        conn.prepare_cached(&format!(
            "INSERT INTO {table} ({key_column}, codigo_campo, {column}, criado_em, atualizado_em) \
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ))?
        .execute(params![
            entity_id,
            def.code,
            value,
            created.as_deref().unwrap_or(&now),
            now
        ])?;

        debug!(code = %def.code, %entity_id, column, "generic custom field written");
        Ok(())
    }

    /// Create the values table if it does not exist.
    pub fn install(&self, conn: &Connection) -> Result<()> {
        let key_type = match self.schema.id_source {
            IdSource::Sequence => "INTEGER",
            IdSource::Supplied => "TEXT",
        };
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                {key} {key_type} NOT NULL,
                codigo_campo TEXT NOT NULL,
                valor_texto TEXT,
                valor_numero NUMERIC,
                valor_data TEXT,
                valor_datetime TEXT,
                valor_boolean INTEGER,
                valor_json TEXT,
                criado_em TEXT NOT NULL,
                atualizado_em TEXT NOT NULL,
                UNIQUE ({key}, codigo_campo)
            );",
            table = self.schema.values_table.quoted(),
            key = self.schema.values_key_column.quoted(),
        ))?;
        Ok(())
    }
}

/// The column matching the field's type, else the first populated one.
fn pick_value(def: &FieldDef, values: Vec<SqlValue>) -> TypedValue {
    let preferred = value_column(def.data_type.value_kind());
    let mut fallback = None;
    for (column, value) in VALUE_COLUMNS.iter().zip(values) {
        if value == SqlValue::Null {
            continue;
        }
        if *column == preferred {
            return TypedValue::from_stored(def.data_type, value);
        }
        fallback.get_or_insert(value);
    }
    fallback
        .map(|v| TypedValue::from_stored(def.data_type, v))
        .unwrap_or(TypedValue::Null)
}
