//! In-memory fixtures for tests.
//!
//! Enabled for this crate's own tests and for downstream crates through the
//! `test-support` feature.

use std::sync::Arc;

use rusqlite::params;

use crate::database::Database;
use crate::schema::{EntityKind, EntitySchema};
use crate::service::{EngineSettings, ErpContext};

/// A context over a fresh in-memory database with every table installed.
pub fn memory_context() -> ErpContext {
    memory_context_with(EngineSettings::default())
}

/// Like [`memory_context`] with explicit settings.
pub fn memory_context_with(settings: EngineSettings) -> ErpContext {
    let db = Arc::new(Database::open_in_memory().expect("open in-memory database"));
    let ctx = ErpContext::new(db, settings);
    ctx.install().expect("install entity tables");
    ctx
}

/// A definitions row to insert.
#[derive(Debug, Clone, Default)]
pub struct FieldRow {
    pub name: Option<&'static str>,
    pub table: Option<&'static str>,
    pub column: Option<&'static str>,
    pub key_column: Option<&'static str>,
    pub required: bool,
    pub options: Option<&'static str>,
    pub validation: Option<&'static str>,
    pub order: i64,
    pub group: Option<&'static str>,
    pub active: bool,
}

/// Insert a field definition row for `kind`, adjusted by `configure`.
pub fn define_field(
    ctx: &ErpContext,
    kind: EntityKind,
    code: &str,
    data_type: &str,
    configure: impl FnOnce(&mut FieldRow),
) {
    let mut row = FieldRow {
        active: true,
        ..FieldRow::default()
    };
    configure(&mut row);

    let schema = EntitySchema::for_kind(kind);
    ctx.database()
        .conn()
        .execute(
            &format!(
                "INSERT INTO {} (codigo_campo, nome_campo, tipo_dados, tabela_destino,
                    campo_destino, campo_chave_relacao, obrigatorio, opcoes, validacao,
                    ordem, grupo, ativo)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                schema.definitions_table.quoted()
            ),
            params![
                code,
                row.name.unwrap_or(code),
                data_type,
                row.table,
                row.column,
                row.key_column,
                row.required,
                row.options,
                row.validation,
                row.order,
                row.group,
                row.active,
            ],
        )
        .expect("insert field definition");
}

/// Create a host table for external fields.
pub fn create_table(ctx: &ErpContext, ddl: &str) {
    ctx.database()
        .conn()
        .execute_batch(ddl)
        .expect("create host table");
}

/// Number of rows of `table` matching `where_clause`.
pub fn count_rows(ctx: &ErpContext, table: &str, where_clause: &str) -> i64 {
    ctx.database()
        .conn()
        .query_row(
            &format!("SELECT COUNT(*) FROM \"{table}\" WHERE {where_clause}"),
            [],
            |row| row.get(0),
        )
        .expect("count rows")
}
