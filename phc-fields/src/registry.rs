//! Field Registry: active field definitions read from metadata rows.
//!
//! Each entity kind owns a definitions table (for customers
//! `cl_campos_personalizados`). Rows are administered outside this crate;
//! the registry only reads them, turning each active row into a [`FieldDef`]
//! or rejecting it as an invalid definition.

use std::collections::HashMap;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::{FieldsError, Result};
use crate::ident::Identifier;
use crate::types::{DataType, ExternalTarget, FieldDef, FieldStorage, JoinKey};

const DEFINITION_COLUMNS: &str = "codigo_campo, nome_campo, tipo_dados, tabela_destino, \
     campo_destino, campo_chave_relacao, tamanho_maximo, obrigatorio, valor_padrao, opcoes, \
     validacao, ordem, grupo, visivel, editavel";

/// Reads the definitions table of one entity kind.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    table: Identifier,
    stamp_key_columns: Vec<String>,
    default_key_column: Option<Identifier>,
}

impl FieldRegistry {
    pub fn new(table: Identifier) -> Self {
        Self {
            table,
            stamp_key_columns: Vec::new(),
            default_key_column: None,
        }
    }

    /// Key columns that hold the entity's stamp rather than its id.
    ///
    /// An external definition whose `campo_chave_relacao` names one of these
    /// joins on the stamp.
    pub fn with_stamp_keys<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stamp_key_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Key column assumed when an external definition leaves
    /// `campo_chave_relacao` empty. Without one such rows are invalid.
    pub fn with_default_key_column(mut self, column: Identifier) -> Self {
        self.default_key_column = Some(column);
        self
    }

    pub fn table(&self) -> &Identifier {
        &self.table
    }

    /// All usable active definitions, ordered by `ordem`, `grupo`, `nome_campo`.
    ///
    /// Invalid rows are skipped with a warning.
    pub fn active_definitions(&self, conn: &Connection) -> Result<Vec<FieldDef>> {
        let sql = format!(
            "SELECT {DEFINITION_COLUMNS} FROM {} WHERE ativo = 1 \
             ORDER BY ordem, grupo, nome_campo",
            self.table.quoted()
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([], DefinitionRow::from_row)?;

        let mut defs = Vec::new();
        for row in rows {
            let row = row?;
            match row.into_def(self) {
                Ok(def) => defs.push(def),
                Err(e) => warn!(table = %self.table, error = %e, "skipping custom field definition"),
            }
        }
        debug!(table = %self.table, count = defs.len(), "loaded custom field definitions");
        Ok(defs)
    }

    /// The active definition for `code`.
    pub fn definition(&self, conn: &Connection, code: &str) -> Result<FieldDef> {
        let sql = format!(
            "SELECT {DEFINITION_COLUMNS} FROM {} WHERE ativo = 1 AND codigo_campo = ?1 \
             ORDER BY ordem, grupo, nome_campo LIMIT 1",
            self.table.quoted()
        );
        let row = conn
            .prepare_cached(&sql)?
            .query_row([code], DefinitionRow::from_row)
            .optional()?
            .ok_or_else(|| FieldsError::FieldNotFound {
                code: code.to_string(),
            })?;
        row.into_def(self)
    }

    /// Load the request-scoped catalog of active definitions.
    pub fn load(&self, conn: &Connection) -> Result<FieldCatalog> {
        Ok(FieldCatalog::new(self.active_definitions(conn)?))
    }

    /// Create the definitions table if it does not exist.
    pub fn install(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                codigo_campo TEXT NOT NULL,
                nome_campo TEXT NOT NULL,
                tipo_dados TEXT NOT NULL DEFAULT 'text',
                tabela_destino TEXT,
                campo_destino TEXT,
                campo_chave_relacao TEXT,
                tamanho_maximo INTEGER,
                obrigatorio INTEGER NOT NULL DEFAULT 0,
                valor_padrao TEXT,
                opcoes TEXT,
                validacao TEXT,
                ordem INTEGER NOT NULL DEFAULT 0,
                grupo TEXT,
                visivel INTEGER NOT NULL DEFAULT 1,
                editavel INTEGER NOT NULL DEFAULT 1,
                ativo INTEGER NOT NULL DEFAULT 1
            );
            CREATE INDEX IF NOT EXISTS {index} ON {table} (codigo_campo);",
            table = self.table.quoted(),
            index = format!("\"idx_{}_codigo\"", self.table),
        ))?;
        Ok(())
    }
}

/// A definitions row as stored, before interpretation.
#[derive(Debug)]
struct DefinitionRow {
    code: String,
    name: Option<String>,
    data_type: Option<String>,
    target_table: Option<String>,
    target_column: Option<String>,
    key_column: Option<String>,
    max_length: Option<i64>,
    required: SqlValue,
    default_value: Option<String>,
    options: Option<String>,
    validation: Option<String>,
    order: Option<i64>,
    group: Option<String>,
    visible: SqlValue,
    editable: SqlValue,
}

impl DefinitionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            code: row.get(0)?,
            name: row.get(1)?,
            data_type: row.get(2)?,
            target_table: row.get(3)?,
            target_column: row.get(4)?,
            key_column: row.get(5)?,
            max_length: row.get(6)?,
            required: row.get(7)?,
            default_value: row.get(8)?,
            options: row.get(9)?,
            validation: row.get(10)?,
            order: row.get(11)?,
            group: row.get(12)?,
            visible: row.get(13)?,
            editable: row.get(14)?,
        })
    }

    fn into_def(self, registry: &FieldRegistry) -> Result<FieldDef> {
        let code = self.code;
        let invalid = |reason: String| FieldsError::invalid_definition(code.as_str(), reason);

        let data_type = match non_empty(self.data_type) {
            Some(raw) => raw
                .parse::<DataType>()
                .map_err(|e| invalid(e.to_string()))?,
            None => DataType::Text,
        };

        let storage = match non_empty(self.target_table) {
            None => FieldStorage::Generic,
            Some(table) => {
                let column = non_empty(self.target_column)
                    .ok_or_else(|| invalid("target table set without a target column".into()))?;
                let table = Identifier::parse(&table).map_err(|e| invalid(e.to_string()))?;
                let column = Identifier::parse(&column).map_err(|e| invalid(e.to_string()))?;
                let key_column = match non_empty(self.key_column) {
                    Some(raw) => Identifier::parse(&raw).map_err(|e| invalid(e.to_string()))?,
                    None => registry.default_key_column.clone().ok_or_else(|| {
                        invalid("target table set without a key column".into())
                    })?,
                };

                let join_key = if registry
                    .stamp_key_columns
                    .iter()
                    .any(|c| key_column.eq_ignore_case(c))
                {
                    JoinKey::Stamp
                } else {
                    JoinKey::Id
                };
                FieldStorage::External(ExternalTarget {
                    table,
                    column,
                    key_column,
                    join_key,
                })
            }
        };

        let options = match non_empty(self.options) {
            None => None,
            Some(raw) => Some(parse_options(&raw).map_err(invalid)?),
        };

        let validation = non_empty(self.validation);
        if let Some(pattern) = &validation {
            compile_pattern(pattern).map_err(|e| invalid(e.to_string()))?;
        }

        Ok(FieldDef {
            display_name: non_empty(self.name).unwrap_or_else(|| code.clone()),
            code,
            data_type,
            storage,
            required: flag(&self.required, false),
            validation,
            options,
            max_length: self.max_length.and_then(|n| u32::try_from(n).ok()),
            default_value: self.default_value,
            order: self
                .order
                .and_then(|n| i32::try_from(n).ok())
                .unwrap_or_default(),
            group: non_empty(self.group),
            visible: flag(&self.visible, true),
            editable: flag(&self.editable, true),
        })
    }
}

/// Compile a definition's pattern so that it must match the whole value.
pub fn compile_pattern(pattern: &str) -> std::result::Result<regex::Regex, regex::Error> {
    regex::Regex::new(&format!("^(?:{pattern})$"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn flag(value: &SqlValue, default: bool) -> bool {
    match value {
        SqlValue::Integer(i) => *i != 0,
        SqlValue::Real(f) => *f != 0.0,
        SqlValue::Text(s) => matches!(s.trim(), "1" | "true" | "TRUE" | "True"),
        _ => default,
    }
}

/// `opcoes` holds a JSON array. Scalars are kept in their string form.
fn parse_options(raw: &str) -> std::result::Result<Vec<String>, String> {
    let parsed: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("options are not valid JSON: {e}"))?;
    let items = parsed
        .as_array()
        .ok_or_else(|| "options must be a JSON array".to_string())?;
    Ok(items
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect())
}

/// The closed set of active definitions for one request.
///
/// This is the sole authority for whether a submitted code exists.
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: Vec<FieldDef>,
    code_index: HashMap<String, usize>,
}

impl FieldCatalog {
    /// Build a catalog, keeping the first definition of any duplicated code.
    pub fn new(definitions: Vec<FieldDef>) -> Self {
        let mut fields = Vec::with_capacity(definitions.len());
        let mut code_index = HashMap::with_capacity(definitions.len());
        for def in definitions {
            if code_index.contains_key(&def.code) {
                warn!(code = %def.code, "duplicate active custom field definition ignored");
                continue;
            }
            code_index.insert(def.code.clone(), fields.len());
            fields.push(def);
        }
        Self { fields, code_index }
    }

    pub fn get(&self, code: &str) -> Option<&FieldDef> {
        self.code_index.get(code).map(|&i| &self.fields[i])
    }

    pub fn contains(&self, code: &str) -> bool {
        self.code_index.contains_key(code)
    }

    /// All definitions in registry order.
    pub fn all(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn generic(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_generic())
    }

    pub fn external(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.is_generic())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_definitions(self) -> Vec<FieldDef> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (Connection, FieldRegistry) {
        let conn = Connection::open_in_memory().unwrap();
        let registry = FieldRegistry::new(Identifier::parse("cl_campos_personalizados").unwrap())
            .with_stamp_keys(["clstamp", "cl2stamp"]);
        registry.install(&conn).unwrap();
        (conn, registry)
    }

    fn insert(conn: &Connection, code: &str, sql_tail: &str) {
        conn.execute(
            &format!(
                "INSERT INTO cl_campos_personalizados (codigo_campo, nome_campo, {sql_tail})"
            ),
            [code],
        )
        .unwrap();
    }

    #[test]
    fn test_install_is_idempotent() {
        let (conn, registry) = registry();
        registry.install(&conn).unwrap();
        assert!(registry.active_definitions(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_orders_by_ordem_then_name() {
        let (conn, registry) = registry();
        insert(&conn, "b", "ordem) VALUES (?1, 'Beta', 2");
        insert(&conn, "a", "ordem) VALUES (?1, 'Alpha', 2");
        insert(&conn, "c", "ordem) VALUES (?1, 'Gamma', 1");

        let codes: Vec<_> = registry
            .active_definitions(&conn)
            .unwrap()
            .into_iter()
            .map(|d| d.code)
            .collect();
        assert_eq!(codes, ["c", "a", "b"]);
    }

    #[test]
    fn test_inactive_rows_are_invisible() {
        let (conn, registry) = registry();
        insert(&conn, "old", "ativo) VALUES (?1, 'Old', 0");
        assert!(registry.active_definitions(&conn).unwrap().is_empty());
        assert!(matches!(
            registry.definition(&conn, "old"),
            Err(FieldsError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn test_external_definition_joins_on_stamp() {
        let (conn, registry) = registry();
        insert(
            &conn,
            "zona_comercial",
            "tabela_destino, campo_destino, campo_chave_relacao) \
             VALUES (?1, 'Zona', 'cl2', 'zona', 'cl2stamp'",
        );
        insert(
            &conn,
            "vendedor",
            "tabela_destino, campo_destino, campo_chave_relacao) \
             VALUES (?1, 'Vendedor', 'cl_info', 'vendedor', 'no'",
        );

        let zona = registry.definition(&conn, "zona_comercial").unwrap();
        let target = zona.external_target().unwrap();
        assert_eq!(target.table.as_str(), "cl2");
        assert_eq!(target.join_key, JoinKey::Stamp);

        let vendedor = registry.definition(&conn, "vendedor").unwrap();
        assert_eq!(vendedor.external_target().unwrap().join_key, JoinKey::Id);
    }

    #[test]
    fn test_missing_key_column_is_invalid() {
        let (conn, registry) = registry();
        insert(
            &conn,
            "broken",
            "tabela_destino, campo_destino) VALUES (?1, 'Broken', 'cl2', 'zona'",
        );
        insert(&conn, "ok", "tipo_dados) VALUES (?1, 'Ok', 'number'");

        let defs = registry.active_definitions(&conn).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].code, "ok");
        assert!(matches!(
            registry.definition(&conn, "broken"),
            Err(FieldsError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_default_key_column_joins_on_id() {
        let (conn, registry) = registry();
        let registry = registry.with_default_key_column(Identifier::parse("no").unwrap());
        insert(
            &conn,
            "limite",
            "tabela_destino, campo_destino) VALUES (?1, 'Limite', 'cl_info', 'limite'",
        );
        let def = registry.definition(&conn, "limite").unwrap();
        let target = def.external_target().unwrap();
        assert_eq!(target.key_column.as_str(), "no");
        assert_eq!(target.join_key, JoinKey::Id);
    }

    #[test]
    fn test_unsafe_table_name_is_invalid() {
        let (conn, registry) = registry();
        insert(
            &conn,
            "evil",
            "tabela_destino, campo_destino, campo_chave_relacao) \
             VALUES (?1, 'Evil', 'cl; DROP TABLE cl', 'x', 'no'",
        );
        assert!(matches!(
            registry.definition(&conn, "evil"),
            Err(FieldsError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_options_and_flags() {
        let (conn, registry) = registry();
        insert(
            &conn,
            "metodo_pagamento",
            "tipo_dados, opcoes, obrigatorio, visivel) \
             VALUES (?1, 'Payment', 'select', '[\"Multibanco\",\"MBWay\"]', 1, 0",
        );
        let def = registry.definition(&conn, "metodo_pagamento").unwrap();
        assert_eq!(def.data_type, DataType::Select);
        assert_eq!(
            def.options.as_deref().unwrap(),
            ["Multibanco".to_string(), "MBWay".to_string()]
        );
        assert!(def.required);
        assert!(!def.visible);
        assert!(def.editable);
    }

    #[test]
    fn test_bad_options_or_pattern_are_invalid() {
        let (conn, registry) = registry();
        insert(&conn, "bad_opts", "opcoes) VALUES (?1, 'X', '{not json'");
        insert(&conn, "bad_regex", "validacao) VALUES (?1, 'Y', '([a-z'");
        assert!(registry.definition(&conn, "bad_opts").is_err());
        assert!(registry.definition(&conn, "bad_regex").is_err());
    }

    #[test]
    fn test_unknown_data_type_is_invalid() {
        let (conn, registry) = registry();
        insert(&conn, "money", "tipo_dados) VALUES (?1, 'Money', 'currency'");
        assert!(matches!(
            registry.definition(&conn, "money"),
            Err(FieldsError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_catalog_first_duplicate_wins() {
        let mut first = FieldDef::new("dup", "First", DataType::Text);
        first.order = 1;
        let second = FieldDef::new("dup", "Second", DataType::Number);
        let other = FieldDef::new("other", "Other", DataType::Text);

        let catalog = FieldCatalog::new(vec![first, second, other]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("dup").unwrap().display_name, "First");
        assert!(catalog.contains("other"));
        assert!(!catalog.contains("missing"));
    }

    #[test]
    fn test_catalog_partitions_preserve_order() {
        let mut ext = FieldDef::new("zona", "Zona", DataType::Text);
        ext.storage = FieldStorage::External(ExternalTarget {
            table: Identifier::parse("cl2").unwrap(),
            column: Identifier::parse("zona").unwrap(),
            key_column: Identifier::parse("cl2stamp").unwrap(),
            join_key: JoinKey::Stamp,
        });
        let catalog = FieldCatalog::new(vec![
            FieldDef::new("a", "A", DataType::Text),
            ext,
            FieldDef::new("b", "B", DataType::Text),
        ]);
        let generic: Vec<_> = catalog.generic().map(|d| d.code.as_str()).collect();
        let external: Vec<_> = catalog.external().map(|d| d.code.as_str()).collect();
        assert_eq!(generic, ["a", "b"]);
        assert_eq!(external, ["zona"]);
    }

    #[test]
    fn test_pattern_is_anchored() {
        let re = compile_pattern("[0-9]{4}").unwrap();
        assert!(re.is_match("1234"));
        assert!(!re.is_match("12345"));
        assert!(!re.is_match("a1234"));
    }
}
