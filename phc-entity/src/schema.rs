//! Entity kinds and the tables that back them.
//!
//! Customers, orders and articles share one engine. What differs between
//! them is captured here: host table, identifier columns, the base column
//! allow-list and the custom field metadata tables.

use std::fmt;
use std::str::FromStr;

use phc_fields::{FieldRegistry, Identifier};
use serde::{Deserialize, Serialize};

use crate::key::KeyValue;

/// The business entities that carry custom fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Customer,
    Order,
    Article,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Customer, Self::Order, Self::Article];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Order => "order",
            Self::Article => "article",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" | "cliente" | "cl" => Ok(Self::Customer),
            "order" | "encomenda" | "bo" => Ok(Self::Order),
            "article" | "artigo" | "st" => Ok(Self::Article),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

/// How a new entity gets its primary id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    /// Next integer of the table's sequence
    Sequence,
    /// Text reference supplied by the caller in the base columns
    Supplied,
}

/// A column callers may write on the entity's own row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseColumn {
    pub name: Identifier,
    /// No two entities may share a non-empty value
    pub unique: bool,
    /// Matched by list searches
    pub searchable: bool,
    /// Holds the id of an entity of this kind, which must exist
    pub references: Option<EntityKind>,
}

impl BaseColumn {
    fn plain(name: &'static str) -> Self {
        Self {
            name: Identifier::from_static(name),
            unique: false,
            searchable: false,
            references: None,
        }
    }

    fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    fn references(mut self, kind: EntityKind) -> Self {
        self.references = Some(kind);
        self
    }
}

/// Audit columns stamped on every write.
pub const CREATED_DATE: &str = "ousrdata";
pub const CREATED_TIME: &str = "ousrhora";
pub const CREATED_BY: &str = "ousrinis";
pub const UPDATED_DATE: &str = "usrdata";
pub const UPDATED_TIME: &str = "usrhora";
pub const UPDATED_BY: &str = "usrinis";

pub const AUDIT_COLUMNS: [&str; 6] = [
    CREATED_DATE,
    CREATED_TIME,
    CREATED_BY,
    UPDATED_DATE,
    UPDATED_TIME,
    UPDATED_BY,
];

/// Tables and columns of one entity kind.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: Identifier,
    pub id_column: Identifier,
    pub id_source: IdSource,
    pub stamp_column: Identifier,
    pub columns: Vec<BaseColumn>,
    pub definitions_table: Identifier,
    pub values_table: Identifier,
    /// Column of the values table holding the entity id
    pub values_key_column: Identifier,
    /// External key columns that carry the stamp instead of the id
    pub stamp_key_columns: Vec<&'static str>,
}

impl EntitySchema {
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Customer => Self::customer(),
            EntityKind::Order => Self::order(),
            EntityKind::Article => Self::article(),
        }
    }

    /// Customers (`cl`), numbered by `no`.
    pub fn customer() -> Self {
        Self {
            kind: EntityKind::Customer,
            table: Identifier::from_static("cl"),
            id_column: Identifier::from_static("no"),
            id_source: IdSource::Sequence,
            stamp_column: Identifier::from_static("clstamp"),
            columns: vec![
                BaseColumn::plain("nome").searchable(),
                BaseColumn::plain("ncont").searchable().unique(),
                BaseColumn::plain("email").searchable(),
                BaseColumn::plain("telefone"),
                BaseColumn::plain("tlmvl"),
                BaseColumn::plain("morada"),
                BaseColumn::plain("local"),
                BaseColumn::plain("codpost"),
                BaseColumn::plain("pais"),
                BaseColumn::plain("moeda"),
                BaseColumn::plain("obs"),
            ],
            definitions_table: Identifier::from_static("cl_campos_personalizados"),
            values_table: Identifier::from_static("cl_valores_personalizados"),
            values_key_column: Identifier::from_static("cliente_no"),
            stamp_key_columns: vec!["clstamp", "cl2stamp"],
        }
    }

    /// Orders (`bo`), numbered by `ndos`.
    pub fn order() -> Self {
        Self {
            kind: EntityKind::Order,
            table: Identifier::from_static("bo"),
            id_column: Identifier::from_static("ndos"),
            id_source: IdSource::Sequence,
            stamp_column: Identifier::from_static("bostamp"),
            columns: vec![
                BaseColumn::plain("obrano").searchable(),
                BaseColumn::plain("nmdos").searchable(),
                BaseColumn::plain("dataobra"),
                BaseColumn::plain("no").references(EntityKind::Customer),
                BaseColumn::plain("nome").searchable(),
                BaseColumn::plain("obs"),
            ],
            definitions_table: Identifier::from_static("encomendas_campos_personalizados"),
            values_table: Identifier::from_static("encomendas_valores_personalizados"),
            values_key_column: Identifier::from_static("encomenda_ndos"),
            stamp_key_columns: vec!["bostamp", "bo2stamp", "bo3stamp"],
        }
    }

    /// Stock articles (`st`), identified by their caller-supplied `ref`.
    pub fn article() -> Self {
        Self {
            kind: EntityKind::Article,
            table: Identifier::from_static("st"),
            id_column: Identifier::from_static("ref"),
            id_source: IdSource::Supplied,
            stamp_column: Identifier::from_static("ststamp"),
            columns: vec![
                BaseColumn::plain("design").searchable(),
                BaseColumn::plain("familia").searchable(),
                BaseColumn::plain("unidade"),
                BaseColumn::plain("epv1"),
                BaseColumn::plain("codigo").searchable().unique(),
                BaseColumn::plain("obs"),
            ],
            definitions_table: Identifier::from_static("artigos_campos_personalizados"),
            values_table: Identifier::from_static("artigos_valores_personalizados"),
            values_key_column: Identifier::from_static("artigo_ref"),
            stamp_key_columns: vec!["ststamp"],
        }
    }

    /// The base column named `name`, compared case-insensitively.
    pub fn column(&self, name: &str) -> Option<&BaseColumn> {
        self.columns.iter().find(|c| c.name.eq_ignore_case(name))
    }

    /// Interpret a textual id the way this kind stores it.
    pub fn parse_id(&self, raw: &str) -> KeyValue {
        let raw = raw.trim();
        match self.id_source {
            IdSource::Sequence => raw
                .parse::<i64>()
                .map(KeyValue::Int)
                .unwrap_or_else(|_| KeyValue::Text(raw.to_string())),
            IdSource::Supplied => KeyValue::Text(raw.to_string()),
        }
    }

    pub fn searchable_columns(&self) -> impl Iterator<Item = &BaseColumn> {
        self.columns.iter().filter(|c| c.searchable)
    }

    /// Registry over this kind's definitions table.
    pub fn registry(&self) -> FieldRegistry {
        FieldRegistry::new(self.definitions_table.clone())
            .with_stamp_keys(self.stamp_key_columns.iter().copied())
            .with_default_key_column(self.id_column.clone())
    }

    /// Entity table DDL for development databases.
    pub(crate) fn create_table_sql(&self) -> String {
        let id = match self.id_source {
            IdSource::Sequence => format!("{} INTEGER PRIMARY KEY", self.id_column.quoted()),
            IdSource::Supplied => format!("{} TEXT PRIMARY KEY", self.id_column.quoted()),
        };
        let mut columns = vec![id, format!("{} TEXT NOT NULL UNIQUE", self.stamp_column.quoted())];
        columns.extend(self.columns.iter().map(|c| c.name.quoted()));
        columns.extend(AUDIT_COLUMNS.iter().map(|c| format!("\"{c}\" TEXT")));
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.table.quoted(),
            columns.join(",\n    ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cliente", EntityKind::Customer)]
    #[case(" CL ", EntityKind::Customer)]
    #[case("Order", EntityKind::Order)]
    #[case("encomenda", EntityKind::Order)]
    #[case("st", EntityKind::Article)]
    #[case("artigo", EntityKind::Article)]
    fn kind_parses_local_names(#[case] raw: &str, #[case] expected: EntityKind) {
        assert_eq!(raw.parse::<EntityKind>().unwrap(), expected);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!("fornecedor".parse::<EntityKind>().is_err());
    }

    #[test]
    fn presets_are_consistent() {
        for kind in EntityKind::ALL {
            let schema = EntitySchema::for_kind(kind);
            assert_eq!(schema.kind, kind);
            assert!(schema.column(schema.id_column.as_str()).is_none());
            assert!(schema.searchable_columns().count() > 0);
        }
    }

    #[test]
    fn column_lookup_ignores_case() {
        let schema = EntitySchema::customer();
        assert!(schema.column("NCONT").unwrap().unique);
        assert!(schema.column("inexistente").is_none());
    }

    #[test]
    fn orders_reference_customers() {
        let schema = EntitySchema::order();
        assert_eq!(schema.column("no").unwrap().references, Some(EntityKind::Customer));
        assert!(EntitySchema::customer()
            .columns
            .iter()
            .all(|c| c.references.is_none()));
    }

    #[test]
    fn ids_parse_by_source() {
        assert_eq!(EntitySchema::customer().parse_id(" 12 "), KeyValue::Int(12));
        assert_eq!(
            EntitySchema::article().parse_id("12"),
            KeyValue::Text("12".into())
        );
    }

    #[test]
    fn article_ids_are_supplied_text() {
        let schema = EntitySchema::article();
        assert_eq!(schema.id_source, IdSource::Supplied);
        assert!(schema.create_table_sql().contains("\"ref\" TEXT PRIMARY KEY"));
    }
}
