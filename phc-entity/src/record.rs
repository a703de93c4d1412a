//! Shapes returned by entity reads and writes.

use indexmap::IndexMap;
use phc_fields::{DataType, FieldDef, TypedValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::key::KeyValue;

/// Base column values keyed by column name, in submission or schema order.
pub type BaseValues = IndexMap<String, Value>;

/// Identifiers assigned to a newly created entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created {
    pub id: KeyValue,
    pub stamp: String,
}

/// Where a resolved value was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Generic,
    External,
}

/// A custom field merged with its value for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    pub code: String,
    pub name: String,
    pub data_type: DataType,
    pub value: Value,
    pub source: FieldSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub order: i32,
    pub visible: bool,
    pub editable: bool,
}

impl ResolvedField {
    pub fn new(def: &FieldDef, value: TypedValue) -> Self {
        Self {
            code: def.code.clone(),
            name: def.display_name.clone(),
            data_type: def.data_type,
            value: value.to_json(),
            source: if def.is_generic() {
                FieldSource::Generic
            } else {
                FieldSource::External
            },
            group: def.group.clone(),
            order: def.order,
            visible: def.visible,
            editable: def.editable,
        }
    }
}

/// An entity with its base columns and every active custom field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: KeyValue,
    pub stamp: String,
    pub base: BaseValues,
    /// Generic fields first, then external ones, each in registry order
    pub fields: Vec<ResolvedField>,
}

impl EntityRecord {
    pub fn field(&self, code: &str) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| f.code == code)
    }
}

/// Paging and search for entity listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    /// One-based page number
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
}

impl ListQuery {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            search: None,
        }
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Page and limit clamped to usable values.
    pub fn normalized(&self) -> (u32, u32) {
        (self.page.max(1), self.limit.clamp(1, Self::MAX_LIMIT))
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

/// A listed entity: identifiers and base columns, no custom fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: KeyValue,
    pub stamp: String,
    pub base: BaseValues,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        Self {
            total,
            page,
            limit,
            total_pages: total.div_ceil(u64::from(limit.max(1))),
            items,
        }
    }
}
