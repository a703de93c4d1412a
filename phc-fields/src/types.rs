//! Core field types for the registry.
//!
//! A [`FieldDef`] describes one administrator-defined attribute of an entity
//! kind: how its values are typed and validated, and where they are stored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ident::Identifier;

/// Declared data type of a custom field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Textarea,
    Email,
    Phone,
    Url,
    Number,
    Decimal,
    Date,
    Datetime,
    Boolean,
    Select,
    Json,
}

/// The physical shape a value takes once coerced.
///
/// Several data types share a shape: every text-like type and `select` are
/// stored as text, `number` and `decimal` as numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Text,
    Number,
    Date,
    DateTime,
    Boolean,
    Json,
}

impl DataType {
    pub const ALL: [DataType; 12] = [
        Self::Text,
        Self::Textarea,
        Self::Email,
        Self::Phone,
        Self::Url,
        Self::Number,
        Self::Decimal,
        Self::Date,
        Self::Datetime,
        Self::Boolean,
        Self::Select,
        Self::Json,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Textarea => "textarea",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Url => "url",
            Self::Number => "number",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Boolean => "boolean",
            Self::Select => "select",
            Self::Json => "json",
        }
    }

    /// Infer the value shape from the data type.
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::Text | Self::Textarea | Self::Email | Self::Phone | Self::Url | Self::Select => {
                ValueKind::Text
            }
            Self::Number | Self::Decimal => ValueKind::Number,
            Self::Date => ValueKind::Date,
            Self::Datetime => ValueKind::DateTime,
            Self::Boolean => ValueKind::Boolean,
            Self::Json => ValueKind::Json,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = UnknownDataType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownDataType(s.to_string()))
    }
}

/// A data type name that is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown data type '{0}'")]
pub struct UnknownDataType(pub String);

/// Which of the entity's identifiers locates an external row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKey {
    /// The entity's primary id (numeric for customers and orders, the
    /// reference for articles)
    Id,
    /// The entity's 25-character stamp
    Stamp,
}

/// Location of an external field's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTarget {
    pub table: Identifier,
    pub column: Identifier,
    /// Column of `table` holding the join key
    pub key_column: Identifier,
    pub join_key: JoinKey,
}

/// Where a field's values live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FieldStorage {
    /// Shared key/value table of the entity kind
    Generic,
    /// A named column of a named host table
    External(ExternalTarget),
}

/// A field definition, the complete schema for a single custom field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub code: String,
    pub display_name: String,
    pub data_type: DataType,
    pub storage: FieldStorage,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub order: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub visible: bool,
    pub editable: bool,
}

impl FieldDef {
    /// A visible, editable, optional generic text field.
    pub fn new(code: impl Into<String>, display_name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
            data_type,
            storage: FieldStorage::Generic,
            required: false,
            validation: None,
            options: None,
            max_length: None,
            default_value: None,
            order: 0,
            group: None,
            visible: true,
            editable: true,
        }
    }

    pub fn external_target(&self) -> Option<&ExternalTarget> {
        match &self.storage {
            FieldStorage::External(target) => Some(target),
            FieldStorage::Generic => None,
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self.storage, FieldStorage::Generic)
    }

    /// Options that constrain the value, if any apply.
    ///
    /// Only `select` fields with a non-empty option list are constrained.
    pub fn effective_options(&self) -> Option<&[String]> {
        if self.data_type != DataType::Select {
            return None;
        }
        self.options
            .as_deref()
            .filter(|options| !options.is_empty())
    }
}
