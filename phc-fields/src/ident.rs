//! SQL identifiers read from metadata rows.
//!
//! Table and column names of external fields are interpolated into SQL text,
//! so they are only ever represented as [`Identifier`]s: plain ASCII names
//! checked at load time and double-quoted when rendered.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Longest identifier accepted from a metadata row
pub const MAX_IDENTIFIER_LEN: usize = 128;

fn name_pattern() -> Option<&'static Regex> {
    static NAME: OnceLock<Option<Regex>> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// A validated SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Parse an identifier, rejecting anything that is not a plain name.
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        let name = raw.trim();
        let valid = name.len() <= MAX_IDENTIFIER_LEN
            && name_pattern().is_some_and(|re| re.is_match(name));
        if !valid {
            return Err(InvalidIdentifier(raw.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// Wrap a compile-time name such as a built-in table or column.
    ///
    /// Only for literals known to be plain names; nothing is checked in
    /// release builds.
    pub fn from_static(name: &'static str) -> Self {
        debug_assert!(Self::parse(name).is_ok(), "invalid static identifier {name:?}");
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render as a quoted SQL identifier.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Case-insensitive comparison, matching how SQL resolves names.
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = InvalidIdentifier;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

/// The string is not a usable SQL identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid SQL identifier")]
pub struct InvalidIdentifier(pub String);
