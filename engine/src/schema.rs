//! Table schema definition.
//!
//! A schema names the table and declares where its primary key lives. The
//! engine only works with single-field keys; compound key paths can be
//! declared (a backend may support them) but are rejected when an engine is
//! configured for the table.

use crate::{error::Result, Error, FieldName, TableName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Location of the primary key inside a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    /// A single scalar field.
    Single(FieldName),
    /// Several fields forming one key.
    Compound(Vec<FieldName>),
}

impl KeyPath {
    /// Single-field key path.
    pub fn single(field: impl Into<FieldName>) -> Self {
        KeyPath::Single(field.into())
    }

    /// Compound key path.
    pub fn compound<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FieldName>,
    {
        KeyPath::Compound(fields.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(field) => write!(f, "{}", field),
            KeyPath::Compound(fields) => write!(f, "[{}]", fields.join("+")),
        }
    }
}

impl FromStr for KeyPath {
    type Err = Error;

    /// Parse `field` or `[a+b]`, the forms produced by `Display`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidArgument(format!("invalid key path '{}'", s));
        let s = s.trim();

        if let Some(inner) = s.strip_prefix('[') {
            let inner = inner.strip_suffix(']').ok_or_else(invalid)?;
            let fields: Vec<&str> = inner.split('+').map(str::trim).collect();
            if fields.len() < 2 || fields.iter().any(|f| f.is_empty()) {
                return Err(invalid());
            }
            return Ok(KeyPath::compound(fields));
        }

        if s.is_empty() || s.contains(['[', ']', '+']) {
            return Err(invalid());
        }
        Ok(KeyPath::single(s))
    }
}

/// Schema for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Table name
    pub name: TableName,
    /// Primary key location
    pub primary_key: KeyPath,
    /// Whether the table generates integer keys for records without one
    #[serde(default)]
    pub auto_increment: bool,
}

impl TableSchema {
    /// Create a new table schema.
    pub fn new(name: impl Into<TableName>, primary_key: KeyPath) -> Self {
        Self {
            name: name.into(),
            primary_key,
            auto_increment: false,
        }
    }

    /// Builder-style method to enable key generation.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// The primary-key field name.
    ///
    /// Fails for compound key paths.
    pub fn primary_key_field(&self) -> Result<&str> {
        match &self.primary_key {
            KeyPath::Single(field) => Ok(field),
            KeyPath::Compound(_) => Err(Error::CompositePrimaryKey(self.name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_primary_key() {
        let schema = TableSchema::new("books", KeyPath::single("id")).auto_increment();
        assert_eq!(schema.primary_key_field().unwrap(), "id");
        assert!(schema.auto_increment);
    }

    #[test]
    fn compound_primary_key_is_rejected() {
        let schema = TableSchema::new("loans", KeyPath::compound(["book_id", "member_id"]));
        let result = schema.primary_key_field();
        assert!(matches!(result, Err(Error::CompositePrimaryKey(t)) if t == "loans"));
    }

    #[test]
    fn key_path_display() {
        assert_eq!(KeyPath::single("id").to_string(), "id");
        assert_eq!(KeyPath::compound(["a", "b"]).to_string(), "[a+b]");
    }

    #[test]
    fn key_path_parse() {
        assert_eq!("id".parse::<KeyPath>().unwrap(), KeyPath::single("id"));
        assert_eq!(
            " [book_id + member_id] ".parse::<KeyPath>().unwrap(),
            KeyPath::compound(["book_id", "member_id"])
        );

        for bad in ["", "[a]", "[a+]", "[a+b", "a+b", "a]"] {
            assert!(
                matches!(bad.parse::<KeyPath>(), Err(Error::InvalidArgument(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn schema_serialization() {
        let schema: TableSchema =
            serde_json::from_str(r#"{"name":"books","primaryKey":"id","autoIncrement":true}"#)
                .unwrap();
        assert_eq!(
            schema,
            TableSchema::new("books", KeyPath::single("id")).auto_increment()
        );

        let schema: TableSchema =
            serde_json::from_str(r#"{"name":"loans","primaryKey":["book_id","member_id"]}"#)
                .unwrap();
        assert_eq!(schema.primary_key, KeyPath::compound(["book_id", "member_id"]));
        assert!(!schema.auto_increment);
    }
}
