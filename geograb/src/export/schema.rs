//! Attribute schema of an exported layer.

use std::collections::HashSet;

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::geometry::Feature;
use crate::rest::Field;

/// Primary key column of every feature table.
pub const FID_COLUMN: &str = "fid";
/// Geometry column of every feature table.
pub const GEOMETRY_COLUMN: &str = "geom";

/// SQLite storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    /// Maps an ArcGIS field type (`esriFieldTypeDouble`, ...).
    pub fn from_esri(field_type: &str) -> Self {
        let name = field_type.strip_prefix("esriFieldType").unwrap_or(field_type);
        match name {
            "OID" | "Integer" | "SmallInteger" | "BigInteger" => ColumnType::Integer,
            "Double" | "Single" => ColumnType::Real,
            _ => ColumnType::Text,
        }
    }

    /// Type of an undeclared attribute, from its first non-null value.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => ColumnType::Integer,
            Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
            Value::Number(_) => ColumnType::Real,
            _ => ColumnType::Text,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// One attribute column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Attribute key in the feature map
    pub source: String,
    /// Column name in the table
    pub name: String,
    pub column_type: ColumnType,
}

/// Union of declared fields and attributes present on features.
///
/// Declared fields keep their server order; undeclared attributes follow in
/// order of first appearance. Features lacking a column write NULL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn build(declared: &[Field], features: &[Feature]) -> Self {
        let mut schema = Schema::default();
        let mut seen = HashSet::new();
        for field in declared {
            if seen.insert(field.name.to_lowercase()) {
                schema.push(&field.name, ColumnType::from_esri(&field.field_type));
            }
        }
        for feature in features {
            for (key, value) in &feature.attributes {
                if value.is_null() {
                    continue;
                }
                if seen.insert(key.to_lowercase()) {
                    schema.push(key, ColumnType::infer(value));
                }
            }
        }
        // Attributes that only ever carry null
        for feature in features {
            for key in feature.attributes.keys() {
                if seen.insert(key.to_lowercase()) {
                    schema.push(key, ColumnType::Text);
                }
            }
        }
        schema
    }

    fn push(&mut self, source: &str, column_type: ColumnType) {
        let name = self.unique_name(source);
        self.columns.push(Column {
            source: source.to_string(),
            name,
            column_type,
        });
    }

    /// Avoids clashes with the reserved columns and between columns.
    fn unique_name(&self, source: &str) -> String {
        let taken = |candidate: &str| {
            candidate.eq_ignore_ascii_case(FID_COLUMN)
                || candidate.eq_ignore_ascii_case(GEOMETRY_COLUMN)
                || self
                    .columns
                    .iter()
                    .any(|c| c.name.eq_ignore_ascii_case(candidate))
        };
        if !taken(source) {
            return source.to_string();
        }
        (1..)
            .map(|i| format!("{}_{}", source, i))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| source.to_string())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Row values in column order.
    ///
    /// Attributes match their column by exact name first, then ignoring ASCII
    /// case, as columns are de-duplicated.
    pub fn values(&self, feature: &Feature) -> Vec<SqlValue> {
        self.columns
            .iter()
            .map(|c| to_sql(attribute(feature, &c.source), c.column_type))
            .collect()
    }
}

fn attribute<'a>(feature: &'a Feature, source: &str) -> Option<&'a Value> {
    feature.attributes.get(source).or_else(|| {
        feature
            .attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(source))
            .map(|(_, value)| value)
    })
}

/// Converts an attribute to the column's storage class where possible.
fn to_sql(value: Option<&Value>, column_type: ColumnType) -> SqlValue {
    let Some(value) = value else {
        return SqlValue::Null;
    };
    match (value, column_type) {
        (Value::Null, _) => SqlValue::Null,
        (Value::Bool(b), ColumnType::Text) => SqlValue::Text(b.to_string()),
        (Value::Bool(b), _) => SqlValue::Integer(i64::from(*b)),
        (Value::Number(n), ColumnType::Integer) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        (Value::Number(n), ColumnType::Real) => {
            n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null)
        }
        (Value::Number(n), ColumnType::Text) => SqlValue::Text(n.to_string()),
        (Value::String(s), _) => SqlValue::Text(s.clone()),
        (other, _) => SqlValue::Text(other.to_string()),
    }
}

/// Double-quoted SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
