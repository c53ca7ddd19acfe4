//! Backend-agnostic cell decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Backend-specific decoders handle the actual value extraction
//!
//! Statements run without bind arguments, so MySQL and PostgreSQL answer in their text
//! protocol. Any column whose type has no dedicated decoder is read as raw text.

use crate::models::RowSet;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Date,
    Time,
    DateTime,
    DateTimeTz,
    Text,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") || lower == "money" {
        return TypeCategory::Decimal;
    }

    // "interval" and "point" contain "int"; keep them textual
    if (lower.contains("int") && !lower.contains("interval") && !lower.contains("point"))
        || lower.contains("serial")
        || lower.contains("tiny")
    {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" || lower == "bit" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    match lower.as_str() {
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        "datetime" | "timestamp" => TypeCategory::DateTime,
        "timestamptz" => TypeCategory::DateTimeTz,
        _ => TypeCategory::Text,
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal") || name == "money"
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Scalar helpers
// =============================================================================

/// Binary cells become UTF-8 text when valid, base64 otherwise.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

pub fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Conversion of a backend row into ordered JSON cells.
pub trait RowToJson {
    fn column_names(&self) -> Vec<String>;
    fn to_json_cells(&self) -> Vec<JsonValue>;
}

macro_rules! impl_row_to_json {
    ($row:ty, $module:ident) => {
        impl RowToJson for $row {
            fn column_names(&self) -> Vec<String> {
                self.columns().iter().map(|c| c.name().to_string()).collect()
            }

            fn to_json_cells(&self) -> Vec<JsonValue> {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let type_name = col.type_info().name();
                        $module::decode_column(self, idx, type_name, categorize_type(type_name))
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, mysql);
impl_row_to_json!(PgRow, postgres);

/// Collect decoded rows; column names come from the first row.
pub fn rows_to_set<R: RowToJson>(rows: &[R]) -> RowSet {
    match rows.first() {
        None => RowSet::default(),
        Some(first) => RowSet::new(
            first.column_names(),
            rows.iter().map(RowToJson::to_json_cells).collect(),
        ),
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

/// Decoders shared by both sqlx backends; `$row` selects the row type.
macro_rules! common_decoders {
    ($row:ty) => {
        fn decode_decimal(row: &$row, idx: usize) -> JsonValue {
            match row.try_get::<Option<RawDecimal>, _>(idx) {
                Ok(Some(v)) => JsonValue::String(v.0),
                Ok(None) => JsonValue::Null,
                Err(e) => {
                    tracing::debug!(error = ?e, "DECIMAL decode failed, reading as text");
                    decode_text(row, idx)
                }
            }
        }

        fn decode_boolean(row: &$row, idx: usize) -> JsonValue {
            match row.try_get::<Option<bool>, _>(idx) {
                Ok(v) => v.map(JsonValue::Bool).unwrap_or(JsonValue::Null),
                Err(_) => decode_text(row, idx),
            }
        }

        fn decode_float(row: &$row, idx: usize) -> JsonValue {
            if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
                return v.map(float_value).unwrap_or(JsonValue::Null);
            }
            if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
                return v.map(|f| float_value(f as f64)).unwrap_or(JsonValue::Null);
            }
            decode_text(row, idx)
        }

        fn decode_binary_col(row: &$row, idx: usize) -> JsonValue {
            match row.try_get::<Option<Vec<u8>>, _>(idx) {
                Ok(v) => v
                    .map(|b| decode_binary_value(&b))
                    .unwrap_or(JsonValue::Null),
                Err(_) => decode_text(row, idx),
            }
        }

        fn decode_json(row: &$row, idx: usize) -> JsonValue {
            match row.try_get::<Option<serde_json::Value>, _>(idx) {
                Ok(v) => v.unwrap_or(JsonValue::Null),
                Err(_) => decode_text(row, idx),
            }
        }

        fn decode_temporal(row: &$row, idx: usize, category: TypeCategory) -> JsonValue {
            use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

            let decoded = match category {
                TypeCategory::Date => row
                    .try_get::<Option<NaiveDate>, _>(idx)
                    .map(|v| v.map(|d| d.to_string())),
                TypeCategory::Time => row
                    .try_get::<Option<NaiveTime>, _>(idx)
                    .map(|v| v.map(|t| t.to_string())),
                TypeCategory::DateTime => row
                    .try_get::<Option<NaiveDateTime>, _>(idx)
                    .map(|v| v.map(|t| t.to_string())),
                _ => row
                    .try_get::<Option<DateTime<Utc>>, _>(idx)
                    .map(|v| v.map(|t| t.to_rfc3339())),
            };
            match decoded {
                Ok(v) => v.map(JsonValue::String).unwrap_or(JsonValue::Null),
                // Zero dates and out-of-range TIME values
                Err(_) => decode_text(row, idx),
            }
        }

        /// Read the cell as text, bypassing type checks.
        fn decode_text(row: &$row, idx: usize) -> JsonValue {
            if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
                return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
            }
            match row.try_get_unchecked::<Option<String>, _>(idx) {
                Ok(v) => v.map(JsonValue::String).unwrap_or(JsonValue::Null),
                Err(e) => {
                    tracing::error!(column = idx, error = ?e, "Failed to decode column");
                    JsonValue::Null
                }
            }
        }
    };
}

mod mysql {
    use super::*;

    common_decoders!(MySqlRow);

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx, type_name),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Date
            | TypeCategory::Time
            | TypeCategory::DateTime
            | TypeCategory::DateTimeTz => decode_temporal(row, idx, category),
            TypeCategory::Text => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize, type_name: &str) -> JsonValue {
        if type_name.to_uppercase().contains("UNSIGNED") {
            if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
                return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
            }
        }
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
        }
        decode_text(row, idx)
    }
}

mod postgres {
    use super::*;

    common_decoders!(PgRow);

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        _type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Date
            | TypeCategory::Time
            | TypeCategory::DateTime
            | TypeCategory::DateTimeTz => decode_temporal(row, idx, category),
            TypeCategory::Text => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null);
        }
        decode_text(row, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT UNSIGNED"), TypeCategory::Integer);
        assert_eq!(categorize_type("TINYINT"), TypeCategory::Integer);
        assert_eq!(categorize_type("INT8"), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_type_not_integer() {
        assert_eq!(categorize_type("INTERVAL"), TypeCategory::Text);
        assert_eq!(categorize_type("POINT"), TypeCategory::Text);
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Text);
    }

    #[test]
    fn test_categorize_type_decimal_and_temporal() {
        assert_eq!(categorize_type("DECIMAL"), TypeCategory::Decimal);
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize_type("DATETIME"), TypeCategory::DateTime);
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::DateTimeTz);
        assert_eq!(categorize_type("DATE"), TypeCategory::Date);
        assert_eq!(categorize_type("jsonb"), TypeCategory::Json);
        assert_eq!(categorize_type("BOOLEAN"), TypeCategory::Boolean);
    }

    #[test]
    fn test_decode_binary_value() {
        assert_eq!(
            decode_binary_value(b"hello world"),
            JsonValue::String("hello world".to_string())
        );
        assert_eq!(
            decode_binary_value(&[0xFF, 0xFE, 0x00, 0x01]),
            JsonValue::String("//4AAQ==".to_string())
        );
    }

    #[test]
    fn test_float_value_non_finite() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
    }
}
