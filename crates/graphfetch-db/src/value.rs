//! Parameter and result-cell values exchanged with the database driver.
//!
//! The fetch pipeline moves a narrow set of values: integer ids and function
//! names out to the driver, whole JSON documents (`row_to_json` output) back
//! from it, plus the column scalars the relation mutations touch. [`Value`]
//! is that set as a tagged enum, [`Row`] pairs result columns with values,
//! and [`FromValue`] gives the pipeline typed access to result cells.

use std::fmt;

use graphfetch_core::{FetchError, FetchResult};

/// A single statement parameter or result cell.
///
/// # Examples
///
/// ```
/// use graphfetch_db::value::Value;
///
/// // A probe call carries the function name followed by the batch ids.
/// let params = vec![Value::from("builder_1_item_42_n2"), Value::from(7_i64), Value::from(9_i64)];
/// assert_eq!(params[1], Value::Int(7));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL. Also what the existence probe returns when the stored
    /// function is missing.
    Null,
    /// A boolean column value.
    Bool(bool),
    /// A 64-bit integer: ids, FK values, affected-row counts.
    Int(i64),
    /// A double-precision column value.
    Float(f64),
    /// Text: function names, DDL passed to `safe_create_fn`, text columns.
    String(String),
    /// A bytea column value.
    Bytes(Vec<u8>),
    /// A date column value.
    Date(chrono::NaiveDate),
    /// A timestamp-without-timezone column value.
    DateTime(chrono::NaiveDateTime),
    /// A timestamp-with-timezone column value, normalized to UTC.
    DateTimeTz(chrono::DateTime<chrono::Utc>),
    /// A time column value.
    Time(chrono::NaiveTime),
    /// A uuid column value.
    Uuid(uuid::Uuid),
    /// A JSON document. Every result column of the fetch pipeline is one of
    /// these: the `res` output of `row_to_json`.
    Json(serde_json::Value),
}

/// Renders the value the way it would appear inlined in a statement log:
/// SQL keywords bare, text and temporal values quoted, binary data elided.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "'{s}'"),
            Self::Bytes(b) => write!(f, "<bytea {}B>", b.len()),
            Self::Date(d) => write!(f, "'{d}'"),
            Self::DateTime(dt) => write!(f, "'{dt}'"),
            Self::DateTimeTz(dt) => write!(f, "'{}'", dt.to_rfc3339()),
            Self::Time(t) => write!(f, "'{t}'"),
            Self::Uuid(u) => write!(f, "'{u}'"),
            Self::Json(j) => write!(f, "{j}"),
        }
    }
}

/// Generates `From` conversions into the matching variant. Widening (i32 to
/// Int) and owning (&str to String) conversions go through `Into` on the
/// source value.
macro_rules! value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(impl From<$source> for Value {
            fn from(v: $source) -> Self {
                Self::$variant(v.into())
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Float,
    &str => String,
    String => String,
    Vec<u8> => Bytes,
    chrono::NaiveDate => Date,
    chrono::NaiveDateTime => DateTime,
    chrono::DateTime<chrono::Utc> => DateTimeTz,
    chrono::NaiveTime => Time,
    uuid::Uuid => Uuid,
    serde_json::Value => Json,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl Value {
    /// Returns `true` if this value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to extract an integer value.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to extract a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract a JSON value reference.
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(j) => Some(j),
            _ => None,
        }
    }
}

/// One result row: column names paired with their values.
///
/// On the read path a row is always the single `res` column holding one
/// JSON document; the relation mutations also read back plain key columns.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from column names and values.
    ///
    /// # Panics
    ///
    /// Panics if the number of columns does not match the number of values.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Row column count must match value count"
        );
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Gets a typed value by column name.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the column does not exist or the value is
    /// not convertible to the requested type.
    pub fn get<T: FromValue>(&self, column: &str) -> FetchResult<T> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| {
                FetchError::DatabaseError(format!("Column '{column}' not found in row"))
            })?;
        T::from_value(&self.values[idx])
    }

    /// Returns a reference to the raw value at the given column name.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }
}

/// Typed extraction from a result cell.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> FetchResult<Self>;
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> FetchResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(FetchError::DatabaseError(format!(
                "Expected Int, got {value:?}"
            ))),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> FetchResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            _ => Err(FetchError::DatabaseError(format!(
                "Expected Bool, got {value:?}"
            ))),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> FetchResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(FetchError::DatabaseError(format!(
                "Expected String, got {value:?}"
            ))),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> FetchResult<Self> {
        match value {
            Value::Json(j) => Ok(j.clone()),
            Value::Null => Ok(serde_json::Value::Null),
            _ => Err(FetchError::DatabaseError(format!(
                "Expected Json, got {value:?}"
            ))),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> FetchResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> FetchResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_widens_integers() {
        assert_eq!(Value::from(42_i32), Value::Int(42));
        assert_eq!(Value::from(42_i64), Value::Int(42));
    }

    #[test]
    fn test_from_owns_strings() {
        assert_eq!(Value::from("hello"), Value::String("hello".to_string()));
        assert_eq!(
            Value::from("hello".to_string()),
            Value::String("hello".to_string())
        );
    }

    #[test]
    fn test_from_temporal_types() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(Value::from(date), Value::Date(date));
        let time = chrono::NaiveTime::from_hms_opt(12, 30, 0).unwrap();
        assert_eq!(Value::from(time), Value::Time(time));
    }

    #[test]
    fn test_from_option() {
        let some_val: Option<i64> = Some(42);
        assert_eq!(Value::from(some_val), Value::Int(42));

        let none_val: Option<i64> = None;
        assert_eq!(Value::from(none_val), Value::Null);
    }

    #[test]
    fn test_is_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::Int(0).is_null());
    }

    #[test]
    fn test_display_quotes_text() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::from("fn_name").to_string(), "'fn_name'");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_string(), "<bytea 3B>");
    }

    #[test]
    fn test_display_json_is_compact() {
        let v = Value::Json(serde_json::json!({"id": 1}));
        assert_eq!(v.to_string(), "{\"id\":1}");
    }

    #[test]
    fn test_row_get() {
        let row = Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::Int(1), Value::String("Alice".to_string())],
        );
        assert_eq!(row.get::<i64>("id").unwrap(), 1);
        assert_eq!(row.get::<String>("name").unwrap(), "Alice");
        assert!(row.get::<i64>("missing").is_err());
    }

    #[test]
    fn test_row_get_value() {
        let row = Row::new(vec!["res".to_string()], vec![Value::Null]);
        assert!(row.get_value("res").unwrap().is_null());
        assert!(row.get_value("other").is_none());
    }

    #[test]
    fn test_from_value_json_null() {
        let v: serde_json::Value = FromValue::from_value(&Value::Null).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn test_from_value_option() {
        let v: Option<i64> = FromValue::from_value(&Value::Null).unwrap();
        assert_eq!(v, None);
        let v: Option<i64> = FromValue::from_value(&Value::Int(7)).unwrap();
        assert_eq!(v, Some(7));
    }
}
