//! Result rows and row mapping.

use crate::error::{DbError, DbResult};
use crate::value::Value;
use serde::de::DeserializeOwned;

/// One result row: column names paired with decoded values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. A repeated name shadows nothing; `get` returns the first match.
    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push(column.into());
        self.values.push(value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Read a column and convert it, failing with [`DbError::Decode`].
    pub fn try_get<T: FromValue>(&self, column: &str) -> DbResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| DbError::decode(column, "no such column in row"))?;
        T::from_value(value).map_err(|message| DbError::decode(column, message))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Render the row as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(v.clone())))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    /// Deserialize the row into any `serde` type via its JSON form.
    pub fn deserialize<T: DeserializeOwned>(&self) -> DbResult<T> {
        serde_json::from_value(self.to_json())
            .map_err(|e| DbError::decode("<row>", e.to_string()))
    }

    pub(crate) fn from_pg_row(row: &tokio_postgres::Row) -> DbResult<Self> {
        let mut record = Record {
            columns: Vec::with_capacity(row.len()),
            values: Vec::with_capacity(row.len()),
        };
        for (idx, column) in row.columns().iter().enumerate() {
            let value: Value = row
                .try_get(idx)
                .map_err(|e| DbError::decode(column.name(), e.to_string()))?;
            record.push(column.name(), value);
        }
        Ok(record)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.push(k, v);
        }
        record
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::iter::Zip<std::vec::IntoIter<String>, std::vec::IntoIter<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter().zip(self.values)
    }
}

/// Trait for types that can be built from a result [`Record`].
pub trait FromRow: Sized {
    fn from_row(row: &Record) -> DbResult<Self>;
}

impl FromRow for Record {
    fn from_row(row: &Record) -> DbResult<Self> {
        Ok(row.clone())
    }
}

impl FromRow for serde_json::Value {
    fn from_row(row: &Record) -> DbResult<Self> {
        Ok(row.to_json())
    }
}

/// Conversion from a single column value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {expected}, found {}", value.type_name())
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.as_i64().ok_or_else(|| mismatch("int", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|e| e.to_string())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.as_f64().ok_or_else(|| mismatch("float", value))
    }
}

impl FromValue for rust_decimal::Decimal {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Decimal(d) => Ok(*d),
            Value::Int(i) => Ok((*i).into()),
            Value::Float(f) => {
                Self::from_f64_retain(*f).ok_or_else(|| format!("{f} is not a finite decimal"))
            }
            Value::Text(s) => s.trim().parse().map_err(|e| format!("{e}")),
            other => Err(mismatch("decimal", other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Null | Value::Bytes(_) => Err(mismatch("text", value)),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(serde_json::Value::from(value.clone()))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Build an input row for inserts and updates.
///
/// ```ignore
/// let row = pgfluent::row! { "email" => "x@y.com", "name" => "A", "age" => 30 };
/// ```
#[macro_export]
macro_rules! row {
    () => { ::std::vec::Vec::<(::std::string::String, $crate::Value)>::new() };
    ($($column:expr => $value:expr),+ $(,)?) => {
        ::std::vec![$((::std::string::String::from($column), $crate::Value::from($value))),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        [("id", Value::Int(5)), ("name", Value::from("ada")), ("bio", Value::Null)]
            .into_iter()
            .collect()
    }

    #[test]
    fn get_by_name_and_index() {
        let row = sample();
        assert_eq!(row.get("name"), Some(&Value::from("ada")));
        assert_eq!(row.get_index(0), Some(&Value::Int(5)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.columns(), ["id", "name", "bio"]);
    }

    #[test]
    fn try_get_converts() {
        let row = sample();
        assert_eq!(row.try_get::<i64>("id").unwrap(), 5);
        assert_eq!(row.try_get::<String>("name").unwrap(), "ada");
        assert_eq!(row.try_get::<Option<String>>("bio").unwrap(), None);
        assert!(row.try_get::<bool>("name").is_err());
        assert!(row.try_get::<i64>("missing").is_err());
    }

    #[test]
    fn decimal_cells_stay_exact() {
        let price: rust_decimal::Decimal = "12345678901234567.89".parse().unwrap();
        let row: Record = [("price", Value::Decimal(price))].into_iter().collect();
        assert_eq!(row.try_get::<rust_decimal::Decimal>("price").unwrap(), price);
        assert_eq!(row.try_get::<String>("price").unwrap(), "12345678901234567.89");
        assert!(row.try_get::<i64>("price").is_err());
    }

    #[test]
    fn deserialize_through_json() {
        #[derive(serde::Deserialize)]
        struct User {
            id: i64,
            name: String,
            bio: Option<String>,
        }

        let user: User = sample().deserialize().unwrap();
        assert_eq!(user.id, 5);
        assert_eq!(user.name, "ada");
        assert!(user.bio.is_none());
    }

    #[test]
    fn row_macro_builds_pairs() {
        let row = crate::row! { "email" => "x@y.com", "age" => 30 };
        assert_eq!(row[0], ("email".to_string(), Value::from("x@y.com")));
        assert_eq!(row[1], ("age".to_string(), Value::Int(30)));
    }
}
