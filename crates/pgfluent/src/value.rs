//! Bound parameter values and decoded column values.
//!
//! [`Value`] is the single currency of the crate: builders store bindings as
//! values, backends hand them to `tokio-postgres`, and result rows decode every
//! column back into one.
//!
//! Encoding adapts to whatever parameter type the server inferred for a
//! placeholder, so an `Int` can fill an `int4`, `int8`, `numeric` or `text`
//! slot without the caller choosing a Rust type up front.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

/// A dynamically typed SQL value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact NUMERIC.
    Decimal(Decimal),
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value is an integer, a float or a decimal.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Decimal(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Decimal(d) => d.to_f64(),
            Value::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Arithmetic negation, used to turn an increment into a decrement.
    pub fn negated(&self) -> Option<Value> {
        match self {
            Value::Int(i) => i.checked_neg().map(Value::Int),
            Value::Float(f) => Some(Value::Float(-f)),
            Value::Decimal(d) => Some(Value::Decimal(-*d)),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Json(_) => "json",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Json(v) => write!(f, "{v}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Text(v.to_rfc3339())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Value::from(f),
            // A JSON number would round through f64.
            Value::Decimal(d) => serde_json::Value::String(d.to_string()),
            Value::Text(s) => serde_json::Value::String(s),
            Value::Json(j) => j,
            Value::Bytes(b) => serde_json::Value::from(b),
        }
    }
}

fn is_text(ty: &Type) -> bool {
    <&str as ToSql>::accepts(ty)
}

fn encode_int(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT8 => i.to_sql(ty, out),
        Type::OID => u32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        _ if is_text(ty) => i.to_string().to_sql(ty, out),
        _ => Err(format!("cannot bind an integer to a parameter of type {ty}").into()),
    }
}

fn encode_float(f: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::FLOAT8 => f.to_sql(ty, out),
        Type::NUMERIC => Decimal::from_f64_retain(f)
            .ok_or_else(|| format!("{f} cannot be represented as numeric"))?
            .to_sql(ty, out),
        _ if is_text(ty) => f.to_string().to_sql(ty, out),
        _ => Err(format!("cannot bind a float to a parameter of type {ty}").into()),
    }
}

fn encode_decimal(d: &Decimal, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::NUMERIC => d.to_sql(ty, out),
        Type::FLOAT4 | Type::FLOAT8 => {
            let f = d.to_f64().ok_or_else(|| format!("{d} is out of float range"))?;
            encode_float(f, ty, out)
        }
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID if d.fract().is_zero() => {
            let i = d.to_i64().ok_or_else(|| format!("{d} is out of integer range"))?;
            encode_int(i, ty, out)
        }
        _ if is_text(ty) => d.to_string().to_sql(ty, out),
        _ => Err(format!("cannot bind decimal {d} to a parameter of type {ty}").into()),
    }
}

fn encode_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => encode_int(s.trim().parse()?, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => encode_float(s.trim().parse()?, ty, out),
        Type::NUMERIC => Decimal::from_str(s.trim())?.to_sql(ty, out),
        Type::BOOL => match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "1" | "yes" | "on" => true.to_sql(ty, out),
            "f" | "false" | "0" | "no" | "off" => false.to_sql(ty, out),
            other => Err(format!("cannot read {other:?} as a boolean").into()),
        },
        Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s, "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME => NaiveTime::from_str(s)?.to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(s)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(s)?
            .with_timezone(&Utc)
            .to_sql(ty, out),
        Type::JSON | Type::JSONB => {
            let doc = serde_json::from_str(s)
                .unwrap_or_else(|_| serde_json::Value::String(s.to_string()));
            doc.to_sql(ty, out)
        }
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        _ => s.to_sql_checked(ty, out),
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ => encode_int(i64::from(*b), ty, out),
            },
            Value::Int(i) => encode_int(*i, ty, out),
            Value::Float(f) => encode_float(*f, ty, out),
            Value::Decimal(d) => encode_decimal(d, ty, out),
            Value::Text(s) => encode_text(s, ty, out),
            Value::Json(doc) if is_text(ty) => doc.to_string().to_sql(ty, out),
            Value::Json(doc) => doc.to_sql_checked(ty, out),
            Value::Bytes(b) => b.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Int(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => Value::Int(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
            Type::OID => Value::Int(u32::from_sql(ty, raw)?.into()),
            Type::FLOAT4 => Value::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Value::Decimal(Decimal::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => Value::Json(serde_json::Value::from_sql(ty, raw)?),
            Type::BYTEA => Value::Bytes(Vec::<u8>::from_sql(ty, raw)?),
            Type::UUID => Value::Text(uuid::Uuid::from_sql(ty, raw)?.to_string()),
            Type::DATE => Value::Text(NaiveDate::from_sql(ty, raw)?.to_string()),
            Type::TIME => Value::Text(NaiveTime::from_sql(ty, raw)?.to_string()),
            Type::TIMESTAMP => Value::Text(NaiveDateTime::from_sql(ty, raw)?.to_string()),
            Type::TIMESTAMPTZ => Value::Text(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339()),
            _ if <&str as FromSql>::accepts(ty) => Value::Text(String::from_sql(ty, raw)?),
            _ => return Err(format!("unsupported column type {ty}").into()),
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value, ty: &Type) -> Result<Option<Vec<u8>>, BoxError> {
        let mut out = BytesMut::new();
        match value.to_sql_checked(ty, &mut out)? {
            IsNull::Yes => Ok(None),
            IsNull::No => Ok(Some(out.to_vec())),
        }
    }

    #[test]
    fn int_adapts_to_parameter_width() {
        assert_eq!(encode(&Value::Int(7), &Type::INT4).unwrap().unwrap().len(), 4);
        assert_eq!(encode(&Value::Int(7), &Type::INT8).unwrap().unwrap().len(), 8);
        assert_eq!(encode(&Value::Int(7), &Type::INT2).unwrap().unwrap().len(), 2);
        assert!(encode(&Value::Int(i64::MAX), &Type::INT4).is_err());
    }

    #[test]
    fn int_into_text_parameter() {
        let bytes = encode(&Value::Int(42), &Type::TEXT).unwrap().unwrap();
        assert_eq!(bytes, b"42");
    }

    #[test]
    fn text_into_integer_parameter() {
        let bytes = encode(&Value::from("5"), &Type::INT4).unwrap().unwrap();
        assert_eq!(bytes, 5i32.to_be_bytes());
        assert!(encode(&Value::from("five"), &Type::INT4).is_err());
    }

    #[test]
    fn null_encodes_for_any_type() {
        assert!(encode(&Value::Null, &Type::INT4).unwrap().is_none());
        assert!(encode(&Value::Null, &Type::JSONB).unwrap().is_none());
    }

    #[test]
    fn decode_roundtrips_scalars() {
        let raw = 9i32.to_be_bytes();
        assert_eq!(Value::from_sql(&Type::INT4, &raw).unwrap(), Value::Int(9));
        assert_eq!(Value::from_sql(&Type::TEXT, b"hi").unwrap(), Value::from("hi"));
        assert_eq!(Value::from_sql_null(&Type::INT8).unwrap(), Value::Null);
    }

    #[test]
    fn numeric_keeps_every_digit() {
        let exact = Decimal::from_str("12345678901234567.89").unwrap();
        let mut raw = BytesMut::new();
        exact.to_sql(&Type::NUMERIC, &mut raw).unwrap();

        let value = Value::from_sql(&Type::NUMERIC, &raw).unwrap();
        assert_eq!(value, Value::Decimal(exact));
        assert_eq!(value.to_string(), "12345678901234567.89");
        assert_eq!(
            serde_json::Value::from(value.clone()),
            serde_json::Value::from("12345678901234567.89")
        );

        let encoded = encode(&value, &Type::NUMERIC).unwrap().unwrap();
        assert_eq!(encoded, raw.to_vec());
    }

    #[test]
    fn decimal_adapts_to_parameter_type() {
        let whole = Value::Decimal(Decimal::from(42));
        assert_eq!(encode(&whole, &Type::INT8).unwrap().unwrap(), 42i64.to_be_bytes());
        assert_eq!(encode(&whole, &Type::TEXT).unwrap().unwrap(), b"42");
        let cents = Value::Decimal(Decimal::new(1050, 2));
        assert!(encode(&cents, &Type::INT4).is_err());
        assert_eq!(cents.as_f64(), Some(10.5));
        assert_eq!(cents.negated(), Some(Value::Decimal(Decimal::new(-1050, 2))));
        assert!(cents.is_numeric());
    }

    #[test]
    fn negation_and_accessors() {
        assert_eq!(Value::Int(3).negated(), Some(Value::Int(-3)));
        assert_eq!(Value::Float(1.5).negated(), Some(Value::Float(-1.5)));
        assert_eq!(Value::from("x").negated(), None);
        assert_eq!(Value::from(Some(4i32)), Value::Int(4));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from("12").as_i64(), Some(12));
    }
}
