//! Structural type descriptors for extraction results.
//!
//! A [`Schema`] is written in a compact JSON form:
//!
//! ```text
//! {"story": {"title": "string", "points": "number"}, "tags": ["string"], "note": "string?"}
//! ```
//!
//! Scalars are `"string"`, `"number"`, `"integer"` and `"boolean"`; a
//! one-element array describes a list; an object describes named fields; a
//! trailing `?` marks a scalar as optional. Lists and objects are made optional
//! by wrapping them as `{"?": <schema>}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

impl SchemaError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Schema {
    String,
    Number,
    Integer,
    Boolean,
    Array(Box<Schema>),
    Object(Vec<(String, Schema)>),
    Optional(Box<Schema>),
}

impl Schema {
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        Schema::Object(fields.into_iter().map(|(k, s)| (k.into(), s)).collect())
    }

    pub fn array(item: Schema) -> Self {
        Schema::Array(Box::new(item))
    }

    pub fn optional(inner: Schema) -> Self {
        match inner {
            Schema::Optional(_) => inner,
            other => Schema::Optional(Box::new(other)),
        }
    }

    /// Parse the compact JSON form.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        parse(value, "$")
    }

    /// Check `value` against this schema, applying the loose coercions an
    /// LLM response usually needs, and return the conforming value.
    pub fn conform(&self, value: &Value) -> Result<Value, SchemaError> {
        conform(self, value, "$")
    }

    /// Render as a JSON Schema document.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Schema::String => json!({ "type": "string" }),
            Schema::Number => json!({ "type": "number" }),
            Schema::Integer => json!({ "type": "integer" }),
            Schema::Boolean => json!({ "type": "boolean" }),
            Schema::Array(item) => json!({ "type": "array", "items": item.to_json_schema() }),
            Schema::Object(fields) => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for (name, field) in fields {
                    match field {
                        Schema::Optional(inner) => {
                            properties.insert(name.clone(), inner.to_json_schema());
                        }
                        _ => {
                            properties.insert(name.clone(), field.to_json_schema());
                            required.push(Value::String(name.clone()));
                        }
                    }
                }
                json!({ "type": "object", "properties": properties, "required": required })
            }
            Schema::Optional(inner) => {
                json!({ "anyOf": [inner.to_json_schema(), { "type": "null" }] })
            }
        }
    }

    fn to_compact(&self) -> Value {
        match self {
            Schema::String => json!("string"),
            Schema::Number => json!("number"),
            Schema::Integer => json!("integer"),
            Schema::Boolean => json!("boolean"),
            Schema::Array(item) => Value::Array(vec![item.to_compact()]),
            Schema::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, field)| (name.clone(), field.to_compact()))
                    .collect(),
            ),
            Schema::Optional(inner) => match inner.to_compact() {
                Value::String(s) => Value::String(format!("{s}?")),
                other => json!({ OPTIONAL_KEY: other }),
            },
        }
    }
}

impl TryFrom<Value> for Schema {
    type Error = SchemaError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Schema::from_value(&value)
    }
}

impl From<Schema> for Value {
    fn from(schema: Schema) -> Self {
        schema.to_compact()
    }
}

/// Sole key of the object wrapping an optional list or object.
const OPTIONAL_KEY: &str = "?";

fn parse(value: &Value, path: &str) -> Result<Schema, SchemaError> {
    match value {
        Value::String(name) => {
            let name = name.trim();
            if let Some(base) = name.strip_suffix('?') {
                return Ok(Schema::optional(parse(&Value::String(base.into()), path)?));
            }
            match name {
                "string" => Ok(Schema::String),
                "number" => Ok(Schema::Number),
                "integer" => Ok(Schema::Integer),
                "boolean" => Ok(Schema::Boolean),
                other => Err(SchemaError::new(path, format!("unknown type {other:?}"))),
            }
        }
        Value::Array(items) if items.len() == 1 => {
            Ok(Schema::array(parse(&items[0], &format!("{path}[]"))?))
        }
        Value::Array(_) => Err(SchemaError::new(
            path,
            "array schema must have exactly one item type",
        )),
        Value::Object(fields) if fields.len() == 1 && fields.contains_key(OPTIONAL_KEY) => {
            Ok(Schema::optional(parse(&fields[OPTIONAL_KEY], path)?))
        }
        Value::Object(fields) => fields
            .iter()
            .map(|(name, field)| Ok((name.clone(), parse(field, &format!("{path}.{name}"))?)))
            .collect::<Result<Vec<_>, SchemaError>>()
            .map(Schema::Object),
        other => Err(SchemaError::new(path, format!("not a schema: {other}"))),
    }
}

fn conform(schema: &Schema, value: &Value, path: &str) -> Result<Value, SchemaError> {
    match schema {
        Schema::Optional(_) if value.is_null() => Ok(Value::Null),
        Schema::Optional(inner) => conform(inner, value, path),
        Schema::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(mismatch(path, "string", other)),
        },
        Schema::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => parse_number(s).ok_or_else(|| mismatch(path, "number", value)),
            other => Err(mismatch(path, "number", other)),
        },
        Schema::Integer => {
            let number = match value {
                Value::Number(n) => Some(n.clone()),
                Value::String(s) => match parse_number(s) {
                    Some(Value::Number(n)) => Some(n),
                    _ => None,
                },
                _ => None,
            };
            number
                .and_then(|n| as_integer(&n))
                .ok_or_else(|| mismatch(path, "integer", value))
        }
        Schema::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => Err(mismatch(path, "boolean", other)),
        },
        Schema::Array(item) => match value {
            Value::Array(values) => values
                .iter()
                .enumerate()
                .map(|(i, v)| conform(item, v, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Null => Err(mismatch(path, "array", value)),
            single => Ok(Value::Array(vec![conform(item, single, &format!("{path}[0]"))?])),
        },
        Schema::Object(fields) => {
            let Value::Object(map) = value else {
                return Err(mismatch(path, "object", value));
            };
            let mut out = Map::new();
            for (name, field) in fields {
                let field_path = format!("{path}.{name}");
                let conformed = match map.get(name) {
                    Some(v) => conform(field, v, &field_path)?,
                    None if matches!(field, Schema::Optional(_)) => Value::Null,
                    None => return Err(SchemaError::new(&field_path, "missing required field")),
                };
                out.insert(name.clone(), conformed);
            }
            Ok(Value::Object(out))
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn as_integer(n: &Number) -> Option<Value> {
    if n.is_i64() || n.is_u64() {
        return Some(Value::Number(n.clone()));
    }
    let f = n.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(Value::Number((f as i64).into()))
    } else {
        None
    }
}

fn mismatch(path: &str, expected: &str, got: &Value) -> SchemaError {
    SchemaError::new(path, format!("expected {expected}, got {got}"))
}
