//! Pattern parsing.
//!
//! Turns a pattern document into the field list the matcher compiles:
//! e.g. `{"a": {"b": ["x", 3]}}` -> `[PatternField { path: "a\nb", vals: [String("\"x\""), Number(3)] }]`

use serde_json::{Map, Value};

use crate::flattener::quoted;
use crate::numbers;
use crate::QuaminaError;

/// Joins member names into a field path. It can't occur unescaped in JSON keys.
pub const SEGMENT_SEPARATOR: char = '\n';

/// One allowed value of a pattern field, as the bytes the automaton consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedValue {
    /// A string, including its quotes.
    String(Vec<u8>),
    /// A number's text and its canonical form.
    Number { text: Vec<u8>, canonical: Vec<u8> },
    /// `true`, `false` or `null`.
    Literal(Vec<u8>),
    Exists(bool),
    /// Leading bytes of a string, opening quote included.
    Prefix(Vec<u8>),
    /// A quoted string with exactly one `*`.
    Shellstyle(Vec<u8>),
    EqualsIgnoreCase(Vec<u8>),
    /// Quoted strings the value must not equal.
    AnythingBut(Vec<Vec<u8>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternField {
    pub path: String,
    pub vals: Vec<TypedValue>,
}

impl PatternField {
    pub fn new(path: impl Into<String>, vals: Vec<TypedValue>) -> Self {
        Self {
            path: path.into(),
            vals,
        }
    }

    pub fn is_exists_false(&self) -> bool {
        matches!(self.vals.as_slice(), [TypedValue::Exists(false)])
    }
}

fn invalid(msg: impl Into<String>) -> QuaminaError {
    QuaminaError::InvalidPattern(msg.into())
}

/// Parse a pattern into its fields and the member names it uses.
pub fn parse_pattern(json: &str) -> Result<(Vec<PatternField>, Vec<String>), QuaminaError> {
    let value: Value = serde_json::from_str(json)?;
    let Value::Object(obj) = value else {
        return Err(invalid("pattern must be an object"));
    };

    let mut fields = Vec::new();
    let mut names = Vec::new();
    extract_fields(&obj, "", &mut fields, &mut names)?;
    if fields.is_empty() {
        return Err(invalid("pattern must have at least one field"));
    }
    fields.sort_by(|a, b| a.path.cmp(&b.path));
    Ok((fields, names))
}

fn extract_fields(
    obj: &Map<String, Value>,
    prefix: &str,
    fields: &mut Vec<PatternField>,
    names: &mut Vec<String>,
) -> Result<(), QuaminaError> {
    for (key, value) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{SEGMENT_SEPARATOR}{key}")
        };
        names.push(key.clone());
        match value {
            Value::Array(members) => {
                let vals = members
                    .iter()
                    .map(|member| typed_value(&path, member))
                    .collect::<Result<Vec<_>, _>>()?;
                let field = PatternField::new(path, vals);
                validate_field(&field)?;
                fields.push(field);
            }
            Value::Object(nested) => extract_fields(nested, &path, fields, names)?,
            _ => {
                return Err(invalid(format!(
                    "field '{path}' must be an array or an object"
                )))
            }
        }
    }
    Ok(())
}

/// Rules every field must satisfy, whether parsed or built by the caller.
pub(crate) fn validate_field(field: &PatternField) -> Result<(), QuaminaError> {
    let path = &field.path;
    if field.vals.is_empty() {
        return Err(invalid(format!("field '{path}' has an empty value array")));
    }
    if field.vals.len() > 1 && field.vals.contains(&TypedValue::Exists(false)) {
        return Err(invalid(format!(
            "field '{path}': exists:false can't be combined with other values"
        )));
    }
    for val in &field.vals {
        match val {
            TypedValue::Shellstyle(glob) if glob.iter().filter(|&&b| b == b'*').count() > 1 => {
                return Err(invalid(format!(
                    "field '{path}': shellstyle allows only one '*'"
                )));
            }
            TypedValue::AnythingBut(excluded) if excluded.is_empty() => {
                return Err(invalid(format!(
                    "field '{path}': anything-but takes a string or a non-empty array"
                )));
            }
            TypedValue::Number { text, canonical } => {
                if numbers::canonicalize(text)? != *canonical {
                    return Err(invalid(format!(
                        "field '{path}': number form doesn't match its text"
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn typed_value(path: &str, value: &Value) -> Result<TypedValue, QuaminaError> {
    match value {
        Value::String(s) => Ok(TypedValue::String(quoted(s))),
        Value::Number(n) => {
            let text = n.to_string().into_bytes();
            let canonical = numbers::canonicalize(&text)?;
            Ok(TypedValue::Number { text, canonical })
        }
        Value::Bool(b) => Ok(TypedValue::Literal(b.to_string().into_bytes())),
        Value::Null => Ok(TypedValue::Literal(b"null".to_vec())),
        Value::Array(_) => Err(invalid(format!("field '{path}': nested arrays aren't allowed"))),
        Value::Object(special) => special_value(path, special),
    }
}

fn special_value(path: &str, special: &Map<String, Value>) -> Result<TypedValue, QuaminaError> {
    let mut entries = special.iter();
    let (Some((op, arg)), None) = (entries.next(), entries.next()) else {
        if special.contains_key("exists") {
            return Err(invalid(format!(
                "field '{path}': exists can't be mixed with other keys"
            )));
        }
        return Err(invalid(format!(
            "field '{path}': a match object needs exactly one key"
        )));
    };

    let string_arg = || match arg {
        Value::String(s) => Ok(s.as_str()),
        _ => Err(invalid(format!("field '{path}': {op} takes a string"))),
    };

    match op.as_str() {
        "exists" => match arg {
            Value::Bool(b) => Ok(TypedValue::Exists(*b)),
            _ => Err(invalid(format!("field '{path}': exists takes true or false"))),
        },
        "prefix" => {
            let mut bytes = quoted(string_arg()?);
            // drop the closing quote, any continuation matches
            bytes.pop();
            Ok(TypedValue::Prefix(bytes))
        }
        "shellstyle" => {
            let s = string_arg()?;
            match s.matches('*').count() {
                0 => Ok(TypedValue::String(quoted(s))),
                1 => Ok(TypedValue::Shellstyle(quoted(s))),
                _ => Err(invalid(format!(
                    "field '{path}': shellstyle allows only one '*'"
                ))),
            }
        }
        "equals-ignore-case" => Ok(TypedValue::EqualsIgnoreCase(quoted(string_arg()?))),
        "anything-but" => {
            let excluded = match arg {
                Value::String(s) => vec![quoted(s)],
                Value::Array(items) if !items.is_empty() => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(quoted(s)),
                        _ => Err(invalid(format!(
                            "field '{path}': anything-but values must be strings"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                _ => {
                    return Err(invalid(format!(
                        "field '{path}': anything-but takes a string or a non-empty array"
                    )))
                }
            };
            Ok(TypedValue::AnythingBut(excluded))
        }
        other => Err(invalid(format!("field '{path}': unknown match type '{other}'"))),
    }
}
