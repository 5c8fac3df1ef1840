//! Flattener trait for pluggable event flattening.
//!
//! A flattener turns one event into the field list the matcher consumes. The
//! default `JsonFlattener` handles JSON events; other formats can plug in
//! their own implementation.
//!
//! # Example
//!
//! ```
//! use quamina_core::{Field, Flattener, NameTracker, QuaminaError};
//!
//! struct FixedFlattener;
//!
//! impl Flattener for FixedFlattener {
//!     fn flatten(
//!         &mut self,
//!         _event: &[u8],
//!         _tracker: &dyn NameTracker,
//!     ) -> Result<Vec<Field>, QuaminaError> {
//!         Ok(vec![Field::new("status", "\"active\"")])
//!     }
//!
//!     fn copy(&self) -> Box<dyn Flattener> {
//!         Box::new(FixedFlattener)
//!     }
//! }
//! ```

use serde_json::{Map, Value};

use crate::pattern::SEGMENT_SEPARATOR;
use crate::QuaminaError;

/// Position of a value inside one array of the event.
///
/// Arrays get ids in the order the flattener meets them, so two fields that
/// share an id came out of the same array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArrayPos {
    pub array: u32,
    pub pos: u32,
}

/// A flattened event field.
///
/// - `path`: member names from the event root joined by `'\n'` (e.g. `b"context\nuser\nid"`)
/// - `val`: strings include their quotes, numbers and literals are raw text
/// - `array_trail`: one entry per enclosing array
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub path: Vec<u8>,
    pub val: Vec<u8>,
    pub array_trail: Vec<ArrayPos>,
}

impl Field {
    pub fn new(path: impl Into<Vec<u8>>, val: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            val: val.into(),
            array_trail: Vec::new(),
        }
    }

    pub fn with_trail(mut self, array_trail: Vec<ArrayPos>) -> Self {
        self.array_trail = array_trail;
        self
    }
}

/// Tells a flattener which member names some pattern mentions. Fields under
/// any other name can't affect matching and may be skipped.
pub trait NameTracker {
    fn is_name_used(&self, name: &str) -> bool;
}

/// Trait for flattening events into field lists.
pub trait Flattener: Send {
    /// Flatten one event. Fields may come in any order.
    fn flatten(
        &mut self,
        event: &[u8],
        tracker: &dyn NameTracker,
    ) -> Result<Vec<Field>, QuaminaError>;

    /// A fresh flattener of the same kind, for use by another matcher clone.
    fn copy(&self) -> Box<dyn Flattener>;
}

/// String bytes as they appear in a field value: wrapped in quotes, not escaped.
pub(crate) fn quoted(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(s.len() + 2);
    bytes.push(b'"');
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(b'"');
    bytes
}

/// The default flattener for JSON events.
#[derive(Debug, Default, Clone)]
pub struct JsonFlattener {
    array_count: u32,
}

impl JsonFlattener {
    pub fn new() -> Self {
        Self::default()
    }

    fn walk_object(
        &mut self,
        obj: &Map<String, Value>,
        prefix: &[u8],
        trail: &[ArrayPos],
        tracker: &dyn NameTracker,
        out: &mut Vec<Field>,
    ) {
        for (name, value) in obj {
            if !tracker.is_name_used(name) {
                continue;
            }
            let mut path = Vec::with_capacity(prefix.len() + name.len() + 1);
            if !prefix.is_empty() {
                path.extend_from_slice(prefix);
                path.push(SEGMENT_SEPARATOR as u8);
            }
            path.extend_from_slice(name.as_bytes());
            self.walk_value(value, path, trail, tracker, out);
        }
    }

    fn walk_value(
        &mut self,
        value: &Value,
        path: Vec<u8>,
        trail: &[ArrayPos],
        tracker: &dyn NameTracker,
        out: &mut Vec<Field>,
    ) {
        let val = match value {
            Value::Object(obj) => return self.walk_object(obj, &path, trail, tracker, out),
            Value::Array(items) => {
                let array = self.array_count;
                self.array_count += 1;
                for (pos, item) in items.iter().enumerate() {
                    let mut item_trail = trail.to_vec();
                    item_trail.push(ArrayPos {
                        array,
                        pos: pos as u32,
                    });
                    self.walk_value(item, path.clone(), &item_trail, tracker, out);
                }
                return;
            }
            Value::String(s) => quoted(s),
            Value::Number(n) => n.to_string().into_bytes(),
            Value::Bool(b) => b.to_string().into_bytes(),
            Value::Null => b"null".to_vec(),
        };
        out.push(Field {
            path,
            val,
            array_trail: trail.to_vec(),
        });
    }
}

impl Flattener for JsonFlattener {
    fn flatten(
        &mut self,
        event: &[u8],
        tracker: &dyn NameTracker,
    ) -> Result<Vec<Field>, QuaminaError> {
        let value: Value = serde_json::from_slice(event)?;
        let Value::Object(obj) = value else {
            return Err(QuaminaError::InvalidJson("event must be an object".into()));
        };
        self.array_count = 0;
        let mut fields = Vec::new();
        self.walk_object(&obj, &[], &[], tracker, &mut fields);
        Ok(fields)
    }

    fn copy(&self) -> Box<dyn Flattener> {
        Box::new(JsonFlattener::new())
    }
}
