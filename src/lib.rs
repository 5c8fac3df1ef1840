//! quamina-core: matching JSON events against large sets of patterns.
//!
//! Patterns are compiled into one shared automaton, so the cost of matching
//! an event depends on the event's size, not on how many patterns exist.
//!
//! ```
//! use quamina_core::Quamina;
//!
//! let q = Quamina::new();
//! q.add_pattern("p1".to_string(), r#"{"status": ["active"]}"#).unwrap();
//! q.add_pattern("p2".to_string(), r#"{"host": [{"prefix": "web-"}]}"#).unwrap();
//!
//! let matches = q
//!     .matches_for_event(br#"{"status": "active", "host": "db-1"}"#)
//!     .unwrap();
//! assert_eq!(matches, vec!["p1".to_string()]);
//! ```

pub mod automaton;
pub mod flattener;
pub mod numbers;
pub mod pattern;

use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

pub use automaton::CoreMatcher;
pub use flattener::{ArrayPos, Field, Flattener, JsonFlattener, NameTracker};
pub use pattern::{parse_pattern, PatternField, TypedValue};

/// Errors that can occur while adding patterns or reading events
#[derive(Debug, thiserror::Error)]
pub enum QuaminaError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("invalid number {value}: {reason}")]
    InvalidNumber { value: String, reason: String },
    #[error("invalid UTF-8")]
    InvalidUtf8,
}

impl From<serde_json::Error> for QuaminaError {
    fn from(err: serde_json::Error) -> Self {
        QuaminaError::InvalidJson(err.to_string())
    }
}

/// The main pattern matcher
///
/// All methods take `&self`: patterns can be added while other threads match.
/// Clones share the compiled patterns and get their own flattener:
/// ```
/// # use quamina_core::Quamina;
/// let q = Quamina::<String>::new();
/// q.add_pattern("p1".into(), r#"{"status": ["active"]}"#).unwrap();
///
/// let q2 = q.clone();
/// q2.add_pattern("p2".into(), r#"{"status": ["idle"]}"#).unwrap();
/// assert_eq!(q.pattern_count(), 2);
/// ```
pub struct Quamina<X = String> {
    matcher: Arc<CoreMatcher<X>>,
    flattener: Mutex<Box<dyn Flattener>>,
}

impl<X: Clone + Eq + Hash> Quamina<X> {
    /// Create a matcher that reads JSON events
    pub fn new() -> Self {
        Self::with_flattener(Box::new(JsonFlattener::new()))
    }

    /// Create a matcher that reads events with a custom flattener
    pub fn with_flattener(flattener: Box<dyn Flattener>) -> Self {
        Self {
            matcher: Arc::new(CoreMatcher::new()),
            flattener: Mutex::new(flattener),
        }
    }

    /// Add a pattern identified by `x`. An identifier may be used by several patterns.
    pub fn add_pattern(&self, x: X, pattern_json: &str) -> Result<(), QuaminaError> {
        self.matcher.add_pattern(x, pattern_json)
    }

    /// Find all patterns that match the given event
    pub fn matches_for_event(&self, event: &[u8]) -> Result<Vec<X>, QuaminaError> {
        let fields = self.flattener.lock().flatten(event, &*self.matcher)?;
        Ok(self.matcher.matches_for_fields(&fields))
    }

    /// Match fields that were already flattened
    pub fn matches_for_fields(&self, fields: &[Field]) -> Vec<X> {
        self.matcher.matches_for_fields(fields)
    }

    /// Check if any pattern matches the event
    pub fn has_matches(&self, event: &[u8]) -> Result<bool, QuaminaError> {
        Ok(!self.matches_for_event(event)?.is_empty())
    }

    /// Whether any pattern uses this member name. Flatteners use it to skip fields.
    pub fn is_name_used(&self, name: &str) -> bool {
        self.matcher.is_name_used(name)
    }

    /// Number of patterns added, counting repeated identifiers separately
    pub fn pattern_count(&self) -> usize {
        self.matcher.pattern_count()
    }
}

impl<X: Clone + Eq + Hash> Default for Quamina<X> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X> Clone for Quamina<X> {
    fn clone(&self) -> Self {
        Self {
            matcher: Arc::clone(&self.matcher),
            flattener: Mutex::new(self.flattener.lock().copy()),
        }
    }
}
