//! Billable character extraction.

use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Counts billable characters in a request body.
///
/// Returns `None` when the body cannot be interpreted.
pub type CharCountExtractor = Arc<dyn Fn(&[u8]) -> Option<u64> + Send + Sync>;

/// Count the characters of the string field `field` in a JSON object body.
///
/// Characters are Unicode scalar values. Returns `None` if the body is not
/// JSON, not an object, or the field is missing or not a string.
///
/// # Example
///
/// ```
/// use voxgate_gateway::try_extract_char_count;
///
/// assert_eq!(try_extract_char_count(br#"{"text": "hola"}"#, "text"), Some(4));
/// assert_eq!(try_extract_char_count(r#"{"text": "añ"}"#.as_bytes(), "text"), Some(2));
/// assert_eq!(try_extract_char_count(b"not json", "text"), None);
/// ```
pub fn try_extract_char_count(payload: &[u8], field: &str) -> Option<u64> {
    let value: JsonValue = serde_json::from_slice(payload).ok()?;
    let text = value.as_object()?.get(field)?.as_str()?;
    Some(text.chars().count() as u64)
}

/// Extractor reading the JSON string field `field`.
pub fn json_field_extractor(field: impl Into<String>) -> CharCountExtractor {
    let field = field.into();
    Arc::new(move |payload: &[u8]| try_extract_char_count(payload, &field))
}

/// Route path to extractor table, fixed when the gateway is built.
#[derive(Clone, Default)]
pub struct RouteExtractors {
    by_path: HashMap<String, CharCountExtractor>,
}

impl fmt::Debug for RouteExtractors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes: Vec<&String> = self.by_path.keys().collect();
        routes.sort();
        f.debug_struct("RouteExtractors").field("routes", &routes).finish()
    }
}

impl RouteExtractors {
    /// Build JSON field extractors from a route to field name mapping.
    pub fn from_fields(fields: &BTreeMap<String, String>) -> Self {
        let by_path = fields
            .iter()
            .map(|(route, field)| (route.clone(), json_field_extractor(field.clone())))
            .collect();
        Self { by_path }
    }

    /// Register (or replace) the extractor for `route`.
    pub fn insert(&mut self, route: impl Into<String>, extractor: CharCountExtractor) {
        self.by_path.insert(route.into(), extractor);
    }

    /// Whether `route` has billable text.
    pub fn contains(&self, route: &str) -> bool {
        self.by_path.contains_key(route)
    }

    /// Billable characters in `payload` for `route`.
    ///
    /// `None` for unregistered routes and for payloads the extractor cannot read.
    pub fn char_count(&self, route: &str, payload: &[u8]) -> Option<u64> {
        self.by_path.get(route).and_then(|extract| extract(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_string_field_is_unreadable() {
        assert_eq!(try_extract_char_count(br#"{"text": 12}"#, "text"), None);
        assert_eq!(try_extract_char_count(br#"["text"]"#, "text"), None);
        assert_eq!(try_extract_char_count(br#"{"other": "x"}"#, "text"), None);
    }

    #[test]
    fn test_routes_use_their_own_field() {
        let fields = BTreeMap::from([
            ("/api/synthesize".to_string(), "text".to_string()),
            ("/api/translate".to_string(), "english".to_string()),
        ]);
        let extractors = RouteExtractors::from_fields(&fields);
        let body = br#"{"text": "abc", "english": "hello"}"#;

        assert_eq!(extractors.char_count("/api/synthesize", body), Some(3));
        assert_eq!(extractors.char_count("/api/translate", body), Some(5));
        assert_eq!(extractors.char_count("/health", body), None);
    }

    #[test]
    fn test_custom_extractor() {
        let mut extractors = RouteExtractors::default();
        extractors.insert("/raw", Arc::new(|payload: &[u8]| Some(payload.len() as u64)));
        assert!(extractors.contains("/raw"));
        assert_eq!(extractors.char_count("/raw", b"12345"), Some(5));
    }
}
