//! Dynamically typed attribute values carried in evaluation requests.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// String-keyed bag of attribute values.
pub type AttributeMap = HashMap<String, AttributeValue>;

/// Where an attribute is read from during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeSource {
    Subject,
    Resource,
    Action,
    Environment,
    Context,
}

impl AttributeSource {
    pub const ALL: [AttributeSource; 5] = [
        AttributeSource::Subject,
        AttributeSource::Resource,
        AttributeSource::Action,
        AttributeSource::Environment,
        AttributeSource::Context,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeSource::Subject => "subject",
            AttributeSource::Resource => "resource",
            AttributeSource::Action => "action",
            AttributeSource::Environment => "environment",
            AttributeSource::Context => "context",
        }
    }
}

impl fmt::Display for AttributeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A JSON-shaped attribute value.
///
/// Serialized untagged so request bodies and policy documents read as plain
/// JSON. Integers that fit in `i64` deserialize as [`AttributeValue::Int`],
/// other numbers as [`AttributeValue::Float`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum AttributeValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<AttributeValue>),
    Map(AttributeMap),
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&AttributeMap> {
        match self {
            AttributeValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Numeric view of the value. Numeric strings coerce; NaN and infinities
    /// never do.
    pub fn as_f64(&self) -> Option<f64> {
        let n = match self {
            AttributeValue::Int(i) => *i as f64,
            AttributeValue::Float(f) => *f,
            AttributeValue::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        n.is_finite().then_some(n)
    }

    /// Integer view; floats with a fractional part are rejected.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            AttributeValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn is_scalar(&self) -> bool {
        !matches!(self, AttributeValue::List(_) | AttributeValue::Map(_))
    }

    /// Empty means null, an empty string, an empty list or an empty map.
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::Null => true,
            AttributeValue::String(s) => s.is_empty(),
            AttributeValue::List(items) => items.is_empty(),
            AttributeValue::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Plain-text rendering used for string comparisons. Strings render
    /// without quotes; containers render as JSON.
    pub fn render(&self) -> String {
        match self {
            AttributeValue::Null => String::new(),
            AttributeValue::Bool(b) => b.to_string(),
            AttributeValue::Int(i) => i.to_string(),
            AttributeValue::Float(f) => f.to_string(),
            AttributeValue::String(s) => s.clone(),
            AttributeValue::List(_) | AttributeValue::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    /// Equality with numeric coercion first and string comparison as the
    /// fallback. Lists and maps compare element-wise.
    pub fn loosely_equals(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Null, AttributeValue::Null) => true,
            (AttributeValue::Null, _) | (_, AttributeValue::Null) => false,
            (AttributeValue::List(a), AttributeValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            (AttributeValue::Map(a), AttributeValue::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.loosely_equals(w)))
            }
            _ if self.is_scalar() && other.is_scalar() => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a == b,
                    _ => self.render() == other.render(),
                }
            }
            _ => false,
        }
    }

    /// Ordering with numeric coercion first and lexicographic string order as
    /// the fallback. Containers and nulls are unordered.
    pub fn compare(&self, other: &AttributeValue) -> Option<Ordering> {
        if self.is_null() || other.is_null() || !self.is_scalar() || !other.is_scalar() {
            return None;
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => Some(self.render().cmp(&other.render())),
        }
    }

    /// Walks a dot-separated path through nested maps.
    pub fn lookup_path(&self, path: &str) -> Option<&AttributeValue> {
        path.split('.').try_fold(self, |current, segment| match current {
            AttributeValue::Map(map) => map.get(segment),
            _ => None,
        })
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("<unprintable>"),
        }
    }
}

/// Resolves `key` in a bag. Nested traversal by dot path wins; a literal key
/// containing dots is the fallback. Explicit nulls count as missing.
pub fn resolve_in<'a>(bag: &'a AttributeMap, key: &str) -> Option<&'a AttributeValue> {
    let mut segments = key.split('.');
    let first = segments.next()?;
    let nested = bag.get(first).and_then(|root| {
        segments.try_fold(root, |current, segment| match current {
            AttributeValue::Map(map) => map.get(segment),
            _ => None,
        })
    });
    nested
        .or_else(|| bag.get(key))
        .filter(|value| !value.is_null())
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(v as i64)
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        AttributeValue::Int(v as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<uuid::Uuid> for AttributeValue {
    fn from(v: uuid::Uuid) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(v: Vec<T>) -> Self {
        AttributeValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(AttributeValue::Null)
    }
}

impl From<AttributeMap> for AttributeValue {
    fn from(v: AttributeMap) -> Self {
        AttributeValue::Map(v)
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Int(i),
                None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => AttributeValue::String(s),
            serde_json::Value::Array(items) => {
                AttributeValue::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(map) => {
                AttributeValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value(v: serde_json::Value) -> AttributeValue {
        v.into()
    }

    #[test]
    fn test_untagged_deserialization() {
        let parsed: AttributeValue =
            serde_json::from_value(json!({"a": 1, "b": 2.5, "c": "x", "d": [true, null]}))
                .unwrap();
        let map = parsed.as_map().unwrap();
        assert_eq!(map["a"], AttributeValue::Int(1));
        assert_eq!(map["b"], AttributeValue::Float(2.5));
        assert_eq!(map["c"], AttributeValue::from("x"));
        assert_eq!(
            map["d"],
            AttributeValue::List(vec![AttributeValue::Bool(true), AttributeValue::Null])
        );
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(value(json!("42")).as_f64(), Some(42.0));
        assert_eq!(value(json!(" 1.5 ")).as_f64(), Some(1.5));
        assert_eq!(value(json!("NaN")).as_f64(), None);
        assert_eq!(value(json!("abc")).as_f64(), None);
        assert_eq!(value(json!(true)).as_f64(), None);
    }

    #[test]
    fn test_loosely_equals() {
        assert!(value(json!(10)).loosely_equals(&value(json!("10"))));
        assert!(value(json!(10)).loosely_equals(&value(json!(10.0))));
        assert!(value(json!("sales")).loosely_equals(&value(json!("sales"))));
        assert!(!value(json!("sales")).loosely_equals(&value(json!("Sales"))));
        assert!(value(json!([1, "a"])).loosely_equals(&value(json!(["1", "a"]))));
        assert!(!value(json!([1])).loosely_equals(&value(json!(1))));
        assert!(!AttributeValue::Null.loosely_equals(&value(json!(""))));
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            value(json!(5)).compare(&value(json!("10"))),
            Some(Ordering::Less)
        );
        assert_eq!(
            value(json!("b")).compare(&value(json!("a"))),
            Some(Ordering::Greater)
        );
        assert_eq!(value(json!([1])).compare(&value(json!(1))), None);
        assert_eq!(AttributeValue::Null.compare(&value(json!(1))), None);
    }

    #[test]
    fn test_is_empty() {
        assert!(AttributeValue::Null.is_empty());
        assert!(value(json!("")).is_empty());
        assert!(value(json!([])).is_empty());
        assert!(value(json!({})).is_empty());
        assert!(!value(json!(0)).is_empty());
        assert!(!value(json!(false)).is_empty());
    }

    #[test]
    fn test_resolve_nested_and_literal_keys() {
        let bag: AttributeMap = serde_json::from_value(json!({
            "address": {"city": "Berlin"},
            "geo.region": "eu",
            "gone": null
        }))
        .unwrap();
        assert_eq!(
            resolve_in(&bag, "address.city"),
            Some(&AttributeValue::from("Berlin"))
        );
        assert_eq!(
            resolve_in(&bag, "geo.region"),
            Some(&AttributeValue::from("eu"))
        );
        assert_eq!(resolve_in(&bag, "address.zip"), None);
        assert_eq!(resolve_in(&bag, "gone"), None);
    }

    #[test]
    fn test_render() {
        assert_eq!(value(json!("abc")).render(), "abc");
        assert_eq!(value(json!(3)).render(), "3");
        assert_eq!(value(json!(["a"])).render(), r#"["a"]"#);
        assert_eq!(value(json!("abc")).to_string(), r#""abc""#);
    }
}
