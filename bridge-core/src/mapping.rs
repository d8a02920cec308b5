//! # Mapping Grammar
//!
//! Mapping strings describe how one field is produced or consumed. They are
//! parsed once, when a config is built, into a small typed AST.
//!
//! ```text
//! mapping  := call | pairs | path
//! call     := name "(" path ")"           e.g. rgb(color)
//! pairs    := "[" axis "," axis "]" "[]"  e.g. [int(points.x), int(points.y)][]
//! axis     := call | path
//! path     := segment ("." segment)*      e.g. info.name
//! ```
//!
//! Export mappings resolve against the element; import source mappings
//! (`call | path`, with reverse transform names) resolve against a backend
//! record.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{BridgeError, BridgeResult};
use crate::path;
use crate::transform::{ReverseTransform, Transform, TransformContext};

/// A validated dot-separated path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Path segments in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First segment.
    #[must_use]
    pub fn root(&self) -> &str {
        self.segments.first().map_or("", String::as_str)
    }

    /// Everything but the last segment, if there is a parent.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        match self.segments.split_last() {
            Some((_, parents)) if !parents.is_empty() => Some(Self {
                segments: parents.to_vec(),
            }),
            _ => None,
        }
    }

    /// Every proper prefix of this path, nearest parent first.
    pub fn ancestors(&self) -> impl Iterator<Item = Self> {
        std::iter::successors(self.parent(), Self::parent)
    }

    /// Check whether this path is exactly `dotted`.
    #[must_use]
    pub fn is(&self, dotted: &str) -> bool {
        self.segments.iter().map(String::as_str).eq(dotted.split('.'))
    }

    /// Read this path from a value.
    #[must_use]
    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        path::get_segments(value, &self.segments)
    }

    /// Write a value at this path.
    pub fn set(&self, target: &mut Value, new_value: Value) {
        path::set_segments(target, &self.segments, new_value);
    }

    /// Remove the value at this path.
    pub fn remove(&self, target: &mut Value) -> Option<Value> {
        path::remove_segments(target, &self.segments)
    }
}

impl FromStr for FieldPath {
    type Err = BridgeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Err(BridgeError::invalid_mapping(text, "empty path"));
        }
        let segments: Vec<String> = text.split('.').map(str::to_string).collect();
        for segment in &segments {
            if segment.is_empty() {
                return Err(BridgeError::invalid_mapping(text, "empty path segment"));
            }
            if let Some(c) = segment.chars().find(|&c| is_reserved(c)) {
                return Err(BridgeError::invalid_mapping(
                    text,
                    format!("unexpected `{c}` in path segment `{segment}`"),
                ));
            }
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

fn is_reserved(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | ',')
}

/// One side of a pairs mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    /// Transform applied to the resolved value.
    pub transform: Option<Transform>,
    /// Path of the value, including the array prefix.
    pub path: FieldPath,
}

impl Axis {
    fn parse(text: &str, whole: &str) -> BridgeResult<Self> {
        let text = text.trim();
        match split_call(text, whole)? {
            Some((name, inner)) => Ok(Self {
                transform: Some(name.parse()?),
                path: inner.parse()?,
            }),
            None => Ok(Self {
                transform: None,
                path: text.parse()?,
            }),
        }
    }
}

/// A parsed export mapping string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    /// Direct nested field access.
    Path(FieldPath),
    /// `name(path)`: resolve the path, then apply the transform.
    Call {
        /// Transform to apply.
        transform: Transform,
        /// Path to resolve first.
        path: FieldPath,
    },
    /// `[x, y][]`: project every item of an array to an `[x, y]` pair.
    Pairs {
        /// First component.
        x: Axis,
        /// Second component.
        y: Axis,
    },
}

impl FromStr for Mapping {
    type Err = BridgeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();

        if let Some((name, inner)) = split_call(trimmed, text)? {
            return Ok(Self::Call {
                transform: name.parse()?,
                path: inner.parse()?,
            });
        }

        if let Some(body) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix("][]"))
        {
            let parts = split_top_level(body);
            let [x, y] = parts.as_slice() else {
                return Err(BridgeError::invalid_mapping(
                    text,
                    format!("array mapping needs exactly two components, found {}", parts.len()),
                ));
            };
            return Ok(Self::Pairs {
                x: Axis::parse(x, text)?,
                y: Axis::parse(y, text)?,
            });
        }

        Ok(Self::Path(trimmed.parse()?))
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn axis(f: &mut fmt::Formatter<'_>, axis: &Axis) -> fmt::Result {
            match axis.transform {
                Some(t) => write!(f, "{t}({})", axis.path),
                None => write!(f, "{}", axis.path),
            }
        }
        match self {
            Self::Path(path) => write!(f, "{path}"),
            Self::Call { transform, path } => write!(f, "{transform}({path})"),
            Self::Pairs { x, y } => {
                f.write_str("[")?;
                axis(f, x)?;
                f.write_str(", ")?;
                axis(f, y)?;
                f.write_str("][]")
            }
        }
    }
}

impl Mapping {
    /// Top-level element fields this mapping reads.
    #[must_use]
    pub fn roots(&self) -> Vec<&str> {
        match self {
            Self::Path(path) | Self::Call { path, .. } => vec![path.root()],
            Self::Pairs { x, y } => vec![x.path.root(), y.path.root()],
        }
    }

    /// Produce the output value for one element.
    ///
    /// `Ok(None)` means the source path was missing and no fallback applies;
    /// the output field is then left out.
    ///
    /// # Errors
    ///
    /// Propagates transform failures.
    pub fn resolve(&self, element: &Value, ctx: &TransformContext<'_>) -> BridgeResult<Option<Value>> {
        match self {
            Self::Path(path) => Ok(resolve_path(path, element)),
            Self::Call { transform, path } => transform.apply(path.get(element), ctx).map(Some),
            Self::Pairs { x, y } => resolve_pairs(x, y, element, ctx).map(Some),
        }
    }
}

fn resolve_path(path: &FieldPath, element: &Value) -> Option<Value> {
    let value = path.get(element);
    let is_empty = match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    };
    if is_empty {
        if path.is("info.name") {
            return Some(Value::String(fallback_name(element)));
        }
        if path.is("info.description") {
            return Some(Value::String(fallback_description(element)));
        }
    }
    value.cloned()
}

fn element_labels(element: &Value) -> (&str, &str) {
    let layer = element
        .get("layerId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("default");
    let kind = element
        .get("type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("element");
    (layer, kind)
}

/// Name synthesized for elements exported without one.
fn fallback_name(element: &Value) -> String {
    let (layer, kind) = element_labels(element);
    format!("{layer} {kind}")
}

/// Description synthesized for elements exported without one.
fn fallback_description(element: &Value) -> String {
    let (layer, kind) = element_labels(element);
    format!("{kind} on layer {layer}")
}

fn resolve_pairs(
    x: &Axis,
    y: &Axis,
    element: &Value,
    ctx: &TransformContext<'_>,
) -> BridgeResult<Value> {
    let x_segments = x.path.segments();

    // Longest prefix of the x path that is an array on the element.
    let Some((base_len, items)) = (1..=x_segments.len()).rev().find_map(|len| {
        path::get_segments(element, &x_segments[..len])
            .and_then(Value::as_array)
            .map(|items| (len, items))
    }) else {
        tracing::warn!("Array mapping base `{}` is not an array on the element", x.path);
        return Ok(Value::Array(Vec::new()));
    };

    let base = &x_segments[..base_len];
    let x_rest = &x_segments[base_len..];
    let y_segments = y.path.segments();
    let y_rest = if y_segments.len() >= base_len && y_segments[..base_len] == *base {
        &y_segments[base_len..]
    } else {
        &y_segments[y_segments.len() - 1..]
    };

    items
        .iter()
        .map(|item| {
            let x_value = project(x.transform, path::get_segments(item, x_rest), ctx)?;
            let y_value = project(y.transform, path::get_segments(item, y_rest), ctx)?;
            Ok(Value::Array(vec![x_value, y_value]))
        })
        .collect::<BridgeResult<Vec<_>>>()
        .map(Value::Array)
}

fn project(
    transform: Option<Transform>,
    value: Option<&Value>,
    ctx: &TransformContext<'_>,
) -> BridgeResult<Value> {
    match transform {
        Some(t) => t.apply(value, ctx),
        None => Ok(value.cloned().unwrap_or(Value::Null)),
    }
}

/// A parsed import source key: a path, optionally wrapped in a reverse transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapping {
    /// Transform applied after resolution.
    pub transform: Option<ReverseTransform>,
    /// Path on the backend record.
    pub path: FieldPath,
}

impl SourceMapping {
    /// Read the source value from a backend record.
    #[must_use]
    pub fn resolve<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        self.path.get(record)
    }
}

impl FromStr for SourceMapping {
    type Err = BridgeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        match split_call(trimmed, text)? {
            Some((name, inner)) => Ok(Self {
                transform: Some(name.parse()?),
                path: inner.parse()?,
            }),
            None => Ok(Self {
                transform: None,
                path: trimmed.parse()?,
            }),
        }
    }
}

impl fmt::Display for SourceMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transform {
            Some(t) => write!(f, "{t}({})", self.path),
            None => write!(f, "{}", self.path),
        }
    }
}

/// Split `name(inner)` into its parts. `Ok(None)` if `text` is not a call.
fn split_call<'a>(text: &'a str, whole: &str) -> BridgeResult<Option<(&'a str, &'a str)>> {
    let Some(body) = text.strip_suffix(')') else {
        return Ok(None);
    };
    let Some((name, inner)) = body.split_once('(') else {
        return Err(BridgeError::invalid_mapping(whole, "unbalanced `)`"));
    };
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(BridgeError::invalid_mapping(
            whole,
            format!("`{name}` is not a transform name"),
        ));
    }
    if inner.contains('(') || inner.contains(')') {
        return Err(BridgeError::invalid_mapping(whole, "nested calls are not supported"));
    }
    Ok(Some((name, inner.trim())))
}

/// Split on commas that are not inside parentheses.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(element: &Value) -> TransformContext<'_> {
        TransformContext { element, index: 0 }
    }

    fn resolve(mapping: &str, element: &Value) -> Option<Value> {
        let mapping: Mapping = mapping.parse().expect("mapping should parse");
        mapping
            .resolve(element, &ctx(element))
            .expect("mapping should resolve")
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            "info.name".parse::<Mapping>().ok(),
            Some(Mapping::Path("info.name".parse().expect("path")))
        );
        assert!(matches!(
            "rgb(color)".parse::<Mapping>(),
            Ok(Mapping::Call { transform: Transform::Rgb, .. })
        ));
        let pairs: Mapping = "[int(points.x), points.y][]".parse().expect("pairs");
        let Mapping::Pairs { x, y } = pairs else {
            panic!("expected pairs mapping");
        };
        assert_eq!(x.transform, Some(Transform::Int));
        assert_eq!(y.transform, None);
        assert_eq!(y.path.to_string(), "points.y");
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["id", "rgb(color)", "[int(points.x), int(points.y)][]"] {
            let mapping: Mapping = text.parse().expect("should parse");
            assert_eq!(mapping.to_string(), text);
        }
    }

    #[test]
    fn test_parse_rejects_unknown_transform() {
        let err = "sparkle(color)".parse::<Mapping>().expect_err("should fail");
        assert!(matches!(err, BridgeError::UnknownTransform(ref name) if name == "sparkle"));

        let err = "[int(points.x), sparkle(points.y)][]"
            .parse::<Mapping>()
            .expect_err("should fail");
        assert!(matches!(err, BridgeError::UnknownTransform(_)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "a..b", "rgb(color", "rgb)", "[a][]", "[a, b, c][]", "f(g(x))", "a b"] {
            assert!(bad.parse::<Mapping>().is_err(), "`{bad}` should be rejected");
        }
    }

    #[test]
    fn test_source_mapping_uses_reverse_names() {
        let source: SourceMapping = "points(coordinates)".parse().expect("should parse");
        assert_eq!(source.transform, Some(ReverseTransform::Points));
        assert!("hex(color)".parse::<SourceMapping>().is_ok());
        assert!("hex(color)".parse::<Mapping>().is_err());
    }

    #[test]
    fn test_resolve_plain_path() {
        let element = json!({"id": "a", "info": {"name": "Gate"}});
        assert_eq!(resolve("id", &element), Some(json!("a")));
        assert_eq!(resolve("info.name", &element), Some(json!("Gate")));
        assert_eq!(resolve("info.distance", &element), None);
    }

    #[test]
    fn test_resolve_name_fallbacks() {
        let element = json!({"type": "line", "layerId": "north", "info": {"name": ""}});
        assert_eq!(resolve("info.name", &element), Some(json!("north line")));
        assert_eq!(
            resolve("info.description", &element),
            Some(json!("line on layer north"))
        );

        let orphan = json!({"type": "area"});
        assert_eq!(resolve("info.name", &orphan), Some(json!("default area")));
    }

    #[test]
    fn test_resolve_pairs_floors() {
        let element = json!({"points": [{"x": 10.7, "y": 20.3}, {"x": 100.9, "y": 200.1}]});
        assert_eq!(
            resolve("[int(points.x), int(points.y)][]", &element),
            Some(json!([[10, 20], [100, 200]]))
        );
    }

    #[test]
    fn test_resolve_pairs_nested_array() {
        let element = json!({"detection": {"entry": [{"x": 1, "y": 2}], "exit": []}});
        assert_eq!(
            resolve("[detection.entry.x, detection.entry.y][]", &element),
            Some(json!([[1, 2]]))
        );
    }

    #[test]
    fn test_resolve_pairs_without_array_is_empty() {
        let element = json!({"points": "not an array"});
        assert_eq!(resolve("[points.x, points.y][]", &element), Some(json!([])));
    }

    #[test]
    fn test_field_path_helpers() {
        let path: FieldPath = "info.style.font".parse().expect("path");
        assert_eq!(path.root(), "info");
        assert_eq!(path.parent().map(|p| p.to_string()), Some("info.style".to_string()));
        assert!("id".parse::<FieldPath>().expect("path").parent().is_none());
        assert!(path.is("info.style.font"));
        assert!(!path.is("info.style"));
    }

    #[test]
    fn test_field_path_ancestors() {
        let path: FieldPath = "info.style.font".parse().expect("path");
        let ancestors: Vec<String> = path.ancestors().map(|p| p.to_string()).collect();
        assert_eq!(ancestors, vec!["info.style", "info"]);
        assert_eq!("id".parse::<FieldPath>().expect("path").ancestors().count(), 0);
    }
}
