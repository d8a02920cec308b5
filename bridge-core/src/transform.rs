//! Named value transforms used by mapping strings.
//!
//! [`Transform`] runs on export (element value → backend value) and
//! [`ReverseTransform`] runs on import (backend value → element value). Both
//! are closed sets, so a mapping string naming anything else is rejected when
//! the config is built.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::clock;
use crate::error::{BridgeError, BridgeResult};

/// Colour used when a reverse colour transform gets malformed input.
pub const FALLBACK_HEX: &str = "#000000";

/// What reverse `time` does with input that is not a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Substitute the current time.
    #[default]
    FallbackToNow,
    /// Fail with [`BridgeError::InvalidTimestamp`], skipping the field.
    Reject,
}

/// Per-element context available to forward transforms.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    /// The element being exported, as JSON.
    pub element: &'a Value,
    /// Position of the element within the exported batch.
    pub index: usize,
}

/// Export-direction transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    /// Hex colour → `[r, g, b]`.
    Rgb,
    /// Hex colour → `[r, g, b, a]`.
    Rgba,
    /// Lenient integer coercion (floor).
    Int,
    /// Lenient float coercion.
    Float,
    /// Points → `[[x, y], ..]`.
    CoordinatesArray,
    /// Points → first `[x, y]`.
    FirstPoint,
    /// Points → last `[x, y]`.
    LastPoint,
    /// Points → mean `[x, y]`.
    CenterPoint,
    /// String → character count.
    TextLength,
    /// String → upper case.
    UpperCase,
    /// String → lower case.
    LowerCase,
    /// Time → RFC 3339 string.
    Timestamp,
    /// Time → epoch milliseconds.
    Time,
    /// Index of the element in the exported batch.
    ElementIndex,
    /// Number of points.
    PointCount,
    /// Truthiness → boolean.
    IsCompleted,
    /// Keep a non-empty id, otherwise generate one.
    GenerateId,
}

impl Transform {
    /// Every forward transform.
    pub const ALL: [Self; 17] = [
        Self::Rgb,
        Self::Rgba,
        Self::Int,
        Self::Float,
        Self::CoordinatesArray,
        Self::FirstPoint,
        Self::LastPoint,
        Self::CenterPoint,
        Self::TextLength,
        Self::UpperCase,
        Self::LowerCase,
        Self::Timestamp,
        Self::Time,
        Self::ElementIndex,
        Self::PointCount,
        Self::IsCompleted,
        Self::GenerateId,
    ];

    /// The name used in mapping strings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Rgba => "rgba",
            Self::Int => "int",
            Self::Float => "float",
            Self::CoordinatesArray => "coordinatesArray",
            Self::FirstPoint => "firstPoint",
            Self::LastPoint => "lastPoint",
            Self::CenterPoint => "centerPoint",
            Self::TextLength => "textLength",
            Self::UpperCase => "upperCase",
            Self::LowerCase => "lowerCase",
            Self::Timestamp => "timestamp",
            Self::Time => "time",
            Self::ElementIndex => "elementIndex",
            Self::PointCount => "pointCount",
            Self::IsCompleted => "isCompleted",
            Self::GenerateId => "generateId",
        }
    }

    /// Apply the transform. `input` is `None` when the source path was missing.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidColor`] for colour transforms given
    /// something other than a hex string, and [`BridgeError::InvalidTimestamp`]
    /// when a time cannot be represented as RFC 3339.
    pub fn apply(self, input: Option<&Value>, ctx: &TransformContext<'_>) -> BridgeResult<Value> {
        let value = input.unwrap_or(&Value::Null);
        let result = match self {
            Self::Rgb => {
                let [r, g, b, _] = hex_color(value)?;
                json!([r, g, b])
            }
            Self::Rgba => {
                let [r, g, b, a] = hex_color(value)?;
                json!([r, g, b, a])
            }
            Self::Int => json!(to_int(value)),
            Self::Float => json!(to_float(value)),
            Self::CoordinatesArray => Value::Array(
                point_pairs(value)
                    .into_iter()
                    .map(|(x, y)| json!([x, y]))
                    .collect(),
            ),
            Self::FirstPoint => point_pairs(value)
                .first()
                .map_or(Value::Null, |&(x, y)| json!([x, y])),
            Self::LastPoint => point_pairs(value)
                .last()
                .map_or(Value::Null, |&(x, y)| json!([x, y])),
            Self::CenterPoint => {
                center(&point_pairs(value)).map_or(Value::Null, |(x, y)| json!([x, y]))
            }
            Self::TextLength => json!(value.as_str().map_or(0, |s| s.chars().count())),
            Self::UpperCase => map_str(value, str::to_uppercase),
            Self::LowerCase => map_str(value, str::to_lowercase),
            Self::Timestamp => {
                let millis = clock::millis_from_value(value).unwrap_or_else(clock::now_millis);
                let formatted = clock::format_millis(millis)
                    .ok_or_else(|| BridgeError::InvalidTimestamp(millis.to_string()))?;
                Value::String(formatted)
            }
            Self::Time => json!(clock::millis_from_value(value).unwrap_or_else(clock::now_millis)),
            Self::ElementIndex => json!(ctx.index),
            Self::PointCount => {
                let count = value.as_array().map_or_else(
                    || {
                        ctx.element
                            .get("points")
                            .and_then(Value::as_array)
                            .map_or(0, Vec::len)
                    },
                    Vec::len,
                );
                json!(count)
            }
            Self::IsCompleted => Value::Bool(is_truthy(value)),
            Self::GenerateId => generate_id(value),
        };
        Ok(result)
    }
}

impl FromStr for Transform {
    type Err = BridgeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| BridgeError::UnknownTransform(name.to_string()))
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Import-direction transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReverseTransform {
    /// `[r, g, b]` → hex colour.
    Rgb,
    /// Alias of [`ReverseTransform::Rgb`].
    Hex,
    /// `[r, g, b, a]` → hex colour, alpha appended unless opaque.
    Rgba,
    /// Lenient integer coercion (floor).
    Int,
    /// Lenient float coercion.
    Float,
    /// `[[x, y], ..]` → points.
    Points,
    /// Alias of [`ReverseTransform::Points`].
    CoordinatesArray,
    /// Pairs → first point.
    FirstPoint,
    /// Pairs → last point.
    LastPoint,
    /// Alias of [`ReverseTransform::LastPoint`].
    EndPoint,
    /// Pairs → mean point.
    CenterPoint,
    /// Time → epoch milliseconds.
    Time,
    /// Lower-cases its input (name kept from the stored configs).
    UpperCase,
    /// Upper-cases its input (name kept from the stored configs).
    LowerCase,
    /// Truthiness → boolean.
    IsCompleted,
    /// Keep a non-empty id, otherwise generate one.
    GenerateId,
}

impl ReverseTransform {
    /// Every reverse transform.
    pub const ALL: [Self; 16] = [
        Self::Rgb,
        Self::Hex,
        Self::Rgba,
        Self::Int,
        Self::Float,
        Self::Points,
        Self::CoordinatesArray,
        Self::FirstPoint,
        Self::LastPoint,
        Self::EndPoint,
        Self::CenterPoint,
        Self::Time,
        Self::UpperCase,
        Self::LowerCase,
        Self::IsCompleted,
        Self::GenerateId,
    ];

    /// The name used in mapping strings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Hex => "hex",
            Self::Rgba => "rgba",
            Self::Int => "int",
            Self::Float => "float",
            Self::Points => "points",
            Self::CoordinatesArray => "coordinatesArray",
            Self::FirstPoint => "firstPoint",
            Self::LastPoint => "lastPoint",
            Self::EndPoint => "endPoint",
            Self::CenterPoint => "centerPoint",
            Self::Time => "time",
            Self::UpperCase => "upperCase",
            Self::LowerCase => "lowerCase",
            Self::IsCompleted => "isCompleted",
            Self::GenerateId => "generateId",
        }
    }

    /// Apply the transform to a resolved source value.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidTimestamp`] from `time` when the input is
    /// not a timestamp and `policy` is [`TimestampPolicy::Reject`].
    pub fn apply(self, input: &Value, policy: TimestampPolicy) -> BridgeResult<Value> {
        let result = match self {
            Self::Rgb | Self::Hex => Value::String(rgb_to_hex(input, false)),
            Self::Rgba => Value::String(rgb_to_hex(input, true)),
            Self::Int => json!(to_int(input)),
            Self::Float => json!(to_float(input)),
            Self::Points | Self::CoordinatesArray => Value::Array(
                coordinate_pairs(input)
                    .into_iter()
                    .map(|(x, y)| point_value(x, y))
                    .collect(),
            ),
            Self::FirstPoint => coordinate_pairs(input)
                .first()
                .map_or(Value::Null, |&(x, y)| point_value(x, y)),
            Self::LastPoint | Self::EndPoint => coordinate_pairs(input)
                .last()
                .map_or(Value::Null, |&(x, y)| point_value(x, y)),
            Self::CenterPoint => {
                center(&coordinate_pairs(input)).map_or(Value::Null, |(x, y)| point_value(x, y))
            }
            Self::Time => match clock::millis_from_value(input) {
                Some(millis) => json!(millis),
                None => match policy {
                    TimestampPolicy::FallbackToNow => json!(clock::now_millis()),
                    TimestampPolicy::Reject => {
                        return Err(BridgeError::InvalidTimestamp(input.to_string()))
                    }
                },
            },
            // Inverted relative to the names; stored configs depend on it.
            Self::UpperCase => map_str(input, str::to_lowercase),
            Self::LowerCase => map_str(input, str::to_uppercase),
            Self::IsCompleted => Value::Bool(is_truthy(input)),
            Self::GenerateId => generate_id(input),
        };
        Ok(result)
    }
}

impl FromStr for ReverseTransform {
    type Err = BridgeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| BridgeError::UnknownTransform(name.to_string()))
    }
}

impl fmt::Display for ReverseTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional) into RGBA bytes.
fn hex_color(value: &Value) -> BridgeResult<[u8; 4]> {
    let invalid = || BridgeError::InvalidColor(value.to_string());
    let text = value.as_str().ok_or_else(invalid)?;
    let digits = text.trim().trim_start_matches('#');
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let expanded: String = match digits.len() {
        3 => digits.chars().flat_map(|c| [c, c]).chain("ff".chars()).collect(),
        6 => format!("{digits}ff"),
        8 => digits.to_string(),
        _ => return Err(invalid()),
    };
    let mut bytes = [0u8; 4];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&expanded[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
    }
    Ok(bytes)
}

/// Format an `[r, g, b, (a)]` array as lower-case hex, or [`FALLBACK_HEX`].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rgb_to_hex(value: &Value, with_alpha: bool) -> String {
    let Some(items) = value.as_array() else {
        return FALLBACK_HEX.to_string();
    };
    if items.len() < 3 {
        return FALLBACK_HEX.to_string();
    }
    let components: Option<Vec<u8>> = items
        .iter()
        .take(4)
        .map(|c| c.as_f64().map(|f| f.floor().clamp(0.0, 255.0) as u8))
        .collect();
    let Some(components) = components else {
        return FALLBACK_HEX.to_string();
    };

    let mut hex = format!(
        "#{:02x}{:02x}{:02x}",
        components[0], components[1], components[2]
    );
    if with_alpha {
        if let Some(&alpha) = components.get(3) {
            if alpha != 0xff {
                hex.push_str(&format!("{alpha:02x}"));
            }
        }
    }
    hex
}

/// Leading numeric prefix of a string (`"12.5px"` → `12.5`).
fn leading_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<f64>() {
        return n.is_finite().then_some(n);
    }
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in text.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    text[..end].trim_end_matches('.').parse::<f64>().ok()
}

fn to_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).unwrap_or(0.0),
        Value::String(s) => leading_number(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_int(value: &Value) -> i64 {
    if let Some(n) = value.as_i64() {
        return n;
    }
    to_float(value).floor() as i64
}

/// JavaScript-style truthiness.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn map_str(value: &Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        other => other.clone(),
    }
}

fn generate_id(value: &Value) -> Value {
    match value.as_str() {
        Some(id) if !id.is_empty() => Value::String(id.to_string()),
        _ => Value::String(Uuid::new_v4().to_string()),
    }
}

/// `[{x, y}, ..]` → coordinate pairs, skipping items without numeric x/y.
fn point_pairs(value: &Value) -> Vec<(f64, f64)> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|p| Some((p.get("x")?.as_f64()?, p.get("y")?.as_f64()?)))
                .collect()
        })
        .unwrap_or_default()
}

/// `[[x, y], ..]` or a single `[x, y]` → coordinate pairs.
fn coordinate_pairs(value: &Value) -> Vec<(f64, f64)> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    if let Some(pair) = as_pair(value) {
        if items.first().is_some_and(Value::is_number) {
            return vec![pair];
        }
    }
    items.iter().filter_map(as_pair).collect()
}

fn as_pair(value: &Value) -> Option<(f64, f64)> {
    match value.as_array()?.as_slice() {
        [x, y, ..] => Some((x.as_f64()?, y.as_f64()?)),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn center(pairs: &[(f64, f64)]) -> Option<(f64, f64)> {
    if pairs.is_empty() {
        return None;
    }
    let (sx, sy) = pairs
        .iter()
        .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
    let n = pairs.len() as f64;
    Some((sx / n, sy / n))
}

fn point_value(x: f64, y: f64) -> Value {
    json!({ "x": x, "y": y })
}
