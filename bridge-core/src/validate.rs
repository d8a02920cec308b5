//! Structural validation of imported elements and layers.
//!
//! Imported records are assembled as JSON first and must pass these checks
//! before they are turned into [`crate::DrawingElement`] / [`crate::LayerInfo`].
//! Nothing here looks at business rules, only shape.

use serde_json::Value;
use thiserror::Error;

use crate::layer::LayerVisibility;

/// Why a value failed structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Field is absent, not a string, or empty.
    #[error("`{0}` must be a non-empty string")]
    EmptyString(&'static str),
    /// Field is absent, not an array, or empty.
    #[error("`{0}` must be a non-empty array")]
    EmptyArray(&'static str),
    /// Field is absent or not an array.
    #[error("`{0}` must be an array")]
    NotArray(&'static str),
    /// Field is absent or not a boolean.
    #[error("`{0}` must be a boolean")]
    NotBoolean(&'static str),
    /// Field is absent or not a number.
    #[error("`{0}` must be a number")]
    NotNumber(&'static str),
    /// Field is absent or not an object.
    #[error("`{0}` must be an object")]
    NotObject(&'static str),
    /// Layer visibility is not a known state.
    #[error("visibility must be one of visible, hidden, locked")]
    InvalidVisibility,
    /// Layer opacity is outside 0..=1.
    #[error("opacity must be within 0..=1")]
    OpacityOutOfRange,
}

/// Check the shape of an assembled element.
///
/// # Errors
///
/// Returns the first failed check.
pub fn validate_element(item: &Value) -> Result<(), ValidationError> {
    non_empty_str(item, "id")?;
    non_empty_str(item, "type")?;
    non_empty_array(item, "points")?;

    if let Some(detection) = present(item, "detection") {
        non_empty_array(detection, "entry").map_err(|_| ValidationError::EmptyArray("detection.entry"))?;
        non_empty_array(detection, "exit").map_err(|_| ValidationError::EmptyArray("detection.exit"))?;
    }

    non_empty_str(item, "color")?;
    if !item.get("completed").is_some_and(Value::is_boolean) {
        return Err(ValidationError::NotBoolean("completed"));
    }
    optional_str(item, "layerId")?;
    optional_str(item, "groupId")?;

    let info = item
        .get("info")
        .filter(|v| v.is_object())
        .ok_or(ValidationError::NotObject("info"))?;
    non_empty_str(info, "name").map_err(|_| ValidationError::EmptyString("info.name"))?;
    non_empty_str(info, "type").map_err(|_| ValidationError::EmptyString("info.type"))?;
    number(info, "distance").map_err(|_| ValidationError::NotNumber("info.distance"))?;
    number(info, "fontSize").map_err(|_| ValidationError::NotNumber("info.fontSize"))?;
    non_empty_str(info, "fontFamily").map_err(|_| ValidationError::EmptyString("info.fontFamily"))?;
    number(info, "backgroundOpacity")
        .map_err(|_| ValidationError::NotNumber("info.backgroundOpacity"))?;
    optional_str(info, "description").map_err(|_| ValidationError::EmptyString("info.description"))?;
    optional_str(info, "backgroundColor")
        .map_err(|_| ValidationError::EmptyString("info.backgroundColor"))?;

    Ok(())
}

/// Check the shape of an assembled layer.
///
/// # Errors
///
/// Returns the first failed check.
pub fn validate_layer(layer: &Value) -> Result<(), ValidationError> {
    non_empty_str(layer, "id")?;
    non_empty_str(layer, "name")?;

    let visibility = layer.get("visibility").and_then(Value::as_str);
    if !visibility.is_some_and(|v| LayerVisibility::NAMES.contains(&v)) {
        return Err(ValidationError::InvalidVisibility);
    }

    let opacity = number(layer, "opacity")?;
    if !(0.0..=1.0).contains(&opacity) {
        return Err(ValidationError::OpacityOutOfRange);
    }

    number(layer, "zIndex")?;
    if !layer.get("elementIds").is_some_and(Value::is_array) {
        return Err(ValidationError::NotArray("elementIds"));
    }
    number(layer, "createdAt")?;
    number(layer, "updatedAt")?;

    Ok(())
}

/// The field, unless it is absent or null.
fn present<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| !v.is_null())
}

fn non_empty_str(value: &Value, key: &'static str) -> Result<(), ValidationError> {
    match value.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(()),
        _ => Err(ValidationError::EmptyString(key)),
    }
}

fn optional_str(value: &Value, key: &'static str) -> Result<(), ValidationError> {
    match present(value, key) {
        None => Ok(()),
        Some(_) => non_empty_str(value, key),
    }
}

fn non_empty_array(value: &Value, key: &'static str) -> Result<(), ValidationError> {
    match value.get(key).and_then(Value::as_array) {
        Some(items) if !items.is_empty() => Ok(()),
        _ => Err(ValidationError::EmptyArray(key)),
    }
}

fn number(value: &Value, key: &'static str) -> Result<f64, ValidationError> {
    value
        .get(key)
        .and_then(Value::as_f64)
        .filter(|n| !n.is_nan())
        .ok_or(ValidationError::NotNumber(key))
}
