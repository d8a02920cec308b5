//! Drawing elements - the vector annotations drawn over a camera preview.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A point in media-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X position (pixels from left).
    pub x: f64,
    /// Y position (pixels from top).
    pub y: f64,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The shape an element was drawn as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// Open polyline.
    Line,
    /// Closed polygon.
    Area,
    /// Smoothed polyline.
    Curve,
    /// Axis-aligned rectangle.
    Rectangle,
    /// Circle given by centre and rim point.
    Circle,
}

impl ElementType {
    /// The wire name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Area => "area",
            Self::Curve => "curve",
            Self::Rectangle => "rectangle",
            Self::Circle => "circle",
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistence state of an element, owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Drawn locally, never stored.
    #[default]
    New,
    /// Stored, then changed locally.
    Edited,
    /// Marked for deletion.
    Deleted,
    /// Matches the backend copy.
    Saved,
}

/// Start/end pair derived from an element's points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    /// First point.
    pub start: Point,
    /// Last point.
    pub end: Point,
}

/// Entry and exit gates of a counting line.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detection {
    /// Entry polyline.
    pub entry: Vec<Point>,
    /// Exit polyline.
    pub exit: Vec<Point>,
}

/// Annotation metadata shown next to an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Annotation type tag.
    #[serde(rename = "type")]
    pub info_type: String,
    /// Real-world distance covered by the element.
    pub distance: f64,
    /// Label font size in pixels.
    pub font_size: f64,
    /// Label font family.
    pub font_family: String,
    /// Label background opacity (0..1).
    pub background_opacity: f64,
    /// Label background colour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    /// Unmodelled annotation fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ElementInfo {
    /// Create label metadata with the editor's default font settings.
    #[must_use]
    pub fn new(name: impl Into<String>, info_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            info_type: info_type.into(),
            distance: 0.0,
            font_size: 14.0,
            font_family: "Arial".to_string(),
            background_opacity: 0.5,
            background_color: None,
            extra: Map::new(),
        }
    }
}

/// A vector annotation as the drawing engine holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingElement {
    /// Unique identifier.
    pub id: String,
    /// Shape type.
    #[serde(rename = "type")]
    pub element_type: ElementType,
    /// Ordered vertices.
    pub points: Vec<Point>,
    /// Stroke colour (hex).
    pub color: String,
    /// Whether drawing has finished.
    pub completed: bool,
    /// Owning layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<String>,
    /// Multi-element group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Derived start/end pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Entry/exit gates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<Detection>,
    /// Annotation metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ElementInfo>,
    /// Persistence state.
    #[serde(default)]
    pub sync_state: SyncState,
    /// Unmodelled fields carried through import and export.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DrawingElement {
    /// Top-level field names as they appear on the wire.
    pub const FIELD_NAMES: &'static [&'static str] = &[
        "id",
        "type",
        "points",
        "color",
        "completed",
        "layerId",
        "groupId",
        "direction",
        "detection",
        "info",
        "syncState",
    ];

    /// Create a new, unfinished element with a fresh id.
    #[must_use]
    pub fn new(element_type: ElementType, points: Vec<Point>, color: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            element_type,
            points,
            color: color.into(),
            completed: false,
            layer_id: None,
            group_id: None,
            direction: None,
            detection: None,
            info: None,
            sync_state: SyncState::New,
            extra: Map::new(),
        }
    }

    /// Set the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set whether drawing has finished.
    #[must_use]
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Assign the element to a layer.
    #[must_use]
    pub fn with_layer(mut self, layer_id: impl Into<String>) -> Self {
        self.layer_id = Some(layer_id.into());
        self
    }

    /// Attach annotation metadata.
    #[must_use]
    pub fn with_info(mut self, info: ElementInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Fill `direction` from the first and last points.
    #[must_use]
    pub fn with_derived_direction(mut self) -> Self {
        self.direction = self.derive_direction();
        self
    }

    /// Start/end pair of the current points, if any.
    #[must_use]
    pub fn derive_direction(&self) -> Option<Direction> {
        let start = *self.points.first()?;
        let end = *self.points.last()?;
        Some(Direction { start, end })
    }

    /// Check whether a top-level wire field name is modelled by this type.
    #[must_use]
    pub fn is_known_field(name: &str) -> bool {
        Self::FIELD_NAMES.contains(&name)
    }
}
