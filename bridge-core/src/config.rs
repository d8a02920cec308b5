//! Bridge configuration: the mapping tables that drive export and import.
//!
//! Tables are compiled when entries are inserted, so a [`BridgeConfig`] only
//! ever holds mappings whose grammar and transform names have been checked.
//! [`RawBridgeConfig`] is the serializable form used for config files and the
//! WASM boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::element::DrawingElement;
use crate::error::BridgeResult;
use crate::mapping::{FieldPath, Mapping, SourceMapping};
use crate::transform::TimestampPolicy;

/// Batch context handed to custom output functions.
#[derive(Debug, Clone, Copy)]
pub struct ExportContext<'a> {
    /// Position of the element within `batch`.
    pub index: usize,
    /// Every element being exported in this call.
    pub batch: &'a [&'a DrawingElement],
}

/// Custom output function.
pub type ElementFn = Arc<dyn Fn(&DrawingElement, &ExportContext<'_>) -> Value + Send + Sync>;

/// Custom import value function.
pub type ReverseFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// How one output field is produced.
#[derive(Clone)]
pub enum OutputMapping {
    /// A parsed mapping string.
    Expr(Mapping),
    /// A function of the element.
    Custom(ElementFn),
}

impl fmt::Debug for OutputMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(mapping) => f.debug_tuple("Expr").field(mapping).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One compiled output field.
#[derive(Debug, Clone)]
pub struct OutputRule {
    /// Where the value goes in the backend record.
    pub field: FieldPath,
    /// How the value is produced.
    pub mapping: OutputMapping,
}

/// Output field name → mapping.
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    rules: BTreeMap<String, OutputRule>,
}

impl FieldMapping {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a table from `(output field, mapping string)` pairs.
    ///
    /// # Errors
    ///
    /// Returns the first grammar or unknown-transform error.
    pub fn from_pairs<I, K, V>(pairs: I) -> BridgeResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut table = Self::new();
        for (field, mapping) in pairs {
            table.insert(field.as_ref(), mapping.as_ref())?;
        }
        Ok(table)
    }

    /// Add or replace a field driven by a mapping string.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownTransform`](crate::BridgeError::UnknownTransform) or
    /// [`BridgeError::InvalidMapping`](crate::BridgeError::InvalidMapping) if the string does not compile.
    pub fn insert(&mut self, field: &str, mapping: &str) -> BridgeResult<()> {
        let parsed: Mapping = mapping.parse()?;
        for root in parsed.roots() {
            if !DrawingElement::is_known_field(root) {
                tracing::debug!("Output field `{field}` reads unmodelled element field `{root}`");
            }
        }
        self.insert_rule(field, OutputMapping::Expr(parsed))
    }

    /// Add or replace a field driven by a function.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidMapping`](crate::BridgeError::InvalidMapping) if `field` is not a valid path.
    pub fn insert_fn<F>(&mut self, field: &str, f: F) -> BridgeResult<()>
    where
        F: Fn(&DrawingElement, &ExportContext<'_>) -> Value + Send + Sync + 'static,
    {
        self.insert_rule(field, OutputMapping::Custom(Arc::new(f)))
    }

    fn insert_rule(&mut self, field: &str, mapping: OutputMapping) -> BridgeResult<()> {
        let rule = OutputRule {
            field: field.parse()?,
            mapping,
        };
        self.rules.insert(field.to_string(), rule);
        Ok(())
    }

    /// Merge another table into this one; its entries win.
    pub fn merge(&mut self, other: Self) {
        self.rules.extend(other.rules);
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&OutputRule> {
        self.rules.get(field)
    }

    /// Iterate `(field name, rule)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputRule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Where an imported value goes on the element or layer.
#[derive(Clone)]
pub enum Destination {
    /// Write the (optionally transformed) value at a path.
    Path(FieldPath),
    /// Write `transform(value)` at `key`, bypassing any named transform.
    Custom {
        /// Destination path.
        key: FieldPath,
        /// Value function.
        transform: ReverseFn,
    },
}

impl Destination {
    /// Destination path.
    #[must_use]
    pub fn key(&self) -> &FieldPath {
        match self {
            Self::Path(key) | Self::Custom { key, .. } => key,
        }
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Custom { key, .. } => f.debug_struct("Custom").field("key", key).finish(),
        }
    }
}

/// One compiled import field.
#[derive(Debug, Clone)]
pub struct InputRule {
    /// Where to read and how to convert.
    pub source: SourceMapping,
    /// Where to write.
    pub destination: Destination,
}

/// Source mapping string → destination, for elements or layers.
#[derive(Debug, Clone, Default)]
pub struct ReverseFieldMapping {
    rules: BTreeMap<String, InputRule>,
}

impl ReverseFieldMapping {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a table from `(source mapping, destination path)` pairs.
    ///
    /// # Errors
    ///
    /// Returns the first grammar or unknown-transform error.
    pub fn from_pairs<I, K, V>(pairs: I) -> BridgeResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut table = Self::new();
        for (source, destination) in pairs {
            table.insert(source.as_ref(), destination.as_ref())?;
        }
        Ok(table)
    }

    /// Add or replace an entry writing to a destination path.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownTransform`](crate::BridgeError::UnknownTransform) or
    /// [`BridgeError::InvalidMapping`](crate::BridgeError::InvalidMapping) if either side does not compile.
    pub fn insert(&mut self, source: &str, destination: &str) -> BridgeResult<()> {
        let destination = Destination::Path(destination.parse()?);
        self.insert_rule(source, destination)
    }

    /// Add or replace an entry whose value is produced by a function.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidMapping`](crate::BridgeError::InvalidMapping) if either path is invalid.
    pub fn insert_custom<F>(&mut self, source: &str, key: &str, transform: F) -> BridgeResult<()>
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let destination = Destination::Custom {
            key: key.parse()?,
            transform: Arc::new(transform),
        };
        self.insert_rule(source, destination)
    }

    fn insert_rule(&mut self, source: &str, destination: Destination) -> BridgeResult<()> {
        let rule = InputRule {
            source: source.parse()?,
            destination,
        };
        self.rules.insert(source.to_string(), rule);
        Ok(())
    }

    /// Merge another table into this one; its entries win.
    pub fn merge(&mut self, other: Self) {
        self.rules.extend(other.rules);
    }

    /// Look up an entry by its source mapping string.
    #[must_use]
    pub fn get(&self, source: &str) -> Option<&InputRule> {
        self.rules.get(source)
    }

    /// Iterate `(source mapping string, rule)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputRule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate rules.
    pub fn rules(&self) -> impl Iterator<Item = &InputRule> {
        self.rules.values()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Import tables.
#[derive(Debug, Clone, Default)]
pub struct InputMappings {
    /// Record → element.
    pub elements: ReverseFieldMapping,
    /// Record → layer.
    pub layers: ReverseFieldMapping,
}

/// Behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// What reverse `time` does with unparseable input.
    pub timestamp_policy: TimestampPolicy,
    /// Discard a nested element object when any of its mapped children is missing.
    pub drop_partial_groups: bool,
    /// Fill missing layer `visibility`, `opacity` and timestamps before
    /// validation instead of rejecting the layer.
    pub fill_layer_defaults: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            timestamp_policy: TimestampPolicy::FallbackToNow,
            drop_partial_groups: true,
            fill_layer_defaults: false,
        }
    }
}

/// The complete mapping configuration of a bridge.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// Element → backend record.
    pub output: FieldMapping,
    /// Backend record → element and layer.
    pub input: InputMappings,
    /// Behaviour switches.
    pub options: BridgeOptions,
}

impl BridgeConfig {
    /// Load a config from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialization`](crate::BridgeError::Serialization) for malformed JSON and grammar
    /// errors for mappings that do not compile.
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        let raw: RawBridgeConfig = serde_json::from_str(json)?;
        raw.compile()
    }

    /// Preset for the remote line-storage API.
    ///
    /// Records look like
    /// `{id, name, description, type, coordinates: [[x, y], ..], color: [r, g, b], layer: {..}, ..}`.
    /// `description` is exported but never imported, so records that omit it still load.
    ///
    /// # Errors
    ///
    /// Infallible in practice; the preset's mapping strings are fixed.
    pub fn line_storage() -> BridgeResult<Self> {
        RawBridgeConfig::line_storage().compile()
    }

    /// Merge a partial config into this one. Keys present in `update` are
    /// added or overwritten; no existing key is dropped.
    pub fn apply(&mut self, update: BridgeConfigUpdate) {
        if let Some(output) = update.output {
            self.output.merge(output);
        }
        if let Some(elements) = update.elements {
            self.input.elements.merge(elements);
        }
        if let Some(layers) = update.layers {
            self.input.layers.merge(layers);
        }
        if let Some(options) = update.options {
            self.options = options;
        }
    }

    /// Serializable form. Function-driven entries cannot be represented and
    /// are left out.
    #[must_use]
    pub fn to_raw(&self) -> RawBridgeConfig {
        let output = self
            .output
            .iter()
            .filter_map(|(field, rule)| match &rule.mapping {
                OutputMapping::Expr(mapping) => Some((field.to_string(), mapping.to_string())),
                OutputMapping::Custom(_) => None,
            })
            .collect();
        let reverse = |table: &ReverseFieldMapping| {
            table
                .iter()
                .filter_map(|(source, rule)| match &rule.destination {
                    Destination::Path(path) => Some((source.to_string(), path.to_string())),
                    Destination::Custom { .. } => None,
                })
                .collect()
        };
        RawBridgeConfig {
            output,
            input: RawInputMappings {
                elements: reverse(&self.input.elements),
                layers: reverse(&self.input.layers),
            },
            options: Some(self.options),
        }
    }
}

/// Partial config for [`crate::DrawingBridge::update_config`].
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigUpdate {
    /// Output entries to add or replace.
    pub output: Option<FieldMapping>,
    /// Element import entries to add or replace.
    pub elements: Option<ReverseFieldMapping>,
    /// Layer import entries to add or replace.
    pub layers: Option<ReverseFieldMapping>,
    /// Replacement options.
    pub options: Option<BridgeOptions>,
}

/// Serializable import tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInputMappings {
    /// Source mapping → element destination path.
    #[serde(default)]
    pub elements: BTreeMap<String, String>,
    /// Source mapping → layer destination path.
    #[serde(default)]
    pub layers: BTreeMap<String, String>,
}

/// Serializable config, as stored in JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBridgeConfig {
    /// Output field → mapping string.
    #[serde(default)]
    pub output: BTreeMap<String, String>,
    /// Import tables.
    #[serde(default)]
    pub input: RawInputMappings,
    /// Behaviour switches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BridgeOptions>,
}

impl RawBridgeConfig {
    /// Compile every table.
    ///
    /// # Errors
    ///
    /// Returns the first mapping that does not compile.
    pub fn compile(self) -> BridgeResult<BridgeConfig> {
        Ok(BridgeConfig {
            output: FieldMapping::from_pairs(&self.output)?,
            input: InputMappings {
                elements: ReverseFieldMapping::from_pairs(&self.input.elements)?,
                layers: ReverseFieldMapping::from_pairs(&self.input.layers)?,
            },
            options: self.options.unwrap_or_default(),
        })
    }

    /// Compile as a partial update; empty tables are left untouched.
    ///
    /// # Errors
    ///
    /// Returns the first mapping that does not compile.
    pub fn into_update(self) -> BridgeResult<BridgeConfigUpdate> {
        let output = (!self.output.is_empty())
            .then(|| FieldMapping::from_pairs(&self.output))
            .transpose()?;
        let elements = (!self.input.elements.is_empty())
            .then(|| ReverseFieldMapping::from_pairs(&self.input.elements))
            .transpose()?;
        let layers = (!self.input.layers.is_empty())
            .then(|| ReverseFieldMapping::from_pairs(&self.input.layers))
            .transpose()?;
        Ok(BridgeConfigUpdate {
            output,
            elements,
            layers,
            options: self.options,
        })
    }

    /// Mapping strings for the remote line-storage API.
    #[must_use]
    pub fn line_storage() -> Self {
        fn table(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect()
        }

        Self {
            output: table(&[
                ("id", "id"),
                ("type", "type"),
                ("name", "info.name"),
                ("description", "info.description"),
                ("info_type", "info.type"),
                ("distance", "float(info.distance)"),
                ("coordinates", "[int(points.x), int(points.y)][]"),
                ("color", "rgb(color)"),
                ("completed", "isCompleted(completed)"),
                ("layer_id", "layerId"),
                ("group_id", "groupId"),
                ("layer.id", "layerId"),
                ("style.font_size", "int(info.fontSize)"),
                ("style.font_family", "info.fontFamily"),
                ("style.background_opacity", "float(info.backgroundOpacity)"),
            ]),
            input: RawInputMappings {
                // Optional info fields stay unmapped: a missing source would
                // discard the whole `info` object.
                elements: table(&[
                    ("id", "id"),
                    ("type", "type"),
                    ("name", "info.name"),
                    ("info_type", "info.type"),
                    ("float(distance)", "info.distance"),
                    ("points(coordinates)", "points"),
                    ("rgb(color)", "color"),
                    ("isCompleted(completed)", "completed"),
                    ("layer_id", "layerId"),
                    ("group_id", "groupId"),
                    ("int(style.font_size)", "info.fontSize"),
                    ("style.font_family", "info.fontFamily"),
                    ("float(style.background_opacity)", "info.backgroundOpacity"),
                ]),
                layers: table(&[
                    ("layer.id", "id"),
                    ("layer.name", "name"),
                    ("layer.description", "description"),
                    ("layer.category", "category"),
                    ("layer.visibility", "visibility"),
                    ("float(layer.opacity)", "opacity"),
                    ("layer.color", "color"),
                    ("time(layer.created_at)", "createdAt"),
                    ("time(layer.updated_at)", "updatedAt"),
                ]),
            },
            options: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use serde_json::json;

    #[test]
    fn test_line_storage_preset_compiles() {
        let config = BridgeConfig::line_storage().expect("preset should compile");
        assert!(config.output.get("coordinates").is_some());
        assert!(config.input.elements.get("points(coordinates)").is_some());
        assert!(config.input.layers.get("layer.id").is_some());
        assert!(config.options.drop_partial_groups);
        assert!(!config.options.fill_layer_defaults);
        assert!(config.input.elements.get("description").is_none());
    }

    #[test]
    fn test_unknown_transform_fails_at_load_time() {
        let json = r#"{"output": {"color": "sparkle(color)"}}"#;
        let err = BridgeConfig::from_json(json).expect_err("should not compile");
        assert_eq!(err.to_string(), "Unknown transformation function: sparkle");
    }

    #[test]
    fn test_reverse_names_checked_on_import_tables() {
        let mut table = ReverseFieldMapping::new();
        assert!(table.insert("hex(color)", "color").is_ok());
        assert!(matches!(
            table.insert("textLength(name)", "info.name"),
            Err(BridgeError::UnknownTransform(_))
        ));
        assert!(table.insert("id", "bad path(").is_err());
    }

    #[test]
    fn test_apply_merges_by_key() {
        let mut config = BridgeConfig::line_storage().expect("preset should compile");
        let before = config.output.len();

        let update = BridgeConfigUpdate {
            output: Some(
                FieldMapping::from_pairs([("color", "rgba(color)"), ("extra", "groupId")])
                    .expect("should compile"),
            ),
            ..BridgeConfigUpdate::default()
        };
        config.apply(update);

        assert_eq!(config.output.len(), before + 1);
        let color = config.output.get("color").expect("color should remain");
        assert!(matches!(
            color.mapping,
            OutputMapping::Expr(Mapping::Call {
                transform: crate::transform::Transform::Rgba,
                ..
            })
        ));
        assert!(config.input.elements.get("id").is_some());
    }

    #[test]
    fn test_raw_round_trip_skips_custom_entries() {
        let mut config = BridgeConfig::default();
        config.output.insert("id", "id").expect("should compile");
        config
            .output
            .insert_fn("static", |_, _| json!("fixed"))
            .expect("should compile");
        config
            .input
            .elements
            .insert_custom("completed", "completed", |_| json!(true))
            .expect("should compile");

        let raw = config.to_raw();
        assert_eq!(raw.output.len(), 1);
        assert!(raw.input.elements.is_empty());
        assert!(raw.compile().is_ok());
    }

    #[test]
    fn test_into_update_leaves_empty_tables_alone() {
        let raw: RawBridgeConfig =
            serde_json::from_str(r#"{"input": {"layers": {"layer.title": "name"}}}"#)
                .expect("should deserialize");
        let update = raw.into_update().expect("should compile");
        assert!(update.output.is_none());
        assert!(update.elements.is_none());
        assert_eq!(update.layers.map(|l| l.len()), Some(1));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: BridgeOptions =
            serde_json::from_str(r#"{"timestamp_policy": "reject"}"#).expect("should deserialize");
        assert_eq!(options.timestamp_policy, TimestampPolicy::Reject);
        assert!(options.drop_partial_groups);
    }
}
