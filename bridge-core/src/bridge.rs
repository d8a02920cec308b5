//! # Drawing Bridge
//!
//! Converts between in-memory [`DrawingElement`]s and backend records using a
//! [`BridgeConfig`].
//!
//! ```text
//! export: elements ──(completed only)──► output table ──► records
//!
//! import: records ─┬─► element table ─► partial-group rule ─► validate ─┐
//!                  │                                                   ├─► link ─► ImportResult
//!                  └─► layer table ──► dedup by id ─────────► validate ─┘
//! ```
//!
//! Neither direction fails as a whole: a bad field becomes `null` (export) or
//! is skipped (import), and invalid elements/layers are dropped and counted
//! in the [`ImportReport`].

use std::collections::{BTreeMap, HashSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock;
use crate::config::{
    BridgeConfig, BridgeConfigUpdate, Destination, ExportContext, InputRule, OutputMapping,
};
use crate::element::{DrawingElement, SyncState};
use crate::error::BridgeResult;
use crate::layer::{LayerInfo, LayerMap, LayerVisibility};
use crate::link::link_elements;
use crate::mapping::FieldPath;
use crate::transform::TransformContext;
use crate::validate::{validate_element, validate_layer};

/// Counters describing what an import kept and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Source records processed.
    pub records: usize,
    /// Elements dropped by validation.
    pub invalid_elements: usize,
    /// Layers dropped by validation.
    pub invalid_layers: usize,
    /// Records whose layer id was already taken.
    pub duplicate_layers: usize,
    /// Records without a layer id.
    pub skipped_layers: usize,
    /// Elements whose layer was not imported.
    pub orphaned_elements: usize,
    /// Element ids appended to layers.
    pub linked_elements: usize,
}

/// Elements and layers rebuilt from backend records.
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    /// Valid elements, in record order.
    pub elements: Vec<DrawingElement>,
    /// Valid layers keyed by id, in first-seen order.
    pub layers: LayerMap,
    /// What was dropped and why.
    pub report: ImportReport,
}

/// Bidirectional element ⇄ backend record converter.
#[derive(Debug, Clone, Default)]
pub struct DrawingBridge {
    config: BridgeConfig,
}

impl DrawingBridge {
    /// Create a bridge from a compiled config.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// Create a bridge from a JSON config.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a mapping does not compile.
    pub fn from_json(json: &str) -> BridgeResult<Self> {
        BridgeConfig::from_json(json).map(Self::new)
    }

    /// The live config.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// A copy of the config; changing it does not affect the bridge.
    #[must_use]
    pub fn get_config(&self) -> BridgeConfig {
        self.config.clone()
    }

    /// Merge a partial config into the live one.
    pub fn update_config(&mut self, update: BridgeConfigUpdate) {
        self.config.apply(update);
        tracing::debug!(
            "Bridge config updated: {} output, {} element, {} layer mappings",
            self.config.output.len(),
            self.config.input.elements.len(),
            self.config.input.layers.len()
        );
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    /// Convert completed elements into backend records, preserving order.
    #[must_use]
    pub fn export(&self, elements: &[DrawingElement]) -> Vec<Value> {
        let batch: Vec<&DrawingElement> = elements.iter().filter(|e| e.completed).collect();
        let records: Vec<Value> = batch
            .iter()
            .enumerate()
            .map(|(index, element)| self.export_element(element, index, &batch))
            .collect();
        tracing::debug!(
            "Exported {} of {} elements",
            records.len(),
            elements.len()
        );
        records
    }

    /// Convert a single element, completed or not.
    #[must_use]
    pub fn export_one(&self, element: &DrawingElement) -> Value {
        self.export_element(element, 0, &[element])
    }

    /// Export and deserialize each record into the caller's backend type.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Serialization`] for the first record that
    /// does not fit `T`.
    pub fn export_as<T: DeserializeOwned>(&self, elements: &[DrawingElement]) -> BridgeResult<Vec<T>> {
        self.export(elements)
            .into_iter()
            .map(|record| serde_json::from_value(record).map_err(Into::into))
            .collect()
    }

    fn export_element(
        &self,
        element: &DrawingElement,
        index: usize,
        batch: &[&DrawingElement],
    ) -> Value {
        let element_value = match serde_json::to_value(element) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to serialize element {}: {e}", element.id);
                Value::Null
            }
        };
        let transform_ctx = TransformContext {
            element: &element_value,
            index,
        };
        let export_ctx = ExportContext { index, batch };

        let mut record = Value::Object(Map::new());
        for (field, rule) in self.config.output.iter() {
            let resolved = match &rule.mapping {
                OutputMapping::Custom(f) => Ok(Some(f(element, &export_ctx))),
                OutputMapping::Expr(mapping) => mapping.resolve(&element_value, &transform_ctx),
            };
            match resolved {
                Ok(Some(value)) => rule.field.set(&mut record, value),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Failed to export field `{field}` of element {}: {e}", element.id);
                    rule.field.set(&mut record, Value::Null);
                }
            }
        }
        record
    }

    // -----------------------------------------------------------------------
    // Import
    // -----------------------------------------------------------------------

    /// Rebuild elements and layers from backend records.
    ///
    /// Elements and layers are validated independently; linking runs last and
    /// only over valid elements.
    #[must_use]
    pub fn import(&self, records: &[Value]) -> ImportResult {
        let mut report = ImportReport {
            records: records.len(),
            ..ImportReport::default()
        };

        let elements: Vec<DrawingElement> = records
            .iter()
            .filter_map(|record| {
                let element = self.build_element(record);
                if element.is_none() {
                    report.invalid_elements += 1;
                }
                element
            })
            .collect();

        let mut layers = self.import_layers(records, &mut report);

        let summary = link_elements(&elements, &mut layers, clock::now_millis());
        report.linked_elements = summary.linked;
        report.orphaned_elements = summary.orphaned;

        tracing::debug!(
            "Imported {} elements and {} layers from {} records",
            elements.len(),
            layers.len(),
            records.len()
        );

        ImportResult {
            elements,
            layers,
            report,
        }
    }

    /// Serialize typed records, then [`import`](Self::import) them.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BridgeError::Serialization`] if a record cannot be
    /// represented as JSON.
    pub fn import_from<T: Serialize>(&self, records: &[T]) -> BridgeResult<ImportResult> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.import(&values))
    }

    /// Assemble one element as JSON from a record, before validation.
    #[must_use]
    pub fn import_single(&self, record: &Value) -> Value {
        let mut item = Value::Object(Map::new());
        // Ancestor path -> whether every mapped descendant was written.
        let mut groups: BTreeMap<FieldPath, bool> = BTreeMap::new();

        for rule in self.config.input.elements.rules() {
            let written = self.apply_input_rule(rule, record, &mut item);
            for ancestor in rule.destination.key().ancestors() {
                *groups.entry(ancestor).or_insert(true) &= written;
            }
        }

        if self.config.options.drop_partial_groups {
            // Shorter paths sort first, so an outer object goes before its children.
            for (parent, complete) in groups {
                if !complete && parent.remove(&mut item).is_some() {
                    tracing::debug!("Dropped incomplete `{parent}` from imported element");
                }
            }
        }

        if let Value::Object(map) = &mut item {
            map.insert(
                "syncState".to_string(),
                serde_json::to_value(SyncState::Saved).unwrap_or(Value::Null),
            );
        }
        item
    }

    fn build_element(&self, record: &Value) -> Option<DrawingElement> {
        let item = self.import_single(record);
        if let Err(reason) = validate_element(&item) {
            tracing::debug!("Dropping invalid element {}: {reason}", describe_id(&item));
            return None;
        }
        match serde_json::from_value(item) {
            Ok(element) => Some(element),
            Err(e) => {
                tracing::warn!("Dropping element that does not fit the element model: {e}");
                None
            }
        }
    }

    fn import_layers(&self, records: &[Value], report: &mut ImportReport) -> LayerMap {
        let mut layers = LayerMap::new();
        if self.config.input.layers.is_empty() {
            return layers;
        }

        let mut seen: HashSet<String> = HashSet::new();
        let now = clock::now_millis();

        for (index, record) in records.iter().enumerate() {
            let mut layer = Value::Object(Map::new());
            for rule in self.config.input.layers.rules() {
                self.apply_input_rule(rule, record, &mut layer);
            }

            let Some(id) = layer
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
            else {
                tracing::warn!("Record {index} has no layer id, skipping its layer");
                report.skipped_layers += 1;
                continue;
            };
            if !seen.insert(id.clone()) {
                report.duplicate_layers += 1;
                continue;
            }

            let z_index = seen.len() - 1;
            if let Value::Object(map) = &mut layer {
                map.insert("elementIds".to_string(), Value::Array(Vec::new()));
                map.insert("zIndex".to_string(), Value::from(z_index));
                if self.config.options.fill_layer_defaults {
                    let visibility =
                        serde_json::to_value(LayerVisibility::default()).unwrap_or(Value::Null);
                    map.entry("visibility").or_insert(visibility);
                    map.entry("opacity").or_insert_with(|| Value::from(1.0));
                    map.entry("createdAt").or_insert_with(|| Value::from(now));
                    map.entry("updatedAt").or_insert_with(|| Value::from(now));
                }
            }

            if let Err(reason) = validate_layer(&layer) {
                tracing::warn!("Dropping invalid layer {id}: {reason}");
                report.invalid_layers += 1;
                continue;
            }
            match serde_json::from_value::<LayerInfo>(layer) {
                Ok(info) => {
                    layers.insert_first(info);
                }
                Err(e) => {
                    tracing::warn!("Dropping layer {id} that does not fit the layer model: {e}");
                    report.invalid_layers += 1;
                }
            }
        }

        if report.duplicate_layers > 0 {
            tracing::debug!("Ignored {} duplicate layer records", report.duplicate_layers);
        }
        layers
    }

    /// Resolve, convert and write one import field. Returns `true` if written.
    fn apply_input_rule(&self, rule: &InputRule, record: &Value, target: &mut Value) -> bool {
        let Some(raw) = rule.source.resolve(record) else {
            return false;
        };
        let value = match &rule.destination {
            Destination::Custom { transform, .. } => transform(raw),
            Destination::Path(_) => match rule.source.transform {
                Some(t) => match t.apply(raw, self.config.options.timestamp_policy) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!("Skipping import field `{}`: {e}", rule.source);
                        return false;
                    }
                },
                None => raw.clone(),
            },
        };
        rule.destination.key().set(target, value);
        true
    }
}

fn describe_id(item: &Value) -> String {
    item.get("id")
        .map_or_else(|| "<no id>".to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldMapping, ReverseFieldMapping};
    use crate::element::{ElementInfo, ElementType, Point};
    use serde_json::json;

    fn bridge() -> DrawingBridge {
        DrawingBridge::new(BridgeConfig::line_storage().expect("preset should compile"))
    }

    fn element(id: &str, completed: bool) -> DrawingElement {
        DrawingElement::new(
            ElementType::Line,
            vec![Point::new(10.7, 20.3), Point::new(100.9, 200.1)],
            "#ff8000",
        )
        .with_id(id)
        .with_completed(completed)
        .with_layer("layer-1")
        .with_info(ElementInfo::new("Gate", "counter"))
    }

    #[test]
    fn test_export_filters_incomplete() {
        let records = bridge().export(&[element("a", true), element("b", false), element("c", true)]);
        let ids: Vec<_> = records.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("a"), json!("c")]);
    }

    #[test]
    fn test_export_shape() {
        let record = bridge().export_one(&element("a", true));
        assert_eq!(record["coordinates"], json!([[10, 20], [100, 200]]));
        assert_eq!(record["color"], json!([255, 128, 0]));
        assert_eq!(record["name"], json!("Gate"));
        assert_eq!(record["layer"]["id"], json!("layer-1"));
        assert_eq!(record["style"]["font_family"], json!("Arial"));
        assert_eq!(record["description"], json!("line on layer layer-1"));
        assert!(record.get("group_id").is_none());
    }

    #[test]
    fn test_export_bad_field_becomes_null() {
        let mut bridge = bridge();
        let mut element = element("a", true);
        element.color = "not-a-colour".to_string();

        let record = bridge.export_one(&element);
        assert_eq!(record["color"], Value::Null);
        assert_eq!(record["id"], json!("a"));

        bridge.update_config(BridgeConfigUpdate {
            output: Some(FieldMapping::from_pairs([("color", "color")]).expect("should compile")),
            ..BridgeConfigUpdate::default()
        });
        assert_eq!(bridge.export_one(&element)["color"], json!("not-a-colour"));
    }

    #[test]
    fn test_custom_output_sees_batch() {
        let mut config = BridgeConfig::default();
        config
            .output
            .insert_fn("position", |e, ctx| json!(format!("{}:{}/{}", e.id, ctx.index, ctx.batch.len())))
            .expect("should compile");
        config.output.insert("index", "elementIndex(id)").expect("should compile");

        let records = DrawingBridge::new(config).export(&[
            element("a", true),
            element("skip", false),
            element("b", true),
        ]);
        assert_eq!(records[0]["position"], json!("a:0/2"));
        assert_eq!(records[1]["position"], json!("b:1/2"));
        assert_eq!(records[1]["index"], json!(1));
    }

    #[test]
    fn test_export_as_typed_records() {
        #[derive(Deserialize)]
        struct Line {
            id: String,
            coordinates: Vec<[i64; 2]>,
        }

        let lines: Vec<Line> = bridge()
            .export_as(&[element("a", true)])
            .expect("records should fit");
        assert_eq!(lines[0].id, "a");
        assert_eq!(lines[0].coordinates, vec![[10, 20], [100, 200]]);

        assert!(bridge().export_as::<Vec<u8>>(&[element("a", true)]).is_err());
    }

    #[test]
    fn test_import_single_tags_saved() {
        let item = bridge().import_single(&json!({"id": "x"}));
        assert_eq!(item["syncState"], json!("saved"));
        assert_eq!(item["id"], json!("x"));
        assert!(item.get("info").is_none());
    }

    #[test]
    fn test_partial_group_discarded() {
        let mut config = BridgeConfig::default();
        config.input.elements =
            ReverseFieldMapping::from_pairs([("name", "info.name"), ("font_size", "info.fontSize")])
                .expect("should compile");
        let bridge = DrawingBridge::new(config.clone());

        let item = bridge.import_single(&json!({"name": "Gate"}));
        assert!(item.get("info").is_none());

        let item = bridge.import_single(&json!({"name": "Gate", "font_size": 12}));
        assert_eq!(item["info"], json!({"name": "Gate", "fontSize": 12}));

        config.options.drop_partial_groups = false;
        let item = DrawingBridge::new(config).import_single(&json!({"name": "Gate"}));
        assert_eq!(item["info"], json!({"name": "Gate"}));
    }

    #[test]
    fn test_partial_group_discards_every_ancestor() {
        let mut config = BridgeConfig::default();
        config.input.elements = ReverseFieldMapping::from_pairs([
            ("id", "id"),
            ("name", "info.name"),
            ("fs", "info.style.fontSize"),
        ])
        .expect("should compile");
        let bridge = DrawingBridge::new(config);

        let item = bridge.import_single(&json!({"id": "x", "name": "Gate"}));
        assert_eq!(item, json!({"id": "x", "syncState": "saved"}));

        let item = bridge.import_single(&json!({"id": "x", "name": "Gate", "fs": 9}));
        assert_eq!(item["info"], json!({"name": "Gate", "style": {"fontSize": 9}}));
    }

    #[test]
    fn test_custom_destination_overrides_named_transform() {
        let mut config = BridgeConfig::default();
        config
            .input
            .elements
            .insert_custom("upperCase(label)", "info.name", |v| {
                json!(format!("custom {}", v.as_str().unwrap_or_default()))
            })
            .expect("should compile");

        let item = DrawingBridge::new(config).import_single(&json!({"label": "Gate"}));
        assert_eq!(item["info"]["name"], json!("custom Gate"));
    }

    #[test]
    fn test_missing_source_writes_nothing() {
        let mut config = BridgeConfig::default();
        config.input.elements = ReverseFieldMapping::from_pairs([("rgb(color)", "color")])
            .expect("should compile");
        let item = DrawingBridge::new(config).import_single(&json!({}));
        assert!(item.get("color").is_none());
    }

    fn layer_only_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.input.layers = ReverseFieldMapping::from_pairs([
            ("layer.id", "id"),
            ("layer.name", "name"),
            ("layer.visibility", "visibility"),
            ("float(layer.opacity)", "opacity"),
            ("time(layer.created_at)", "createdAt"),
            ("time(layer.updated_at)", "updatedAt"),
        ])
        .expect("should compile");
        config
    }

    #[test]
    fn test_rejected_timestamp_drops_layer() {
        let mut config = layer_only_config();
        config.options.timestamp_policy = crate::transform::TimestampPolicy::Reject;
        let record = json!({"layer": {
            "id": "l1", "name": "L", "visibility": "visible", "opacity": 1,
            "created_at": "soon", "updated_at": 5
        }});

        let result = DrawingBridge::new(config.clone()).import(&[record.clone()]);
        assert!(result.layers.is_empty());
        assert_eq!(result.report.invalid_layers, 1);

        config.options.fill_layer_defaults = true;
        let before = clock::now_millis();
        let result = DrawingBridge::new(config).import(&[record]);
        let layer = result.layers.get("l1").expect("defaults should fill createdAt");
        assert!(layer.created_at >= before);
        assert_eq!(layer.updated_at, 5);
    }

    #[test]
    fn test_layer_missing_fields_is_rejected() {
        let record = json!({"layer": {"id": "l1", "name": "L"}});

        let result = DrawingBridge::new(layer_only_config()).import(&[record.clone()]);
        assert!(result.layers.is_empty());
        assert_eq!(result.report.invalid_layers, 1);

        let mut config = layer_only_config();
        config.options.fill_layer_defaults = true;
        let result = DrawingBridge::new(config).import(&[record]);
        let layer = result.layers.get("l1").expect("defaults should make the layer valid");
        assert_eq!(layer.visibility, LayerVisibility::Visible);
        assert_eq!(layer.opacity, 1.0);
    }

    #[test]
    fn test_layer_fields_are_taken_as_mapped() {
        let record = json!({"layer": {
            "id": "l1", "name": "L", "visibility": "locked", "opacity": "0.4",
            "created_at": 10, "updated_at": "1970-01-01T00:00:00.020Z"
        }});

        let result = DrawingBridge::new(layer_only_config()).import(&[record]);
        let layer = result.layers.get("l1").expect("layer should be kept");
        assert_eq!(layer.visibility, LayerVisibility::Locked);
        assert_eq!(layer.opacity, 0.4);
        assert_eq!((layer.created_at, layer.updated_at), (10, 20));
        assert_eq!(layer.z_index, 0);
    }

    #[test]
    fn test_get_config_is_a_copy() {
        let bridge = bridge();
        let mut copy = bridge.get_config();
        copy.output = FieldMapping::new();
        assert!(!bridge.config().output.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let bridge = bridge();
        let result = bridge.import(&[]);
        assert!(result.elements.is_empty());
        assert!(result.layers.is_empty());
        assert_eq!(result.report, ImportReport::default());
        assert!(bridge.export(&[]).is_empty());
    }
}
