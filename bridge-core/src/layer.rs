//! Layers - named, ordered groupings of elements.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a layer is shown and whether it can be edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerVisibility {
    /// Drawn and editable.
    #[default]
    Visible,
    /// Not drawn.
    Hidden,
    /// Drawn but not editable.
    Locked,
}

impl LayerVisibility {
    /// Wire names accepted for a layer's visibility.
    pub const NAMES: [&'static str; 3] = ["visible", "hidden", "locked"];
}

/// A layer as handed to the layer manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerInfo {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Category tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Visibility state.
    #[serde(default)]
    pub visibility: LayerVisibility,
    /// Opacity (0..1).
    pub opacity: f64,
    /// Stacking position.
    pub z_index: i64,
    /// Ids of the elements on this layer, in link order.
    #[serde(default)]
    pub element_ids: Vec<String>,
    /// Display colour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Creation time (ms since epoch).
    pub created_at: i64,
    /// Last modification time (ms since epoch).
    pub updated_at: i64,
}

impl LayerInfo {
    /// Append an element id unless it is already present.
    ///
    /// Returns `true` if the id was added.
    pub fn link_element(&mut self, element_id: &str, timestamp: i64) -> bool {
        if self.element_ids.iter().any(|id| id == element_id) {
            return false;
        }
        self.element_ids.push(element_id.to_string());
        self.updated_at = timestamp;
        true
    }
}

/// Layers keyed by id, iterated in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerMap {
    /// All layers, indexed by id.
    layers: HashMap<String, LayerInfo>,
    /// Ids in insertion order.
    order: Vec<String>,
}

impl LayerMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a layer unless its id is already present.
    ///
    /// Returns `false` (and drops `layer`) when the id is taken.
    pub fn insert_first(&mut self, layer: LayerInfo) -> bool {
        if self.layers.contains_key(&layer.id) {
            return false;
        }
        self.order.push(layer.id.clone());
        self.layers.insert(layer.id.clone(), layer);
        true
    }

    /// Get a layer by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&LayerInfo> {
        self.layers.get(id)
    }

    /// Get a mutable reference to a layer by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut LayerInfo> {
        self.layers.get_mut(id)
    }

    /// Check whether a layer id is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.layers.contains_key(id)
    }

    /// Iterate layers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &LayerInfo> {
        self.order.iter().filter_map(|id| self.layers.get(id))
    }

    /// Layer ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Check if there are no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Consume the map, yielding layers in insertion order.
    #[must_use]
    pub fn into_vec(mut self) -> Vec<LayerInfo> {
        self.order
            .iter()
            .filter_map(|id| self.layers.remove(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(id: &str, name: &str) -> LayerInfo {
        LayerInfo {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            category: None,
            visibility: LayerVisibility::Visible,
            opacity: 1.0,
            z_index: 0,
            element_ids: Vec::new(),
            color: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn test_insert_first_wins() {
        let mut map = LayerMap::new();
        assert!(map.insert_first(layer("a", "first")));
        assert!(!map.insert_first(layer("a", "second")));

        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a").map(|l| l.name.as_str()), Some("first"));
    }

    #[test]
    fn test_iteration_keeps_insertion_order() {
        let mut map = LayerMap::new();
        map.insert_first(layer("z", "Z"));
        map.insert_first(layer("a", "A"));
        map.insert_first(layer("m", "M"));

        let ids: Vec<_> = map.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);

        assert!(map.contains("a"));

        let names: Vec<_> = map.into_vec().into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Z", "A", "M"]);
    }

    #[test]
    fn test_link_element_is_idempotent() {
        let mut layer = layer("a", "A");
        assert!(layer.link_element("el-1", 50));
        assert!(!layer.link_element("el-1", 60));

        assert_eq!(layer.element_ids, vec!["el-1"]);
        assert_eq!(layer.updated_at, 50);
    }

    #[test]
    fn test_visibility_wire_names() {
        let json = serde_json::to_string(&LayerVisibility::Locked).expect("should serialize");
        assert_eq!(json, "\"locked\"");
        assert!(LayerVisibility::NAMES.contains(&"hidden"));
    }
}
