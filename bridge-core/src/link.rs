//! Post-import linking of elements to their owning layers.

use serde::{Deserialize, Serialize};

use crate::element::DrawingElement;
use crate::layer::LayerMap;

/// Outcome of a linking pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSummary {
    /// Element ids newly appended to a layer.
    pub linked: usize,
    /// Elements whose layer does not exist.
    pub orphaned: usize,
}

/// Append each element's id to the layer it names.
///
/// Only call this with elements that already passed validation: a layer's
/// `element_ids` must never reference an element that was dropped. Elements
/// naming a missing layer are left orphaned and reported.
pub fn link_elements(
    elements: &[DrawingElement],
    layers: &mut LayerMap,
    timestamp: i64,
) -> LinkSummary {
    let mut summary = LinkSummary::default();
    for element in elements {
        let Some(layer_id) = element.layer_id.as_deref().filter(|id| !id.is_empty()) else {
            continue;
        };
        match layers.get_mut(layer_id) {
            Some(layer) => {
                if layer.link_element(&element.id, timestamp) {
                    summary.linked += 1;
                }
            }
            None => {
                tracing::warn!(
                    "Element {} references missing layer {layer_id}, leaving it unlinked",
                    element.id
                );
                summary.orphaned += 1;
            }
        }
    }
    summary
}
