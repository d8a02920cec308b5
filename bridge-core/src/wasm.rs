//! WebAssembly bindings for bridge-core.
//!
//! Everything crosses the boundary as JSON strings.

use serde_json::{json, Value};
use wasm_bindgen::prelude::*;

use crate::{BridgeConfig, DrawingBridge, DrawingElement, RawBridgeConfig};

/// Initialize the bridge WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Bridge instance for WASM.
#[wasm_bindgen]
pub struct WasmBridge {
    bridge: DrawingBridge,
}

#[wasm_bindgen]
impl WasmBridge {
    /// Create a bridge from a JSON config. An empty string selects the
    /// line-storage preset.
    ///
    /// # Errors
    ///
    /// Returns an error string if the config does not parse or compile.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<WasmBridge, String> {
        let config = if config_json.trim().is_empty() {
            BridgeConfig::line_storage()
        } else {
            BridgeConfig::from_json(config_json)
        }
        .map_err(|e| e.to_string())?;
        Ok(Self {
            bridge: DrawingBridge::new(config),
        })
    }

    /// Export a JSON array of elements to a JSON array of records.
    ///
    /// # Errors
    ///
    /// Returns an error string if the input is not an array of elements.
    #[wasm_bindgen(js_name = exportJson)]
    pub fn export_json(&self, elements_json: &str) -> Result<String, String> {
        let elements: Vec<DrawingElement> =
            serde_json::from_str(elements_json).map_err(|e| e.to_string())?;
        serde_json::to_string(&self.bridge.export(&elements)).map_err(|e| e.to_string())
    }

    /// Import a JSON array of records. Returns
    /// `{"elements": [...], "layers": [...], "report": {...}}`.
    ///
    /// # Errors
    ///
    /// Returns an error string if the input is not a JSON array.
    #[wasm_bindgen(js_name = importJson)]
    pub fn import_json(&self, records_json: &str) -> Result<String, String> {
        let records: Vec<Value> = serde_json::from_str(records_json).map_err(|e| e.to_string())?;
        let result = self.bridge.import(&records);
        let payload = json!({
            "elements": result.elements,
            "layers": result.layers.into_vec(),
            "report": result.report,
        });
        serde_json::to_string(&payload).map_err(|e| e.to_string())
    }

    /// Merge a partial JSON config into the live one.
    ///
    /// # Errors
    ///
    /// Returns an error string if the update does not parse or compile.
    #[wasm_bindgen(js_name = updateConfigJson)]
    pub fn update_config_json(&mut self, update_json: &str) -> Result<(), String> {
        let raw: RawBridgeConfig = serde_json::from_str(update_json).map_err(|e| e.to_string())?;
        let update = raw.into_update().map_err(|e| e.to_string())?;
        self.bridge.update_config(update);
        Ok(())
    }

    /// Get the current config as JSON. Function-valued entries are omitted.
    #[wasm_bindgen(js_name = getConfigJson)]
    #[must_use]
    pub fn get_config_json(&self) -> String {
        serde_json::to_string(&self.bridge.config().to_raw()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasm_bridge_empty_config_uses_preset() {
        let bridge = WasmBridge::new("").expect("preset should compile");
        assert!(bridge.get_config_json().contains("coordinates"));
    }

    #[test]
    fn wasm_bridge_rejects_unknown_transform() {
        let err = WasmBridge::new(r#"{"output": {"x": "sparkle(color)"}}"#)
            .err()
            .expect("unknown transform should fail");
        assert!(err.contains("sparkle"));
    }

    #[test]
    fn export_json_round_trips_through_import_json() {
        let bridge = WasmBridge::new("").expect("preset should compile");
        let elements = r##"[{"id":"e1","type":"line","points":[{"x":1,"y":2},{"x":3,"y":4}],"color":"#ff0000","completed":true,"layerId":"l1","info":{"name":"Gate","type":"counter","distance":5,"fontSize":14,"fontFamily":"Arial","backgroundOpacity":0.5}}]"##;

        let records = bridge.export_json(elements).expect("export should succeed");
        let records: Value = serde_json::from_str(&records).expect("records should be JSON");
        let mut record = records[0].clone();
        record["layer"] = json!({
            "id": "l1",
            "name": "Layer One",
            "visibility": "visible",
            "opacity": 1.0,
            "created_at": 1_000,
            "updated_at": 1_000
        });

        let imported = bridge
            .import_json(&Value::Array(vec![record]).to_string())
            .expect("import should succeed");
        let imported: Value = serde_json::from_str(&imported).expect("result should be JSON");
        assert_eq!(imported["elements"][0]["id"], json!("e1"));
        assert_eq!(imported["layers"][0]["elementIds"], json!(["e1"]));
    }

    #[test]
    fn update_config_json_merges() {
        let mut bridge = WasmBridge::new("").expect("preset should compile");
        bridge
            .update_config_json(r#"{"output": {"label": "upperCase(info.name)"}}"#)
            .expect("update should succeed");
        let config = bridge.get_config_json();
        assert!(config.contains("label"));
        assert!(config.contains("coordinates"));

        assert!(bridge.update_config_json("not json").is_err());
    }
}
