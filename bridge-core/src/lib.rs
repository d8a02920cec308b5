//! # Drawing Bridge Core
//!
//! Converts vector annotations between the drawing engine's element model and
//! arbitrary backend record shapes, driven by declarative mapping tables.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   bridge-core                    │
//! ├──────────────────────────────────────────────────┤
//! │  Bridge            │  Config                     │
//! │  - Export pipeline │  - Output / input tables    │
//! │  - Import pipeline │  - Line-storage preset      │
//! │  - Layer linking   │  - JSON form                │
//! ├──────────────────────────────────────────────────┤
//! │  Mapping grammar   │  Transforms                 │
//! │  - Paths           │  - Forward (export)         │
//! │  - Calls / pairs   │  - Reverse (import)         │
//! ├──────────────────────────────────────────────────┤
//! │  Model: elements, layers  │  Validation          │
//! └──────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod clock;
pub mod config;
pub mod element;
pub mod error;
pub mod layer;
pub mod link;
pub mod mapping;
pub mod path;
pub mod transform;
pub mod validate;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use bridge::{DrawingBridge, ImportReport, ImportResult};
pub use config::{
    BridgeConfig, BridgeConfigUpdate, BridgeOptions, Destination, ExportContext, FieldMapping,
    InputMappings, InputRule, OutputMapping, OutputRule, RawBridgeConfig, RawInputMappings,
    ReverseFieldMapping,
};
pub use element::{
    Detection, Direction, DrawingElement, ElementInfo, ElementType, Point, SyncState,
};
pub use error::{BridgeError, BridgeResult};
pub use layer::{LayerInfo, LayerMap, LayerVisibility};
pub use link::{link_elements, LinkSummary};
pub use mapping::{FieldPath, Mapping, SourceMapping};
pub use transform::{ReverseTransform, TimestampPolicy, Transform, TransformContext};
pub use validate::{validate_element, validate_layer, ValidationError};

/// Bridge core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
