//! Patch-bay core library
//!
//! This crate keeps the abstract cable graph of a modular workstation UI in
//! sync with the live graph of processing units behind its windows. It is a
//! pure library with no I/O; hosts (the Node-API binding, the CLI) feed it UI
//! actions and drain the physical calls it makes.

extern crate parking_lot;
extern crate serde;
extern crate serde_json;

pub mod cable;
pub mod config;
pub mod effect;
pub mod error;
pub mod events;
pub mod node;
pub mod params;
pub mod plug;
pub mod registry;
pub mod scene;
pub mod script;
mod sync;
pub mod types;
pub mod unit;

// Re-export commonly used items
pub use cable::{Cable, CableSpec};
pub use config::SceneConfig;
pub use error::{PatchError, PatchResult, UnitError};
pub use events::{CableEvent, Link, SceneEvent, SceneEventTag};
pub use node::{Node, NodeSpec};
pub use params::{Knob, Preset, PresetBridge, PresetDetail};
pub use plug::{Plug, PlugSpec};
pub use scene::{DestroyReport, FlushReport, Scene};
pub use types::{CableId, Direction, NodeId, PlugId, PresetId, SignalKind, UnitKey};
pub use unit::{ParamInfo, ProcessingUnit, RecordingUnit, Route, SharedUnit, UnitCall, UnitLog};
