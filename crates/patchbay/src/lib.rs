#![deny(clippy::all)]

mod remote;

use std::sync::Arc;

use crossbeam_channel::Receiver;
use napi::Result;
use napi_derive::napi;
use patchbay_core::{
  CableEvent, CableSpec, NodeId, NodeSpec, ParamInfo, PatchError, Preset, PresetDetail, PresetId,
  Scene, SceneConfig, SceneEvent,
};
use serde::Serialize;

use crate::remote::{CommandQueue, RemoteUnit, UnitCommand};

/// Parameter description passed when a unit is created on the JS side.
#[napi(object)]
#[derive(Debug, Clone)]
pub struct ParamInit {
  pub id: String,
  pub min: f64,
  pub max: f64,
  pub value: f64,
}

impl From<ParamInit> for ParamInfo {
  fn from(p: ParamInit) -> Self {
    ParamInfo {
      id: p.id,
      min: p.min,
      max: p.max,
      value: p.value,
    }
  }
}

fn patch_err(e: PatchError) -> napi::Error {
  napi::Error::from_reason(e.to_string())
}

fn from_json<T: serde::de::DeserializeOwned>(what: &str, value: serde_json::Value) -> Result<T> {
  serde_json::from_value(value)
    .map_err(|e| napi::Error::from_reason(format!("Invalid {}: {}", what, e)))
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
  serde_json::to_value(value).map_err(|e| napi::Error::from_reason(e.to_string()))
}

/// One patch session as seen by the UI.
///
/// Structural calls only update the abstract graph. Call `flush` once per
/// UI tick, then `takeCommands` to get the audio-node operations to apply.
#[napi(js_name = "PatchScene")]
pub struct PatchScene {
  scene: Scene,
  commands: CommandQueue,
  events: Receiver<SceneEvent>,
}

#[napi]
impl PatchScene {
  #[napi(constructor)]
  pub fn new(config: Option<serde_json::Value>) -> Result<Self> {
    let config: SceneConfig = match config {
      Some(value) => from_json("scene config", value)?,
      None => SceneConfig::default(),
    };
    let mut scene = Scene::new(config);
    let events = scene.subscribe();
    Ok(Self {
      scene,
      commands: CommandQueue::default(),
      events,
    })
  }

  /// Add a window. Takes a `NodeSpec` object and returns the node id.
  #[napi]
  pub fn add_node(&mut self, spec: serde_json::Value) -> Result<String> {
    let spec: NodeSpec = from_json("node spec", spec)?;
    let id = self.scene.add_node(spec).map_err(patch_err)?;
    Ok(id.to_string())
  }

  #[napi]
  pub fn mount(&mut self, node_id: String) -> Result<()> {
    self.scene.mount(&NodeId::from(node_id)).map_err(patch_err)
  }

  #[napi]
  pub fn unmount(&mut self, node_id: String) -> Result<()> {
    self.scene.unmount(&NodeId::from(node_id)).map_err(patch_err)
  }

  /// Install the unit for a window once the UI has created its audio node.
  /// `handle` is whatever the UI uses to find that audio node again.
  #[napi]
  pub fn init_unit(
    &mut self,
    node_id: String,
    handle: String,
    params: Option<Vec<ParamInit>>,
  ) -> Result<()> {
    let params = params
      .unwrap_or_default()
      .into_iter()
      .map(ParamInfo::from)
      .collect();
    let unit = RemoteUnit::new(handle, params, &self.commands);
    self
      .scene
      .set_unit(&NodeId::from(node_id), Arc::new(unit))
      .map_err(patch_err)?;
    Ok(())
  }

  /// Draw a cable. Returns its id; a random one is used when `cable_id` is
  /// not given.
  #[napi]
  pub fn connect(
    &mut self,
    source: String,
    dest: String,
    kind: String,
    cable_id: Option<String>,
  ) -> Result<String> {
    let kind = from_json("signal kind", serde_json::Value::String(kind))?;
    let mut spec = CableSpec::new(source, dest, kind);
    spec.id = cable_id.map(Into::into);
    let id = self.scene.connect(spec).map_err(patch_err)?;
    Ok(id.to_string())
  }

  /// Returns false when the cable was already gone.
  #[napi]
  pub fn disconnect(&mut self, cable_id: String) -> bool {
    self.scene.disconnect(&cable_id.into()).is_some()
  }

  /// "Disconnect All" from a plug's context menu.
  #[napi]
  pub fn disconnect_plug(&mut self, plug_id: String) -> Result<Vec<String>> {
    let removed = self
      .scene
      .disconnect_plug(&plug_id.into())
      .map_err(patch_err)?;
    Ok(removed.into_iter().map(|c| c.to_string()).collect())
  }

  /// Apply a `{ type: "connect" | "disconnect", ... }` cable event.
  #[napi]
  pub fn apply_cable_event(&mut self, event: serde_json::Value) -> Result<()> {
    let event: CableEvent = from_json("cable event", event)?;
    self.scene.apply(event).map_err(patch_err)
  }

  /// Send a window to the trash.
  #[napi]
  pub fn destroy(&mut self, node_id: String) -> Result<serde_json::Value> {
    let report = self
      .scene
      .destroy(&NodeId::from(node_id))
      .map_err(patch_err)?;
    to_json(&report)
  }

  #[napi]
  pub fn flush(&mut self) -> Result<serde_json::Value> {
    let report = self.scene.flush();
    to_json(&report)
  }

  /// Drain the audio-node operations queued since the last call.
  #[napi]
  pub fn take_commands(&self) -> Vec<UnitCommand> {
    std::mem::take(&mut *self.commands.lock())
  }

  /// Drain scene events raised since the last call.
  #[napi]
  pub fn take_events(&self) -> Result<Vec<serde_json::Value>> {
    self.events.try_iter().map(|e| to_json(&e)).collect()
  }

  #[napi]
  pub fn knobs(&self, node_id: String) -> Result<serde_json::Value> {
    let id = NodeId::from(node_id);
    let node = self
      .scene
      .node(&id)
      .ok_or_else(|| patch_err(PatchError::UnknownNode(id.clone())))?;
    to_json(&node.knobs())
  }

  /// Returns the value actually set after clamping.
  #[napi]
  pub fn set_knob(&mut self, node_id: String, param: String, value: f64) -> Result<f64> {
    self
      .scene
      .set_knob(&NodeId::from(node_id), &param, value)
      .map_err(patch_err)
  }

  #[napi]
  pub fn presets(&self, node_id: String) -> Result<serde_json::Value> {
    let id = NodeId::from(node_id);
    let node = self
      .scene
      .node(&id)
      .ok_or_else(|| patch_err(PatchError::UnknownNode(id.clone())))?;
    to_json(&node.presets().presets())
  }

  /// Replace the node's preset list with the presets bar's.
  #[napi]
  pub fn pull_presets(&mut self, node_id: String, presets: serde_json::Value) -> Result<()> {
    let presets: Vec<Preset> = from_json("presets", presets)?;
    self
      .scene
      .presets_mut(&NodeId::from(node_id))
      .map_err(patch_err)?
      .pull_presets(presets);
    Ok(())
  }

  /// Select a preset and return its stored detail, if any.
  #[napi]
  pub fn select_preset(
    &mut self,
    node_id: String,
    preset_id: String,
  ) -> Result<Option<serde_json::Value>> {
    let bridge = self
      .scene
      .presets_mut(&NodeId::from(node_id))
      .map_err(patch_err)?;
    let detail = bridge
      .select(&PresetId::from(preset_id))
      .map_err(patch_err)?;
    detail.map(to_json).transpose()
  }

  /// Record an edited detail. Returns the detail to write back to the
  /// presets bar, or null when there is nothing to commit.
  #[napi]
  pub fn edit_preset(
    &mut self,
    node_id: String,
    detail: serde_json::Value,
  ) -> Result<Option<serde_json::Value>> {
    let detail: PresetDetail = from_json("preset detail", detail)?;
    let update = self
      .scene
      .presets_mut(&NodeId::from(node_id))
      .map_err(patch_err)?
      .edit_detail(detail);
    update.as_ref().map(to_json).transpose()
  }

  #[napi]
  pub fn apply_preset(&mut self, node_id: String) -> Result<u32> {
    let applied = self
      .scene
      .apply_preset(&NodeId::from(node_id))
      .map_err(patch_err)?;
    Ok(applied as u32)
  }

  /// Cables with an end on the window, for redrawing after a move.
  #[napi]
  pub fn cables(&self, node_id: String) -> Result<serde_json::Value> {
    to_json(&self.scene.cables_of(&NodeId::from(node_id)))
  }

  #[napi]
  pub fn live_connections(&self) -> Result<serde_json::Value> {
    to_json(&self.scene.live_connections())
  }

  #[napi]
  pub fn pending_cables(&self) -> Vec<String> {
    self
      .scene
      .pending_cables()
      .into_iter()
      .map(|c| c.to_string())
      .collect()
  }
}

#[napi]
pub fn get_script_schema() -> Result<serde_json::Value> {
  to_json(&schemars::schema_for!(patchbay_core::script::ScriptCommand))
}
