use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::params::{Knob, PresetBridge};
use crate::plug::PlugSpec;
use crate::types::{NodeId, PlugId, UnitKey};
use crate::unit::SharedUnit;

/// How the UI describes a new window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    #[serde(default)]
    pub id: Option<NodeId>,
    /// The kind of machine the window hosts, e.g. "oscillator".
    pub kind: String,
    #[serde(default)]
    pub inputs: Vec<PlugSpec>,
    #[serde(default)]
    pub outputs: Vec<PlugSpec>,
}

impl NodeSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn input(mut self, plug: PlugSpec) -> Self {
        self.inputs.push(plug);
        self
    }

    pub fn output(mut self, plug: PlugSpec) -> Self {
        self.outputs.push(plug);
        self
    }
}

#[derive(Clone)]
pub(crate) struct UnitSlot {
    pub key: UnitKey,
    pub unit: SharedUnit,
}

/// A window item: one processing unit plus its plugs and controls.
///
/// The node owns its plugs and its unit. Cables are not owned by either end;
/// they live in the scene and are found through the plugs.
pub struct Node {
    id: NodeId,
    kind: String,
    inputs: Vec<PlugId>,
    outputs: Vec<PlugId>,
    unit: Option<UnitSlot>,
    mounted: bool,
    pub(crate) knobs: Vec<Knob>,
    pub(crate) presets: PresetBridge,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        kind: String,
        inputs: Vec<PlugId>,
        outputs: Vec<PlugId>,
        presets: PresetBridge,
    ) -> Self {
        Self {
            id,
            kind,
            inputs,
            outputs,
            unit: None,
            mounted: false,
            knobs: Vec::new(),
            presets,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn inputs(&self) -> &[PlugId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PlugId] {
        &self.outputs
    }

    /// Inputs first, then outputs.
    pub fn plugs(&self) -> impl Iterator<Item = &PlugId> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub fn input_index(&self, plug: &PlugId) -> Option<u32> {
        self.inputs.iter().position(|p| p == plug).map(|i| i as u32)
    }

    pub fn output_index(&self, plug: &PlugId) -> Option<u32> {
        self.outputs.iter().position(|p| p == plug).map(|i| i as u32)
    }

    pub fn unit(&self) -> Option<&SharedUnit> {
        self.unit.as_ref().map(|slot| &slot.unit)
    }

    pub fn unit_key(&self) -> Option<UnitKey> {
        self.unit.as_ref().map(|slot| slot.key)
    }

    pub(crate) fn unit_slot(&self) -> Option<&UnitSlot> {
        self.unit.as_ref()
    }

    pub(crate) fn install_unit(&mut self, slot: UnitSlot) -> Option<UnitSlot> {
        self.unit.replace(slot)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub(crate) fn set_mounted(&mut self, mounted: bool) {
        self.mounted = mounted;
    }

    pub fn knobs(&self) -> &[Knob] {
        &self.knobs
    }

    pub fn knob(&self, id: &str) -> Option<&Knob> {
        self.knobs.iter().find(|k| k.id == id)
    }

    pub fn presets(&self) -> &PresetBridge {
        &self.presets
    }

    pub fn presets_mut(&mut self) -> &mut PresetBridge {
        &mut self.presets
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("unit", &self.unit_key())
            .field("mounted", &self.mounted)
            .finish()
    }
}
