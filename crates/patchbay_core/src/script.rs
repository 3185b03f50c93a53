//! JSON-lines patch scripts.
//!
//! A script is a sequence of UI actions, one JSON object per line, tagged by
//! `op`:
//!
//! ```text
//! {"op": "addNode", "id": "osc", "kind": "oscillator", "outputs": [{"id": "osc.out", "kind": "audio"}]}
//! {"op": "mount", "node": "osc"}
//! {"op": "tick"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Scripts are replayed
//! against [`RecordingUnit`]s, so every physical call ends up in a [`UnitLog`].

use patchbay_derive::EnumTag;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cable::CableSpec;
use crate::config::SceneConfig;
use crate::error::{PatchError, PatchResult};
use crate::events::Link;
use crate::node::NodeSpec;
use crate::params::PresetDetail;
use crate::plug::PlugSpec;
use crate::scene::{DestroyReport, FlushReport, Scene};
use crate::types::{CableId, NodeId, PlugId, SignalKind};
use crate::unit::{ParamInfo, RecordingUnit, UnitLog};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, EnumTag)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ScriptCommand {
    AddNode {
        id: NodeId,
        kind: String,
        #[serde(default)]
        inputs: Vec<PlugSpec>,
        #[serde(default)]
        outputs: Vec<PlugSpec>,
    },
    Mount {
        node: NodeId,
    },
    Unmount {
        node: NodeId,
    },
    /// Install a fresh recording unit. Installing again replaces the unit.
    InitUnit {
        node: NodeId,
        #[serde(default)]
        params: Vec<ParamInfo>,
        #[serde(default)]
        fail_connect: bool,
        #[serde(default)]
        fail_disconnect: bool,
    },
    Connect {
        cable: CableId,
        source: PlugId,
        dest: PlugId,
        kind: SignalKind,
    },
    Disconnect {
        cable: CableId,
    },
    DisconnectPlug {
        plug: PlugId,
    },
    Destroy {
        node: NodeId,
    },
    SetKnob {
        node: NodeId,
        param: String,
        value: f64,
    },
    /// Select the node's preset at `index` in its presets bar.
    SelectPreset {
        node: NodeId,
        index: usize,
    },
    EditPreset {
        node: NodeId,
        detail: PresetDetail,
    },
    ApplyPreset {
        node: NodeId,
    },
    /// Run every pending reconciliation.
    Tick,
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line} ({op}): {source}")]
    Patch {
        line: usize,
        op: ScriptCommandTag,
        #[source]
        source: PatchError,
    },
}

/// A parsed command and the 1-based line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    pub line: usize,
    pub command: ScriptCommand,
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptLine>, ScriptError> {
    let mut lines = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let command = serde_json::from_str(trimmed).map_err(|source| ScriptError::Parse {
            line: index + 1,
            source,
        })?;
        lines.push(ScriptLine {
            line: index + 1,
            command,
        });
    }
    Ok(lines)
}

/// What a single command produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StepOutcome {
    Done,
    Node { node: NodeId },
    Cable { cable: CableId },
    Removed { cables: Vec<CableId> },
    Destroyed(DestroyReport),
    Knob { value: f64 },
    Preset { applied: usize },
    Flushed(FlushReport),
}

/// A live/expected mismatch found by [`audit`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Violation {
    #[error("cable {0} should be connected but is not")]
    Missing(Link),

    #[error("cable {0} is connected but should not be")]
    Unexpected(Link),

    #[error("cable {0} has more than one physical connection")]
    Duplicate(CableId),

    #[error("cable {cable} is not attached to plug {plug}")]
    Detached { cable: CableId, plug: PlugId },
}

/// Compare the live physical connections against the resolved cable image.
///
/// Meaningful right after a flush; between flushes the live set legitimately
/// lags behind.
pub fn audit(scene: &Scene) -> Vec<Violation> {
    let mut violations = Vec::new();
    let live = scene.live_connections();
    let expected = scene.expected_connections();

    for pair in live.windows(2) {
        if pair[0].cable == pair[1].cable {
            violations.push(Violation::Duplicate(pair[0].cable.clone()));
        }
    }
    for link in &expected {
        if !live.contains(link) {
            violations.push(Violation::Missing(link.clone()));
        }
    }
    for link in &live {
        if !expected.contains(link) {
            violations.push(Violation::Unexpected(link.clone()));
        }
    }
    for cable in scene.cables() {
        for plug in [&cable.source, &cable.dest] {
            if !scene.plug(plug).is_some_and(|p| p.has_cable(&cable.id)) {
                violations.push(Violation::Detached {
                    cable: cable.id.clone(),
                    plug: plug.clone(),
                });
            }
        }
    }
    violations
}

/// Replays commands against a scene whose units are [`RecordingUnit`]s.
pub struct ScriptRunner {
    scene: Scene,
    log: UnitLog,
}

impl ScriptRunner {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            scene: Scene::new(config),
            log: UnitLog::new(),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn log(&self) -> &UnitLog {
        &self.log
    }

    pub fn run(&mut self, line: &ScriptLine) -> Result<StepOutcome, ScriptError> {
        self.step(line.command.clone())
            .map_err(|source| ScriptError::Patch {
                line: line.line,
                op: line.command.tag(),
                source,
            })
    }

    pub fn step(&mut self, command: ScriptCommand) -> PatchResult<StepOutcome> {
        let scene = &mut self.scene;
        let outcome = match command {
            ScriptCommand::AddNode {
                id,
                kind,
                inputs,
                outputs,
            } => {
                let node = scene.add_node(NodeSpec {
                    id: Some(id),
                    kind,
                    inputs,
                    outputs,
                })?;
                StepOutcome::Node { node }
            }
            ScriptCommand::Mount { node } => {
                scene.mount(&node)?;
                StepOutcome::Done
            }
            ScriptCommand::Unmount { node } => {
                scene.unmount(&node)?;
                StepOutcome::Done
            }
            ScriptCommand::InitUnit {
                node,
                params,
                fail_connect,
                fail_disconnect,
            } => {
                let mut unit = RecordingUnit::new(node.as_str(), &self.log).with_params(params);
                if fail_connect {
                    unit = unit.failing_connect();
                }
                if fail_disconnect {
                    unit = unit.failing_disconnect();
                }
                scene.set_unit(&node, unit.shared())?;
                StepOutcome::Node { node }
            }
            ScriptCommand::Connect {
                cable,
                source,
                dest,
                kind,
            } => {
                let cable = scene.connect(CableSpec::new(source, dest, kind).with_id(cable))?;
                StepOutcome::Cable { cable }
            }
            ScriptCommand::Disconnect { cable } => {
                let cables = scene.disconnect(&cable).map(|c| c.id).into_iter().collect();
                StepOutcome::Removed { cables }
            }
            ScriptCommand::DisconnectPlug { plug } => StepOutcome::Removed {
                cables: scene.disconnect_plug(&plug)?,
            },
            ScriptCommand::Destroy { node } => StepOutcome::Destroyed(scene.destroy(&node)?),
            ScriptCommand::SetKnob { node, param, value } => StepOutcome::Knob {
                value: scene.set_knob(&node, &param, value)?,
            },
            ScriptCommand::SelectPreset { node, index } => {
                let presets = scene.presets_mut(&node)?;
                let id = presets
                    .presets()
                    .get(index)
                    .map(|p| p.id.clone())
                    .ok_or_else(|| PatchError::UnknownPreset(format!("#{}", index).into()))?;
                presets.select(&id)?;
                StepOutcome::Done
            }
            ScriptCommand::EditPreset { node, detail } => {
                scene.presets_mut(&node)?.edit_detail(detail);
                StepOutcome::Done
            }
            ScriptCommand::ApplyPreset { node } => StepOutcome::Preset {
                applied: scene.apply_preset(&node)?,
            },
            ScriptCommand::Tick => StepOutcome::Flushed(scene.flush()),
        };
        Ok(outcome)
    }
}
