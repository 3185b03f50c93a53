use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{CableId, Direction, NodeId, PlugId, SignalKind};

/// How a node declares one of its plugs. A missing id gets a random one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlugSpec {
    #[serde(default)]
    pub id: Option<PlugId>,
    pub kind: SignalKind,
}

impl PlugSpec {
    pub fn new(id: impl Into<PlugId>, kind: SignalKind) -> Self {
        Self {
            id: Some(id.into()),
            kind,
        }
    }
}

/// A connection endpoint owned by exactly one node.
///
/// `cables` maps each attached cable to the plug at its other end. Only the
/// scene mutates it, and always on both endpoints at once.
#[derive(Debug, Clone, PartialEq)]
pub struct Plug {
    id: PlugId,
    direction: Direction,
    kind: SignalKind,
    owner: NodeId,
    cables: BTreeMap<CableId, PlugId>,
}

impl Plug {
    pub(crate) fn new(id: PlugId, direction: Direction, kind: SignalKind, owner: NodeId) -> Self {
        Self {
            id,
            direction,
            kind,
            owner,
            cables: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &PlugId {
        &self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn owner(&self) -> &NodeId {
        &self.owner
    }

    /// Attached cables with the plug at their far end, ordered by cable id.
    pub fn cables(&self) -> impl Iterator<Item = (&CableId, &PlugId)> {
        self.cables.iter()
    }

    pub fn cable_ids(&self) -> Vec<CableId> {
        self.cables.keys().cloned().collect()
    }

    pub fn has_cable(&self, cable: &CableId) -> bool {
        self.cables.contains_key(cable)
    }

    /// The cable already joining this plug to `far`, if any.
    pub fn cable_to(&self, far: &PlugId) -> Option<&CableId> {
        self.cables
            .iter()
            .find_map(|(cable, other)| (other == far).then_some(cable))
    }

    pub(crate) fn attach(&mut self, cable: CableId, far: PlugId) {
        self.cables.insert(cable, far);
    }

    pub(crate) fn detach(&mut self, cable: &CableId) -> Option<PlugId> {
        self.cables.remove(cable)
    }
}
