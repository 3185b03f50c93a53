//! Events into and out of a scene.
//!
//! [`CableEvent`] is what the UI sends when the user drags or removes a
//! cable. [`SceneEvent`] is what the scene reports back to subscribers.

use crossbeam_channel::{Receiver, Sender};
use patchbay_derive::EnumTag;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{CableId, NodeId, PlugId, SignalKind};

/// Structural cable mutation from direct user interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum CableEvent {
    Connect {
        cable: CableId,
        source: PlugId,
        dest: PlugId,
        kind: SignalKind,
    },
    Disconnect {
        cable: CableId,
    },
}

/// A live physical connection and the cable it was made for.
/// Links on different inputs of the same node are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub cable: CableId,
    pub source: NodeId,
    pub dest: NodeId,
    pub source_plug: PlugId,
    pub dest_plug: PlugId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumTag)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum SceneEvent {
    NodeAdded {
        node: NodeId,
    },
    NodeMounted {
        node: NodeId,
    },
    NodeUnmounted {
        node: NodeId,
    },
    UnitInstalled {
        node: NodeId,
        unit: String,
    },
    CableConnected {
        cable: CableId,
        source: PlugId,
        dest: PlugId,
        kind: SignalKind,
    },
    CableDisconnected {
        cable: CableId,
    },
    /// A physical connection was made.
    Linked(Link),
    /// A physical connection was torn down.
    Unlinked(Link),
    NodeDestroyed {
        node: NodeId,
    },
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} -> {})", self.cable, self.source_plug, self.dest_plug)
    }
}

/// Buffers events raised during an operation and fans them out to
/// subscribers once the operation has finished.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Vec<Sender<SceneEvent>>,
    pending: Vec<SceneEvent>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<SceneEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn raise(&mut self, event: SceneEvent) {
        self.pending.push(event);
    }

    pub fn publish(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.pending);
        // Subscribers whose receiver is gone are dropped.
        self.subscribers
            .retain(|tx| events.iter().all(|event| tx.send(event.clone()).is_ok()));
    }
}
