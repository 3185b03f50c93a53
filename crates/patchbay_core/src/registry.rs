use std::collections::HashMap;

use crate::types::{NodeId, PlugId};

/// Plug -> owning node lookup for one scene.
///
/// A plug is present while its node is mounted. Lookups for absent plugs
/// return `None`, which callers treat as "pending", never as an error.
#[derive(Debug, Default)]
pub struct SceneRegistry {
    owners: HashMap<PlugId, NodeId>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `node` owns `plug`. Registering again overwrites the
    /// previous entry (a remount) and returns it.
    pub fn register(&mut self, plug: PlugId, node: NodeId) -> Option<NodeId> {
        let previous = self.owners.insert(plug.clone(), node);
        if let Some(previous) = &previous {
            tracing::debug!(%plug, %previous, "plug re-registered");
        }
        previous
    }

    pub fn unregister(&mut self, plug: &PlugId) -> Option<NodeId> {
        self.owners.remove(plug)
    }

    pub fn resolve(&self, plug: &PlugId) -> Option<&NodeId> {
        self.owners.get(plug)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
