//! The scene: one patch session.
//!
//! A `Scene` owns every node, plug and cable, the plug registry, and the
//! reconciliation state. Ids are the only references between entities, so the
//! plug -> node and cable -> plug back-references never form ownership cycles.
//!
//! Structural operations (`connect`, `mount`, `set_unit`, ...) update the
//! tables and mark the affected effects dirty. Physical connections are made
//! and torn down in [`Scene::flush`], except during [`Scene::destroy`], which
//! releases everything touching the node before it returns.

use std::collections::{BTreeMap, HashMap, HashSet};

use crossbeam_channel::Receiver;
use serde::Serialize;

use crate::cable::{Cable, CableSpec};
use crate::config::SceneConfig;
use crate::effect::{Dependency, Scheduler};
use crate::error::{PatchError, PatchResult};
use crate::events::{CableEvent, EventBus, Link, SceneEvent};
use crate::node::{Node, NodeSpec, UnitSlot};
use crate::params::{PresetBridge, knobs_for};
use crate::plug::Plug;
use crate::registry::SceneRegistry;
use crate::sync::{RunOutcome, Synchronizer};
use crate::types::{CableId, Direction, NodeId, PlugId, UnitKey};
use crate::unit::SharedUnit;

pub(crate) struct Tables {
    pub nodes: BTreeMap<NodeId, Node>,
    pub plugs: HashMap<PlugId, Plug>,
    pub cables: BTreeMap<CableId, Cable>,
    pub registry: SceneRegistry,
}

/// Result of draining the effect queue once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub runs: usize,
    pub linked: Vec<Link>,
    pub unlinked: Vec<Link>,
    /// Physical calls that failed and were logged.
    pub failures: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyReport {
    pub node: NodeId,
    pub removed_cables: Vec<CableId>,
    pub unlinked: Vec<Link>,
    pub failures: usize,
}

pub struct Scene {
    tables: Tables,
    scheduler: Scheduler,
    sync: Synchronizer,
    events: EventBus,
    config: SceneConfig,
    next_unit_key: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}

impl Scene {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            tables: Tables {
                nodes: BTreeMap::new(),
                plugs: HashMap::new(),
                cables: BTreeMap::new(),
                registry: SceneRegistry::new(),
            },
            scheduler: Scheduler::new(),
            sync: Synchronizer::default(),
            events: EventBus::default(),
            config,
            next_unit_key: 1,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Receive every event raised from now on.
    pub fn subscribe(&mut self) -> Receiver<SceneEvent> {
        self.events.subscribe()
    }

    /// Create a node and its plugs. The node is not mounted, so none of its
    /// plugs resolve yet.
    pub fn add_node(&mut self, spec: NodeSpec) -> PatchResult<NodeId> {
        let id = spec.id.unwrap_or_else(NodeId::random);
        if self.tables.nodes.contains_key(&id) {
            return Err(PatchError::DuplicateNode(id));
        }

        let mut plugs = Vec::with_capacity(spec.inputs.len() + spec.outputs.len());
        let mut seen = HashSet::new();
        let declared = spec
            .inputs
            .into_iter()
            .map(|p| (Direction::Input, p))
            .chain(spec.outputs.into_iter().map(|p| (Direction::Output, p)));
        for (direction, plug) in declared {
            let plug_id = plug.id.unwrap_or_else(PlugId::random);
            if self.tables.plugs.contains_key(&plug_id) || !seen.insert(plug_id.clone()) {
                return Err(PatchError::DuplicatePlug(plug_id));
            }
            plugs.push(Plug::new(plug_id, direction, plug.kind, id.clone()));
        }

        let ids_of = |direction: Direction| -> Vec<PlugId> {
            plugs
                .iter()
                .filter(|p| p.direction() == direction)
                .map(|p| p.id().clone())
                .collect()
        };
        let node = Node::new(
            id.clone(),
            spec.kind,
            ids_of(Direction::Input),
            ids_of(Direction::Output),
            PresetBridge::new(self.config.draft_presets),
        );

        for plug in plugs {
            self.tables.plugs.insert(plug.id().clone(), plug);
        }
        tracing::debug!(node = %id, kind = node.kind(), "node added");
        self.tables.nodes.insert(id.clone(), node);
        self.events.raise(SceneEvent::NodeAdded { node: id.clone() });
        self.events.publish();
        Ok(id)
    }

    /// Register every plug of the node. Mounting an already mounted node
    /// registers again, which is harmless.
    pub fn mount(&mut self, id: &NodeId) -> PatchResult<()> {
        let node = self
            .tables
            .nodes
            .get_mut(id)
            .ok_or_else(|| PatchError::UnknownNode(id.clone()))?;
        let was_mounted = node.is_mounted();
        node.set_mounted(true);
        let plugs: Vec<PlugId> = node.plugs().cloned().collect();
        let outputs = node.outputs().to_vec();

        for plug in plugs {
            self.tables.registry.register(plug.clone(), id.clone());
            self.scheduler.notify(&Dependency::Registration(plug));
        }
        for output in &outputs {
            self.scheduler.schedule(output);
        }

        if !was_mounted {
            tracing::debug!(node = %id, "mounted");
            self.events.raise(SceneEvent::NodeMounted { node: id.clone() });
        }
        self.events.publish();
        Ok(())
    }

    /// Unregister every plug of the node. Its connections go away at the
    /// next flush; its cables stay and become pending.
    pub fn unmount(&mut self, id: &NodeId) -> PatchResult<()> {
        let node = self
            .tables
            .nodes
            .get_mut(id)
            .ok_or_else(|| PatchError::UnknownNode(id.clone()))?;
        let was_mounted = node.is_mounted();
        node.set_mounted(false);
        let plugs: Vec<PlugId> = node.plugs().cloned().collect();
        let outputs = node.outputs().to_vec();

        for plug in plugs {
            self.tables.registry.unregister(&plug);
            self.scheduler.notify(&Dependency::Registration(plug));
        }
        for output in &outputs {
            self.scheduler.schedule(output);
        }

        if was_mounted {
            tracing::debug!(node = %id, "unmounted");
            self.events.raise(SceneEvent::NodeUnmounted { node: id.clone() });
        }
        self.events.publish();
        Ok(())
    }

    /// Install a processing unit on a node.
    ///
    /// A node's unit is created lazily, once the UI knows its inputs. When a
    /// unit is already installed every physical connection involving it is
    /// released first, while the old instance is still alive.
    pub fn set_unit(&mut self, id: &NodeId, unit: SharedUnit) -> PatchResult<UnitKey> {
        if !self.tables.nodes.contains_key(id) {
            return Err(PatchError::UnknownNode(id.clone()));
        }

        let replacing = self
            .tables
            .nodes
            .get(id)
            .is_some_and(|node| node.unit().is_some());
        if replacing {
            let out = self.sync.sever_node(id);
            self.raise_outcome(&out);
        }

        let key = UnitKey::new(self.next_unit_key);
        self.next_unit_key += 1;
        let label = unit.label().to_string();
        let knobs = knobs_for(&unit.parameters(), &self.config);

        let node = self
            .tables
            .nodes
            .get_mut(id)
            .ok_or_else(|| PatchError::UnknownNode(id.clone()))?;
        node.install_unit(UnitSlot { key, unit });
        node.knobs = knobs;
        let outputs = node.outputs().to_vec();

        self.scheduler.notify(&Dependency::Unit(id.clone()));
        for output in &outputs {
            self.scheduler.schedule(output);
        }

        tracing::debug!(node = %id, unit = %label, %key, replacing, "unit installed");
        self.events.raise(SceneEvent::UnitInstalled {
            node: id.clone(),
            unit: label,
        });
        self.events.publish();
        Ok(key)
    }

    /// Add a cable between two plugs.
    ///
    /// Endpoints may be given in either order. Sending the same cable again
    /// with the same endpoints is a no-op.
    pub fn connect(&mut self, spec: CableSpec) -> PatchResult<CableId> {
        let id = spec.id.unwrap_or_else(CableId::random);

        if let Some(existing) = self.tables.cables.get(&id) {
            let same_ends = (existing.source == spec.source && existing.dest == spec.dest)
                || (existing.source == spec.dest && existing.dest == spec.source);
            if same_ends && existing.kind == spec.kind {
                tracing::debug!(cable = %id, "cable already present");
                return Ok(id);
            }
            return Err(PatchError::DuplicateCable(id));
        }

        let a = self
            .tables
            .plugs
            .get(&spec.source)
            .ok_or_else(|| PatchError::UnknownPlug(spec.source.clone()))?;
        let b = self
            .tables
            .plugs
            .get(&spec.dest)
            .ok_or_else(|| PatchError::UnknownPlug(spec.dest.clone()))?;
        let cable = Cable::validate(id, spec.kind, a, b)?;

        if let Some(existing) = self
            .tables
            .plugs
            .get(&cable.source)
            .and_then(|p| p.cable_to(&cable.dest))
        {
            return Err(PatchError::AlreadyConnected {
                existing: existing.clone(),
                source_plug: cable.source,
                dest_plug: cable.dest,
            });
        }

        for (plug, far) in [(&cable.source, &cable.dest), (&cable.dest, &cable.source)] {
            if let Some(p) = self.tables.plugs.get_mut(plug) {
                p.attach(cable.id.clone(), far.clone());
            }
            self.scheduler.notify(&Dependency::CableSet(plug.clone()));
        }
        self.scheduler.schedule(&cable.source);

        tracing::debug!(cable = %cable.id, source = %cable.source, dest = %cable.dest, kind = %cable.kind, "cable added");
        self.events.raise(SceneEvent::CableConnected {
            cable: cable.id.clone(),
            source: cable.source.clone(),
            dest: cable.dest.clone(),
            kind: cable.kind,
        });
        let id = cable.id.clone();
        self.tables.cables.insert(id.clone(), cable);
        self.events.publish();
        Ok(id)
    }

    /// Remove a cable. An unknown cable is a stale request and does nothing.
    pub fn disconnect(&mut self, id: &CableId) -> Option<Cable> {
        let removed = self.remove_cable(id);
        if removed.is_none() {
            tracing::debug!(cable = %id, "disconnect for unknown cable ignored");
        }
        self.events.publish();
        removed
    }

    /// Remove every cable attached to a plug.
    pub fn disconnect_plug(&mut self, plug: &PlugId) -> PatchResult<Vec<CableId>> {
        let cables = self
            .tables
            .plugs
            .get(plug)
            .ok_or_else(|| PatchError::UnknownPlug(plug.clone()))?
            .cable_ids();
        for cable in &cables {
            self.remove_cable(cable);
        }
        self.events.publish();
        Ok(cables)
    }

    /// Apply a structural event from the UI.
    pub fn apply(&mut self, event: CableEvent) -> PatchResult<()> {
        match event {
            CableEvent::Connect {
                cable,
                source,
                dest,
                kind,
            } => self
                .connect(CableSpec::new(source, dest, kind).with_id(cable))
                .map(drop),
            CableEvent::Disconnect { cable } => {
                self.disconnect(&cable);
                Ok(())
            }
        }
    }

    /// Destroy a node.
    ///
    /// Every cable on every plug of the node is removed and its physical
    /// connection released, inputs first. Only then are the plugs
    /// unregistered and the node dropped. Subscribers see `NodeDestroyed`
    /// after all of that has happened.
    pub fn destroy(&mut self, id: &NodeId) -> PatchResult<DestroyReport> {
        let _span = tracing::info_span!("destroy", node = %id).entered();
        let node = self
            .tables
            .nodes
            .get(id)
            .ok_or_else(|| PatchError::UnknownNode(id.clone()))?;
        let inputs = node.inputs().to_vec();
        let outputs = node.outputs().to_vec();

        let mut teardown = RunOutcome::default();
        let mut removed_cables = Vec::new();

        for plug in inputs.iter().chain(outputs.iter()) {
            let cables = self
                .tables
                .plugs
                .get(plug)
                .map(Plug::cable_ids)
                .unwrap_or_default();
            for cable in cables {
                let Some(cable) = self.remove_cable(&cable) else {
                    continue;
                };
                teardown.merge(self.sync.release_cable(&cable.source, &cable.id));
                removed_cables.push(cable.id);
            }
        }
        // Handles for cables removed earlier in this tick, and for
        // connections whose cable is gone but whose effect has not run yet.
        teardown.merge(self.sync.sever_node(id));

        for plug in inputs.iter().chain(outputs.iter()) {
            self.tables.registry.unregister(plug);
            self.scheduler.notify(&Dependency::Registration(plug.clone()));
        }
        for output in &outputs {
            teardown.merge(self.sync.dispose(output));
            self.scheduler.forget(output);
        }
        for plug in inputs.iter().chain(outputs.iter()) {
            self.tables.plugs.remove(plug);
        }
        self.tables.nodes.remove(id);

        debug_assert_eq!(self.sync.links_involving(id), 0);
        if teardown.failures > 0 {
            tracing::warn!(failures = teardown.failures, "node destroyed with failed physical disconnects");
        }
        tracing::debug!(cables = removed_cables.len(), "node destroyed");

        self.raise_outcome(&teardown);
        self.events.raise(SceneEvent::NodeDestroyed { node: id.clone() });
        self.events.publish();

        Ok(DestroyReport {
            node: id.clone(),
            removed_cables,
            unlinked: teardown.unlinked,
            failures: teardown.failures,
        })
    }

    /// Run every dirty effect once, in the order they were marked.
    pub fn flush(&mut self) -> FlushReport {
        let _span = tracing::info_span!("flush").entered();
        let mut report = FlushReport::default();

        // A zero built in code still lets one effect through.
        let limit = self.config.flush_limit.max(1);
        loop {
            if report.runs >= limit && !self.scheduler.is_idle() {
                tracing::warn!(
                    limit,
                    pending = self.scheduler.pending(),
                    "flush limit reached, leaving effects queued"
                );
                break;
            }
            let Some(effect) = self.scheduler.next() else {
                break;
            };

            let mut out = self.sync.run(&effect, &self.tables);
            let deps = std::mem::take(&mut out.deps);
            if self.tables.plugs.contains_key(&effect) {
                self.scheduler.track(&effect, deps);
            } else {
                self.scheduler.forget(&effect);
            }
            tracing::trace!(
                plug = %effect,
                linked = out.linked.len(),
                unlinked = out.unlinked.len(),
                "effect ran"
            );

            self.raise_outcome(&out);
            report.runs += 1;
            report.failures += out.failures;
            report.linked.extend(out.linked);
            report.unlinked.extend(out.unlinked);
        }

        self.events.publish();
        report
    }

    /// Move a knob. The value is clamped into the parameter's range and
    /// forwarded to the unit. Returns the value actually set.
    pub fn set_knob(&mut self, id: &NodeId, param: &str, value: f64) -> PatchResult<f64> {
        let node = self
            .tables
            .nodes
            .get_mut(id)
            .ok_or_else(|| PatchError::UnknownNode(id.clone()))?;
        let unit = node
            .unit()
            .cloned()
            .ok_or_else(|| PatchError::NoUnit(id.clone()))?;
        let knob = node
            .knobs
            .iter_mut()
            .find(|k| k.id == param)
            .ok_or_else(|| PatchError::UnknownParam {
                node: id.clone(),
                param: param.to_string(),
            })?;

        let value = knob.clamp(value);
        unit.set_parameter(param, value)
            .map_err(|source| PatchError::NodeUnit {
                node: id.clone(),
                source,
            })?;
        knob.value = value;
        Ok(value)
    }

    /// Push the node's edited preset detail into its unit. Returns how many
    /// parameters were set.
    ///
    /// Parameters the node has no knob for are skipped before anything is
    /// sent. The unit can still refuse a value; the call then stops with
    /// [`PatchError::NodeUnit`] and the parameters set before it keep their
    /// new values.
    pub fn apply_preset(&mut self, id: &NodeId) -> PatchResult<usize> {
        let node = self
            .tables
            .nodes
            .get(id)
            .ok_or_else(|| PatchError::UnknownNode(id.clone()))?;
        if node.unit().is_none() {
            return Err(PatchError::NoUnit(id.clone()));
        }
        let Some(detail) = node.presets().detail() else {
            return Ok(0);
        };
        if !detail.is_committable() {
            return Err(PatchError::PresetIncomplete {
                missing: detail.missing(),
            });
        }

        let mut values = Vec::with_capacity(detail.len());
        for (param, value) in detail.values() {
            if node.knob(param).is_none() {
                tracing::warn!(node = %id, %param, "preset names an unknown parameter, skipped");
                continue;
            }
            values.push((param.to_string(), value));
        }

        for (param, value) in &values {
            self.set_knob(id, param, *value)?;
        }
        Ok(values.len())
    }

    pub fn presets_mut(&mut self, id: &NodeId) -> PatchResult<&mut PresetBridge> {
        self.tables
            .nodes
            .get_mut(id)
            .map(Node::presets_mut)
            .ok_or_else(|| PatchError::UnknownNode(id.clone()))
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.tables.nodes.get(id)
    }

    pub fn plug(&self, id: &PlugId) -> Option<&Plug> {
        self.tables.plugs.get(id)
    }

    pub fn cable(&self, id: &CableId) -> Option<&Cable> {
        self.tables.cables.get(id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.tables.nodes.values()
    }

    /// Cables in id order.
    pub fn cables(&self) -> impl Iterator<Item = &Cable> {
        self.tables.cables.values()
    }

    /// Cables with at least one end on the given node.
    pub fn cables_of(&self, id: &NodeId) -> Vec<&Cable> {
        self.tables
            .cables
            .values()
            .filter(|cable| {
                [&cable.source, &cable.dest]
                    .into_iter()
                    .any(|plug| self.tables.plugs.get(plug).is_some_and(|p| p.owner() == id))
            })
            .collect()
    }

    pub fn resolve(&self, plug: &PlugId) -> Option<&NodeId> {
        self.tables.registry.resolve(plug)
    }

    /// Physical connections currently held, sorted by cable id.
    pub fn live_connections(&self) -> Vec<Link> {
        self.sync.links()
    }

    /// The connections that should be live given the current tables.
    ///
    /// After a flush this equals [`Scene::live_connections`] unless a unit
    /// refused a connect.
    pub fn expected_connections(&self) -> Vec<Link> {
        let tables = &self.tables;
        let ready = |plug: &PlugId, direction: Direction| -> Option<NodeId> {
            let node_id = tables.registry.resolve(plug)?;
            let node = tables.nodes.get(node_id)?;
            node.unit()?;
            let indexed = match direction {
                Direction::Output => node.output_index(plug).is_some(),
                Direction::Input => node.input_index(plug).is_some(),
            };
            indexed.then(|| node_id.clone())
        };

        let mut links: Vec<Link> = tables
            .cables
            .values()
            .filter_map(|cable| {
                let source = ready(&cable.source, Direction::Output)?;
                let dest = ready(&cable.dest, Direction::Input)?;
                Some(Link {
                    cable: cable.id.clone(),
                    source,
                    dest,
                    source_plug: cable.source.clone(),
                    dest_plug: cable.dest.clone(),
                })
            })
            .collect();
        links.sort();
        links
    }

    /// Cables without a physical connection.
    pub fn pending_cables(&self) -> Vec<CableId> {
        self.tables
            .cables
            .values()
            .filter(|cable| !self.sync.is_linked(&cable.source, &cable.id))
            .map(|cable| cable.id.clone())
            .collect()
    }

    /// Live connections with `node` at either end.
    pub fn links_involving(&self, id: &NodeId) -> usize {
        self.sync.links_involving(id)
    }

    pub fn effect_generation(&self, plug: &PlugId) -> Option<u64> {
        self.sync.generation(plug)
    }

    /// True when no effect is waiting to run.
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    fn remove_cable(&mut self, id: &CableId) -> Option<Cable> {
        let cable = self.tables.cables.remove(id)?;
        for plug in [&cable.source, &cable.dest] {
            if let Some(p) = self.tables.plugs.get_mut(plug) {
                p.detach(&cable.id);
            }
            self.scheduler.notify(&Dependency::CableSet(plug.clone()));
        }
        self.scheduler.schedule(&cable.source);

        tracing::debug!(cable = %cable.id, "cable removed");
        self.events.raise(SceneEvent::CableDisconnected {
            cable: cable.id.clone(),
        });
        Some(cable)
    }

    fn raise_outcome(&mut self, out: &RunOutcome) {
        for link in &out.unlinked {
            self.events.raise(SceneEvent::Unlinked(link.clone()));
        }
        for link in &out.linked {
            self.events.raise(SceneEvent::Linked(link.clone()));
        }
    }
}
