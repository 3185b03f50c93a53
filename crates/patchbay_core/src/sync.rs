//! Connection synchronizer.
//!
//! Keeps the physical connections between processing units equal to the
//! image of the abstract cable graph. For a cable on output plug `O` of node
//! `A` there is a physical connection exactly when `O` is registered to `A`,
//! `A` has a unit, the cable's destination plug resolves to a node `B`, and
//! `B` has a unit.
//!
//! Each output plug has a [`PlugEffect`] holding one teardown handle per live
//! cable. The handle is the only record of whether a cable is connected; the
//! units themselves are never asked. Releasing a handle consumes it, so a
//! connection is disconnected exactly once.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crate::effect::Dependency;
use crate::error::{PatchError, PatchResult};
use crate::events::Link;
use crate::node::{Node, UnitSlot};
use crate::scene::Tables;
use crate::types::{CableId, NodeId, PlugId, UnitKey};
use crate::unit::{ProcessingUnit, Route};

struct ConnectionHandle {
    link: Link,
    route: Route,
    generation: u64,
    dest_unit: UnitKey,
    source: Weak<dyn ProcessingUnit>,
    dest: Weak<dyn ProcessingUnit>,
}

impl ConnectionHandle {
    fn establish(
        link: Link,
        route: Route,
        generation: u64,
        source: &UnitSlot,
        dest: &UnitSlot,
    ) -> PatchResult<Self> {
        source
            .unit
            .connect(&*dest.unit, route)
            .map_err(|e| PatchError::Unit {
                cable: link.cable.clone(),
                source: e,
            })?;
        Ok(Self {
            link,
            route,
            generation,
            dest_unit: dest.key,
            source: Arc::downgrade(&source.unit),
            dest: Arc::downgrade(&dest.unit),
        })
    }

    fn release(self) -> (Link, PatchResult<()>) {
        let (Some(source), Some(dest)) = (self.source.upgrade(), self.dest.upgrade()) else {
            let cable = self.link.cable.clone();
            return (self.link, Err(PatchError::UnitDropped { cable }));
        };
        let result = source
            .disconnect(&*dest, self.route)
            .map_err(|e| PatchError::Unit {
                cable: self.link.cable.clone(),
                source: e,
            });
        (self.link, result)
    }

    fn still_targets(
        &self,
        dest: &NodeId,
        dest_plug: &PlugId,
        unit: UnitKey,
        route: Route,
    ) -> bool {
        &self.link.dest == dest
            && &self.link.dest_plug == dest_plug
            && self.dest_unit == unit
            && self.route == route
    }
}

/// Reconciliation state for one output plug.
struct PlugEffect {
    owner: NodeId,
    generation: u64,
    /// Unit the current generation's connections were made from.
    source: Option<UnitKey>,
    handles: BTreeMap<CableId, ConnectionHandle>,
}

impl PlugEffect {
    fn new(owner: NodeId) -> Self {
        Self {
            owner,
            generation: 0,
            source: None,
            handles: BTreeMap::new(),
        }
    }

    fn release_all(&mut self, out: &mut RunOutcome) {
        for (_, handle) in std::mem::take(&mut self.handles) {
            out.absorb(handle.release());
        }
    }
}

/// What a run or teardown did.
#[derive(Debug, Default)]
pub(crate) struct RunOutcome {
    pub deps: Vec<Dependency>,
    pub linked: Vec<Link>,
    pub unlinked: Vec<Link>,
    pub failures: usize,
}

impl RunOutcome {
    fn absorb(&mut self, (link, result): (Link, PatchResult<()>)) {
        match result {
            Ok(()) => {
                tracing::debug!(cable = %link.cable, source = %link.source, dest = %link.dest, "unlinked");
                self.unlinked.push(link);
            }
            Err(error) => {
                tracing::warn!(cable = %link.cable, %error, "physical disconnect failed, continuing");
                self.failures += 1;
            }
        }
    }

    pub fn merge(&mut self, other: RunOutcome) {
        self.deps.extend(other.deps);
        self.linked.extend(other.linked);
        self.unlinked.extend(other.unlinked);
        self.failures += other.failures;
    }
}

#[derive(Default)]
pub(crate) struct Synchronizer {
    effects: BTreeMap<PlugId, PlugEffect>,
}

impl Synchronizer {
    /// Reconcile one output plug against the current tables.
    ///
    /// Running again without any change in between does nothing.
    pub fn run(&mut self, plug_id: &PlugId, tables: &Tables) -> RunOutcome {
        let mut out = RunOutcome::default();
        out.deps.push(Dependency::CableSet(plug_id.clone()));
        out.deps.push(Dependency::Registration(plug_id.clone()));

        let Some(plug) = tables.plugs.get(plug_id) else {
            out.merge(self.dispose(plug_id));
            return out;
        };
        let owner = plug.owner();
        out.deps.push(Dependency::Unit(owner.clone()));

        let source_node = tables
            .registry
            .resolve(plug_id)
            .filter(|node| *node == owner)
            .and_then(|node| tables.nodes.get(node));
        let source_slot = source_node.and_then(Node::unit_slot);
        let output = source_node.and_then(|node| node.output_index(plug_id));

        let effect = self
            .effects
            .entry(plug_id.clone())
            .or_insert_with(|| PlugEffect::new(owner.clone()));

        let source_key = source_slot.map(|slot| slot.key);
        if effect.source != source_key {
            // The previous generation's connections go before anything new
            // is computed.
            effect.release_all(&mut out);
            effect.generation += 1;
            effect.source = source_key;
            tracing::trace!(plug = %plug_id, generation = effect.generation, "new effect generation");
        }

        let (Some(source_slot), Some(output)) = (source_slot, output) else {
            return out;
        };

        let removed: Vec<CableId> = effect
            .handles
            .keys()
            .filter(|cable| !plug.has_cable(cable))
            .cloned()
            .collect();
        for cable in removed {
            if let Some(handle) = effect.handles.remove(&cable) {
                out.absorb(handle.release());
            }
        }

        for (cable_id, far) in plug.cables() {
            out.deps.push(Dependency::Registration(far.clone()));
            let target = match tables.registry.resolve(far) {
                Some(dest_id) => {
                    out.deps.push(Dependency::Unit(dest_id.clone()));
                    tables.nodes.get(dest_id).and_then(|dest| {
                        let slot = dest.unit_slot()?;
                        let input = dest.input_index(far)?;
                        Some((dest, slot, input))
                    })
                }
                None => None,
            };

            let Some((dest, dest_slot, input)) = target else {
                // Pending: nothing to connect, and anything made earlier is stale.
                if let Some(handle) = effect.handles.remove(cable_id) {
                    out.absorb(handle.release());
                }
                continue;
            };

            let route = Route {
                output,
                input,
                kind: plug.kind(),
            };
            if let Some(handle) = effect.handles.get(cable_id) {
                if handle.still_targets(dest.id(), far, dest_slot.key, route) {
                    continue;
                }
                // Same cable id, different input: the old connection goes first.
                if let Some(handle) = effect.handles.remove(cable_id) {
                    out.absorb(handle.release());
                }
            }

            let link = Link {
                cable: cable_id.clone(),
                source: owner.clone(),
                dest: dest.id().clone(),
                source_plug: plug_id.clone(),
                dest_plug: far.clone(),
            };
            match ConnectionHandle::establish(
                link.clone(),
                route,
                effect.generation,
                source_slot,
                dest_slot,
            ) {
                Ok(handle) => {
                    tracing::debug!(cable = %link.cable, source = %link.source, dest = %link.dest, "linked");
                    effect.handles.insert(cable_id.clone(), handle);
                    out.linked.push(link);
                }
                Err(error) => {
                    tracing::warn!(cable = %cable_id, %error, "physical connect failed, cable stays pending");
                    out.failures += 1;
                }
            }
        }

        debug_assert!(
            effect
                .handles
                .values()
                .all(|h| h.generation == effect.generation)
        );
        out
    }

    /// Release every connection made for an output plug and forget it.
    pub fn dispose(&mut self, plug_id: &PlugId) -> RunOutcome {
        let mut out = RunOutcome::default();
        if let Some(mut effect) = self.effects.remove(plug_id) {
            effect.release_all(&mut out);
        }
        out
    }

    /// Release the connection recorded for one cable, if there is one.
    pub fn release_cable(&mut self, source_plug: &PlugId, cable: &CableId) -> RunOutcome {
        let mut out = RunOutcome::default();
        if let Some(handle) = self
            .effects
            .get_mut(source_plug)
            .and_then(|effect| effect.handles.remove(cable))
        {
            out.absorb(handle.release());
        }
        out
    }

    /// Release every connection that starts or ends at `node`.
    ///
    /// Effects owned by `node` drop their source, so their next run starts a
    /// new generation.
    pub fn sever_node(&mut self, node: &NodeId) -> RunOutcome {
        let mut out = RunOutcome::default();
        for effect in self.effects.values_mut() {
            if &effect.owner == node {
                effect.release_all(&mut out);
                effect.source = None;
                continue;
            }
            let doomed: Vec<CableId> = effect
                .handles
                .iter()
                .filter(|(_, handle)| &handle.link.dest == node)
                .map(|(cable, _)| cable.clone())
                .collect();
            for cable in doomed {
                if let Some(handle) = effect.handles.remove(&cable) {
                    out.absorb(handle.release());
                }
            }
        }
        out
    }

    pub fn links(&self) -> Vec<Link> {
        let mut links: Vec<Link> = self
            .effects
            .values()
            .flat_map(|effect| effect.handles.values().map(|h| h.link.clone()))
            .collect();
        links.sort();
        links
    }

    pub fn route(&self, source_plug: &PlugId, cable: &CableId) -> Option<Route> {
        self.effects
            .get(source_plug)
            .and_then(|effect| effect.handles.get(cable))
            .map(|handle| handle.route)
    }

    pub fn is_linked(&self, source_plug: &PlugId, cable: &CableId) -> bool {
        self.route(source_plug, cable).is_some()
    }

    pub fn generation(&self, plug: &PlugId) -> Option<u64> {
        self.effects.get(plug).map(|effect| effect.generation)
    }

    pub fn links_involving(&self, node: &NodeId) -> usize {
        self.effects
            .values()
            .flat_map(|effect| effect.handles.values())
            .filter(|h| &h.link.source == node || &h.link.dest == node)
            .count()
    }
}
