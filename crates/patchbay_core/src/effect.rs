//! Explicit dependency tracking for reconciliation effects.
//!
//! Every output plug has one effect. After each run the effect reports the
//! inputs it read; the scheduler indexes those so a later mutation of any of
//! them queues the effect again. Runs themselves never notify, so a run can
//! not schedule another run.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::types::{NodeId, PlugId};

/// An effect is identified by the output plug it reconciles.
pub type EffectId = PlugId;

/// Something an effect can read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// The set of cables attached to a plug.
    CableSet(PlugId),
    /// Whether a plug is registered, and to which node.
    Registration(PlugId),
    /// Which processing unit a node currently has installed.
    Unit(NodeId),
}

#[derive(Debug, Default)]
pub struct Scheduler {
    observers: HashMap<Dependency, BTreeSet<EffectId>>,
    reads: HashMap<EffectId, Vec<Dependency>>,
    queue: VecDeque<EffectId>,
    queued: HashSet<EffectId>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an effect unless it is already waiting.
    pub fn schedule(&mut self, effect: &EffectId) -> bool {
        if self.queued.insert(effect.clone()) {
            self.queue.push_back(effect.clone());
            true
        } else {
            false
        }
    }

    /// Queue every effect whose last run read `dep`. Returns how many were
    /// newly queued.
    pub fn notify(&mut self, dep: &Dependency) -> usize {
        let Some(observers) = self.observers.get(dep) else {
            return 0;
        };
        let observers: Vec<EffectId> = observers.iter().cloned().collect();
        let mut queued = 0;
        for effect in &observers {
            if self.schedule(effect) {
                queued += 1;
            }
        }
        queued
    }

    /// Replace the dependency list recorded for `effect`.
    pub fn track(&mut self, effect: &EffectId, deps: Vec<Dependency>) {
        self.unlink(effect);
        let mut unique = Vec::with_capacity(deps.len());
        let mut seen = HashSet::with_capacity(deps.len());
        for dep in deps {
            if seen.insert(dep.clone()) {
                self.observers
                    .entry(dep.clone())
                    .or_default()
                    .insert(effect.clone());
                unique.push(dep);
            }
        }
        self.reads.insert(effect.clone(), unique);
    }

    /// Drop everything known about an effect, including a pending run.
    pub fn forget(&mut self, effect: &EffectId) {
        self.unlink(effect);
        if self.queued.remove(effect) {
            self.queue.retain(|e| e != effect);
        }
    }

    pub fn next(&mut self) -> Option<EffectId> {
        let effect = self.queue.pop_front()?;
        self.queued.remove(&effect);
        Some(effect)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    fn unlink(&mut self, effect: &EffectId) {
        let Some(previous) = self.reads.remove(effect) else {
            return;
        };
        for dep in previous {
            if let Some(observers) = self.observers.get_mut(&dep) {
                observers.remove(effect);
                if observers.is_empty() {
                    self.observers.remove(&dep);
                }
            }
        }
    }
}
