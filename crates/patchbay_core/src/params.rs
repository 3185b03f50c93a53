//! Knob bindings and presets for a window's processing unit.
//!
//! Knob geometry and the preset bar itself live in the UI. This module only
//! keeps the values those widgets read and write, and decides when an edited
//! preset detail is complete enough to be committed.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::SceneConfig;
use crate::error::{PatchError, PatchResult};
use crate::types::PresetId;
use crate::unit::ParamInfo;

/// A knob bound to one automatable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Knob {
    pub id: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub value: f64,
}

impl Knob {
    pub fn from_param(param: &ParamInfo, config: &SceneConfig) -> Self {
        Knob {
            id: param.id.clone(),
            min: param.min,
            max: param.max,
            step: config.knob_step(param.min, param.max),
            value: param.value,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if self.min <= self.max {
            value.clamp(self.min, self.max)
        } else {
            value
        }
    }
}

pub fn knobs_for(params: &[ParamInfo], config: &SceneConfig) -> Vec<Knob> {
    params.iter().map(|p| Knob::from_param(p, config)).collect()
}

/// Parameter values stored in a preset. A field may be unset while the
/// user is still editing; the detail is committable only once none are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PresetDetail(BTreeMap<String, Option<f64>>);

impl PresetDetail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, value: Option<f64>) -> Self {
        self.set(id, value);
        self
    }

    pub fn set(&mut self, id: impl Into<String>, value: Option<f64>) {
        self.0.insert(id.into(), value);
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        self.0.get(id).copied().flatten()
    }

    pub fn is_committable(&self) -> bool {
        self.0.values().all(Option::is_some)
    }

    pub fn missing(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Set values only.
    pub fn values(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().filter_map(|(k, v)| v.map(|v| (k.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: PresetId,
    pub name: String,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub detail: Option<PresetDetail>,
}

impl Preset {
    pub fn draft(name: impl Into<String>) -> Self {
        Preset {
            id: PresetId::random(),
            name: name.into(),
            is_draft: true,
            detail: None,
        }
    }
}

/// A window's view of its presets bar.
///
/// The bar owns preset identity and naming; the bridge mirrors its list,
/// tracks the selected preset and the detail being edited, and tells the
/// caller when an edit should be written back to the bar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetBridge {
    presets: Vec<Preset>,
    selected: Option<PresetId>,
    detail: Option<PresetDetail>,
}

impl PresetBridge {
    /// A bridge with `drafts` draft presets, and never fewer than one.
    pub fn new(drafts: usize) -> Self {
        let presets = (1..=drafts.max(1))
            .map(|n| Preset::draft(format!("draft {}", n)))
            .collect();
        Self {
            presets,
            selected: None,
            detail: None,
        }
    }

    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    pub fn selected(&self) -> Option<&Preset> {
        let id = self.selected.as_ref()?;
        self.presets.iter().find(|p| &p.id == id)
    }

    /// The detail currently being edited, complete or not.
    pub fn detail(&self) -> Option<&PresetDetail> {
        self.detail.as_ref()
    }

    /// Take the bar's current preset list. An empty list is replaced by a
    /// single draft so the bar always has something to show.
    pub fn pull_presets(&mut self, presets: Vec<Preset>) {
        self.presets = presets;
        self.ensure_nonempty();
        if self.selected().is_none() {
            self.selected = None;
        }
    }

    /// Select a preset and pull its stored detail.
    pub fn select(&mut self, id: &PresetId) -> PatchResult<Option<&PresetDetail>> {
        let preset = self
            .presets
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| PatchError::UnknownPreset(id.clone()))?;
        self.detail = preset.detail.clone();
        self.selected = Some(id.clone());
        Ok(self.detail.as_ref())
    }

    /// Record an edit. Returns the detail to push to the presets bar when it
    /// is complete and differs from what the selected preset stores.
    pub fn edit_detail(&mut self, detail: PresetDetail) -> Option<PresetDetail> {
        let committable = detail.is_committable();
        self.detail = Some(detail);
        if !committable {
            return None;
        }

        let id = self.selected.clone()?;
        let preset = self.presets.iter_mut().find(|p| p.id == id)?;
        if preset.detail.as_ref() == self.detail.as_ref() {
            return None;
        }
        preset.detail = self.detail.clone();
        self.detail.clone()
    }

    /// Promote a draft to a kept preset.
    pub fn keep(&mut self, id: &PresetId) -> PatchResult<()> {
        let preset = self
            .presets
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| PatchError::UnknownPreset(id.clone()))?;
        preset.is_draft = false;
        Ok(())
    }

    pub fn remove(&mut self, id: &PresetId) -> PatchResult<Preset> {
        let index = self
            .presets
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| PatchError::UnknownPreset(id.clone()))?;
        let removed = self.presets.remove(index);
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.ensure_nonempty();
        Ok(removed)
    }

    fn ensure_nonempty(&mut self) {
        if self.presets.is_empty() {
            self.presets.push(Preset::draft("draft 1"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(id: &str, min: f64, max: f64, value: f64) -> ParamInfo {
        ParamInfo {
            id: id.into(),
            min,
            max,
            value,
        }
    }

    #[test]
    fn test_knob_step_and_clamp() {
        let knob = Knob::from_param(&param("gain", 0.0, 2.0, 1.0), &SceneConfig::default());
        assert!((knob.step - 2.0 / 128.0).abs() < 1e-12);
        assert_eq!(knob.clamp(3.0), 2.0);
        assert_eq!(knob.clamp(-1.0), 0.0);
        assert_eq!(knob.clamp(0.5), 0.5);
    }

    #[test]
    fn test_detail_committable_only_when_complete() {
        let detail = PresetDetail::new().with("a", Some(1.0)).with("b", None);
        assert!(!detail.is_committable());
        assert_eq!(detail.missing(), vec!["b".to_string()]);
        assert_eq!(detail.values().collect::<Vec<_>>(), vec![("a", 1.0)]);

        let detail = detail.with("b", Some(2.0));
        assert!(detail.is_committable());
    }

    #[test]
    fn test_bridge_seeds_drafts() {
        let bridge = PresetBridge::new(2);
        assert_eq!(bridge.presets().len(), 2);
        assert!(bridge.presets().iter().all(|p| p.is_draft));

        assert_eq!(PresetBridge::new(0).presets().len(), 1);
    }

    #[test]
    fn test_edit_detail_commits_once() {
        let mut bridge = PresetBridge::new(1);
        let id = bridge.presets()[0].id.clone();
        assert_eq!(bridge.select(&id).unwrap(), None);

        let partial = PresetDetail::new().with("cutoff", None);
        assert_eq!(bridge.edit_detail(partial), None);

        let full = PresetDetail::new().with("cutoff", Some(0.3));
        assert_eq!(bridge.edit_detail(full.clone()), Some(full.clone()));
        assert_eq!(bridge.selected().unwrap().detail.as_ref(), Some(&full));

        // Same detail again: nothing to push.
        assert_eq!(bridge.edit_detail(full), None);
    }

    #[test]
    fn test_edit_without_selection_is_not_pushed() {
        let mut bridge = PresetBridge::new(1);
        let full = PresetDetail::new().with("cutoff", Some(0.3));
        assert_eq!(bridge.edit_detail(full.clone()), None);
        assert_eq!(bridge.detail(), Some(&full));
    }

    #[test]
    fn test_remove_last_preset_seeds_draft() {
        let mut bridge = PresetBridge::new(1);
        let id = bridge.presets()[0].id.clone();
        bridge.select(&id).unwrap();

        let removed = bridge.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert_eq!(bridge.presets().len(), 1);
        assert_ne!(bridge.presets()[0].id, id);
        assert!(bridge.selected().is_none());
    }

    #[test]
    fn test_keep_and_unknown_preset() {
        let mut bridge = PresetBridge::new(1);
        let id = bridge.presets()[0].id.clone();
        bridge.keep(&id).unwrap();
        assert!(!bridge.presets()[0].is_draft);

        let missing = PresetId::from("nope");
        assert_eq!(
            bridge.keep(&missing),
            Err(PatchError::UnknownPreset(missing.clone()))
        );
    }

    #[test]
    fn test_pull_presets_drops_stale_selection() {
        let mut bridge = PresetBridge::new(1);
        let id = bridge.presets()[0].id.clone();
        bridge.select(&id).unwrap();

        bridge.pull_presets(vec![Preset::draft("other")]);
        assert!(bridge.selected().is_none());

        bridge.pull_presets(Vec::new());
        assert_eq!(bridge.presets().len(), 1);
    }
}
