use schemars::JsonSchema;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Scene-wide settings.
///
/// Every field has a default, so `{}` is a valid config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct SceneConfig {
    /// Number of knob steps across a parameter's range.
    pub knob_steps: u32,
    /// Draft presets seeded on every new window.
    pub draft_presets: usize,
    /// Upper bound on effect runs in a single flush. Must be at least 1.
    #[serde(deserialize_with = "at_least_one")]
    #[schemars(range(min = 1))]
    pub flush_limit: usize,
}

fn at_least_one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let value = usize::deserialize(deserializer)?;
    if value == 0 {
        return Err(D::Error::custom("flushLimit must be at least 1"));
    }
    Ok(value)
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            knob_steps: 128,
            draft_presets: 2,
            flush_limit: 10_000,
        }
    }
}

impl SceneConfig {
    /// Knob increment for a parameter ranging over `[min, max]`.
    pub fn knob_step(&self, min: f64, max: f64) -> f64 {
        (max - min) / f64::from(self.knob_steps.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_str, from_value, json};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: SceneConfig = from_str("{}").unwrap();
        assert_eq!(config, SceneConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config: SceneConfig = from_value(json!({ "knobSteps": 64 })).unwrap();
        assert_eq!(config.knob_steps, 64);
        assert_eq!(config.draft_presets, 2);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(from_value::<SceneConfig>(json!({ "knobStep": 64 })).is_err());
    }

    #[test]
    fn test_zero_flush_limit_rejected() {
        let err = from_value::<SceneConfig>(json!({ "flushLimit": 0 })).unwrap_err();
        assert!(err.to_string().contains("flushLimit must be at least 1"));

        let config: SceneConfig = from_value(json!({ "flushLimit": 1 })).unwrap();
        assert_eq!(config.flush_limit, 1);
    }

    #[test]
    fn test_knob_step() {
        let config = SceneConfig::default();
        assert!((config.knob_step(0.0, 128.0) - 1.0).abs() < 1e-12);

        let zero = SceneConfig {
            knob_steps: 0,
            ..SceneConfig::default()
        };
        assert!((zero.knob_step(0.0, 1.0) - 1.0).abs() < 1e-12);
    }
}
