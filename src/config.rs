//! Runtime configuration: accumulator and host tuning plus per-scene mapping
//! rules. Everything here is plain data with JSON round-tripping so an
//! external UI can persist user edits.

use crate::constants::*;
use crate::mapping::{MappingRule, Source};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} must be positive and finite, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("rule {index}: range bounds must be finite")]
    NonFiniteRange { index: usize },
    #[error("rule {index}: cc source needs a controller number")]
    MissingController { index: usize },
    #[error("rule {index}: controller {controller} is out of range 0..=127")]
    ControllerOutOfRange { index: usize, controller: u8 },
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccumulatorConfig {
    pub min_hold_ms: f64,
    pub density_window_ms: f64,
    pub history_capacity: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            min_hold_ms: MIN_NOTE_HOLD_MS,
            density_window_ms: DENSITY_WINDOW_MS,
            history_capacity: NOTE_HISTORY_CAPACITY,
        }
    }
}

impl AccumulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // zero hold disables the debounce, so only negatives are rejected
        if !(self.min_hold_ms.is_finite() && self.min_hold_ms >= 0.0) {
            return Err(ConfigError::NonPositive {
                field: "minHoldMs",
                value: self.min_hold_ms,
            });
        }
        positive("densityWindowMs", self.density_window_ms)?;
        positive("historyCapacity", self.history_capacity as f64)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    pub max_frame_dt_ms: f64,
    pub switch_settle_ms: f64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_frame_dt_ms: MAX_FRAME_DT_MS,
            switch_settle_ms: SCENE_SWITCH_SETTLE_MS,
        }
    }
}

impl HostConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("maxFrameDtMs", self.max_frame_dt_ms)?;
        if !(self.switch_settle_ms.is_finite() && self.switch_settle_ms >= 0.0) {
            return Err(ConfigError::NonPositive {
                field: "switchSettleMs",
                value: self.switch_settle_ms,
            });
        }
        Ok(())
    }
}

/// Check a rule list before it is handed to the mapper.
pub fn validate_rules(rules: &[MappingRule]) -> Result<(), ConfigError> {
    for (index, rule) in rules.iter().enumerate() {
        if !(rule.range[0].is_finite() && rule.range[1].is_finite()) {
            return Err(ConfigError::NonFiniteRange { index });
        }
        if rule.source == Source::Cc {
            match rule.cc_number {
                None => return Err(ConfigError::MissingController { index }),
                Some(c) if c > 127 => {
                    return Err(ConfigError::ControllerOutOfRange {
                        index,
                        controller: c,
                    })
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

/// Scene id → mapping rules, as edited by the user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingConfig {
    pub scenes: FnvHashMap<String, Vec<MappingRule>>,
}

impl MappingConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: MappingConfig = serde_json::from_str(json)?;
        for rules in cfg.scenes.values() {
            validate_rules(rules)?;
        }
        Ok(cfg)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn rules(&self, scene_id: &str) -> Option<&[MappingRule]> {
        self.scenes.get(scene_id).map(|r| r.as_slice())
    }
}

/// Parse one scene's rule list (the shape a UI sends on every edit).
pub fn rules_from_json(json: &str) -> Result<Vec<MappingRule>, ConfigError> {
    let rules: Vec<MappingRule> = serde_json::from_str(json)?;
    validate_rules(&rules)?;
    Ok(rules)
}
