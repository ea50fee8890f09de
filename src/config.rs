//! Engine configuration

use crate::error::ConfigError;
use crate::filter::DEFAULT_UPDATE_INTERVAL;
use crate::note::DEFAULT_NOTE_CAPACITY;
use serde::{Deserialize, Serialize};

/// Lowest sample rate an engine accepts
pub const MIN_SAMPLE_RATE: f64 = 8000.0;

/// Which shared effects sit between the voice bus and the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    pub delay: bool,
    pub reverb: bool,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            delay: true,
            reverb: true,
        }
    }
}

impl EffectsConfig {
    /// Dry voices straight to the output
    pub const NONE: Self = Self {
        delay: false,
        reverb: false,
    };
}

/// Shape of an engine: rates, pool sizes and initial parameter values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: f64,
    /// Size of the voice pool
    pub voices: usize,
    /// Notes held per voice before further notes are ignored
    pub note_capacity: usize,
    /// Samples between filter coefficient refreshes
    pub filter_update_interval: usize,
    pub effects: EffectsConfig,
    /// Initial `(parameter id, normalized value)` overrides
    pub parameters: Vec<(u32, f32)>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            voices: 8,
            note_capacity: DEFAULT_NOTE_CAPACITY,
            filter_update_interval: DEFAULT_UPDATE_INTERVAL,
            effects: EffectsConfig::default(),
            parameters: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    pub fn with_voices(mut self, voices: usize) -> Self {
        self.voices = voices;
        self
    }

    pub fn with_effects(mut self, effects: EffectsConfig) -> Self {
        self.effects = effects;
        self
    }

    /// Override a parameter's initial normalized value
    pub fn with_parameter(mut self, id: u32, value: f32) -> Self {
        self.parameters.push((id, value));
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_rate.is_finite() || self.sample_rate < MIN_SAMPLE_RATE {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.voices == 0 {
            return Err(ConfigError::ZeroSized("voices"));
        }
        if self.note_capacity == 0 {
            return Err(ConfigError::ZeroSized("note_capacity"));
        }
        if self.filter_update_interval == 0 {
            return Err(ConfigError::ZeroSized("filter_update_interval"));
        }
        Ok(())
    }

    /// Serialize to a JSON string
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from a JSON string and validate. Missing fields take their
    /// defaults.
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
