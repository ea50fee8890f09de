//! Parameter catalogue and change aggregation
//!
//! The engine only ever sees `(id, normalized value)` pairs. The catalogue
//! maps each id to its display unit, range, curve and default so that a
//! control surface can translate gestures, and so that units can recover a
//! value in real units from the normalized one.

use crate::error::ParameterError;
use crate::event::Event;
use crate::port::{EventBuffer, PortDef, PortId, PortSpec, StreamValues, Unit};
use serde::{Deserialize, Serialize};

/// Mapping from a normalized value in [0, 1] to a parameter's real range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamRange {
    /// Linear mapping from normalized (0–1) to (min, max)
    Linear { min: f32, max: f32 },

    /// Exponential mapping, used for time controls
    Exponential { min: f32, max: f32 },
}

impl ParamRange {
    pub fn min(&self) -> f32 {
        match *self {
            ParamRange::Linear { min, .. } | ParamRange::Exponential { min, .. } => min,
        }
    }

    pub fn max(&self) -> f32 {
        match *self {
            ParamRange::Linear { max, .. } | ParamRange::Exponential { max, .. } => max,
        }
    }

    pub fn apply(&self, normalized: f32) -> f32 {
        let clamped = normalized.clamp(0.0, 1.0);
        match *self {
            ParamRange::Linear { min, max } => min + clamped * (max - min),
            ParamRange::Exponential { min, max } => {
                if min <= 0.0 {
                    clamped * max
                } else {
                    min * libm::powf(max / min, clamped)
                }
            }
        }
    }

    /// Inverse of [`ParamRange::apply`], clamped to the range
    pub fn normalise(&self, value: f32) -> f32 {
        match *self {
            ParamRange::Linear { min, max } => {
                if max == min {
                    0.0
                } else {
                    ((value - min) / (max - min)).clamp(0.0, 1.0)
                }
            }
            ParamRange::Exponential { min, max } => {
                if min <= 0.0 {
                    (value / max).clamp(0.0, 1.0)
                } else {
                    let value = value.clamp(min, max);
                    libm::logf(value / min) / libm::logf(max / min)
                }
            }
        }
    }
}

/// Every parameter the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ParameterId {
    Cutoff = 1,
    Resonance = 2,
    AmpAttack = 3,
    AmpDecay = 4,
    AmpSustain = 5,
    AmpRelease = 6,
    AmpSensitivity = 7,
    Osc1WaveShape = 8,
    Osc1DetuneSemitones = 9,
    Osc1Detune = 10,
    Osc2WaveShape = 11,
    Osc2DetuneSemitones = 12,
    Osc2Detune = 13,
    FilterAttack = 14,
    FilterDecay = 15,
    FilterSustain = 16,
    FilterRelease = 17,
    FilterSensitivity = 18,
    OscillatorMix = 19,
    FilterEnvMod = 20,
    FilterCutoffTrack = 21,
}

impl ParameterId {
    pub const fn id(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for ParameterId {
    type Error = ParameterError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        CATALOGUE
            .iter()
            .find(|info| info.id.id() == id)
            .map(|info| info.id)
            .ok_or(ParameterError::UnknownId(id))
    }
}

/// Catalogue entry for one parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterInfo {
    pub id: ParameterId,
    pub name: &'static str,
    pub unit: &'static str,
    pub range: ParamRange,
    /// Default in real units
    pub default: f32,
}

impl ParameterInfo {
    /// Map a normalized value to real units
    pub fn denormalise(&self, normalized: f32) -> f32 {
        self.range.apply(normalized)
    }

    /// Map a value in real units to [0, 1]
    pub fn normalise(&self, value: f32) -> f32 {
        self.range.normalise(value)
    }
}

const fn linear(min: f32, max: f32) -> ParamRange {
    ParamRange::Linear { min, max }
}

const fn exponential(min: f32, max: f32) -> ParamRange {
    ParamRange::Exponential { min, max }
}

const fn entry(
    id: ParameterId,
    name: &'static str,
    unit: &'static str,
    range: ParamRange,
    default: f32,
) -> ParameterInfo {
    ParameterInfo {
        id,
        name,
        unit,
        range,
        default,
    }
}

/// The fixed parameter table, ordered by id
pub const CATALOGUE: [ParameterInfo; 21] = [
    entry(ParameterId::Cutoff, "cutoff", "semi", linear(0.0, 127.0), 80.0),
    entry(ParameterId::Resonance, "resonance", "%", linear(0.0, 100.0), 70.0),
    entry(ParameterId::AmpAttack, "ampAttack", "s", exponential(0.001, 10.0), 0.05),
    entry(ParameterId::AmpDecay, "ampDecay", "s", exponential(0.001, 10.0), 0.5),
    entry(ParameterId::AmpSustain, "ampSustain", "%", linear(0.0, 100.0), 80.0),
    entry(ParameterId::AmpRelease, "ampRelease", "s", exponential(0.001, 10.0), 0.3),
    entry(ParameterId::AmpSensitivity, "ampSensitivity", "%", linear(0.0, 100.0), 50.0),
    entry(ParameterId::Osc1WaveShape, "osc1waveShape", "%", linear(0.0, 100.0), 100.0),
    entry(ParameterId::Osc1DetuneSemitones, "osc1detuneSemitones", "semi", linear(-24.0, 24.0), 0.0),
    entry(ParameterId::Osc1Detune, "osc1detune", "cent", linear(-100.0, 100.0), 0.0),
    entry(ParameterId::Osc2WaveShape, "osc2waveShape", "%", linear(0.0, 100.0), 0.0),
    entry(ParameterId::Osc2DetuneSemitones, "osc2detuneSemitones", "semi", linear(-24.0, 24.0), -12.0),
    entry(ParameterId::Osc2Detune, "osc2detune", "cent", linear(-100.0, 100.0), 0.0),
    entry(ParameterId::FilterAttack, "filterAttack", "s", exponential(0.001, 10.0), 0.2),
    entry(ParameterId::FilterDecay, "filterDecay", "s", exponential(0.001, 10.0), 1.0),
    entry(ParameterId::FilterSustain, "filterSustain", "%", linear(0.0, 100.0), 60.0),
    entry(ParameterId::FilterRelease, "filterRelease", "s", exponential(0.001, 10.0), 0.5),
    entry(ParameterId::FilterSensitivity, "filterSensitivity", "%", linear(0.0, 100.0), 0.0),
    entry(ParameterId::OscillatorMix, "oscillatorMix", "%", linear(0.0, 100.0), 50.0),
    entry(ParameterId::FilterEnvMod, "filterEnvMod", "semi", linear(-127.0, 127.0), 24.0),
    entry(ParameterId::FilterCutoffTrack, "filterCutoffTrack", "%", linear(0.0, 100.0), 50.0),
];

/// The whole catalogue
pub fn catalogue() -> &'static [ParameterInfo] {
    &CATALOGUE
}

/// Look up a parameter by raw id
pub fn lookup(id: u32) -> Result<&'static ParameterInfo, ParameterError> {
    CATALOGUE
        .iter()
        .find(|info| info.id.id() == id)
        .ok_or(ParameterError::UnknownId(id))
}

/// Look up a parameter by its catalogue name
pub fn lookup_by_name(name: &str) -> Result<&'static ParameterInfo, ParameterError> {
    CATALOGUE
        .iter()
        .find(|info| info.name == name)
        .ok_or_else(|| ParameterError::UnknownName(name.to_string()))
}

/// Info for a known id
pub fn info(id: ParameterId) -> &'static ParameterInfo {
    // CATALOGUE is ordered by id starting at 1
    &CATALOGUE[id.id() as usize - 1]
}

/// Decode a `ParameterChange` event addressed to a known parameter into
/// `(id, value in real units)`. Unknown ids decode to `None`.
#[inline]
pub fn decode(event: &Event) -> Option<(ParameterId, f32)> {
    match *event {
        Event::ParameterChange { id, value } => {
            let id = ParameterId::try_from(id).ok()?;
            Some((id, info(id).denormalise(value)))
        }
        _ => None,
    }
}

/// Turns a raw stream of values into typed parameter changes.
///
/// Raw values arrive in pairs: a parameter id followed by its normalized
/// value. A trailing id with no value stays buffered until the next raw
/// value arrives.
pub struct ParameterAggregator {
    pending_id: Option<f32>,
    spec: PortSpec,
}

impl ParameterAggregator {
    pub const RAW_IN: PortId = 0;
    pub const CHANGES_OUT: PortId = 0;

    pub fn new() -> Self {
        Self {
            pending_id: None,
            spec: PortSpec {
                inputs: vec![PortDef::event(Self::RAW_IN, "raw")],
                outputs: vec![PortDef::event(Self::CHANGES_OUT, "changes")],
            },
        }
    }

    /// Whether an id is waiting for its value
    pub fn has_pending_id(&self) -> bool {
        self.pending_id.is_some()
    }
}

impl Default for ParameterAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Unit for ParameterAggregator {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn handle_event(&mut self, _input: PortId, event: &Event, out: &mut EventBuffer) {
        let raw = match *event {
            Event::Raw(raw) => raw,
            // typed changes pass straight through
            Event::ParameterChange { .. } => {
                out.push(Self::CHANGES_OUT, *event);
                return;
            }
            _ => return,
        };

        match self.pending_id.take() {
            None => self.pending_id = Some(raw),
            Some(id) => {
                if id >= 0.0 {
                    out.push(
                        Self::CHANGES_OUT,
                        Event::ParameterChange {
                            id: id as u32,
                            value: raw,
                        },
                    );
                }
            }
        }
    }

    fn tick(&mut self, _inputs: &StreamValues, _outputs: &mut StreamValues) {}

    fn reset(&mut self) {
        self.pending_id = None;
    }

    fn set_sample_rate(&mut self, _: f64) {}

    fn type_id(&self) -> &'static str {
        "parameter_aggregator"
    }
}
