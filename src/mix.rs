//! Per-voice mixing units: oscillator crossfade, VCA and the summing bus

use crate::event::Event;
use crate::parameters::{self, ParameterId};
use crate::port::{EventBuffer, PortDef, PortId, PortSpec, StreamValues, Unit};

/// Linear crossfade between two streams, driven by `oscillatorMix`
pub struct Crossfade {
    /// 0 = all A, 1 = all B
    mix: f32,
    spec: PortSpec,
}

impl Crossfade {
    pub const PARAMS_IN: PortId = 0;
    pub const A_IN: PortId = 1;
    pub const B_IN: PortId = 2;

    pub const OUT: PortId = 0;

    pub fn new() -> Self {
        Self {
            mix: parameters::info(ParameterId::OscillatorMix).default / 100.0,
            spec: PortSpec {
                inputs: vec![
                    PortDef::event(Self::PARAMS_IN, "params"),
                    PortDef::stream(Self::A_IN, "a"),
                    PortDef::stream(Self::B_IN, "b"),
                ],
                outputs: vec![PortDef::stream(Self::OUT, "out")],
            },
        }
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }
}

impl Default for Crossfade {
    fn default() -> Self {
        Self::new()
    }
}

impl Unit for Crossfade {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn handle_event(&mut self, _input: PortId, event: &Event, _out: &mut EventBuffer) {
        if let Some((ParameterId::OscillatorMix, value)) = parameters::decode(event) {
            self.mix = (value / 100.0).clamp(0.0, 1.0);
        }
    }

    fn tick(&mut self, inputs: &StreamValues, outputs: &mut StreamValues) {
        let a = inputs.get(Self::A_IN);
        let b = inputs.get(Self::B_IN);
        outputs.set(Self::OUT, a + (b - a) * self.mix);
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn type_id(&self) -> &'static str {
        "crossfade"
    }
}

/// Voltage-controlled amplifier: `out = in * gain`
pub struct Vca {
    spec: PortSpec,
}

impl Vca {
    pub const IN: PortId = 0;
    pub const GAIN_IN: PortId = 1;

    pub const OUT: PortId = 0;

    pub fn new() -> Self {
        Self {
            spec: PortSpec {
                inputs: vec![
                    PortDef::stream(Self::IN, "in"),
                    PortDef::stream(Self::GAIN_IN, "gain").with_default(1.0),
                ],
                outputs: vec![PortDef::stream(Self::OUT, "out")],
            },
        }
    }
}

impl Default for Vca {
    fn default() -> Self {
        Self::new()
    }
}

impl Unit for Vca {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &StreamValues, outputs: &mut StreamValues) {
        outputs.set(Self::OUT, inputs.get(Self::IN) * inputs.get(Self::GAIN_IN));
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn type_id(&self) -> &'static str {
        "vca"
    }
}

/// Summing bus. Its input accepts any number of writers.
pub struct Bus {
    gain: f32,
    spec: PortSpec,
}

impl Bus {
    pub const IN: PortId = 0;
    pub const OUT: PortId = 0;

    pub fn new() -> Self {
        Self::with_gain(1.0)
    }

    pub fn with_gain(gain: f32) -> Self {
        Self {
            gain,
            spec: PortSpec {
                inputs: vec![PortDef::stream(Self::IN, "in").summing()],
                outputs: vec![PortDef::stream(Self::OUT, "out")],
            },
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Unit for Bus {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &StreamValues, outputs: &mut StreamValues) {
        outputs.set(Self::OUT, inputs.get(Self::IN) * self.gain);
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn type_id(&self) -> &'static str {
        "bus"
    }
}
