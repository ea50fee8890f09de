//! Band-limited oscillator
//!
//! Blends a sawtooth and a square wave by a waveshape amount. Both shapes
//! are corrected around their discontinuities with a two-sample polynomial
//! (polyBLEP) residual whose width is the current phase increment, so the
//! correction narrows as pitch rises.

use crate::event::Event;
use crate::parameters::{self, ParameterId};
use crate::port::{EventBuffer, PortDef, PortId, PortSpec, StreamValues, Unit};

/// Parameter ids an oscillator listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OscillatorParams {
    pub wave_shape: ParameterId,
    pub detune_semitones: ParameterId,
    pub detune_cents: ParameterId,
}

impl OscillatorParams {
    pub const OSC1: Self = Self {
        wave_shape: ParameterId::Osc1WaveShape,
        detune_semitones: ParameterId::Osc1DetuneSemitones,
        detune_cents: ParameterId::Osc1Detune,
    };

    pub const OSC2: Self = Self {
        wave_shape: ParameterId::Osc2WaveShape,
        detune_semitones: ParameterId::Osc2DetuneSemitones,
        detune_cents: ParameterId::Osc2Detune,
    };
}

/// PolyBLEP residual for a unit step at phase 0.
///
/// `t` is the phase in [0, 1), `dt` the phase increment per sample.
#[inline]
pub fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let t = t / dt;
        t + t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

/// Saw/square oscillator driven by a frequency stream
pub struct Oscillator {
    phase: f64,
    sample_rate: f64,
    /// 0 = saw, 1 = square
    wave_shape: f64,
    detune_semitones: f32,
    detune_cents: f32,
    detune_multiplier: f64,
    params: OscillatorParams,
    spec: PortSpec,
}

impl Oscillator {
    pub const PARAMS_IN: PortId = 0;
    pub const FREQUENCY_IN: PortId = 1;

    pub const OUT: PortId = 0;

    pub fn new(sample_rate: f64, params: OscillatorParams) -> Self {
        let mut osc = Self {
            phase: 0.0,
            sample_rate,
            wave_shape: 0.0,
            detune_semitones: 0.0,
            detune_cents: 0.0,
            detune_multiplier: 1.0,
            params,
            spec: PortSpec {
                inputs: vec![
                    PortDef::event(Self::PARAMS_IN, "params"),
                    PortDef::stream(Self::FREQUENCY_IN, "frequency").with_default(440.0),
                ],
                outputs: vec![PortDef::stream(Self::OUT, "out")],
            },
        };
        osc.set_wave_shape(parameters::info(params.wave_shape).default / 100.0);
        osc.set_detune(
            parameters::info(params.detune_semitones).default,
            parameters::info(params.detune_cents).default,
        );
        osc
    }

    /// Current normalized phase in [0, 1)
    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn wave_shape(&self) -> f64 {
        self.wave_shape
    }

    pub fn detune_multiplier(&self) -> f64 {
        self.detune_multiplier
    }

    /// Set the saw/square blend (0 = saw, 1 = square)
    pub fn set_wave_shape(&mut self, shape: f32) {
        self.wave_shape = f64::from(shape.clamp(0.0, 1.0));
    }

    pub fn set_detune(&mut self, semitones: f32, cents: f32) {
        self.detune_semitones = semitones;
        self.detune_cents = cents;
        let offset = f64::from(semitones) + f64::from(cents) / 100.0;
        self.detune_multiplier = libm::exp2(offset / 12.0);
    }

    /// Generate one sample at `frequency` Hz and advance the phase
    pub fn next_sample(&mut self, frequency: f32) -> f32 {
        let nyquist = self.sample_rate * 0.5;
        let hz = (f64::from(frequency) * self.detune_multiplier).clamp(0.0, nyquist);
        let dt = hz / self.sample_rate;

        let t = self.phase;
        let saw = 2.0 * t - 1.0 - poly_blep(t, dt);

        let mut half = t + 0.5;
        if half >= 1.0 {
            half -= 1.0;
        }
        let naive_square = if t < 0.5 { 1.0 } else { -1.0 };
        let square = naive_square + poly_blep(t, dt) - poly_blep(half, dt);

        let out = saw + (square - saw) * self.wave_shape;

        self.phase += dt;
        while self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        out as f32
    }
}

impl Unit for Oscillator {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn handle_event(&mut self, _input: PortId, event: &Event, _out: &mut EventBuffer) {
        let Some((id, value)) = parameters::decode(event) else {
            return;
        };

        if id == self.params.wave_shape {
            self.set_wave_shape(value / 100.0);
        } else if id == self.params.detune_semitones {
            self.set_detune(value, self.detune_cents);
        } else if id == self.params.detune_cents {
            self.set_detune(self.detune_semitones, value);
        }
    }

    fn tick(&mut self, inputs: &StreamValues, outputs: &mut StreamValues) {
        let frequency = inputs.get(Self::FREQUENCY_IN);
        outputs.set(Self::OUT, self.next_sample(frequency));
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn type_id(&self) -> &'static str {
        "oscillator"
    }
}
