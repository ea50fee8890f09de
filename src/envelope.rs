//! ADSR envelope generator
//!
//! A trigger stream drives the stage machine: a rising edge (trigger goes
//! above zero) starts the attack, a falling edge starts the release. The
//! trigger amplitude is the note velocity and, scaled by the sensitivity
//! parameter, lowers the peak level by up to 12 dB.
//!
//! Attack is a linear ramp. Decay and release are exponential: the
//! per-sample multiplier is chosen so the curve covers all but 0.01% of its
//! span in the configured time. The level is kept in `f64` and only narrowed
//! on output, so long tails do not stair-step.

use crate::event::Event;
use crate::parameters::{self, ParameterId};
use crate::port::{EventBuffer, PortDef, PortId, PortSpec, StreamValues, Unit};

/// Fraction of the span left after one stage time has elapsed
pub const TIME_CONSTANT_RESIDUAL: f64 = 0.0001;

/// Maximum attenuation applied to a quiet trigger, in dB
pub const MAX_SENSITIVITY_DB: f64 = 12.0;

/// Trigger amplitude treated as full scale
pub const REFERENCE_LEVEL: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Parameter ids an envelope listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeParams {
    pub attack: ParameterId,
    pub decay: ParameterId,
    pub sustain: ParameterId,
    pub release: ParameterId,
    pub sensitivity: ParameterId,
}

impl EnvelopeParams {
    pub const AMP: Self = Self {
        attack: ParameterId::AmpAttack,
        decay: ParameterId::AmpDecay,
        sustain: ParameterId::AmpSustain,
        release: ParameterId::AmpRelease,
        sensitivity: ParameterId::AmpSensitivity,
    };

    pub const FILTER: Self = Self {
        attack: ParameterId::FilterAttack,
        decay: ParameterId::FilterDecay,
        sustain: ParameterId::FilterSustain,
        release: ParameterId::FilterRelease,
        sensitivity: ParameterId::FilterSensitivity,
    };
}

/// Per-sample multiplier reaching [`TIME_CONSTANT_RESIDUAL`] after `seconds`
pub fn decay_multiplier(sample_rate: f64, seconds: f64) -> f64 {
    let samples = (sample_rate * seconds).max(1.0);
    libm::pow(TIME_CONSTANT_RESIDUAL, 1.0 / samples)
}

/// Envelope generator unit
pub struct Envelope {
    stage: EnvelopeStage,
    value: f64,
    target: f64,
    sample_rate: f64,
    last_trigger: f32,

    attack_seconds: f64,
    decay_seconds: f64,
    sustain_level: f64,
    release_seconds: f64,
    sensitivity: f64,

    // derived; refreshed only when a parameter or the sample rate changes
    attack_rate: f64,
    attack_increment: f64,
    decay_multiplier: f64,
    release_multiplier: f64,

    params: EnvelopeParams,
    spec: PortSpec,
}

impl Envelope {
    pub const PARAMS_IN: PortId = 0;
    pub const TRIGGER_IN: PortId = 1;

    pub const OUT: PortId = 0;

    pub fn new(sample_rate: f64, params: EnvelopeParams) -> Self {
        let default = |id| f64::from(parameters::info(id).default);
        let mut env = Self {
            stage: EnvelopeStage::Idle,
            value: 0.0,
            target: 0.0,
            sample_rate,
            last_trigger: 0.0,
            attack_seconds: default(params.attack),
            decay_seconds: default(params.decay),
            sustain_level: default(params.sustain) / 100.0,
            release_seconds: default(params.release),
            sensitivity: default(params.sensitivity) / 100.0,
            attack_rate: 0.0,
            attack_increment: 0.0,
            decay_multiplier: 1.0,
            release_multiplier: 1.0,
            params,
            spec: PortSpec {
                inputs: vec![
                    PortDef::event(Self::PARAMS_IN, "params"),
                    PortDef::stream(Self::TRIGGER_IN, "trigger"),
                ],
                outputs: vec![PortDef::stream(Self::OUT, "out")],
            },
        };
        env.update_rates();
        env
    }

    /// Amplitude envelope listening to the `amp*` parameters
    pub fn amplitude(sample_rate: f64) -> Self {
        Self::new(sample_rate, EnvelopeParams::AMP)
    }

    /// Filter envelope listening to the `filter*` parameters
    pub fn filter(sample_rate: f64) -> Self {
        Self::new(sample_rate, EnvelopeParams::FILTER)
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Current level at full precision
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_attack(&mut self, seconds: f64) {
        self.attack_seconds = seconds;
        self.update_rates();
    }

    pub fn set_decay(&mut self, seconds: f64) {
        self.decay_seconds = seconds;
        self.update_rates();
    }

    /// Sustain as a fraction of the peak, 0–1
    pub fn set_sustain(&mut self, level: f64) {
        self.sustain_level = level.clamp(0.0, 1.0);
    }

    pub fn set_release(&mut self, seconds: f64) {
        self.release_seconds = seconds;
        self.update_rates();
    }

    /// Velocity sensitivity, 0–1
    pub fn set_sensitivity(&mut self, amount: f64) {
        self.sensitivity = amount.clamp(0.0, 1.0);
    }

    /// Advance one sample with the given trigger amplitude
    pub fn next_sample(&mut self, trigger: f32) -> f32 {
        let held = trigger > 0.0;
        let was_held = self.last_trigger > 0.0;
        self.last_trigger = trigger;

        if held && !was_held {
            self.target = self.velocity_gain(f64::from(trigger));
            self.attack_increment = self.target * self.attack_rate;
            self.stage = EnvelopeStage::Attack;
        } else if !held && was_held {
            self.stage = EnvelopeStage::Release;
        }

        match self.stage {
            EnvelopeStage::Idle | EnvelopeStage::Release => {
                self.value *= self.release_multiplier;
            }
            EnvelopeStage::Attack => {
                self.value += self.attack_increment;
                if self.value >= self.target {
                    self.value = self.target;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                let sustain = self.target * self.sustain_level;
                let span = self.target - sustain;
                self.value = sustain + (self.value - sustain) * self.decay_multiplier;
                if self.value - sustain <= span * TIME_CONSTANT_RESIDUAL {
                    self.value = sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                self.value = self.target * self.sustain_level;
            }
        }

        self.value as f32
    }

    fn velocity_gain(&self, trigger: f64) -> f64 {
        let shortfall = 1.0 - (trigger / REFERENCE_LEVEL).clamp(0.0, 1.0);
        let db = -MAX_SENSITIVITY_DB * self.sensitivity * shortfall;
        libm::pow(10.0, db / 20.0)
    }

    fn update_rates(&mut self) {
        let attack_samples = (self.attack_seconds * self.sample_rate).max(1.0);
        self.attack_rate = 1.0 / attack_samples;
        self.attack_increment = self.target * self.attack_rate;
        self.decay_multiplier = decay_multiplier(self.sample_rate, self.decay_seconds);
        self.release_multiplier = decay_multiplier(self.sample_rate, self.release_seconds);
    }
}

impl Unit for Envelope {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn handle_event(&mut self, _input: PortId, event: &Event, _out: &mut EventBuffer) {
        let Some((id, value)) = parameters::decode(event) else {
            return;
        };
        let value = f64::from(value);

        if id == self.params.attack {
            self.set_attack(value);
        } else if id == self.params.decay {
            self.set_decay(value);
        } else if id == self.params.sustain {
            self.set_sustain(value / 100.0);
        } else if id == self.params.release {
            self.set_release(value);
        } else if id == self.params.sensitivity {
            self.set_sensitivity(value / 100.0);
        }
    }

    fn tick(&mut self, inputs: &StreamValues, outputs: &mut StreamValues) {
        let trigger = inputs.get(Self::TRIGGER_IN);
        outputs.set(Self::OUT, self.next_sample(trigger));
    }

    fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.value = 0.0;
        self.target = 0.0;
        self.last_trigger = 0.0;
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_rates();
    }

    fn type_id(&self) -> &'static str {
        "envelope"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SAMPLE_RATE: f64 = 1000.0;

    fn test_envelope() -> Envelope {
        let mut env = Envelope::amplitude(SAMPLE_RATE);
        env.set_attack(0.1);
        env.set_decay(0.2);
        env.set_sustain(0.5);
        env.set_release(0.3);
        env.set_sensitivity(0.0);
        env
    }

    /// Run the attack to completion, returning how many samples it took
    fn run_attack(env: &mut Envelope, trigger: f32) -> usize {
        let mut previous = 0.0;
        let mut samples = 0;
        loop {
            let value = env.next_sample(trigger);
            assert!(value >= previous, "attack fell at sample {}", samples);
            previous = value;
            samples += 1;
            if env.stage() == EnvelopeStage::Decay {
                return samples;
            }
            assert!(samples <= 10_000, "attack never finished");
        }
    }

    #[test]
    fn test_attack_is_monotonic_and_linear() {
        let mut env = test_envelope();
        let samples = run_attack(&mut env, 1.0);
        assert!((100..=101).contains(&samples), "attack took {}", samples);
        assert_abs_diff_eq!(env.value(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_decay_settles_on_sustain() {
        let mut env = test_envelope();
        for _ in 0..100 {
            env.next_sample(1.0);
        }
        for _ in 0..250 {
            env.next_sample(1.0);
        }
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        assert_abs_diff_eq!(env.value(), 0.5, epsilon = 1e-9);

        for _ in 0..1000 {
            env.next_sample(1.0);
        }
        assert_abs_diff_eq!(env.value(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_release_reaches_residual_in_release_time() {
        let mut env = test_envelope();
        for _ in 0..2000 {
            env.next_sample(1.0);
        }
        let start = env.value();
        let mut previous = start;

        let release_samples = (0.3 * SAMPLE_RATE) as usize + 1;
        for _ in 0..release_samples {
            let value = f64::from(env.next_sample(0.0));
            assert!(value <= previous + 1e-12);
            previous = value;
        }
        assert_eq!(env.stage(), EnvelopeStage::Release);
        assert!(env.value() <= start * TIME_CONSTANT_RESIDUAL);
        assert!(env.value() > 0.0);
    }

    #[test]
    fn test_release_from_attack() {
        let mut env = test_envelope();
        for _ in 0..50 {
            env.next_sample(1.0);
        }
        let mid_attack = env.value();
        let value = env.next_sample(0.0);
        assert_eq!(env.stage(), EnvelopeStage::Release);
        assert!(f64::from(value) < mid_attack);
    }

    #[test]
    fn test_velocity_sensitivity_attenuates_peak() {
        let mut env = test_envelope();
        env.set_sensitivity(1.0);
        run_attack(&mut env, 0.0001);
        // near-silent trigger at full sensitivity: -12 dB
        assert_abs_diff_eq!(env.value(), libm::pow(10.0, -12.0 / 20.0), epsilon = 1e-3);

        let mut loud = test_envelope();
        loud.set_sensitivity(1.0);
        run_attack(&mut loud, 1.0);
        assert_abs_diff_eq!(loud.value(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_retrigger_only_on_rising_edge() {
        let mut env = test_envelope();
        for _ in 0..150 {
            env.next_sample(1.0);
        }
        assert_eq!(env.stage(), EnvelopeStage::Decay);

        // a change of amplitude while held is not an edge
        env.next_sample(0.5);
        assert_eq!(env.stage(), EnvelopeStage::Decay);

        env.next_sample(0.0);
        env.next_sample(0.5);
        assert_eq!(env.stage(), EnvelopeStage::Attack);
    }

    #[test]
    fn test_parameter_event_recomputes_release() {
        let mut env = test_envelope();
        let mut out = EventBuffer::default();
        let release = parameters::info(ParameterId::AmpRelease);
        let before = env.release_multiplier;

        env.handle_event(
            Envelope::PARAMS_IN,
            &Event::ParameterChange {
                id: release.id.id(),
                value: release.normalise(2.0),
            },
            &mut out,
        );
        assert!(env.release_multiplier > before);
        assert_abs_diff_eq!(env.release_seconds, 2.0, epsilon = 1e-3);

        // filter parameters do not touch the amplitude envelope
        env.handle_event(
            Envelope::PARAMS_IN,
            &Event::ParameterChange {
                id: ParameterId::FilterSustain.id(),
                value: 0.0,
            },
            &mut out,
        );
        assert_abs_diff_eq!(env.sustain_level, 0.5);
    }

    #[test]
    fn test_decay_multiplier_formula() {
        let m = decay_multiplier(48000.0, 1.0);
        assert_abs_diff_eq!(libm::pow(m, 48000.0), TIME_CONSTANT_RESIDUAL, epsilon = 1e-9);
    }
}
