//! Shared effects: delay and reverb
//!
//! Every effect is built from fixed-length ring buffers sized at
//! construction. Nothing resizes while audio runs.
//!
//! ```text
//! in ──┬──→ [Comb 1..8] ──→ (+) ──→ [AllPass 1] → … → [AllPass 4] ──→ wet ──┐
//!      └──────────────────────────────────────────────────────────── dry ──┴─→ out
//! ```

use crate::port::{PortDef, PortId, PortSpec, StreamValues, Unit};

/// Fixed-length circular buffer with a single read/write cursor
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: Box<[f32]>,
    cursor: usize,
}

impl RingBuffer {
    /// Create a zeroed buffer. Lengths below one are raised to one.
    pub fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)].into_boxed_slice(),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The value at the cursor, written `len()` samples ago
    #[inline]
    pub fn current(&self) -> f32 {
        self.buffer[self.cursor]
    }

    /// Overwrite the slot at the cursor and advance, wrapping at the end
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.cursor] = sample;
        self.cursor += 1;
        if self.cursor == self.buffer.len() {
            self.cursor = 0;
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.cursor = 0;
    }
}

/// Fixed dry/wet gain pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DryWetMix {
    pub dry: f32,
    pub wet: f32,
}

impl DryWetMix {
    pub const fn new(dry: f32, wet: f32) -> Self {
        Self { dry, wet }
    }

    #[inline]
    pub fn mix(&self, dry: f32, wet: f32) -> f32 {
        dry * self.dry + wet * self.wet
    }
}

/// Feedback comb with a one-pole low-pass in the feedback path
#[derive(Debug, Clone)]
pub struct CombFilter {
    buffer: RingBuffer,
    feedback: f32,
    damp: f32,
    filter_state: f32,
}

impl CombFilter {
    pub const FEEDBACK: f32 = 0.84;
    pub const DAMP: f32 = 0.2;

    pub fn new(len: usize) -> Self {
        Self {
            buffer: RingBuffer::new(len),
            feedback: Self::FEEDBACK,
            damp: Self::DAMP,
            filter_state: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer.current();
        self.filter_state = output * (1.0 - self.damp) + self.filter_state * self.damp;
        self.buffer.write(input + self.filter_state * self.feedback);
        output
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.filter_state = 0.0;
    }
}

/// Schroeder all-pass section
#[derive(Debug, Clone)]
pub struct AllPassFilter {
    buffer: RingBuffer,
    coefficient: f32,
}

impl AllPassFilter {
    pub const COEFFICIENT: f32 = 0.5;

    pub fn new(len: usize) -> Self {
        Self {
            buffer: RingBuffer::new(len),
            coefficient: Self::COEFFICIENT,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer.current();
        self.buffer.write(input + delayed * self.coefficient);
        delayed - input
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

/// Feedback delay line. The buffer accumulates fresh input plus its own
/// feedback-scaled output.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: RingBuffer,
    feedback: f32,
}

impl DelayLine {
    pub fn new(len: usize, feedback: f32) -> Self {
        Self {
            buffer: RingBuffer::new(len),
            feedback,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer.current();
        self.buffer.write(input + output * self.feedback);
        output
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

fn seconds_to_samples(sample_rate: f64, seconds: f64) -> usize {
    libm::round(sample_rate * seconds) as usize
}

/// Mono feedback delay unit
pub struct Delay {
    line: DelayLine,
    mix: DryWetMix,
    seconds: f64,
    spec: PortSpec,
}

impl Delay {
    pub const IN: PortId = 0;
    pub const OUT: PortId = 0;

    pub const DEFAULT_SECONDS: f64 = 0.25;
    pub const DEFAULT_FEEDBACK: f32 = 0.4;
    pub const DEFAULT_MIX: DryWetMix = DryWetMix::new(1.0, 0.35);

    pub fn new(sample_rate: f64) -> Self {
        Self::with_settings(
            sample_rate,
            Self::DEFAULT_SECONDS,
            Self::DEFAULT_FEEDBACK,
            Self::DEFAULT_MIX,
        )
    }

    pub fn with_settings(sample_rate: f64, seconds: f64, feedback: f32, mix: DryWetMix) -> Self {
        Self {
            line: DelayLine::new(seconds_to_samples(sample_rate, seconds), feedback),
            mix,
            seconds,
            spec: PortSpec {
                inputs: vec![PortDef::stream(Self::IN, "in")],
                outputs: vec![PortDef::stream(Self::OUT, "out")],
            },
        }
    }

    pub fn delay_samples(&self) -> usize {
        self.line.len()
    }
}

impl Unit for Delay {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &StreamValues, outputs: &mut StreamValues) {
        let input = inputs.get(Self::IN);
        let delayed = self.line.process(input);
        outputs.set(Self::OUT, self.mix.mix(input, delayed));
    }

    fn reset(&mut self) {
        self.line.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        let len = seconds_to_samples(sample_rate, self.seconds);
        if len.max(1) != self.line.len() {
            self.line = DelayLine::new(len, self.line.feedback);
        }
    }

    fn type_id(&self) -> &'static str {
        "delay"
    }
}

/// Comb lengths in samples at 44.1 kHz
pub const COMB_LENGTHS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
/// All-pass lengths in samples at 44.1 kHz
pub const ALL_PASS_LENGTHS: [usize; 4] = [556, 441, 341, 225];

const REFERENCE_RATE: f64 = 44100.0;

/// Eight parallel combs into four serial all-passes
pub struct Reverb {
    combs: [CombFilter; 8],
    all_passes: [AllPassFilter; 4],
    sample_rate: f64,
    mix: DryWetMix,
    spec: PortSpec,
}

impl Reverb {
    pub const IN: PortId = 0;
    pub const OUT: PortId = 0;

    /// Keeps the summed comb bank inside unity for full-scale input
    pub const INPUT_GAIN: f32 = 0.015;
    pub const DEFAULT_MIX: DryWetMix = DryWetMix::new(1.0, 0.5);

    pub fn new(sample_rate: f64) -> Self {
        Self::with_mix(sample_rate, Self::DEFAULT_MIX)
    }

    pub fn with_mix(sample_rate: f64, mix: DryWetMix) -> Self {
        let scale = |len: usize| libm::round(len as f64 * sample_rate / REFERENCE_RATE) as usize;
        Self {
            combs: COMB_LENGTHS.map(|len| CombFilter::new(scale(len))),
            all_passes: ALL_PASS_LENGTHS.map(|len| AllPassFilter::new(scale(len))),
            sample_rate,
            mix,
            spec: PortSpec {
                inputs: vec![PortDef::stream(Self::IN, "in")],
                outputs: vec![PortDef::stream(Self::OUT, "out")],
            },
        }
    }

    pub fn comb_lengths(&self) -> [usize; 8] {
        let mut lengths = [0; 8];
        for (len, comb) in lengths.iter_mut().zip(&self.combs) {
            *len = comb.len();
        }
        lengths
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let scaled = input * Self::INPUT_GAIN;
        let mut wet: f32 = self.combs.iter_mut().map(|comb| comb.process(scaled)).sum();
        for all_pass in &mut self.all_passes {
            wet = all_pass.process(wet);
        }
        self.mix.mix(input, wet)
    }
}

impl Unit for Reverb {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &StreamValues, outputs: &mut StreamValues) {
        outputs.set(Self::OUT, self.process(inputs.get(Self::IN)));
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::reset);
        self.all_passes.iter_mut().for_each(AllPassFilter::reset);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate != self.sample_rate {
            *self = Self::with_mix(sample_rate, self.mix);
        }
    }

    fn type_id(&self) -> &'static str {
        "reverb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_ring_buffer_wraps() {
        let mut ring = RingBuffer::new(3);
        for v in [1.0, 2.0, 3.0] {
            assert_eq!(ring.current(), 0.0);
            ring.write(v);
        }
        assert_eq!(ring.current(), 1.0);
        ring.write(4.0);
        assert_eq!(ring.current(), 2.0);

        ring.clear();
        assert_eq!(ring.current(), 0.0);
        assert_eq!(RingBuffer::new(0).len(), 1);
    }

    #[test]
    fn test_comb_impulse_response() {
        let mut comb = CombFilter::new(10);
        let response: Vec<f32> = (0..21)
            .map(|n| comb.process(if n == 0 { 1.0 } else { 0.0 }))
            .collect();

        assert!(response[..10].iter().all(|&s| s == 0.0));
        assert_eq!(response[10], 1.0);
        let expected = (1.0 - CombFilter::DAMP) * CombFilter::FEEDBACK;
        assert_abs_diff_eq!(response[20], expected, epsilon = 1e-6);
    }

    #[test]
    fn test_all_pass_impulse_response() {
        let mut all_pass = AllPassFilter::new(5);
        let response: Vec<f32> = (0..11)
            .map(|n| all_pass.process(if n == 0 { 1.0 } else { 0.0 }))
            .collect();

        assert_eq!(response[0], -1.0);
        assert_eq!(response[5], 1.0);
        assert_abs_diff_eq!(response[10], AllPassFilter::COEFFICIENT);
    }

    #[test]
    fn test_delay_echoes_with_feedback() {
        let mut delay = Delay::with_settings(1000.0, 0.01, 0.5, DryWetMix::new(1.0, 1.0));
        assert_eq!(delay.delay_samples(), 10);

        let mut inputs = StreamValues::new();
        let mut outputs = StreamValues::new();
        let mut response = Vec::new();
        for n in 0..31 {
            inputs.set(Delay::IN, if n == 0 { 1.0 } else { 0.0 });
            delay.tick(&inputs, &mut outputs);
            response.push(outputs.get(Delay::OUT));
        }

        assert_eq!(response[0], 1.0);
        assert_eq!(response[10], 1.0);
        assert_abs_diff_eq!(response[20], 0.5);
        assert_abs_diff_eq!(response[30], 0.25);
        assert_eq!(response[15], 0.0);
    }

    #[test]
    fn test_reverb_tail() {
        let mut reverb = Reverb::new(44100.0);
        let first = reverb.process(1.0);
        assert_abs_diff_eq!(first, Reverb::DEFAULT_MIX.dry);

        let tail: Vec<f32> = (0..20000).map(|_| reverb.process(0.0)).collect();
        assert!(tail[..1000].iter().all(|&s| s == 0.0));
        assert!(tail.iter().any(|&s| s != 0.0));
        assert!(tail.iter().all(|s| s.abs() < 1.0));

        reverb.reset();
        assert_eq!(reverb.process(0.0), 0.0);
    }

    #[test]
    fn test_reverb_scales_with_sample_rate() {
        let reverb = Reverb::new(88200.0);
        assert_eq!(reverb.comb_lengths()[0], COMB_LENGTHS[0] * 2);

        let mut reverb = Reverb::new(44100.0);
        reverb.set_sample_rate(22050.0);
        assert_eq!(reverb.comb_lengths()[0], COMB_LENGTHS[0] / 2);
    }
}
