//! Resonant two-pole low-pass filter
//!
//! Biquad coefficients cost a sine and a cosine each, so they are computed
//! once for a grid of cutoff bins (one per semitone) and resonance bins, and
//! shared between voices. At run time resonance snaps to its nearest bin and
//! cutoff is interpolated linearly between neighbouring bins.
//!
//! Interpolated coefficients are only refreshed every `update_interval`
//! samples. Cutoff and resonance changes inside an interval are not heard
//! until the next boundary; modulation is stepped.

use crate::event::{note_to_frequency, Event};
use crate::parameters::{self, ParameterId};
use crate::port::{EventBuffer, PortDef, PortId, PortSpec, StreamValues, Unit};
use std::f64::consts::TAU;
use std::sync::Arc;
use tracing::debug;

/// One bin per semitone, MIDI notes 0–127
pub const CUTOFF_BINS: usize = 128;
/// Resonance in 1% steps, 0–100
pub const RESONANCE_BINS: usize = 101;
/// Default coefficient refresh interval in samples
pub const DEFAULT_UPDATE_INTERVAL: usize = 64;

const MIN_Q: f64 = 0.5;
const MAX_Q: f64 = 10.0;

/// Normalized low-pass biquad coefficients.
///
/// `y[n] = a * (x[n] + 2 x[n-1] + x[n-2]) - b * y[n-1] - c * y[n-2]`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Coefficients {
    /// RBJ cookbook low-pass at `frequency` Hz with quality `q`
    pub fn low_pass(sample_rate: f64, frequency: f64, q: f64) -> Self {
        let frequency = frequency.max(1.0).min(sample_rate * 0.49);
        let w0 = TAU * frequency / sample_rate;
        let cos_w0 = libm::cos(w0);
        let alpha = libm::sin(w0) / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            a: (1.0 - cos_w0) * 0.5 / a0,
            b: -2.0 * cos_w0 / a0,
            c: (1.0 - alpha) / a0,
        }
    }

    fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            a: self.a + (other.a - self.a) * t,
            b: self.b + (other.b - self.b) * t,
            c: self.c + (other.c - self.c) * t,
        }
    }
}

/// Map a resonance percentage to filter Q
pub fn resonance_to_q(percent: f64) -> f64 {
    let r = (percent / 100.0).clamp(0.0, 1.0);
    MIN_Q + (MAX_Q - MIN_Q) * r * r
}

/// Precomputed coefficients over (cutoff bin, resonance bin). Immutable.
#[derive(Debug)]
pub struct CoefficientTable {
    sample_rate: f64,
    entries: Box<[Coefficients]>,
}

impl CoefficientTable {
    pub fn new(sample_rate: f64) -> Self {
        let mut entries = Vec::with_capacity(CUTOFF_BINS * RESONANCE_BINS);
        for cutoff in 0..CUTOFF_BINS {
            let frequency = f64::from(note_to_frequency(cutoff as f32));
            for resonance in 0..RESONANCE_BINS {
                let q = resonance_to_q(resonance as f64);
                entries.push(Coefficients::low_pass(sample_rate, frequency, q));
            }
        }
        debug!(
            sample_rate,
            entries = entries.len(),
            "built filter coefficient table"
        );

        Self {
            sample_rate,
            entries: entries.into_boxed_slice(),
        }
    }

    pub fn shared(sample_rate: f64) -> Arc<Self> {
        Arc::new(Self::new(sample_rate))
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Exact table entry
    pub fn entry(&self, cutoff_bin: usize, resonance_bin: usize) -> Coefficients {
        let cutoff_bin = cutoff_bin.min(CUTOFF_BINS - 1);
        let resonance_bin = resonance_bin.min(RESONANCE_BINS - 1);
        self.entries[cutoff_bin * RESONANCE_BINS + resonance_bin]
    }

    /// Coefficients for a cutoff in semitones (MIDI note) and a resonance in
    /// percent: cutoff interpolated, resonance rounded to the nearest bin.
    pub fn lookup(&self, cutoff: f32, resonance: f32) -> Coefficients {
        let cutoff = f64::from(cutoff).clamp(0.0, (CUTOFF_BINS - 1) as f64);
        let resonance_bin = libm::round(f64::from(resonance).clamp(0.0, 100.0)) as usize;

        let lower = libm::floor(cutoff) as usize;
        let upper = (lower + 1).min(CUTOFF_BINS - 1);
        let frac = cutoff - lower as f64;

        self.entry(lower, resonance_bin)
            .lerp(&self.entry(upper, resonance_bin), frac)
    }
}

/// Biquad state with stepped coefficient refresh
#[derive(Debug, Clone)]
pub struct ResonantFilter {
    table: Arc<CoefficientTable>,
    coefficients: Coefficients,
    update_interval: usize,
    counter: usize,
    cutoff: f32,
    resonance: f32,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl ResonantFilter {
    pub fn new(table: Arc<CoefficientTable>, update_interval: usize) -> Self {
        Self {
            table,
            coefficients: Coefficients::default(),
            update_interval: update_interval.max(1),
            counter: 0,
            cutoff: 127.0,
            resonance: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn table(&self) -> &Arc<CoefficientTable> {
        &self.table
    }

    pub fn coefficients(&self) -> Coefficients {
        self.coefficients
    }

    pub fn update_interval(&self) -> usize {
        self.update_interval
    }

    /// Cutoff in semitones (MIDI note number)
    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.cutoff = cutoff;
    }

    /// Resonance in percent
    pub fn set_resonance(&mut self, resonance: f32) {
        self.resonance = resonance;
    }

    pub fn process(&mut self, input: f32) -> f32 {
        if self.counter == 0 {
            self.coefficients = self.table.lookup(self.cutoff, self.resonance);
        }
        self.counter += 1;
        if self.counter == self.update_interval {
            self.counter = 0;
        }

        let x = f64::from(input);
        let Coefficients { a, b, c } = self.coefficients;
        let y = a * (x + 2.0 * self.x1 + self.x2) - b * self.y1 - c * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y as f32
    }

    pub fn reset(&mut self) {
        self.counter = 0;
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Voice filter unit.
///
/// The effective cutoff, in semitones, is the cutoff parameter plus the
/// envelope scaled by `filterEnvMod`, plus key tracking relative to middle C.
pub struct LowPassFilter {
    filter: ResonantFilter,
    base_cutoff: f32,
    envelope_amount: f32,
    key_tracking: f32,
    spec: PortSpec,
}

impl LowPassFilter {
    pub const PARAMS_IN: PortId = 0;
    pub const IN: PortId = 1;
    pub const ENVELOPE_IN: PortId = 2;
    pub const NOTE_IN: PortId = 3;

    pub const OUT: PortId = 0;

    /// Key tracking pivot
    pub const TRACKING_CENTRE: f32 = 60.0;

    pub fn new(sample_rate: f64) -> Self {
        Self::with_table(CoefficientTable::shared(sample_rate), DEFAULT_UPDATE_INTERVAL)
    }

    /// Build around an existing (shared) coefficient table
    pub fn with_table(table: Arc<CoefficientTable>, update_interval: usize) -> Self {
        let mut filter = ResonantFilter::new(table, update_interval);
        filter.set_resonance(parameters::info(ParameterId::Resonance).default);

        Self {
            filter,
            base_cutoff: parameters::info(ParameterId::Cutoff).default,
            envelope_amount: parameters::info(ParameterId::FilterEnvMod).default,
            key_tracking: parameters::info(ParameterId::FilterCutoffTrack).default / 100.0,
            spec: PortSpec {
                inputs: vec![
                    PortDef::event(Self::PARAMS_IN, "params"),
                    PortDef::stream(Self::IN, "in"),
                    PortDef::stream(Self::ENVELOPE_IN, "envelope"),
                    PortDef::stream(Self::NOTE_IN, "note").with_default(Self::TRACKING_CENTRE),
                ],
                outputs: vec![PortDef::stream(Self::OUT, "out")],
            },
        }
    }

    pub fn filter(&self) -> &ResonantFilter {
        &self.filter
    }

    fn cutoff(&self, envelope: f32, note: f32) -> f32 {
        self.base_cutoff
            + self.envelope_amount * envelope
            + self.key_tracking * (note - Self::TRACKING_CENTRE)
    }
}

impl Unit for LowPassFilter {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn handle_event(&mut self, _input: PortId, event: &Event, _out: &mut EventBuffer) {
        match parameters::decode(event) {
            Some((ParameterId::Cutoff, value)) => self.base_cutoff = value,
            Some((ParameterId::Resonance, value)) => self.filter.set_resonance(value),
            Some((ParameterId::FilterEnvMod, value)) => self.envelope_amount = value,
            Some((ParameterId::FilterCutoffTrack, value)) => self.key_tracking = value / 100.0,
            _ => {}
        }
    }

    fn tick(&mut self, inputs: &StreamValues, outputs: &mut StreamValues) {
        let cutoff = self.cutoff(inputs.get(Self::ENVELOPE_IN), inputs.get(Self::NOTE_IN));
        self.filter.set_cutoff(cutoff);
        outputs.set(Self::OUT, self.filter.process(inputs.get(Self::IN)));
    }

    fn reset(&mut self) {
        self.filter.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        if self.filter.table().sample_rate() != sample_rate {
            let interval = self.filter.update_interval();
            let mut filter = ResonantFilter::new(CoefficientTable::shared(sample_rate), interval);
            filter.set_resonance(self.filter.resonance);
            self.filter = filter;
        }
    }

    fn type_id(&self) -> &'static str {
        "low_pass_filter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_signal(n: usize) -> f32 {
        // deterministic broadband input
        let phase = (n % 37) as f32 / 37.0;
        2.0 * phase - 1.0
    }

    #[test]
    fn test_table_matches_direct_computation() {
        let table = CoefficientTable::new(44100.0);
        let direct = Coefficients::low_pass(
            44100.0,
            f64::from(note_to_frequency(69.0)),
            resonance_to_q(50.0),
        );
        let looked_up = table.lookup(69.0, 50.0);
        assert_abs_diff_eq!(looked_up.a, direct.a, epsilon = 1e-12);
        assert_abs_diff_eq!(looked_up.b, direct.b, epsilon = 1e-12);
        assert_abs_diff_eq!(looked_up.c, direct.c, epsilon = 1e-12);
    }

    #[test]
    fn test_cutoff_interpolates_and_resonance_snaps() {
        let table = CoefficientTable::new(44100.0);
        let low = table.entry(60, 30);
        let high = table.entry(61, 30);

        let mid = table.lookup(60.5, 30.0);
        assert_abs_diff_eq!(mid.a, (low.a + high.a) * 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(mid.b, (low.b + high.b) * 0.5, epsilon = 1e-12);

        assert_eq!(table.lookup(60.0, 30.4), table.entry(60, 30));
        assert_eq!(table.lookup(60.0, 30.6), table.entry(60, 31));
    }

    #[test]
    fn test_lookup_clamps_out_of_range() {
        let table = CoefficientTable::new(44100.0);
        assert_eq!(table.lookup(-20.0, -5.0), table.entry(0, 0));
        assert_eq!(table.lookup(500.0, 500.0), table.entry(127, 100));
    }

    #[test]
    fn test_tiny_sample_rate_keeps_coefficients_finite() {
        let c = Coefficients::low_pass(1.0, 440.0, resonance_to_q(50.0));
        assert!(c.a.is_finite() && c.b.is_finite() && c.c.is_finite());

        let table = CoefficientTable::new(1.0);
        let entry = table.entry(CUTOFF_BINS - 1, RESONANCE_BINS - 1);
        assert!(entry.a.is_finite());
    }

    #[test]
    fn test_dc_passes_through_low_pass() {
        let mut filter = ResonantFilter::new(CoefficientTable::shared(44100.0), 64);
        filter.set_cutoff(80.0);
        filter.set_resonance(0.0);
        let mut out = 0.0;
        for _ in 0..20000 {
            out = filter.process(1.0);
        }
        assert_abs_diff_eq!(out, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_coefficients_only_change_on_update_boundaries() {
        let table = CoefficientTable::shared(44100.0);
        let mut steady = ResonantFilter::new(Arc::clone(&table), 64);
        let mut modulated = ResonantFilter::new(table, 64);
        for filter in [&mut steady, &mut modulated] {
            filter.set_cutoff(60.0);
            filter.set_resonance(20.0);
        }

        for n in 0..64 {
            if n == 10 {
                modulated.set_cutoff(100.0);
                modulated.set_resonance(90.0);
            }
            let a = steady.process(test_signal(n));
            let b = modulated.process(test_signal(n));
            assert_eq!(a, b, "outputs diverged inside the interval at {}", n);
        }

        let diverged = (64..128).any(|n| {
            let a = steady.process(test_signal(n));
            let b = modulated.process(test_signal(n));
            a != b
        });
        assert!(diverged);
        assert_ne!(steady.coefficients(), modulated.coefficients());
    }

    #[test]
    fn test_filter_unit_attenuates_high_frequencies() {
        let sample_rate = 44100.0;
        let mut unit = LowPassFilter::new(sample_rate);
        let mut out = EventBuffer::default();
        let cutoff = parameters::info(ParameterId::Cutoff);
        unit.handle_event(
            LowPassFilter::PARAMS_IN,
            &Event::ParameterChange {
                id: cutoff.id.id(),
                value: cutoff.normalise(40.0),
            },
            &mut out,
        );

        let mut inputs = StreamValues::new();
        let mut outputs = StreamValues::new();
        inputs.set(LowPassFilter::NOTE_IN, LowPassFilter::TRACKING_CENTRE);

        // alternate +1/-1: energy at Nyquist only
        let mut peak: f32 = 0.0;
        for n in 0..4096 {
            inputs.set(LowPassFilter::IN, if n % 2 == 0 { 1.0 } else { -1.0 });
            unit.tick(&inputs, &mut outputs);
            if n > 2048 {
                peak = peak.max(outputs.get(LowPassFilter::OUT).abs());
            }
        }
        assert!(peak < 0.01, "peak {}", peak);
    }

    #[test]
    fn test_cutoff_follows_envelope_and_key() {
        let unit = LowPassFilter::new(44100.0);
        let base = unit.cutoff(0.0, LowPassFilter::TRACKING_CENTRE);
        assert_abs_diff_eq!(base, parameters::info(ParameterId::Cutoff).default);
        assert!(unit.cutoff(1.0, LowPassFilter::TRACKING_CENTRE) > base);
        assert!(unit.cutoff(0.0, 72.0) > base);
        assert!(unit.cutoff(0.0, 48.0) < base);
    }
}
