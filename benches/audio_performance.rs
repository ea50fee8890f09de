//! Audio Performance Benchmarks
//!
//! Measures per-sample and per-block cost of the individual units and of the
//! full polyphonic engine at several sample rates, buffer sizes and voice
//! counts.
//!
//! ## Real-Time Audio Constraints
//!
//! A buffer must be rendered before the next one arrives:
//!
//! ```text
//! time_budget = buffer_size / sample_rate
//! ```
//!
//! | Sample Rate | Buffer 64  | Buffer 128 | Buffer 256 | Buffer 512 |
//! |-------------|------------|------------|------------|------------|
//! | 44.1 kHz    | 1.45 ms    | 2.90 ms    | 5.80 ms    | 11.61 ms   |
//! | 48 kHz      | 1.33 ms    | 2.67 ms    | 5.33 ms    | 10.67 ms   |
//! | 96 kHz      | 0.67 ms    | 1.33 ms    | 2.67 ms    | 5.33 ms    |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use polyvox::prelude::*;

// ============================================================================
// Constants
// ============================================================================

const SAMPLE_RATES: [f64; 3] = [44100.0, 48000.0, 96000.0];
const BUFFER_SIZES: [usize; 4] = [64, 128, 256, 512];
const VOICE_COUNTS: [usize; 5] = [1, 4, 8, 16, 32];

// ============================================================================
// Helper Functions
// ============================================================================

fn build_engine(sample_rate: f64, voices: usize, effects: EffectsConfig) -> Engine {
    let config = EngineConfig::new(sample_rate)
        .with_voices(voices)
        .with_effects(effects);
    Engine::build(config).unwrap()
}

/// Engine with every voice sounding
fn busy_engine(sample_rate: f64, voices: usize) -> Engine {
    let mut engine = build_engine(sample_rate, voices, EffectsConfig::default());
    for voice in 0..voices {
        engine.note_on(0, 48.0 + voice as f32, 0.8);
    }
    engine.tick();
    engine
}

// ============================================================================
// Unit Benchmarks
// ============================================================================

fn bench_oscillator(c: &mut Criterion) {
    let mut group = c.benchmark_group("units/oscillator");

    for sample_rate in SAMPLE_RATES {
        let sr_name = format!("{}kHz", sample_rate as u32 / 1000);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("tick", &sr_name),
            &sample_rate,
            |b, &sr| {
                let mut osc = Oscillator::new(sr, OscillatorParams::OSC1);
                let mut inputs = StreamValues::new();
                inputs.set(Oscillator::FREQUENCY_IN, 440.0);
                let mut outputs = StreamValues::new();

                b.iter(|| {
                    osc.tick(black_box(&inputs), &mut outputs);
                    outputs.get(Oscillator::OUT)
                });
            },
        );
    }

    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("units/filter");

    group.bench_function("coefficient_table", |b| {
        b.iter(|| CoefficientTable::new(black_box(44100.0)));
    });

    for interval in [1usize, 16, 64] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("tick", format!("every_{}", interval)),
            &interval,
            |b, &interval| {
                let table = CoefficientTable::shared(44100.0);
                let mut filter = LowPassFilter::with_table(table, interval);
                let mut inputs = StreamValues::new();
                let mut outputs = StreamValues::new();
                let mut phase = 0.0f32;

                b.iter(|| {
                    phase = (phase + 0.01) % 1.0;
                    inputs.set(LowPassFilter::IN, phase * 2.0 - 1.0);
                    inputs.set(LowPassFilter::ENVELOPE_IN, phase);
                    filter.tick(black_box(&inputs), &mut outputs);
                    outputs.get(LowPassFilter::OUT)
                });
            },
        );
    }

    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("units/envelope");

    group.throughput(Throughput::Elements(1));
    group.bench_function("tick", |b| {
        let mut env = Envelope::amplitude(44100.0);
        let mut inputs = StreamValues::new();
        inputs.set(Envelope::TRIGGER_IN, 1.0);
        let mut outputs = StreamValues::new();

        b.iter(|| {
            env.tick(black_box(&inputs), &mut outputs);
            outputs.get(Envelope::OUT)
        });
    });

    group.finish();
}

fn bench_reverb(c: &mut Criterion) {
    let mut group = c.benchmark_group("units/reverb");

    group.throughput(Throughput::Elements(1));
    group.bench_function("process", |b| {
        let mut reverb = Reverb::new(44100.0);
        let mut x = 0.5f32;

        b.iter(|| {
            x = -x;
            reverb.process(black_box(x))
        });
    });

    group.finish();
}

// ============================================================================
// Engine Benchmarks
// ============================================================================

fn bench_polyphony(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/polyphony");

    for voices in VOICE_COUNTS {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("tick", voices), &voices, |b, &voices| {
            let mut engine = busy_engine(44100.0, voices);
            b.iter(|| black_box(engine.tick()));
        });
    }

    group.finish();
}

fn bench_buffer_processing(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/buffer_processing");

    for sample_rate in SAMPLE_RATES {
        for buffer_size in BUFFER_SIZES {
            let sr_name = format!("{}kHz", sample_rate as u32 / 1000);
            let name = format!("{}/{}samples", sr_name, buffer_size);

            group.throughput(Throughput::Elements(buffer_size as u64));
            group.bench_with_input(
                BenchmarkId::new("8_voices", &name),
                &(sample_rate, buffer_size),
                |b, &(sr, buf_size)| {
                    let mut engine = busy_engine(sr, 8);
                    let mut block = vec![0.0f32; buf_size];
                    b.iter(|| {
                        engine.process(&mut block);
                        black_box(block[buf_size - 1])
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_note_traffic(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/events");

    // every note steals a voice once the pool is full
    group.bench_function("note_on_steal", |b| {
        let mut engine = build_engine(44100.0, 8, EffectsConfig::NONE);
        let mut note = 0u32;
        b.iter(|| {
            note = (note + 1) % 128;
            engine.note_on(0, note as f32, 0.8);
            black_box(engine.tick())
        });
    });

    group.bench_function("parameter_change", |b| {
        let mut engine = build_engine(44100.0, 8, EffectsConfig::NONE);
        let mut value = 0.0f32;
        b.iter(|| {
            value = (value + 0.01) % 1.0;
            engine.set_parameter(ParameterId::Cutoff.id(), value);
            black_box(engine.tick())
        });
    });

    group.finish();
}

fn bench_engine_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine/build");

    for voices in [1usize, 8, 32] {
        group.bench_with_input(BenchmarkId::new("voices", voices), &voices, |b, &voices| {
            b.iter(|| build_engine(44100.0, voices, EffectsConfig::default()));
        });
    }

    group.finish();
}

criterion_group!(
    unit_benches,
    bench_oscillator,
    bench_filter,
    bench_envelope,
    bench_reverb,
);

criterion_group!(
    engine_benches,
    bench_polyphony,
    bench_buffer_processing,
    bench_note_traffic,
    bench_engine_build,
);

criterion_main!(unit_benches, engine_benches);
