//! Render a short chord through the full engine
//!
//! Plays a C major triad, holds it for half a second, releases it and prints
//! the output level every 50 ms while the voices and reverb ring out.
//!
//! Run with: cargo run --example render_note
//! Engine construction is logged at debug level.

use polyvox::prelude::*;

fn rms(block: &[f32]) -> f32 {
    let sum: f32 = block.iter().map(|s| s * s).sum();
    (sum / block.len() as f32).sqrt()
}

fn main() -> polyvox::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let sample_rate = 44100.0;
    let config = EngineConfig::new(sample_rate).with_voices(8);
    let mut engine = Engine::build(config)?;

    println!("=== Polyvox Chord Demo ===\n");

    for note in [60.0, 64.0, 67.0] {
        engine.note_on(0, note, 100.0 / 127.0);
    }

    let window = (sample_rate * 0.05) as usize;
    let mut block = vec![0.0f32; window];

    println!("Holding chord:");
    for step in 0..10 {
        engine.process(&mut block);
        println!("  {:>4} ms  rms {:.4}", step * 50, rms(&block));
    }

    let voices = engine.allocator().map_or(0, VoiceAllocator::active_count);
    println!("\nActive voices: {}", voices);

    for note in [60.0, 64.0, 67.0] {
        engine.note_off(0, note);
    }

    println!("\nReleased:");
    for step in 10..30 {
        engine.process(&mut block);
        println!("  {:>4} ms  rms {:.4}", step * 50, rms(&block));
    }

    let voices = engine.allocator().map_or(0, VoiceAllocator::active_count);
    println!("\nActive voices: {}", voices);
    println!("Dropped events: {}", engine.graph().dropped_events());
    Ok(())
}
