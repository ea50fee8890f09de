//! # Polyvox: Polyphonic Synthesis Graph
//!
//! `polyvox` is a sample-accurate polyphonic synthesizer built from a graph of
//! units. Units exchange sparse events (notes, expression, parameter changes)
//! over event edges and per-sample values over stream edges.
//!
//! ## Architecture
//!
//! - **Units** - oscillators, envelopes, filters, note trackers, the voice
//!   allocator and shared effects, all implementing [`Unit`]
//! - **Graph** - wires units together, validates the topology once and then
//!   advances everything one sample at a time without allocating
//! - **Engine** - assembles the full polyphonic voice graph from an
//!   [`EngineConfig`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use polyvox::prelude::*;
//!
//! let config = EngineConfig::new(44100.0).with_voices(8);
//! let mut engine = Engine::build(config).unwrap();
//!
//! engine.note_on(0, 60.0, 100.0 / 127.0);
//!
//! let mut block = [0.0f32; 512];
//! engine.process(&mut block);
//! ```
//!
//! Graphs can also be wired by hand:
//!
//! ```rust,no_run
//! use polyvox::prelude::*;
//!
//! let mut graph = Graph::new(44100.0);
//! let tracker = graph.add("tracker", NoteTracker::default());
//! let osc = graph.add("osc", Oscillator::new(44100.0, OscillatorParams::OSC1));
//! let env = graph.add("env", Envelope::amplitude(44100.0));
//! let vca = graph.add("vca", Vca::new());
//!
//! graph.connect(tracker.out("frequency"), osc.in_("frequency")).unwrap();
//! graph.connect(tracker.out("trigger"), env.in_("trigger")).unwrap();
//! graph.connect(osc.out("out"), vca.in_("in")).unwrap();
//! graph.connect(env.out("out"), vca.in_("gain")).unwrap();
//! graph.set_output(vca.out("out")).unwrap();
//! graph.compile().unwrap();
//!
//! graph.send(tracker.in_("events"), Event::NoteOn { channel: 0, note: 69.0, velocity: 1.0 });
//! let sample = graph.tick();
//! ```

pub mod allocator;
pub mod config;
pub mod effects;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod event;
pub mod filter;
pub mod graph;
pub mod mix;
pub mod note;
pub mod oscillator;
pub mod parameters;
pub mod port;
pub mod unit;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::event::{note_to_frequency, Event};
    pub use crate::port::{EventBuffer, PortDef, PortId, PortKind, PortSpec, StreamValues, Unit};

    pub use crate::graph::{Edge, Graph, NodeHandle, NodeId, PortRef};
    pub use crate::unit::UnitKind;

    // Voice units
    pub use crate::allocator::{VoiceAllocator, VoiceSlot};
    pub use crate::envelope::{Envelope, EnvelopeParams, EnvelopeStage};
    pub use crate::filter::{CoefficientTable, LowPassFilter, ResonantFilter};
    pub use crate::mix::{Bus, Crossfade, Vca};
    pub use crate::note::{NoteHandler, NoteTracker};
    pub use crate::oscillator::{Oscillator, OscillatorParams};

    // Shared effects
    pub use crate::effects::{
        AllPassFilter, CombFilter, Delay, DelayLine, DryWetMix, Reverb, RingBuffer,
    };

    // Parameters
    pub use crate::parameters::{ParamRange, ParameterAggregator, ParameterId, ParameterInfo};

    pub use crate::config::{EffectsConfig, EngineConfig};
    pub use crate::engine::Engine;
    pub use crate::error::{ConfigError, Error, GraphError, ParameterError};
}

// Re-export key types at crate root for convenience
pub use error::Result;
pub use prelude::*;
