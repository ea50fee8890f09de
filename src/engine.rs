//! Polyphonic synthesizer engine
//!
//! Builds the complete voice graph from an [`EngineConfig`]:
//!
//! ```text
//! events ──→ allocator ──voiceN──→ tracker ─┬─ frequency ──→ osc1 ─┐
//!                                           │              → osc2 ─┴→ crossfade ─→ filter ─→ vca ──→ bus
//!                                           ├─ trigger ──→ filter env ───────────────↗        ↑
//!                                           │            → amp env ──────────────────────── gain
//!                                           └─ note ────────────────────────────────→ filter
//!
//! raw/params ──→ aggregator ──→ every oscillator, crossfade, envelope and filter
//!
//! bus ──→ [delay] ──→ [reverb] ──→ output
//! ```
//!
//! Every voice owns its own units; only the filter coefficient table is
//! shared between them.

use crate::allocator::VoiceAllocator;
use crate::config::EngineConfig;
use crate::effects::{Delay, Reverb};
use crate::envelope::Envelope;
use crate::error::Result;
use crate::event::Event;
use crate::filter::{CoefficientTable, LowPassFilter};
use crate::graph::{Graph, NodeHandle, NodeId, PortRef, DEFAULT_EVENT_QUEUE_CAPACITY};
use crate::mix::{Bus, Crossfade, Vca};
use crate::note::NoteTracker;
use crate::oscillator::{Oscillator, OscillatorParams};
use crate::parameters::{self, ParameterAggregator};
use crate::port::EventBuffer;
use crate::unit::UnitKind;
use std::sync::Arc;
use tracing::info;

/// Gain applied to the summed voices
pub const MASTER_GAIN: f32 = 0.5;

/// Parameter listeners per voice, and so the fan-out of one parameter change
const PARAMETER_LISTENERS: usize = 6;

/// Node ids of one voice's units
#[derive(Debug, Clone, Copy)]
pub struct VoiceNodes {
    pub tracker: NodeId,
    pub oscillators: [NodeId; 2],
    pub filter: NodeId,
    pub filter_envelope: NodeId,
    pub amp_envelope: NodeId,
}

/// A compiled polyphonic synthesizer
pub struct Engine {
    graph: Graph,
    config: EngineConfig,
    allocator: NodeId,
    events_in: PortRef,
    params_in: PortRef,
    voices: Vec<VoiceNodes>,
    released: EventBuffer,
}

impl Engine {
    /// Validate `config`, build and compile the graph, and apply the
    /// configured parameter overrides.
    pub fn build(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let overrides = config
            .parameters
            .iter()
            .map(|&(id, value)| parameters::lookup(id).map(|info| (info.id.id(), value)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let sample_rate = config.sample_rate;
        let capacity = DEFAULT_EVENT_QUEUE_CAPACITY + config.voices * PARAMETER_LISTENERS * 4;
        let mut graph = Graph::with_event_capacity(sample_rate, capacity);

        let allocator = graph.add("allocator", VoiceAllocator::new(config.voices));
        let aggregator = graph.add("parameters", ParameterAggregator::new());
        let bus = graph.add("bus", Bus::with_gain(MASTER_GAIN));

        let table = CoefficientTable::shared(sample_rate);
        let mut voices = Vec::with_capacity(config.voices);
        for voice in 0..config.voices {
            voices.push(Self::add_voice(
                &mut graph,
                &config,
                &table,
                voice,
                &allocator,
                &aggregator,
                &bus,
            )?);
        }

        let mut last = bus.out("out");
        if config.effects.delay {
            let delay = graph.add("delay", Delay::new(sample_rate));
            graph.connect(last, delay.in_("in"))?;
            last = delay.out("out");
        }
        if config.effects.reverb {
            let reverb = graph.add("reverb", Reverb::new(sample_rate));
            graph.connect(last, reverb.in_("in"))?;
            last = reverb.out("out");
        }
        graph.set_output(last)?;
        graph.compile()?;

        info!(
            voices = config.voices,
            sample_rate,
            delay = config.effects.delay,
            reverb = config.effects.reverb,
            "built engine"
        );

        let mut engine = Self {
            graph,
            allocator: allocator.id(),
            events_in: allocator.in_("events"),
            params_in: aggregator.in_("raw"),
            voices,
            released: EventBuffer::with_capacity(config.voices),
            config,
        };
        for (id, value) in overrides {
            engine.set_parameter(id, value);
            engine.graph.flush_events();
        }
        Ok(engine)
    }

    fn add_voice(
        graph: &mut Graph,
        config: &EngineConfig,
        table: &Arc<CoefficientTable>,
        voice: usize,
        allocator: &NodeHandle,
        aggregator: &NodeHandle,
        bus: &NodeHandle,
    ) -> Result<VoiceNodes> {
        let sample_rate = config.sample_rate;
        let name = |unit: &str| format!("voice{}.{}", voice, unit);

        let tracker = graph.add(name("tracker"), NoteTracker::new(config.note_capacity));
        let osc1 = graph.add(name("osc1"), Oscillator::new(sample_rate, OscillatorParams::OSC1));
        let osc2 = graph.add(name("osc2"), Oscillator::new(sample_rate, OscillatorParams::OSC2));
        let fade = graph.add(name("mix"), Crossfade::new());
        let filter_env = graph.add(name("filter_env"), Envelope::filter(sample_rate));
        let filter = graph.add(
            name("filter"),
            LowPassFilter::with_table(Arc::clone(table), config.filter_update_interval),
        );
        let amp_env = graph.add(name("amp_env"), Envelope::amplitude(sample_rate));
        let vca = graph.add(name("vca"), Vca::new());

        graph.connect(
            allocator.port(VoiceAllocator::voice_port(voice)),
            tracker.in_("events"),
        )?;

        graph.mult(
            tracker.out("frequency"),
            &[osc1.in_("frequency"), osc2.in_("frequency")],
        )?;
        graph.mult(
            tracker.out("trigger"),
            &[filter_env.in_("trigger"), amp_env.in_("trigger")],
        )?;
        graph.connect(tracker.out("note"), filter.in_("note"))?;

        graph.connect(osc1.out("out"), fade.in_("a"))?;
        graph.connect(osc2.out("out"), fade.in_("b"))?;
        graph.connect(fade.out("out"), filter.in_("in"))?;
        graph.connect(filter_env.out("out"), filter.in_("envelope"))?;
        graph.connect(filter.out("out"), vca.in_("in"))?;
        graph.connect(amp_env.out("out"), vca.in_("gain"))?;
        graph.connect(vca.out("out"), bus.in_("in"))?;

        graph.mult(
            aggregator.out("changes"),
            &[
                osc1.in_("params"),
                osc2.in_("params"),
                fade.in_("params"),
                filter_env.in_("params"),
                filter.in_("params"),
                amp_env.in_("params"),
            ],
        )?;

        Ok(VoiceNodes {
            tracker: tracker.id(),
            oscillators: [osc1.id(), osc2.id()],
            filter: filter.id(),
            filter_envelope: filter_env.id(),
            amp_envelope: amp_env.id(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn voices(&self) -> &[VoiceNodes] {
        &self.voices
    }

    /// Read-only view of the voice allocator
    pub fn allocator(&self) -> Option<&VoiceAllocator> {
        self.graph
            .unit(self.allocator)
            .and_then(UnitKind::as_allocator)
    }

    /// The amplitude envelope of one voice
    pub fn amp_envelope(&self, voice: usize) -> Option<&Envelope> {
        let nodes = self.voices.get(voice)?;
        self.graph
            .unit(nodes.amp_envelope)
            .and_then(UnitKind::as_envelope)
    }

    /// Queue an event for the next tick. Parameter traffic goes to the
    /// aggregator, everything else to the allocator.
    pub fn send(&mut self, event: Event) {
        let port = match event {
            Event::Raw(_) | Event::ParameterChange { .. } => self.params_in,
            _ => self.events_in,
        };
        self.graph.send(port, event);
    }

    pub fn note_on(&mut self, channel: u8, note: f32, velocity: f32) {
        self.send(Event::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    pub fn note_off(&mut self, channel: u8, note: f32) {
        self.send(Event::NoteOff { channel, note });
    }

    pub fn pitch_bend(&mut self, channel: u8, bend_semitones: f32) {
        self.send(Event::PitchBend {
            channel,
            bend_semitones,
        });
    }

    pub fn pressure(&mut self, channel: u8, pressure: f32) {
        self.send(Event::Pressure { channel, pressure });
    }

    pub fn slide(&mut self, channel: u8, slide: f32) {
        self.send(Event::Slide { channel, slide });
    }

    /// Set a parameter from its normalized (0–1) value
    pub fn set_parameter(&mut self, id: u32, value: f32) {
        self.send(Event::ParameterChange { id, value });
    }

    /// Feed one value of the raw `id, value, id, value, …` parameter stream
    pub fn send_raw(&mut self, value: f32) {
        self.send(Event::Raw(value));
    }

    /// Release every sounding voice. Events queued earlier are delivered
    /// first; the releases reach the voices on the next tick.
    pub fn all_notes_off(&mut self) {
        self.graph.flush_events();
        self.released.clear();
        if let Some(allocator) = self
            .graph
            .unit_mut(self.allocator)
            .and_then(UnitKind::as_allocator_mut)
        {
            allocator.all_notes_off(&mut self.released);
        }
        for &(port, event) in self.released.iter() {
            self.graph.emit(
                PortRef {
                    node: self.allocator,
                    port,
                },
                event,
            );
        }
    }

    /// Produce one sample
    pub fn tick(&mut self) -> f32 {
        self.graph.tick()
    }

    /// Fill a block of samples
    pub fn process(&mut self, output: &mut [f32]) {
        for sample in output.iter_mut() {
            *sample = self.graph.tick();
        }
    }

    pub fn sample_index(&self) -> u64 {
        self.graph.sample_index()
    }

    /// Silence every voice and effect and drop queued events
    pub fn reset(&mut self) {
        self.graph.reset();
    }
}
