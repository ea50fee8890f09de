//! Ports and the unit contract
//!
//! A unit declares its ports up front in a [`PortSpec`]. Event ports carry
//! sparse [`Event`]s and are serviced by [`Unit::handle_event`]; stream ports
//! carry exactly one `f32` per sample and are serviced by [`Unit::tick`].
//! Both containers used on the audio path ([`StreamValues`] and
//! [`EventBuffer`]) are fixed-capacity so a tick never allocates.

use crate::event::Event;
use serde::{Deserialize, Serialize};

/// Index of a port within a unit's inputs or outputs
pub type PortId = u32;

/// Upper bound on stream ports per direction for one unit
pub const MAX_STREAM_PORTS: usize = 8;

/// Default capacity of the per-handler event output buffer
pub const EVENT_BUFFER_CAPACITY: usize = 64;

/// Which kind of edge a port accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortKind {
    /// Discrete, irregularly timed messages
    Event,
    /// One value per sample tick
    Stream,
}

/// Definition of a single port (input or output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    /// Position within the unit's inputs or outputs
    pub id: PortId,

    /// Human-readable name (e.g., "frequency", "trigger", "out")
    pub name: String,

    pub kind: PortKind,

    /// Stream value used when no edge is connected
    pub default: f32,

    /// Whether several stream edges may feed this input, summed
    pub summing: bool,
}

impl PortDef {
    pub fn new(id: PortId, name: impl Into<String>, kind: PortKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            default: 0.0,
            summing: false,
        }
    }

    pub fn stream(id: PortId, name: impl Into<String>) -> Self {
        Self::new(id, name, PortKind::Stream)
    }

    pub fn event(id: PortId, name: impl Into<String>) -> Self {
        Self::new(id, name, PortKind::Event)
    }

    pub fn with_default(mut self, default: f32) -> Self {
        self.default = default;
        self
    }

    pub fn summing(mut self) -> Self {
        self.summing = true;
        self
    }
}

/// Specification of all ports for a unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSpec {
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
}

impl PortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_by_name(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn input_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.id == id)
    }

    pub fn output_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.id == id)
    }
}

/// Per-tick stream values for one side of a unit, indexed by port id
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamValues {
    values: [f32; MAX_STREAM_PORTS],
}

impl StreamValues {
    pub fn new() -> Self {
        Self {
            values: [0.0; MAX_STREAM_PORTS],
        }
    }

    #[inline]
    pub fn get(&self, id: PortId) -> f32 {
        self.values[id as usize]
    }

    #[inline]
    pub fn set(&mut self, id: PortId, value: f32) {
        self.values[id as usize] = value;
    }

    /// Accumulate (sum) a value into a port
    #[inline]
    pub fn accumulate(&mut self, id: PortId, value: f32) {
        self.values[id as usize] += value;
    }

    pub fn clear(&mut self) {
        self.values = [0.0; MAX_STREAM_PORTS];
    }
}

impl Default for StreamValues {
    fn default() -> Self {
        Self::new()
    }
}

/// Events emitted by a handler, tagged with the emitting output port.
///
/// Capacity is reserved once; pushes beyond it are dropped and counted.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    events: Vec<(PortId, Event)>,
    capacity: usize,
    dropped: u64,
}

impl EventBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Queue an event on an output port. Returns false if the buffer is full.
    #[inline]
    pub fn push(&mut self, port: PortId, event: Event) -> bool {
        if self.events.len() < self.capacity {
            self.events.push((port, event));
            true
        } else {
            self.dropped += 1;
            false
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(PortId, Event)> {
        self.events.iter()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (PortId, Event)> + '_ {
        self.events.drain(..)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of events lost to a full buffer since construction
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::with_capacity(EVENT_BUFFER_CAPACITY)
    }
}

/// The processing-node contract shared by every unit kind.
///
/// Handlers and `tick` run on the audio path: they must not block, allocate,
/// or do unbounded work.
pub trait Unit: Send {
    /// Returns the unit's port specification
    fn port_spec(&self) -> &PortSpec;

    /// Consume one event arriving on an event input, emitting any resulting
    /// events into `out`.
    fn handle_event(&mut self, _input: PortId, _event: &Event, _out: &mut EventBuffer) {}

    /// Advance one sample
    fn tick(&mut self, inputs: &StreamValues, outputs: &mut StreamValues);

    /// Reset internal state
    fn reset(&mut self);

    /// Set sample rate. Called at build time only.
    fn set_sample_rate(&mut self, sample_rate: f64);

    /// Unit type identifier
    fn type_id(&self) -> &'static str {
        "unknown"
    }
}
