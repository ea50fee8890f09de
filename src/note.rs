//! Held-note tracking with last-note priority
//!
//! [`NoteHandler`] keeps the notes currently held on one voice in hold order
//! and reports the most recent one as "current". [`NoteTracker`] wraps it as
//! a unit that turns a voice's event stream into per-sample control streams.

use crate::event::{note_to_frequency, Event};
use crate::port::{EventBuffer, PortDef, PortId, PortSpec, StreamValues, Unit};

/// Default number of notes a handler stores
pub const DEFAULT_NOTE_CAPACITY: usize = 16;

/// One held note
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NoteStackEntry {
    pub channel: u8,
    pub note: f32,
    pub bend_semitones: f32,
    pub pressure: f32,
    pub slide: f32,
}

/// Fixed-capacity stack of held notes.
///
/// The first note pressed on an empty stack latches the velocity; later
/// notes do not change it until the stack empties again.
#[derive(Debug, Clone)]
pub struct NoteHandler {
    entries: Box<[NoteStackEntry]>,
    active: usize,
    current_velocity: f32,
    current_note: f32,
    current_bend: f32,
    current_pressure: f32,
    current_slide: f32,
}

impl NoteHandler {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![NoteStackEntry::default(); capacity.max(1)].into_boxed_slice(),
            active: 0,
            current_velocity: 0.0,
            current_note: 0.0,
            current_bend: 0.0,
            current_pressure: 0.0,
            current_slide: 0.0,
        }
    }

    /// Held notes, oldest first
    pub fn entries(&self) -> &[NoteStackEntry] {
        &self.entries[..self.active]
    }

    /// Push a held note. Re-pressing a (channel, note) pair that is already
    /// held moves it to the top instead of storing it twice.
    pub fn add_note(&mut self, channel: u8, note: f32, velocity: f32) {
        if self.active == 0 {
            self.current_velocity = velocity;
        }
        self.retain(|entry| entry.channel != channel || entry.note != note);

        // beyond capacity the note still becomes current but is not stored
        if self.active < self.entries.len() {
            self.entries[self.active] = NoteStackEntry {
                channel,
                note,
                ..NoteStackEntry::default()
            };
            self.active += 1;
        }

        self.current_note = note;
        self.current_bend = 0.0;
        self.current_pressure = 0.0;
        self.current_slide = 0.0;
    }

    /// Remove every entry holding `note`, keeping the rest in order.
    ///
    /// Matches on note number only; `_channel` does not take part.
    pub fn remove_note(&mut self, _channel: u8, note: f32) {
        self.retain(|entry| entry.note != note);

        if let Some(&last) = self.last() {
            self.current_note = last.note;
            self.current_bend = last.bend_semitones;
        }
    }

    pub fn add_pitch_bend(&mut self, channel: u8, bend_semitones: f32) {
        self.update_channel(channel, |entry| entry.bend_semitones = bend_semitones);
        if let Some(&last) = self.last() {
            self.current_bend = last.bend_semitones;
        }
    }

    pub fn add_pressure(&mut self, channel: u8, pressure: f32) {
        self.update_channel(channel, |entry| entry.pressure = pressure);
        if let Some(&last) = self.last() {
            self.current_pressure = last.pressure;
        }
    }

    pub fn add_slide(&mut self, channel: u8, slide: f32) {
        self.update_channel(channel, |entry| entry.slide = slide);
        if let Some(&last) = self.last() {
            self.current_slide = last.slide;
        }
    }

    /// Current note including pitch bend, in semitones
    pub fn current_note(&self) -> f32 {
        self.current_note + self.current_bend
    }

    pub fn current_velocity(&self) -> f32 {
        self.current_velocity
    }

    pub fn current_pressure(&self) -> f32 {
        self.current_pressure
    }

    pub fn current_slide(&self) -> f32 {
        self.current_slide
    }

    pub fn is_note_active(&self) -> bool {
        self.active > 0
    }

    pub fn clear(&mut self) {
        self.active = 0;
        self.current_velocity = 0.0;
        self.current_bend = 0.0;
        self.current_pressure = 0.0;
        self.current_slide = 0.0;
    }

    /// Stable in-place delete of every entry failing `keep`
    fn retain(&mut self, keep: impl Fn(&NoteStackEntry) -> bool) {
        let mut write = 0;
        for read in 0..self.active {
            if keep(&self.entries[read]) {
                self.entries[write] = self.entries[read];
                write += 1;
            }
        }
        self.active = write;
    }

    fn last(&self) -> Option<&NoteStackEntry> {
        self.entries[..self.active].last()
    }

    fn update_channel(&mut self, channel: u8, mut apply: impl FnMut(&mut NoteStackEntry)) {
        for entry in self.entries[..self.active]
            .iter_mut()
            .filter(|e| e.channel == channel)
        {
            apply(entry);
        }
    }
}

impl Default for NoteHandler {
    fn default() -> Self {
        Self::new(DEFAULT_NOTE_CAPACITY)
    }
}

/// Per-voice control source.
///
/// Consumes the voice's note events and emits, every sample, the current
/// pitch (as frequency and as a note number), a trigger stream that carries
/// the latched velocity while any note is held, pressure and slide.
pub struct NoteTracker {
    notes: NoteHandler,
    spec: PortSpec,
}

impl NoteTracker {
    pub const EVENTS_IN: PortId = 0;

    pub const FREQUENCY_OUT: PortId = 0;
    pub const NOTE_OUT: PortId = 1;
    pub const TRIGGER_OUT: PortId = 2;
    pub const PRESSURE_OUT: PortId = 3;
    pub const SLIDE_OUT: PortId = 4;

    pub fn new(capacity: usize) -> Self {
        Self {
            notes: NoteHandler::new(capacity),
            spec: PortSpec {
                inputs: vec![PortDef::event(Self::EVENTS_IN, "events")],
                outputs: vec![
                    PortDef::stream(Self::FREQUENCY_OUT, "frequency"),
                    PortDef::stream(Self::NOTE_OUT, "note"),
                    PortDef::stream(Self::TRIGGER_OUT, "trigger"),
                    PortDef::stream(Self::PRESSURE_OUT, "pressure"),
                    PortDef::stream(Self::SLIDE_OUT, "slide"),
                ],
            },
        }
    }

    pub fn notes(&self) -> &NoteHandler {
        &self.notes
    }
}

impl Default for NoteTracker {
    fn default() -> Self {
        Self::new(DEFAULT_NOTE_CAPACITY)
    }
}

impl Unit for NoteTracker {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn handle_event(&mut self, _input: PortId, event: &Event, _out: &mut EventBuffer) {
        match *event {
            Event::NoteOn {
                channel,
                note,
                velocity,
            } => self.notes.add_note(channel, note, velocity),
            Event::NoteOff { channel, note } => self.notes.remove_note(channel, note),
            Event::PitchBend {
                channel,
                bend_semitones,
            } => self.notes.add_pitch_bend(channel, bend_semitones),
            Event::Pressure { channel, pressure } => self.notes.add_pressure(channel, pressure),
            Event::Slide { channel, slide } => self.notes.add_slide(channel, slide),
            Event::ParameterChange { .. } | Event::Raw(_) => {}
        }
    }

    fn tick(&mut self, _inputs: &StreamValues, outputs: &mut StreamValues) {
        let note = self.notes.current_note();
        let trigger = if self.notes.is_note_active() {
            self.notes.current_velocity()
        } else {
            0.0
        };

        outputs.set(Self::FREQUENCY_OUT, note_to_frequency(note));
        outputs.set(Self::NOTE_OUT, note);
        outputs.set(Self::TRIGGER_OUT, trigger);
        outputs.set(Self::PRESSURE_OUT, self.notes.current_pressure());
        outputs.set(Self::SLIDE_OUT, self.notes.current_slide());
    }

    fn reset(&mut self) {
        self.notes.clear();
    }

    fn set_sample_rate(&mut self, _: f64) {}

    fn type_id(&self) -> &'static str {
        "note_tracker"
    }
}
