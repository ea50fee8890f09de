//! Control events carried on event edges.
//!
//! Events carry no timestamp of their own: they take effect at the sample
//! index on which the graph delivers them, in delivery order.

use serde::{Deserialize, Serialize};

/// A discrete control message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// `note` is fractional to allow microtuning; `velocity` is normalized to [0, 1].
    NoteOn { channel: u8, note: f32, velocity: f32 },
    NoteOff { channel: u8, note: f32 },
    PitchBend { channel: u8, bend_semitones: f32 },
    Pressure { channel: u8, pressure: f32 },
    Slide { channel: u8, slide: f32 },
    /// A typed parameter change with a value normalized to [0, 1].
    ParameterChange { id: u32, value: f32 },
    /// One value of the raw two-value parameter stream (id, then value).
    Raw(f32),
}

impl Event {
    /// The MIDI-style channel of a voice event, if it has one.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            Event::NoteOn { channel, .. }
            | Event::NoteOff { channel, .. }
            | Event::PitchBend { channel, .. }
            | Event::Pressure { channel, .. }
            | Event::Slide { channel, .. } => Some(channel),
            Event::ParameterChange { .. } | Event::Raw(_) => None,
        }
    }
}

/// Convert a (possibly fractional) MIDI note number to Hz, A4 = 440 Hz.
#[inline]
pub fn note_to_frequency(note: f32) -> f32 {
    440.0 * libm::exp2f((note - 69.0) / 12.0)
}
