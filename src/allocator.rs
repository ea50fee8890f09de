//! Voice allocation
//!
//! Maps incoming note events onto a fixed pool of voice slots. Each slot
//! carries an age stamp drawn from one of two monotonic counters: a high
//! counter for allocations and a low counter for releases. Picking the slot
//! with the smallest stamp therefore prefers released voices (longest
//! released first) and only then steals the oldest sounding one.
//!
//! The allocator is a unit with one event input and one event output per
//! voice; the graph wires each output to that voice's note tracker.

use crate::event::Event;
use crate::port::{EventBuffer, PortDef, PortId, PortSpec, StreamValues, Unit};

/// First age handed out to an allocated voice
pub const ALLOCATED_AGE_SEED: u64 = 1_000_000_000;
/// First age handed out to a released voice
pub const UNALLOCATED_AGE_SEED: u64 = 1;

/// One entry of the voice table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceSlot {
    pub active: bool,
    pub channel: u8,
    /// Stored as raw bits so slots stay `Eq`; see [`VoiceSlot::note`]
    note_bits: u32,
    pub voice_age: u64,
}

impl VoiceSlot {
    pub fn note(&self) -> f32 {
        f32::from_bits(self.note_bits)
    }

    fn set_note(&mut self, note: f32) {
        self.note_bits = note.to_bits();
    }

    fn holds(&self, channel: u8, note: f32) -> bool {
        self.channel == channel && self.note() == note
    }
}

/// Polyphonic voice allocator with oldest-voice stealing
pub struct VoiceAllocator {
    slots: Box<[VoiceSlot]>,
    next_allocated_age: u64,
    next_unallocated_age: u64,
    spec: PortSpec,
}

impl VoiceAllocator {
    pub const EVENTS_IN: PortId = 0;

    pub fn new(num_voices: usize) -> Self {
        let num_voices = num_voices.max(1);
        let outputs = (0..num_voices)
            .map(|i| PortDef::event(i as PortId, format!("voice{}", i)))
            .collect();

        Self {
            slots: vec![VoiceSlot::default(); num_voices].into_boxed_slice(),
            next_allocated_age: ALLOCATED_AGE_SEED,
            next_unallocated_age: UNALLOCATED_AGE_SEED,
            spec: PortSpec {
                inputs: vec![PortDef::event(Self::EVENTS_IN, "events")],
                outputs,
            },
        }
    }

    pub fn num_voices(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[VoiceSlot] {
        &self.slots
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.active).count()
    }

    /// Output port feeding a given voice
    pub fn voice_port(voice: usize) -> PortId {
        voice as PortId
    }

    /// Allocate a slot for a new note, stealing the oldest if necessary.
    /// Returns the chosen slot index.
    pub fn note_on(&mut self, channel: u8, note: f32, velocity: f32, out: &mut EventBuffer) -> usize {
        let index = self.oldest_slot();
        let slot = &mut self.slots[index];

        if slot.active {
            out.push(
                Self::voice_port(index),
                Event::NoteOff {
                    channel: slot.channel,
                    note: slot.note(),
                },
            );
        }

        slot.active = true;
        slot.channel = channel;
        slot.set_note(note);
        slot.voice_age = self.next_allocated_age;
        self.next_allocated_age += 1;

        out.push(
            Self::voice_port(index),
            Event::NoteOn {
                channel,
                note,
                velocity,
            },
        );
        index
    }

    /// Release every slot holding `(channel, note)`.
    pub fn note_off(&mut self, channel: u8, note: f32, out: &mut EventBuffer) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.holds(channel, note) {
                slot.active = false;
                slot.voice_age = self.next_unallocated_age;
                self.next_unallocated_age += 1;
                out.push(Self::voice_port(index), Event::NoteOff { channel, note });
            }
        }
    }

    /// Release every active slot
    pub fn all_notes_off(&mut self, out: &mut EventBuffer) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.active {
                slot.active = false;
                slot.voice_age = self.next_unallocated_age;
                self.next_unallocated_age += 1;
                out.push(
                    Self::voice_port(index),
                    Event::NoteOff {
                        channel: slot.channel,
                        note: slot.note(),
                    },
                );
            }
        }
    }

    /// Send an expression event to every slot on `channel`, sounding or not
    fn forward_to_channel(&self, channel: u8, event: Event, out: &mut EventBuffer) {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.channel == channel {
                out.push(Self::voice_port(index), event);
            }
        }
    }

    /// Smallest age wins; `min_by_key` keeps the first (lowest index) on ties
    fn oldest_slot(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.voice_age)
            .map(|(index, _)| index)
            .unwrap_or(0)
    }
}

impl Unit for VoiceAllocator {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn handle_event(&mut self, _input: PortId, event: &Event, out: &mut EventBuffer) {
        match *event {
            Event::NoteOn {
                channel,
                note,
                velocity,
            } => {
                self.note_on(channel, note, velocity, out);
            }
            Event::NoteOff { channel, note } => self.note_off(channel, note, out),
            Event::PitchBend { channel, .. }
            | Event::Pressure { channel, .. }
            | Event::Slide { channel, .. } => self.forward_to_channel(channel, *event, out),
            Event::ParameterChange { .. } | Event::Raw(_) => {}
        }
    }

    fn tick(&mut self, _inputs: &StreamValues, _outputs: &mut StreamValues) {}

    fn reset(&mut self) {
        self.slots.fill(VoiceSlot::default());
        self.next_allocated_age = ALLOCATED_AGE_SEED;
        self.next_unallocated_age = UNALLOCATED_AGE_SEED;
    }

    fn set_sample_rate(&mut self, _: f64) {}

    fn type_id(&self) -> &'static str {
        "voice_allocator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_on(channel: u8, note: f32) -> Event {
        Event::NoteOn {
            channel,
            note,
            velocity: 0.8,
        }
    }

    #[test]
    fn test_voice_allocation_basic() {
        let mut allocator = VoiceAllocator::new(4);
        let mut out = EventBuffer::default();

        assert_eq!(allocator.note_on(0, 60.0, 0.8, &mut out), 0);
        assert_eq!(allocator.note_on(0, 64.0, 0.7, &mut out), 1);
        assert_eq!(allocator.active_count(), 2);

        let events: Vec<_> = out.drain().collect();
        assert_eq!(events[0].0, 0);
        assert_eq!(events[1].0, 1);
        assert!(matches!(events[1].1, Event::NoteOn { note, .. } if note == 64.0));
    }

    #[test]
    fn test_voice_stealing_is_deterministic() {
        let mut allocator = VoiceAllocator::new(8);
        let mut out = EventBuffer::default();

        for i in 0..8 {
            allocator.handle_event(0, &note_on(0, 60.0 + i as f32), &mut out);
        }
        out.clear();

        allocator.handle_event(0, &note_on(0, 80.0), &mut out);
        let events: Vec<_> = out.drain().collect();

        // the stolen voice hears NoteOff for its old note before the new NoteOn
        assert_eq!(
            events,
            vec![
                (0, Event::NoteOff { channel: 0, note: 60.0 }),
                (0, note_on(0, 80.0)),
            ]
        );
        assert_eq!(allocator.slots()[0].note(), 80.0);
        assert_eq!(allocator.active_count(), 8);
    }

    #[test]
    fn test_released_voice_is_reused_first() {
        let mut allocator = VoiceAllocator::new(4);
        let mut out = EventBuffer::default();

        for i in 0..4 {
            allocator.note_on(0, 60.0 + i as f32, 1.0, &mut out);
        }
        allocator.note_off(0, 62.0, &mut out);
        out.clear();

        assert_eq!(allocator.note_on(0, 70.0, 1.0, &mut out), 2);
        // slot 2 was free, so no NoteOff is synthesized
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_longest_released_voice_is_reused_first() {
        let mut allocator = VoiceAllocator::new(4);
        let mut out = EventBuffer::default();

        for i in 0..4 {
            allocator.note_on(0, 60.0 + i as f32, 1.0, &mut out);
        }
        allocator.note_off(0, 63.0, &mut out);
        allocator.note_off(0, 61.0, &mut out);

        assert_eq!(allocator.note_on(0, 70.0, 1.0, &mut out), 3);
        assert_eq!(allocator.note_on(0, 71.0, 1.0, &mut out), 1);
    }

    #[test]
    fn test_note_off_ages_are_increasing() {
        let mut allocator = VoiceAllocator::new(3);
        let mut out = EventBuffer::default();

        for i in 0..3 {
            allocator.note_on(1, 60.0 + i as f32, 1.0, &mut out);
        }
        for i in 0..3 {
            allocator.note_off(1, 60.0 + i as f32, &mut out);
        }

        let ages: Vec<_> = allocator.slots().iter().map(|s| s.voice_age).collect();
        assert!(ages.windows(2).all(|w| w[0] < w[1]));
        assert!(ages.iter().all(|&a| a < ALLOCATED_AGE_SEED));
        assert_eq!(allocator.active_count(), 0);
    }

    #[test]
    fn test_note_off_without_match_is_ignored() {
        let mut allocator = VoiceAllocator::new(2);
        let mut out = EventBuffer::default();

        allocator.note_on(0, 60.0, 1.0, &mut out);
        out.clear();

        allocator.note_off(0, 61.0, &mut out);
        allocator.note_off(1, 60.0, &mut out);
        assert!(out.is_empty());
        assert_eq!(allocator.active_count(), 1);
    }

    #[test]
    fn test_note_off_releases_every_matching_slot() {
        let mut allocator = VoiceAllocator::new(4);
        let mut out = EventBuffer::default();

        allocator.note_on(0, 60.0, 1.0, &mut out);
        allocator.note_on(0, 60.0, 1.0, &mut out);
        out.clear();

        allocator.note_off(0, 60.0, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(allocator.active_count(), 0);
    }

    #[test]
    fn test_expression_reaches_released_voices_on_channel() {
        let mut allocator = VoiceAllocator::new(4);
        let mut out = EventBuffer::default();

        allocator.note_on(2, 60.0, 1.0, &mut out);
        allocator.note_on(3, 62.0, 1.0, &mut out);
        allocator.note_off(2, 60.0, &mut out);
        out.clear();

        let bend = Event::PitchBend {
            channel: 2,
            bend_semitones: 1.0,
        };
        allocator.handle_event(0, &bend, &mut out);
        let events: Vec<_> = out.drain().collect();
        assert_eq!(events, vec![(0, bend)]);

        // unknown channel: no voice hears it
        allocator.handle_event(
            0,
            &Event::Pressure {
                channel: 9,
                pressure: 0.5,
            },
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_all_notes_off() {
        let mut allocator = VoiceAllocator::new(4);
        let mut out = EventBuffer::default();

        allocator.note_on(0, 60.0, 1.0, &mut out);
        allocator.note_on(0, 64.0, 1.0, &mut out);
        out.clear();

        allocator.all_notes_off(&mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(allocator.active_count(), 0);
    }

    #[test]
    fn test_reset_restores_seeds() {
        let mut allocator = VoiceAllocator::new(2);
        let mut out = EventBuffer::default();
        allocator.note_on(0, 60.0, 1.0, &mut out);
        allocator.reset();
        assert_eq!(allocator.active_count(), 0);
        assert!(allocator.slots().iter().all(|s| s.voice_age == 0));
        assert_eq!(allocator.type_id(), "voice_allocator");
    }
}
