//! The closed set of unit kinds a graph can hold
//!
//! Graph nodes store a [`UnitKind`] rather than a trait object so the audio
//! path dispatches through a `match` instead of a vtable. Anything outside
//! the built-in set goes through [`UnitKind::Custom`].

use crate::allocator::VoiceAllocator;
use crate::effects::{Delay, Reverb};
use crate::envelope::Envelope;
use crate::event::Event;
use crate::filter::LowPassFilter;
use crate::mix::{Bus, Crossfade, Vca};
use crate::note::NoteTracker;
use crate::oscillator::Oscillator;
use crate::parameters::ParameterAggregator;
use crate::port::{EventBuffer, PortId, PortSpec, StreamValues, Unit};

pub enum UnitKind {
    Allocator(VoiceAllocator),
    NoteTracker(NoteTracker),
    Oscillator(Oscillator),
    Envelope(Envelope),
    Filter(LowPassFilter),
    Crossfade(Crossfade),
    Vca(Vca),
    Bus(Bus),
    Delay(Delay),
    Reverb(Reverb),
    Aggregator(ParameterAggregator),
    Custom(Box<dyn Unit>),
}

macro_rules! dispatch {
    ($self:expr, $unit:ident => $body:expr) => {
        match $self {
            UnitKind::Allocator($unit) => $body,
            UnitKind::NoteTracker($unit) => $body,
            UnitKind::Oscillator($unit) => $body,
            UnitKind::Envelope($unit) => $body,
            UnitKind::Filter($unit) => $body,
            UnitKind::Crossfade($unit) => $body,
            UnitKind::Vca($unit) => $body,
            UnitKind::Bus($unit) => $body,
            UnitKind::Delay($unit) => $body,
            UnitKind::Reverb($unit) => $body,
            UnitKind::Aggregator($unit) => $body,
            UnitKind::Custom($unit) => $body,
        }
    };
}

macro_rules! impl_from_unit {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for UnitKind {
                fn from(unit: $ty) -> Self {
                    UnitKind::$variant(unit)
                }
            }
        )*
    };
}

impl_from_unit! {
    Allocator(VoiceAllocator),
    NoteTracker(NoteTracker),
    Oscillator(Oscillator),
    Envelope(Envelope),
    Filter(LowPassFilter),
    Crossfade(Crossfade),
    Vca(Vca),
    Bus(Bus),
    Delay(Delay),
    Reverb(Reverb),
    Aggregator(ParameterAggregator),
    Custom(Box<dyn Unit>),
}

impl UnitKind {
    pub fn as_allocator(&self) -> Option<&VoiceAllocator> {
        match self {
            UnitKind::Allocator(allocator) => Some(allocator),
            _ => None,
        }
    }

    pub fn as_allocator_mut(&mut self) -> Option<&mut VoiceAllocator> {
        match self {
            UnitKind::Allocator(allocator) => Some(allocator),
            _ => None,
        }
    }

    pub fn as_note_tracker(&self) -> Option<&NoteTracker> {
        match self {
            UnitKind::NoteTracker(tracker) => Some(tracker),
            _ => None,
        }
    }

    pub fn as_envelope(&self) -> Option<&Envelope> {
        match self {
            UnitKind::Envelope(envelope) => Some(envelope),
            _ => None,
        }
    }
}

impl Unit for UnitKind {
    fn port_spec(&self) -> &PortSpec {
        dispatch!(self, unit => unit.port_spec())
    }

    #[inline]
    fn handle_event(&mut self, input: PortId, event: &Event, out: &mut EventBuffer) {
        dispatch!(self, unit => unit.handle_event(input, event, out))
    }

    #[inline]
    fn tick(&mut self, inputs: &StreamValues, outputs: &mut StreamValues) {
        dispatch!(self, unit => unit.tick(inputs, outputs))
    }

    fn reset(&mut self) {
        dispatch!(self, unit => unit.reset())
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        dispatch!(self, unit => unit.set_sample_rate(sample_rate))
    }

    fn type_id(&self) -> &'static str {
        dispatch!(self, unit => unit.type_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f32, PortSpec);

    impl Unit for Constant {
        fn port_spec(&self) -> &PortSpec {
            &self.1
        }

        fn tick(&mut self, _inputs: &StreamValues, outputs: &mut StreamValues) {
            outputs.set(0, self.0);
        }

        fn reset(&mut self) {}

        fn set_sample_rate(&mut self, _: f64) {}
    }

    #[test]
    fn test_dispatch_reaches_inner_unit() {
        let mut kind = UnitKind::from(Vca::new());
        assert_eq!(kind.type_id(), "vca");
        assert_eq!(kind.port_spec().inputs.len(), 2);

        let mut inputs = StreamValues::new();
        let mut outputs = StreamValues::new();
        inputs.set(Vca::IN, 2.0);
        inputs.set(Vca::GAIN_IN, 0.5);
        kind.tick(&inputs, &mut outputs);
        assert_eq!(outputs.get(Vca::OUT), 1.0);
    }

    #[test]
    fn test_custom_units() {
        let boxed: Box<dyn Unit> = Box::new(Constant(0.25, PortSpec::new()));
        let mut kind = UnitKind::from(boxed);
        assert_eq!(kind.type_id(), "unknown");

        let mut outputs = StreamValues::new();
        kind.tick(&StreamValues::new(), &mut outputs);
        assert_eq!(outputs.get(0), 0.25);
        assert!(kind.as_allocator().is_none());
    }

    #[test]
    fn test_accessors() {
        let kind = UnitKind::from(VoiceAllocator::new(4));
        assert_eq!(kind.as_allocator().map(|a| a.num_voices()), Some(4));
        assert!(kind.as_note_tracker().is_none());
        assert!(kind.as_envelope().is_none());
    }
}
