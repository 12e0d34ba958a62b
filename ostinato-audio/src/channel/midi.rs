//! MIDI channel payload: replays recorded MIDI actions to the MIDI output
//! and to the channel's instrument plugins.

use ostinato_types::midi::{channel_bits, ALL_NOTES_OFF};
use ostinato_types::{Action, ActionKind, ChannelStatus, MidiEvent};

use super::{ChannelCore, ChannelCtx};

/// Events kept for plugins between two audio blocks.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct MidiData {
    /// Send replayed events to the MIDI output port.
    pub midi_out: bool,
    /// Output MIDI channel, 0-15.
    pub out_chan: u8,
    events: Vec<MidiEvent>,
}

impl Default for MidiData {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiData {
    pub fn new() -> Self {
        Self {
            midi_out: false,
            out_chan: 0,
            events: Vec::with_capacity(EVENT_CAPACITY),
        }
    }

    pub(super) fn duplicate(&self) -> Self {
        Self {
            midi_out: self.midi_out,
            out_chan: self.out_chan,
            events: Vec::with_capacity(EVENT_CAPACITY),
        }
    }

    pub fn set_out_chan(&mut self, chan: u8) {
        self.out_chan = chan.min(15);
    }

    pub(super) fn pending_events(&self) -> &[MidiEvent] {
        &self.events
    }

    pub(super) fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Queue for plugins; drops past capacity rather than allocating on the
    /// audio thread.
    fn push_event(&mut self, event: MidiEvent) {
        if self.events.len() < self.events.capacity() {
            self.events.push(event);
        }
    }

    fn send(&mut self, raw: u32, ctx: &ChannelCtx) {
        if self.midi_out {
            ctx.midi_out.send_raw(raw | channel_bits(self.out_chan));
        }
        self.push_event(MidiEvent::from_raw(raw));
    }

    pub(super) fn all_notes_off(&mut self, ctx: &ChannelCtx) {
        self.send(ALL_NOTES_OFF, ctx);
    }

    pub(super) fn start(&mut self, core: &mut ChannelCore, ctx: &mut ChannelCtx) {
        match core.status() {
            ChannelStatus::Play => core.set_status(ChannelStatus::Ending, ctx),
            ChannelStatus::Ending | ChannelStatus::Wait => {
                if core.status() == ChannelStatus::Ending {
                    self.all_notes_off(ctx);
                }
                core.set_status(ChannelStatus::Off, ctx);
            }
            ChannelStatus::Off => core.set_status(ChannelStatus::Wait, ctx),
            _ => {}
        }
    }

    pub(super) fn kill(&mut self, core: &mut ChannelCore, ctx: &mut ChannelCtx) {
        if core.is_playing() {
            self.all_notes_off(ctx);
        }
        core.set_status(ChannelStatus::Off, ctx);
    }

    pub(super) fn on_zero(&mut self, core: &mut ChannelCore, ctx: &mut ChannelCtx) {
        match core.status() {
            ChannelStatus::Ending => {
                self.all_notes_off(ctx);
                core.set_status(ChannelStatus::Off, ctx);
            }
            ChannelStatus::Wait => core.set_status(ChannelStatus::Play, ctx),
            _ => {}
        }
    }

    pub(super) fn set_mute(&mut self, core: &mut ChannelCore, internal: bool, ctx: &ChannelCtx) {
        if internal {
            core.mute_i = true;
        } else {
            core.mute = true;
        }
        self.all_notes_off(ctx);
    }

    pub(super) fn parse_action(
        &mut self,
        core: &mut ChannelCore,
        action: &Action,
        ctx: &mut ChannelCtx,
    ) {
        match action.kind {
            ActionKind::Midi if core.is_playing() && !core.is_muted() => {
                self.send(action.i_value, ctx)
            }
            ActionKind::MuteOn => self.set_mute(core, true, ctx),
            ActionKind::MuteOff => core.mute_i = false,
            _ => {}
        }
    }

    /// Live input on an armed channel. Events are flattened to MIDI channel
    /// 0 before they reach plugins or the recorder.
    pub(super) fn receive_midi(
        &mut self,
        core: &mut ChannelCore,
        event: MidiEvent,
        can_rec: bool,
        ctx: &mut ChannelCtx,
    ) {
        if !core.armed {
            return;
        }
        let flat = event.with_channel(0);
        self.push_event(flat);
        if can_rec {
            let action = Action::new(core.id, ctx.clock.current_frame(), ActionKind::Midi)
                .with_values(flat.raw(), 0.0);
            ctx.rec(action);
            core.has_actions = true;
        }
    }
}
