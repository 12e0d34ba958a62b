//! Action log: recorded performance events keyed by frame.
//!
//! Actions are kept sorted by frame (insertion order within a frame) so the
//! mixer can look up everything due in a frame window with two binary
//! searches. Writes from the audio thread arrive through [`RecQueue`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use ostinato_types::{Action, ActionKind, ActionMask, ChannelId};

/// A key or mute pair being recorded between two gestures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overdub {
    pub channel: ChannelId,
    pub start: ActionKind,
    pub end: ActionKind,
    pub start_frame: u32,
}

/// Frames of drift below a quanto boundary that snap onto it after a tempo change.
const BPM_SNAP_FRAMES: u32 = 6;

/// A recorder write queued while the channel lock is held.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecOp {
    Rec(Action),
    StartOverdub {
        channel: ChannelId,
        mask: ActionMask,
        frame: u32,
    },
    StopOverdub {
        frame: u32,
    },
}

/// Recorder writes queued by the audio thread.
pub const REC_QUEUE_CAPACITY: usize = 4096;

/// Hands recorder writes from the audio thread to the control side.
///
/// The audio thread only ever `push`es: a full queue drops the write and
/// counts it. Writes are applied to the [`ActionRecorder`] by whoever next
/// takes the recorder on the control side.
pub struct RecQueue {
    tx: Sender<RecOp>,
    rx: Receiver<RecOp>,
    dropped: AtomicU64,
}

impl Default for RecQueue {
    fn default() -> Self {
        Self::new(REC_QUEUE_CAPACITY)
    }
}

impl RecQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, op: RecOp) {
        match self.tx.try_send(op) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Wait up to `timeout` for the next write.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RecOp> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Apply everything queued so far. Returns how many writes were applied.
    pub fn drain_into(
        &self,
        recorder: &mut ActionRecorder,
        total_frames: u32,
        buffer_frames: u32,
    ) -> usize {
        let mut n = 0;
        for op in self.rx.try_iter() {
            recorder.apply(op, total_frames, buffer_frames);
            n += 1;
        }
        n
    }
}

#[derive(Debug, Default)]
pub struct ActionRecorder {
    actions: Vec<Action>,
    overdub: Option<Overdub>,
}

impl ActionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a queued write.
    pub fn apply(&mut self, op: RecOp, total_frames: u32, buffer_frames: u32) {
        match op {
            RecOp::Rec(action) => {
                self.rec(action);
            }
            RecOp::StartOverdub {
                channel,
                mask,
                frame,
            } => self.start_overdub(channel, mask, frame, buffer_frames),
            RecOp::StopOverdub { frame } => self.stop_overdub(frame, total_frames),
        }
    }

    /// Replace the whole log, e.g. from a patch.
    pub fn load(&mut self, mut actions: Vec<Action>) {
        actions.sort_by_key(|a| a.frame);
        self.actions = actions;
        self.overdub = None;
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Record an action. Returns false if an identical one already exists.
    pub fn rec(&mut self, action: Action) -> bool {
        if self.actions.iter().any(|a| a.same_event(&action)) {
            return false;
        }
        let pos = self.actions.partition_point(|a| a.frame <= action.frame);
        self.actions.insert(pos, action);
        true
    }

    /// Actions with `start <= frame < end`.
    pub fn window(&self, start: u32, end: u32) -> &[Action] {
        let lo = self.actions.partition_point(|a| a.frame < start);
        let hi = self.actions.partition_point(|a| a.frame < end);
        &self.actions[lo..hi.max(lo)]
    }

    pub fn actions_at(&self, frame: u32) -> &[Action] {
        self.window(frame, frame.saturating_add(1))
    }

    pub fn action_at(&self, channel: ChannelId, frame: u32, kind: ActionKind) -> Option<&Action> {
        self.actions_at(frame)
            .iter()
            .find(|a| a.channel == channel && a.kind == kind)
    }

    /// First action of `channel` after `frame` whose kind is in `mask`. A
    /// non-zero `i_value` must also be fully contained in the action's value.
    pub fn next_action(
        &self,
        channel: ChannelId,
        mask: ActionMask,
        frame: u32,
        i_value: u32,
    ) -> Option<&Action> {
        let from = self.actions.partition_point(|a| a.frame <= frame);
        self.actions[from..].iter().find(|a| {
            a.channel == channel
                && mask.contains(a.kind)
                && (i_value == 0 || a.i_value & i_value == i_value)
        })
    }

    /// First action of `channel` in `mask`, from the start of the loop.
    pub fn first_action(&self, channel: ChannelId, mask: ActionMask) -> Option<&Action> {
        self.actions
            .iter()
            .find(|a| a.channel == channel && mask.contains(a.kind))
    }

    pub fn has_actions(&self, channel: ChannelId) -> bool {
        self.actions.iter().any(|a| a.channel == channel)
    }

    pub fn clear_channel(&mut self, channel: ChannelId) {
        self.actions.retain(|a| a.channel != channel);
    }

    /// Remove actions of `channel` whose kind is in `mask`.
    pub fn clear_kind(&mut self, channel: ChannelId, mask: ActionMask) {
        self.actions
            .retain(|a| !(a.channel == channel && mask.contains(a.kind)));
    }

    pub fn clear_all(&mut self) {
        self.actions.clear();
        self.overdub = None;
    }

    /// Delete one action. With `values`, the payload must match too.
    pub fn delete_action(
        &mut self,
        channel: ChannelId,
        frame: u32,
        kind: ActionKind,
        values: Option<(u32, f32)>,
    ) -> bool {
        let pos = self.actions.iter().position(|a| {
            a.channel == channel
                && a.frame == frame
                && a.kind == kind
                && values.map_or(true, |(i, f)| a.i_value == i && a.f_value == f)
        });
        match pos {
            Some(p) => {
                self.actions.remove(p);
                true
            }
            None => false,
        }
    }

    /// Delete actions of `kind` strictly between frames `a` and `b`.
    pub fn delete_actions(&mut self, channel: ChannelId, a: u32, b: u32, kind: ActionKind) {
        self.actions
            .retain(|x| !(x.channel == channel && x.kind == kind && x.frame > a && x.frame < b));
    }

    /// Re-sort after bulk edits.
    pub fn sort(&mut self) {
        self.actions.sort_by_key(|a| a.frame);
    }

    /// Rescale frames after a tempo change. Frames that land at most a few
    /// frames short of a `quanto` boundary snap onto it.
    pub fn update_bpm(&mut self, old_bpm: f32, new_bpm: f32, quanto: u32) {
        if old_bpm <= 0.0 || new_bpm <= 0.0 {
            return;
        }
        for a in &mut self.actions {
            let mut frame = (a.frame as f64 / new_bpm as f64 * old_bpm as f64) as u32;
            if quanto > 1 {
                let short = (quanto - frame % quanto) % quanto;
                if short > 0 && short <= BPM_SNAP_FRAMES {
                    frame += short;
                }
            }
            a.frame = frame;
        }
        self.sort();
    }

    /// Rescale frames recorded at `patch_rate` to `system_rate`.
    pub fn update_samplerate(&mut self, system_rate: u32, patch_rate: u32) {
        if system_rate == patch_rate || patch_rate == 0 {
            return;
        }
        let ratio = system_rate as f64 / patch_rate as f64;
        for a in &mut self.actions {
            a.frame = (a.frame as f64 * ratio).floor() as u32;
        }
        self.sort();
    }

    /// Copy the loop's actions forward to fill a longer loop.
    pub fn expand(&mut self, old_total: u32, new_total: u32) {
        if old_total == 0 || new_total <= old_total {
            return;
        }
        let passes = (new_total / old_total).saturating_sub(1).max(1);
        let originals: Vec<Action> = self
            .actions
            .iter()
            .filter(|a| a.frame < old_total)
            .copied()
            .collect();
        for z in 1..=passes {
            for a in &originals {
                let frame = a.frame + old_total * z;
                if frame < new_total {
                    self.rec(Action { frame, ..*a });
                }
            }
        }
    }

    /// Drop actions past the end of a shorter loop.
    pub fn shrink(&mut self, new_total: u32) {
        self.actions.retain(|a| a.frame < new_total);
    }

    pub fn overdub(&self) -> Option<&Overdub> {
        self.overdub.as_ref()
    }

    /// Record the opening action of a pair. If that lands inside an existing
    /// pair, that pair is closed one buffer earlier so it doesn't swallow ours.
    pub fn start_overdub(
        &mut self,
        channel: ChannelId,
        mask: ActionMask,
        frame: u32,
        buffer_frames: u32,
    ) {
        let (start, end) = if mask == ActionMask::KEYS {
            (ActionKind::KeyPress, ActionKind::KeyRelease)
        } else {
            (ActionKind::MuteOn, ActionKind::MuteOff)
        };
        self.overdub = Some(Overdub {
            channel,
            start,
            end,
            start_frame: frame,
        });
        self.rec(Action::new(channel, frame, start));

        let next_kind = self
            .next_action(channel, start | end, frame, 0)
            .map(|a| a.kind);
        if next_kind == Some(end) {
            self.rec(Action::new(channel, frame.saturating_sub(buffer_frames), end));
        }
    }

    /// Close the current pair at `current_frame`.
    pub fn stop_overdub(&mut self, current_frame: u32, total_frames: u32) {
        let Some(od) = self.overdub.take() else {
            return;
        };
        let ch = od.channel;

        if current_frame == od.start_frame {
            // Null loop: nothing between the two gestures.
            self.delete_action(ch, od.start_frame, od.start, None);
            return;
        }

        let ring = current_frame < od.start_frame;
        if ring {
            self.rec(Action::new(ch, total_frames.saturating_sub(1), od.end));
        } else {
            self.delete_actions(ch, od.start_frame, current_frame, od.start);
            self.delete_actions(ch, od.start_frame, current_frame, od.end);
            self.rec(Action::new(ch, current_frame, od.end));
        }
        self.fix_overdub_truncation(&od, current_frame);
    }

    /// An end action directly after our closing one belongs to a pair we cut
    /// through; drop it.
    fn fix_overdub_truncation(&mut self, od: &Overdub, end_frame: u32) {
        let orphan = self
            .next_action(od.channel, od.start | od.end, end_frame, 0)
            .filter(|a| a.kind == od.end)
            .map(|a| a.frame);
        if let Some(frame) = orphan {
            log::debug!(target: "recorder", "removing truncated {} at {}", od.end.name(), frame);
            self.delete_action(od.channel, frame, od.end, None);
        }
    }
}
