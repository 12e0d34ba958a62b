//! Effect and instrument plugin stacks.
//!
//! Plugins come from a [`PluginLoader`] keyed by a uid string. A uid the
//! loader can't resolve still gets a slot, marked missing, so a patch keeps
//! its layout and the entry can be saved back unchanged.
//!
//! The two master stacks live here, each behind its own [`RtMutex`]. Channel
//! stacks are owned by their channel and share the channel lock.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use ostinato_types::{MidiEvent, PluginId};

use crate::rt_lock::RtMutex;

pub trait Plugin: Send {
    fn uid(&self) -> &str;

    fn name(&self) -> &str;

    fn param_count(&self) -> usize;

    fn param(&self, index: usize) -> f32;

    /// `value` is normalized to 0..=1.
    fn set_param(&mut self, index: usize, value: f32);

    fn param_name(&self, index: usize) -> String {
        format!("param {}", index)
    }

    /// Instruments render into a silent buffer that is then mixed on top.
    fn is_instrument(&self) -> bool {
        false
    }

    /// Process interleaved stereo audio in place.
    fn process(&mut self, buf: &mut [f32], midi: &[MidiEvent]);
}

pub trait PluginLoader: Send + Sync {
    fn load(
        &self,
        uid: &str,
        sample_rate: u32,
        buffer_frames: usize,
    ) -> Result<Box<dyn Plugin>, String>;

    /// Uids this loader can instantiate.
    fn available(&self) -> Vec<String>;
}

pub struct PluginSlot {
    pub id: PluginId,
    uid: String,
    instance: Option<Box<dyn Plugin>>,
    pub bypass: bool,
    /// Learned MIDI message per parameter index; 0 is unset.
    pub midi_in_params: Vec<u32>,
}

impl fmt::Debug for PluginSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSlot")
            .field("id", &self.id)
            .field("uid", &self.uid)
            .field("missing", &self.instance.is_none())
            .field("bypass", &self.bypass)
            .finish()
    }
}

impl PluginSlot {
    pub fn new(id: PluginId, instance: Box<dyn Plugin>) -> Self {
        let params = instance.param_count();
        Self {
            id,
            uid: instance.uid().to_string(),
            instance: Some(instance),
            bypass: false,
            midi_in_params: vec![0; params],
        }
    }

    pub fn missing(id: PluginId, uid: &str) -> Self {
        Self {
            id,
            uid: uid.to_string(),
            instance: None,
            bypass: false,
            midi_in_params: Vec::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn is_missing(&self) -> bool {
        self.instance.is_none()
    }

    pub fn name(&self) -> &str {
        self.instance.as_ref().map_or(self.uid.as_str(), |p| p.name())
    }

    pub fn param_count(&self) -> usize {
        self.instance.as_ref().map_or(0, |p| p.param_count())
    }

    pub fn param(&self, index: usize) -> Option<f32> {
        let p = self.instance.as_ref()?;
        (index < p.param_count()).then(|| p.param(index))
    }

    pub fn param_name(&self, index: usize) -> Option<String> {
        let p = self.instance.as_ref()?;
        (index < p.param_count()).then(|| p.param_name(index))
    }

    /// Out-of-range indices are a caller bug; ignored in release builds.
    pub fn set_param(&mut self, index: usize, value: f32) {
        if let Some(p) = self.instance.as_mut() {
            debug_assert!(index < p.param_count(), "param {} out of range", index);
            if index < p.param_count() {
                p.set_param(index, value.clamp(0.0, 1.0));
            }
        }
    }

    pub fn params(&self) -> Vec<f32> {
        (0..self.param_count())
            .filter_map(|i| self.param(i))
            .collect()
    }
}

/// Everything needed to recreate a slot: uid, parameter values, bypass and
/// learned MIDI params.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSnapshot {
    pub uid: String,
    pub params: Vec<f32>,
    pub bypass: bool,
    pub midi_in_params: Vec<u32>,
}

impl PluginSlot {
    pub fn snapshot(&self) -> PluginSnapshot {
        PluginSnapshot {
            uid: self.uid.clone(),
            params: self.params(),
            bypass: self.bypass,
            midi_in_params: self.midi_in_params.clone(),
        }
    }
}

#[derive(Debug)]
pub struct PluginStack {
    slots: Vec<PluginSlot>,
    /// Instrument render buffer.
    scratch: Vec<f32>,
}

impl Default for PluginStack {
    fn default() -> Self {
        Self::new(0)
    }
}

impl PluginStack {
    pub fn new(buffer_frames: usize) -> Self {
        Self {
            slots: Vec::new(),
            scratch: vec![0.0; buffer_frames * 2],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push(&mut self, slot: PluginSlot) {
        self.slots.push(slot);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginSlot> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PluginSlot> {
        self.slots.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&PluginSlot> {
        self.slots.get(index)
    }

    pub fn index_of(&self, id: PluginId) -> Option<usize> {
        self.slots.iter().position(|s| s.id == id)
    }

    pub fn by_id(&self, id: PluginId) -> Option<&PluginSlot> {
        self.slots.iter().find(|s| s.id == id)
    }

    pub fn by_id_mut(&mut self, id: PluginId) -> Option<&mut PluginSlot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    pub fn remove(&mut self, id: PluginId) -> Option<PluginSlot> {
        let index = self.index_of(id)?;
        Some(self.slots.remove(index))
    }

    /// Swap the positions of two plugins.
    pub fn swap(&mut self, a: PluginId, b: PluginId) -> Result<(), String> {
        let ia = self
            .index_of(a)
            .ok_or_else(|| format!("Plugin {} not in stack", a))?;
        let ib = self
            .index_of(b)
            .ok_or_else(|| format!("Plugin {} not in stack", b))?;
        self.slots.swap(ia, ib);
        Ok(())
    }

    /// Drop every slot, returning them so the caller can free them off the
    /// audio thread.
    pub fn take_all(&mut self) -> Vec<PluginSlot> {
        std::mem::take(&mut self.slots)
    }

    /// Run the stack in order over `buf`. Bypassed and missing slots pass
    /// audio through.
    pub fn process(&mut self, buf: &mut [f32], midi: &[MidiEvent]) {
        if self.scratch.len() < buf.len() {
            self.scratch.resize(buf.len(), 0.0);
        }
        for slot in &mut self.slots {
            if slot.bypass {
                continue;
            }
            let Some(plugin) = slot.instance.as_mut() else {
                continue;
            };
            if plugin.is_instrument() {
                let scratch = &mut self.scratch[..buf.len()];
                scratch.fill(0.0);
                plugin.process(scratch, midi);
                for (b, s) in buf.iter_mut().zip(scratch.iter()) {
                    *b += s;
                }
            } else {
                plugin.process(buf, midi);
            }
        }
    }
}

/// Which master stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterStack {
    Out,
    In,
}

pub struct PluginHost {
    master_out: RtMutex<PluginStack>,
    master_in: RtMutex<PluginStack>,
    loader: Box<dyn PluginLoader>,
    next_id: AtomicU32,
    missing: Mutex<Vec<String>>,
    sample_rate: u32,
    buffer_frames: usize,
}

impl PluginHost {
    pub fn new(loader: Box<dyn PluginLoader>, sample_rate: u32, buffer_frames: usize) -> Self {
        Self {
            master_out: RtMutex::new(PluginStack::new(buffer_frames)),
            master_in: RtMutex::new(PluginStack::new(buffer_frames)),
            loader,
            next_id: AtomicU32::new(1),
            missing: Mutex::new(Vec::new()),
            sample_rate,
            buffer_frames,
        }
    }

    pub fn master(&self, stack: MasterStack) -> &RtMutex<PluginStack> {
        match stack {
            MasterStack::Out => &self.master_out,
            MasterStack::In => &self.master_in,
        }
    }

    pub fn available(&self) -> Vec<String> {
        self.loader.available()
    }

    fn next_id(&self) -> PluginId {
        PluginId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Instantiate `uid`. Load failures yield a missing slot and are logged.
    pub fn create(&self, uid: &str) -> PluginSlot {
        let id = self.next_id();
        match self.loader.load(uid, self.sample_rate, self.buffer_frames) {
            Ok(instance) => {
                log::info!(target: "plugins", "loaded {} as {}", uid, id);
                PluginSlot::new(id, instance)
            }
            Err(e) => {
                log::warn!(target: "plugins", "plugin {} unavailable: {}", uid, e);
                if let Ok(mut missing) = self.missing.lock() {
                    if !missing.iter().any(|m| m == uid) {
                        missing.push(uid.to_string());
                    }
                }
                PluginSlot::missing(id, uid)
            }
        }
    }

    /// Fresh instance built from a snapshot. Load it outside any stack lock.
    pub fn instantiate(&self, snapshot: &PluginSnapshot) -> PluginSlot {
        let mut slot = self.create(&snapshot.uid);
        for (i, &value) in snapshot.params.iter().enumerate().take(slot.param_count()) {
            slot.set_param(i, value);
        }
        slot.bypass = snapshot.bypass;
        if !snapshot.midi_in_params.is_empty() {
            slot.midi_in_params = snapshot.midi_in_params.clone();
        }
        slot
    }

    /// Fresh instance of the same plugin with the same parameter values and
    /// learned MIDI params.
    pub fn clone_slot(&self, src: &PluginSlot) -> PluginSlot {
        self.instantiate(&src.snapshot())
    }

    /// Uids that failed to load since the last call.
    pub fn take_missing(&self) -> Vec<String> {
        self.missing
            .lock()
            .map(|mut m| std::mem::take(&mut *m))
            .unwrap_or_default()
    }

    /// Empty both master stacks.
    pub fn free_masters(&self) {
        for stack in [MasterStack::Out, MasterStack::In] {
            let slots = self.master(stack).lock().take_all();
            drop(slots);
        }
    }
}
