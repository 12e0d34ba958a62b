//! Outbound MIDI queue.
//!
//! The audio thread and control threads push fixed-size messages into a
//! bounded crossbeam channel; the MIDI output thread drains it and writes to
//! the device. Pushing never blocks or allocates: a full queue drops the
//! message and bumps a counter.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Long enough for an MTC full-frame SysEx.
pub const MAX_MSG_LEN: usize = 10;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiOutMsg {
    data: [u8; MAX_MSG_LEN],
    len: u8,
}

impl MidiOutMsg {
    /// Three-byte message from a packed `status<<24 | d1<<16 | d2<<8` value.
    pub fn from_raw(raw: u32) -> Self {
        Self::from_bytes(&[(raw >> 24) as u8, (raw >> 16) as u8, (raw >> 8) as u8])
    }

    /// Truncates to [`MAX_MSG_LEN`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len().min(MAX_MSG_LEN);
        let mut data = [0u8; MAX_MSG_LEN];
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            data,
            len: len as u8,
        }
    }

    pub fn realtime(status: u8) -> Self {
        Self::from_bytes(&[status])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

pub struct MidiOut {
    tx: Sender<MidiOutMsg>,
    rx: Receiver<MidiOutMsg>,
    dropped: AtomicU64,
}

impl Default for MidiOut {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MidiOut {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn send(&self, msg: MidiOutMsg) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn send_raw(&self, raw: u32) {
        self.send(MidiOutMsg::from_raw(raw));
    }

    /// Handle for the output thread.
    pub fn receiver(&self) -> Receiver<MidiOutMsg> {
        self.rx.clone()
    }

    /// Take everything queued so far.
    pub fn drain(&self) -> Vec<MidiOutMsg> {
        self.rx.try_iter().collect()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_to_bytes() {
        let m = MidiOutMsg::from_raw(0xB07B_0000);
        assert_eq!(m.as_bytes(), &[0xB0, 0x7B, 0x00]);
        assert_eq!(MidiOutMsg::realtime(0xF8).as_bytes(), &[0xF8]);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let out = MidiOut::new(2);
        out.send_raw(0x9000_0000);
        out.send_raw(0x9001_0000);
        out.send_raw(0x9002_0000);
        assert_eq!(out.dropped(), 1);
        assert_eq!(out.drain().len(), 2);
        assert!(out.drain().is_empty());
    }
}
