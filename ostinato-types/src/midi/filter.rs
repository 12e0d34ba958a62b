//! Template + mask matching of MIDI messages.
//!
//! A [`MsgPattern`] compares each message byte with a template byte under a
//! mask (mask bits set to 0 are ignored). Patterns combine into a
//! [`MidiMsgFilter`] with `&`, `|` and `!`; `&` of two compatible patterns is
//! merged back into a single pattern.

use std::ops::{BitAnd, BitOr, Not};

use super::{MidiEvent, MidiMsg};

/// Byte pattern: template, mask, and whether messages may be longer than it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgPattern {
    template: Vec<u8>,
    mask: Vec<u8>,
    allow_longer: bool,
    /// Expected sender port; `None` accepts any.
    sender: Option<String>,
}

impl MsgPattern {
    /// Transparent pattern of `len` bytes.
    pub fn with_length(len: usize, allow_longer: bool) -> Self {
        Self {
            template: vec![0; len],
            mask: vec![0; len],
            allow_longer,
            sender: None,
        }
    }

    /// Shorter of the two slices decides the length.
    pub fn from_mask_template(mask: &[u8], template: &[u8], allow_longer: bool) -> Self {
        let len = mask.len().min(template.len());
        Self {
            template: template[..len].to_vec(),
            mask: mask[..len].to_vec(),
            allow_longer,
            sender: None,
        }
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn set_template_byte(&mut self, n: usize, b: u8) {
        self.grow_to(n + 1);
        self.template[n] = b;
    }

    pub fn set_mask_byte(&mut self, n: usize, b: u8) {
        self.grow_to(n + 1);
        self.mask[n] = b;
    }

    pub fn or_template_byte(&mut self, n: usize, b: u8, shl: u32) {
        self.grow_to(n + 1);
        self.template[n] |= b.wrapping_shl(shl);
    }

    pub fn or_mask_byte(&mut self, n: usize, b: u8, shl: u32) {
        self.grow_to(n + 1);
        self.mask[n] |= b.wrapping_shl(shl);
    }

    /// Stop comparing the bits of byte `n` that are 0 in `keep`. Bits that are
    /// already ignored stay ignored.
    pub fn ignore_byte(&mut self, n: usize, keep: u8) {
        if let Some(m) = self.mask.get_mut(n) {
            *m &= keep;
        }
    }

    /// Truncate, or expand with transparent bytes.
    pub fn set_length(&mut self, len: usize) {
        self.template.resize(len, 0);
        self.mask.resize(len, 0);
    }

    pub fn allow_longer(&mut self) {
        self.allow_longer = true;
    }

    pub fn disallow_longer(&mut self) {
        self.allow_longer = false;
    }

    pub fn set_sender(&mut self, sender: Option<String>) {
        self.sender = sender;
    }

    pub fn check_bytes(&self, bytes: &[u8], sender: &str) -> bool {
        if let Some(expected) = &self.sender {
            if expected != sender {
                return false;
            }
        }
        if bytes.len() < self.len() {
            return false;
        }
        if bytes.len() > self.len() && !self.allow_longer {
            return false;
        }
        bytes
            .iter()
            .zip(self.template.iter().zip(&self.mask))
            .all(|(b, (t, m))| (b ^ t) & m == 0)
    }

    fn grow_to(&mut self, len: usize) {
        if self.len() < len {
            self.set_length(len);
        }
    }

    /// Merge two patterns into one that matches exactly their intersection,
    /// if that is expressible as a single pattern.
    fn try_merge(&self, other: &MsgPattern) -> Option<MsgPattern> {
        if self.sender != other.sender && self.sender.is_some() && other.sender.is_some() {
            return None;
        }
        // Length constraints only merge when both accept the longer length.
        let (short, long) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        if short.len() < long.len() && !short.allow_longer {
            return None;
        }
        let allow_longer = short.allow_longer && long.allow_longer;
        let mut merged = MsgPattern::with_length(long.len(), allow_longer);
        for i in 0..long.len() {
            let t1 = short.template.get(i).copied().unwrap_or(0);
            let m1 = short.mask.get(i).copied().unwrap_or(0);
            let (t2, m2) = (long.template[i], long.mask[i]);
            if (t1 ^ t2) & m1 & m2 != 0 {
                return None;
            }
            merged.mask[i] = m1 | m2;
            merged.template[i] = (t1 & m1) | (t2 & m2);
        }
        merged.sender = self.sender.clone().or_else(|| other.sender.clone());
        Some(merged)
    }
}

#[derive(Debug, Clone)]
enum Node {
    Pattern(MsgPattern),
    Predicate(fn(&[u8]) -> bool),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
}

impl Node {
    fn check(&self, bytes: &[u8], sender: &str) -> bool {
        match self {
            Node::Pattern(p) => p.check_bytes(bytes, sender),
            Node::Predicate(f) => f(bytes),
            Node::And(a, b) => a.check(bytes, sender) && b.check(bytes, sender),
            Node::Or(a, b) => a.check(bytes, sender) || b.check(bytes, sender),
            Node::Not(a) => !a.check(bytes, sender),
        }
    }
}

/// A composable MIDI message classifier.
#[derive(Debug, Clone)]
pub struct MidiMsgFilter {
    node: Node,
}

impl MidiMsgFilter {
    pub fn from_pattern(pattern: MsgPattern) -> Self {
        Self {
            node: Node::Pattern(pattern),
        }
    }

    /// Passes only messages identical to `msg` (or starting with it, with
    /// `allow_longer`).
    pub fn from_msg(msg: &MidiMsg, allow_longer: bool) -> Self {
        let mask = vec![0xFF; msg.len()];
        Self::from_mask_template(&mask, msg.bytes(), allow_longer)
    }

    /// Fully transparent: passes every message, including empty ones.
    pub fn any() -> Self {
        Self::from_pattern(MsgPattern::with_length(0, true))
    }

    /// Transparent filter that only checks message length.
    pub fn with_length(len: usize, allow_longer: bool) -> Self {
        Self::from_pattern(MsgPattern::with_length(len, allow_longer))
    }

    pub fn from_mask_template(mask: &[u8], template: &[u8], allow_longer: bool) -> Self {
        Self::from_pattern(MsgPattern::from_mask_template(mask, template, allow_longer))
    }

    /// Extra predicate over the raw bytes.
    pub fn predicate(f: fn(&[u8]) -> bool) -> Self {
        Self {
            node: Node::Predicate(f),
        }
    }

    pub fn note_on_off() -> Self {
        Self::from_mask_template(&[0xE0, 0, 0], &[0x80, 0, 0], false)
    }

    pub fn note_on() -> Self {
        Self::from_mask_template(&[0xF0, 0, 0], &[0x90, 0, 0], false)
    }

    pub fn note_off() -> Self {
        Self::from_mask_template(&[0xF0, 0, 0], &[0x80, 0, 0], false)
    }

    pub fn cc() -> Self {
        Self::from_mask_template(&[0xF0, 0, 0], &[0xB0, 0, 0], false)
    }

    pub fn pitch_wheel() -> Self {
        Self::from_mask_template(&[0xF0, 0, 0], &[0xE0, 0, 0], false)
    }

    pub fn note_on_off_cc() -> Self {
        Self::note_on_off() | Self::cc()
    }

    /// "On" messages: note-ons, and controllers with value >= 64.
    pub fn boolean() -> Self {
        Self::note_on() | Self::from_mask_template(&[0xF0, 0, 0x40], &[0xB0, 0, 0x40], false)
    }

    /// Channel-voice messages on MIDI channel `ch` (1-16). Out-of-range
    /// channels give a transparent filter.
    pub fn channel(ch: u8) -> Self {
        if !(1..=16).contains(&ch) {
            return Self::any();
        }
        Self::from_mask_template(&[0x0F], &[ch - 1], true)
    }

    /// Messages whose first data byte is `n` (0-127). Out of range gives a
    /// transparent filter.
    pub fn note(n: u8) -> Self {
        if n > 127 {
            return Self::any();
        }
        Self::from_mask_template(&[0x00, 0xFF], &[0x00, n], true)
    }

    /// Controller number `p`; same layout as [`MidiMsgFilter::note`].
    pub fn param(p: u8) -> Self {
        Self::note(p)
    }

    /// Access the single pattern of an uncombined filter.
    pub fn pattern_mut(&mut self) -> Option<&mut MsgPattern> {
        match &mut self.node {
            Node::Pattern(p) => Some(p),
            _ => None,
        }
    }

    pub fn check(&self, msg: &MidiMsg) -> bool {
        self.node.check(msg.bytes(), msg.sender())
    }

    pub fn check_bytes(&self, bytes: &[u8]) -> bool {
        self.node.check(bytes, "")
    }

    /// Checks the event's bytes; empty events only pass filters that accept
    /// zero-length messages.
    pub fn check_event(&self, ev: &MidiEvent) -> bool {
        let bytes = ev.bytes();
        self.node.check(&bytes[..ev.len()], "")
    }
}

impl Default for MidiMsgFilter {
    fn default() -> Self {
        Self::any()
    }
}

impl BitAnd for MidiMsgFilter {
    type Output = MidiMsgFilter;
    fn bitand(self, rhs: MidiMsgFilter) -> MidiMsgFilter {
        if let (Node::Pattern(a), Node::Pattern(b)) = (&self.node, &rhs.node) {
            if let Some(merged) = a.try_merge(b) {
                return MidiMsgFilter::from_pattern(merged);
            }
        }
        MidiMsgFilter {
            node: Node::And(Box::new(self.node), Box::new(rhs.node)),
        }
    }
}

impl BitOr for MidiMsgFilter {
    type Output = MidiMsgFilter;
    fn bitor(self, rhs: MidiMsgFilter) -> MidiMsgFilter {
        MidiMsgFilter {
            node: Node::Or(Box::new(self.node), Box::new(rhs.node)),
        }
    }
}

impl Not for MidiMsgFilter {
    type Output = MidiMsgFilter;
    fn not(self) -> MidiMsgFilter {
        let node = match self.node {
            Node::Not(inner) => *inner,
            other => Node::Not(Box::new(other)),
        };
        MidiMsgFilter { node }
    }
}
