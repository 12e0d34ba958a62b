//! MIDI learn sessions.
//!
//! At most one session is pending. Starting a new one replaces the old one;
//! the replaced session never commits. Every session carries a token so a
//! commit racing with a restart can tell whether it still owns the session.

use ostinato_types::LearnTarget;

/// Sent once per committed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearnDone {
    pub token: u64,
    pub target: LearnTarget,
    /// The pure value written into the target; 0 when the binding was cleared.
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LearnSession {
    #[default]
    Idle,
    Waiting { target: LearnTarget, token: u64 },
}

impl LearnSession {
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Waiting { .. })
    }

    pub fn target(&self) -> Option<LearnTarget> {
        match self {
            Self::Waiting { target, .. } => Some(*target),
            Self::Idle => None,
        }
    }

    pub fn token(&self) -> Option<u64> {
        match self {
            Self::Waiting { token, .. } => Some(*token),
            Self::Idle => None,
        }
    }

    /// Begin waiting for `target`. Returns the target of a replaced session.
    pub fn begin(&mut self, target: LearnTarget, token: u64) -> Option<LearnTarget> {
        let replaced = self.target();
        *self = Self::Waiting { target, token };
        replaced
    }

    /// Go back to idle without committing.
    pub fn cancel(&mut self) -> Option<LearnTarget> {
        let cancelled = self.target();
        *self = Self::Idle;
        cancelled
    }

    /// Close the session if it is still the one identified by `token`.
    pub fn finish(&mut self, token: u64) -> Option<LearnTarget> {
        match *self {
            Self::Waiting { target, token: t } if t == token => {
                *self = Self::Idle;
                Some(target)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ostinato_types::{ChannelId, ChannelParam, MasterParam};

    fn mute_of(ch: u32) -> LearnTarget {
        LearnTarget::Channel {
            channel: ChannelId::new(ch),
            param: ChannelParam::Mute,
        }
    }

    #[test]
    fn begin_replaces_pending_session() {
        let mut s = LearnSession::default();
        assert!(!s.is_waiting());
        assert_eq!(s.begin(mute_of(1), 1), None);
        assert_eq!(s.begin(LearnTarget::Master(MasterParam::Rewind), 2), Some(mute_of(1)));
        assert_eq!(s.token(), Some(2));
    }

    #[test]
    fn finish_only_with_current_token() {
        let mut s = LearnSession::default();
        s.begin(mute_of(1), 1);
        s.begin(mute_of(2), 2);
        assert_eq!(s.finish(1), None);
        assert!(s.is_waiting());
        assert_eq!(s.finish(2), Some(mute_of(2)));
        assert_eq!(s.finish(2), None);
        assert_eq!(s, LearnSession::Idle);
    }

    #[test]
    fn cancel_goes_idle() {
        let mut s = LearnSession::default();
        s.begin(mute_of(3), 7);
        assert_eq!(s.cancel(), Some(mute_of(3)));
        assert_eq!(s.target(), None);
        assert_eq!(s.cancel(), None);
    }
}
