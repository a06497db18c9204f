//! Single-slot frame exchange between the scheduler and the host.
//!
//! The LCD service publishes every composed frame; a newer frame replaces an
//! unconsumed one. The host peeks at the pending frame and acknowledges it
//! with [`FrameMailbox::reset`].

use crate::periph::lcd::Frame;

#[derive(Debug, Default)]
pub struct FrameMailbox {
    frame: Option<Frame>,
    pending: bool,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, frame: Frame) {
        self.frame = Some(frame);
        self.pending = true;
    }

    /// The most recent unacknowledged frame
    pub fn pending(&self) -> Option<&Frame> {
        self.frame.as_ref().filter(|_| self.pending)
    }

    pub fn reset(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> Frame {
        Frame {
            width: 1,
            height: 1,
            pixels: vec![tag, tag, tag, 0xFF],
        }
    }

    #[test]
    fn test_empty_until_published() {
        let mailbox = FrameMailbox::new();
        assert!(mailbox.pending().is_none());
    }

    #[test]
    fn test_last_frame_wins() {
        let mut mailbox = FrameMailbox::new();
        mailbox.publish(frame(1));
        mailbox.publish(frame(2));
        assert_eq!(mailbox.pending(), Some(&frame(2)));
        // Peeking does not consume
        assert_eq!(mailbox.pending(), Some(&frame(2)));
    }

    #[test]
    fn test_reset_clears_until_next_publish() {
        let mut mailbox = FrameMailbox::new();
        mailbox.publish(frame(1));
        mailbox.reset();
        assert!(mailbox.pending().is_none());
        mailbox.publish(frame(3));
        assert_eq!(mailbox.pending(), Some(&frame(3)));
    }
}
