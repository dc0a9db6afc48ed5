//! The LED chain output contract.
//!
//! The animation engine computes a full-frame color array every iteration
//! and hands it to an `LedStrip` as one atomic push; partial updates are not
//! part of the contract. Implementations range from a real single-wire chain
//! driver to the in-memory strip used by tests and the terminal monitor.

use crate::color::Rgb;

/// An ordered chain of RGB pixels addressed as a whole.
pub trait LedStrip {
    /// Pushes a complete frame to the chain. All-or-nothing: the frame
    /// replaces whatever was showing before.
    fn push_frame(&mut self, frame: &[Rgb]);
}

/// A strip that remembers the last frame it was shown.
///
/// Doubles as the test double and as the monitor binary's backing store.
#[derive(Debug, Default)]
pub struct MemoryStrip {
    last_frame: Vec<Rgb>,
    frames_pushed: u64,
}

impl MemoryStrip {
    /// Creates an empty strip.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently pushed frame.
    pub fn last_frame(&self) -> &[Rgb] {
        &self.last_frame
    }

    /// How many frames have been pushed in total.
    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed
    }
}

impl LedStrip for MemoryStrip {
    fn push_frame(&mut self, frame: &[Rgb]) {
        self.last_frame.clear();
        self.last_frame.extend_from_slice(frame);
        self.frames_pushed += 1;
    }
}

/// A strip that discards frames, for headless runs without LED hardware.
#[derive(Debug, Default)]
pub struct NullStrip;

impl LedStrip for NullStrip {
    fn push_frame(&mut self, _frame: &[Rgb]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_strip_keeps_whole_frames() {
        let mut strip = MemoryStrip::new();
        strip.push_frame(&[Rgb::new(1, 2, 3); 4]);
        strip.push_frame(&[Rgb::BLACK; 2]);
        assert_eq!(strip.last_frame().len(), 2);
        assert_eq!(strip.frames_pushed(), 2);
    }
}
