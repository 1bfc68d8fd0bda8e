//! GUI façade.
//!
//! The machine core only needs this much of a front-end: a lifecycle, a
//! frame sink and a place to hang a debugger callback. Window-system
//! integration lives behind it.

use crate::alto::Alto;

/// Called between steps while a front-end drives the machine. Returning
/// `false` stops the run loop.
pub type DebuggerCallback = Box<dyn FnMut(&mut Alto) -> bool>;

pub trait Gui {
    /// The front-end is still alive; the run loop polls this at step
    /// boundaries.
    fn running(&self) -> bool;

    fn start(&mut self);

    /// Present a frame (ARGB32, display-sized).
    fn update(&mut self, framebuffer: &[u32]);

    fn stop(&mut self);
}

/// No window: `update` discards frames, `stop` flips the flag the run
/// loop observes.
pub struct HeadlessGui {
    running: bool,
    frames: u64,
}

impl HeadlessGui {
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: false,
            frames: 0,
        }
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for HeadlessGui {
    fn default() -> Self {
        Self::new()
    }
}

impl Gui for HeadlessGui {
    fn running(&self) -> bool {
        self.running
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn update(&mut self, _framebuffer: &[u32]) {
        self.frames += 1;
    }

    fn stop(&mut self) {
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_flags() {
        let mut gui = HeadlessGui::new();
        assert!(!gui.running());
        gui.start();
        assert!(gui.running());
        gui.update(&[]);
        gui.stop();
        assert!(!gui.running());
        assert_eq!(gui.frames(), 1);
    }
}
