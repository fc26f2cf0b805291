//! Where a new child node goes.
//!
//! Children open to the right of their parent: parent's right edge plus a
//! fixed gap, with a bounded random vertical jitter so that several children
//! requested in a row don't stack exactly on top of each other.

use rand::Rng;
use whiteboard_types::{Node, Position, Size};

pub const DEFAULT_HORIZONTAL_GAP: f64 = 80.0;
pub const DEFAULT_VERTICAL_JITTER: f64 = 60.0;
/// Assumed parent size when the renderer hasn't measured it yet.
pub const DEFAULT_NODE_SIZE: Size = Size { width: 240.0, height: 120.0 };

/// Child placement parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChildPlacement {
    pub horizontal_gap: f64,
    /// Jitter is drawn from `[-vertical_jitter, vertical_jitter]`.
    pub vertical_jitter: f64,
    pub default_size: Size,
}

impl Default for ChildPlacement {
    fn default() -> Self {
        Self {
            horizontal_gap: DEFAULT_HORIZONTAL_GAP,
            vertical_jitter: DEFAULT_VERTICAL_JITTER,
            default_size: DEFAULT_NODE_SIZE,
        }
    }
}

impl ChildPlacement {
    /// Position for a new child of `parent`, drawing jitter from `rng`.
    pub fn place<R: Rng + ?Sized>(&self, parent: &Node, rng: &mut R) -> Position {
        let measured = parent.measured_size();
        let width = if measured.is_degenerate() { self.default_size.width } else { measured.width };

        let jitter = if self.vertical_jitter > 0.0 {
            rng.gen_range(-self.vertical_jitter..=self.vertical_jitter)
        } else {
            0.0
        };

        Position::new(
            parent.position.x + width + self.horizontal_gap,
            parent.position.y + jitter,
        )
    }

    /// Same as [`place`](Self::place) with the thread-local RNG.
    pub fn place_child(&self, parent: &Node) -> Position {
        self.place(parent, &mut rand::thread_rng())
    }
}
