//! Input handling.
//!
//! A windowed front end would sample the keyboard here. The headless client
//! drives the same [`InputState`] from a fixed [`Wander`] script.

use plaza_shared::math::IVec2;

/// Pixels moved per tick while a direction is held.
pub const LOCAL_SPEED: i64 = 8;

/// Directions held at a moment in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl InputState {
    /// Movement for one tick. Opposite keys cancel out.
    pub fn delta(self, speed: i64) -> IVec2 {
        let axis = |neg: bool, pos: bool| (pos as i64 - neg as i64) * speed;
        IVec2::new(axis(self.left, self.right), axis(self.up, self.down))
    }
}

const WANDER_SCRIPT: [(InputState, u32); 6] = [
    (held(false, true, false, false), 40),
    (held(false, false, false, false), 20),
    (held(false, false, false, true), 25),
    (held(true, false, false, false), 40),
    (held(false, false, false, false), 20),
    (held(false, false, true, false), 25),
];

const fn held(left: bool, right: bool, up: bool, down: bool) -> InputState {
    InputState {
        left,
        right,
        up,
        down,
    }
}

/// Scripted input loop for the headless client; returns to its start point.
#[derive(Debug, Default)]
pub struct Wander {
    step: usize,
    ticks: u32,
}

impl Wander {
    pub fn next_input(&mut self) -> InputState {
        let (input, hold) = WANDER_SCRIPT[self.step];
        self.ticks += 1;
        if self.ticks >= hold {
            self.ticks = 0;
            self.step = (self.step + 1) % WANDER_SCRIPT.len();
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_cancels_opposites() {
        assert_eq!(held(true, false, false, false).delta(8), IVec2::new(-8, 0));
        assert_eq!(held(true, true, false, true).delta(8), IVec2::new(0, 8));
        assert!(InputState::default().delta(LOCAL_SPEED).is_zero());
    }

    #[test]
    fn wander_loop_is_closed() {
        let mut w = Wander::default();
        let total: u32 = WANDER_SCRIPT.iter().map(|(_, n)| n).sum();
        let mut pos = IVec2::ZERO;
        for _ in 0..total {
            pos = pos + w.next_input().delta(LOCAL_SPEED);
        }
        assert_eq!(pos, IVec2::ZERO);
    }
}
