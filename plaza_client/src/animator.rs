//! Remote entity animation.
//!
//! No velocity crosses the wire, so a remote entity's animation is derived
//! from consecutive absolute positions alone. Frame 0 is the idle pose; the
//! walk cycle loops over frames `1..count`.

use plaza_shared::math::IVec2;

/// Updates spent on one walk frame before advancing.
pub const WALK_FRAME_HOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimState {
    IdleLeft,
    IdleRight,
    WalkLeft,
    WalkRight,
}

impl AnimState {
    pub fn idle(facing: Facing) -> Self {
        match facing {
            Facing::Left => AnimState::IdleLeft,
            Facing::Right => AnimState::IdleRight,
        }
    }

    pub fn walk(facing: Facing) -> Self {
        match facing {
            Facing::Left => AnimState::WalkLeft,
            Facing::Right => AnimState::WalkRight,
        }
    }

    pub fn is_walking(self) -> bool {
        matches!(self, AnimState::WalkLeft | AnimState::WalkRight)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnimState::IdleLeft => "idle_left",
            AnimState::IdleRight => "idle_right",
            AnimState::WalkLeft => "walk_left",
            AnimState::WalkRight => "walk_right",
        }
    }
}

/// Animation state of one remote entity.
#[derive(Debug, Clone)]
pub struct Animator {
    state: AnimState,
    facing: Facing,
    frame: usize,
    counter: u32,
}

impl Default for Animator {
    fn default() -> Self {
        Self {
            state: AnimState::IdleRight,
            facing: Facing::Right,
            frame: 0,
            counter: 0,
        }
    }
}

impl Animator {
    pub fn state(&self) -> AnimState {
        self.state
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Mirror at draw time?
    pub fn flip_x(&self) -> bool {
        self.facing == Facing::Left
    }

    /// Back to the idle pose, keeping facing. Used when a new sheet lands.
    pub fn reset(&mut self) {
        self.state = AnimState::idle(self.facing);
        self.frame = 0;
        self.counter = 0;
    }

    /// Feeds one position update. `frame_count` is the size of the current
    /// frame set.
    pub fn observe(&mut self, prev: IVec2, next: IVec2, frame_count: usize) {
        let d = next - prev;
        if d.is_zero() {
            self.reset();
            return;
        }

        if d.x < 0 {
            self.facing = Facing::Left;
        } else if d.x > 0 {
            self.facing = Facing::Right;
        }
        self.state = AnimState::walk(self.facing);
        self.step_walk(frame_count);
    }

    fn step_walk(&mut self, frame_count: usize) {
        if self.frame == 0 {
            self.frame = 1;
            self.counter = 0;
            return;
        }
        self.counter += 1;
        if self.counter > WALK_FRAME_HOLD {
            self.counter = 0;
            self.frame += 1;
            if self.frame >= frame_count {
                self.frame = 1;
            }
        }
    }
}
