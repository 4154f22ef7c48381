//! Remote entity proxies.
//!
//! Client-side stand-in for another session: last known position, the
//! animator, the frame set currently applied, and which sheet hash it is
//! still waiting on.

use plaza_shared::{
    appearance::{AppearanceDescriptor, DEFAULT_FRAME_COUNT},
    math::{IVec2, Rgb},
    protocol::{SessionId, SessionView},
    render::{Drawable, FrameRef},
    sprite::FrameSet,
};

use crate::animator::Animator;

#[derive(Debug)]
pub struct RemoteEntity {
    pub sid: SessionId,
    pub name: String,
    pub tint: Rgb,
    pos: IVec2,
    appearance: AppearanceDescriptor,
    animator: Animator,
    frames: Option<FrameSet>,
    /// Hash requested but not yet applied.
    pending_hash: Option<String>,
}

impl RemoteEntity {
    pub fn new(sid: SessionId, view: &SessionView) -> Self {
        Self {
            sid,
            name: view.name.clone(),
            tint: Rgb::parse_or_default(&view.color),
            pos: IVec2::new(view.x, view.y),
            appearance: view.appearance.clone(),
            animator: Animator::default(),
            frames: None,
            pending_hash: None,
        }
    }

    pub fn pos(&self) -> IVec2 {
        self.pos
    }

    pub fn animator(&self) -> &Animator {
        &self.animator
    }

    pub fn appearance(&self) -> &AppearanceDescriptor {
        &self.appearance
    }

    pub fn frames(&self) -> Option<&FrameSet> {
        self.frames.as_ref()
    }

    pub fn pending_hash(&self) -> Option<&str> {
        self.pending_hash.as_deref()
    }

    /// Frames in the set the animator cycles through.
    pub fn frame_count(&self) -> usize {
        self.frames
            .as_ref()
            .map(|f| f.len())
            .unwrap_or(DEFAULT_FRAME_COUNT as usize)
    }

    /// Applies a snapshot entry: moves, animates, refreshes name and tint.
    pub fn update_from(&mut self, view: &SessionView) {
        let next = IVec2::new(view.x, view.y);
        let count = self.frame_count();
        self.animator.observe(self.pos, next, count);
        self.pos = next;
        self.name.clone_from(&view.name);
        self.tint = Rgb::parse_or_default(&view.color);
    }

    /// Records the descriptor the server now advertises. Returns true when
    /// the sheet hash changed and must be resolved again.
    pub fn set_appearance(&mut self, appearance: &AppearanceDescriptor) -> bool {
        let changed = appearance.hash != self.appearance.hash;
        self.appearance = appearance.clone();
        changed
    }

    pub fn mark_pending(&mut self, hash: &str) {
        self.pending_hash = Some(hash.to_string());
    }

    /// Stops waiting on a sheet; whatever frames are showing stay.
    pub fn clear_pending(&mut self) {
        self.pending_hash = None;
    }

    /// Swaps in a new frame set and restarts from the idle pose.
    pub fn apply_frames(&mut self, frames: FrameSet) {
        self.frames = Some(frames);
        self.pending_hash = None;
        self.animator.reset();
    }

    /// Back to the built-in look.
    pub fn use_default_frames(&mut self) {
        self.frames = None;
        self.pending_hash = None;
        self.animator.reset();
    }
}

impl Drawable for RemoteEntity {
    fn world_pos(&self) -> IVec2 {
        self.pos
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn render_frame(&self) -> FrameRef<'_> {
        // An index past the end of a short sheet falls back to the last frame.
        let frame = self.frames.as_ref().and_then(|frames| {
            frames
                .get(self.animator.frame())
                .or_else(|| frames.last())
        });
        FrameRef {
            frame,
            flip_x: self.animator.flip_x(),
            tint: self.tint,
        }
    }
}
