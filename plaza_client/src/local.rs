//! The locally controlled entity.
//!
//! The synchronizer only needs to read and overwrite the local position, so
//! the player character is reached through [`LocalEntity`]. [`Avatar`] is the
//! stock implementation used by the headless client.

use std::path::Path;

use anyhow::Context;
use plaza_shared::{
    appearance::{AppearancePatch, SheetMeta, DEFAULT_FRAME_COUNT},
    config::{PlazaConfig, SheetSource},
    math::{IVec2, Rgb},
    protocol::Handshake,
    render::{Drawable, FrameRef},
    sheet::{check_bytes, sha256_hex, SheetPayload},
    sprite::{frames_from_png, FrameSet},
};
use tracing::{info, warn};

use crate::animator::Animator;

/// What the synchronizer needs from the local player.
pub trait LocalEntity {
    fn position(&self) -> IVec2;

    /// Server reconciliation: the snapshot position wins.
    fn set_position(&mut self, pos: IVec2);

    fn sheet_source(&self) -> Option<&SheetSource> {
        None
    }
}

/// The local player's own sheet, validated and sliced.
#[derive(Debug, Clone)]
pub struct OwnSheet {
    pub hash: String,
    pub meta: SheetMeta,
    pub bytes: Vec<u8>,
    pub frames: FrameSet,
}

impl OwnSheet {
    /// Checks size and signature, hashes, then slices.
    pub fn from_bytes(bytes: Vec<u8>, meta: SheetMeta) -> anyhow::Result<Self> {
        check_bytes(&bytes)?;
        let frames = frames_from_png(&bytes, &meta)?;
        Ok(Self {
            hash: sha256_hex(&bytes),
            meta,
            bytes,
            frames,
        })
    }

    pub fn load(source: &SheetSource) -> anyhow::Result<Self> {
        let path = Path::new(&source.path);
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_bytes(bytes, source.meta)
    }

    /// Descriptor fields sent in the handshake.
    pub fn patch(&self) -> AppearancePatch {
        AppearancePatch {
            hash: Some(self.hash.clone()),
            count: Some(self.meta.count),
            cols: Some(self.meta.cols),
            pad: Some(self.meta.pad),
            scale: Some(self.meta.scale),
        }
    }

    pub fn payload(&self) -> SheetPayload {
        SheetPayload::new(self.hash.clone(), self.meta, &self.bytes)
    }
}

/// Loads the configured sheet. Any failure means the default look.
pub fn load_own_sheet(source: Option<&SheetSource>) -> Option<OwnSheet> {
    let source = source?;
    match OwnSheet::load(source) {
        Ok(own) => {
            info!(path = %source.path, hash = %own.hash, frames = own.frames.len(), "custom sheet loaded");
            Some(own)
        }
        Err(e) => {
            warn!(path = %source.path, error = %e, "custom sheet unusable, using default");
            None
        }
    }
}

/// Builds the `hello` payload for the local player.
pub fn build_handshake(cfg: &PlazaConfig, pos: IVec2, own: Option<&OwnSheet>) -> Handshake {
    Handshake {
        name: Some(cfg.player_name.clone()),
        color: Some(cfg.player_color.clone()),
        x: Some(pos.x),
        y: Some(pos.y),
        appearance: own.map(OwnSheet::patch),
    }
}

/// Stock local player.
#[derive(Debug)]
pub struct Avatar {
    pub name: String,
    pub tint: Rgb,
    pos: IVec2,
    sheet: Option<SheetSource>,
    frames: Option<FrameSet>,
    animator: Animator,
}

impl Avatar {
    pub fn new(cfg: &PlazaConfig) -> Self {
        Self {
            name: cfg.player_name.clone(),
            tint: Rgb::parse_or_default(&cfg.player_color),
            pos: cfg.spawn,
            sheet: cfg.sheet.clone(),
            frames: None,
            animator: Animator::default(),
        }
    }

    pub fn set_frames(&mut self, frames: FrameSet) {
        self.frames = Some(frames);
        self.animator.reset();
    }

    /// Applies one tick of local input.
    pub fn step(&mut self, delta: IVec2) {
        let next = self.pos + delta;
        let count = self
            .frames
            .as_ref()
            .map(|f| f.len())
            .unwrap_or(DEFAULT_FRAME_COUNT as usize);
        self.animator.observe(self.pos, next, count);
        self.pos = next;
    }

    pub fn animator(&self) -> &Animator {
        &self.animator
    }
}

impl LocalEntity for Avatar {
    fn position(&self) -> IVec2 {
        self.pos
    }

    fn set_position(&mut self, pos: IVec2) {
        self.pos = pos;
    }

    fn sheet_source(&self) -> Option<&SheetSource> {
        self.sheet.as_ref()
    }
}

impl Drawable for Avatar {
    fn world_pos(&self) -> IVec2 {
        self.pos
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn render_frame(&self) -> FrameRef<'_> {
        let frame = self
            .frames
            .as_ref()
            .and_then(|f| f.get(self.animator.frame()).or_else(|| f.last()));
        FrameRef {
            frame,
            flip_x: self.animator.flip_x(),
            tint: self.tint,
        }
    }
}
