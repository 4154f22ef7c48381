//! Rendering abstraction.
//!
//! This crate intentionally does not depend on a graphics backend.
//! Entities expose what to draw through [`Drawable`]; a backend turns that
//! into pixels. Horizontal mirroring is a draw-time flag, frames are never
//! flipped in place.

use crate::{
    math::{IVec2, Rgb},
    sprite::Frame,
};

/// What an entity wants drawn this tick.
#[derive(Debug, Clone, Copy)]
pub struct FrameRef<'a> {
    /// `None` means no sheet is loaded yet; draw a placeholder.
    pub frame: Option<&'a Frame>,
    pub flip_x: bool,
    pub tint: Rgb,
}

/// Anything that can be drawn in the world.
pub trait Drawable {
    fn world_pos(&self) -> IVec2;
    fn label(&self) -> &str;
    fn render_frame(&self) -> FrameRef<'_>;
}

/// A minimal rendering API.
pub trait RenderBackend {
    fn begin_frame(&mut self);
    fn draw_sprite(&mut self, frame: &Frame, screen: IVec2, flip_x: bool);
    fn draw_placeholder(&mut self, screen: IVec2, tint: Rgb);
    fn draw_label(&mut self, text: &str, screen: IVec2);
    fn end_frame(&mut self);
}

/// Camera centered on a world point.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub center: IVec2,
    pub half_extent: IVec2,
}

impl Camera {
    pub fn to_screen(&self, world: IVec2) -> IVec2 {
        world - self.center + self.half_extent
    }
}

/// Draws every entity relative to the camera.
pub fn draw_all<'a, B, I>(backend: &mut B, camera: &Camera, entities: I)
where
    B: RenderBackend + ?Sized,
    I: IntoIterator<Item = &'a dyn Drawable>,
{
    for ent in entities {
        let screen = camera.to_screen(ent.world_pos());
        let r = ent.render_frame();
        match r.frame {
            Some(frame) => backend.draw_sprite(frame, screen, r.flip_x),
            None => backend.draw_placeholder(screen, r.tint),
        }
        backend.draw_label(ent.label(), screen);
    }
}

/// A no-op renderer useful for headless runs.
#[derive(Default)]
pub struct NullRenderer;

impl RenderBackend for NullRenderer {
    fn begin_frame(&mut self) {}
    fn draw_sprite(&mut self, _frame: &Frame, _screen: IVec2, _flip_x: bool) {}
    fn draw_placeholder(&mut self, _screen: IVec2, _tint: Rgb) {}
    fn draw_label(&mut self, _text: &str, _screen: IVec2) {}
    fn end_frame(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dot(IVec2);

    impl Drawable for Dot {
        fn world_pos(&self) -> IVec2 {
            self.0
        }
        fn label(&self) -> &str {
            "dot"
        }
        fn render_frame(&self) -> FrameRef<'_> {
            FrameRef {
                frame: None,
                flip_x: false,
                tint: Rgb::DEFAULT,
            }
        }
    }

    #[derive(Default)]
    struct Recorder(Vec<IVec2>);

    impl RenderBackend for Recorder {
        fn begin_frame(&mut self) {}
        fn draw_sprite(&mut self, _frame: &Frame, _screen: IVec2, _flip_x: bool) {}
        fn draw_placeholder(&mut self, screen: IVec2, _tint: Rgb) {
            self.0.push(screen);
        }
        fn draw_label(&mut self, _text: &str, _screen: IVec2) {}
        fn end_frame(&mut self) {}
    }

    #[test]
    fn draws_relative_to_camera() {
        let camera = Camera {
            center: IVec2::new(600, 380),
            half_extent: IVec2::new(640, 360),
        };
        let dot = Dot(IVec2::new(610, 370));
        let mut rec = Recorder::default();
        draw_all(&mut rec, &camera, [&dot as &dyn Drawable]);
        assert_eq!(rec.0, vec![IVec2::new(650, 350)]);
    }
}
