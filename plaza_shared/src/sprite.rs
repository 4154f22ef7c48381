//! Sprite sheet decoding and frame slicing.
//!
//! A sheet is a uniform grid: `cols` cells per row, `count` cells in total,
//! `pad` pixels between cells. The whole sheet is scaled first, then cut.

use std::sync::Arc;

use anyhow::Context;
use image::{imageops, ImageFormat, RgbaImage};

use crate::{
    appearance::SheetMeta,
    sheet::{check_layout, MAX_SHEET_PIXELS},
};

/// One decoded animation frame.
pub type Frame = RgbaImage;

/// Frames shared between every entity using the same sheet.
pub type FrameSet = Arc<[Frame]>;

/// Decodes PNG bytes and slices them into `meta.count` frames.
pub fn frames_from_png(bytes: &[u8], meta: &SheetMeta) -> anyhow::Result<FrameSet> {
    let sheet = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .context("decode sheet png")?
        .to_rgba8();
    slice_frames(sheet, meta)
}

/// Slices an already decoded sheet.
pub fn slice_frames(sheet: RgbaImage, meta: &SheetMeta) -> anyhow::Result<FrameSet> {
    check_layout(meta)?;

    let sheet = if (meta.scale - 1.0).abs() > f32::EPSILON {
        let w = (f64::from(sheet.width()) * f64::from(meta.scale)) as u64;
        let h = (f64::from(sheet.height()) * f64::from(meta.scale)) as u64;
        anyhow::ensure!(w > 0 && h > 0, "sheet scaled to nothing");
        anyhow::ensure!(
            w.saturating_mul(h) <= MAX_SHEET_PIXELS,
            "sheet scaled to {w}x{h}, over the {MAX_SHEET_PIXELS} pixel limit"
        );
        // Both sides fit: each is at most MAX_SHEET_PIXELS.
        imageops::resize(&sheet, w as u32, h as u32, imageops::FilterType::Triangle)
    } else {
        sheet
    };

    let rows = meta.count.div_ceil(meta.cols);
    let gaps_x = (meta.cols - 1).saturating_mul(meta.pad);
    let gaps_y = (rows - 1).saturating_mul(meta.pad);
    let fw = sheet.width().saturating_sub(gaps_x) / meta.cols;
    let fh = sheet.height().saturating_sub(gaps_y) / rows;
    anyhow::ensure!(
        fw > 0 && fh > 0,
        "{}x{} sheet too small for {} frames in {} cols",
        sheet.width(),
        sheet.height(),
        meta.count,
        meta.cols
    );

    let origin = |i: u32, len: u32| len.checked_add(meta.pad).and_then(|step| i.checked_mul(step));

    let mut frames = Vec::with_capacity(meta.count as usize);
    'rows: for r in 0..rows {
        for c in 0..meta.cols {
            if frames.len() >= meta.count as usize {
                break 'rows;
            }
            let (Some(x), Some(y)) = (origin(c, fw), origin(r, fh)) else {
                anyhow::bail!("sheet padding {} overflows the grid", meta.pad);
            };
            frames.push(imageops::crop_imm(&sheet, x, y, fw, fh).to_image());
        }
    }
    Ok(frames.into())
}
