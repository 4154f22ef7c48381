//! Math types.
//!
//! World positions are integer pixels. Arithmetic saturates instead of
//! wrapping so an absurd client delta cannot panic a debug build.

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Integer 2D vector (world pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct IVec2 {
    pub x: i64,
    pub y: i64,
}

impl IVec2 {
    pub const ZERO: Self = Self { x: 0, y: 0 };

    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0 && self.y == 0
    }
}

impl Add for IVec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x.saturating_add(rhs.x), self.y.saturating_add(rhs.y))
    }
}

impl Sub for IVec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x.saturating_sub(rhs.x), self.y.saturating_sub(rhs.y))
    }
}

/// RGB color parsed from `#rgb` / `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Default entity tint (`#64b5f6`).
    pub const DEFAULT: Self = Self(0x64, 0xb5, 0xf6);

    /// Parses a hex color, with or without the leading `#`.
    pub fn parse_hex(s: &str) -> Option<Self> {
        let h = s.trim().trim_start_matches('#');
        let expanded: String = match h.len() {
            3 => h.chars().flat_map(|c| [c, c]).collect(),
            6 => h.to_string(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(expanded.get(i..i + 2)?, 16).ok();
        Some(Self(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Parses a hex color, falling back to [`Rgb::DEFAULT`].
    pub fn parse_or_default(s: &str) -> Self {
        Self::parse_hex(s).unwrap_or(Self::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ivec2_add_saturates() {
        let a = IVec2::new(i64::MAX - 1, 0);
        assert_eq!(a + IVec2::new(10, -3), IVec2::new(i64::MAX, -3));
        assert_eq!(IVec2::new(5, 5) - IVec2::new(2, 7), IVec2::new(3, -2));
    }

    #[test]
    fn rgb_parses_short_and_long_forms() {
        assert_eq!(Rgb::parse_hex("#64b5f6"), Some(Rgb(0x64, 0xb5, 0xf6)));
        assert_eq!(Rgb::parse_hex("f0a"), Some(Rgb(0xff, 0x00, 0xaa)));
        assert_eq!(Rgb::parse_hex("#12345"), None);
        assert_eq!(Rgb::parse_hex("#zzzzzz"), None);
        assert_eq!(Rgb::parse_or_default("nope"), Rgb::DEFAULT);
    }
}
