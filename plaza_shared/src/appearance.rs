//! Appearance descriptors.
//!
//! A descriptor tells a client how to slice a sprite sheet into animation
//! frames. The hash names the sheet bytes; an empty hash means the built-in
//! default sheet.

use serde::{Deserialize, Serialize};

/// Frames in the built-in default sheet.
pub const DEFAULT_FRAME_COUNT: u32 = 9;

/// How a sprite sheet is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SheetMeta {
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default = "default_cols")]
    pub cols: u32,
    #[serde(default)]
    pub pad: u32,
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_count() -> u32 {
    1
}

fn default_cols() -> u32 {
    9
}

fn default_scale() -> f32 {
    1.0
}

impl Default for SheetMeta {
    fn default() -> Self {
        Self {
            count: default_count(),
            cols: default_cols(),
            pad: 0,
            scale: default_scale(),
        }
    }
}

/// Appearance of one session: content hash plus sheet layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppearanceDescriptor {
    #[serde(default)]
    pub hash: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default = "default_cols")]
    pub cols: u32,
    #[serde(default)]
    pub pad: u32,
    #[serde(default = "default_scale")]
    pub scale: f32,
}

impl Default for AppearanceDescriptor {
    fn default() -> Self {
        Self::new(String::new(), SheetMeta::default())
    }
}

impl AppearanceDescriptor {
    pub fn new(hash: String, meta: SheetMeta) -> Self {
        Self {
            hash,
            count: meta.count,
            cols: meta.cols,
            pad: meta.pad,
            scale: meta.scale,
        }
    }

    /// True when the default sheet should be used.
    pub fn uses_default(&self) -> bool {
        self.hash.is_empty()
    }

    pub fn meta(&self) -> SheetMeta {
        SheetMeta {
            count: self.count,
            cols: self.cols,
            pad: self.pad,
            scale: self.scale,
        }
    }

    /// Merges only the fields present in `patch`.
    pub fn merge(&mut self, patch: &AppearancePatch) {
        if let Some(hash) = &patch.hash {
            self.hash.clone_from(hash);
        }
        if let Some(count) = patch.count {
            self.count = count;
        }
        if let Some(cols) = patch.cols {
            self.cols = cols;
        }
        if let Some(pad) = patch.pad {
            self.pad = pad;
        }
        if let Some(scale) = patch.scale {
            self.scale = scale;
        }
    }

    /// Descriptor built from defaults with `patch` applied on top.
    pub fn from_patch(patch: &AppearancePatch) -> Self {
        let mut desc = Self::default();
        desc.merge(patch);
        desc
    }
}

/// Partial appearance update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppearancePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
}

impl AppearancePatch {
    /// Patch carrying only a hash.
    pub fn hash_only(hash: impl Into<String>) -> Self {
        Self {
            hash: Some(hash.into()),
            ..Default::default()
        }
    }
}

impl From<&AppearanceDescriptor> for AppearancePatch {
    fn from(desc: &AppearanceDescriptor) -> Self {
        Self {
            hash: Some(desc.hash.clone()),
            count: Some(desc.count),
            cols: Some(desc.cols),
            pad: Some(desc.pad),
            scale: Some(desc.scale),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_touches_only_given_fields() {
        let mut desc = AppearanceDescriptor::new(
            "abc".into(),
            SheetMeta {
                count: 9,
                cols: 9,
                pad: 1,
                scale: 0.5,
            },
        );
        desc.merge(&AppearancePatch {
            cols: Some(3),
            scale: Some(2.0),
            ..Default::default()
        });
        assert_eq!(desc.hash, "abc");
        assert_eq!(desc.count, 9);
        assert_eq!(desc.cols, 3);
        assert_eq!(desc.pad, 1);
        assert_eq!(desc.scale, 2.0);
    }

    #[test]
    fn missing_json_fields_take_defaults() {
        let desc: AppearanceDescriptor = serde_json::from_str(r#"{"hash":"h"}"#).unwrap();
        assert_eq!(desc.hash, "h");
        assert_eq!(desc.meta(), SheetMeta::default());

        let patch: AppearancePatch = serde_json::from_str(r#"{"pad":2}"#).unwrap();
        let desc = AppearanceDescriptor::from_patch(&patch);
        assert!(desc.uses_default());
        assert_eq!(desc.pad, 2);
    }
}
