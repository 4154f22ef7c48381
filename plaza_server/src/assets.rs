//! Asset store.
//!
//! Content-addressed, size-capped storage of sprite sheets. Records are
//! written once and never mutated or evicted. Assets are pull-only: the store
//! answers `fetch` and nothing else ever pushes its contents.

use std::collections::HashMap;

use bytes::Bytes;
use plaza_shared::{
    appearance::SheetMeta,
    sheet::{self, SheetError},
};

/// One stored sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRecord {
    pub hash: String,
    pub meta: SheetMeta,
    pub bytes: Bytes,
}

/// Result of a registration that was not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    Stored,
    /// Hash already known; the first writer's bytes stay.
    AlreadyPresent,
}

#[derive(Debug, Default)]
pub struct AssetStore {
    sheets: HashMap<String, SheetRecord>,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a sheet under its content hash.
    ///
    /// A known hash is a no-op. Bytes over the size cap, without the PNG
    /// signature, or not hashing to `hash` are rejected, and so is a layout
    /// no client could slice.
    pub fn register(
        &mut self,
        hash: &str,
        meta: SheetMeta,
        bytes: Bytes,
    ) -> Result<Registered, SheetError> {
        let key = hash.to_ascii_lowercase();
        if self.sheets.contains_key(&key) {
            return Ok(Registered::AlreadyPresent);
        }
        sheet::check_layout(&meta)?;
        sheet::validate(&key, &bytes)?;
        self.sheets.insert(
            key.clone(),
            SheetRecord {
                hash: key,
                meta,
                bytes,
            },
        );
        Ok(Registered::Stored)
    }

    pub fn fetch(&self, hash: &str) -> Option<&SheetRecord> {
        self.sheets.get(&hash.to_ascii_lowercase())
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.fetch(hash).is_some()
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Total stored bytes.
    pub fn total_bytes(&self) -> usize {
        self.sheets.values().map(|r| r.bytes.len()).sum()
    }
}
