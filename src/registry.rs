use crate::error::LayercakeError;
use anyhow::Result;
use std::collections::HashMap;

/// Files an already-built image offers to the images that import it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    /// Engine identifier of the built image.
    pub image_id: String,
    /// Absolute in-image paths, in archive order.
    pub files: Vec<String>,
}

/// Export records keyed by image name. Each key is written at most once.
#[derive(Debug, Default)]
pub struct ExportRegistry {
    records: HashMap<String, ExportRecord>,
}

impl ExportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, record: ExportRecord) -> Result<()> {
        if self.records.contains_key(name) {
            return Err(LayercakeError::DuplicateExport(name.to_string()).into());
        }

        self.records.insert(name.to_string(), record);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ExportRecord> {
        self.records.get(name)
    }
}
