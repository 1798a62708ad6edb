use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::objects::{sanitize_objects, GameObject};
use crate::rooms::is_highway;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
    pub room: String,
    pub terrain: String,
    pub objects: Vec<GameObject>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_type: Option<String>,
}

impl RoomRecord {
    /// Strips highway metadata from non-highway rooms and sanitizes objects.
    pub fn clean(&mut self) {
        if !is_highway(&self.room) {
            self.bus = None;
            self.deposit_type = None;
        }
        self.objects = sanitize_objects(std::mem::take(&mut self.objects));
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum SkipReason {
    StatusError(String),
    StatusNotOk,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::StatusError(message) => write!(f, "room status error: {}", message),
            SkipReason::StatusNotOk => f.write_str("room status not ok"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SkippedRoom {
    pub room: String,
    pub reason: SkipReason,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct MapDocument {
    pub description: String,
    pub rooms: Vec<RoomRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedRoom>,
}

impl MapDocument {
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: description.into(), rooms: Vec::new(), skipped: Vec::new() }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Writes the document as compact JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn clean(&mut self) {
        for room in &mut self.rooms {
            room.clean();
        }
    }
}
