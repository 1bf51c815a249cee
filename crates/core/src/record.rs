use serde::{Deserialize, Serialize};

/// Event id Shotwell stores for media that belong to no event.
pub const NO_EVENT_ID: i64 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    BackingPhoto,
}

impl MediaKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "photo" => Some(Self::Photo),
            "video" => Some(Self::Video),
            "backing" => Some(Self::BackingPhoto),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::BackingPhoto => "backing",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRecord {
    pub id: i64,
    pub kind: MediaKind,
    pub source_path: String,
    pub timestamp: i64,
    pub exposure_time: Option<i64>,
    pub rating: i64,
    pub event_id: Option<i64>,
}

impl MediaRecord {
    /// Exposure time, treating Shotwell's `0` as unknown.
    pub fn known_exposure_time(&self) -> Option<i64> {
        self.exposure_time.filter(|t| *t != 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    pub id: i64,
    pub name: String,
}

/// A media record joined with what the export needs from its event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportRow {
    pub record: MediaRecord,
    pub event_name: Option<String>,
    pub event_time: Option<i64>,
}

impl ExportRow {
    pub fn event_name(&self) -> Option<&str> {
        self.event_name.as_deref().filter(|name| !name.is_empty())
    }

    pub fn known_event_time(&self) -> Option<i64> {
        self.event_time.filter(|t| *t != 0)
    }
}

/// Row shape the importer reads: only the id and the stored filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedMedia {
    pub id: i64,
    pub filename: String,
}
