// Run artifact struct definitions
//
// Structs that are returned to the caller and persisted as JSON within the
// output directory of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::run_context::DetectOptions;

/// Crop rectangle in source-image pixels, after margin expansion
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x1: i32,
    pub x2: i32,
    pub y1: i32,
    pub y2: i32,
}

/// One saved crop
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultEntry {
    pub label: String,
    /// Absolute path of the saved JPEG
    pub path: PathBuf,
    pub position: Position,
}

/// Summary written as results.json at the end of a run
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunManifest {
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub options: DetectOptions,
    pub frames_processed: usize,
    pub results: Vec<ResultEntry>,
}
