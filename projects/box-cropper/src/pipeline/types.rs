use opencv::core::{Mat, Size};
use serde::{Deserialize, Serialize};

pub use crate::run_artifacts::{Position, ResultEntry};

/// Corner-form bounding box in pixel coordinates
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Xyxy {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Xyxy {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Rounds every corner to the nearest pixel, halves to even.
    pub fn round(&self) -> Self {
        Self {
            x1: self.x1.round_ties_even(),
            y1: self.y1.round_ties_even(),
            x2: self.x2.round_ties_even(),
            y2: self.y2.round_ties_even(),
        }
    }
}

/// A single prediction as it comes out of the detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: Xyxy,
}

/// Detector output for one frame. Boxes are expressed in `input_size` pixels,
/// which is the coordinate space the model ran in.
#[derive(Debug, Clone)]
pub struct RawDetections {
    pub input_size: (u32, u32),
    pub detections: Vec<RawDetection>,
}

impl RawDetections {
    pub fn empty(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            detections: Vec::new(),
        }
    }
}

/// Where a frame came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameMode {
    Image,
    Video {
        /// 1-based index within the current video file
        frame_index: usize,
        fps: f64,
        size: Size,
    },
    Stream {
        /// Position of the stream in the source list
        index: usize,
        frame_index: usize,
    },
}

/// A decoded frame ready for inference
pub struct Frame {
    /// Path or URI of the originating file or stream
    pub path: String,
    pub image: Mat,
    pub mode: FrameMode,
}

/// A detection rescaled to source-image pixels with its resolved label
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub bbox: Xyxy,
}
