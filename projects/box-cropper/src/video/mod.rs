pub mod opencv_reader;
pub mod writer;

use anyhow::Result;
use opencv::core::{Mat, Size};

pub trait VideoReader {
    fn frame_count(&self) -> Result<usize>;
    fn source_fps(&self) -> Result<f64>;
    fn frame_size(&self) -> Result<Size>;
    /// Returns `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Mat>>;
}
