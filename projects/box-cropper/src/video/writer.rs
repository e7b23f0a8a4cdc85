use anyhow::{anyhow, Result};
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::videoio::VideoWriter;
use std::path::{Path, PathBuf};

/// An encoder bound to a single output file
pub trait FrameWriter: Sized {
    fn open(path: &Path, fps: f64, size: Size) -> Result<Self>;
    fn write(&mut self, frame: &Mat) -> Result<()>;
    fn release(&mut self) -> Result<()>;
}

/// MP4 (mp4v) writer backed by OpenCV
pub struct Mp4Writer {
    writer: VideoWriter,
}

impl FrameWriter for Mp4Writer {
    fn open(path: &Path, fps: f64, size: Size) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Non UTF-8 video path: {:?}", path))?;
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(path_str, fourcc, fps, size, true)?;
        if !writer.is_opened()? {
            return Err(anyhow!("Failed to open video writer for {}", path_str));
        }
        Ok(Self { writer })
    }

    fn write(&mut self, frame: &Mat) -> Result<()> {
        self.writer.write(frame)?;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.writer.release()?;
        Ok(())
    }
}

struct ActiveWriter<W> {
    path: PathBuf,
    writer: W,
}

/// Owns at most one open writer, keyed by its output path.
///
/// Writing to a new path releases the previous writer before the new one is
/// opened. The last writer is released by `finish` or on drop.
pub struct VideoSink<W: FrameWriter = Mp4Writer> {
    active: Option<ActiveWriter<W>>,
}

impl<W: FrameWriter> Default for VideoSink<W> {
    fn default() -> Self {
        Self { active: None }
    }
}

impl<W: FrameWriter> VideoSink<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    pub fn write(&mut self, path: &Path, frame: &Mat, fps: f64, size: Size) -> Result<()> {
        if self.current_path() != Some(path) {
            self.finish()?;
            tracing::info!(
                "Opening video writer {:?} ({}x{} @ {:.2} fps)",
                path,
                size.width,
                size.height,
                fps
            );
            let writer = W::open(path, fps, size)?;
            self.active = Some(ActiveWriter {
                path: path.to_path_buf(),
                writer,
            });
        }

        match self.active.as_mut() {
            Some(active) => active.writer.write(frame),
            None => Err(anyhow!("No active video writer for {:?}", path)),
        }
    }

    /// Releases the open writer, if any.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(mut active) = self.active.take() {
            tracing::debug!("Releasing video writer {:?}", active.path);
            active.writer.release()?;
        }
        Ok(())
    }
}

impl<W: FrameWriter> Drop for VideoSink<W> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!("Failed to release video writer: {}", e);
        }
    }
}
