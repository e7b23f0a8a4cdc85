// Input resolution: turns a source string into a sequence of frames

use crate::pipeline::types::{Frame, FrameMode};
use crate::video::opencv_reader::OpencvReader;
use crate::video::VideoReader;
use anyhow::{bail, Context, Result};
use opencv::imgcodecs;
use opencv::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const IMAGE_FORMATS: &[&str] = &["bmp", "jpg", "jpeg", "png", "tif", "tiff", "dng"];
pub const VIDEO_FORMATS: &[&str] = &["mov", "avi", "mp4", "mpg", "mpeg", "m4v", "wmv", "mkv"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Live inputs: camera indices, rtsp/http URLs, or a .txt list of them
    Stream,
    /// Image and video files on disk
    Files,
}

impl SourceKind {
    pub fn classify(source: &str) -> Self {
        let is_stream = (!source.is_empty() && source.chars().all(|c| c.is_ascii_digit()))
            || source.starts_with("rtsp")
            || source.starts_with("http")
            || source.ends_with(".txt");
        if is_stream {
            SourceKind::Stream
        } else {
            SourceKind::Files
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

pub fn is_image(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| IMAGE_FORMATS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_video(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| VIDEO_FORMATS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Files of a file source, images first, each group in path order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedFiles {
    pub images: Vec<PathBuf>,
    pub videos: Vec<PathBuf>,
}

impl ResolvedFiles {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.videos.is_empty()
    }
}

/// Resolves a file or directory into supported images and videos.
pub fn resolve_files(source: &str) -> Result<ResolvedFiles> {
    let root = Path::new(source);
    let candidates: Vec<PathBuf> = if root.is_dir() {
        WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect()
    } else if root.is_file() {
        vec![root.to_path_buf()]
    } else {
        bail!("Source {} does not exist", source);
    };

    let mut resolved = ResolvedFiles::default();
    for path in candidates {
        if is_image(&path) {
            resolved.images.push(path);
        } else if is_video(&path) {
            resolved.videos.push(path);
        } else {
            tracing::debug!("Skipping unsupported file {:?}", path);
        }
    }

    if resolved.is_empty() {
        bail!(
            "No images or videos found in {}. Supported formats are:\nimages: {:?}\nvideos: {:?}",
            source,
            IMAGE_FORMATS,
            VIDEO_FORMATS
        );
    }

    Ok(resolved)
}

/// Splits a stream source into individual stream addresses.
pub fn resolve_streams(source: &str) -> Result<Vec<String>> {
    let streams: Vec<String> = if source.ends_with(".txt") && Path::new(source).is_file() {
        fs::read_to_string(source)
            .with_context(|| format!("Failed to read stream list {}", source))?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        vec![source.to_string()]
    };

    if streams.is_empty() {
        bail!("Stream list {} is empty", source);
    }
    Ok(streams)
}

/// A sequential supplier of frames
pub trait FrameSource {
    /// Total frames when known up front (files), `None` for live streams.
    fn len_hint(&self) -> Option<usize>;
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Images, then every frame of each video
pub struct FileSource {
    images: std::vec::IntoIter<PathBuf>,
    videos: std::vec::IntoIter<PathBuf>,
    current_video: Option<CurrentVideo>,
    total_frames: usize,
}

struct CurrentVideo {
    path: String,
    reader: OpencvReader,
    frame_index: usize,
}

impl FileSource {
    pub fn new(files: ResolvedFiles) -> Self {
        Self {
            total_frames: files.images.len(),
            images: files.images.into_iter(),
            videos: files.videos.into_iter(),
            current_video: None,
        }
    }

    /// Counts video frames for progress reporting. Each video is opened once
    /// more just to read its metadata.
    pub fn with_video_frame_counts(mut self) -> Self {
        let videos: Vec<PathBuf> = self.videos.as_slice().to_vec();
        for path in &videos {
            match OpencvReader::new(&path.to_string_lossy()) {
                Ok(reader) => self.total_frames += reader.frame_count().unwrap_or(0),
                Err(e) => tracing::warn!("Could not inspect {:?}: {}", path, e),
            }
        }
        self
    }

    fn next_image(&mut self) -> Option<Frame> {
        for path in self.images.by_ref() {
            let path_str = path.to_string_lossy().to_string();
            match imgcodecs::imread(&path_str, imgcodecs::IMREAD_COLOR) {
                Ok(image) if !image.empty() => {
                    return Some(Frame {
                        path: path_str,
                        image,
                        mode: FrameMode::Image,
                    })
                }
                Ok(_) => tracing::warn!("Image not found or unreadable: {}", path_str),
                Err(e) => tracing::warn!("Failed to decode {}: {}", path_str, e),
            }
        }
        None
    }

    fn next_video_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(video) = self.current_video.as_mut() {
                if let Some(image) = video.reader.next_frame()? {
                    video.frame_index += 1;
                    return Ok(Some(Frame {
                        path: video.path.clone(),
                        image,
                        mode: FrameMode::Video {
                            frame_index: video.frame_index,
                            fps: video.reader.source_fps()?,
                            size: video.reader.frame_size()?,
                        },
                    }));
                }
                tracing::debug!(
                    "Finished {} after {} frames",
                    video.path,
                    video.frame_index
                );
                self.current_video = None;
            }

            let Some(path) = self.videos.next() else {
                return Ok(None);
            };
            let path = path.to_string_lossy().to_string();
            let reader = OpencvReader::new(&path)?;
            self.current_video = Some(CurrentVideo {
                path,
                reader,
                frame_index: 0,
            });
        }
    }
}

impl FrameSource for FileSource {
    fn len_hint(&self) -> Option<usize> {
        Some(self.total_frames)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.next_image() {
            return Ok(Some(frame));
        }
        self.next_video_frame()
    }
}

/// Round-robin over live streams, one frame per stream per round
pub struct StreamSource {
    streams: Vec<(String, OpencvReader)>,
    next_stream: usize,
    rounds: usize,
}

impl StreamSource {
    pub fn open(addresses: &[String]) -> Result<Self> {
        let mut streams = Vec::with_capacity(addresses.len());
        for (i, address) in addresses.iter().enumerate() {
            let reader = match address.parse::<i32>() {
                Ok(index) => OpencvReader::camera(index)?,
                Err(_) => OpencvReader::new(address)?,
            };
            tracing::info!("{}/{}: {} opened", i + 1, addresses.len(), address);
            streams.push((address.clone(), reader));
        }
        Ok(Self {
            streams,
            next_stream: 0,
            rounds: 0,
        })
    }
}

impl FrameSource for StreamSource {
    fn len_hint(&self) -> Option<usize> {
        None
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.streams.is_empty() {
            return Ok(None);
        }

        let index = self.next_stream;
        if index == 0 {
            self.rounds += 1;
        }
        self.next_stream = (index + 1) % self.streams.len();

        let (address, reader) = &mut self.streams[index];
        match reader.next_frame()? {
            Some(image) => Ok(Some(Frame {
                path: address.clone(),
                image,
                mode: FrameMode::Stream {
                    index,
                    frame_index: self.rounds,
                },
            })),
            None => {
                tracing::info!("Stream {} ended", address);
                Ok(None)
            }
        }
    }
}

/// Opens the right frame source for `source`.
pub fn open_source(source: &str) -> Result<Box<dyn FrameSource>> {
    match SourceKind::classify(source) {
        SourceKind::Stream => {
            let addresses = resolve_streams(source)?;
            Ok(Box::new(StreamSource::open(&addresses)?))
        }
        SourceKind::Files => {
            let files = resolve_files(source)?;
            tracing::info!(
                "Resolved {} images and {} videos from {}",
                files.images.len(),
                files.videos.len(),
                source
            );
            Ok(Box::new(FileSource::new(files).with_video_frame_counts()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Mat, Scalar, Vector, CV_8UC3};

    #[test]
    fn test_classify_source() {
        assert_eq!(SourceKind::classify("0"), SourceKind::Stream);
        assert_eq!(SourceKind::classify("12"), SourceKind::Stream);
        assert_eq!(
            SourceKind::classify("rtsp://cam.local/stream"),
            SourceKind::Stream
        );
        assert_eq!(
            SourceKind::classify("http://example.com/feed.mjpg"),
            SourceKind::Stream
        );
        assert_eq!(SourceKind::classify("streams.txt"), SourceKind::Stream);
        assert_eq!(SourceKind::classify("images/"), SourceKind::Files);
        assert_eq!(SourceKind::classify("0fEtgP4d.jpg"), SourceKind::Files);
        assert_eq!(SourceKind::classify(""), SourceKind::Files);
    }

    #[test]
    fn test_resolve_files_partitions_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.PNG", "clip.mp4", "notes.md"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let files = resolve_files(dir.path().to_str().unwrap()).unwrap();
        fn names(v: &[PathBuf]) -> Vec<String> {
            v.iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
                .collect()
        }
        assert_eq!(names(&files.images), vec!["a.PNG", "b.jpg"]);
        assert_eq!(names(&files.videos), vec!["clip.mp4"]);
    }

    #[test]
    fn test_resolve_files_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_files(dir.path().to_str().unwrap()).is_err());
        assert!(resolve_files("/definitely/not/here.jpg").is_err());
    }

    #[test]
    fn test_resolve_streams_from_list() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("streams.txt");
        fs::write(&list, "rtsp://a/1\n\n  0  \n").unwrap();
        let streams = resolve_streams(list.to_str().unwrap()).unwrap();
        assert_eq!(streams, vec!["rtsp://a/1".to_string(), "0".to_string()]);

        assert_eq!(resolve_streams("0").unwrap(), vec!["0".to_string()]);
    }

    #[test]
    fn test_file_source_yields_images() {
        let dir = tempfile::tempdir().unwrap();
        let img = Mat::new_rows_cols_with_default(20, 30, CV_8UC3, Scalar::all(40.0)).unwrap();
        for name in ["one.png", "two.png"] {
            let path = dir.path().join(name);
            imgcodecs::imwrite(path.to_str().unwrap(), &img, &Vector::new()).unwrap();
        }
        fs::write(dir.path().join("broken.jpg"), b"not an image").unwrap();

        let files = resolve_files(dir.path().to_str().unwrap()).unwrap();
        let mut source = FileSource::new(files);
        assert_eq!(source.len_hint(), Some(3));

        let mut seen = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.mode, FrameMode::Image);
            assert_eq!(frame.image.cols(), 30);
            seen.push(Path::new(&frame.path).file_name().unwrap().to_owned());
        }
        assert_eq!(seen, vec!["one.png", "two.png"]);
    }
}
