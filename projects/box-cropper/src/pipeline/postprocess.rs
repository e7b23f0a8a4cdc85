use crate::pipeline::crop::{binarize, crop_region, pad_border, save_jpeg};
use crate::pipeline::geometry::{clamp_to_frame, expand, normalized_xywh, scale_coords, Margin};
use crate::pipeline::labels::LabelTable;
use crate::pipeline::types::{Detection, Frame, FrameMode, RawDetections, ResultEntry};
use anyhow::{Context, Result};
use opencv::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// What a single frame produced
#[derive(Debug, Default)]
pub struct FrameOutput {
    /// Detections in source pixels, highest confidence first
    pub detections: Vec<Detection>,
    pub entries: Vec<ResultEntry>,
}

impl FrameOutput {
    /// `"3 cars, 1 person, "` style count string, in class id order.
    pub fn class_summary(&self) -> String {
        let mut counts: BTreeMap<usize, (&str, usize)> = BTreeMap::new();
        for d in &self.detections {
            counts.entry(d.class_id).or_insert((d.label.as_str(), 0)).1 += 1;
        }
        counts
            .values()
            .map(|(label, n)| format!("{} {}s, ", n, label))
            .collect()
    }
}

/// Turns suppressed detections into saved crops and result entries.
pub struct Postprocessor {
    output_dir: PathBuf,
    binarize: bool,
    save_txt: bool,
    labels: LabelTable,
}

impl Postprocessor {
    pub fn new(output_dir: &Path, class_names: &[String], binarize: bool, save_txt: bool) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            binarize,
            save_txt,
            labels: LabelTable::new(class_names),
        }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Path a frame's annotated output (image or video) maps to.
    pub fn save_path(&self, frame: &Frame) -> PathBuf {
        self.output_dir.join(file_name_of(&frame.path))
    }

    pub fn process(&mut self, frame: &Frame, raw: RawDetections) -> Result<FrameOutput> {
        if raw.detections.is_empty() {
            return Ok(FrameOutput::default());
        }

        let size = frame.image.size()?;
        let frame_size = (size.width as u32, size.height as u32);

        let mut detections: Vec<Detection> = raw
            .detections
            .iter()
            .map(|d| {
                let bbox = scale_coords(raw.input_size, &d.bbox, frame_size).round();
                Detection {
                    class_id: d.class_id,
                    label: self.labels.observe(d.class_id).to_string(),
                    confidence: d.confidence,
                    bbox,
                }
            })
            .collect();
        detections.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let margin = Margin::for_frame(size.width, size.height);
        let stem = self.artifact_stem(frame);
        let mut label_counts: HashMap<String, usize> = HashMap::new();
        let mut entries = Vec::with_capacity(detections.len());

        for d in &detections {
            let position = clamp_to_frame(expand(&d.bbox, margin), size.width, size.height);

            let mut crop = match crop_region(&frame.image, &position) {
                Ok(crop) => crop,
                Err(e) => {
                    tracing::warn!("Skipping {} detection in {}: {}", d.label, frame.path, e);
                    continue;
                }
            };
            if self.binarize {
                crop = binarize(&crop)?;
            }
            let crop = pad_border(&crop)?;

            let seen = label_counts.entry(d.label.clone()).or_insert(0);
            let crop_path = self
                .output_dir
                .join(crop_file_name(&stem, &d.label, *seen));
            *seen += 1;

            save_jpeg(&crop_path, &crop)?;
            let path = fs::canonicalize(&crop_path)
                .with_context(|| format!("Failed to resolve {:?}", crop_path))?;

            tracing::debug!(
                "{} {:.2} at {:?} -> {:?}",
                d.label,
                d.confidence,
                position,
                path
            );

            entries.push(ResultEntry {
                label: d.label.clone(),
                path,
                position,
            });
        }

        if self.save_txt {
            self.append_labels(&stem, &detections, frame_size)?;
        }

        Ok(FrameOutput {
            detections,
            entries,
        })
    }

    /// File stem shared by every artifact of a frame. Video frames carry their
    /// frame number; stream frames also carry the stream index, since several
    /// addresses can end in the same component.
    fn artifact_stem(&self, frame: &Frame) -> String {
        let name = file_name_of(&frame.path);
        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or(name);
        match frame.mode {
            FrameMode::Image => stem,
            FrameMode::Video { frame_index, .. } => format!("{}_{}", stem, frame_index),
            FrameMode::Stream { index, frame_index } => {
                format!("{}_s{}_{}", stem, index, frame_index)
            }
        }
    }

    fn append_labels(&self, stem: &str, detections: &[Detection], frame_size: (u32, u32)) -> Result<()> {
        let txt_path = self.output_dir.join(format!("{}.txt", stem));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&txt_path)
            .with_context(|| format!("Failed to open {:?}", txt_path))?;

        for d in detections {
            let (cx, cy, w, h) = normalized_xywh(&d.bbox, frame_size.0, frame_size.1);
            writeln!(file, "{} {} {} {} {}", d.label, cx, cy, w, h)?;
        }
        Ok(())
    }
}

/// Last path component of a file path or stream address.
fn file_name_of(source_path: &str) -> String {
    Path::new(source_path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "stream".to_string())
}

/// `<stem>_<label>.jpg`, with `_<n>` appended for repeated labels in a frame.
pub fn crop_file_name(stem: &str, label: &str, occurrence: usize) -> String {
    let label = label.replace(['/', '\\'], "_");
    if occurrence == 0 {
        format!("{}_{}.jpg", stem, label)
    } else {
        format!("{}_{}_{}.jpg", stem, label, occurrence)
    }
}
