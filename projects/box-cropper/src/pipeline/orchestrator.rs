// Pipeline orchestrator: drives a detect-and-crop run
//
// Pulls frames from the resolved source, runs inference and suppression,
// hands detections to the postprocessor, and manages the display window and
// the video sink for the lifetime of the run.

use crate::pipeline::detection::{run_inference, Detector};
use crate::pipeline::display::{self, DisplayEvent};
use crate::pipeline::geometry::check_img_size;
use crate::pipeline::postprocess::Postprocessor;
use crate::pipeline::suppression::suppress;
use crate::pipeline::types::{FrameMode, RawDetections, ResultEntry};
use crate::run_artifacts::RunManifest;
use crate::run_context::{prepare_output_dir, write_manifest, DetectOptions};
use crate::source::{open_source, FrameSource, SourceKind};
use crate::video::writer::{FrameWriter, Mp4Writer, VideoSink};
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use opencv::prelude::*;
use std::time::Instant;

/// Per-run switches derived from the options and the kind of source
#[derive(Debug, Clone, Copy)]
pub struct RunMode {
    pub view_img: bool,
    /// Write annotated video frames next to the crops
    pub save_video: bool,
}

impl RunMode {
    /// Live streams are always displayed and never recorded.
    pub fn for_source(kind: &SourceKind, options: &DetectOptions) -> Self {
        match kind {
            SourceKind::Stream => Self {
                view_img: true,
                save_video: false,
            },
            SourceKind::Files => Self {
                view_img: options.view_img,
                save_video: true,
            },
        }
    }
}

/// Everything a finished frame loop reports back
pub struct LoopOutcome {
    pub results: Vec<ResultEntry>,
    pub frames_processed: usize,
    pub quit_requested: bool,
}

/// Runs detection over `options.source` and returns one entry per saved crop,
/// in processing order.
pub fn run<D: Detector + ?Sized>(
    detector: &mut D,
    options: &DetectOptions,
) -> Result<Vec<ResultEntry>> {
    tracing::info!("Options: {:?}", options);
    let start = Instant::now();

    prepare_output_dir(&options.output)?;

    let kind = SourceKind::classify(&options.source);
    let mode = RunMode::for_source(&kind, options);

    let img_size = check_img_size(options.img_size, detector.stride());
    detector.warmup(img_size)?;

    let mut source = open_source(&options.source)?;
    let mut sink: VideoSink<Mp4Writer> = VideoSink::new();
    let outcome = process_source(detector, source.as_mut(), options, mode, &mut sink)?;
    sink.finish()?;

    if mode.view_img {
        display::close_all();
    }

    let manifest = RunManifest {
        source: options.source.clone(),
        created_at: chrono::Utc::now(),
        options: options.clone(),
        frames_processed: outcome.frames_processed,
        results: outcome.results,
    };
    let manifest_path = write_manifest(&options.output, &manifest)?;

    tracing::info!(
        "Results saved to {:?} ({} crops from {} frames{})",
        manifest_path,
        manifest.results.len(),
        manifest.frames_processed,
        if outcome.quit_requested {
            ", stopped by user"
        } else {
            ""
        }
    );
    tracing::info!("Done. ({:.3}s)", start.elapsed().as_secs_f64());

    Ok(manifest.results)
}

/// The frame loop. Stops at the end of the source or when the display
/// window asks to quit.
pub fn process_source<D, W>(
    detector: &mut D,
    source: &mut dyn FrameSource,
    options: &DetectOptions,
    mode: RunMode,
    sink: &mut VideoSink<W>,
) -> Result<LoopOutcome>
where
    D: Detector + ?Sized,
    W: FrameWriter,
{
    let mut post = Postprocessor::new(
        &options.output,
        detector.class_names(),
        options.binarize(),
        options.save_txt,
    );
    let params = options.suppression();

    let pb = match source.len_hint() {
        Some(total) => {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow} fps, {eta})")?
                    .progress_chars("#>-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let mut outcome = LoopOutcome {
        results: Vec::new(),
        frames_processed: 0,
        quit_requested: false,
    };

    while let Some(frame) = source.next_frame()? {
        let t1 = Instant::now();
        let raw = run_inference(detector, &frame.image, options.augment)?;
        let raw = RawDetections {
            input_size: raw.input_size,
            detections: suppress(raw.detections, &params),
        };
        let inference_secs = t1.elapsed().as_secs_f64();

        let output = post.process(&frame, raw)?;

        let prefix = match frame.mode {
            FrameMode::Stream { index, .. } => format!("{}: ", index),
            _ => String::new(),
        };
        tracing::info!(
            "{}{}x{} {}Done. ({:.3}s)",
            prefix,
            frame.image.cols(),
            frame.image.rows(),
            output.class_summary(),
            inference_secs
        );

        let video_target = match frame.mode {
            FrameMode::Video { fps, size, .. } if mode.save_video => {
                Some((post.save_path(&frame), fps, size))
            }
            _ => None,
        };

        if mode.view_img || video_target.is_some() {
            let mut annotated = frame.image.try_clone()?;
            display::annotate(&mut annotated, &output.detections)?;

            if let Some((path, fps, size)) = video_target {
                sink.write(&path, &annotated, fps, size)?;
            }

            if mode.view_img && display::show(&frame.path, &annotated)? == DisplayEvent::Quit {
                outcome.quit_requested = true;
            }
        }

        outcome.results.extend(output.entries);
        outcome.frames_processed += 1;
        pb.inc(1);

        if outcome.quit_requested {
            break;
        }
    }

    pb.finish_and_clear();

    let observed: Vec<&str> = post.labels().observed().map(|(_, name)| name).collect();
    tracing::debug!("Observed classes: {:?}", observed);

    Ok(outcome)
}
