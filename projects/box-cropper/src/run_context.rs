use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::pipeline::geometry::check_img_size;
use crate::pipeline::suppression::SuppressionParams;
use crate::run_artifacts::RunManifest;

/// Maker whose crops are binarized before saving.
pub const BINARIZE_MAKER: &str = "tci";

/// Compute device the detector runs on
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl Device {
    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu:0"),
            Device::Cuda(id) => write!(f, "cuda:{}", id),
        }
    }
}

impl FromStr for Device {
    type Err = anyhow::Error;

    /// Accepts `cpu`, a bare CUDA index (`0`, or `0,1` where the first wins),
    /// or `cuda[:N]`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s.is_empty() || s == "cpu" || s.starts_with("cpu:") {
            return Ok(Device::Cpu);
        }

        let index = match s.strip_prefix("cuda") {
            Some("") => "0",
            Some(rest) => rest.trim_start_matches(':'),
            None => s.split(',').next().unwrap_or_default().trim(),
        };

        match index.parse::<usize>() {
            Ok(id) => Ok(Device::Cuda(id)),
            Err(_) => bail!("Invalid device: {} (expected cpu, N or cuda:N)", s),
        }
    }
}

/// Floating point precision used for inference
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Fp32,
    Fp16,
}

impl Precision {
    /// Half precision is only honored on GPU devices.
    pub fn for_device(device: Device, half: bool) -> Self {
        if half && device.is_gpu() {
            Precision::Fp16
        } else {
            Precision::Fp32
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Fp32 => "fp32",
            Precision::Fp16 => "fp16",
        }
    }
}

/// Max stride of the bundled detector backend
pub const MODEL_STRIDE: u32 = 32;

/// What the detector backend needs to know when the model is loaded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendSettings {
    pub device: Device,
    pub precision: Precision,
    /// Square inference size, already a multiple of `MODEL_STRIDE`
    pub img_size: u32,
    /// Score cutoff applied inside the backend
    pub conf_thres: f32,
}

/// Options for a single detect-and-crop run
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DetectOptions {
    pub source: String,
    pub output: PathBuf,
    pub img_size: u32,
    pub conf_thres: f32,
    pub iou_thres: f32,
    pub device: Device,
    pub precision: Precision,
    /// Keep only these class ids, if set
    pub classes: Option<Vec<usize>>,
    pub agnostic_nms: bool,
    pub augment: bool,
    /// Crop maker; crops are binarized when it is `BINARIZE_MAKER`
    pub maker: Option<String>,
    pub view_img: bool,
    pub save_txt: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            source: String::new(),
            output: PathBuf::from("output"),
            img_size: 640,
            conf_thres: 0.4,
            iou_thres: 0.5,
            device: Device::Cpu,
            precision: Precision::Fp32,
            classes: None,
            agnostic_nms: false,
            augment: false,
            maker: None,
            view_img: false,
            save_txt: true,
        }
    }
}

impl DetectOptions {
    pub fn suppression(&self) -> SuppressionParams {
        SuppressionParams {
            conf_thres: self.conf_thres,
            iou_thres: self.iou_thres,
            classes: self.classes.clone(),
            agnostic: self.agnostic_nms,
        }
    }

    /// Settings for loading the model. The size is rounded up to the model
    /// stride and the score cutoff is clamped to `[0, 1]`.
    pub fn backend(&self) -> BackendSettings {
        let conf_thres = self.conf_thres.clamp(0.0, 1.0);
        if conf_thres != self.conf_thres {
            tracing::warn!(
                "conf_thres {} is outside [0, 1], using {}",
                self.conf_thres,
                conf_thres
            );
        }
        BackendSettings {
            device: self.device,
            precision: self.precision,
            img_size: check_img_size(self.img_size, MODEL_STRIDE),
            conf_thres,
        }
    }

    pub fn binarize(&self) -> bool {
        self.maker
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case(BINARIZE_MAKER))
            .unwrap_or(false)
    }
}

/// Creates the output directory when absent. Existing contents are left untouched.
pub fn prepare_output_dir(output: &Path) -> Result<()> {
    if output.exists() {
        tracing::debug!("Output directory {:?} already exists", output);
        return Ok(());
    }

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {:?}", output))?;
    tracing::info!("Created output directory {:?}", output);
    Ok(())
}

pub fn write_manifest(output: &Path, manifest: &RunManifest) -> Result<PathBuf> {
    let path = output.join("results.json");
    let content = serde_json::to_string_pretty(manifest)?;
    fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parsing() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("0".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("1,2".parse::<Device>().unwrap(), Device::Cuda(1));
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("CUDA:3".parse::<Device>().unwrap(), Device::Cuda(3));
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_half_precision_requires_gpu() {
        assert_eq!(Precision::for_device(Device::Cpu, true), Precision::Fp32);
        assert_eq!(Precision::for_device(Device::Cuda(0), true), Precision::Fp16);
        assert_eq!(Precision::for_device(Device::Cuda(0), false), Precision::Fp32);
    }

    #[test]
    fn test_backend_settings_follow_options() {
        let opts = DetectOptions {
            img_size: 650,
            conf_thres: 0.1,
            device: Device::Cuda(1),
            precision: Precision::Fp16,
            ..DetectOptions::default()
        };
        let backend = opts.backend();
        assert_eq!(backend.img_size, 672);
        assert_eq!(backend.conf_thres, 0.1);
        assert_eq!(backend.device, Device::Cuda(1));
        assert_eq!(backend.precision, Precision::Fp16);

        let opts = DetectOptions {
            conf_thres: 1.5,
            ..DetectOptions::default()
        };
        assert_eq!(opts.backend().conf_thres, 1.0);
        assert_eq!(opts.backend().img_size, 640);
    }

    #[test]
    fn test_binarize_gated_by_maker() {
        let mut opts = DetectOptions::default();
        assert!(!opts.binarize());
        opts.maker = Some("other".to_string());
        assert!(!opts.binarize());
        opts.maker = Some("TCI".to_string());
        assert!(opts.binarize());
    }

    #[test]
    fn test_prepare_output_dir_keeps_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("output");
        prepare_output_dir(&out).unwrap();
        assert!(out.is_dir());

        let marker = out.join("keep.txt");
        fs::write(&marker, "x").unwrap();
        prepare_output_dir(&out).unwrap();
        assert!(marker.exists());
    }
}
