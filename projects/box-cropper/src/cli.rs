use anyhow::{Context, Result};
use box_cropper::{DetectOptions, Device, Precision};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Image, video, directory, camera index, stream URL, or .txt list of streams
    #[arg(long, env = "BOX_CROPPER_SOURCE")]
    pub source: String,

    /// Path to the detection model (ONNX)
    #[arg(long, env = "BOX_CROPPER_MODEL")]
    pub model: String,

    /// Class names file, one name per line (defaults to COCO-80)
    #[arg(long, env = "BOX_CROPPER_NAMES")]
    pub names: Option<PathBuf>,

    /// Output directory for crops and results.json
    #[arg(long, env = "BOX_CROPPER_OUTPUT", default_value = "output")]
    pub output: PathBuf,

    /// Inference size in pixels
    #[arg(long, env = "BOX_CROPPER_IMG_SIZE", default_value_t = 640)]
    pub img_size: u32,

    /// Object confidence threshold
    #[arg(long, env = "BOX_CROPPER_CONF_THRES", default_value_t = 0.4)]
    pub conf_thres: f32,

    /// IoU threshold for NMS
    #[arg(long, env = "BOX_CROPPER_IOU_THRES", default_value_t = 0.5)]
    pub iou_thres: f32,

    /// Device: cpu, N or cuda:N
    #[arg(long, env = "BOX_CROPPER_DEVICE", default_value = "cpu")]
    pub device: String,

    /// Use half precision (GPU only)
    #[arg(long, env = "BOX_CROPPER_HALF")]
    pub half: bool,

    /// Keep only these class ids (repeatable)
    #[arg(long, alias = "class", env = "BOX_CROPPER_CLASSES", value_delimiter = ',')]
    pub classes: Vec<usize>,

    /// Class-agnostic NMS
    #[arg(long, env = "BOX_CROPPER_AGNOSTIC_NMS")]
    pub agnostic_nms: bool,

    /// Augmented (horizontal flip) inference
    #[arg(long, env = "BOX_CROPPER_AUGMENT")]
    pub augment: bool,

    /// Crop maker; `tci` binarizes crops for OCR
    #[arg(long, env = "BOX_CROPPER_MAKER")]
    pub maker: Option<String>,

    /// Display results in a window
    #[arg(long, env = "BOX_CROPPER_VIEW_IMG")]
    pub view_img: bool,

    /// Save normalized box labels to *.txt
    #[arg(long, env = "BOX_CROPPER_SAVE_TXT")]
    pub save_txt: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn to_options(&self) -> Result<DetectOptions> {
        let device: Device = self.device.parse()?;
        Ok(DetectOptions {
            source: self.source.clone(),
            output: self.output.clone(),
            img_size: self.img_size,
            conf_thres: self.conf_thres,
            iou_thres: self.iou_thres,
            device,
            precision: Precision::for_device(device, self.half),
            classes: if self.classes.is_empty() {
                None
            } else {
                Some(self.classes.clone())
            },
            agnostic_nms: self.agnostic_nms,
            augment: self.augment,
            maker: self.maker.clone(),
            view_img: self.view_img,
            save_txt: self.save_txt,
        })
    }

    pub fn load_class_names(&self) -> Result<Option<Vec<String>>> {
        let Some(path) = &self.names else {
            return Ok(None);
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read class names from {:?}", path))?;
        let names: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            anyhow::bail!("Class names file {:?} is empty", path);
        }
        Ok(Some(names))
    }
}
