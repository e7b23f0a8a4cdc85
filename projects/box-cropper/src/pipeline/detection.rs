use crate::pipeline::geometry::mirror_x;
use crate::pipeline::types::{RawDetection, RawDetections, Xyxy};
use crate::run_context::{BackendSettings, Device, MODEL_STRIDE};
use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageBuffer, Rgb};
use opencv::core::{self, Mat};
use opencv::prelude::*;
use usls::models::RTDETR;
use usls::{Config, Image};

/// Anything that turns a frame into raw, unsuppressed predictions.
pub trait Detector {
    /// Class names indexed by class id
    fn class_names(&self) -> &[String];

    /// Max stride of the network, used to validate the inference size.
    fn stride(&self) -> u32 {
        MODEL_STRIDE
    }

    fn detect(&mut self, image: &Mat) -> Result<RawDetections>;

    /// Runs one throwaway inference so the first real frame is not slowed
    /// down by lazy initialization.
    fn warmup(&mut self, _img_size: u32) -> Result<()> {
        Ok(())
    }
}

/// Runs the detector, optionally a second time on the mirrored frame.
/// Mirrored predictions are flipped back and appended, leaving duplicates for
/// suppression to resolve.
pub fn run_inference<D: Detector + ?Sized>(
    detector: &mut D,
    image: &Mat,
    augment: bool,
) -> Result<RawDetections> {
    let mut raw = detector.detect(image)?;
    if !augment {
        return Ok(raw);
    }

    let mut flipped = Mat::default();
    core::flip(image, &mut flipped, 1)?;
    let mirrored = detector.detect(&flipped)?;

    let width = mirrored.input_size.0 as f32;
    tracing::debug!(
        "Augmented inference: {} direct, {} mirrored",
        raw.detections.len(),
        mirrored.detections.len()
    );
    raw.detections
        .extend(mirrored.detections.into_iter().map(|d| RawDetection {
            bbox: mirror_x(&d.bbox, width),
            ..d
        }));

    Ok(raw)
}

/// A wrapper around the USLS RT-DETR model that handles BGR-to-RGB conversion
/// and corrects for aspect-ratio padding bugs in the underlying model library.
pub struct UslsDetector {
    model: RTDETR,
    names: Vec<String>,
    device: Device,
}

impl UslsDetector {
    /// Loads a model file. Without `class_names` the COCO-80 names are used.
    pub fn new(
        model_path: &str,
        class_names: Option<Vec<String>>,
        settings: BackendSettings,
    ) -> Result<Self> {
        let names = class_names
            .unwrap_or_else(|| usls::NAMES_COCO_80.iter().map(|s| s.to_string()).collect());
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

        let device_name = settings.device.to_string();
        let img_size = settings.img_size as usize;
        let config = Config::default()
            .with_model_file(model_path)
            .with_class_names(&name_refs)
            .with_class_confs(&[settings.conf_thres])
            .with_model_ixx(0, 2, img_size.into())
            .with_model_ixx(0, 3, img_size.into())
            .with_model_device(
                device_name
                    .as_str()
                    .try_into()
                    .map_err(|e| anyhow!("Unsupported device {}: {}", device_name, e))?,
            )
            .with_model_dtype(settings.precision.as_str().try_into().map_err(|e| {
                anyhow!(
                    "Unsupported precision {}: {}",
                    settings.precision.as_str(),
                    e
                )
            })?);

        #[cfg(target_os = "macos")]
        let config = if settings.device.is_gpu() {
            config
        } else {
            config.with_model_device(usls::Device::CoreMl)
        };

        let config = config.commit()?;
        let model = RTDETR::new(config)
            .with_context(|| format!("Failed to load model {}", model_path))?;

        tracing::info!(
            "Loaded model {} ({} classes, device={}, precision={}, size={}, conf={})",
            model_path,
            names.len(),
            settings.device,
            settings.precision.as_str(),
            settings.img_size,
            settings.conf_thres
        );

        Ok(Self {
            model,
            names,
            device: settings.device,
        })
    }
}

impl Detector for UslsDetector {
    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn detect(&mut self, image: &Mat) -> Result<RawDetections> {
        let dynamic_image = mat_to_dynamic_image(image)?;

        // Correction calculations (USLS RT-DETR bug workaround)
        let size = image.size()?;
        let img_w = size.width as f32;
        let img_h = size.height as f32;

        let (x_corr, y_corr) = if img_w > img_h {
            (img_w / img_h, 1.0)
        } else if img_h > img_w {
            (1.0, img_h / img_w)
        } else {
            (1.0, 1.0)
        };

        let results = self.model.forward(&[Image::from(dynamic_image)])?;

        let detections = results
            .into_iter()
            .next()
            .map(|y| y.hbbs)
            .unwrap_or_default()
            .into_iter()
            .map(|hbb| {
                let x = hbb.xmin() * x_corr;
                let w = hbb.width() * x_corr;
                let y = hbb.ymin() * y_corr;
                let h = hbb.height() * y_corr;

                RawDetection {
                    class_id: hbb.id().unwrap_or(0),
                    confidence: hbb.confidence().unwrap_or(0.0),
                    bbox: Xyxy::new(x, y, x + w, y + h),
                }
            })
            .collect();

        // Boxes come back in source pixels, so the input space is the frame itself
        Ok(RawDetections {
            input_size: (size.width as u32, size.height as u32),
            detections,
        })
    }

    fn warmup(&mut self, img_size: u32) -> Result<()> {
        if !self.device.is_gpu() {
            return Ok(());
        }
        let blank = DynamicImage::new_rgb8(img_size, img_size);
        self.model.forward(&[Image::from(blank)])?;
        tracing::debug!("Warmup inference done at {}x{}", img_size, img_size);
        Ok(())
    }
}

/// Convert an OpenCV Mat (BGR) to an image::DynamicImage (RGB)
fn mat_to_dynamic_image(mat: &Mat) -> Result<DynamicImage> {
    let mut rgb_mat = Mat::default();
    opencv::imgproc::cvt_color_def(mat, &mut rgb_mat, opencv::imgproc::COLOR_BGR2RGB)?;

    let size = rgb_mat.size()?;
    let width = size.width as u32;
    let height = size.height as u32;

    if !rgb_mat.is_continuous() {
        return Err(anyhow!("Mat is not continuous"));
    }

    let data_bytes = rgb_mat.data_bytes()?;
    let buffer = data_bytes.to_vec();

    let img_buffer = ImageBuffer::<Rgb<u8>, _>::from_vec(width, height, buffer)
        .ok_or_else(|| anyhow!("Failed to create ImageBuffer from Mat data"))?;

    Ok(DynamicImage::ImageRgb8(img_buffer))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use opencv::imgproc;

    /// Reports the bounding box of all bright pixels as a single detection.
    pub struct BrightRegionDetector {
        pub names: Vec<String>,
        pub class_id: usize,
        pub calls: usize,
    }

    impl BrightRegionDetector {
        pub fn new(names: &[&str], class_id: usize) -> Self {
            Self {
                names: names.iter().map(|s| s.to_string()).collect(),
                class_id,
                calls: 0,
            }
        }
    }

    impl Detector for BrightRegionDetector {
        fn class_names(&self) -> &[String] {
            &self.names
        }

        fn detect(&mut self, image: &Mat) -> Result<RawDetections> {
            self.calls += 1;
            let size = image.size()?;
            let input_size = (size.width as u32, size.height as u32);

            let mut gray = Mat::default();
            imgproc::cvt_color_def(image, &mut gray, imgproc::COLOR_BGR2GRAY)?;
            let mut mask = Mat::default();
            imgproc::threshold(&gray, &mut mask, 127.0, 255.0, imgproc::THRESH_BINARY)?;

            if core::count_non_zero(&mask)? == 0 {
                return Ok(RawDetections::empty(input_size));
            }

            let rect = imgproc::bounding_rect(&mask)?;
            Ok(RawDetections {
                input_size,
                detections: vec![RawDetection {
                    class_id: self.class_id,
                    confidence: 0.9,
                    bbox: Xyxy::new(
                        rect.x as f32,
                        rect.y as f32,
                        (rect.x + rect.width) as f32,
                        (rect.y + rect.height) as f32,
                    ),
                }],
            })
        }
    }
}
