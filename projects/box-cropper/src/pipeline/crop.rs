use crate::pipeline::types::Position;
use anyhow::{Context, Result};
use opencv::prelude::*;
use opencv::{core, imgcodecs, imgproc};
use std::path::Path;

/// White border added around every saved crop, in pixels
pub const BORDER_PX: i32 = 50;

const THRESHOLD_BLOCK_SIZE: i32 = 45;
const THRESHOLD_C: f64 = 20.0;

/// Copies a pixel rectangle out of `img`, clamped to the image bounds.
pub fn crop_region(img: &core::Mat, pos: &Position) -> Result<core::Mat> {
    let size = img.size()?;

    let x = pos.x1.clamp(0, size.width);
    let y = pos.y1.clamp(0, size.height);
    let w = pos.x2.clamp(0, size.width) - x;
    let h = pos.y2.clamp(0, size.height) - y;

    if w <= 0 || h <= 0 {
        anyhow::bail!(
            "Invalid crop dimensions: {}x{} (position: {:?}, image: {}x{})",
            w,
            h,
            pos,
            size.width,
            size.height
        );
    }

    let roi = core::Rect::new(x, y, w, h);
    let cropped = core::Mat::roi(img, roi)?;

    let mut out = core::Mat::default();
    cropped.copy_to(&mut out)?;

    Ok(out)
}

/// Grayscale plus mean adaptive threshold, producing a black-on-white image
/// suited to text recognition.
pub fn binarize(img: &core::Mat) -> Result<core::Mat> {
    let gray = if img.channels() == 1 {
        img.clone()
    } else {
        let mut gray = core::Mat::default();
        imgproc::cvt_color_def(img, &mut gray, imgproc::COLOR_BGR2GRAY)?;
        gray
    };

    let mut out = core::Mat::default();
    imgproc::adaptive_threshold(
        &gray,
        &mut out,
        255.0,
        imgproc::ADAPTIVE_THRESH_MEAN_C,
        imgproc::THRESH_BINARY,
        THRESHOLD_BLOCK_SIZE,
        THRESHOLD_C,
    )?;

    Ok(out)
}

/// Surrounds the image with a constant white border of `BORDER_PX`.
pub fn pad_border(img: &core::Mat) -> Result<core::Mat> {
    let mut padded = core::Mat::default();
    core::copy_make_border(
        img,
        &mut padded,
        BORDER_PX,
        BORDER_PX,
        BORDER_PX,
        BORDER_PX,
        core::BORDER_CONSTANT,
        core::Scalar::all(255.0),
    )?;
    Ok(padded)
}

pub fn save_jpeg(path: &Path, img: &core::Mat) -> Result<()> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Non UTF-8 crop path: {:?}", path))?;

    let written = imgcodecs::imwrite(path_str, img, &core::Vector::new())
        .with_context(|| format!("Failed to encode crop {}", path_str))?;
    if !written {
        anyhow::bail!("Failed to write crop image {}", path_str);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Mat, Scalar, Vec3b, CV_8UC3};

    fn blank(rows: i32, cols: i32, value: f64) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::all(value)).unwrap()
    }

    #[test]
    fn test_crop_region_clamps_to_image() {
        let img = blank(100, 200, 0.0);
        let pos = Position {
            x1: -5,
            x2: 50,
            y1: 90,
            y2: 120,
        };
        let crop = crop_region(&img, &pos).unwrap();
        assert_eq!(crop.cols(), 50);
        assert_eq!(crop.rows(), 10);
    }

    #[test]
    fn test_crop_region_rejects_empty() {
        let img = blank(100, 200, 0.0);
        let pos = Position {
            x1: 250,
            x2: 260,
            y1: 10,
            y2: 20,
        };
        assert!(crop_region(&img, &pos).is_err());
    }

    #[test]
    fn test_pad_border_adds_white_frame() {
        let img = blank(10, 20, 0.0);
        let padded = pad_border(&img).unwrap();
        assert_eq!(padded.rows(), 10 + 2 * BORDER_PX);
        assert_eq!(padded.cols(), 20 + 2 * BORDER_PX);

        let corner = padded.at_2d::<Vec3b>(0, 0).unwrap();
        assert_eq!(corner.0, [255, 255, 255]);
        let center = padded.at_2d::<Vec3b>(BORDER_PX + 5, BORDER_PX + 10).unwrap();
        assert_eq!(center.0, [0, 0, 0]);
    }

    #[test]
    fn test_binarize_produces_single_channel_binary() {
        let img = blank(60, 60, 128.0);
        let bin = binarize(&img).unwrap();
        assert_eq!(bin.channels(), 1);
        assert_eq!(bin.rows(), 60);

        // A flat image sits above its local mean minus C everywhere
        let px = *bin.at_2d::<u8>(30, 30).unwrap();
        assert_eq!(px, 255);
    }

    #[test]
    fn test_save_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crop_car.jpg");
        save_jpeg(&path, &blank(8, 8, 10.0)).unwrap();
        assert!(path.exists());
    }
}
