use crate::pipeline::types::Detection;
use anyhow::Result;
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::{highgui, imgproc};

/// Outcome of showing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    Continue,
    /// The user pressed `q`
    Quit,
}

/// Deterministic BGR color for a class id
pub fn class_color(class_id: usize) -> Scalar {
    const PALETTE: [(f64, f64, f64); 8] = [
        (56.0, 56.0, 255.0),
        (151.0, 157.0, 255.0),
        (31.0, 112.0, 255.0),
        (29.0, 178.0, 255.0),
        (49.0, 210.0, 207.0),
        (10.0, 249.0, 72.0),
        (187.0, 212.0, 0.0),
        (255.0, 115.0, 100.0),
    ];
    let (b, g, r) = PALETTE[class_id % PALETTE.len()];
    Scalar::new(b, g, r, 0.0)
}

/// Draws every detection as a box with a `label confidence` caption.
pub fn annotate(img: &mut Mat, detections: &[Detection]) -> Result<()> {
    for d in detections {
        let rect = Rect::new(
            d.bbox.x1 as i32,
            d.bbox.y1 as i32,
            d.bbox.width() as i32,
            d.bbox.height() as i32,
        );
        let color = class_color(d.class_id);
        imgproc::rectangle(img, rect, color, 2, imgproc::LINE_8, 0)?;

        let caption = format!("{} {:.2}", d.label, d.confidence);
        let origin = Point::new(rect.x, (rect.y - 4).max(12));
        imgproc::put_text(
            img,
            &caption,
            origin,
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            color,
            1,
            imgproc::LINE_AA,
            false,
        )?;
    }
    Ok(())
}

/// Shows a frame in a window named after its source and polls the keyboard.
pub fn show(window: &str, img: &Mat) -> Result<DisplayEvent> {
    highgui::imshow(window, img)?;
    let key = highgui::wait_key(1)?;
    if key == 'q' as i32 {
        tracing::info!("Quit requested from display window {}", window);
        return Ok(DisplayEvent::Quit);
    }
    Ok(DisplayEvent::Continue)
}

/// Closes every display window opened during the run.
pub fn close_all() {
    if let Err(e) = highgui::destroy_all_windows() {
        tracing::debug!("Failed to close display windows: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Xyxy;
    use opencv::core::{Vec3b, CV_8UC3};
    use opencv::prelude::*;

    #[test]
    fn test_class_color_is_stable() {
        assert_eq!(class_color(3), class_color(3));
        assert_eq!(class_color(0), class_color(8));
        assert_ne!(class_color(0), class_color(1));
    }

    #[test]
    fn test_annotate_draws_box_outline() {
        let mut img = Mat::new_rows_cols_with_default(100, 100, CV_8UC3, Scalar::all(0.0)).unwrap();
        let det = Detection {
            class_id: 0,
            label: "car".to_string(),
            confidence: 0.87,
            bbox: Xyxy::new(20.0, 30.0, 60.0, 80.0),
        };
        annotate(&mut img, &[det]).unwrap();

        let edge = img.at_2d::<Vec3b>(50, 20).unwrap();
        assert_eq!(edge.0, [56, 56, 255]);
        let inside = img.at_2d::<Vec3b>(55, 40).unwrap();
        assert_eq!(inside.0, [0, 0, 0]);
    }
}
