use crate::pipeline::types::{Position, Xyxy};

/// Python-compatible rounding (half to even), so 2.5 rounds to 2.
fn round_half_even(v: f64) -> i32 {
    v.round_ties_even() as i32
}

/// Outward padding added around every detection before cropping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Margin {
    pub horizontal: i32,
    pub vertical: i32,
}

impl Margin {
    /// Margins scale with the frame: 1% of the width, 1/140 of the height.
    pub fn for_frame(width: i32, height: i32) -> Self {
        Self {
            horizontal: round_half_even(width as f64 / 100.0),
            vertical: round_half_even(height as f64 / 140.0),
        }
    }
}

/// Truncates a box to integer pixels and grows it by `margin` on every side.
/// The result may extend past the frame; see `clamp_to_frame`.
pub fn expand(bbox: &Xyxy, margin: Margin) -> Position {
    Position {
        x1: bbox.x1 as i32 - margin.horizontal,
        x2: bbox.x2 as i32 + margin.horizontal,
        y1: bbox.y1 as i32 - margin.vertical,
        y2: bbox.y2 as i32 + margin.vertical,
    }
}

/// Clips a rectangle to `[0, width] x [0, height]`.
pub fn clamp_to_frame(pos: Position, width: i32, height: i32) -> Position {
    Position {
        x1: pos.x1.clamp(0, width),
        x2: pos.x2.clamp(0, width),
        y1: pos.y1.clamp(0, height),
        y2: pos.y2.clamp(0, height),
    }
}

/// Maps a box from the model input space back to the original frame.
///
/// The input is assumed to be a letterboxed version of the frame: scaled by a
/// single gain that fits the frame inside the input, then padded evenly on
/// both sides of the short axis. The result is clipped to the frame.
pub fn scale_coords(input_size: (u32, u32), bbox: &Xyxy, frame_size: (u32, u32)) -> Xyxy {
    let (in_w, in_h) = (input_size.0 as f32, input_size.1 as f32);
    let (fr_w, fr_h) = (frame_size.0 as f32, frame_size.1 as f32);

    if input_size == frame_size || fr_w <= 0.0 || fr_h <= 0.0 {
        return clip(bbox, fr_w, fr_h);
    }

    let gain = (in_w / fr_w).min(in_h / fr_h);
    let pad_x = (in_w - fr_w * gain) / 2.0;
    let pad_y = (in_h - fr_h * gain) / 2.0;

    let scaled = Xyxy {
        x1: (bbox.x1 - pad_x) / gain,
        y1: (bbox.y1 - pad_y) / gain,
        x2: (bbox.x2 - pad_x) / gain,
        y2: (bbox.y2 - pad_y) / gain,
    };

    clip(&scaled, fr_w, fr_h)
}

fn clip(bbox: &Xyxy, width: f32, height: f32) -> Xyxy {
    Xyxy {
        x1: bbox.x1.clamp(0.0, width),
        y1: bbox.y1.clamp(0.0, height),
        x2: bbox.x2.clamp(0.0, width),
        y2: bbox.y2.clamp(0.0, height),
    }
}

/// Mirrors a box horizontally inside a frame of the given width.
pub fn mirror_x(bbox: &Xyxy, width: f32) -> Xyxy {
    Xyxy {
        x1: width - bbox.x2,
        y1: bbox.y1,
        x2: width - bbox.x1,
        y2: bbox.y2,
    }
}

/// Rounds the inference size up to a multiple of the model stride.
pub fn check_img_size(img_size: u32, stride: u32) -> u32 {
    let stride = stride.max(1);
    let checked = img_size.div_ceil(stride) * stride;
    if checked != img_size {
        tracing::warn!(
            "img_size {} must be a multiple of max stride {}, updating to {}",
            img_size,
            stride,
            checked
        );
    }
    checked
}

/// Center, width and height of a box normalized by the frame size.
pub fn normalized_xywh(bbox: &Xyxy, width: u32, height: u32) -> (f32, f32, f32, f32) {
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;
    (
        (bbox.x1 + bbox.x2) / 2.0 / w,
        (bbox.y1 + bbox.y2) / 2.0 / h,
        bbox.width() / w,
        bbox.height() / h,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_expansion() {
        let margin = Margin::for_frame(200, 140);
        assert_eq!(
            margin,
            Margin {
                horizontal: 2,
                vertical: 1
            }
        );

        let pos = expand(&Xyxy::new(50.0, 30.0, 120.0, 90.0), margin);
        assert_eq!(pos.x1, 48);
        assert_eq!(pos.x2, 122);
        assert_eq!(pos.y1, 29);
        assert_eq!(pos.y2, 91);
    }

    #[test]
    fn test_margin_rounds_half_to_even() {
        assert_eq!(Margin::for_frame(250, 350).horizontal, 2);
        assert_eq!(Margin::for_frame(350, 350).horizontal, 4);
        assert_eq!(Margin::for_frame(1920, 1080).horizontal, 19);
        assert_eq!(Margin::for_frame(1920, 1080).vertical, 8);
    }

    #[test]
    fn test_clamp_to_frame() {
        let pos = Position {
            x1: -3,
            x2: 210,
            y1: -1,
            y2: 50,
        };
        let clamped = clamp_to_frame(pos, 200, 140);
        assert_eq!(
            clamped,
            Position {
                x1: 0,
                x2: 200,
                y1: 0,
                y2: 50
            }
        );
    }

    #[test]
    fn test_scale_coords_identity() {
        let b = Xyxy::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(scale_coords((640, 480), &b, (640, 480)), b);
    }

    #[test]
    fn test_scale_coords_letterbox() {
        // 1280x720 letterboxed into 640x640: gain 0.5, vertical pad 140
        let b = Xyxy::new(100.0, 190.0, 200.0, 290.0);
        let scaled = scale_coords((640, 640), &b, (1280, 720));
        assert_eq!(scaled, Xyxy::new(200.0, 100.0, 400.0, 300.0));
    }

    #[test]
    fn test_scale_coords_clips_to_frame() {
        let b = Xyxy::new(-10.0, 0.0, 700.0, 100.0);
        let scaled = scale_coords((640, 640), &b, (640, 640));
        assert_eq!(scaled.x1, 0.0);
        assert_eq!(scaled.x2, 640.0);
    }

    #[test]
    fn test_mirror_x_is_involution() {
        let b = Xyxy::new(10.0, 5.0, 40.0, 25.0);
        let m = mirror_x(&b, 100.0);
        assert_eq!(m, Xyxy::new(60.0, 5.0, 90.0, 25.0));
        assert_eq!(mirror_x(&m, 100.0), b);
    }

    #[test]
    fn test_check_img_size() {
        assert_eq!(check_img_size(640, 32), 640);
        assert_eq!(check_img_size(650, 32), 672);
    }

    #[test]
    fn test_normalized_xywh() {
        let (cx, cy, w, h) = normalized_xywh(&Xyxy::new(50.0, 25.0, 150.0, 75.0), 200, 100);
        assert_eq!((cx, cy, w, h), (0.5, 0.5, 0.5, 0.5));
    }
}
