use crate::pipeline::types::{RawDetection, Xyxy};
use serde::{Deserialize, Serialize};

/// Thresholds and filters applied to raw detector output
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuppressionParams {
    /// Detections must score strictly above this to be kept
    pub conf_thres: f32,
    /// IoU above which the lower-scoring box is discarded
    pub iou_thres: f32,
    /// Keep only these class ids, if set
    pub classes: Option<Vec<usize>>,
    /// Suppress across classes instead of within each class
    pub agnostic: bool,
}

impl Default for SuppressionParams {
    fn default() -> Self {
        Self {
            conf_thres: 0.4,
            iou_thres: 0.5,
            classes: None,
            agnostic: false,
        }
    }
}

/// Filters detections by confidence and class, then removes overlapping duplicates.
/// The result is ordered by confidence, highest first.
pub fn suppress(detections: Vec<RawDetection>, params: &SuppressionParams) -> Vec<RawDetection> {
    let candidates: Vec<RawDetection> = detections
        .into_iter()
        .filter(|d| d.confidence > params.conf_thres)
        .filter(|d| {
            params
                .classes
                .as_ref()
                .map(|classes| classes.contains(&d.class_id))
                .unwrap_or(true)
        })
        .collect();

    nms(candidates, params.iou_thres, params.agnostic)
}

/// Apply Non-Maximum Suppression to remove duplicate detections
pub fn nms(detections: Vec<RawDetection>, iou_threshold: f32, agnostic: bool) -> Vec<RawDetection> {
    if detections.is_empty() {
        return detections;
    }

    // Sort by confidence (highest first)
    let mut sorted = detections;
    sorted.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; sorted.len()];

    for i in 0..sorted.len() {
        if suppressed[i] {
            continue;
        }

        keep.push(sorted[i]);

        for j in (i + 1)..sorted.len() {
            if suppressed[j] {
                continue;
            }
            if !agnostic && sorted[i].class_id != sorted[j].class_id {
                continue;
            }

            if compute_iou(&sorted[i].bbox, &sorted[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Compute Intersection over Union between two bounding boxes
pub fn compute_iou(a: &Xyxy, b: &Xyxy) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = a.area() + b.area() - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: usize, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: Xyxy::new(x1, y1, x2, y2),
        }
    }

    #[test]
    fn test_nms_basic() {
        let d1 = det(0, 0.9, 10.0, 10.0, 50.0, 50.0);
        let d2 = det(0, 0.8, 15.0, 15.0, 55.0, 55.0);
        let result = nms(vec![d2, d1], 0.5, false);
        assert_eq!(result, vec![d1]);
    }

    #[test]
    fn test_nms_keeps_overlapping_boxes_of_other_classes() {
        let d1 = det(0, 0.9, 10.0, 10.0, 50.0, 50.0);
        let d2 = det(1, 0.8, 15.0, 15.0, 55.0, 55.0);
        assert_eq!(nms(vec![d1, d2], 0.5, false).len(), 2);
        assert_eq!(nms(vec![d1, d2], 0.5, true).len(), 1);
    }

    #[test]
    fn test_suppress_applies_confidence_and_class_filter() {
        let params = SuppressionParams {
            conf_thres: 0.4,
            iou_thres: 0.5,
            classes: Some(vec![2]),
            agnostic: false,
        };
        let low = det(2, 0.3, 0.0, 0.0, 10.0, 10.0);
        let wrong_class = det(1, 0.9, 20.0, 20.0, 30.0, 30.0);
        let kept_a = det(2, 0.5, 40.0, 40.0, 60.0, 60.0);
        let kept_b = det(2, 0.7, 100.0, 100.0, 120.0, 120.0);

        let result = suppress(vec![low, wrong_class, kept_a, kept_b], &params);
        assert_eq!(result, vec![kept_b, kept_a]);
    }

    #[test]
    fn test_confidence_at_threshold_is_dropped() {
        let params = SuppressionParams {
            conf_thres: 0.5,
            ..SuppressionParams::default()
        };
        let at = det(0, 0.5, 0.0, 0.0, 10.0, 10.0);
        let above = det(0, 0.51, 50.0, 50.0, 60.0, 60.0);
        assert_eq!(suppress(vec![at, above], &params), vec![above]);
    }

    #[test]
    fn test_compute_iou() {
        let a = Xyxy::new(0.0, 0.0, 10.0, 10.0);
        let b = Xyxy::new(5.0, 0.0, 15.0, 10.0);
        let iou = compute_iou(&a, &b);
        assert!((iou - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(compute_iou(&a, &Xyxy::new(20.0, 20.0, 30.0, 30.0)), 0.0);
    }
}
