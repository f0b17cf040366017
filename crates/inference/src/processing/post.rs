use crate::model::DetectedBox;
use common::span_debug;
use std::collections::BTreeMap;

pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32, max_detections: usize) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            max_detections,
        }
    }

    /// Decode YOLOv8 output into boxes on the original image.
    ///
    /// Returned boxes are sorted by descending confidence.
    #[tracing::instrument(skip(self, predictions, transform))]
    pub fn parse_detections(
        &self,
        predictions: &ndarray::ArrayViewD<f32>, // [1, 4 + num_classes, num_anchors] - cxcywh in input pixels, then class scores
        transform: &TransformParams,
    ) -> anyhow::Result<Vec<DetectedBox>> {
        let shape = predictions.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            anyhow::bail!(
                "Unexpected model output shape {:?}, expected [1, 4 + classes, anchors]",
                shape
            );
        }

        let num_classes = shape[1] - 4;
        let num_anchors = shape[2];

        let mut candidates = Vec::new();

        {
            let _s = span_debug!("decode_anchors");

            for i in 0..num_anchors {
                // YOLOv8 scores are already sigmoid-activated; pick the best class
                let mut confidence = f32::NEG_INFINITY;
                let mut class_id = 0usize;
                for c in 0..num_classes {
                    let score = predictions[[0, 4 + c, i]];
                    if score > confidence {
                        confidence = score;
                        class_id = c;
                    }
                }

                if confidence < self.confidence_threshold {
                    continue;
                }

                let cx = predictions[[0, 0, i]];
                let cy = predictions[[0, 1, i]];
                let w = predictions[[0, 2, i]];
                let h = predictions[[0, 3, i]];

                let (x1_input, y1_input, x2_input, y2_input) = cxcywh_to_xyxy(cx, cy, w, h);

                // Apply inverse letterbox transform to original image coordinates
                let x1 = ((x1_input - transform.offset_x) / transform.scale)
                    .max(0.0)
                    .min(transform.orig_width as f32);
                let y1 = ((y1_input - transform.offset_y) / transform.scale)
                    .max(0.0)
                    .min(transform.orig_height as f32);
                let x2 = ((x2_input - transform.offset_x) / transform.scale)
                    .max(0.0)
                    .min(transform.orig_width as f32);
                let y2 = ((y2_input - transform.offset_y) / transform.scale)
                    .max(0.0)
                    .min(transform.orig_height as f32);

                candidates.push(DetectedBox::new(class_id, confidence, [x1, y1, x2, y2]));
            }
        }

        let candidate_count = candidates.len();
        let mut detections = non_maximum_suppression(candidates, self.iou_threshold);
        detections.truncate(self.max_detections);

        tracing::trace!(
            num_anchors,
            candidate_count,
            kept = detections.len(),
            "Decoded detections"
        );

        Ok(detections)
    }
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}

/// Intersection over union of two corner-format boxes.
fn compute_iou(a: &DetectedBox, b: &DetectedBox) -> f32 {
    let [ax1, ay1, ax2, ay2] = a.xyxy();
    let [bx1, by1, bx2, by2] = b.xyxy();

    let inter_w = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
    let inter_h = (ay2.min(by2) - ay1.max(by1)).max(0.0);
    let inter_area = inter_w * inter_h;

    let union_area = a.area() + b.area() - inter_area;
    if union_area <= 0.0 {
        0.0
    } else {
        inter_area / union_area
    }
}

/// Class-wise greedy NMS. Output is ordered by descending confidence; grouping
/// and sorting are both stable, so the same input always yields the same order.
fn non_maximum_suppression(candidates: Vec<DetectedBox>, iou_threshold: f32) -> Vec<DetectedBox> {
    let _s = span_debug!("non_maximum_suppression");

    let mut by_class: BTreeMap<usize, Vec<DetectedBox>> = BTreeMap::new();
    for det in candidates {
        by_class.entry(det.class_id()).or_default().push(det);
    }

    let mut kept = Vec::new();

    for (_class_id, mut dets) in by_class {
        dets.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));

        let mut suppressed = vec![false; dets.len()];
        for i in 0..dets.len() {
            if suppressed[i] {
                continue;
            }
            kept.push(dets[i]);
            for j in (i + 1)..dets.len() {
                if !suppressed[j] && compute_iou(&dets[i], &dets[j]) > iou_threshold {
                    suppressed[j] = true;
                }
            }
        }
    }

    kept.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    /// Helper to create a default PostProcessor for tests
    fn test_postprocessor() -> PostProcessor {
        PostProcessor::new(0.25, 0.7, 300)
    }

    /// Identity transform for a 640x640 source image
    fn identity_transform() -> TransformParams {
        test_transform(640, 640, 1.0, 0.0, 0.0)
    }

    fn test_transform(
        orig_width: u32,
        orig_height: u32,
        scale: f32,
        offset_x: f32,
        offset_y: f32,
    ) -> TransformParams {
        TransformParams {
            orig_width,
            orig_height,
            scale,
            offset_x,
            offset_y,
        }
    }

    /// Helper to create YOLOv8 format test data
    /// Creates predictions [1, 4 + num_classes, n] from one (box, class, score) per anchor
    fn create_yolo_test_data(
        anchors: Vec<([f32; 4], usize, f32)>, // (cxcywh in input pixels, class_idx, score)
        num_classes: usize,
    ) -> Array<f32, IxDyn> {
        let n = anchors.len();
        let mut predictions = Array::zeros(IxDyn(&[1, 4 + num_classes, n]));

        for (i, (bbox, class_idx, score)) in anchors.iter().enumerate() {
            for (k, value) in bbox.iter().enumerate() {
                predictions[[0, k, i]] = *value;
            }
            predictions[[0, 4 + class_idx, i]] = *score;
        }

        predictions
    }

    /// Test cxcywh to xyxy conversion
    #[test]
    fn test_cxcywh_to_xyxy() {
        let (x1, y1, x2, y2) = cxcywh_to_xyxy(320.0, 240.0, 100.0, 50.0);
        assert_eq!((x1, y1, x2, y2), (270.0, 215.0, 370.0, 265.0));
    }

    #[test]
    fn test_iou_of_identical_and_disjoint_boxes() {
        let a = DetectedBox::new(0, 0.9, [0.0, 0.0, 10.0, 10.0]);
        let b = DetectedBox::new(0, 0.8, [20.0, 20.0, 30.0, 30.0]);
        let c = DetectedBox::new(0, 0.8, [5.0, 0.0, 15.0, 10.0]);

        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(compute_iou(&a, &b), 0.0);
        // Overlap 50, union 150
        assert!((compute_iou(&a, &c) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_of_degenerate_boxes_is_zero() {
        let a = DetectedBox::new(0, 0.9, [5.0, 5.0, 5.0, 5.0]);
        assert_eq!(compute_iou(&a, &a), 0.0);
    }

    /// Test that confidence threshold filters detections correctly
    #[test]
    fn test_confidence_threshold_filtering() {
        let predictions = create_yolo_test_data(
            vec![
                ([100.0, 100.0, 20.0, 20.0], 0, 0.20), // filtered
                ([200.0, 200.0, 20.0, 20.0], 1, 0.25), // boundary, kept
                ([300.0, 300.0, 20.0, 20.0], 2, 0.80),
            ],
            80,
        );

        let detections = test_postprocessor()
            .parse_detections(&predictions.view(), &identity_transform())
            .unwrap();

        assert_eq!(detections.len(), 2, "Should filter out confidence < 0.25");
        assert_eq!(detections[0].class_id(), 2, "Highest confidence first");
        assert_eq!(detections[1].class_id(), 1, "Boundary case: 0.25 included");
    }

    /// Test class ID extraction via argmax
    #[test]
    fn test_class_id_argmax() {
        let mut predictions = create_yolo_test_data(vec![([320.0, 320.0, 50.0, 50.0], 16, 0.9)], 80);
        // Competing lower score on another class for the same anchor
        predictions[[0, 4 + 15, 0]] = 0.6;

        let detections = test_postprocessor()
            .parse_detections(&predictions.view(), &identity_transform())
            .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id(), 16, "Dog class (16)");
        assert!((detections[0].confidence() - 0.9).abs() < 1e-6);
    }

    /// Test coordinate inverse transformation with known values
    #[test]
    fn test_coordinate_inverse_transformation() {
        // Original image: 800x600, input 640x640
        // Scale = 0.8, resized 640x480, offset Y = 80
        // Box in input space: cx=320, cy=320, w=160, h=160 -> (240, 240, 400, 400)
        // Back to original:
        //   x1 = 240 / 0.8 = 300, y1 = (240 - 80) / 0.8 = 200
        //   x2 = 400 / 0.8 = 500, y2 = (400 - 80) / 0.8 = 400
        let predictions = create_yolo_test_data(vec![([320.0, 320.0, 160.0, 160.0], 0, 0.9)], 80);

        let transform = test_transform(800, 600, 0.8, 0.0, 80.0);
        let detections = test_postprocessor()
            .parse_detections(&predictions.view(), &transform)
            .unwrap();

        assert_eq!(detections.len(), 1);
        let [x1, y1, x2, y2] = detections[0].xyxy();
        assert!((x1 - 300.0).abs() < 0.1, "x1 transformation incorrect: {}", x1);
        assert!((y1 - 200.0).abs() < 0.1, "y1 transformation incorrect: {}", y1);
        assert!((x2 - 500.0).abs() < 0.1, "x2 transformation incorrect: {}", x2);
        assert!((y2 - 400.0).abs() < 0.1, "y2 transformation incorrect: {}", y2);
    }

    /// Test that coordinates are clamped to image bounds
    #[test]
    fn test_coordinates_clamped_to_image_bounds() {
        let predictions = create_yolo_test_data(
            vec![
                ([10.0, 10.0, 100.0, 100.0], 0, 0.9),   // Pokes out top-left
                ([630.0, 630.0, 100.0, 100.0], 1, 0.9), // Pokes out bottom-right
            ],
            80,
        );

        let transform = test_transform(400, 400, 1.0, 50.0, 50.0);
        let detections = test_postprocessor()
            .parse_detections(&predictions.view(), &transform)
            .unwrap();

        assert_eq!(detections.len(), 2);
        for det in &detections {
            let [x1, y1, x2, y2] = det.xyxy();
            assert!(x1 >= 0.0 && y1 >= 0.0, "Lower bound clamped: {:?}", det);
            assert!(x2 <= 400.0 && y2 <= 400.0, "Upper bound clamped: {:?}", det);
            assert!(x1 <= x2 && y1 <= y2, "Corners ordered: {:?}", det);
        }
    }

    #[test]
    fn test_nms_suppresses_overlapping_same_class() {
        let predictions = create_yolo_test_data(
            vec![
                ([100.0, 100.0, 50.0, 50.0], 16, 0.80),
                ([102.0, 101.0, 50.0, 50.0], 16, 0.95), // Same dog, better score
                ([400.0, 400.0, 50.0, 50.0], 16, 0.60), // Another dog elsewhere
            ],
            80,
        );

        let detections = test_postprocessor()
            .parse_detections(&predictions.view(), &identity_transform())
            .unwrap();

        assert_eq!(detections.len(), 2);
        assert!((detections[0].confidence() - 0.95).abs() < 1e-6);
        assert!((detections[1].confidence() - 0.60).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_overlapping_boxes_of_different_classes() {
        let predictions = create_yolo_test_data(
            vec![
                ([100.0, 100.0, 50.0, 50.0], 0, 0.9),  // person
                ([100.0, 100.0, 50.0, 50.0], 16, 0.8), // dog in the same spot
            ],
            80,
        );

        let detections = test_postprocessor()
            .parse_detections(&predictions.view(), &identity_transform())
            .unwrap();

        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn test_max_detections_truncates_lowest_scores() {
        let anchors = (0..10)
            .map(|i| ([20.0 + i as f32 * 60.0, 20.0, 10.0, 10.0], 0, 0.3 + i as f32 * 0.05))
            .collect();
        let predictions = create_yolo_test_data(anchors, 80);

        let detections = PostProcessor::new(0.25, 0.7, 3)
            .parse_detections(&predictions.view(), &identity_transform())
            .unwrap();

        assert_eq!(detections.len(), 3);
        assert!(detections[0].confidence() > detections[1].confidence());
        assert!(detections[1].confidence() > detections[2].confidence());
        assert!((detections[2].confidence() - 0.65).abs() < 1e-5);
    }

    /// Test that no detections are returned when all are below threshold
    #[test]
    fn test_zero_detections_when_all_below_threshold() {
        let predictions = create_yolo_test_data(
            vec![
                ([100.0, 100.0, 10.0, 10.0], 0, 0.01),
                ([200.0, 200.0, 10.0, 10.0], 1, 0.1),
                ([300.0, 300.0, 10.0, 10.0], 2, 0.24),
            ],
            80,
        );

        let detections = test_postprocessor()
            .parse_detections(&predictions.view(), &identity_transform())
            .unwrap();

        assert!(detections.is_empty(), "Should return no detections when all below threshold");
    }

    /// Test edge case: Empty detections (0 anchors)
    #[test]
    fn test_empty_input() {
        let predictions = Array::<f32, _>::zeros(IxDyn(&[1, 84, 0]));

        let detections = test_postprocessor()
            .parse_detections(&predictions.view(), &identity_transform())
            .unwrap();

        assert!(detections.is_empty(), "Empty input should return no detections");
    }

    #[test]
    fn test_rejects_unexpected_output_shape() {
        let predictions = Array::<f32, _>::zeros(IxDyn(&[1, 8400, 84, 1]));
        let err = test_postprocessor()
            .parse_detections(&predictions.view(), &identity_transform())
            .unwrap_err();
        assert!(err.to_string().contains("Unexpected model output shape"));

        let predictions = Array::<f32, _>::zeros(IxDyn(&[1, 4, 8400]));
        assert!(
            test_postprocessor()
                .parse_detections(&predictions.view(), &identity_transform())
                .is_err()
        );
    }

    /// Realistic YOLOv8n output: 8400 anchors, only a handful above threshold
    #[test]
    fn test_realistic_yolov8_output() {
        let num_anchors = 8400;
        let num_classes = 80;
        let mut predictions = Array::<f32, _>::zeros(IxDyn(&[1, 4 + num_classes, num_anchors]));

        // Background noise on every anchor
        for i in 0..num_anchors {
            predictions[[0, 2, i]] = 8.0;
            predictions[[0, 3, i]] = 8.0;
            predictions[[0, 4 + (i % num_classes), i]] = 0.01;
        }

        // Person, dog, car
        let hits = [
            (17usize, [120.0f32, 200.0, 80.0, 240.0], 0usize, 0.91f32),
            (4200, [320.0, 400.0, 200.0, 150.0], 16, 0.88),
            (8000, [560.0, 560.0, 120.0, 80.0], 2, 0.52),
        ];
        for (anchor, bbox, class_idx, score) in hits {
            for (k, value) in bbox.iter().enumerate() {
                predictions[[0, k, anchor]] = *value;
            }
            predictions[[0, 4 + class_idx, anchor]] = score;
        }

        let detections = test_postprocessor()
            .parse_detections(&predictions.view(), &identity_transform())
            .unwrap();

        assert_eq!(detections.len(), 3, "Should filter 8400 anchors to 3 detections");
        assert_eq!(detections[0].class_id(), 0, "First detection: person");
        assert_eq!(detections[1].class_id(), 16, "Second detection: dog");
        assert_eq!(detections[2].class_id(), 2, "Third detection: car");
    }
}
