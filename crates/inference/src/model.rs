//! The detection model as seen by callers: give it an image file, get boxes back.

use crate::labels::ClassNames;
use std::path::Path;

/// One detected object in the pixel space of the source image.
///
/// Corners are always ordered (`x1 <= x2`, `y1 <= y2`) and the confidence is a
/// probability in `[0, 1]`; both are enforced on construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedBox {
    class_id: usize,
    confidence: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl DetectedBox {
    pub fn new(class_id: usize, confidence: f32, corners: [f32; 4]) -> Self {
        let [ax, ay, bx, by] = corners;
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };

        Self {
            class_id,
            confidence,
            x1: ax.min(bx),
            y1: ay.min(by),
            x2: ax.max(bx),
            y2: ay.max(by),
        }
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Corners as `[x1, y1, x2, y2]`.
    pub fn xyxy(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }
}

/// Boxes produced for a single input image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultGroup {
    pub boxes: Vec<DetectedBox>,
}

impl ResultGroup {
    pub fn new(boxes: Vec<DetectedBox>) -> Self {
        Self { boxes }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// A loaded, read-only detection model.
///
/// Implementations are shared across concurrent requests, so `detect` takes
/// `&self`; any interior state must be synchronized by the implementation.
pub trait DetectionModel: Send + Sync {
    /// Run detection on the image stored at `image_path`.
    fn detect(&self, image_path: &Path) -> anyhow::Result<Vec<ResultGroup>>;

    /// Class index to label mapping for the boxes this model returns.
    fn names(&self) -> &ClassNames;

    /// Short human-readable description for logs and the health endpoint.
    fn describe(&self) -> String;
}
