use inference::{ClassNames, ResultGroup};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How detections are shaped into the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// `{"detections": [{"label", "confidence", "bbox"}]}`
    DetailedBoxes,
    /// `{"count", "objects"}`
    LabelSummary,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::DetailedBoxes => "detailed_boxes",
            ResponseFormat::LabelSummary => "label_summary",
        }
    }

    pub fn format(&self, groups: &[ResultGroup], names: &ClassNames) -> DetectResponse {
        match self {
            ResponseFormat::DetailedBoxes => DetectResponse::Detailed(detailed(groups, names)),
            ResponseFormat::LabelSummary => DetectResponse::Summary(summary(groups, names)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetectResponse {
    Detailed(DetailedResponse),
    Summary(SummaryResponse),
}

impl DetectResponse {
    /// Number of boxes carried by the response
    pub fn object_count(&self) -> usize {
        match self {
            DetectResponse::Detailed(r) => r.detections.len(),
            DetectResponse::Summary(r) => r.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedResponse {
    pub detections: Vec<DetectionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionEntry {
    pub label: String,
    /// Percentage in `[0, 100]`, two decimals
    pub confidence: f64,
    /// `[x1, y1, x2, y2]` in source image pixels
    pub bbox: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryResponse {
    pub count: usize,
    pub objects: Vec<String>,
}

fn detailed(groups: &[ResultGroup], names: &ClassNames) -> DetailedResponse {
    let detections = groups
        .iter()
        .flat_map(|group| group.boxes.iter())
        .map(|det| DetectionEntry {
            label: names.label(det.class_id()).into_owned(),
            confidence: to_percent(det.confidence()),
            bbox: det.xyxy(),
        })
        .collect();

    DetailedResponse { detections }
}

fn summary(groups: &[ResultGroup], names: &ClassNames) -> SummaryResponse {
    let count = groups.iter().map(ResultGroup::len).sum();
    let objects: BTreeSet<String> = groups
        .iter()
        .flat_map(|group| group.boxes.iter())
        .map(|det| names.label(det.class_id()).into_owned())
        .collect();

    SummaryResponse {
        count,
        objects: objects.into_iter().collect(),
    }
}

fn to_percent(confidence: f32) -> f64 {
    let percent = (confidence as f64 * 100.0 * 100.0).round() / 100.0;
    percent.clamp(0.0, 100.0)
}
