use crate::{
    backend::{InferenceBackend, InferenceOutput},
    config::InferenceConfig,
    labels::ClassNames,
    model::{DetectionModel, ResultGroup},
    processing::{PostProcessor, TransformParams},
};
use common::{span, span_debug};
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use preprocess::{CpuPreProcessor, PreprocessResult};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// File-path detector built from a backend, the letterbox preprocessor and
/// YOLOv8 post-processing.
///
/// The backend and the preprocessor's scratch buffer both need `&mut`, so
/// each sits behind its own lock; concurrent callers overlap decoding and
/// post-processing but take turns on the model itself. Neither guarded value
/// carries state between calls, so a lock poisoned by a panicking call is
/// taken over by the next one.
pub struct Detector<B: InferenceBackend> {
    backend: Mutex<B>,
    preprocessor: Mutex<CpuPreProcessor>,
    postprocessor: PostProcessor,
    names: ClassNames,
    model_path: String,
    backend_name: &'static str,
}

impl<B: InferenceBackend> Detector<B> {
    pub fn new(backend: B, names: ClassNames, config: &InferenceConfig) -> Self {
        let postprocessor = PostProcessor::new(
            config.confidence_threshold,
            config.iou_threshold,
            config.max_detections,
        );
        let preprocessor = CpuPreProcessor::new(config.input_size);
        Self {
            backend_name: backend.name(),
            backend: Mutex::new(backend),
            preprocessor: Mutex::new(preprocessor),
            postprocessor,
            names,
            model_path: config.model_path.clone(),
        }
    }

    /// Load the backend and class names described by `config`.
    pub fn from_config(config: &InferenceConfig) -> anyhow::Result<Self> {
        let names = match &config.labels_path {
            Some(path) => {
                let names = ClassNames::from_file(path)?;
                tracing::info!(path = %path, classes = names.len(), "Loaded class labels");
                names
            }
            None => ClassNames::coco(),
        };

        tracing::info!(model_path = %config.model_path, "Loading inference model");
        let backend = B::load_model(config)?;
        tracing::info!(backend = backend.name(), "Model loaded successfully");

        Ok(Self::new(backend, names, config))
    }

    /// Run the full pipeline on an already decoded image.
    pub fn detect_image(&self, image: &RgbImage) -> anyhow::Result<ResultGroup> {
        let (width, height) = image.dimensions();

        let PreprocessResult {
            tensor,
            scale,
            offset_x,
            offset_y,
        } = {
            let mut preprocessor = self
                .preprocessor
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            preprocessor.preprocess(image.as_raw(), width, height)?
        };

        let InferenceOutput { predictions } = {
            let _infer_span = span!("model_inference");
            let mut backend = self
                .backend
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            backend.infer(&tensor)?
        };

        let transform = TransformParams {
            orig_width: width,
            orig_height: height,
            scale,
            offset_x,
            offset_y,
        };

        let boxes = self
            .postprocessor
            .parse_detections(&predictions.view(), &transform)?;

        tracing::debug!(width, height, detections = boxes.len(), "Image processed");

        Ok(ResultGroup::new(boxes))
    }
}

/// Decode by content, not by extension: the extension on disk is only a hint.
/// The EXIF orientation is applied so boxes match the upright image.
fn load_rgb_image(path: &Path) -> anyhow::Result<RgbImage> {
    let _s = span_debug!("decode_image");

    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
    let orientation = decoder
        .orientation()
        .map_err(|e| anyhow::anyhow!("Failed to read image orientation: {}", e))?;

    let mut image = DynamicImage::from_decoder(decoder)
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
    image.apply_orientation(orientation);

    Ok(image.to_rgb8())
}

impl<B: InferenceBackend> DetectionModel for Detector<B> {
    fn detect(&self, image_path: &Path) -> anyhow::Result<Vec<ResultGroup>> {
        let image = load_rgb_image(image_path)?;
        Ok(vec![self.detect_image(&image)?])
    }

    fn names(&self) -> &ClassNames {
        &self.names
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.model_path, self.backend_name)
    }
}
