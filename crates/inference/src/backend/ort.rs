use super::{ExecutionProvider, InferenceBackend, InferenceOutput};
use crate::config::InferenceConfig;
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{Session, builder::GraphOptimizationLevel, builder::SessionBuilder},
    value::TensorRef,
};

// Tensor names produced by the ultralytics ONNX exporter
const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";

/// ONNX Runtime session for a YOLOv8 detection export.
pub struct OrtBackend {
    session: Session,
    provider: ExecutionProvider,
}

impl OrtBackend {
    pub fn load_model_with_provider(
        path: &str,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        tracing::info!(
            provider = provider.as_str(),
            intra_threads,
            "Initializing ONNX Runtime session"
        );

        let session = session_builder(provider, intra_threads)?
            .commit_from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load ONNX model from {}: {}", path, e))?;

        Ok(Self { session, provider })
    }
}

fn session_builder(
    provider: ExecutionProvider,
    intra_threads: usize,
) -> anyhow::Result<SessionBuilder> {
    let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?;

    let builder = match provider {
        ExecutionProvider::Cpu => builder,
        // No silent CPU fallback when CUDA is requested
        ExecutionProvider::Cuda => builder.with_execution_providers([
            CUDAExecutionProvider::default()
                .with_device_id(0)
                .build()
                .error_on_failure(),
        ])?,
    };

    Ok(builder)
}

impl InferenceBackend for OrtBackend {
    fn load_model(config: &InferenceConfig) -> anyhow::Result<Self> {
        Self::load_model_with_provider(
            &config.model_path,
            config.execution_provider,
            config.intra_threads,
        )
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let outputs = self.session.run(ort::inputs![
            INPUT_NAME => TensorRef::from_array_view(images.view())?
        ])?;

        let predictions = outputs[OUTPUT_NAME].try_extract_array::<f32>()?.into_owned();

        Ok(InferenceOutput { predictions })
    }

    fn name(&self) -> &'static str {
        match self.provider {
            ExecutionProvider::Cpu => "onnxruntime-cpu",
            ExecutionProvider::Cuda => "onnxruntime-cuda",
        }
    }
}
