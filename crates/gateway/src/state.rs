use crate::pipeline::PredictionPipeline;
use crate::store::ArtifactStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PredictionPipeline>,
}

impl AppState {
    pub fn new(pipeline: PredictionPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        self.pipeline.store()
    }
}
